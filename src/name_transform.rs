/// Converts a policy name into the kind of its Gatekeeper constraint.
///
/// `k8s-required-labels` becomes `K8sRequiredLabels`. Parts are split on
/// `-` and `.`, and each part gets an upper case first character.
pub fn policy_to_constraint_kind(policy_name: &str) -> String {
    policy_name
        .split(['-', '.'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Gatekeeper requires a ConstraintTemplate to be named after the lower
/// cased kind it defines.
pub fn constraint_kind_to_template_name(kind: &str) -> String {
    kind.to_lowercase()
}
