//! Cluster-scoped custom resources of the `admission.kubesphere.io/v1alpha1` group.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::v1alpha1::{self, EnforcementAction, Match, Parameters, PolicyTarget};

/// Label set on every Rule, pointing at the Policy it instantiates
pub const POLICY_LABEL: &str = "admission.kubesphere.io/policy";

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "admission.kubesphere.io",
    version = "v1alpha1",
    kind = "PolicyTemplate",
    plural = "policytemplates",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTemplateSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub targets: Vec<PolicyTarget>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "admission.kubesphere.io",
    version = "v1alpha1",
    kind = "Policy",
    plural = "policies",
    status = "PolicyStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    pub policy_template: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub targets: Vec<PolicyTarget>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    /// Providers that accepted the policy
    #[serde(default)]
    pub providers: Vec<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "admission.kubesphere.io",
    version = "v1alpha1",
    kind = "Rule",
    plural = "rules",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub policy: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "match", default)]
    pub match_: Match,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "v1alpha1::preserve_unknown_fields")]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub enforcement_action: EnforcementAction,
}

impl From<&v1alpha1::PolicyTemplate> for PolicyTemplate {
    fn from(template: &v1alpha1::PolicyTemplate) -> Self {
        PolicyTemplate::new(
            &template.name,
            PolicyTemplateSpec {
                description: template.description.clone(),
                parameters: template.parameters.clone(),
                targets: template.targets.clone(),
            },
        )
    }
}

impl From<&PolicyTemplate> for v1alpha1::PolicyTemplate {
    fn from(template: &PolicyTemplate) -> Self {
        v1alpha1::PolicyTemplate {
            name: template.name_any(),
            description: template.spec.description.clone(),
            targets: template.spec.targets.clone(),
            parameters: template.spec.parameters.clone(),
        }
    }
}

impl From<&v1alpha1::Policy> for Policy {
    fn from(policy: &v1alpha1::Policy) -> Self {
        Policy::new(
            &policy.name,
            PolicySpec {
                policy_template: policy.policy_template.clone(),
                description: policy.description.clone(),
                parameters: policy.parameters.clone(),
                targets: policy.targets.clone(),
            },
        )
    }
}

impl From<&Policy> for v1alpha1::Policy {
    fn from(policy: &Policy) -> Self {
        v1alpha1::Policy {
            name: policy.name_any(),
            policy_template: policy.spec.policy_template.clone(),
            description: policy.spec.description.clone(),
            targets: policy.spec.targets.clone(),
            parameters: policy.spec.parameters.clone(),
        }
    }
}

impl From<&v1alpha1::Rule> for Rule {
    fn from(rule: &v1alpha1::Rule) -> Self {
        let mut obj = Rule::new(
            &rule.name,
            RuleSpec {
                policy: rule.policy.clone(),
                description: rule.description.clone(),
                match_: rule.match_.clone(),
                parameters: rule.parameters.clone(),
                enforcement_action: rule.enforcement_action.unwrap_or_default(),
            },
        );
        obj.metadata.labels = Some(BTreeMap::from([(
            POLICY_LABEL.to_string(),
            rule.policy.clone(),
        )]));
        obj
    }
}

impl From<&Rule> for v1alpha1::Rule {
    fn from(rule: &Rule) -> Self {
        v1alpha1::Rule {
            name: rule.name_any(),
            policy: rule.spec.policy.clone(),
            description: rule.spec.description.clone(),
            match_: rule.spec.match_.clone(),
            parameters: rule.spec.parameters.clone(),
            enforcement_action: Some(rule.spec.enforcement_action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crds_are_cluster_scoped() {
        for crd in [PolicyTemplate::crd(), Policy::crd(), Rule::crd()] {
            assert_eq!(crd.spec.group, "admission.kubesphere.io");
            assert_eq!(crd.spec.scope, "Cluster", "{} should be cluster scoped", crd.spec.names.kind);
        }
        assert_eq!(Policy::crd().spec.names.plural, "policies");
        assert_eq!(PolicyTemplate::crd().spec.names.plural, "policytemplates");
    }

    #[test]
    fn test_rule_carries_policy_label() {
        let rule = v1alpha1::Rule {
            name: "ns-must-have-owner".to_string(),
            policy: "required-labels".to_string(),
            ..Default::default()
        };
        let obj = Rule::from(&rule);
        assert_eq!(
            obj.labels().get(POLICY_LABEL).map(String::as_str),
            Some("required-labels")
        );
        assert_eq!(obj.spec.enforcement_action, EnforcementAction::Deny);

        let back = v1alpha1::Rule::from(&obj);
        assert_eq!(back.name, "ns-must-have-owner");
        assert_eq!(back.enforcement_action, Some(EnforcementAction::Deny));
    }
}
