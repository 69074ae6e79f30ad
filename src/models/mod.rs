//! Managers implementing the admission operations on top of the resource
//! stores and the provider registry.

pub mod policy;
pub mod policy_template;
pub mod rule;


pub use policy::PolicyManager;
pub use policy_template::PolicyTemplateManager;
pub use rule::RuleManager;

use std::sync::Arc;

use kube::ResourceExt;

use crate::crd::{Policy, PolicyTemplate, Rule};
use crate::errors::AdmissionError;
use crate::provider::ProviderRegistry;
use crate::resource_store::ResourceStore;

/// The stores and providers every manager is built from
#[derive(Clone)]
pub struct Stores {
    pub templates: Arc<dyn ResourceStore<PolicyTemplate>>,
    pub policies: Arc<dyn ResourceStore<Policy>>,
    pub rules: Arc<dyn ResourceStore<Rule>>,
    pub providers: ProviderRegistry,
}

/// Rules that belong to `policy`, in name order
pub(crate) fn rules_of(rules: &dyn ResourceStore<Rule>, policy: &str) -> Vec<Rule> {
    let mut rules: Vec<Rule> = rules
        .list()
        .into_iter()
        .filter(|rule| rule.spec.policy == policy)
        .collect();
    rules.sort_by_key(|rule| rule.name_any());
    rules
}

/// Rejects a body whose name disagrees with the name in the route
pub(crate) fn check_name(path_name: &str, body_name: &mut String) -> Result<(), AdmissionError> {
    if body_name.is_empty() {
        *body_name = path_name.to_string();
        return Ok(());
    }
    if body_name != path_name {
        return Err(AdmissionError::Invalid(format!(
            "name {} in the body does not match {} in the path",
            body_name, path_name
        )));
    }
    Ok(())
}
