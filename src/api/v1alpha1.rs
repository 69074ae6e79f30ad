//! Transfer types served by the `admission.kubesphere.io/v1alpha1` REST api.
//!
//! The nested types (targets, parameters, match) are shared with the custom
//! resources in [`crate::crd`].

use std::fmt;
use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AdmissionError, Result};

pub const GROUP: &str = "admission.kubesphere.io";
pub const VERSION: &str = "v1alpha1";

pub const MAX_NAME_LENGTH: usize = 63;
pub const MAX_TARGET_LENGTH: usize = 253;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());
static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// Checks that `name` is a DNS-1123 label, the format shared by policy
/// templates, policies and rules.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AdmissionError::Invalid("name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(AdmissionError::Invalid(format!(
            "name {} must be no more than {} characters",
            name, MAX_NAME_LENGTH
        )));
    }
    if !NAME_RE.is_match(name) {
        return Err(AdmissionError::Invalid(format!(
            "name {} must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character",
            name
        )));
    }
    Ok(())
}

/// Checks that `target` is a DNS-1123 subdomain such as
/// `admission.k8s.gatekeeper.sh`.
pub fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() || target.len() > MAX_TARGET_LENGTH || !TARGET_RE.is_match(target) {
        return Err(AdmissionError::Invalid(format!(
            "target {:?} must be a lower case DNS subdomain of at most {} characters",
            target, MAX_TARGET_LENGTH
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTarget {
    /// Engine target, e.g. `admission.k8s.gatekeeper.sh`
    pub target: String,
    /// Policy source evaluated by the engine (Rego for gatekeeper)
    pub expression: String,
    /// Extra libraries made available to the expression
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub import: Vec<String>,
    /// Name of the provider that installs this target
    pub provider: String,
}

impl PolicyTarget {
    fn validate(&self) -> Result<()> {
        validate_target(&self.target)?;
        if self.provider.is_empty() {
            return Err(AdmissionError::Invalid(format!(
                "target {} has no provider",
                self.target
            )));
        }
        if self.expression.trim().is_empty() {
            return Err(AdmissionError::Invalid(format!(
                "target {} has an empty expression",
                self.target
            )));
        }
        Ok(())
    }
}

pub(crate) fn preserve_unknown_fields(
    _gen: &mut schemars::gen::SchemaGenerator,
) -> schemars::schema::Schema {
    let mut obj = schemars::schema::SchemaObject::default();
    obj.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".into(),
        serde_json::json!(true),
    );
    schemars::schema::Schema::Object(obj)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    #[serde(rename = "openAPIV3Schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub open_api_v3_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_schema: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        self.validation.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub targets: Vec<PolicyTarget>,
    #[serde(default)]
    pub parameters: Parameters,
}

impl PolicyTemplate {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_targets(&self.targets)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub policy_template: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub targets: Vec<PolicyTarget>,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.policy_template.is_empty() {
            return Err(AdmissionError::Invalid(format!(
                "policy {} does not reference a policy template",
                self.name
            )));
        }
        validate_targets(&self.targets)
    }

    /// Distinct provider names, in target order.
    pub fn providers(&self) -> Vec<String> {
        providers_of(&self.targets)
    }
}

pub(crate) fn providers_of(targets: &[PolicyTarget]) -> Vec<String> {
    let mut providers: Vec<String> = Vec::new();
    for target in targets {
        if !providers.contains(&target.provider) {
            providers.push(target.provider.clone());
        }
    }
    providers
}

fn validate_targets(targets: &[PolicyTarget]) -> Result<()> {
    if targets.is_empty() {
        return Err(AdmissionError::Invalid(
            "at least one target is required".to_string(),
        ));
    }
    targets.iter().try_for_each(PolicyTarget::validate)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementAction {
    #[default]
    Deny,
    Dryrun,
    Warn,
}

impl fmt::Display for EnforcementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcementAction::Deny => write!(f, "deny"),
            EnforcementAction::Dryrun => write!(f, "dryrun"),
            EnforcementAction::Warn => write!(f, "warn"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchKinds {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub kinds: Vec<String>,
}

pub const SCOPE_ALL: &str = "*";
pub const SCOPE_CLUSTER: &str = "Cluster";
pub const SCOPE_NAMESPACED: &str = "Namespaced";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<MatchKinds>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "match", default)]
    pub match_: Match,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement_action: Option<EnforcementAction>,
}

impl Rule {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.policy.is_empty() {
            return Err(AdmissionError::Invalid(format!(
                "rule {} does not reference a policy",
                self.name
            )));
        }
        if let Some(scope) = self.match_.scope.as_deref() {
            if ![SCOPE_ALL, SCOPE_CLUSTER, SCOPE_NAMESPACED].contains(&scope) {
                return Err(AdmissionError::Invalid(format!(
                    "rule {} has unknown match scope {}",
                    self.name, scope
                )));
            }
        }
        if let Some(parameters) = &self.parameters {
            if !parameters.is_object() {
                return Err(AdmissionError::Invalid(format!(
                    "rule {} parameters must be an object",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Paged list envelope returned by every list route.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total_items: usize,
}

pub type PolicyTemplateList = ListResult<PolicyTemplate>;
pub type PolicyList = ListResult<Policy>;
pub type RuleList = ListResult<Rule>;
