//! Translates policies into Gatekeeper `ConstraintTemplate`s and rules into
//! Gatekeeper constraints.
//!
//! A policy named `k8s-required-labels` becomes:
//!
//! ```yaml
//! apiVersion: templates.gatekeeper.sh/v1
//! kind: ConstraintTemplate
//! metadata:
//!   name: k8srequiredlabels
//! spec:
//!   crd:
//!     spec:
//!       names:
//!         kind: K8sRequiredLabels
//!       validation:
//!         openAPIV3Schema: {...}   # from the policy parameters
//!   targets:
//!     - target: admission.k8s.gatekeeper.sh
//!       rego: |
//!         package k8srequiredlabels
//!         ...
//!       libs: [...]
//! ```
//!
//! and each of its rules becomes a `constraints.gatekeeper.sh/v1beta1`
//! object of kind `K8sRequiredLabels`, named after the rule.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use serde_json::{json, Map, Value};

use super::Provider;
use crate::crd::{Policy, Rule};
use crate::errors::{AdmissionError, Result};
use crate::name_transform::{constraint_kind_to_template_name, policy_to_constraint_kind};

pub const PROVIDER_NAME: &str = "gatekeeper";
pub const GATEKEEPER_TARGET: &str = "admission.k8s.gatekeeper.sh";

pub const TEMPLATE_GROUP: &str = "templates.gatekeeper.sh";
pub const TEMPLATE_VERSION: &str = "v1";
pub const TEMPLATE_KIND: &str = "ConstraintTemplate";
pub const CONSTRAINT_GROUP: &str = "constraints.gatekeeper.sh";
pub const CONSTRAINT_VERSION: &str = "v1beta1";

pub const FIELD_MANAGER: &str = "kubesphere-admission";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "kubesphere";

pub fn constraint_template_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(TEMPLATE_GROUP, TEMPLATE_VERSION, TEMPLATE_KIND),
        "constrainttemplates",
    )
}

/// Gatekeeper generates one CRD per template; its plural is the lower cased kind.
pub fn constraint_resource(kind: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(CONSTRAINT_GROUP, CONSTRAINT_VERSION, kind),
        &kind.to_lowercase(),
    )
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string())])
}

/// The constraint kind of a policy. Gatekeeper kinds must start with a letter.
pub fn constraint_kind(policy: &Policy) -> Result<String> {
    let policy_name = policy.name_any();
    let kind = policy_to_constraint_kind(&policy_name);
    if !kind.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(AdmissionError::Invalid(format!(
            "policy name {} must start with a letter to be used as a {} constraint kind",
            policy_name, PROVIDER_NAME
        )));
    }
    Ok(kind)
}

/// Builds the ConstraintTemplate for a policy from its gatekeeper targets
pub fn constraint_template(policy: &Policy) -> Result<DynamicObject> {
    let policy_name = policy.name_any();
    let kind = constraint_kind(policy)?;

    let targets: Vec<Value> = policy
        .spec
        .targets
        .iter()
        .filter(|target| target.provider == PROVIDER_NAME)
        .map(|target| {
            let mut entry = json!({
                "target": target.target,
                "rego": target.expression,
            });
            if !target.import.is_empty() {
                entry["libs"] = json!(target.import);
            }
            entry
        })
        .collect();
    if targets.is_empty() {
        return Err(AdmissionError::Invalid(format!(
            "policy {} has no {} targets",
            policy_name, PROVIDER_NAME
        )));
    }

    let mut crd_spec = json!({ "names": { "kind": kind } });
    if let Some(validation) = &policy.spec.parameters.validation {
        crd_spec["validation"] = serde_json::to_value(validation)?;
    }

    let mut obj = DynamicObject::new(
        &constraint_kind_to_template_name(&kind),
        &constraint_template_resource(),
    )
    .data(json!({
        "spec": {
            "crd": { "spec": crd_spec },
            "targets": targets,
        }
    }));
    obj.metadata.labels = Some(managed_labels());
    Ok(obj)
}

/// Builds the constraint enforcing `rule` with the template of `policy`
pub fn constraint(rule: &Rule, policy: &Policy) -> Result<DynamicObject> {
    let kind = constraint_kind(policy)?;

    let mut spec = Map::new();
    spec.insert(
        "enforcementAction".to_string(),
        json!(rule.spec.enforcement_action.to_string()),
    );
    let match_ = serde_json::to_value(&rule.spec.match_)?;
    if match_.as_object().is_some_and(|m| !m.is_empty()) {
        spec.insert("match".to_string(), match_);
    }
    if let Some(parameters) = &rule.spec.parameters {
        spec.insert("parameters".to_string(), parameters.clone());
    }

    let mut obj = DynamicObject::new(&rule.name_any(), &constraint_resource(&kind))
        .data(json!({ "spec": spec }));
    obj.metadata.labels = Some(managed_labels());
    Ok(obj)
}

/// The minimal set of writes the provider needs against the cluster running Gatekeeper
#[async_trait]
pub trait GatekeeperClient: Send + Sync {
    /// Creates or updates the object
    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<()>;

    /// Deletes the object. Deleting a missing object succeeds.
    async fn delete(&self, resource: &ApiResource, name: &str) -> Result<()>;
}

/// Writes Gatekeeper objects through the Kubernetes API with server-side apply
#[derive(Clone)]
pub struct KubeGatekeeperClient {
    client: Client,
}

impl KubeGatekeeperClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GatekeeperClient for KubeGatekeeperClient {
    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<()> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), resource);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&object.name_any(), &params, &Patch::Apply(object))
            .await?;
        Ok(())
    }

    async fn delete(&self, resource: &ApiResource, name: &str) -> Result<()> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), resource);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                log::debug!("{} {} already gone", resource.kind, name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone)]
pub struct GatekeeperProvider {
    client: Arc<dyn GatekeeperClient>,
}

impl GatekeeperProvider {
    pub fn new(client: Arc<dyn GatekeeperClient>) -> Self {
        Self { client }
    }

    async fn apply_template(&self, policy: &Policy) -> Result<()> {
        let template = constraint_template(policy)?;
        self.client
            .apply(&constraint_template_resource(), &template)
            .await?;
        log::info!(
            "Applied ConstraintTemplate {} for policy {}",
            template.name_any(),
            policy.name_any()
        );
        Ok(())
    }

    async fn apply_constraint(&self, rule: &Rule, policy: &Policy) -> Result<()> {
        let constraint = constraint(rule, policy)?;
        let kind = policy_to_constraint_kind(&policy.name_any());
        self.client
            .apply(&constraint_resource(&kind), &constraint)
            .await?;
        log::info!("Applied {} constraint {}", kind, rule.name_any());
        Ok(())
    }
}

#[async_trait]
impl Provider for GatekeeperProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn validate_policy(&self, policy: &Policy) -> Result<()> {
        constraint_template(policy).map(|_| ())
    }

    async fn add_policy(&self, policy: &Policy) -> Result<()> {
        self.apply_template(policy).await
    }

    async fn update_policy(&self, policy: &Policy) -> Result<()> {
        self.apply_template(policy).await
    }

    async fn remove_policy(&self, policy: &Policy) -> Result<()> {
        let kind = policy_to_constraint_kind(&policy.name_any());
        let name = constraint_kind_to_template_name(&kind);
        self.client
            .delete(&constraint_template_resource(), &name)
            .await?;
        log::info!("Removed ConstraintTemplate {}", name);
        Ok(())
    }

    async fn add_rule(&self, rule: &Rule, policy: &Policy) -> Result<()> {
        self.apply_constraint(rule, policy).await
    }

    async fn update_rule(&self, rule: &Rule, policy: &Policy) -> Result<()> {
        self.apply_constraint(rule, policy).await
    }

    async fn remove_rule(&self, rule: &Rule, policy: &Policy) -> Result<()> {
        let kind = policy_to_constraint_kind(&policy.name_any());
        self.client
            .delete(&constraint_resource(&kind), &rule.name_any())
            .await?;
        log::info!("Removed {} constraint {}", kind, rule.name_any());
        Ok(())
    }
}
