use std::sync::Arc;

use kube::ResourceExt;

use super::{check_name, rules_of, Stores};
use crate::api::v1alpha1::{self, providers_of, PolicyList};
use crate::crd::{Policy, PolicyStatus, PolicyTemplate, Rule};
use crate::errors::{AdmissionError, Result};
use crate::provider::ProviderRegistry;
use crate::query::ListQuery;
use crate::resource_store::ResourceStore;

#[derive(Clone)]
pub struct PolicyManager {
    templates: Arc<dyn ResourceStore<PolicyTemplate>>,
    policies: Arc<dyn ResourceStore<Policy>>,
    rules: Arc<dyn ResourceStore<Rule>>,
    providers: ProviderRegistry,
}

impl PolicyManager {
    pub fn new(stores: &Stores) -> Self {
        Self {
            templates: stores.templates.clone(),
            policies: stores.policies.clone(),
            rules: stores.rules.clone(),
            providers: stores.providers.clone(),
        }
    }

    pub fn list(&self, query: &ListQuery) -> PolicyList {
        query.apply(self.policies.list(), |obj| v1alpha1::Policy::from(obj))
    }

    pub fn get(&self, name: &str) -> Result<v1alpha1::Policy> {
        self.policies
            .get(name)
            .map(|policy| v1alpha1::Policy::from(&policy))
            .ok_or_else(|| AdmissionError::PolicyNotFound(name.to_string()))
    }

    /// Fills what the request leaves empty from its template and validates
    /// the result.
    fn from_template(&self, mut policy: v1alpha1::Policy) -> Result<Policy> {
        v1alpha1::validate_name(&policy.name)?;
        if policy.policy_template.is_empty() {
            return Err(AdmissionError::Invalid(format!(
                "policy {} does not reference a policy template",
                policy.name
            )));
        }
        let template = self
            .templates
            .get(&policy.policy_template)
            .ok_or_else(|| AdmissionError::PolicyTemplateNotFound(policy.policy_template.clone()))?;

        if policy.targets.is_empty() {
            policy.targets = template.spec.targets.clone();
        }
        if policy.parameters.is_empty() {
            policy.parameters = template.spec.parameters.clone();
        }
        if policy.description.is_empty() {
            policy.description = template.spec.description.clone();
        }
        policy.validate()?;
        Ok(Policy::from(&policy))
    }

    async fn record_providers(&self, mut policy: Policy) -> Result<Policy> {
        policy.status = Some(PolicyStatus {
            providers: providers_of(&policy.spec.targets),
        });
        self.policies.replace_status(&policy).await
    }

    pub async fn create(&self, policy: v1alpha1::Policy) -> Result<v1alpha1::Policy> {
        let name = policy.name.clone();
        let obj = self.from_template(policy)?;
        if self.policies.get(&name).is_some() {
            return Err(AdmissionError::PolicyAlreadyExists(name));
        }
        let providers = self.providers.resolve(&providers_of(&obj.spec.targets))?;
        for provider in &providers {
            provider.validate_policy(&obj)?;
        }

        let created = self.policies.create(&obj).await.map_err(|e| {
            if e.is_already_exists() {
                AdmissionError::PolicyAlreadyExists(name.clone())
            } else {
                e
            }
        })?;
        for provider in &providers {
            provider.add_policy(&created).await?;
        }
        let created = self.record_providers(created).await?;

        log::info!(
            "Created policy {} from template {}",
            name,
            created.spec.policy_template
        );
        Ok(v1alpha1::Policy::from(&created))
    }

    pub async fn update(&self, name: &str, mut policy: v1alpha1::Policy) -> Result<v1alpha1::Policy> {
        check_name(name, &mut policy.name)?;
        let existing = self
            .policies
            .get(name)
            .ok_or_else(|| AdmissionError::PolicyNotFound(name.to_string()))?;
        let mut obj = self.from_template(policy)?;
        obj.metadata.resource_version = existing.metadata.resource_version.clone();
        obj.status = existing.status.clone();

        let old_names = providers_of(&existing.spec.targets);
        let new_names = providers_of(&obj.spec.targets);
        let providers = self.providers.resolve(&new_names)?;
        for provider in &providers {
            provider.validate_policy(&obj)?;
        }

        let updated = self.policies.replace(&obj).await.map_err(|e| {
            if e.is_not_found() {
                AdmissionError::PolicyNotFound(name.to_string())
            } else {
                e
            }
        })?;

        let rules = rules_of(self.rules.as_ref(), name);
        for provider in &providers {
            if old_names.iter().any(|old| old == provider.name()) {
                provider.update_policy(&updated).await?;
            } else {
                provider.add_policy(&updated).await?;
                for rule in &rules {
                    provider.add_rule(rule, &updated).await?;
                }
            }
        }
        for old in old_names.iter().filter(|old| !new_names.contains(old)) {
            match self.providers.get(old) {
                Ok(provider) => {
                    for rule in &rules {
                        provider.remove_rule(rule, &existing).await?;
                    }
                    provider.remove_policy(&existing).await?;
                }
                Err(e) => log::warn!("Not removing policy {} from {}: {}", name, old, e),
            }
        }
        let updated = self.record_providers(updated).await?;

        log::info!("Updated policy {}", name);
        Ok(v1alpha1::Policy::from(&updated))
    }

    /// Deletes the policy together with every rule that instantiates it
    pub async fn delete(&self, name: &str) -> Result<()> {
        let existing = self
            .policies
            .get(name)
            .ok_or_else(|| AdmissionError::PolicyNotFound(name.to_string()))?;
        let rules = rules_of(self.rules.as_ref(), name);
        let mut providers = Vec::new();
        for provider_name in providers_of(&existing.spec.targets) {
            match self.providers.get(&provider_name) {
                Ok(provider) => providers.push(provider),
                Err(e) => log::warn!("Not removing policy {} from {}: {}", name, provider_name, e),
            }
        }

        // Rules go first, the policy leaves a provider only once none are left
        for rule in &rules {
            for provider in &providers {
                provider.remove_rule(rule, &existing).await?;
            }
            let rule_name = rule.name_any();
            match self.rules.delete(&rule_name).await {
                Ok(()) => log::info!("Deleted rule {} of policy {}", rule_name, name),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        for provider in &providers {
            provider.remove_policy(&existing).await?;
        }

        self.policies.delete(name).await.map_err(|e| {
            if e.is_not_found() {
                AdmissionError::PolicyNotFound(name.to_string())
            } else {
                e
            }
        })?;
        log::info!("Deleted policy {}", name);
        Ok(())
    }
}
