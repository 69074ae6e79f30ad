use std::sync::Arc;

use kube::ResourceExt;

use super::{check_name, rules_of, Stores};
use crate::api::v1alpha1::{self, providers_of, RuleList};
use crate::crd::{Policy, Rule};
use crate::errors::{AdmissionError, Result};
use crate::provider::{Provider, ProviderRegistry};
use crate::query::ListQuery;
use crate::resource_store::ResourceStore;

#[derive(Clone)]
pub struct RuleManager {
    policies: Arc<dyn ResourceStore<Policy>>,
    rules: Arc<dyn ResourceStore<Rule>>,
    providers: ProviderRegistry,
}

impl RuleManager {
    pub fn new(stores: &Stores) -> Self {
        Self {
            policies: stores.policies.clone(),
            rules: stores.rules.clone(),
            providers: stores.providers.clone(),
        }
    }

    fn policy(&self, name: &str) -> Result<Policy> {
        self.policies
            .get(name)
            .ok_or_else(|| AdmissionError::PolicyNotFound(name.to_string()))
    }

    /// Returns the rule only when it belongs to `policy`
    fn rule(&self, policy: &str, name: &str) -> Result<Rule> {
        self.rules
            .get(name)
            .filter(|rule| rule.spec.policy == policy)
            .ok_or_else(|| AdmissionError::RuleNotFound(name.to_string()))
    }

    fn providers_for(&self, policy: &Policy) -> Result<Vec<Arc<dyn Provider>>> {
        self.providers.resolve(&providers_of(&policy.spec.targets))
    }

    pub fn list(&self, policy: &str, query: &ListQuery) -> Result<RuleList> {
        self.policy(policy)?;
        Ok(query.apply(rules_of(self.rules.as_ref(), policy), |obj| {
            v1alpha1::Rule::from(obj)
        }))
    }

    pub fn get(&self, policy: &str, name: &str) -> Result<v1alpha1::Rule> {
        self.policy(policy)?;
        self.rule(policy, name).map(|rule| v1alpha1::Rule::from(&rule))
    }

    pub async fn create(&self, policy: &str, mut rule: v1alpha1::Rule) -> Result<v1alpha1::Rule> {
        check_policy(policy, &mut rule)?;
        let policy_obj = self.policy(policy)?;
        rule.validate()?;
        if self.rules.get(&rule.name).is_some() {
            return Err(AdmissionError::RuleAlreadyExists(rule.name));
        }
        let providers = self.providers_for(&policy_obj)?;

        let created = self.rules.create(&Rule::from(&rule)).await.map_err(|e| {
            if e.is_already_exists() {
                AdmissionError::RuleAlreadyExists(rule.name.clone())
            } else {
                e
            }
        })?;
        for provider in &providers {
            provider.add_rule(&created, &policy_obj).await?;
        }

        log::info!(
            "Created rule {} of policy {} ({})",
            created.name_any(),
            policy,
            created.spec.enforcement_action
        );
        Ok(v1alpha1::Rule::from(&created))
    }

    pub async fn update(
        &self,
        policy: &str,
        name: &str,
        mut rule: v1alpha1::Rule,
    ) -> Result<v1alpha1::Rule> {
        check_name(name, &mut rule.name)?;
        check_policy(policy, &mut rule)?;
        let policy_obj = self.policy(policy)?;
        let existing = self.rule(policy, name)?;
        rule.validate()?;
        let providers = self.providers_for(&policy_obj)?;

        let mut obj = Rule::from(&rule);
        obj.metadata.resource_version = existing.metadata.resource_version.clone();
        let updated = self.rules.replace(&obj).await.map_err(|e| {
            if e.is_not_found() {
                AdmissionError::RuleNotFound(name.to_string())
            } else {
                e
            }
        })?;
        for provider in &providers {
            provider.update_rule(&updated, &policy_obj).await?;
        }

        log::info!("Updated rule {} of policy {}", name, policy);
        Ok(v1alpha1::Rule::from(&updated))
    }

    pub async fn delete(&self, policy: &str, name: &str) -> Result<()> {
        let policy_obj = self.policy(policy)?;
        let existing = self.rule(policy, name)?;

        for provider_name in providers_of(&policy_obj.spec.targets) {
            match self.providers.get(&provider_name) {
                Ok(provider) => provider.remove_rule(&existing, &policy_obj).await?,
                Err(e) => log::warn!("Not removing rule {} from {}: {}", name, provider_name, e),
            }
        }
        self.rules.delete(name).await.map_err(|e| {
            if e.is_not_found() {
                AdmissionError::RuleNotFound(name.to_string())
            } else {
                e
            }
        })?;

        log::info!("Deleted rule {} of policy {}", name, policy);
        Ok(())
    }
}

/// The policy in the route wins; a body naming a different one is rejected
fn check_policy(policy: &str, rule: &mut v1alpha1::Rule) -> Result<()> {
    if rule.policy.is_empty() {
        rule.policy = policy.to_string();
        return Ok(());
    }
    if rule.policy != policy {
        return Err(AdmissionError::Invalid(format!(
            "rule {} names policy {} but was submitted under {}",
            rule.name, rule.policy, policy
        )));
    }
    Ok(())
}
