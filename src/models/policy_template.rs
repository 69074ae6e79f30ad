use std::sync::Arc;

use kube::ResourceExt;

use super::{check_name, Stores};
use crate::api::v1alpha1::{self, PolicyTemplateList};
use crate::crd::{Policy, PolicyTemplate};
use crate::errors::{AdmissionError, Result};
use crate::query::ListQuery;
use crate::resource_store::ResourceStore;

#[derive(Clone)]
pub struct PolicyTemplateManager {
    templates: Arc<dyn ResourceStore<PolicyTemplate>>,
    policies: Arc<dyn ResourceStore<Policy>>,
}

impl PolicyTemplateManager {
    pub fn new(stores: &Stores) -> Self {
        Self {
            templates: stores.templates.clone(),
            policies: stores.policies.clone(),
        }
    }

    pub fn list(&self, query: &ListQuery) -> PolicyTemplateList {
        query.apply(self.templates.list(), |obj| v1alpha1::PolicyTemplate::from(obj))
    }

    pub fn get(&self, name: &str) -> Result<v1alpha1::PolicyTemplate> {
        self.templates
            .get(name)
            .map(|template| v1alpha1::PolicyTemplate::from(&template))
            .ok_or_else(|| AdmissionError::PolicyTemplateNotFound(name.to_string()))
    }

    pub async fn create(
        &self,
        template: v1alpha1::PolicyTemplate,
    ) -> Result<v1alpha1::PolicyTemplate> {
        template.validate()?;
        if self.templates.get(&template.name).is_some() {
            return Err(AdmissionError::already_exists("PolicyTemplate", &template.name));
        }
        let created = self.templates.create(&PolicyTemplate::from(&template)).await?;
        log::info!("Created policy template {}", created.name_any());
        Ok(v1alpha1::PolicyTemplate::from(&created))
    }

    pub async fn update(
        &self,
        name: &str,
        mut template: v1alpha1::PolicyTemplate,
    ) -> Result<v1alpha1::PolicyTemplate> {
        check_name(name, &mut template.name)?;
        template.validate()?;
        let existing = self
            .templates
            .get(name)
            .ok_or_else(|| AdmissionError::PolicyTemplateNotFound(name.to_string()))?;

        let mut obj = PolicyTemplate::from(&template);
        obj.metadata.resource_version = existing.metadata.resource_version.clone();
        let updated = self.templates.replace(&obj).await.map_err(|e| {
            if e.is_not_found() {
                AdmissionError::PolicyTemplateNotFound(name.to_string())
            } else {
                e
            }
        })?;
        log::info!("Updated policy template {}", name);
        Ok(v1alpha1::PolicyTemplate::from(&updated))
    }

    /// Deletes the template. Refused while any policy still uses it.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if self.templates.get(name).is_none() {
            return Err(AdmissionError::PolicyTemplateNotFound(name.to_string()));
        }
        let users: Vec<String> = self
            .policies
            .list()
            .iter()
            .filter(|policy| policy.spec.policy_template == name)
            .map(|policy| policy.name_any())
            .collect();
        if !users.is_empty() {
            return Err(AdmissionError::Invalid(format!(
                "policy template {} is used by policies {}",
                name,
                users.join(", ")
            )));
        }
        self.templates.delete(name).await.map_err(|e| {
            if e.is_not_found() {
                AdmissionError::PolicyTemplateNotFound(name.to_string())
            } else {
                e
            }
        })?;
        log::info!("Deleted policy template {}", name);
        Ok(())
    }
}
