//! Providers install policies and rules into an external policy engine.

pub mod gatekeeper;


use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::{Policy, Rule};
use crate::errors::{AdmissionError, Result};

pub use gatekeeper::{GatekeeperClient, GatekeeperProvider, KubeGatekeeperClient};

/// A policy engine that policies and their rules are pushed into
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the name targets use to select this provider
    fn name(&self) -> &str;

    /// Rejects a policy this provider cannot install, before anything is written
    fn validate_policy(&self, _policy: &Policy) -> Result<()> {
        Ok(())
    }

    async fn add_policy(&self, policy: &Policy) -> Result<()>;

    async fn update_policy(&self, policy: &Policy) -> Result<()>;

    async fn remove_policy(&self, policy: &Policy) -> Result<()>;

    async fn add_rule(&self, rule: &Rule, policy: &Policy) -> Result<()>;

    async fn update_rule(&self, rule: &Rule, policy: &Policy) -> Result<()>;

    async fn remove_rule(&self, rule: &Rule, policy: &Policy) -> Result<()>;
}

/// Registered providers, keyed by name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        log::info!("Registering admission provider {}", provider.name());
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AdmissionError::ProviderNotFound(name.to_string()))
    }

    /// Resolves every name, failing on the first unknown one
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Provider>>> {
        names.iter().map(|name| self.get(name)).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}
