use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, DeleteParams, PostParams};
use kube::runtime::reflector::{self, ObjectRef};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{AdmissionError, Result};

/// Read/write access to one kind of cluster-scoped resource.
///
/// Reads are served from a local cache, writes go to the API.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Returns the cached object with the given name
    fn get(&self, name: &str) -> Option<K>;

    /// Returns every cached object
    fn list(&self) -> Vec<K>;

    async fn create(&self, obj: &K) -> Result<K>;

    /// Replaces the object. `obj` must carry the resourceVersion it was read at.
    async fn replace(&self, obj: &K) -> Result<K>;

    /// Replaces the status subresource of the object
    async fn replace_status(&self, obj: &K) -> Result<K>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Returns the name of the store, for logging
    fn name(&self) -> &str;
}

/// A store backed by the Kubernetes API, with a reflector cache for reads
#[derive(Clone)]
pub struct KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    api: Api<K>,
    cache: reflector::Store<K>,
    name: String,
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    /// Creates the store and starts watching the resource in the background.
    /// Must be called from within a tokio runtime.
    pub fn new(client: Client) -> Self {
        let api: Api<K> = Api::all(client);
        let (cache, writer) = reflector::store();
        let name = format!("KubeStore ({})", K::plural(&()));

        let stream = reflector::reflector(writer, watcher(api.clone(), watcher::Config::default()))
            .default_backoff()
            .applied_objects()
            .boxed();
        let task_name = name.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                match event {
                    Ok(obj) => log::debug!("{} observed {}", task_name, obj.name_any()),
                    Err(e) => log::warn!("{} watch error: {}", task_name, e),
                }
            }
            log::error!("{} watch stream ended", task_name);
        });

        Self { api, cache, name }
    }

    /// Waits for the first full list of the resource to land in the cache
    pub async fn wait_until_ready(&self) -> anyhow::Result<()> {
        self.cache.wait_until_ready().await?;
        log::info!("{} synced {} objects", self.name, self.cache.state().len());
        Ok(())
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    fn get(&self, name: &str) -> Option<K> {
        self.cache
            .get(&ObjectRef::new(name))
            .map(|obj| obj.as_ref().clone())
    }

    fn list(&self) -> Vec<K> {
        self.cache
            .state()
            .into_iter()
            .map(|obj| obj.as_ref().clone())
            .collect()
    }

    async fn create(&self, obj: &K) -> Result<K> {
        Ok(self.api.create(&PostParams::default(), obj).await?)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        Ok(self
            .api
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?)
    }

    async fn replace_status(&self, obj: &K) -> Result<K> {
        let data = serde_json::to_vec(obj)?;
        Ok(self
            .api
            .replace_status(&obj.name_any(), &PostParams::default(), data)
            .await?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An in-memory store that follows the apiserver's create/replace/delete
/// semantics. Writes are visible to reads immediately.
pub struct MemoryStore<K> {
    objects: Arc<RwLock<BTreeMap<String, K>>>,
    resource_version: AtomicU64,
    name: String,
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            resource_version: AtomicU64::new(1),
            name: format!("MemoryStore ({})", K::plural(&())),
        }
    }

    fn next_resource_version(&self) -> String {
        self.resource_version
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }
}

impl<K> Default for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> From<Vec<K>> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync,
{
    fn from(objects: Vec<K>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.objects.write();
            for obj in objects {
                guard.insert(obj.name_any(), obj);
            }
        }
        store
    }
}

#[async_trait]
impl<K> ResourceStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync,
{
    fn get(&self, name: &str) -> Option<K> {
        self.objects.read().get(name).cloned()
    }

    fn list(&self) -> Vec<K> {
        self.objects.read().values().cloned().collect()
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let mut objects = self.objects.write();
        if objects.contains_key(&name) {
            return Err(AdmissionError::already_exists(K::kind(&()), name));
        }
        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.creation_timestamp = Some(Time(chrono::Utc::now()));
        meta.resource_version = Some(self.next_resource_version());
        objects.insert(name, created.clone());
        Ok(created)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let mut objects = self.objects.write();
        let existing = objects
            .get(&name)
            .ok_or_else(|| AdmissionError::not_found(K::kind(&()), name.clone()))?;
        let mut replaced = obj.clone();
        let meta = replaced.meta_mut();
        meta.uid = existing.meta().uid.clone();
        meta.creation_timestamp = existing.meta().creation_timestamp.clone();
        meta.resource_version = Some(self.next_resource_version());
        objects.insert(name, replaced.clone());
        Ok(replaced)
    }

    async fn replace_status(&self, obj: &K) -> Result<K> {
        self.replace(obj).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.objects.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(AdmissionError::not_found(K::kind(&()), name)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
