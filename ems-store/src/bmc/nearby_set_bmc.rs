use crate::fs_helpers::{read_json_opt, write_json_atomic};
use anyhow::Result;
use async_trait::async_trait;
use ems_domain::{NearbySetKey, NearbySetResult};
use mockall::automock;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Holds at most one nearby-set per backing store. A lookup only hits when start system, max jumps
/// and min security all equal the stored key; a cached set with a larger depth is not reused.
#[automock]
#[async_trait]
pub trait NearbySetBmcTrait: Send + Sync + Debug {
    async fn get(&self, key: &NearbySetKey) -> Result<Option<NearbySetResult>>;
    async fn put(&self, nearby_set: &NearbySetResult) -> Result<()>;
}

#[derive(Debug)]
pub struct FileNearbySetBmc {
    pub(crate) path: PathBuf,
}

impl FileNearbySetBmc {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl NearbySetBmcTrait for FileNearbySetBmc {
    async fn get(&self, key: &NearbySetKey) -> Result<Option<NearbySetResult>> {
        let maybe_cached: Option<NearbySetResult> = read_json_opt(&self.path).await?;
        match maybe_cached {
            Some(cached) if cached.matches(key) => Ok(Some(cached)),
            Some(cached) => {
                debug!("Nearby-set cache miss: stored key {:?} != requested key {:?}", cached.key(), key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, nearby_set: &NearbySetResult) -> Result<()> {
        write_json_atomic(&self.path, nearby_set).await
    }
}

#[derive(Debug)]
pub struct InMemoryNearbySetBmc {
    entry: Arc<RwLock<Option<NearbySetResult>>>,
}

impl Default for InMemoryNearbySetBmc {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNearbySetBmc {
    pub fn new() -> Self {
        Self {
            entry: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait]
impl NearbySetBmcTrait for InMemoryNearbySetBmc {
    async fn get(&self, key: &NearbySetKey) -> Result<Option<NearbySetResult>> {
        let guard = self.entry.read().await;
        Ok(guard.as_ref().filter(|cached| cached.matches(key)).cloned())
    }

    async fn put(&self, nearby_set: &NearbySetResult) -> Result<()> {
        let mut guard = self.entry.write().await;
        *guard = Some(nearby_set.clone());
        Ok(())
    }
}
