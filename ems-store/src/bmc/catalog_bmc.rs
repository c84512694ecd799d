use crate::fs_helpers::{read_json_opt, write_json_atomic};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ems_domain::{RegionId, TypeId};
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tradable item ids of one region. Never expires; replaced only by a forced refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub region_id: RegionId,
    pub fetched_at: DateTime<Utc>,
    pub types: Vec<TypeId>,
}

#[automock]
#[async_trait]
pub trait CatalogBmcTrait: Send + Sync + Debug {
    async fn get_region_types(&self, region_id: RegionId) -> Result<Option<CatalogEntry>>;
    async fn save_region_types(&self, entry: &CatalogEntry) -> Result<()>;
}

/// One file per region below `dir`.
#[derive(Debug)]
pub struct FileCatalogBmc {
    pub(crate) dir: PathBuf,
}

impl FileCatalogBmc {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, region_id: RegionId) -> PathBuf {
        self.dir.join(format!("types_region_{}.json", region_id.0))
    }
}

#[async_trait]
impl CatalogBmcTrait for FileCatalogBmc {
    async fn get_region_types(&self, region_id: RegionId) -> Result<Option<CatalogEntry>> {
        let maybe_entry: Option<CatalogEntry> = read_json_opt(&self.path_for(region_id)).await?;
        Ok(maybe_entry.filter(|entry| entry.region_id == region_id))
    }

    async fn save_region_types(&self, entry: &CatalogEntry) -> Result<()> {
        write_json_atomic(&self.path_for(entry.region_id), entry).await
    }
}

#[derive(Debug)]
pub struct InMemoryCatalogBmc {
    entries: Arc<RwLock<HashMap<RegionId, CatalogEntry>>>,
}

impl Default for InMemoryCatalogBmc {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalogBmc {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl CatalogBmcTrait for InMemoryCatalogBmc {
    async fn get_region_types(&self, region_id: RegionId) -> Result<Option<CatalogEntry>> {
        Ok(self.entries.read().await.get(&region_id).cloned())
    }

    async fn save_region_types(&self, entry: &CatalogEntry) -> Result<()> {
        self.entries.write().await.insert(entry.region_id, entry.clone());
        Ok(())
    }
}
