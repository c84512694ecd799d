use crate::bmc::catalog_bmc::{CatalogBmcTrait, FileCatalogBmc, InMemoryCatalogBmc};
use crate::bmc::nearby_set_bmc::{FileNearbySetBmc, InMemoryNearbySetBmc, NearbySetBmcTrait};
use mockall::automock;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

pub mod catalog_bmc;
pub mod nearby_set_bmc;

#[automock]
pub trait Bmc: Send + Sync + Debug {
    fn nearby_set_bmc(&self) -> Arc<dyn NearbySetBmcTrait>;
    fn catalog_bmc(&self) -> Arc<dyn CatalogBmcTrait>;
}

#[derive(Debug, Clone)]
pub struct FileBmc {
    nearby_set_bmc: Arc<FileNearbySetBmc>,
    catalog_bmc: Arc<FileCatalogBmc>,
}

impl FileBmc {
    /// Lays the cache files out below `cache_dir`.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            nearby_set_bmc: Arc::new(FileNearbySetBmc::new(cache_dir.join("nearby_systems.json"))),
            catalog_bmc: Arc::new(FileCatalogBmc::new(cache_dir.to_path_buf())),
        }
    }
}

impl Bmc for FileBmc {
    fn nearby_set_bmc(&self) -> Arc<dyn NearbySetBmcTrait> {
        self.nearby_set_bmc.clone() as Arc<dyn NearbySetBmcTrait>
    }

    fn catalog_bmc(&self) -> Arc<dyn CatalogBmcTrait> {
        self.catalog_bmc.clone() as Arc<dyn CatalogBmcTrait>
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBmc {
    pub in_mem_nearby_set_bmc: Arc<InMemoryNearbySetBmc>,
    pub in_mem_catalog_bmc: Arc<InMemoryCatalogBmc>,
}

impl Bmc for InMemoryBmc {
    fn nearby_set_bmc(&self) -> Arc<dyn NearbySetBmcTrait> {
        self.in_mem_nearby_set_bmc.clone() as Arc<dyn NearbySetBmcTrait>
    }

    fn catalog_bmc(&self) -> Arc<dyn CatalogBmcTrait> {
        self.in_mem_catalog_bmc.clone() as Arc<dyn CatalogBmcTrait>
    }
}
