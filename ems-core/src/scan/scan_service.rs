use crate::configuration::ScannerConfiguration;
use crate::entity_cache::EntityCache;
use crate::esi_client::EsiClient;
use crate::reqwest_helpers::create_client;
use crate::scan::orchestrator::{ScanOrchestrator, ScanRequest};
use crate::scan::scan_error::ScanError;
use anyhow::Result;
use ems_domain::ScanResult;
use ems_store::FileBmc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Recent scan results by request, kept for `ttl`. Expired entries are evicted on every access.
#[derive(Debug)]
pub struct ScanResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, ScanResult)>>,
}

impl ScanResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical json of the request; refresh flags are not part of it.
    pub fn key_for(request: &ScanRequest) -> Result<String> {
        Ok(serde_json::to_string(request)?)
    }

    pub async fn get(&self, key: &str) -> Option<ScanResult> {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries);
        entries.get(key).map(|(_, result)| result.clone())
    }

    pub async fn insert(&self, key: String, result: ScanResult) {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries);
        entries.insert(key, (Instant::now(), result));
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn evict_expired(&self, entries: &mut HashMap<String, (Instant, ScanResult)>) {
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
    }
}

/// Entry point for interactive scans: the orchestrator behind a short-lived result cache.
#[derive(Debug)]
pub struct ScanService {
    orchestrator: Arc<ScanOrchestrator>,
    result_cache: ScanResultCache,
}

impl ScanService {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, result_cache: ScanResultCache) -> Self {
        Self { orchestrator, result_cache }
    }

    /// Wires up the ESI client, the entity cache file and the cache directory stores.
    pub async fn from_configuration(cfg: &ScannerConfiguration) -> Result<Self> {
        let client = create_client(cfg)?;
        let esi_client = EsiClient::new(client, cfg.esi_base_url.clone());
        let entity_cache = EntityCache::load(Arc::new(esi_client), cfg.entity_cache_path()).await?;
        let orchestrator = ScanOrchestrator::new(Arc::new(entity_cache), Arc::new(FileBmc::new(&cfg.cache_dir)));
        Ok(Self::new(Arc::new(orchestrator), ScanResultCache::new(cfg.scan_cache_ttl)))
    }

    pub fn orchestrator(&self) -> Arc<ScanOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// A fresh result is cached; while it lives, equal requests get it back with `cached` set.
    /// Any refresh flag skips the lookup but still stores the new result.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let key = ScanResultCache::key_for(request).map_err(ScanError::Storage)?;

        if !request.refresh.any() {
            if let Some(mut hit) = self.result_cache.get(&key).await {
                debug!("Scan result cache hit for {}", request.start_system);
                hit.cached = true;
                return Ok(hit);
            }
        }

        let result = self.orchestrator.run_scan(request).await?;
        self.result_cache.insert(key, result.clone()).await;
        Ok(result)
    }
}
