use crate::esi_client::EsiClientTrait;
use anyhow::Result;
use ems_domain::{ConstellationId, ConstellationInfo, RegionId, StargateId, StargateLink, SystemId, SystemNode, TypeId, TypeInfo};
use ems_store::EntityCacheData;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, event, Level};

/// Memoizes the static part of the universe (systems, constellations, stargates, item types and
/// names) in front of the ESI client. Entries never expire; `clear` drops all of them.
///
/// One instance is created per process and shared by every scan. The lock is never held across a
/// network call, so two scans may fetch the same entity concurrently; the second insert wins and is
/// identical.
#[derive(Debug)]
pub struct EntityCache {
    client: Arc<dyn EsiClientTrait>,
    path: Option<PathBuf>,
    data: Mutex<EntityCacheData>,
}

impl EntityCache {
    /// Backed by the json file at `path`; starts empty when it doesn't exist yet.
    pub async fn load(client: Arc<dyn EsiClientTrait>, path: PathBuf) -> Result<Self> {
        let data = EntityCacheData::load(&path).await?;
        debug!("Loaded {} entity cache entries from {}", data.num_entries(), path.display());
        Ok(Self {
            client,
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    pub fn in_memory(client: Arc<dyn EsiClientTrait>) -> Self {
        Self {
            client,
            path: None,
            data: Mutex::new(EntityCacheData::default()),
        }
    }

    pub fn client(&self) -> Arc<dyn EsiClientTrait> {
        Arc::clone(&self.client)
    }

    async fn cached_or_fetch<K, V, Fut>(&self, key: K, section: fn(&mut EntityCacheData) -> &mut BTreeMap<K, V>, fetch: impl FnOnce() -> Fut) -> Result<V>
    where
        K: Ord + Copy,
        V: Clone,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(hit) = section(&mut *self.data.lock().await).get(&key).cloned() {
            return Ok(hit);
        }
        let fetched = fetch().await?;
        section(&mut *self.data.lock().await).insert(key, fetched.clone());
        Ok(fetched)
    }

    pub async fn get_system(&self, system_id: SystemId) -> Result<SystemNode> {
        self.cached_or_fetch(system_id, |d| &mut d.systems, || self.client.get_system(system_id))
            .await
    }

    pub async fn get_constellation(&self, constellation_id: ConstellationId) -> Result<ConstellationInfo> {
        self.cached_or_fetch(constellation_id, |d| &mut d.constellations, || self.client.get_constellation(constellation_id))
            .await
    }

    pub async fn get_stargate(&self, stargate_id: StargateId) -> Result<StargateLink> {
        self.cached_or_fetch(stargate_id, |d| &mut d.stargates, || self.client.get_stargate(stargate_id))
            .await
    }

    pub async fn get_type(&self, type_id: TypeId) -> Result<TypeInfo> {
        self.cached_or_fetch(type_id, |d| &mut d.types, || self.client.get_type(type_id))
            .await
    }

    /// The region a system belongs to, via its constellation. `None` when ESI doesn't report one.
    pub async fn region_of(&self, system: &SystemNode) -> Result<Option<RegionId>> {
        match system.constellation_id {
            None => Ok(None),
            Some(constellation_id) => Ok(self.get_constellation(constellation_id).await?.region_id),
        }
    }

    /// Exact-name lookup of a solar system. Hits are memoized; misses are not.
    pub async fn resolve_system_id(&self, name: &str) -> Result<Option<SystemId>> {
        let memo_key = name.trim().to_lowercase();
        if let Some(system_id) = self.data.lock().await.system_ids_by_name.get(&memo_key).copied() {
            return Ok(Some(system_id));
        }

        let response = self.client.search_system(name.trim()).await?;
        let maybe_system_id = response.solar_system.and_then(|ids| ids.first().copied());
        if let Some(system_id) = maybe_system_id {
            self.data.lock().await.system_ids_by_name.insert(memo_key, system_id);
        }
        Ok(maybe_system_id)
    }

    /// Names for `ids`; only ids not seen before are sent to ESI. Ids ESI doesn't know are absent
    /// from the returned map.
    pub async fn resolve_names(&self, ids: &[u64]) -> Result<BTreeMap<u64, String>> {
        let missing = {
            let data = self.data.lock().await;
            ids.iter().copied().filter(|id| !data.names.contains_key(id)).unique().collect_vec()
        };

        if !missing.is_empty() {
            event!(Level::DEBUG, "Resolving {} names", missing.len());
            let resolved = self.client.resolve_names(missing).await?;
            let mut data = self.data.lock().await;
            for entry in resolved {
                data.names.insert(entry.id, entry.name);
            }
        }

        let data = self.data.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.names.get(id).map(|name| (*id, name.clone())))
            .collect())
    }

    pub async fn clear(&self) {
        *self.data.lock().await = EntityCacheData::default();
    }

    /// Rewrites the backing file. The lock is held for the whole write so concurrent saves don't
    /// interleave.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = self.data.lock().await;
        data.save(path).await?;
        debug!("Saved {} entity cache entries to {}", data.num_entries(), path.display());
        Ok(())
    }

    pub async fn num_entries(&self) -> usize {
        self.data.lock().await.num_entries()
    }
}
