use crate::esi_client::{EsiClientTrait, EsiPage};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ems_domain::{
    ConstellationId, ConstellationInfo, MarketOrder, NameEntry, OrderSide, RegionId, SearchResponse, StargateDestination, StargateId, StargateLink, SystemId,
    SystemNode, TypeId, TypeInfo,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// A hand-built universe for tests: systems, gates, constellations, item types and order books.
#[derive(Debug, Clone)]
pub struct InMemoryUniverse {
    pub systems: BTreeMap<SystemId, SystemNode>,
    pub constellations: BTreeMap<ConstellationId, ConstellationInfo>,
    pub stargates: BTreeMap<StargateId, StargateLink>,
    pub types: BTreeMap<TypeId, TypeInfo>,
    pub names: BTreeMap<u64, String>,
    pub region_types: BTreeMap<RegionId, Vec<TypeId>>,
    pub orders: BTreeMap<RegionId, Vec<MarketOrder>>,
    pub page_size: usize,
    system_constellations: BTreeMap<SystemId, ConstellationId>,
    next_stargate_id: u64,
    next_order_id: u64,
}

impl Default for InMemoryUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUniverse {
    pub fn new() -> Self {
        Self {
            systems: BTreeMap::new(),
            constellations: BTreeMap::new(),
            stargates: BTreeMap::new(),
            types: BTreeMap::new(),
            names: BTreeMap::new(),
            region_types: BTreeMap::new(),
            orders: BTreeMap::new(),
            page_size: 1000,
            system_constellations: BTreeMap::new(),
            next_stargate_id: 50_000_001,
            next_order_id: 6_000_000_001,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Puts the given systems into one constellation of `region_id`. Call before `add_system`.
    pub fn add_region(&mut self, region_id: RegionId, system_ids: &[u64]) {
        let constellation_id = ConstellationId(region_id.0 * 100);
        self.constellations.insert(
            constellation_id,
            ConstellationInfo {
                constellation_id,
                name: None,
                region_id: Some(region_id),
            },
        );
        for system_id in system_ids {
            self.system_constellations.insert(SystemId(*system_id), constellation_id);
        }
    }

    pub fn add_system(&mut self, system_id: u64, name: &str, security_status: f64) {
        let system_id = SystemId(system_id);
        self.systems.insert(
            system_id,
            SystemNode {
                system_id,
                name: name.to_string(),
                security_status,
                constellation_id: self.system_constellations.get(&system_id).copied(),
                stargates: Some(vec![]),
            },
        );
        self.names.insert(system_id.0, name.to_string());
    }

    /// Adds a pair of stargates linking `a` and `b`.
    pub fn connect(&mut self, a: u64, b: u64) {
        let gate_a = StargateId(self.next_stargate_id);
        let gate_b = StargateId(self.next_stargate_id + 1);
        self.next_stargate_id += 2;

        for (gate, from, to, other_gate) in [(gate_a, a, b, gate_b), (gate_b, b, a, gate_a)] {
            self.stargates.insert(
                gate,
                StargateLink {
                    stargate_id: gate,
                    destination: Some(StargateDestination {
                        stargate_id: Some(other_gate),
                        system_id: Some(SystemId(to)),
                    }),
                },
            );
            if let Some(system) = self.systems.get_mut(&SystemId(from)) {
                system.stargates.get_or_insert_with(Vec::new).push(gate);
            }
        }
    }

    /// Registers an item type and lists it in the catalog of `region_id`.
    pub fn add_type(&mut self, region_id: RegionId, type_id: u64, name: &str, packaged_volume: Option<f64>) {
        let type_id = TypeId(type_id);
        self.types.insert(
            type_id,
            TypeInfo {
                type_id,
                name: Some(name.to_string()),
                volume: packaged_volume,
                packaged_volume,
            },
        );
        self.names.insert(type_id.0, name.to_string());
        self.region_types.entry(region_id).or_default().push(type_id);
    }

    pub fn add_order(&mut self, region_id: RegionId, system_id: u64, type_id: u64, side: OrderSide, price: f64, volume_remain: u64) {
        let order_id = self.next_order_id;
        self.next_order_id += 1;
        self.orders.entry(region_id).or_default().push(MarketOrder {
            order_id: Some(order_id),
            type_id: Some(TypeId(type_id)),
            system_id: Some(SystemId(system_id)),
            location_id: Some(60_000_000 + system_id),
            price: Some(price),
            volume_remain,
            is_buy_order: Some(side == OrderSide::Buy),
        });
    }

    pub fn into_client(self) -> InMemoryEsiClient {
        InMemoryEsiClient::new(self)
    }

    fn page<T: Clone>(&self, all: &[T], page: u32) -> EsiPage<T> {
        let total_pages = all.len().div_ceil(self.page_size).max(1);
        let start = (page.saturating_sub(1) as usize) * self.page_size;
        let data = all.iter().skip(start).take(self.page_size).cloned().collect();
        EsiPage {
            data,
            total_pages: Some(total_pages as u32),
        }
    }
}

/// Serves an [`InMemoryUniverse`] through [`EsiClientTrait`] and counts calls per endpoint.
#[derive(Debug, Clone)]
pub struct InMemoryEsiClient {
    pub universe: Arc<RwLock<InMemoryUniverse>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    latency: Duration,
}

impl InMemoryEsiClient {
    pub fn new(universe: InMemoryUniverse) -> Self {
        Self {
            universe: Arc::new(RwLock::new(universe)),
            calls: Arc::new(Mutex::new(HashMap::new())),
            latency: Duration::ZERO,
        }
    }

    /// Every call waits `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn record(&self, endpoint: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(endpoint).or_default() += 1;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(endpoint).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EsiClientTrait for InMemoryEsiClient {
    async fn get_system(&self, system_id: SystemId) -> Result<SystemNode> {
        self.record("get_system").await;
        self.universe
            .read()
            .await
            .systems
            .get(&system_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 system {} not found", system_id))
    }

    async fn get_constellation(&self, constellation_id: ConstellationId) -> Result<ConstellationInfo> {
        self.record("get_constellation").await;
        self.universe
            .read()
            .await
            .constellations
            .get(&constellation_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 constellation {} not found", constellation_id))
    }

    async fn get_stargate(&self, stargate_id: StargateId) -> Result<StargateLink> {
        self.record("get_stargate").await;
        self.universe
            .read()
            .await
            .stargates
            .get(&stargate_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 stargate {} not found", stargate_id))
    }

    async fn get_type(&self, type_id: TypeId) -> Result<TypeInfo> {
        self.record("get_type").await;
        self.universe
            .read()
            .await
            .types
            .get(&type_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 type {} not found", type_id))
    }

    async fn search_system(&self, name: &str) -> Result<SearchResponse> {
        self.record("search_system").await;
        let universe = self.universe.read().await;
        let hits: Vec<SystemId> = universe
            .systems
            .values()
            .filter(|system| system.name.eq_ignore_ascii_case(name))
            .map(|system| system.system_id)
            .collect();
        Ok(SearchResponse {
            solar_system: (!hits.is_empty()).then_some(hits),
        })
    }

    async fn resolve_names(&self, ids: Vec<u64>) -> Result<Vec<NameEntry>> {
        self.record("resolve_names").await;
        let universe = self.universe.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                universe.names.get(id).map(|name| NameEntry {
                    id: *id,
                    name: name.clone(),
                    category: None,
                })
            })
            .collect())
    }

    async fn list_market_types_page(&self, region_id: RegionId, page: u32) -> Result<EsiPage<TypeId>> {
        self.record("list_market_types_page").await;
        let universe = self.universe.read().await;
        let all = universe.region_types.get(&region_id).cloned().unwrap_or_default();
        Ok(universe.page(&all, page))
    }

    async fn list_region_orders_page(&self, region_id: RegionId, side: OrderSide, type_id: TypeId, page: u32) -> Result<EsiPage<MarketOrder>> {
        self.record("list_region_orders_page").await;
        let universe = self.universe.read().await;
        let matching: Vec<MarketOrder> = universe
            .orders
            .get(&region_id)
            .map(|orders| {
                orders
                    .iter()
                    .filter(|o| o.type_id == Some(type_id) && o.side() == Some(side))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(universe.page(&matching, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_split_by_page_size() -> Result<()> {
        let mut universe = InMemoryUniverse::new().with_page_size(2);
        for type_id in 1..=5 {
            universe.add_type(RegionId(10), type_id, "Item", Some(1.0));
        }
        let client = universe.into_client();

        let third = client.list_market_types_page(RegionId(10), 3).await?;
        assert_eq!(third.data, vec![TypeId(5)]);
        assert_eq!(third.total_pages, Some(3));
        assert_eq!(client.calls("list_market_types_page"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn gates_link_both_directions() -> Result<()> {
        let mut universe = InMemoryUniverse::new();
        universe.add_system(1, "A", 1.0);
        universe.add_system(2, "B", 1.0);
        universe.connect(1, 2);
        let client = universe.into_client();

        let a = client.get_system(SystemId(1)).await?;
        let gate = client.get_stargate(a.stargate_ids()[0]).await?;
        assert_eq!(gate.destination_system_id(), Some(SystemId(2)));

        let b = client.get_system(SystemId(2)).await?;
        let back = client.get_stargate(b.stargate_ids()[0]).await?;
        assert_eq!(back.destination_system_id(), Some(SystemId(1)));
        Ok(())
    }
}
