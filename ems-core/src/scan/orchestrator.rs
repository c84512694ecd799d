use crate::deadline::Deadline;
use crate::entity_cache::EntityCache;
use crate::esi_client::EsiClientTrait;
use crate::market::catalog::region_types;
use crate::market::order_book::{best_cross_system, cheapest_local_sell};
use crate::scan::item_sample::{sample_items, DEFAULT_SAMPLE_SEED};
use crate::scan::scan_error::ScanError;
use crate::scoring::arbitrage_scorer::{score, Candidate, FeeSchedule, ScoringLimits};
use crate::universe::load_or_scan_nearby_set;
use chrono::Utc;
use ems_domain::{
    NearbySetKey, NearbySetResult, OpportunityMode, OrderSide, RegionId, ScanMode, ScanResult, ScanResults, SystemId, TypeId, DEFAULT_START_SYSTEM,
};
use ems_store::Bmc;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{event, info, Level};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshFlags {
    /// Drop the entity cache before scanning.
    pub cache: bool,
    pub nearby: bool,
    pub types: bool,
}

impl RefreshFlags {
    pub fn any(&self) -> bool {
        self.cache || self.nearby || self.types
    }
}

/// Inputs of one scan. Serializes to the key of the scan-result cache, so refresh flags are left
/// out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRequest {
    /// System name or numeric id; blank means Jita.
    pub start_system: String,
    pub budget: f64,
    pub max_jumps: u32,
    pub min_security: f64,
    pub min_margin_pct: f64,
    /// 0 scans the whole catalog.
    pub sample_size: usize,
    pub types_pages: u32,
    pub order_pages: u32,
    /// Page cap of the home-system ask lookup; defaults to `order_pages`.
    pub home_order_pages: Option<u32>,
    /// Highest home price worth buying at; 0 means the budget.
    pub max_price: f64,
    pub mode: ScanMode,
    pub tax_pct: f64,
    pub broker_pct: f64,
    /// 0 keeps every result.
    pub limit: usize,
    pub max_runtime_sec: Option<f64>,
    pub sample_seed: Option<u64>,
    pub cargo_volume: Option<f64>,
    pub min_profit_per_jump: Option<f64>,
    /// Keep drawing from the unsampled catalog until this many opportunities were found.
    pub min_results: usize,
    #[serde(skip)]
    pub refresh: RefreshFlags,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            start_system: "Jita".to_string(),
            budget: 10_000_000.0,
            max_jumps: 10,
            min_security: 0.5,
            min_margin_pct: 8.0,
            sample_size: 160,
            types_pages: 0,
            order_pages: 3,
            home_order_pages: None,
            max_price: 0.0,
            mode: ScanMode::Both,
            tax_pct: 2.0,
            broker_pct: 3.0,
            limit: 40,
            max_runtime_sec: None,
            sample_seed: None,
            cargo_volume: None,
            min_profit_per_jump: None,
            min_results: 0,
            refresh: RefreshFlags::default(),
        }
    }
}

/// Everything a single item evaluation needs that stays fixed for the whole scan.
struct ScanContext<'a> {
    client: &'a dyn EsiClientTrait,
    request: &'a ScanRequest,
    home_system_id: SystemId,
    home_region_id: RegionId,
    nearby_set: &'a NearbySetResult,
    max_price: f64,
    home_order_pages: u32,
    limits: ScoringLimits,
}

/// Runs one scan against the shared caches.
#[derive(Debug, Clone)]
pub struct ScanOrchestrator {
    entity_cache: Arc<EntityCache>,
    bmc: Arc<dyn Bmc>,
}

impl ScanOrchestrator {
    pub fn new(entity_cache: Arc<EntityCache>, bmc: Arc<dyn Bmc>) -> Self {
        Self { entity_cache, bmc }
    }

    pub async fn run_scan(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let deadline = request.max_runtime_sec.map(Deadline::after_secs).unwrap_or_else(Deadline::unbounded);

        if request.refresh.cache {
            self.entity_cache.clear().await;
        }

        let home_system_id = self.resolve_start_system(&request.start_system).await?;
        let home_system = self.entity_cache.get_system(home_system_id).await.map_err(ScanError::Transport)?;
        let constellation_id = home_system
            .constellation_id
            .ok_or_else(|| ScanError::Resolution("Could not resolve start system constellation".to_string()))?;
        let home_region_id = self
            .entity_cache
            .get_constellation(constellation_id)
            .await
            .map_err(ScanError::Transport)?
            .region_id
            .ok_or_else(|| ScanError::Resolution("Could not resolve start system region".to_string()))?;

        let key = NearbySetKey {
            start_system_id: home_system_id,
            max_jumps: request.max_jumps,
            min_security: request.min_security,
        };
        let (nearby_set, bfs_partial) = load_or_scan_nearby_set(self.bmc.nearby_set_bmc().as_ref(), &self.entity_cache, &key, request.refresh.nearby, &deadline).await?;
        if nearby_set.region_to_systems.is_empty() {
            return Err(ScanError::EmptyResult(format!("No reachable regions within {} jumps of {}", request.max_jumps, home_system.name)));
        }

        let client = self.entity_cache.client();
        let catalog = region_types(client.as_ref(), self.bmc.catalog_bmc().as_ref(), home_region_id, request.types_pages, request.refresh.types).await?;
        if catalog.is_empty() {
            return Err(ScanError::EmptyResult("No market types found".to_string()));
        }

        let sample = sample_items(&catalog, request.sample_size, request.sample_seed.unwrap_or(DEFAULT_SAMPLE_SEED));

        let ctx = ScanContext {
            client: client.as_ref(),
            request,
            home_system_id,
            home_region_id,
            nearby_set: &nearby_set,
            max_price: if request.max_price > 0.0 { request.max_price } else { request.budget },
            home_order_pages: request.home_order_pages.unwrap_or(request.order_pages),
            limits: ScoringLimits {
                budget: request.budget,
                min_margin_pct: request.min_margin_pct,
                fees: FeeSchedule {
                    tax_pct: request.tax_pct,
                    broker_pct: request.broker_pct,
                },
                cargo_volume: request.cargo_volume.filter(|cargo| *cargo > 0.0),
                min_profit_per_jump: request.min_profit_per_jump,
            },
        };

        let mut results = ScanResults::default();
        let mut partial = bfs_partial;
        let mut items_scanned = 0;
        let mut sample_size = sample.primary.len();

        for type_id in sample.primary.iter().copied() {
            if deadline.is_expired() {
                partial = true;
                break;
            }
            self.evaluate_item(&ctx, type_id, &mut results).await?;
            items_scanned += 1;
        }

        if !partial && results.len() < request.min_results {
            event!(Level::DEBUG, "{} of {} wanted opportunities found, drawing from {} overflow items", results.len(), request.min_results, sample.overflow.len());
            for type_id in sample.overflow.iter().copied() {
                if results.len() >= request.min_results {
                    break;
                }
                if deadline.is_expired() {
                    partial = true;
                    break;
                }
                sample_size += 1;
                self.evaluate_item(&ctx, type_id, &mut results).await?;
                items_scanned += 1;
            }
        }

        self.attach_type_names(&mut results).await?;
        for list in [&mut results.instant, &mut results.list] {
            list.sort_by_key(|record| Reverse(OrderedFloat(record.total_profit)));
            if request.limit > 0 {
                list.truncate(request.limit);
            }
        }

        self.entity_cache.save().await.map_err(ScanError::Storage)?;

        let runtime = deadline.elapsed();
        info!(
            "Scan from {} done in {:.1}s: {} items, {} instant, {} list, partial: {}",
            home_system.name,
            runtime.as_secs_f64(),
            items_scanned,
            results.instant.len(),
            results.list.len(),
            partial
        );

        Ok(ScanResult {
            generated_at: Utc::now(),
            start_system_id: home_system_id,
            start_system_name: home_system.name,
            start_region_id: home_region_id,
            budget: request.budget,
            max_jumps: request.max_jumps,
            min_security: request.min_security,
            min_margin_pct: request.min_margin_pct,
            mode: request.mode,
            sample_size,
            items_scanned,
            regions: nearby_set.regions(),
            partial,
            runtime_sec: runtime.as_secs_f64(),
            cached: false,
            results,
        })
    }

    /// Digits only is an id, blank is Jita, anything else is looked up by exact name.
    async fn resolve_start_system(&self, start_system: &str) -> Result<SystemId, ScanError> {
        let trimmed = start_system.trim();
        if trimmed.is_empty() {
            return Ok(DEFAULT_START_SYSTEM);
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            return trimmed
                .parse::<u64>()
                .map(SystemId)
                .map_err(|_| ScanError::Resolution(format!("Unknown start system: {}", start_system)));
        }
        self.entity_cache
            .resolve_system_id(trimmed)
            .await
            .map_err(ScanError::Transport)?
            .ok_or_else(|| ScanError::Resolution(format!("Unknown start system: {}", start_system)))
    }

    async fn evaluate_item(&self, ctx: &ScanContext<'_>, type_id: TypeId, results: &mut ScanResults) -> Result<(), ScanError> {
        let type_info = self.entity_cache.get_type(type_id).await.map_err(ScanError::Transport)?;
        let Some(unit_volume) = type_info.unit_volume().filter(|v| *v > 0.0) else {
            event!(Level::TRACE, "Skipping type {}: no volume", type_id);
            return Ok(());
        };

        let home = cheapest_local_sell(ctx.client, ctx.home_region_id, ctx.home_system_id, type_id, ctx.home_order_pages)
            .await
            .map_err(ScanError::Transport)?;
        let Some(home) = home.filter(|h| h.price <= ctx.max_price) else {
            event!(Level::TRACE, "Skipping type {}: no home ask at or below {}", type_id, ctx.max_price);
            return Ok(());
        };

        let wanted = [
            (OpportunityMode::Instant, OrderSide::Buy, ctx.request.mode.includes_instant()),
            (OpportunityMode::List, OrderSide::Sell, ctx.request.mode.includes_list()),
        ];
        for (mode, side, _) in wanted.into_iter().filter(|(_, _, enabled)| *enabled) {
            let best = best_cross_system(ctx.client, &ctx.nearby_set.region_to_systems, side, type_id, ctx.request.order_pages)
                .await
                .map_err(ScanError::Transport)?;
            let Some(target) = best else {
                continue;
            };
            let Some(target_system) = ctx.nearby_set.systems.get(&target.system_id) else {
                continue;
            };

            let candidate = Candidate {
                mode,
                type_id,
                home_system_id: ctx.home_system_id,
                home,
                target,
                target_system,
                unit_volume: Some(unit_volume),
            };
            match score(&candidate, &ctx.limits) {
                Ok(record) => match mode {
                    OpportunityMode::Instant => results.instant.push(record),
                    OpportunityMode::List => results.list.push(record),
                },
                Err(rejection) => event!(Level::TRACE, "Rejected {} {} to {}: {}", mode, type_id, target.system_id, rejection),
            }
        }
        Ok(())
    }

    /// Type names for every record; ids ESI can't name keep their number as name.
    async fn attach_type_names(&self, results: &mut ScanResults) -> Result<(), ScanError> {
        let ids = results.iter().map(|record| record.type_id.0).sorted().dedup().collect_vec();
        if ids.is_empty() {
            return Ok(());
        }
        let names = self.entity_cache.resolve_names(&ids).await.map_err(ScanError::Transport)?;
        for record in results.iter_mut() {
            record.type_name = Some(names.get(&record.type_id.0).cloned().unwrap_or_else(|| record.type_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_universe::{InMemoryEsiClient, InMemoryUniverse};
    use anyhow::Result;
    use ems_store::{FileBmc, InMemoryBmc};
    use test_log::test;

    const FORGE: RegionId = RegionId(10000002);
    const METROPOLIS: RegionId = RegionId(10000042);

    /// Home 1 (Jita) - 2 - 3 in the Forge, 3 - 4 into Metropolis, plus a lowsec dead end 5 off 2.
    fn trade_universe() -> InMemoryUniverse {
        let mut universe = InMemoryUniverse::new();
        universe.add_region(FORGE, &[1, 2, 3, 5]);
        universe.add_region(METROPOLIS, &[4]);
        universe.add_system(1, "Jita", 0.95);
        universe.add_system(2, "Perimeter", 0.9);
        universe.add_system(3, "Urlen", 0.8);
        universe.add_system(4, "Hek", 0.5);
        universe.add_system(5, "Lowsec", 0.1);
        universe.connect(1, 2);
        universe.connect(2, 3);
        universe.connect(3, 4);
        universe.connect(2, 5);

        // Tritanium: cheap at home, best bid in Hek
        universe.add_type(FORGE, 34, "Tritanium", Some(0.5));
        universe.add_order(FORGE, 1, 34, OrderSide::Sell, 100.0, 5_000);
        universe.add_order(FORGE, 1, 34, OrderSide::Buy, 120.0, 5_000);
        universe.add_order(METROPOLIS, 4, 34, OrderSide::Buy, 150.0, 1_000);
        universe.add_order(FORGE, 5, 34, OrderSide::Buy, 900.0, 1_000);

        // Pyerite: bid in Perimeter, sell floors at home (100), Perimeter (120) and Urlen (140)
        universe.add_type(FORGE, 35, "Pyerite", Some(0.5));
        universe.add_order(FORGE, 1, 35, OrderSide::Sell, 100.0, 5_000);
        universe.add_order(FORGE, 2, 35, OrderSide::Buy, 120.0, 10_000);
        universe.add_order(FORGE, 2, 35, OrderSide::Sell, 120.0, 10);
        universe.add_order(FORGE, 3, 35, OrderSide::Sell, 140.0, 10);
        universe.add_order(FORGE, 3, 35, OrderSide::Sell, 160.0, 10);

        // Mexallon: no home ask
        universe.add_type(FORGE, 36, "Mexallon", Some(0.01));
        universe.add_order(METROPOLIS, 4, 36, OrderSide::Buy, 1_000.0, 10);

        // Isogen: the only bid sits in the home system
        universe.add_type(FORGE, 37, "Isogen", Some(0.01));
        universe.add_order(FORGE, 1, 37, OrderSide::Sell, 100.0, 10);
        universe.add_order(FORGE, 1, 37, OrderSide::Buy, 300.0, 10);

        universe
    }

    fn orchestrator(client: Arc<InMemoryEsiClient>) -> ScanOrchestrator {
        ScanOrchestrator::new(Arc::new(EntityCache::in_memory(client)), Arc::new(InMemoryBmc::default()))
    }

    fn request(start_system: &str) -> ScanRequest {
        ScanRequest {
            start_system: start_system.to_string(),
            budget: 1_000_000.0,
            max_jumps: 3,
            min_security: 0.5,
            sample_size: 0,
            ..ScanRequest::default()
        }
    }

    #[test(tokio::test)]
    async fn finds_instant_and_list_routes_sorted_by_total_profit() -> Result<()> {
        let client = Arc::new(trade_universe().into_client());
        let result = orchestrator(client).run_scan(&request("Jita")).await?;

        assert_eq!(result.start_system_id, SystemId(1));
        assert_eq!(result.start_region_id, FORGE);
        assert_eq!(result.regions, vec![FORGE, METROPOLIS]);
        assert!(!result.partial);
        assert_eq!(result.sample_size, 4);
        assert_eq!(result.items_scanned, 4);

        let instant: Vec<_> = result.results.instant.iter().map(|r| (r.type_name.as_deref(), r.target_system_id)).collect();
        // Pyerite to Perimeter: 17.6 * 10000; Tritanium to Hek: 47 * 1000; Isogen only has a home bid
        assert_eq!(instant, vec![(Some("Pyerite"), SystemId(2)), (Some("Tritanium"), SystemId(4))]);
        assert!(result.results.instant.iter().all(|r| r.target_system_id != SystemId(1) && r.jumps >= 1));
        assert!(result.results.instant.windows(2).all(|w| w[0].total_profit >= w[1].total_profit));

        // richest floor is Urlen at 140, not the cheapest (100) or the most expensive (160) order
        let list = &result.results.list;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].target_system_id, SystemId(3));
        assert_eq!(list[0].target_price, 140.0);
        assert_eq!(list[0].jumps, 2);
        Ok(())
    }

    #[test(tokio::test)]
    async fn limit_truncates_each_mode_independently() -> Result<()> {
        let client = Arc::new(trade_universe().into_client());
        let mut request = request("1");
        request.limit = 1;

        let result = orchestrator(client).run_scan(&request).await?;

        assert_eq!(result.results.instant.len(), 1);
        assert_eq!(result.results.instant[0].type_id, TypeId(35));
        assert_eq!(result.results.list.len(), 1);
        Ok(())
    }

    #[test(tokio::test)]
    async fn cargo_and_budget_cap_trade_size() -> Result<()> {
        let client = Arc::new(trade_universe().into_client());
        let mut request = request("Jita");
        request.mode = ScanMode::Instant;
        request.budget = 25_000.0;
        request.cargo_volume = Some(100.0);

        let result = orchestrator(client).run_scan(&request).await?;

        for record in &result.results.instant {
            assert!(record.max_units_traded <= (25_000.0 / record.home_price).floor() as u64);
            assert_eq!(record.max_units_by_cargo, Some(200));
            assert!(record.max_units_traded <= 200);
        }
        assert!(!result.results.instant.is_empty());
        assert!(result.results.list.is_empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn unresolvable_start_system_fails_without_writing_caches() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let client = Arc::new(trade_universe().into_client());
        let entity_cache = EntityCache::load(client, dir.path().join("esi_cache.json")).await?;
        let orchestrator = ScanOrchestrator::new(Arc::new(entity_cache), Arc::new(FileBmc::new(dir.path())));

        let err = orchestrator.run_scan(&request("Nowhere")).await.unwrap_err();

        assert!(matches!(err, ScanError::Resolution(_)));
        assert!(err.is_bad_input());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test(tokio::test)]
    async fn zero_deadline_returns_a_partial_result() -> Result<()> {
        let client = Arc::new(trade_universe().into_client());
        let mut request = request("Jita");
        request.max_runtime_sec = Some(0.0);

        let result = orchestrator(client).run_scan(&request).await?;

        assert!(result.partial);
        assert_eq!(result.items_scanned, 0);
        assert!(result.results.is_empty());
        assert_eq!(result.regions, vec![FORGE]);
        Ok(())
    }

    #[test(tokio::test)]
    async fn empty_catalog_is_reported() -> Result<()> {
        let mut universe = InMemoryUniverse::new();
        universe.add_region(FORGE, &[1]);
        universe.add_system(1, "Jita", 0.95);
        let client = Arc::new(universe.into_client());

        let err = orchestrator(client).run_scan(&request("Jita")).await.unwrap_err();

        assert!(matches!(err, ScanError::EmptyResult(_)));
        Ok(())
    }

    #[test(tokio::test)]
    async fn overflow_pool_is_used_until_min_results_is_met() -> Result<()> {
        let mut universe = InMemoryUniverse::new();
        universe.add_region(FORGE, &[1, 2]);
        universe.add_system(1, "Jita", 0.95);
        universe.add_system(2, "Perimeter", 0.9);
        universe.connect(1, 2);
        for type_id in 100..110 {
            universe.add_type(FORGE, type_id, "Item", Some(1.0));
            universe.add_order(FORGE, 1, type_id, OrderSide::Sell, 100.0, 100);
            universe.add_order(FORGE, 2, type_id, OrderSide::Buy, 200.0, 100);
        }
        let client = Arc::new(universe.into_client());
        let mut request = request("Jita");
        request.mode = ScanMode::Instant;
        request.sample_size = 2;
        request.min_results = 5;
        request.limit = 0;

        let result = orchestrator(client).run_scan(&request).await?;

        assert_eq!(result.results.instant.len(), 5);
        assert_eq!(result.sample_size, 5);
        assert_eq!(result.items_scanned, 5);
        Ok(())
    }

    #[test(tokio::test)]
    async fn transport_failure_aborts_the_scan() -> Result<()> {
        let mut universe = trade_universe();
        // catalog lists an id ESI doesn't know
        universe.region_types.entry(FORGE).or_default().push(TypeId(99));
        let client = Arc::new(universe.into_client());

        let err = orchestrator(client).run_scan(&request("Jita")).await.unwrap_err();

        assert!(matches!(err, ScanError::Transport(_)));
        assert!(!err.is_bad_input());
        Ok(())
    }
}
