use crate::configuration::PrewarmConfiguration;
use crate::scan::orchestrator::{ScanOrchestrator, ScanRequest};
use crate::tuning::{tune_scan_params, ScanParams};
use anyhow::Result;
use chrono::{DateTime, Utc};
use ems_domain::{PrewarmSnapshot, RunStatus, RunSummary, RUN_ERROR_KEY};
use ems_store::{prewarm_key, PrewarmStore, RunLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, event, info, warn, Level};
use uuid::Uuid;

/// One pass over the configured roster: scan every home system whose snapshot is stale and
/// persist the result for the public endpoint to serve.
#[derive(Debug)]
pub struct PrewarmRunner {
    cfg: PrewarmConfiguration,
    orchestrator: Arc<ScanOrchestrator>,
    store: PrewarmStore,
}

#[derive(Debug, Default)]
struct RosterTally {
    successes: usize,
    failures: usize,
    skipped_fresh: usize,
    total_opportunities: usize,
    errors: BTreeMap<String, String>,
}

impl PrewarmRunner {
    pub fn new(cfg: PrewarmConfiguration, orchestrator: Arc<ScanOrchestrator>) -> Self {
        let store = PrewarmStore::new(cfg.output_dir.clone(), cfg.status_file(), cfg.history_file());
        Self { cfg, orchestrator, store }
    }

    pub fn store(&self) -> &PrewarmStore {
        &self.store
    }

    pub fn configuration(&self) -> &PrewarmConfiguration {
        &self.cfg
    }

    fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cfg.cache_ttl.min(u32::MAX as u64) as i64)
    }

    /// Runs the roster once under the run lock and records the outcome in the status file.
    ///
    /// A run that finds the lock taken ends immediately with status `locked`; it is not added to
    /// the history. Per-system failures are collected in the summary; a failure outside the
    /// per-system loop ends the run with status `failed` and the `__run__` error key.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let roster = self.cfg.roster();

        if roster.is_empty() {
            let summary = RunSummary::not_started(RunStatus::Skipped, "no systems configured", vec![], started_at, self.cfg.cache_ttl);
            self.store.write_status(&summary).await?;
            info!("Prewarm skipped: no systems configured");
            return Ok(summary);
        }

        let clock = Instant::now();
        let lock = match RunLock::try_acquire(&self.cfg.lock_file()) {
            Ok(lock) => lock,
            Err(err) => return self.record(self.failed_summary(&err, roster, started_at, clock)).await,
        };
        let Some(_lock) = lock else {
            let summary = RunSummary::not_started(RunStatus::Locked, "prewarm already running", roster, started_at, self.cfg.cache_ttl);
            self.store.write_status(&summary).await?;
            info!("Prewarm skipped: lock {} is held by another run", self.cfg.lock_file().display());
            return Ok(summary);
        };

        let summary = match self.run_roster(&roster).await {
            Ok(tally) => RunSummary {
                run_id: Uuid::new_v4(),
                started_at,
                finished_at: Utc::now(),
                duration_sec: round_2(clock.elapsed().as_secs_f64()),
                status: RunStatus::from_counts(tally.successes, tally.failures),
                reason: None,
                systems: roster,
                successes: tally.successes,
                failures: tally.failures,
                skipped_fresh: tally.skipped_fresh,
                cache_ttl_sec: self.cfg.cache_ttl,
                total_opportunities: tally.total_opportunities,
                tuned: Some(self.cfg.tune),
                errors: tally.errors,
            },
            Err(err) => self.failed_summary(&err, roster, started_at, clock),
        };

        self.record(summary).await
    }

    fn failed_summary(&self, err: &anyhow::Error, roster: Vec<String>, started_at: DateTime<Utc>, clock: Instant) -> RunSummary {
        error!("Prewarm run failed: {err:#}");
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            duration_sec: round_2(clock.elapsed().as_secs_f64()),
            status: RunStatus::Failed,
            reason: None,
            systems: roster,
            successes: 0,
            failures: 1,
            skipped_fresh: 0,
            cache_ttl_sec: self.cfg.cache_ttl,
            total_opportunities: 0,
            tuned: Some(self.cfg.tune),
            errors: BTreeMap::from([(RUN_ERROR_KEY.to_string(), format!("{err:#}"))]),
        }
    }

    /// Writes the status file and appends the run to the history.
    async fn record(&self, summary: RunSummary) -> Result<RunSummary> {
        self.store.write_status(&summary).await?;
        self.store.append_history(&summary).await?;
        event!(
            Level::INFO,
            "Prewarm run {} finished with status {}: {} ok, {} failed, {} fresh, {} opportunities in {:.2}s",
            summary.run_id,
            summary.status,
            summary.successes,
            summary.failures,
            summary.skipped_fresh,
            summary.total_opportunities,
            summary.duration_sec
        );
        Ok(summary)
    }

    async fn run_roster(&self, roster: &[String]) -> Result<RosterTally> {
        let mut tally = RosterTally::default();
        let now = Utc::now();

        for system in roster {
            let key = prewarm_key(system);
            if !self.needs_refresh(&key, now).await? {
                debug!("Snapshot {} is fresh, skipping {}", key, system);
                tally.skipped_fresh += 1;
                continue;
            }

            match self.prewarm_system(system, &key).await {
                Ok(opportunities) => {
                    info!("Prewarmed {}: {} opportunities", system, opportunities);
                    tally.successes += 1;
                    tally.total_opportunities += opportunities;
                }
                Err(err) => {
                    warn!("Prewarm failed for {}: {err:#}", system);
                    tally.failures += 1;
                    tally.errors.insert(system.clone(), format!("{err:#}"));
                }
            }
        }
        Ok(tally)
    }

    /// Stale, missing and forced snapshots are refreshed. With `retry_empty`, so are fresh ones
    /// that are unreadable or hold no opportunities.
    async fn needs_refresh(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        if self.cfg.force || !self.store.is_fresh(key, now, self.cache_ttl()).await? {
            return Ok(true);
        }
        if !self.cfg.retry_empty {
            return Ok(false);
        }
        match self.store.load_snapshot(key).await {
            Ok(Some(existing)) => Ok(existing.opportunity_count() == 0),
            Ok(None) | Err(_) => Ok(true),
        }
    }

    /// Scans one home system, widening once if it came back thin, and writes the snapshot.
    /// Returns the number of opportunities stored.
    async fn prewarm_system(&self, system: &str, key: &str) -> Result<usize> {
        let requested = ScanParams {
            max_jumps: self.cfg.max_jumps,
            sample_size: self.cfg.sample_size,
            types_pages: self.cfg.types_pages,
            order_pages: self.cfg.order_pages,
        };
        let (params, tuned) = if self.cfg.tune { tune_scan_params(requested) } else { (requested, false) };

        let mut result = self.orchestrator.run_scan(&self.scan_request(system, params, self.cfg.min_security)).await?;

        let fallback_min_security = self.cfg.fallback_min_security();
        // the fallback depth is used as configured; sample size and page caps stay as tuned
        let fallback_params = ScanParams {
            max_jumps: self.cfg.fallback_max_jumps(),
            ..params
        };
        let widens = fallback_params.max_jumps > params.max_jumps || fallback_min_security < self.cfg.min_security;

        let mut fallback_used = false;
        if result.opportunity_count() < self.cfg.min_results && widens {
            debug!(
                "{} found {} of {} wanted opportunities, widening to {} jumps / {} security",
                system,
                result.opportunity_count(),
                self.cfg.min_results,
                fallback_params.max_jumps,
                fallback_min_security
            );
            result = self.orchestrator.run_scan(&self.scan_request(system, fallback_params, fallback_min_security)).await?;
            fallback_used = true;
        }

        result.cached = true;
        let cache_expires_at = Utc::now() + self.cache_ttl();
        let snapshot = PrewarmSnapshot {
            scan: result,
            tuned,
            max_jumps_requested: if fallback_used { fallback_params.max_jumps } else { params.max_jumps },
            fallback_used,
            prewarmed: true,
            cache_expires_at,
            expires_ts: cache_expires_at.timestamp_millis() as f64 / 1000.0,
        };
        self.store.write_snapshot(key, &snapshot).await?;
        Ok(snapshot.opportunity_count())
    }

    fn scan_request(&self, system: &str, params: ScanParams, min_security: f64) -> ScanRequest {
        ScanRequest {
            start_system: system.to_string(),
            budget: self.cfg.budget,
            max_jumps: params.max_jumps,
            min_security,
            min_margin_pct: self.cfg.min_margin,
            sample_size: params.sample_size,
            types_pages: params.types_pages,
            order_pages: params.order_pages,
            home_order_pages: self.cfg.home_order_pages,
            max_price: 0.0,
            mode: self.cfg.mode,
            tax_pct: self.cfg.tax_pct,
            broker_pct: self.cfg.broker_pct,
            limit: self.cfg.limit,
            max_runtime_sec: Some(self.cfg.max_runtime as f64),
            sample_seed: self.cfg.sample_seed,
            cargo_volume: Some(self.cfg.cargo_m3).filter(|cargo| *cargo > 0.0),
            min_profit_per_jump: Some(self.cfg.min_profit_per_jump),
            min_results: self.cfg.min_results,
            refresh: Default::default(),
        }
    }
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_cache::EntityCache;
    use crate::in_memory_universe::InMemoryUniverse;
    use ems_domain::{OrderSide, RegionId, ScanMode, SystemId};
    use ems_store::InMemoryBmc;
    use std::path::Path;
    use test_log::test;

    /// Home - Mid - Far in one region; Tritanium is bought at Home and has a bid in Far when
    /// `with_bid` is set.
    fn universe(with_bid: bool) -> InMemoryUniverse {
        let mut universe = InMemoryUniverse::new();
        universe.add_region(RegionId(10), &[1, 2, 3]);
        universe.add_system(1, "Home", 1.0);
        universe.add_system(2, "Mid", 1.0);
        universe.add_system(3, "Far", 1.0);
        universe.connect(1, 2);
        universe.connect(2, 3);
        universe.add_type(RegionId(10), 34, "Tritanium", Some(0.01));
        universe.add_order(RegionId(10), 1, 34, OrderSide::Sell, 5.0, 1_000);
        if with_bid {
            universe.add_order(RegionId(10), 3, 34, OrderSide::Buy, 7.0, 1_000);
        }
        universe
    }

    fn configuration(output_dir: &Path, start_systems: &str) -> PrewarmConfiguration {
        PrewarmConfiguration {
            output_dir: output_dir.to_path_buf(),
            start_systems: start_systems.to_string(),
            max_jumps: 2,
            sample_size: 0,
            types_pages: 0,
            order_pages: 0,
            min_security: 0.5,
            max_runtime: 30,
            budget: 1_000_000.0,
            mode: ScanMode::Instant,
            min_profit_per_jump: 0.0,
            min_results: 0,
            tune: false,
            ..PrewarmConfiguration::default()
        }
    }

    fn runner(cfg: PrewarmConfiguration, universe: InMemoryUniverse) -> PrewarmRunner {
        let entity_cache = EntityCache::in_memory(Arc::new(universe.into_client()));
        let orchestrator = ScanOrchestrator::new(Arc::new(entity_cache), Arc::new(InMemoryBmc::default()));
        PrewarmRunner::new(cfg, Arc::new(orchestrator))
    }

    #[test(tokio::test)]
    async fn writes_snapshots_under_name_and_id_and_records_history() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = runner(configuration(dir.path(), "Home"), universe(true));

        let summary = runner.run().await?;

        assert_eq!(summary.status, RunStatus::Ok);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.total_opportunities, 1);
        assert_eq!(summary.tuned, Some(false));

        let by_name = runner.store().load_snapshot("home").await?.expect("snapshot by name");
        let by_id = runner.store().load_snapshot("1").await?.expect("snapshot by id");
        assert_eq!(by_name, by_id);
        assert!(by_name.prewarmed);
        assert!(by_name.scan.cached);
        assert!(!by_name.fallback_used);
        assert_eq!(by_name.max_jumps_requested, 2);
        assert!(!by_name.is_expired(Utc::now()));
        assert_eq!(by_name.scan.start_system_id, SystemId(1));

        assert_eq!(runner.store().read_status().await?, Some(summary.clone()));
        assert_eq!(runner.store().read_history_tail(10).await?, vec![summary]);
        Ok(())
    }

    #[test(tokio::test)]
    async fn one_failing_system_does_not_abort_the_roster() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = runner(configuration(dir.path(), "Nowhere,Home"), universe(true));

        let summary = runner.run().await?;

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.failures, 1);
        assert!(summary.errors["Nowhere"].contains("Unknown start system"));
        assert!(runner.store().load_snapshot("home").await?.is_some());
        assert!(runner.store().load_snapshot("nowhere").await?.is_none());
        Ok(())
    }

    #[test(tokio::test)]
    async fn fresh_snapshots_are_skipped_unless_forced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        runner(configuration(dir.path(), "Home"), universe(true)).run().await?;

        let second = runner(configuration(dir.path(), "Home"), universe(true)).run().await?;
        assert_eq!(second.status, RunStatus::Skipped);
        assert_eq!(second.skipped_fresh, 1);

        let mut forced = configuration(dir.path(), "Home");
        forced.force = true;
        let third = runner(forced, universe(true)).run().await?;
        assert_eq!(third.status, RunStatus::Ok);
        assert_eq!(third.skipped_fresh, 0);

        assert_eq!(runner(configuration(dir.path(), "Home"), universe(true)).store().read_history_tail(10).await?.len(), 3);
        Ok(())
    }

    #[test(tokio::test)]
    async fn retry_empty_reruns_fresh_snapshots_without_opportunities() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let first = runner(configuration(dir.path(), "Home"), universe(false)).run().await?;
        assert_eq!(first.total_opportunities, 0);

        let plain = runner(configuration(dir.path(), "Home"), universe(false)).run().await?;
        assert_eq!(plain.skipped_fresh, 1);

        let mut retrying = configuration(dir.path(), "Home");
        retrying.retry_empty = true;
        let retried = runner(retrying, universe(true)).run().await?;
        assert_eq!(retried.skipped_fresh, 0);
        assert_eq!(retried.total_opportunities, 1);
        Ok(())
    }

    #[test(tokio::test)]
    async fn thin_results_fall_back_to_a_wider_search() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cfg = configuration(dir.path(), "Home");
        cfg.max_jumps = 1;
        cfg.min_results = 1;
        cfg.fallback_max_jumps = Some(2);
        let runner = runner(cfg, universe(true));

        let summary = runner.run().await?;

        let snapshot = runner.store().load_snapshot("home").await?.expect("snapshot");
        assert!(snapshot.fallback_used);
        assert_eq!(snapshot.max_jumps_requested, 2);
        assert_eq!(snapshot.scan.max_jumps, 2);
        assert_eq!(snapshot.opportunity_count(), 1);
        assert_eq!(summary.total_opportunities, 1);
        Ok(())
    }

    #[test(tokio::test)]
    async fn fallback_depth_is_not_capped_by_tuning() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cfg = configuration(dir.path(), "Home");
        cfg.tune = true;
        cfg.max_jumps = 1;
        cfg.min_results = 1;
        cfg.fallback_max_jumps = Some(12);
        let runner = runner(cfg, universe(true));

        runner.run().await?;

        let snapshot = runner.store().load_snapshot("home").await?.expect("snapshot");
        assert!(snapshot.fallback_used);
        assert_eq!(snapshot.scan.max_jumps, 12);
        assert_eq!(snapshot.max_jumps_requested, 12);
        assert_eq!(snapshot.opportunity_count(), 1);
        Ok(())
    }

    #[test(tokio::test)]
    async fn lock_acquisition_failure_is_recorded_as_failed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x")?;
        let mut cfg = configuration(dir.path(), "Home");
        cfg.lock_file = Some(blocker.join("prewarm.lock"));
        let runner = runner(cfg, universe(true));

        let summary = runner.run().await?;

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.failures, 1);
        assert!(summary.errors.contains_key(RUN_ERROR_KEY));
        assert_eq!(runner.store().read_status().await?, Some(summary.clone()));
        assert_eq!(runner.store().read_history_tail(10).await?, vec![summary]);
        Ok(())
    }

    #[test(tokio::test)]
    async fn held_lock_ends_the_run_as_locked() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = configuration(dir.path(), "Home");
        let _held = RunLock::try_acquire(&cfg.lock_file())?.expect("lock is free");
        let runner = runner(cfg, universe(true));

        let summary = runner.run().await?;

        assert_eq!(summary.status, RunStatus::Locked);
        assert_eq!(summary.reason.as_deref(), Some("prewarm already running"));
        assert_eq!(runner.store().read_status().await?.map(|s| s.status), Some(RunStatus::Locked));
        assert!(runner.store().read_history_tail(10).await?.is_empty());
        assert!(runner.store().load_snapshot("home").await?.is_none());
        Ok(())
    }

    #[test(tokio::test)]
    async fn empty_roster_is_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = runner(configuration(dir.path(), " , "), universe(true));

        let summary = runner.run().await?;

        assert_eq!(summary.status, RunStatus::Skipped);
        assert_eq!(summary.reason.as_deref(), Some("no systems configured"));
        assert_eq!(runner.store().read_status().await?, Some(summary));
        Ok(())
    }
}
