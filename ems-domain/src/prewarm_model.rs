use crate::ScanResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;
use uuid::Uuid;

/// Error key used for failures that happen before the per-system loop starts.
pub const RUN_ERROR_KEY: &str = "__run__";

/// A scan result persisted by the prewarm job, with its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrewarmSnapshot {
    #[serde(flatten)]
    pub scan: ScanResult,
    pub tuned: bool,
    pub max_jumps_requested: u32,
    pub fallback_used: bool,
    pub prewarmed: bool,
    pub cache_expires_at: DateTime<Utc>,
    pub expires_ts: f64,
}

impl PrewarmSnapshot {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.cache_expires_at
    }

    pub fn opportunity_count(&self) -> usize {
        self.scan.opportunity_count()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Partial,
    Failed,
    Skipped,
    Locked,
}

impl RunStatus {
    pub fn from_counts(successes: usize, failures: usize) -> Self {
        match (successes, failures) {
            (0, 0) => RunStatus::Skipped,
            (0, _) => RunStatus::Failed,
            (_, 0) => RunStatus::Ok,
            _ => RunStatus::Partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_sec: f64,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub systems: Vec<String>,
    pub successes: usize,
    pub failures: usize,
    pub skipped_fresh: usize,
    pub cache_ttl_sec: u64,
    pub total_opportunities: usize,
    pub tuned: Option<bool>,
    pub errors: BTreeMap<String, String>,
}

impl RunSummary {
    /// A summary for a run that ended before touching any system.
    pub fn not_started(status: RunStatus, reason: &str, systems: Vec<String>, started_at: DateTime<Utc>, cache_ttl_sec: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            duration_sec: 0.0,
            status,
            reason: Some(reason.to_string()),
            systems,
            successes: 0,
            failures: 0,
            skipped_fresh: 0,
            cache_ttl_sec,
            total_opportunities: 0,
            tuned: None,
            errors: Default::default(),
        }
    }
}
