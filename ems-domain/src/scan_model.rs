use crate::{RegionId, SystemId, TypeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumString};

/// Identifies one nearby-set computation. Two keys only match if every field is equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearbySetKey {
    pub start_system_id: SystemId,
    pub max_jumps: u32,
    pub min_security: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbySystem {
    pub name: Option<String>,
    pub security: f64,
    pub region_id: Option<RegionId>,
    pub jumps: u32,
}

/// All systems within `max_jumps` stargate hops of the start system that pass the security
/// filter, plus a region index over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbySetResult {
    pub start_system_id: SystemId,
    pub max_jumps: u32,
    pub min_security: f64,
    pub generated_at: DateTime<Utc>,
    pub systems: BTreeMap<SystemId, NearbySystem>,
    pub region_to_systems: BTreeMap<RegionId, BTreeSet<SystemId>>,
}

impl NearbySetResult {
    pub fn key(&self) -> NearbySetKey {
        NearbySetKey {
            start_system_id: self.start_system_id,
            max_jumps: self.max_jumps,
            min_security: self.min_security,
        }
    }

    pub fn matches(&self, key: &NearbySetKey) -> bool {
        &self.key() == key
    }

    pub fn regions(&self) -> Vec<RegionId> {
        self.region_to_systems.keys().copied().collect()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScanMode {
    Instant,
    List,
    #[default]
    Both,
}

impl ScanMode {
    pub fn includes_instant(&self) -> bool {
        matches!(self, ScanMode::Instant | ScanMode::Both)
    }

    pub fn includes_list(&self) -> bool {
        matches!(self, ScanMode::List | ScanMode::Both)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OpportunityMode {
    /// Sell immediately into a standing buy order at the destination.
    Instant,
    /// Post a sell order at the destination and wait for a fill.
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub mode: OpportunityMode,
    pub type_id: TypeId,
    pub type_name: Option<String>,
    pub home_price: f64,
    pub home_volume: u64,
    pub target_price: f64,
    pub target_system_id: SystemId,
    pub target_system_name: Option<String>,
    pub jumps: u32,
    pub security: f64,
    pub profit_per_unit: f64,
    pub margin_pct: f64,
    pub fee_pct: f64,
    pub max_units_by_budget: u64,
    pub max_units_by_cargo: Option<u64>,
    pub max_units_traded: u64,
    pub total_profit: f64,
    pub profit_per_jump: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub instant: Vec<OpportunityRecord>,
    pub list: Vec<OpportunityRecord>,
}

impl ScanResults {
    pub fn len(&self) -> usize {
        self.instant.len() + self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpportunityRecord> {
        self.instant.iter().chain(self.list.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpportunityRecord> {
        self.instant.iter_mut().chain(self.list.iter_mut())
    }
}

/// Output of one scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub generated_at: DateTime<Utc>,
    pub start_system_id: SystemId,
    pub start_system_name: String,
    pub start_region_id: RegionId,
    pub budget: f64,
    pub max_jumps: u32,
    pub min_security: f64,
    pub min_margin_pct: f64,
    pub mode: ScanMode,
    /// Number of item types drawn for evaluation, including any taken from the overflow pool.
    pub sample_size: usize,
    /// Number of item types actually evaluated before the run ended.
    pub items_scanned: usize,
    pub regions: Vec<RegionId>,
    pub partial: bool,
    pub runtime_sec: f64,
    #[serde(default)]
    pub cached: bool,
    pub results: ScanResults,
}

impl ScanResult {
    pub fn opportunity_count(&self) -> usize {
        self.results.len()
    }
}
