use anyhow::{Context, Result};
use ems_domain::ScanMode;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ESI_BASE_URL: &str = "https://esi.evetech.net/latest";
pub const DEFAULT_USER_AGENT: &str = "eve-market-scan/0.1";

/// Settings of the ESI client and the caches shared by all scans of one process.
#[derive(Clone, Debug)]
pub struct ScannerConfiguration {
    pub esi_base_url: String,
    pub user_agent: String,
    pub cache_dir: PathBuf,
    /// Pause after every successful request. Also the step of the linear retry backoff.
    pub esi_sleep: Duration,
    pub esi_retries: u32,
    pub esi_timeout: Duration,
    pub scan_cache_ttl: Duration,
}

impl Default for ScannerConfiguration {
    fn default() -> Self {
        Self {
            esi_base_url: ESI_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_dir: PathBuf::from("/data"),
            esi_sleep: Duration::from_millis(50),
            esi_retries: 2,
            esi_timeout: Duration::from_secs(30),
            scan_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl ScannerConfiguration {
    pub fn entity_cache_path(&self) -> PathBuf {
        self.cache_dir.join("esi_cache.json")
    }
}

/// Settings of the prewarm job, read from `PREWARM_*` environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct PrewarmConfiguration {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub status_file: Option<PathBuf>,
    pub lock_file: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    #[serde(default = "default_start_systems")]
    pub start_systems: String,
    #[serde(default = "default_max_jumps")]
    pub max_jumps: u32,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_one")]
    pub types_pages: u32,
    #[serde(default = "default_one")]
    pub order_pages: u32,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub home_order_pages: Option<u32>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_min_security")]
    pub min_security: f64,
    #[serde(default = "default_min_margin")]
    pub min_margin: f64,
    /// Deadline of a single scan, in seconds.
    #[serde(default = "default_max_runtime")]
    pub max_runtime: u64,
    #[serde(default = "default_budget")]
    pub budget: f64,
    #[serde(default = "default_mode", deserialize_with = "deserialize_mode")]
    pub mode: ScanMode,
    #[serde(default = "default_cargo_m3")]
    pub cargo_m3: f64,
    #[serde(default = "default_min_profit_per_jump")]
    pub min_profit_per_jump: f64,
    #[serde(default = "default_min_results")]
    pub min_results: usize,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub fallback_max_jumps: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub fallback_min_security: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub sample_seed: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub force: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub retry_empty: bool,
    #[serde(default = "default_true", deserialize_with = "deserialize_flag")]
    pub tune: bool,
    #[serde(default = "default_tax_pct")]
    pub tax_pct: f64,
    #[serde(default = "default_broker_pct")]
    pub broker_pct: f64,
    /// Seconds a snapshot stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Six-field cron expression (with seconds) driving the daemon.
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

impl Default for PrewarmConfiguration {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            status_file: None,
            lock_file: None,
            history_file: None,
            start_systems: default_start_systems(),
            max_jumps: default_max_jumps(),
            sample_size: default_sample_size(),
            types_pages: default_one(),
            order_pages: default_one(),
            home_order_pages: None,
            limit: default_limit(),
            min_security: default_min_security(),
            min_margin: default_min_margin(),
            max_runtime: default_max_runtime(),
            budget: default_budget(),
            mode: default_mode(),
            cargo_m3: default_cargo_m3(),
            min_profit_per_jump: default_min_profit_per_jump(),
            min_results: default_min_results(),
            fallback_max_jumps: None,
            fallback_min_security: None,
            sample_seed: None,
            force: false,
            retry_empty: false,
            tune: true,
            tax_pct: default_tax_pct(),
            broker_pct: default_broker_pct(),
            cache_ttl: default_cache_ttl(),
            schedule: default_schedule(),
        }
    }
}

impl PrewarmConfiguration {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("PREWARM_")
            .from_env::<Self>()
            .context("Failed to read PREWARM_* configuration")
    }

    pub fn from_vars<I: IntoIterator<Item = (String, String)>>(vars: I) -> Result<Self> {
        envy::prefixed("PREWARM_")
            .from_iter::<_, Self>(vars)
            .context("Failed to read PREWARM_* configuration")
    }

    /// The configured roster, blank entries dropped.
    pub fn roster(&self) -> Vec<String> {
        self.start_systems
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn status_file(&self) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("last_run.json"))
    }

    pub fn lock_file(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("prewarm.lock"))
    }

    pub fn history_file(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("history.jsonl"))
    }

    pub fn fallback_max_jumps(&self) -> u32 {
        self.fallback_max_jumps.unwrap_or(self.max_jumps)
    }

    pub fn fallback_min_security(&self) -> f64 {
        self.fallback_min_security.unwrap_or(self.min_security)
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/data/prewarm")
}

fn default_start_systems() -> String {
    "Jita,Amarr,Dodixie,Rens,Hek".to_string()
}

fn default_max_jumps() -> u32 {
    5
}

fn default_sample_size() -> usize {
    40
}

fn default_one() -> u32 {
    1
}

fn default_limit() -> usize {
    10
}

fn default_min_security() -> f64 {
    0.5
}

fn default_min_margin() -> f64 {
    8.0
}

fn default_max_runtime() -> u64 {
    12
}

fn default_budget() -> f64 {
    10_000_000.0
}

fn default_mode() -> ScanMode {
    ScanMode::Instant
}

fn default_cargo_m3() -> f64 {
    12_000.0
}

fn default_min_profit_per_jump() -> f64 {
    200_000.0
}

fn default_min_results() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_tax_pct() -> f64 {
    2.0
}

fn default_broker_pct() -> f64 {
    3.0
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_schedule() -> String {
    "0 */5 * * * *".to_string()
}

/// `1`, `true` and `yes` (any case) are true; everything else is false.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Unknown modes fall back to `both`.
fn deserialize_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ScanMode, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(ScanMode::from_str(raw.trim()).unwrap_or(ScanMode::Both))
}

/// An empty value counts as unset.
fn deserialize_optional_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<T>().map(Some).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_without_any_variables() -> Result<()> {
        let cfg = PrewarmConfiguration::from_vars(vars(&[]))?;

        assert_eq!(cfg.roster(), vec!["Jita", "Amarr", "Dodixie", "Rens", "Hek"]);
        assert_eq!(cfg.max_jumps, 5);
        assert_eq!(cfg.sample_size, 40);
        assert_eq!(cfg.mode, ScanMode::Instant);
        assert!(cfg.tune);
        assert!(!cfg.force);
        assert_eq!(cfg.home_order_pages, None);
        assert_eq!(cfg.status_file(), PathBuf::from("/data/prewarm/last_run.json"));
        assert_eq!(cfg.lock_file(), PathBuf::from("/data/prewarm/prewarm.lock"));
        assert_eq!(cfg.history_file(), PathBuf::from("/data/prewarm/history.jsonl"));
        assert_eq!(cfg.fallback_max_jumps(), 5);
        assert_eq!(cfg.fallback_min_security(), 0.5);
        Ok(())
    }

    #[test]
    fn variables_override_defaults() -> Result<()> {
        let cfg = PrewarmConfiguration::from_vars(vars(&[
            ("PREWARM_OUTPUT_DIR", "/tmp/prewarm"),
            ("PREWARM_START_SYSTEMS", " Jita , ,Amarr,"),
            ("PREWARM_MAX_JUMPS", "7"),
            ("PREWARM_MODE", "LIST"),
            ("PREWARM_TUNE", "0"),
            ("PREWARM_FORCE", "yes"),
            ("PREWARM_HOME_ORDER_PAGES", ""),
            ("PREWARM_FALLBACK_MAX_JUMPS", "9"),
            ("PREWARM_SAMPLE_SEED", "42"),
        ]))?;

        assert_eq!(cfg.roster(), vec!["Jita", "Amarr"]);
        assert_eq!(cfg.max_jumps, 7);
        assert_eq!(cfg.mode, ScanMode::List);
        assert!(!cfg.tune);
        assert!(cfg.force);
        assert_eq!(cfg.home_order_pages, None);
        assert_eq!(cfg.fallback_max_jumps(), 9);
        assert_eq!(cfg.sample_seed, Some(42));
        assert_eq!(cfg.status_file(), PathBuf::from("/tmp/prewarm/last_run.json"));
        Ok(())
    }

    #[test]
    fn unknown_mode_falls_back_to_both() -> Result<()> {
        let cfg = PrewarmConfiguration::from_vars(vars(&[("PREWARM_MODE", "hauling")]))?;

        assert_eq!(cfg.mode, ScanMode::Both);
        Ok(())
    }
}
