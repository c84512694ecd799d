use clap::{Args, Parser, Subcommand};
use ems_domain::ScanMode;
use std::path::PathBuf;

#[derive(Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub esi: EsiArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Args)]
pub struct EsiArgs {
    #[arg(long, global = true, env("CACHE_DIR"), default_value = "/data")]
    pub cache_dir: PathBuf,
    #[arg(long, global = true, env("ESI_BASE_URL"), default_value = ems_core::ESI_BASE_URL)]
    pub esi_base_url: String,
    #[arg(long, global = true, env("ESI_USER_AGENT"), default_value = ems_core::DEFAULT_USER_AGENT)]
    pub user_agent: String,
    /// pause after every request, in seconds
    #[arg(long, global = true, env("ESI_SLEEP"), default_value_t = 0.05)]
    pub esi_sleep: f64,
    #[arg(long, global = true, env("ESI_RETRIES"), default_value_t = 2)]
    pub esi_retries: u32,
    /// request timeout, in seconds
    #[arg(long, global = true, env("ESI_TIMEOUT"), default_value_t = 30.0)]
    pub esi_timeout: f64,
    /// lifetime of cached scan results, in seconds
    #[arg(long, global = true, env("SCAN_CACHE_TTL"), default_value_t = 300)]
    pub scan_cache_ttl: u64,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// runs one arbitrage scan and prints the opportunities
    Scan(ScanArgs),
    /// prewarms the configured roster once (configured via PREWARM_* env vars)
    Prewarm,
    /// prewarms the configured roster on the PREWARM_SCHEDULE cron schedule
    PrewarmDaemon,
    /// prints the most recent prewarm runs
    History {
        #[arg(long, default_value_t = 10)]
        last: usize,
    },
}

#[derive(Clone, Args)]
pub struct ScanArgs {
    /// home system name or id
    #[arg(long, default_value = "Jita")]
    pub start_system: String,
    #[arg(long, default_value_t = 10_000_000.0)]
    pub budget: f64,
    #[arg(long, default_value_t = 10)]
    pub max_jumps: u32,
    #[arg(long, default_value_t = 0.5)]
    pub min_security: f64,
    #[arg(long, default_value_t = 8.0)]
    pub min_margin_pct: f64,
    #[arg(long, default_value_t = 160)]
    pub sample_size: usize,
    /// 0 fetches every page
    #[arg(long, default_value_t = 0)]
    pub types_pages: u32,
    #[arg(long, default_value_t = 3)]
    pub order_pages: u32,
    #[arg(long)]
    pub home_order_pages: Option<u32>,
    /// 0 uses the budget
    #[arg(long, default_value_t = 0.0)]
    pub max_price: f64,
    #[arg(long, default_value_t = ScanMode::Both)]
    pub mode: ScanMode,
    #[arg(long, default_value_t = 2.0)]
    pub tax_pct: f64,
    #[arg(long, default_value_t = 3.0)]
    pub broker_pct: f64,
    #[arg(long, default_value_t = 40)]
    pub limit: usize,
    #[arg(long)]
    pub max_runtime_sec: Option<f64>,
    #[arg(long)]
    pub sample_seed: Option<u64>,
    #[arg(long)]
    pub cargo_volume: Option<f64>,
    #[arg(long)]
    pub min_profit_per_jump: Option<f64>,
    #[arg(long, default_value_t = 0)]
    pub min_results: usize,
    #[arg(long)]
    pub refresh_cache: bool,
    #[arg(long)]
    pub refresh_nearby: bool,
    #[arg(long)]
    pub refresh_types: bool,
    /// prints the full result as json instead of tables
    #[arg(long)]
    pub json: bool,
}
