pub mod configuration;
pub mod deadline;
pub mod entity_cache;
pub mod esi_client;
pub mod market;
pub mod pagination;
pub mod prewarm;
pub mod reqwest_helpers;
pub mod scan;
pub mod scoring;
pub mod tuning;
pub mod universe;

#[cfg(any(test, feature = "test-utils"))]
pub mod in_memory_universe;

pub use configuration::*;
pub use deadline::Deadline;
pub use entity_cache::EntityCache;
pub use esi_client::{EsiClient, EsiClientTrait};
pub use prewarm::prewarm_runner::PrewarmRunner;
pub use prewarm::scheduler::PrewarmScheduler;
pub use scan::orchestrator::{RefreshFlags, ScanOrchestrator, ScanRequest};
pub use scan::scan_error::ScanError;
pub use scan::scan_service::{ScanResultCache, ScanService};
