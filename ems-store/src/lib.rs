pub mod bmc;
pub mod entity_cache_file;
pub mod fs_helpers;
pub mod prewarm_store;
pub mod run_lock;

pub use bmc::catalog_bmc::*;
pub use bmc::nearby_set_bmc::*;
pub use bmc::*;
pub use entity_cache_file::*;
pub use prewarm_store::*;
pub use run_lock::*;
