pub mod esi_model;
pub mod prewarm_model;
pub mod scan_model;

pub use esi_model::*;
pub use prewarm_model::*;
pub use scan_model::*;
