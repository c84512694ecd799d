pub mod item_sample;
pub mod orchestrator;
pub mod scan_error;
pub mod scan_service;
