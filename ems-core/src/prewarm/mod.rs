pub mod prewarm_runner;
pub mod scheduler;
