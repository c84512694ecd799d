use crate::prewarm::prewarm_runner::PrewarmRunner;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Triggers [`PrewarmRunner::run`] on a cron schedule. Overlapping triggers are resolved by the
/// run lock: a trigger that fires while a run is in progress ends as `locked`.
pub struct PrewarmScheduler {
    runner: Arc<PrewarmRunner>,
    schedule: String,
}

impl PrewarmScheduler {
    pub fn new(runner: Arc<PrewarmRunner>) -> Self {
        let schedule = runner.configuration().schedule.clone();
        Self { runner, schedule }
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// Registers the roster job and starts the scheduler. The returned handle keeps it alive.
    pub async fn start(&self) -> Result<JobScheduler> {
        info!("Starting prewarm scheduler with cron: {}", self.schedule);

        let scheduler = JobScheduler::new().await?;
        let runner = self.runner.clone();

        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _lock| {
            let runner = runner.clone();
            Box::pin(async move {
                match runner.run().await {
                    Ok(summary) => info!("Scheduled prewarm run finished with status {}", summary.status),
                    Err(e) => error!("Scheduled prewarm run failed: {e:#}"),
                }
            })
        })
        .with_context(|| format!("Invalid prewarm schedule '{}'", self.schedule))?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        Ok(scheduler)
    }
}
