use std::time::Duration;
use tokio::time::Instant;

/// Wall-clock budget of one scan, measured on the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started_at: Instant,
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            expires_at: started_at.checked_add(budget),
        }
    }

    /// Negative budgets are spent already; budgets too large for a `Duration` never expire.
    pub fn after_secs(seconds: f64) -> Self {
        match Duration::try_from_secs_f64(seconds.max(0.0)) {
            Ok(budget) => Self::after(budget),
            Err(_) => Self::unbounded(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            started_at: Instant::now(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
