use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// An ESI call failed after all retries.
    #[error("ESI request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("{0}")]
    Resolution(String),
    #[error("{0}")]
    EmptyResult(String),
    /// Reading or writing a cache file failed.
    #[error("cache storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl ScanError {
    /// The caller asked for something that doesn't exist, as opposed to an upstream or local failure.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, ScanError::Resolution(_) | ScanError::EmptyResult(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_and_empty_results_are_bad_input() {
        assert!(ScanError::Resolution("Unknown start system: Nowhere".to_string()).is_bad_input());
        assert!(ScanError::EmptyResult("No market types found".to_string()).is_bad_input());
        assert!(!ScanError::Transport(anyhow::anyhow!("503")).is_bad_input());
        assert!(!ScanError::Storage(anyhow::anyhow!("disk full")).is_bad_input());
    }

    #[test]
    fn transport_message_keeps_the_cause_chain() {
        let cause = anyhow::anyhow!("connection reset").context("GET /universe/systems/1/");

        let message = ScanError::Transport(cause).to_string();

        assert_eq!(message, "ESI request failed: GET /universe/systems/1/: connection reset");
    }
}
