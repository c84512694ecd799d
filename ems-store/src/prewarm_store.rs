use crate::fs_helpers::{read_json_opt, write_json_atomic};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use ems_domain::{PrewarmSnapshot, RunSummary, SystemId};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

/// Filesystem-safe key for a system name: lowercase ascii alphanumerics, every other character
/// replaced by `_`, trimmed of leading/trailing `_`.
pub fn prewarm_key(name: &str) -> String {
    let key: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let key = key.trim_matches('_');
    if key.is_empty() {
        "unknown".to_string()
    } else {
        key.to_string()
    }
}

/// Where the prewarm job keeps its snapshots, its status file and its run history.
#[derive(Debug, Clone)]
pub struct PrewarmStore {
    output_dir: PathBuf,
    status_file: PathBuf,
    history_file: PathBuf,
}

impl PrewarmStore {
    pub fn new(output_dir: PathBuf, status_file: PathBuf, history_file: PathBuf) -> Self {
        Self {
            output_dir,
            status_file,
            history_file,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn snapshot_path(&self, key: &str) -> PathBuf {
        self.output_dir.join(format!("{key}.json"))
    }

    pub fn snapshot_path_for_id(&self, system_id: SystemId) -> PathBuf {
        self.snapshot_path(&system_id.0.to_string())
    }

    /// A snapshot counts as fresh when its file was modified less than `ttl` ago.
    pub async fn is_fresh(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> Result<bool> {
        let path = self.snapshot_path(key);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                let modified: DateTime<Utc> = metadata.modified()?.into();
                Ok(now - modified < ttl)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("Failed to stat {}", path.display())),
        }
    }

    pub async fn load_snapshot(&self, key: &str) -> Result<Option<PrewarmSnapshot>> {
        read_json_opt(&self.snapshot_path(key)).await
    }

    /// Writes the snapshot under the name key and under the numeric system id.
    pub async fn write_snapshot(&self, key: &str, snapshot: &PrewarmSnapshot) -> Result<()> {
        write_json_atomic(&self.snapshot_path(key), snapshot).await?;
        let id_path = self.snapshot_path_for_id(snapshot.scan.start_system_id);
        if id_path != self.snapshot_path(key) {
            write_json_atomic(&id_path, snapshot).await?;
        }
        Ok(())
    }

    pub async fn write_status(&self, summary: &RunSummary) -> Result<()> {
        write_json_atomic(&self.status_file, summary).await
    }

    pub async fn read_status(&self) -> Result<Option<RunSummary>> {
        read_json_opt(&self.status_file).await
    }

    /// Appends one JSON line to the history log.
    pub async fn append_history(&self, summary: &RunSummary) -> Result<()> {
        if let Some(parent) = self.history_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(summary)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_file)
            .await
            .with_context(|| format!("Failed to open {}", self.history_file.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// The last `n` run summaries, oldest first. The log is streamed; at most `n` entries are held.
    pub async fn read_history_tail(&self, n: usize) -> Result<Vec<RunSummary>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let file = match tokio::fs::File::open(&self.history_file).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("Failed to open {}", self.history_file.display())),
        };

        let mut tail: VecDeque<RunSummary> = VecDeque::with_capacity(n);
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunSummary>(&line) {
                Ok(summary) => {
                    if tail.len() == n {
                        tail.pop_front();
                    }
                    tail.push_back(summary);
                }
                Err(err) => warn!("Skipping unreadable history line: {err}"),
            }
        }
        Ok(tail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ems_domain::{RegionId, RunStatus, ScanMode, ScanResult, ScanResults};
    use test_log::test;

    fn store(dir: &Path) -> PrewarmStore {
        PrewarmStore::new(dir.to_path_buf(), dir.join("status.json"), dir.join("history.jsonl"))
    }

    fn summary(status: RunStatus) -> RunSummary {
        RunSummary::not_started(status, "test", vec!["Jita".to_string()], Utc::now(), 300)
    }

    fn snapshot(system_id: u64) -> PrewarmSnapshot {
        let now = Utc::now();
        PrewarmSnapshot {
            scan: ScanResult {
                generated_at: now,
                start_system_id: SystemId(system_id),
                start_system_name: "Jita".to_string(),
                start_region_id: RegionId(10000002),
                budget: 10_000_000.0,
                max_jumps: 5,
                min_security: 0.5,
                min_margin_pct: 8.0,
                mode: ScanMode::Instant,
                sample_size: 40,
                items_scanned: 40,
                regions: vec![RegionId(10000002)],
                partial: false,
                runtime_sec: 1.5,
                cached: false,
                results: ScanResults::default(),
            },
            tuned: false,
            max_jumps_requested: 5,
            fallback_used: false,
            prewarmed: true,
            cache_expires_at: now + Duration::seconds(300),
            expires_ts: (now + Duration::seconds(300)).timestamp() as f64,
        }
    }

    #[test]
    fn keys_are_filesystem_safe() {
        assert_eq!(prewarm_key("Jita"), "jita");
        assert_eq!(prewarm_key("  Old Man Star "), "old_man_star");
        assert_eq!(prewarm_key("Ignoitton-B"), "ignoitton_b");
        assert_eq!(prewarm_key("Hed-GP"), "hed_gp");
        assert_eq!(prewarm_key("Old - Man"), "old___man");
        assert_eq!(prewarm_key("../.."), "unknown");
        assert_eq!(prewarm_key(""), "unknown");
    }

    #[test(tokio::test)]
    async fn snapshot_is_written_under_name_and_id() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        let snapshot = snapshot(30000142);

        store.write_snapshot("jita", &snapshot).await?;

        assert_eq!(store.load_snapshot("jita").await?, Some(snapshot.clone()));
        assert_eq!(store.load_snapshot("30000142").await?, Some(snapshot));
        assert!(store.is_fresh("jita", Utc::now(), Duration::seconds(300)).await?);
        assert!(!store.is_fresh("jita", Utc::now() + Duration::seconds(600), Duration::seconds(300)).await?);
        assert!(!store.is_fresh("amarr", Utc::now(), Duration::seconds(300)).await?);
        Ok(())
    }

    #[test(tokio::test)]
    async fn history_tail_keeps_only_the_last_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        assert!(store.read_history_tail(5).await?.is_empty());

        let statuses = [RunStatus::Ok, RunStatus::Partial, RunStatus::Failed, RunStatus::Skipped];
        for status in statuses {
            store.append_history(&summary(status)).await?;
        }

        let tail = store.read_history_tail(2).await?;
        assert_eq!(tail.iter().map(|s| s.status).collect::<Vec<_>>(), vec![RunStatus::Failed, RunStatus::Skipped]);
        assert_eq!(store.read_history_tail(10).await?.len(), 4);
        assert!(store.read_history_tail(0).await?.is_empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn status_file_holds_the_latest_summary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        store.write_status(&summary(RunStatus::Ok)).await?;
        store.write_status(&summary(RunStatus::Locked)).await?;

        assert_eq!(store.read_status().await?.map(|s| s.status), Some(RunStatus::Locked));
        Ok(())
    }
}
