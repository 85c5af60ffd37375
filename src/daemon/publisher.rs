//! Published state file: the daemon's snapshot, summary and lifecycle info.
//!
//! `swm status` reads this file instead of talking to the daemon. It is written
//! atomically (write to `.tmp`, then `rename()`) every `snapshot_interval_ms`, so
//! readers always see a complete document.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SwmError};
use crate::monitor::engine::WorkloadEngine;
use crate::monitor::snapshot::{SummaryStats, WorkloadSnapshot};

/// Floor for treating the state file as stale (seconds).
pub const STATE_STALE_FLOOR_SECS: u64 = 30;

/// Staleness is reported after this many missed publish intervals.
const STALE_INTERVAL_MULTIPLE: u32 = 4;

// ──────────────────── state file schema ────────────────────

/// Document written to the state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedState {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub uptime_seconds: u64,
    #[serde(default)]
    pub last_updated: String,
    /// Publish interval the writer was using, for staleness checks.
    #[serde(default)]
    pub publish_interval_ms: u64,
    pub snapshot: WorkloadSnapshot,
    #[serde(default)]
    pub summary: SummaryStats,
    /// Activity log events dropped because the logger channel was full.
    #[serde(default)]
    pub dropped_log_events: u64,
}

impl PublishedState {
    /// Age of `last_updated`, if it parses.
    #[must_use]
    pub fn age(&self) -> Option<chrono::Duration> {
        chrono::DateTime::parse_from_rfc3339(&self.last_updated)
            .ok()
            .map(|updated| chrono::Utc::now().signed_duration_since(updated))
    }

    /// Whether the writer has missed enough intervals to look stalled.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let threshold = stale_threshold(Duration::from_millis(self.publish_interval_ms));
        #[allow(clippy::cast_possible_wrap)]
        self.age()
            .is_some_and(|age| age.num_seconds() > threshold.as_secs() as i64)
    }
}

/// Stale threshold for a given publish interval.
#[must_use]
pub fn stale_threshold(interval: Duration) -> Duration {
    (interval * STALE_INTERVAL_MULTIPLE).max(Duration::from_secs(STATE_STALE_FLOOR_SECS))
}

// ──────────────────── publisher ────────────────────

/// Periodically writes the engine's state to disk.
pub struct SnapshotPublisher {
    state_file: PathBuf,
    interval: Duration,
    history_limit: usize,
    started_at: String,
    start_time: Instant,
    last_write: Option<Instant>,
    writes: u64,
    failures: u64,
}

impl SnapshotPublisher {
    #[must_use]
    pub fn new(state_file: PathBuf, interval: Duration, history_limit: usize) -> Self {
        Self {
            state_file,
            interval,
            history_limit,
            started_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            start_time: Instant::now(),
            last_write: None,
            writes: 0,
            failures: 0,
        }
    }

    #[must_use]
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Successful writes so far.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.failures
    }

    /// Publish if the interval has elapsed. Returns whether a write was attempted.
    pub fn maybe_publish(&mut self, engine: &WorkloadEngine, dropped_log_events: u64) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_write {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        if let Err(e) = self.publish(engine, dropped_log_events) {
            eprintln!("[SWM-DAEMON] failed to write state file: {e}");
        }
        // Advance even on failure so a persistent error does not spam stderr every tick.
        self.last_write = Some(now);
        true
    }

    /// Build and write the state document now.
    pub fn publish(&mut self, engine: &WorkloadEngine, dropped_log_events: u64) -> Result<()> {
        let state = self.build_state(engine, dropped_log_events);
        match write_state_atomic(&self.state_file, &state) {
            Ok(()) => {
                self.writes += 1;
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn build_state(&self, engine: &WorkloadEngine, dropped_log_events: u64) -> PublishedState {
        let snapshot = engine.snapshot_with_history(self.history_limit);
        let summary = SummaryStats::from_windows(
            &snapshot.recent_history,
            snapshot.hotspot_paths.len(),
            snapshot.total_paths_monitored,
        );
        PublishedState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            started_at: self.started_at.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            last_updated: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            publish_interval_ms: u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            snapshot,
            summary,
            dropped_log_events,
        }
    }
}

// ──────────────────── reading ────────────────────

/// Read a state file written by [`SnapshotPublisher`]. Warns on stderr when stale.
pub fn read_state(path: &Path) -> Result<PublishedState> {
    let raw = fs::read_to_string(path).map_err(|source| SwmError::io(path, source))?;
    let state: PublishedState =
        serde_json::from_str(&raw).map_err(|e| SwmError::Serialization {
            context: "state file",
            details: e.to_string(),
        })?;

    if state.is_stale() {
        if let Some(age) = state.age() {
            eprintln!(
                "[SWM-STATUS] WARNING: state file is {}s old, daemon may be stalled",
                age.num_seconds()
            );
        }
    }
    Ok(state)
}

// ──────────────────── atomic write ────────────────────

/// Write to a sibling `.tmp` file, fsync, then rename over `path`.
///
/// The file is world-readable (0o644 on Unix) so `swm status` works for users
/// other than the one running the daemon.
fn write_state_atomic(path: &Path, state: &PublishedState) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SwmError::io(parent, source))?;
    }

    let json = serde_json::to_string_pretty(state).map_err(|e| SwmError::Serialization {
        context: "state file",
        details: e.to_string(),
    })?;

    let result = (|| -> std::io::Result<()> {
        {
            use std::io::Write;
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o644);
            }
            let mut file = opts.open(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)
    })();

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(SwmError::io(path, source));
    }
    Ok(())
}
