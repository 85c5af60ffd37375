//! JSONL activity log: append-only line-delimited JSON, safe to tail.
//!
//! Each line is a self-contained JSON object. Lines are assembled in memory and
//! written atomically via `write_all` to prevent interleaved partial lines when
//! the file is being tailed by another process.
//!
//! Four-level fallback chain:
//! 1. Primary file path
//! 2. Fallback path (e.g. `/dev/shm/swm.jsonl`)
//! 3. stderr with `[SWM-JSONL]` prefix
//! 4. Silent discard

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SwmError};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Activity log event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MonitorStart,
    MonitorStop,
    ThresholdReload,
    WindowAlert,
    HotspotDetected,
    EventsDropped,
    QueueOverflow,
    Error,
}

/// One JSONL line. Everything except `ts`, `event` and `severity` is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC3339 UTC timestamp, millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Path involved (hotspot path, or the dominant path of an alerting window).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Start of the window the entry describes, seconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reads: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifications: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_load: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<bool>,
    /// Number of events dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// SWM error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            path: None,
            window_start: None,
            window_secs: None,
            reads: None,
            writes: None,
            modifications: None,
            high_load: None,
            burst: None,
            dropped: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where lines are currently going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl WriterState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }

    const fn has_file(self) -> bool {
        matches!(self, Self::Primary | Self::Fallback)
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Tried when `path` cannot be opened or written.
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the active file would exceed this many bytes.
    pub max_size_bytes: u64,
    /// Rotated generations kept next to the active file.
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self::for_path(PathBuf::from("/var/lib/swm/activity.jsonl"))
    }
}

impl JsonlConfig {
    /// Defaults for a log at `path`, falling back to a RAM-backed copy in `/dev/shm`.
    #[must_use]
    pub fn for_path(path: PathBuf) -> Self {
        let fallback_name = path
            .file_name()
            .map_or_else(|| "swm.jsonl".into(), |n| n.to_string_lossy().into_owned());
        Self {
            fallback_path: Some(PathBuf::from("/dev/shm").join(fallback_name)),
            path,
            max_size_bytes: 64 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

/// Append-only JSONL writer with size rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
    last_fsync: SystemTime,
}

impl JsonlWriter {
    /// Open the log, walking down the degradation chain until something works.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Primary,
            bytes_written: 0,
            last_fsync: SystemTime::now(),
        };
        if !w.attach(WriterState::Primary) {
            w.degrade();
        }
        w
    }

    /// Serialize `entry` and append it as a single line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SWM-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
        self.last_fsync = SystemTime::now();
    }

    #[must_use]
    pub const fn state(&self) -> WriterState {
        self.state
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Reattach to the primary path if the writer has degraded away from it.
    pub fn try_recover(&mut self) -> bool {
        if self.state == WriterState::Primary {
            return false;
        }
        self.flush();
        let recovered = self.attach(WriterState::Primary);
        if recovered {
            let _ = writeln!(
                io::stderr(),
                "[SWM-JSONL] recovered to primary path: {}",
                self.config.path.display()
            );
        }
        recovered
    }

    // ──────────────────────── internals ────────────────────────

    fn target(&self, state: WriterState) -> Option<&Path> {
        match state {
            WriterState::Primary => Some(&self.config.path),
            WriterState::Fallback => self.config.fallback_path.as_deref(),
            WriterState::Stderr | WriterState::Discard => None,
        }
    }

    /// Open the file behind `state`. Leaves the writer untouched on failure.
    fn attach(&mut self, state: WriterState) -> bool {
        let Some(path) = self.target(state) else {
            return false;
        };
        match open_append(path) {
            Ok((file, size)) => {
                self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                self.state = state;
                self.bytes_written = size;
                true
            }
            Err(_) => false,
        }
    }

    /// Step one level down the chain.
    fn degrade(&mut self) {
        self.writer = None;
        let current = self.state;
        match current {
            WriterState::Primary if self.attach(WriterState::Fallback) => {
                let fallback = self.config.fallback_path.clone().unwrap_or_default();
                let _ = writeln!(
                    io::stderr(),
                    "[SWM-JSONL] primary log unavailable, using fallback: {}",
                    fallback.display()
                );
            }
            WriterState::Primary | WriterState::Fallback => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[SWM-JSONL] log files unavailable, using stderr");
            }
            WriterState::Stderr | WriterState::Discard => self.state = WriterState::Discard,
        }
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.state.has_file() && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }

        match self.state {
            WriterState::Primary | WriterState::Fallback => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += len;
                    self.maybe_fsync();
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[SWM-JSONL] {line}").is_err() {
                    self.degrade();
                }
            }
            WriterState::Discard => {}
        }
    }

    fn maybe_fsync(&mut self) {
        let elapsed = SystemTime::now()
            .duration_since(self.last_fsync)
            .unwrap_or(Duration::ZERO);
        if elapsed.as_secs() >= self.config.fsync_interval_secs {
            self.fsync();
        }
    }

    /// `log` → `log.1` → `log.2` …, dropping the generation past the limit.
    fn rotate(&mut self) {
        self.flush();
        self.writer = None;
        let state = self.state;
        let Some(base) = self.target(state).map(Path::to_path_buf) else {
            return;
        };

        let _ = fs::remove_file(rotated_name(&base, self.config.max_rotated_files));
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        if self.attach(state) {
            self.bytes_written = 0;
        } else {
            self.degrade();
        }
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open or create `path` for appending, creating parent directories.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SwmError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SwmError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(path: PathBuf, max_size_bytes: u64) -> JsonlConfig {
        JsonlConfig {
            path,
            fallback_path: None,
            max_size_bytes,
            max_rotated_files: 3,
            fsync_interval_secs: 60,
        }
    }

    /// A path whose parent is a regular file, so it cannot be created even as root.
    fn unopenable(dir: &Path) -> PathBuf {
        let blocker = dir.join("blocker");
        fs::write(&blocker, b"x").unwrap();
        blocker.join("primary.jsonl")
    }

    fn alert_entry() -> LogEntry {
        let mut entry = LogEntry::new(EventType::WindowAlert, Severity::Warning);
        entry.window_start = Some(1_700_000_000.0);
        entry.reads = Some(150);
        entry.high_load = Some(true);
        entry
    }

    #[test]
    fn entries_are_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut writer = JsonlWriter::open(config_at(path.clone(), 1024 * 1024));

        writer.write_entry(&LogEntry::new(EventType::MonitorStart, Severity::Info));
        writer.write_entry(&alert_entry());
        writer.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "monitor_start");
        assert_eq!(lines[1]["event"], "window_alert");
        assert_eq!(lines[1]["severity"], "warning");
        assert_eq!(lines[1]["reads"], 150);
        assert_eq!(lines[1]["high_load"], true);
    }

    #[test]
    fn unset_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.jsonl");
        let mut writer = JsonlWriter::open(config_at(path.clone(), 1024 * 1024));
        writer.write_entry(&LogEntry::new(EventType::MonitorStop, Severity::Info));
        writer.flush();

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"path\""));
        assert!(!line.contains("\"window_start\""));
        assert!(!line.contains("\"dropped\""));
    }

    #[test]
    fn rotation_keeps_generations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.jsonl");
        let mut writer = JsonlWriter::open(config_at(path.clone(), 100));
        for _ in 0..10 {
            writer.write_entry(&alert_entry());
        }
        writer.flush();

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        assert!(!rotated_name(&path, 4).exists());
    }

    #[test]
    fn falls_back_when_primary_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.jsonl");
        let mut config = config_at(unopenable(dir.path()), 1024 * 1024);
        config.fallback_path = Some(fallback.clone());
        let mut writer = JsonlWriter::open(config);

        assert_eq!(writer.state(), WriterState::Fallback);
        writer.write_entry(&LogEntry::new(EventType::QueueOverflow, Severity::Warning));
        writer.flush();
        assert!(!fs::read_to_string(&fallback).unwrap().is_empty());
        assert!(!writer.try_recover());
    }

    #[test]
    fn no_fallback_degrades_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonlWriter::open(config_at(unopenable(dir.path()), 1024));
        assert_eq!(writer.state(), WriterState::Stderr);
        assert_eq!(writer.state().as_str(), "stderr");
    }

    #[test]
    fn reopening_appends_and_tracks_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.jsonl");
        {
            let mut writer = JsonlWriter::open(config_at(path.clone(), 1024 * 1024));
            writer.write_entry(&alert_entry());
            writer.flush();
        }
        let writer = JsonlWriter::open(config_at(path.clone(), 1024 * 1024));
        assert_eq!(writer.state(), WriterState::Primary);
        assert_eq!(writer.bytes_written(), fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn for_path_derives_shm_fallback() {
        let config = JsonlConfig::for_path(PathBuf::from("/var/log/swm/activity.jsonl"));
        assert_eq!(
            config.fallback_path,
            Some(PathBuf::from("/dev/shm/activity.jsonl"))
        );
    }
}
