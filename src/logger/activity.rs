//! Activity logger: a dedicated thread owns the [`JsonlWriter`].
//!
//! Every other thread sends [`ActivityEvent`]s over a bounded crossbeam channel.
//! `try_send()` keeps ingestion and rollover from ever waiting on log I/O; events
//! that do not fit are counted and reported as a single warning line later.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SwmError};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity, WriterState};

// ──────────────────── channel capacity ────────────────────

const CHANNEL_CAPACITY: usize = 1024;

/// Entries written while degraded between attempts to reopen the primary log.
const RECOVERY_INTERVAL: u64 = 256;

// ──────────────────── public event type ────────────────────

/// Events recorded in the activity log.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    MonitorStarted {
        version: String,
        config_hash: String,
    },
    MonitorStopped {
        reason: String,
        uptime_secs: u64,
    },
    ThresholdsReloaded {
        details: String,
    },
    /// A closed window crossed a load threshold or burst.
    WindowAlert {
        window_start: f64,
        duration_seconds: f64,
        read_count: u64,
        write_count: u64,
        modification_count: u64,
        high_load: bool,
        burst: bool,
        dominant_path: Option<String>,
    },
    /// A path's open-window contribution crossed a load threshold.
    HotspotDetected {
        path: String,
        window_start: f64,
        read_count: u64,
        write_count: u64,
        modification_count: u64,
    },
    /// Per-window tally of events that never reached a window.
    EventsDropped {
        window_start: f64,
        late: u64,
        malformed: u64,
        out_of_scope: u64,
    },
    QueueOverflow {
        dropped: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel asking the logger thread to flush and exit.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cloneable, non-blocking handle onto the logger thread.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl std::fmt::Debug for ActivityLoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLoggerHandle")
            .field("dropped_events", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

impl ActivityLoggerHandle {
    /// Queue `event`. Drops it (and counts the drop) if the channel is full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only until the sentinel is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }

    /// Handle whose receiver is held by the caller. Used to observe emitted events.
    #[must_use]
    pub fn detached(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }
}

// ──────────────────── configuration ────────────────────

pub struct ActivityLoggerConfig {
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread. It runs until `shutdown()` or until every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("swm-logger".to_string())
        .spawn(move || {
            logger_thread_main(rx, config.jsonl_config, dropped_clone);
        })
        .map_err(|e| SwmError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(rx: Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: Arc<AtomicU64>) {
    let mut jsonl = JsonlWriter::open(jsonl_config);
    let mut degraded_writes = 0_u64;

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));

        if jsonl.state() == WriterState::Primary {
            degraded_writes = 0;
        } else {
            degraded_writes += 1;
            if degraded_writes % RECOVERY_INTERVAL == 0 {
                jsonl.try_recover();
            }
        }
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::MonitorStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::MonitorStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::MonitorStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::MonitorStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ThresholdsReloaded { details } => {
            let mut e = LogEntry::new(EventType::ThresholdReload, Severity::Info);
            e.details = Some(details.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::WindowAlert {
            window_start,
            duration_seconds,
            read_count,
            write_count,
            modification_count,
            high_load,
            burst,
            dominant_path,
        } => {
            let severity = if *high_load && *burst {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::WindowAlert, severity);
            e.window_start = Some(*window_start);
            e.window_secs = Some(*duration_seconds);
            e.reads = Some(*read_count);
            e.writes = Some(*write_count);
            e.modifications = Some(*modification_count);
            e.high_load = Some(*high_load);
            e.burst = Some(*burst);
            e.path.clone_from(dominant_path);
            e
        }
        ActivityEvent::HotspotDetected {
            path,
            window_start,
            read_count,
            write_count,
            modification_count,
        } => {
            let mut e = LogEntry::new(EventType::HotspotDetected, Severity::Warning);
            e.path = Some(path.clone());
            e.window_start = Some(*window_start);
            e.reads = Some(*read_count);
            e.writes = Some(*write_count);
            e.modifications = Some(*modification_count);
            e.high_load = Some(true);
            e
        }
        ActivityEvent::EventsDropped {
            window_start,
            late,
            malformed,
            out_of_scope,
        } => {
            let mut e = LogEntry::new(EventType::EventsDropped, Severity::Info);
            e.window_start = Some(*window_start);
            e.dropped = Some(late + malformed + out_of_scope);
            e.details = Some(format!(
                "late={late} malformed={malformed} out_of_scope={out_of_scope}"
            ));
            e
        }
        ActivityEvent::QueueOverflow { dropped } => {
            let mut e = LogEntry::new(EventType::QueueOverflow, Severity::Warning);
            e.dropped = Some(*dropped);
            e.ok = Some(false);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::MonitorStop, Severity::Info),
    }
}

// ──────────────────── tests ────────────────────
