//! The workload engine: one shared handle serializing every mutation of the window
//! manager and path tracker behind a single short critical section.
//!
//! Producers call [`WorkloadEngine::notify`] or [`WorkloadEngine::ingest`] from any
//! thread; a cadence thread calls [`WorkloadEngine::tick`]. Both reach the same
//! rollover primitive under the same lock, so a boundary transition closes exactly
//! one window no matter which caller observes it first.
//!
//! Thresholds and scope sit in their own `RwLock`s and are copied out before the
//! state lock is taken. Activity-log events produced while locked are buffered and
//! sent after the lock is released.

#![allow(missing_docs)]

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::classifier::{self, Thresholds};
use crate::monitor::event::{Event, MalformedEvent, RawEvent, normalize};
use crate::monitor::path_stats::{PathStatistics, PathStatsTracker};
use crate::monitor::scope::MonitoredScope;
use crate::monitor::snapshot::{
    EngineCounters, PathReport, SummaryStats, WorkloadSnapshot,
};
use crate::monitor::window::{Placement, Rollover, TimeWindow, WindowManager};

/// Outcome of ingesting one normalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Counted,
    /// Older than the open window.
    Late,
    /// Outside every monitored root.
    OutOfScope,
}

// ──────────────────── state ────────────────────

#[derive(Debug)]
struct EngineState {
    windows: WindowManager,
    paths: PathStatsTracker,
    /// Paths already reported as high-load in the open window.
    reported_hot: HashSet<String>,
}

#[derive(Debug, Default)]
struct AtomicCounters {
    events_accepted: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_late: AtomicU64,
    out_of_scope: AtomicU64,
    queue_overflow: AtomicU64,
    windows_closed: AtomicU64,
    paths_evicted: AtomicU64,
    /// Drops since the last rollover, for the per-window log line.
    window_malformed: AtomicU64,
    window_out_of_scope: AtomicU64,
}

impl AtomicCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> EngineCounters {
        EngineCounters {
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_late: self.dropped_late.load(Ordering::Relaxed),
            out_of_scope: self.out_of_scope.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
            windows_closed: self.windows_closed.load(Ordering::Relaxed),
            paths_evicted: self.paths_evicted.load(Ordering::Relaxed),
        }
    }
}

// ──────────────────── engine ────────────────────

/// Shared aggregation engine. Wrap in an `Arc` to share across threads.
#[derive(Debug)]
pub struct WorkloadEngine {
    state: Mutex<EngineState>,
    thresholds: RwLock<Thresholds>,
    scope: RwLock<MonitoredScope>,
    counters: AtomicCounters,
    active: AtomicBool,
    history_capacity: usize,
    logger: Option<ActivityLoggerHandle>,
}

impl WorkloadEngine {
    /// Engine whose first window contains the current wall-clock time.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::starting_at(config, now_secs())
    }

    /// Engine whose first window contains `start_ts`. Used for replaying recorded streams.
    #[must_use]
    pub fn starting_at(config: &Config, start_ts: f64) -> Self {
        let thresholds = config.thresholds();
        Self {
            state: Mutex::new(EngineState {
                windows: WindowManager::new(
                    start_ts,
                    thresholds.time_window_seconds,
                    config.engine.history_capacity,
                ),
                paths: PathStatsTracker::new(config.engine.max_tracked_paths),
                reported_hot: HashSet::new(),
            }),
            thresholds: RwLock::new(thresholds),
            scope: RwLock::new(MonitoredScope::from_config(&config.scope)),
            counters: AtomicCounters::default(),
            active: AtomicBool::new(false),
            history_capacity: config.engine.history_capacity.max(1),
            logger: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    // ──────────────────── ingestion ────────────────────

    /// Accept a raw notification. Malformed input is counted and described, never fatal.
    pub fn notify(&self, raw: &RawEvent) -> std::result::Result<Vec<IngestOutcome>, MalformedEvent> {
        match normalize(raw) {
            Ok(normalized) => Ok(normalized.events().map(|e| self.ingest(e)).collect()),
            Err(reason) => {
                self.record_malformed();
                Err(reason)
            }
        }
    }

    /// Count a normalized event into the open window and its path's statistics.
    pub fn ingest(&self, event: &Event) -> IngestOutcome {
        if !self.scope.read().contains(&event.path) {
            AtomicCounters::bump(&self.counters.out_of_scope);
            AtomicCounters::bump(&self.counters.window_out_of_scope);
            return IngestOutcome::OutOfScope;
        }
        let thresholds = *self.thresholds.read();
        let mut pending = Vec::new();

        let outcome = {
            let mut state = self.state.lock();
            let (placement, rollover) = state.windows.ingest(event, &thresholds);
            if let Some(rollover) = rollover {
                self.on_rollover(&mut state, &rollover, &mut pending);
            }
            match placement {
                Placement::Late => {
                    AtomicCounters::bump(&self.counters.dropped_late);
                    IngestOutcome::Late
                }
                Placement::Counted => {
                    AtomicCounters::bump(&self.counters.events_accepted);
                    if let Some(evicted) = state.paths.record(event) {
                        AtomicCounters::bump(&self.counters.paths_evicted);
                        state.reported_hot.remove(&evicted);
                    }
                    check_hotspot(&mut state, &event.path, &thresholds, &mut pending);
                    IngestOutcome::Counted
                }
            }
        };

        self.emit(pending);
        outcome
    }

    /// Count a source record that could not even be decoded.
    pub fn record_malformed(&self) {
        AtomicCounters::bump(&self.counters.dropped_malformed);
        AtomicCounters::bump(&self.counters.window_malformed);
    }

    /// Count events a full ingestion queue refused.
    pub fn record_queue_overflow(&self, dropped: u64) {
        if dropped == 0 {
            return;
        }
        self.counters
            .queue_overflow
            .fetch_add(dropped, Ordering::Relaxed);
        self.emit(vec![ActivityEvent::QueueOverflow { dropped }]);
    }

    // ──────────────────── rollover ────────────────────

    /// Close the open window if the wall clock has passed its end.
    pub fn tick(&self) -> bool {
        self.tick_at(now_secs())
    }

    /// [`Self::tick`] against an explicit clock. Returns whether a window closed.
    pub fn tick_at(&self, now: f64) -> bool {
        let thresholds = *self.thresholds.read();
        let mut pending = Vec::new();
        let closed = {
            let mut state = self.state.lock();
            match state.windows.tick(now, &thresholds) {
                Some(rollover) => {
                    self.on_rollover(&mut state, &rollover, &mut pending);
                    true
                }
                None => false,
            }
        };
        self.emit(pending);
        closed
    }

    fn on_rollover(
        &self,
        state: &mut EngineState,
        rollover: &Rollover,
        pending: &mut Vec<ActivityEvent>,
    ) {
        AtomicCounters::bump(&self.counters.windows_closed);
        state.reported_hot.clear();

        let closed = &rollover.closed;
        if closed.is_burst {
            state.paths.set_burst_paths(&rollover.dominant_paths);
        } else {
            state.paths.set_burst_paths(&[]);
        }

        if closed.is_high_load || closed.is_burst {
            pending.push(ActivityEvent::WindowAlert {
                window_start: closed.start_time,
                duration_seconds: closed.duration_seconds,
                read_count: closed.counts.read_count,
                write_count: closed.counts.write_count,
                modification_count: closed.counts.modification_count,
                high_load: closed.is_high_load,
                burst: closed.is_burst,
                dominant_path: closed.dominant_path.clone(),
            });
        }

        let malformed = self.counters.window_malformed.swap(0, Ordering::Relaxed);
        let out_of_scope = self.counters.window_out_of_scope.swap(0, Ordering::Relaxed);
        if rollover.late_events + malformed + out_of_scope > 0 {
            pending.push(ActivityEvent::EventsDropped {
                window_start: closed.start_time,
                late: rollover.late_events,
                malformed,
                out_of_scope,
            });
        }
    }

    fn emit(&self, events: Vec<ActivityEvent>) {
        if let Some(logger) = &self.logger {
            for event in events {
                logger.send(event);
            }
        }
    }

    // ──────────────────── reads ────────────────────

    /// Snapshot with up to `history_capacity` closed windows.
    #[must_use]
    pub fn snapshot(&self) -> WorkloadSnapshot {
        self.snapshot_with_history(self.history_capacity)
    }

    /// Snapshot including at most `history_limit` of the newest closed windows.
    #[must_use]
    pub fn snapshot_with_history(&self, history_limit: usize) -> WorkloadSnapshot {
        let thresholds = *self.thresholds.read();
        let (current_window, recent_history, mut hotspot_paths, total_paths_monitored) = {
            let state = self.state.lock();
            let (current, _) = state.windows.current_view(&thresholds);
            let recent = state.windows.history().recent(history_limit);
            let hotspots = collect_hotspots(&state, &thresholds);
            (current, recent, hotspots, state.paths.len())
        };

        hotspot_paths.sort_by(|a, b| {
            b.total_events()
                .cmp(&a.total_events())
                .then_with(|| a.path.cmp(&b.path))
        });

        WorkloadSnapshot {
            taken_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            timestamp: now_secs(),
            current_window,
            recent_history,
            hotspot_paths,
            total_paths_monitored,
            monitoring_active: self.is_active(),
            thresholds,
            counters: self.counters(),
        }
    }

    /// Lifetime statistics for `path`, flags evaluated against current thresholds.
    #[must_use]
    pub fn stats_for(&self, path: &str) -> Option<PathStatistics> {
        let thresholds = *self.thresholds.read();
        let state = self.state.lock();
        state
            .paths
            .get(path)
            .map(|stats| with_live_flags(&state, stats, &thresholds))
    }

    /// [`Self::stats_for`] plus the path's share of the open window.
    #[must_use]
    pub fn path_report(&self, path: &str) -> Option<PathReport> {
        let thresholds = *self.thresholds.read();
        let state = self.state.lock();
        let stats = state.paths.get(path)?;
        Some(PathReport {
            stats: with_live_flags(&state, stats, &thresholds),
            window_start: state.windows.open_start(),
            current_window: state
                .windows
                .contribution(path)
                .copied()
                .unwrap_or_default(),
        })
    }

    /// The `limit` newest closed windows, oldest first.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<Arc<TimeWindow>> {
        self.state.lock().windows.history().recent(limit)
    }

    /// Totals and averages over the `limit` newest closed windows.
    #[must_use]
    pub fn summary(&self, limit: usize) -> SummaryStats {
        let thresholds = *self.thresholds.read();
        let (windows, hotspot_count, paths_monitored) = {
            let state = self.state.lock();
            (
                state.windows.history().recent(limit),
                collect_hotspots(&state, &thresholds).len(),
                state.paths.len(),
            )
        };
        SummaryStats::from_windows(&windows, hotspot_count, paths_monitored)
    }

    #[must_use]
    pub fn counters(&self) -> EngineCounters {
        self.counters.load()
    }

    // ──────────────────── configuration ────────────────────

    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        *self.thresholds.read()
    }

    /// Swap thresholds. Takes effect on the next classification; a new window width
    /// takes effect at the next rollover.
    pub fn set_thresholds(&self, thresholds: Thresholds) -> Result<()> {
        thresholds.validate()?;
        let previous = std::mem::replace(&mut *self.thresholds.write(), thresholds);
        if previous != thresholds {
            self.emit(vec![ActivityEvent::ThresholdsReloaded {
                details: describe_thresholds(&thresholds),
            }]);
        }
        Ok(())
    }

    pub fn set_scope(&self, scope: MonitoredScope) {
        *self.scope.write() = scope;
    }

    // ──────────────────── lifecycle ────────────────────

    pub fn start(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Mark monitoring inactive. Counting continues for any events still delivered.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

// ──────────────────── helpers ────────────────────

fn check_hotspot(
    state: &mut EngineState,
    path: &str,
    thresholds: &Thresholds,
    pending: &mut Vec<ActivityEvent>,
) {
    let Some(contribution) = state.windows.contribution(path).copied() else {
        return;
    };
    if !classifier::exceeds_load(&contribution, thresholds) || state.reported_hot.contains(path) {
        return;
    }
    state.reported_hot.insert(path.to_string());
    pending.push(ActivityEvent::HotspotDetected {
        path: path.to_string(),
        window_start: state.windows.open_start(),
        read_count: contribution.read_count,
        write_count: contribution.write_count,
        modification_count: contribution.modification_count,
    });
}

fn with_live_flags(
    state: &EngineState,
    stats: &PathStatistics,
    thresholds: &Thresholds,
) -> PathStatistics {
    let mut stats = stats.clone();
    stats.is_high_load = state
        .windows
        .contribution(&stats.path)
        .is_some_and(|c| classifier::exceeds_load(c, thresholds));
    stats
}

/// Open-window high-load paths plus the burst contributors of the last closed window.
fn collect_hotspots(state: &EngineState, thresholds: &Thresholds) -> Vec<PathStatistics> {
    let mut names: BTreeSet<&str> = state
        .windows
        .contributions()
        .filter(|(_, counts)| classifier::exceeds_load(counts, thresholds))
        .map(|(path, _)| path.as_str())
        .collect();
    names.extend(state.paths.burst_paths().iter().map(String::as_str));

    names
        .into_iter()
        .filter_map(|path| state.paths.get(path))
        .map(|stats| with_live_flags(state, stats, thresholds))
        .filter(PathStatistics::is_hotspot)
        .collect()
}

fn describe_thresholds(t: &Thresholds) -> String {
    format!(
        "window={}s read>{} write>{} modify>{} burst>{}x over {}s",
        t.time_window_seconds,
        t.read_frequency_threshold,
        t.write_frequency_threshold,
        t.modification_rate_threshold,
        t.burst_intensity_multiplier,
        t.burst_time_window_seconds
    )
}

/// Wall-clock seconds since the Unix epoch.
#[must_use]
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
