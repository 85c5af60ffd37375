//! Read-only views handed to consumers: snapshots, summaries and path reports.
//!
//! Everything here is an owned copy. Closed windows are shared by `Arc`, so a
//! snapshot never holds the engine lock while it is serialized or rendered.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::monitor::classifier::Thresholds;
use crate::monitor::path_stats::PathStatistics;
use crate::monitor::window::{TimeWindow, WindowCounts};

/// Soft-condition counters. None of these are errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCounters {
    pub events_accepted: u64,
    pub dropped_malformed: u64,
    pub dropped_late: u64,
    pub out_of_scope: u64,
    pub queue_overflow: u64,
    pub windows_closed: u64,
    #[serde(default)]
    pub paths_evicted: u64,
}

impl EngineCounters {
    /// Events that never reached a window.
    #[must_use]
    pub const fn dropped_total(&self) -> u64 {
        self.dropped_malformed + self.dropped_late + self.out_of_scope + self.queue_overflow
    }
}

/// Consistent point-in-time view of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    /// RFC3339 UTC time the snapshot was taken.
    pub taken_at: String,
    /// Engine clock (seconds since epoch) at the time of the snapshot.
    pub timestamp: f64,
    pub current_window: TimeWindow,
    /// Most recent closed windows, oldest first.
    pub recent_history: Vec<Arc<TimeWindow>>,
    /// Paths currently high-load or burst, busiest first.
    pub hotspot_paths: Vec<PathStatistics>,
    pub total_paths_monitored: usize,
    pub monitoring_active: bool,
    pub thresholds: Thresholds,
    pub counters: EngineCounters,
}

impl WorkloadSnapshot {
    /// Whether the open window or the newest closed window is alerting.
    #[must_use]
    pub fn is_alerting(&self) -> bool {
        self.current_window.is_high_load
            || self.current_window.is_burst
            || self
                .recent_history
                .last()
                .is_some_and(|w| w.is_high_load || w.is_burst)
    }
}

/// Aggregates over the most recent closed windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub windows_analyzed: usize,
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_modifications: u64,
    pub total_creates: u64,
    pub total_deletes: u64,
    pub total_renames: u64,
    pub avg_reads_per_window: f64,
    pub avg_writes_per_window: f64,
    pub avg_modifications_per_window: f64,
    pub high_load_windows: usize,
    pub burst_windows: usize,
    pub hotspot_count: usize,
    pub paths_monitored: usize,
}

impl SummaryStats {
    #[must_use]
    pub fn from_windows(
        windows: &[Arc<TimeWindow>],
        hotspot_count: usize,
        paths_monitored: usize,
    ) -> Self {
        let mut summary = Self {
            windows_analyzed: windows.len(),
            hotspot_count,
            paths_monitored,
            ..Self::default()
        };
        for window in windows {
            let c = &window.counts;
            summary.total_reads += c.read_count;
            summary.total_writes += c.write_count;
            summary.total_modifications += c.modification_count;
            summary.total_creates += c.create_count;
            summary.total_deletes += c.delete_count;
            summary.total_renames += c.rename_count;
            summary.high_load_windows += usize::from(window.is_high_load);
            summary.burst_windows += usize::from(window.is_burst);
        }
        if !windows.is_empty() {
            let n = windows.len() as f64;
            summary.avg_reads_per_window = summary.total_reads as f64 / n;
            summary.avg_writes_per_window = summary.total_writes as f64 / n;
            summary.avg_modifications_per_window = summary.total_modifications as f64 / n;
        }
        summary
    }

    /// Reads + writes over the analyzed windows.
    #[must_use]
    pub const fn total_events(&self) -> u64 {
        self.total_reads + self.total_writes
    }
}

/// A path's lifetime statistics plus its share of the open window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathReport {
    pub stats: PathStatistics,
    pub window_start: f64,
    pub current_window: WindowCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: f64, reads: u64, writes: u64, high: bool, burst: bool) -> Arc<TimeWindow> {
        let mut w = TimeWindow::empty(start, 1.0);
        w.counts.read_count = reads;
        w.counts.write_count = writes;
        w.counts.modification_count = writes;
        w.is_high_load = high;
        w.is_burst = burst;
        Arc::new(w)
    }

    #[test]
    fn summary_of_nothing_is_zeroed() {
        let summary = SummaryStats::from_windows(&[], 0, 3);
        assert_eq!(summary.windows_analyzed, 0);
        assert_eq!(summary.paths_monitored, 3);
        assert!(summary.avg_reads_per_window.abs() < f64::EPSILON);
    }

    #[test]
    fn summary_totals_and_averages() {
        let windows = vec![
            window(0.0, 10, 4, false, false),
            window(1.0, 20, 6, true, false),
            window(2.0, 30, 2, false, true),
        ];
        let summary = SummaryStats::from_windows(&windows, 2, 7);
        assert_eq!(summary.windows_analyzed, 3);
        assert_eq!(summary.total_reads, 60);
        assert_eq!(summary.total_writes, 12);
        assert_eq!(summary.total_events(), 72);
        assert!((summary.avg_reads_per_window - 20.0).abs() < 1e-9);
        assert!((summary.avg_writes_per_window - 4.0).abs() < 1e-9);
        assert!((summary.avg_modifications_per_window - 4.0).abs() < 1e-9);
        assert_eq!(summary.high_load_windows, 1);
        assert_eq!(summary.burst_windows, 1);
        assert_eq!(summary.hotspot_count, 2);
    }

    #[test]
    fn counters_sum_drops() {
        let counters = EngineCounters {
            events_accepted: 10,
            dropped_malformed: 1,
            dropped_late: 2,
            out_of_scope: 3,
            queue_overflow: 4,
            windows_closed: 5,
            paths_evicted: 0,
        };
        assert_eq!(counters.dropped_total(), 10);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = WorkloadSnapshot {
            taken_at: "2026-01-01T00:00:00.000Z".to_string(),
            timestamp: 3.5,
            current_window: TimeWindow::empty(3.0, 1.0),
            recent_history: vec![window(2.0, 1, 1, false, true)],
            hotspot_paths: Vec::new(),
            total_paths_monitored: 1,
            monitoring_active: true,
            thresholds: Thresholds::default(),
            counters: EngineCounters::default(),
        };
        assert!(snapshot.is_alerting());
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: WorkloadSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.recent_history.len(), 1);
        assert!(back.recent_history[0].is_burst);
        assert!(back.monitoring_active);
    }
}
