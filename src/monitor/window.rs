//! Window manager: one open, wall-clock-aligned window plus a bounded history of
//! closed windows.
//!
//! Boundaries are `floor(ts / width) * width`, so every producer agrees on which
//! window an instant belongs to regardless of arrival order. Rollover is a single
//! primitive ([`WindowManager::advance`]) shared by event ingestion and the idle
//! tick: whichever caller observes the boundary first closes the window, and the
//! other sees the new window and does nothing.
//!
//! Idle gaps are not back-filled. After a long quiet period the next rollover opens
//! one window at the boundary of the instant that triggered it.

#![allow(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::monitor::classifier::{self, Thresholds, WindowClassification};
use crate::monitor::event::{Event, EventKind, OperationCategories};

/// Per-window category counters. Categories overlap, see [`EventKind::categories`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub read_count: u64,
    pub write_count: u64,
    pub modification_count: u64,
    pub create_count: u64,
    pub delete_count: u64,
    /// Moves. Informational only, not part of any total.
    #[serde(default)]
    pub rename_count: u64,
}

impl WindowCounts {
    /// Increment counters for one event of `kind`.
    pub fn apply(&mut self, kind: EventKind) {
        let categories = kind.categories();
        if categories.contains(OperationCategories::READ_PROXY) {
            self.read_count += 1;
        }
        if categories.contains(OperationCategories::WRITE) {
            self.write_count += 1;
        }
        if categories.contains(OperationCategories::MODIFY) {
            self.modification_count += 1;
        }
        if categories.contains(OperationCategories::CREATE) {
            self.create_count += 1;
        }
        if categories.contains(OperationCategories::DELETE) {
            self.delete_count += 1;
        }
        if kind == EventKind::Moved {
            self.rename_count += 1;
        }
    }

    /// Display total: reads + writes. The other counters are overlays.
    #[must_use]
    pub const fn total_events(&self) -> u64 {
        self.read_count + self.write_count
    }

    /// Sum of all five category counters.
    #[must_use]
    pub const fn category_sum(&self) -> u64 {
        self.read_count
            + self.write_count
            + self.modification_count
            + self.create_count
            + self.delete_count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.category_sum() == 0 && self.rename_count == 0
    }
}

/// A closed (immutable) window, or a frozen view of the open one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_time: f64,
    pub duration_seconds: f64,
    #[serde(flatten)]
    pub counts: WindowCounts,
    pub is_high_load: bool,
    pub is_burst: bool,
    /// Distinct paths that contributed to this window.
    #[serde(default)]
    pub active_paths: usize,
    /// Largest read+write contributor (first in sort order on ties).
    #[serde(default)]
    pub dominant_path: Option<String>,
}

impl TimeWindow {
    #[must_use]
    pub fn empty(start_time: f64, duration_seconds: f64) -> Self {
        Self {
            start_time,
            duration_seconds,
            counts: WindowCounts::default(),
            is_high_load: false,
            is_burst: false,
            active_paths: 0,
            dominant_path: None,
        }
    }

    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration_seconds
    }

    #[must_use]
    pub const fn total_events(&self) -> u64 {
        self.counts.total_events()
    }
}

/// Bounded FIFO of closed windows in chronological order.
#[derive(Debug, Clone)]
pub struct History {
    windows: VecDeque<Arc<TimeWindow>>,
    capacity: usize,
}

impl History {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            windows: VecDeque::with_capacity(capacity.min(4_096)),
            capacity,
        }
    }

    /// Append a closed window, evicting and returning the oldest when full.
    pub fn push(&mut self, window: Arc<TimeWindow>) -> Option<Arc<TimeWindow>> {
        let evicted = if self.windows.len() >= self.capacity {
            self.windows.pop_front()
        } else {
            None
        };
        self.windows.push_back(window);
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Arc<TimeWindow>> {
        self.windows.back()
    }

    /// Chronological iteration over closed windows.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TimeWindow> {
        self.windows.iter().map(Arc::as_ref)
    }

    /// The `limit` most recent windows, oldest first. Clones handles, not windows.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Arc<TimeWindow>> {
        let skip = self.windows.len().saturating_sub(limit);
        self.windows.iter().skip(skip).cloned().collect()
    }
}

/// The mutable window currently accepting events.
#[derive(Debug, Clone)]
struct OpenWindow {
    start_time: f64,
    duration_seconds: f64,
    counts: WindowCounts,
    paths: HashMap<String, WindowCounts>,
    late_events: u64,
}

impl OpenWindow {
    fn new(start_time: f64, duration_seconds: f64) -> Self {
        Self {
            start_time,
            duration_seconds,
            counts: WindowCounts::default(),
            paths: HashMap::new(),
            late_events: 0,
        }
    }

    fn end_time(&self) -> f64 {
        self.start_time + self.duration_seconds
    }

    fn freeze(&self, classification: WindowClassification, dominant: Option<String>) -> TimeWindow {
        TimeWindow {
            start_time: self.start_time,
            duration_seconds: self.duration_seconds,
            counts: self.counts,
            is_high_load: classification.is_high_load,
            is_burst: classification.is_burst,
            active_paths: self.paths.len(),
            dominant_path: dominant,
        }
    }
}

/// What happened when a window closed.
#[derive(Debug, Clone)]
pub struct Rollover {
    pub closed: Arc<TimeWindow>,
    pub evicted: Option<Arc<TimeWindow>>,
    /// Every path tied for the largest contribution to the closed window.
    pub dominant_paths: Vec<String>,
    /// Events dropped for arriving after this window had already been passed.
    pub late_events: u64,
}

/// Where an ingested event landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Counted into the open window.
    Counted,
    /// Older than the open window; dropped.
    Late,
}

/// Owner of the open window and closed history.
#[derive(Debug, Clone)]
pub struct WindowManager {
    open: OpenWindow,
    history: History,
}

impl WindowManager {
    /// Open the window containing `start_ts`.
    #[must_use]
    pub fn new(start_ts: f64, window_seconds: f64, history_capacity: usize) -> Self {
        let start = aligned_start(start_ts, window_seconds);
        Self {
            open: OpenWindow::new(start, window_seconds),
            history: History::new(history_capacity),
        }
    }

    /// Rollover primitive. Closes the open window iff `now` has reached its end.
    ///
    /// A width change in `thresholds` applies to the window opened here. The new
    /// window never starts before the previous one ended.
    /// A non-finite `now` never rolls over.
    pub fn advance(&mut self, now: f64, thresholds: &Thresholds) -> Option<Rollover> {
        if !now.is_finite() || now < self.open.end_time() {
            return None;
        }
        let width = thresholds.time_window_seconds;
        let previous_end = self.open.end_time();
        let aligned = aligned_start(now, width);
        let start = aligned.max(previous_end);
        let end = aligned + width;

        let previous = std::mem::replace(&mut self.open, OpenWindow::new(start, end - start));
        let classification = classifier::classify_window(
            &previous.counts,
            previous.start_time,
            self.history.iter(),
            thresholds,
        );
        let dominant_paths = classifier::dominant_paths(&previous.paths);
        let closed = Arc::new(previous.freeze(classification, dominant_paths.first().cloned()));
        let evicted = self.history.push(Arc::clone(&closed));

        Some(Rollover {
            closed,
            evicted,
            dominant_paths,
            late_events: previous.late_events,
        })
    }

    /// Count `event` into the open window after advancing to its timestamp.
    pub fn ingest(&mut self, event: &Event, thresholds: &Thresholds) -> (Placement, Option<Rollover>) {
        let rollover = self.advance(event.timestamp, thresholds);
        (self.record(event), rollover)
    }

    /// Idle-period rollover driven by wall-clock time.
    pub fn tick(&mut self, now: f64, thresholds: &Thresholds) -> Option<Rollover> {
        self.advance(now, thresholds)
    }

    /// Events older than the open window, or with a non-finite timestamp, are late.
    fn record(&mut self, event: &Event) -> Placement {
        if !event.timestamp.is_finite() || event.timestamp < self.open.start_time {
            self.open.late_events += 1;
            return Placement::Late;
        }
        self.open.counts.apply(event.kind);
        self.open
            .paths
            .entry(event.path.clone())
            .or_default()
            .apply(event.kind);
        Placement::Counted
    }

    /// Frozen copy of the open window, classified against current thresholds.
    #[must_use]
    pub fn current_view(&self, thresholds: &Thresholds) -> (TimeWindow, Vec<String>) {
        let classification = classifier::classify_window(
            &self.open.counts,
            self.open.start_time,
            self.history.iter(),
            thresholds,
        );
        let dominant = classifier::dominant_paths(&self.open.paths);
        (
            self.open.freeze(classification, dominant.first().cloned()),
            dominant,
        )
    }

    /// The open window's contribution from `path`.
    #[must_use]
    pub fn contribution(&self, path: &str) -> Option<&WindowCounts> {
        self.open.paths.get(path)
    }

    /// Every path that contributed to the open window.
    pub fn contributions(&self) -> impl Iterator<Item = (&String, &WindowCounts)> {
        self.open.paths.iter()
    }

    #[must_use]
    pub fn open_counts(&self) -> &WindowCounts {
        &self.open.counts
    }

    #[must_use]
    pub fn open_start(&self) -> f64 {
        self.open.start_time
    }

    #[must_use]
    pub fn open_end(&self) -> f64 {
        self.open.end_time()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }
}

/// Start of the `width`-aligned window containing `ts`.
#[must_use]
pub fn aligned_start(ts: f64, width: f64) -> f64 {
    let mut start = (ts / width).floor() * width;
    // Guard against the quotient rounding across an integer.
    if start > ts {
        start -= width;
    } else if start + width <= ts {
        start += width;
    }
    start
}
