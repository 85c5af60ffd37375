//! Path Statistics Tracker: cumulative, lifetime counters per observed path.
//!
//! Counters here are never reset by window rollover and never touched by history
//! eviction. The optional cap evicts the least-recently-accessed path when a new
//! path would exceed it.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::monitor::event::{Event, EventKind, OperationCategories};

/// Lifetime statistics for one path.
///
/// `is_high_load` and `is_burst` describe the path's role in the open and most
/// recently closed windows respectively; they are refreshed by the engine when the
/// statistics are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStatistics {
    pub path: String,
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_modifications: u64,
    pub total_creates: u64,
    pub total_deletes: u64,
    #[serde(default)]
    pub total_renames: u64,
    pub last_accessed: f64,
    pub last_event_kind: EventKind,
    #[serde(default)]
    pub is_directory: bool,
    pub is_high_load: bool,
    pub is_burst: bool,
}

impl PathStatistics {
    fn first_seen(event: &Event) -> Self {
        Self {
            path: event.path.clone(),
            total_reads: 0,
            total_writes: 0,
            total_modifications: 0,
            total_creates: 0,
            total_deletes: 0,
            total_renames: 0,
            last_accessed: event.timestamp,
            last_event_kind: event.kind,
            is_directory: event.is_directory,
            is_high_load: false,
            is_burst: false,
        }
    }

    fn apply(&mut self, event: &Event) {
        let categories = event.categories();
        if categories.contains(OperationCategories::READ_PROXY) {
            self.total_reads += 1;
        }
        if categories.contains(OperationCategories::WRITE) {
            self.total_writes += 1;
        }
        if categories.contains(OperationCategories::MODIFY) {
            self.total_modifications += 1;
        }
        if categories.contains(OperationCategories::CREATE) {
            self.total_creates += 1;
        }
        if categories.contains(OperationCategories::DELETE) {
            self.total_deletes += 1;
        }
        if event.kind == EventKind::Moved {
            self.total_renames += 1;
        }
        // Late deliveries still count but must not move the clock backwards.
        if event.timestamp >= self.last_accessed {
            self.last_accessed = event.timestamp;
            self.last_event_kind = event.kind;
        }
        self.is_directory = event.is_directory;
    }

    /// Lifetime reads + writes.
    #[must_use]
    pub const fn total_events(&self) -> u64 {
        self.total_reads + self.total_writes
    }

    /// Cosmetic label of the most recent operation.
    #[must_use]
    pub const fn last_operation(&self) -> &'static str {
        self.last_event_kind.operation_label()
    }

    #[must_use]
    pub const fn is_hotspot(&self) -> bool {
        self.is_high_load || self.is_burst
    }
}

#[derive(Debug, Clone)]
struct TrackedPath {
    stats: PathStatistics,
    touch_seq: u64,
}

/// Map of path → [`PathStatistics`] with optional least-recently-accessed cap.
#[derive(Debug, Clone, Default)]
pub struct PathStatsTracker {
    paths: HashMap<String, TrackedPath>,
    /// touch sequence → path, oldest first. Only maintained when capped.
    recency: BTreeMap<u64, String>,
    next_seq: u64,
    max_paths: usize,
    evicted: u64,
    burst_paths: Vec<String>,
}

impl PathStatsTracker {
    /// `max_paths == 0` means unbounded.
    #[must_use]
    pub fn new(max_paths: usize) -> Self {
        Self {
            max_paths,
            ..Self::default()
        }
    }

    /// Fold `event` into its path's counters. Returns the path evicted to make room, if any.
    pub fn record(&mut self, event: &Event) -> Option<String> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let capped = self.max_paths > 0;

        if let Some(tracked) = self.paths.get_mut(&event.path) {
            tracked.stats.apply(event);
            if capped {
                self.recency.remove(&tracked.touch_seq);
                self.recency.insert(seq, event.path.clone());
            }
            tracked.touch_seq = seq;
            return None;
        }

        let evicted = if capped && self.paths.len() >= self.max_paths {
            self.evict_oldest()
        } else {
            None
        };

        let mut stats = PathStatistics::first_seen(event);
        stats.apply(event);
        if capped {
            self.recency.insert(seq, event.path.clone());
        }
        self.paths.insert(
            event.path.clone(),
            TrackedPath {
                stats,
                touch_seq: seq,
            },
        );
        evicted
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, path) = self.recency.pop_first()?;
        self.paths.remove(&path);
        self.burst_paths.retain(|p| p != &path);
        self.evicted += 1;
        Some(path)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&PathStatistics> {
        self.paths.get(path).map(|t| &t.stats)
    }

    /// Replace the set of paths flagged as burst contributors.
    pub fn set_burst_paths(&mut self, paths: &[String]) {
        for old in std::mem::take(&mut self.burst_paths) {
            if let Some(tracked) = self.paths.get_mut(&old) {
                tracked.stats.is_burst = false;
            }
        }
        for path in paths {
            if let Some(tracked) = self.paths.get_mut(path) {
                tracked.stats.is_burst = true;
                self.burst_paths.push(path.clone());
            }
        }
    }

    /// Paths currently flagged as burst contributors.
    #[must_use]
    pub fn burst_paths(&self) -> &[String] {
        &self.burst_paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of paths dropped by the cap since startup.
    #[must_use]
    pub const fn evicted_count(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathStatistics> {
        self.paths.values().map(|t| &t.stats)
    }
}
