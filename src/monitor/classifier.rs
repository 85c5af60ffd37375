//! Threshold classifier: high-load and burst decisions over window counters.
//!
//! Every function here is pure: the same counters, thresholds and history always
//! yield the same answer, so callers may re-run classification whenever thresholds
//! change without tracking what was decided earlier.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SwmError};
use crate::monitor::window::{TimeWindow, WindowCounts};

/// Read-only classification policy. Counts are per window, never cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub time_window_seconds: f64,
    pub read_frequency_threshold: u64,
    pub write_frequency_threshold: u64,
    pub modification_rate_threshold: u64,
    pub burst_intensity_multiplier: f64,
    pub burst_time_window_seconds: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            time_window_seconds: 1.0,
            read_frequency_threshold: 100,
            write_frequency_threshold: 100,
            modification_rate_threshold: 50,
            burst_intensity_multiplier: 3.0,
            burst_time_window_seconds: 5.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        if !(self.time_window_seconds.is_finite() && self.time_window_seconds > 0.0) {
            return Err(SwmError::InvalidConfig {
                details: format!(
                    "time_window_seconds must be > 0, got {}",
                    self.time_window_seconds
                ),
            });
        }
        if !(self.burst_intensity_multiplier.is_finite() && self.burst_intensity_multiplier >= 1.0)
        {
            return Err(SwmError::InvalidConfig {
                details: format!(
                    "thresholds.burst_intensity_multiplier must be >= 1.0, got {}",
                    self.burst_intensity_multiplier
                ),
            });
        }
        if !(self.burst_time_window_seconds.is_finite() && self.burst_time_window_seconds > 0.0) {
            return Err(SwmError::InvalidConfig {
                details: format!(
                    "thresholds.burst_time_window_seconds must be > 0, got {}",
                    self.burst_time_window_seconds
                ),
            });
        }
        Ok(())
    }
}

/// Mean read+write activity over the trailing burst range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstBaseline {
    pub windows: usize,
    pub mean_total: f64,
}

/// Result of classifying one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowClassification {
    pub is_high_load: bool,
    pub is_burst: bool,
}

impl WindowClassification {
    #[must_use]
    pub const fn is_alert(self) -> bool {
        self.is_high_load || self.is_burst
    }
}

/// Any one of the three rate thresholds strictly exceeded.
#[must_use]
pub fn exceeds_load(counts: &WindowCounts, thresholds: &Thresholds) -> bool {
    counts.read_count > thresholds.read_frequency_threshold
        || counts.write_count > thresholds.write_frequency_threshold
        || counts.modification_count > thresholds.modification_rate_threshold
}

/// Baseline over closed windows starting within `[window_start - burst range, window_start)`.
///
/// `history` must be chronological. Returns `None` when fewer than two windows
/// fall in range.
pub fn burst_baseline<'a, I>(history: I, window_start: f64, thresholds: &Thresholds) -> Option<BurstBaseline>
where
    I: IntoIterator<Item = &'a TimeWindow>,
    I::IntoIter: DoubleEndedIterator,
{
    let lower = window_start - thresholds.burst_time_window_seconds;
    let mut windows = 0_usize;
    let mut sum = 0_u64;
    for window in history
        .into_iter()
        .rev()
        .skip_while(|w| w.start_time >= window_start)
        .take_while(|w| w.start_time >= lower)
    {
        windows += 1;
        sum = sum.saturating_add(window.total_events());
    }
    if windows < 2 {
        return None;
    }
    Some(BurstBaseline {
        windows,
        mean_total: sum as f64 / windows as f64,
    })
}

/// Strictly above `mean * multiplier`. No baseline means no burst.
#[must_use]
pub fn is_burst(total: u64, baseline: Option<BurstBaseline>, multiplier: f64) -> bool {
    baseline.is_some_and(|b| total as f64 > b.mean_total * multiplier)
}

/// Classify a window's counters against thresholds and the history preceding it.
pub fn classify_window<'a, I>(
    counts: &WindowCounts,
    window_start: f64,
    history: I,
    thresholds: &Thresholds,
) -> WindowClassification
where
    I: IntoIterator<Item = &'a TimeWindow>,
    I::IntoIter: DoubleEndedIterator,
{
    let baseline = burst_baseline(history, window_start, thresholds);
    WindowClassification {
        is_high_load: exceeds_load(counts, thresholds),
        is_burst: is_burst(
            counts.total_events(),
            baseline,
            thresholds.burst_intensity_multiplier,
        ),
    }
}

/// Paths with the largest read+write contribution, sorted. Empty if nothing was counted.
#[must_use]
pub fn dominant_paths(contributions: &HashMap<String, WindowCounts>) -> Vec<String> {
    let Some(max) = contributions
        .values()
        .map(WindowCounts::total_events)
        .max()
        .filter(|max| *max > 0)
    else {
        return Vec::new();
    };
    let mut paths: Vec<String> = contributions
        .iter()
        .filter(|(_, counts)| counts.total_events() == max)
        .map(|(path, _)| path.clone())
        .collect();
    paths.sort();
    paths
}
