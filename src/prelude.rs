//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use san_workload_monitor::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SwmError};

// Monitor
pub use crate::monitor::classifier::{Thresholds, WindowClassification};
pub use crate::monitor::engine::{IngestOutcome, WorkloadEngine};
pub use crate::monitor::event::{Event, EventKind, MalformedEvent, OperationCategories, RawEvent};
pub use crate::monitor::path_stats::PathStatistics;
pub use crate::monitor::scope::MonitoredScope;
pub use crate::monitor::snapshot::{EngineCounters, PathReport, SummaryStats, WorkloadSnapshot};
pub use crate::monitor::window::{TimeWindow, WindowCounts};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
