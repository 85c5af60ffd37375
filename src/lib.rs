#![forbid(unsafe_code)]

//! SAN workload monitor (swm): windowed aggregation of file-system change events.
//!
//! Raw change notifications from any number of producers are normalized, counted
//! into wall-clock-aligned time windows, folded into lifetime per-path statistics
//! and classified as high-load or bursty against runtime-adjustable thresholds.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use san_workload_monitor::prelude::*;
//!
//! let config = Config::default();
//! let engine = WorkloadEngine::new(&config);
//! engine.notify(&RawEvent::new("/san/vol1/file.dat", "modified", false, 1_700_000_000.0)).ok();
//! let snapshot = engine.snapshot();
//! println!("{} paths monitored", snapshot.total_paths_monitored);
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
