//! Aggregation engine: event normalization, time windows, per-path statistics,
//! threshold classification and snapshot views.

pub mod classifier;
pub mod engine;
pub mod event;
pub mod path_stats;
pub mod scope;
pub mod snapshot;
pub mod window;
