//! Daemon subsystem: event-source readers, single-writer ingestion, tick and
//! snapshot publication, signal handling.

pub mod ingest;
#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod publisher;
#[cfg(feature = "daemon")]
pub mod signals;
