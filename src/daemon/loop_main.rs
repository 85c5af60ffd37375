//! Daemon loop: event sources feed one ingest writer, the main thread drives the clock.
//!
//! Threads:
//! - **Reader threads** (`swm-src-*`): one per source, decode JSONL into the ingest queue
//! - **Ingest writer** (`swm-ingest`): the only thread that feeds the engine
//! - **Logger thread** (`swm-logger`): writes the activity JSONL log
//! - **Main thread**: ticks the engine, publishes the state file, handles signals
//!
//! Readers blocked on a live stream cannot be interrupted. On a signal the loop
//! stops waiting for them, publishes a final snapshot and lets process exit reap them.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::ingest::{
    EventSource, IngestQueue, SourceReport, WriterReport, spawn_reader, spawn_writer,
};
use crate::daemon::publisher::SnapshotPublisher;
use crate::daemon::signals::SignalHandler;
use crate::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use crate::logger::jsonl::JsonlConfig;
use crate::monitor::engine::WorkloadEngine;
use crate::monitor::scope::MonitoredScope;
use crate::monitor::snapshot::EngineCounters;

/// Arguments for `swm daemon`.
#[derive(Debug, Clone)]
pub struct DaemonArgs {
    pub sources: Vec<EventSource>,
    /// Keep ticking and publishing after every source has ended.
    pub linger: bool,
}

impl Default for DaemonArgs {
    fn default() -> Self {
        Self {
            sources: vec![EventSource::Stdin],
            linger: false,
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    SourcesExhausted,
}

impl StopReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::SourcesExhausted => "sources exhausted",
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct DaemonReport {
    pub reason: StopReason,
    pub uptime_secs: u64,
    pub sources: Vec<SourceReport>,
    /// `None` when readers were still blocked at shutdown.
    pub writer: Option<WriterReport>,
    pub counters: EngineCounters,
}

// ──────────────────── main daemon struct ────────────────────

pub struct MonitorDaemon {
    config: Config,
    args: DaemonArgs,
    engine: Arc<WorkloadEngine>,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    signal_handler: SignalHandler,
    publisher: SnapshotPublisher,
    start_time: Instant,
}

impl MonitorDaemon {
    /// Build the daemon and register OS signal handlers.
    pub fn init(config: Config, args: DaemonArgs) -> Result<Self> {
        Self::init_with_signals(config, args, SignalHandler::install())
    }

    /// Build the daemon around an existing signal handler.
    pub fn init_with_signals(
        config: Config,
        args: DaemonArgs,
        signal_handler: SignalHandler,
    ) -> Result<Self> {
        let logger_config = ActivityLoggerConfig {
            jsonl_config: JsonlConfig::for_path(config.paths.jsonl_log.clone()),
            ..ActivityLoggerConfig::default()
        };
        let (logger_handle, logger_join) = spawn_logger(logger_config)?;

        let engine = Arc::new(WorkloadEngine::new(&config).with_logger(logger_handle.clone()));
        let publisher = SnapshotPublisher::new(
            config.paths.state_file.clone(),
            Duration::from_millis(config.engine.snapshot_interval_ms),
            config.engine.publish_history_limit,
        );

        Ok(Self {
            config,
            args,
            engine,
            logger_handle,
            logger_join: Some(logger_join),
            signal_handler,
            publisher,
            start_time: Instant::now(),
        })
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<WorkloadEngine> {
        &self.engine
    }

    #[must_use]
    pub fn signals(&self) -> SignalHandler {
        self.signal_handler.clone()
    }

    /// Run until a shutdown signal, or until every source ends (unless lingering).
    pub fn run(mut self) -> Result<DaemonReport> {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.logger_handle.send(ActivityEvent::MonitorStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
        });
        self.engine.start();
        eprintln!(
            "[SWM-DAEMON] monitoring {} source(s), window={}s",
            self.args.sources.len(),
            self.engine.thresholds().time_window_seconds
        );

        let (queue, writer_join) = spawn_writer(
            Arc::clone(&self.engine),
            self.config.engine.ingest_queue_capacity,
        )?;
        let mut readers = self.spawn_readers(&queue)?;
        drop(queue);

        let reason = loop {
            if self.signal_handler.should_shutdown() {
                break StopReason::Signal;
            }
            if self.signal_handler.should_reload() {
                self.handle_config_reload();
            }

            self.engine.tick();

            let dropped_log_events = self.logger_handle.dropped_events();
            if self.signal_handler.should_publish() {
                if let Err(e) = self.publisher.publish(&self.engine, dropped_log_events) {
                    eprintln!("[SWM-DAEMON] failed to write state file: {e}");
                }
            } else {
                self.publisher.maybe_publish(&self.engine, dropped_log_events);
            }

            if !self.args.linger && readers.iter().all(thread::JoinHandle::is_finished) {
                break StopReason::SourcesExhausted;
            }

            thread::sleep(Duration::from_millis(self.config.engine.tick_interval_ms.max(1)));
        };

        let sources = self.collect_readers(&mut readers);
        let writer = if readers.is_empty() {
            match writer_join.join() {
                Ok(report) => Some(report),
                Err(_) => {
                    eprintln!("[SWM-DAEMON] ingest writer panicked");
                    None
                }
            }
        } else {
            eprintln!(
                "[SWM-DAEMON] {} source(s) still blocked, not waiting for them",
                readers.len()
            );
            None
        };

        Ok(self.shutdown(reason, sources, writer))
    }

    fn spawn_readers(
        &self,
        queue: &IngestQueue,
    ) -> Result<Vec<thread::JoinHandle<Result<SourceReport>>>> {
        self.args
            .sources
            .iter()
            .map(|source| spawn_reader(source.clone(), queue.clone()))
            .collect()
    }

    /// Join the readers that have finished. Unfinished ones stay in `readers`.
    fn collect_readers(
        &self,
        readers: &mut Vec<thread::JoinHandle<Result<SourceReport>>>,
    ) -> Vec<SourceReport> {
        let mut reports = Vec::new();
        let mut pending = Vec::new();
        for handle in readers.drain(..) {
            if !handle.is_finished() {
                pending.push(handle);
                continue;
            }
            match handle.join() {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    eprintln!("[SWM-DAEMON] event source failed: {e}");
                    self.logger_handle.send(ActivityEvent::Error {
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
                Err(_) => eprintln!("[SWM-DAEMON] reader thread panicked"),
            }
        }
        *readers = pending;
        reports
    }

    fn handle_config_reload(&mut self) {
        eprintln!("[SWM-DAEMON] config reload requested (SIGHUP)");

        match Config::load(Some(&self.config.paths.config_file)) {
            Ok(new_config) => {
                let old_hash = self.config.stable_hash().unwrap_or_default();
                let new_hash = new_config.stable_hash().unwrap_or_default();
                if old_hash == new_hash {
                    eprintln!("[SWM-DAEMON] config unchanged, skipping reload");
                    return;
                }
                if let Err(e) = self.engine.set_thresholds(new_config.thresholds()) {
                    self.report_reload_failure(&e);
                    return;
                }
                self.engine
                    .set_scope(MonitoredScope::from_config(&new_config.scope));
                // Only thresholds, scope and loop timing are live; paths and
                // capacities keep their startup values.
                self.config.thresholds = new_config.thresholds;
                self.config.scope = new_config.scope;
                self.config.engine.time_window_seconds = new_config.engine.time_window_seconds;
                self.config.engine.tick_interval_ms = new_config.engine.tick_interval_ms;
                eprintln!("[SWM-DAEMON] config reloaded ({old_hash} -> {new_hash})");
            }
            Err(e) => self.report_reload_failure(&e),
        }
    }

    fn report_reload_failure(&self, e: &crate::core::errors::SwmError) {
        eprintln!("[SWM-DAEMON] config reload failed: {e}");
        self.logger_handle.send(ActivityEvent::Error {
            code: e.code().to_string(),
            message: format!("config reload failed: {e}"),
        });
    }

    // ──────────────────── shutdown ────────────────────

    fn shutdown(
        mut self,
        reason: StopReason,
        sources: Vec<SourceReport>,
        writer: Option<WriterReport>,
    ) -> DaemonReport {
        let uptime_secs = self.start_time.elapsed().as_secs();

        self.engine.tick();
        self.engine.stop();
        if let Err(e) = self
            .publisher
            .publish(&self.engine, self.logger_handle.dropped_events())
        {
            eprintln!("[SWM-DAEMON] final state write failed: {e}");
        }

        self.logger_handle.send(ActivityEvent::MonitorStopped {
            reason: reason.as_str().to_string(),
            uptime_secs,
        });
        self.logger_handle.shutdown();
        if let Some(join) = self.logger_join.take() {
            let _ = join.join();
        }

        eprintln!(
            "[SWM-DAEMON] stopped: {} (uptime={uptime_secs}s)",
            reason.as_str()
        );
        DaemonReport {
            reason,
            uptime_secs,
            sources,
            writer,
            counters: self.engine.counters(),
        }
    }
}
