//! Single-writer ingestion: many producers, one bounded queue, one writer thread.
//!
//! Producers hold a cloneable [`IngestQueue`] and never touch the engine directly.
//! The writer thread drains the queue into [`WorkloadEngine::notify`], so engine
//! mutation from producers is serialized through one consumer. Lines read from an
//! event source are decoded by the reader; undecodable lines count as malformed.

#![allow(missing_docs)]

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SwmError};
use crate::monitor::engine::WorkloadEngine;
use crate::monitor::event::RawEvent;

// ──────────────────── queue ────────────────────

/// Messages accepted by the writer thread.
#[derive(Debug, Clone)]
enum IngestMessage {
    Event(RawEvent),
    /// A source record that could not be decoded.
    Undecodable,
}

/// What a producer should do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the event and count it as queue overflow. For live streams.
    Drop,
    /// Wait for room. For sources that can be paced, like regular files.
    Block,
}

/// Cloneable producer handle onto the ingestion queue.
#[derive(Clone)]
pub struct IngestQueue {
    tx: Sender<IngestMessage>,
    overflow: Arc<AtomicU64>,
}

impl std::fmt::Debug for IngestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestQueue")
            .field("queued", &self.tx.len())
            .field("overflow", &self.overflow.load(Ordering::Relaxed))
            .finish()
    }
}

impl IngestQueue {
    /// Enqueue `raw` according to `policy`. Returns `false` if it was not queued.
    pub fn submit(&self, raw: RawEvent, policy: OverflowPolicy) -> bool {
        self.send(IngestMessage::Event(raw), policy)
    }

    /// Report a record the producer could not decode.
    pub fn submit_undecodable(&self, policy: OverflowPolicy) -> bool {
        self.send(IngestMessage::Undecodable, policy)
    }

    fn send(&self, message: IngestMessage, policy: OverflowPolicy) -> bool {
        match policy {
            OverflowPolicy::Block => self.tx.send(message).is_ok(),
            OverflowPolicy::Drop => match self.tx.try_send(message) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.overflow.fetch_add(1, Ordering::Relaxed);
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }

    /// Events currently waiting for the writer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Totals reported by the writer thread when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub processed: u64,
    pub malformed: u64,
    pub overflowed: u64,
}

/// Spawn the writer thread. It exits once every [`IngestQueue`] clone is dropped
/// and the queue is drained.
pub fn spawn_writer(
    engine: Arc<WorkloadEngine>,
    capacity: usize,
) -> Result<(IngestQueue, thread::JoinHandle<WriterReport>)> {
    let (tx, rx) = bounded::<IngestMessage>(capacity.max(1));
    let overflow = Arc::new(AtomicU64::new(0));
    let queue = IngestQueue {
        tx,
        overflow: Arc::clone(&overflow),
    };

    let join = thread::Builder::new()
        .name("swm-ingest".to_string())
        .spawn(move || writer_thread_main(&engine, &rx, &overflow))
        .map_err(|e| SwmError::Runtime {
            details: format!("failed to spawn ingest writer thread: {e}"),
        })?;

    Ok((queue, join))
}

fn writer_thread_main(
    engine: &WorkloadEngine,
    rx: &Receiver<IngestMessage>,
    overflow: &AtomicU64,
) -> WriterReport {
    let mut report = WriterReport::default();
    for message in rx {
        match message {
            IngestMessage::Event(raw) => {
                if engine.notify(&raw).is_err() {
                    report.malformed += 1;
                }
            }
            IngestMessage::Undecodable => {
                engine.record_malformed();
                report.malformed += 1;
            }
        }
        report.processed += 1;
        flush_overflow(engine, overflow, &mut report);
    }
    flush_overflow(engine, overflow, &mut report);
    report
}

fn flush_overflow(engine: &WorkloadEngine, overflow: &AtomicU64, report: &mut WriterReport) {
    let dropped = overflow.swap(0, Ordering::Relaxed);
    if dropped > 0 {
        engine.record_queue_overflow(dropped);
        report.overflowed += dropped;
    }
}

// ──────────────────── sources ────────────────────

/// A line-delimited JSON stream of raw events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Stdin,
    File(PathBuf),
}

impl EventSource {
    /// `-` means stdin.
    #[must_use]
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(arg))
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Stdin => "stdin".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Regular files are paced by the reader; pipes and stdin are live.
    fn overflow_policy(&self) -> OverflowPolicy {
        match self {
            Self::Stdin => OverflowPolicy::Drop,
            Self::File(path) => {
                if path.metadata().is_ok_and(|m| m.is_file()) {
                    OverflowPolicy::Block
                } else {
                    OverflowPolicy::Drop
                }
            }
        }
    }

    fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            Self::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            Self::File(path) => {
                let file = File::open(path).map_err(|source| SwmError::io(path, source))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// Per-source totals from a reader thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub lines: u64,
    pub queued: u64,
    pub undecodable: u64,
}

/// Decode one JSONL record. Blank lines yield `None`; invalid UTF-8 is a decode error.
pub fn decode_line(line: &[u8]) -> Option<std::result::Result<RawEvent, serde_json::Error>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_slice(trimmed))
}

/// Call `f` with every newline-terminated record of `reader`, as raw bytes.
///
/// Records are never required to be UTF-8. Only read failures are errors.
/// Returns the number of records seen.
pub fn for_each_record<R, F>(mut reader: R, mut f: F) -> io::Result<u64>
where
    R: BufRead,
    F: FnMut(&[u8]),
{
    let mut buf = Vec::with_capacity(512);
    let mut records = 0_u64;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(records);
        }
        records += 1;
        f(&buf);
    }
}

/// Feed every record from `reader` into `queue`.
pub fn pump_lines<R: BufRead>(
    reader: R,
    queue: &IngestQueue,
    policy: OverflowPolicy,
    source: &str,
) -> Result<SourceReport> {
    let mut report = SourceReport {
        source: source.to_string(),
        ..SourceReport::default()
    };
    let outcome = for_each_record(reader, |line| {
        let queued = match decode_line(line) {
            None => return,
            Some(Ok(raw)) => queue.submit(raw, policy),
            Some(Err(_)) => {
                report.undecodable += 1;
                queue.submit_undecodable(policy)
            }
        };
        if queued {
            report.queued += 1;
        }
    });
    match outcome {
        Ok(lines) => {
            report.lines = lines;
            Ok(report)
        }
        Err(e) => Err(SwmError::EventSource {
            source_name: source.to_string(),
            details: e.to_string(),
        }),
    }
}

/// Spawn one reader thread for `source`.
pub fn spawn_reader(
    source: EventSource,
    queue: IngestQueue,
) -> Result<thread::JoinHandle<Result<SourceReport>>> {
    let thread_name = match &source {
        EventSource::Stdin => "swm-src-stdin".to_string(),
        EventSource::File(path) => format!(
            "swm-src-{}",
            path.file_name()
                .map_or_else(|| "file".into(), |n| n.to_string_lossy())
        ),
    };
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            let reader = source.open()?;
            pump_lines(reader, &queue, source.overflow_policy(), &source.name())
        })
        .map_err(|e| SwmError::Runtime {
            details: format!("failed to spawn reader thread: {e}"),
        })
}

/// Whether `path` names an existing readable source (or stdin).
#[must_use]
pub fn source_exists(arg: &str) -> bool {
    arg == "-" || Path::new(arg).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use std::io::Cursor;

    fn engine() -> Arc<WorkloadEngine> {
        Arc::new(WorkloadEngine::starting_at(&Config::default(), 1_000.0))
    }

    #[test]
    fn decode_line_handles_blank_and_garbage() {
        assert!(decode_line(b"   \r\n").is_none());
        assert!(decode_line(b"{not json").unwrap().is_err());
        assert!(decode_line(b"\xff\xfe garbage\n").unwrap().is_err());
        let raw = decode_line(br#"{"path":"/a","kind":"created","timestamp":1.5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(raw.path.as_deref(), Some("/a"));
    }

    #[test]
    fn writer_drains_queue_into_engine() {
        let engine = engine();
        let (queue, join) = spawn_writer(Arc::clone(&engine), 16).unwrap();
        let input = concat!(
            r#"{"path":"/san/a","kind":"created","timestamp":1000.1}"#,
            "\n",
            r#"{"path":"/san/a","kind":"modified","timestamp":1000.2}"#,
            "\n",
            "\n",
            "garbage\n",
            r#"{"kind":"created","timestamp":1000.3}"#,
            "\n",
        );
        let report = pump_lines(Cursor::new(input), &queue, OverflowPolicy::Block, "test").unwrap();
        assert_eq!(report.lines, 5);
        assert_eq!(report.queued, 4);
        assert_eq!(report.undecodable, 1);

        drop(queue);
        let writer = join.join().unwrap();
        assert_eq!(writer.processed, 4);
        assert_eq!(writer.malformed, 2);

        let counters = engine.counters();
        assert_eq!(counters.events_accepted, 2);
        assert_eq!(counters.dropped_malformed, 2);
        let stats = engine.stats_for("/san/a").unwrap();
        assert_eq!(stats.total_reads, 1);
        assert_eq!(stats.total_writes, 1);
    }

    #[test]
    fn invalid_utf8_line_is_malformed_and_reading_continues() {
        let engine = engine();
        let (queue, join) = spawn_writer(Arc::clone(&engine), 16).unwrap();
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"path":"/a","kind":"created","timestamp":1000.1}"#);
        input.push(b'\n');
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(br#"{"path":"/b","kind":"modified","timestamp":1000.2}"#);
        input.push(b'\n');

        let report = pump_lines(Cursor::new(input), &queue, OverflowPolicy::Block, "bytes").unwrap();
        assert_eq!(report.lines, 3);
        assert_eq!(report.queued, 3);
        assert_eq!(report.undecodable, 1);

        drop(queue);
        let writer = join.join().unwrap();
        assert_eq!(writer.processed, 3);
        assert_eq!(writer.malformed, 1);

        let counters = engine.counters();
        assert_eq!(counters.events_accepted, 2);
        assert_eq!(counters.dropped_malformed, 1);
        assert!(engine.stats_for("/b").is_some());
    }

    #[test]
    fn last_record_without_newline_is_read() {
        let mut seen = Vec::new();
        let records = for_each_record(Cursor::new(b"one\ntwo".to_vec()), |line| {
            seen.push(line.to_vec());
        })
        .unwrap();
        assert_eq!(records, 2);
        assert_eq!(seen, vec![b"one\n".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn full_queue_drops_and_counts_overflow() {
        // No writer: hold the receiver side via a queue built by hand.
        let (tx, rx) = bounded::<IngestMessage>(1);
        let overflow = Arc::new(AtomicU64::new(0));
        let queue = IngestQueue {
            tx,
            overflow: Arc::clone(&overflow),
        };
        let raw = RawEvent::new("/a", "created", false, 1.0);
        assert!(queue.submit(raw.clone(), OverflowPolicy::Drop));
        assert!(!queue.submit(raw.clone(), OverflowPolicy::Drop));
        assert!(!queue.submit(raw, OverflowPolicy::Drop));
        assert_eq!(overflow.load(Ordering::Relaxed), 2);
        assert_eq!(queue.len(), 1);

        drop(queue);
        let engine = engine();
        let report = writer_thread_main(&engine, &rx, &overflow);
        assert_eq!(report.processed, 1);
        assert_eq!(report.overflowed, 2);
        assert_eq!(engine.counters().queue_overflow, 2);
        assert_eq!(engine.counters().events_accepted, 1);
    }

    #[test]
    fn overflow_is_reported_to_engine() {
        let engine = engine();
        let overflow = AtomicU64::new(3);
        let mut report = WriterReport::default();
        flush_overflow(&engine, &overflow, &mut report);
        assert_eq!(report.overflowed, 3);
        assert_eq!(engine.counters().queue_overflow, 3);
        assert_eq!(overflow.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn concurrent_producers_are_serialized() {
        let engine = engine();
        let (queue, join) = spawn_writer(Arc::clone(&engine), 64).unwrap();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        let ts = 1_000.0 + f64::from(i) / 1_000.0;
                        let raw = RawEvent::new(&format!("/san/p{p}"), "modified", false, ts);
                        assert!(queue.submit(raw, OverflowPolicy::Block));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        drop(queue);
        let writer = join.join().unwrap();
        assert_eq!(writer.processed, 1_000);

        let counters = engine.counters();
        assert_eq!(counters.events_accepted + counters.dropped_late, 1_000);
        assert_eq!(engine.counters().queue_overflow, 0);
    }

    #[test]
    fn source_parse_recognizes_stdin() {
        assert_eq!(EventSource::parse("-"), EventSource::Stdin);
        assert_eq!(
            EventSource::parse("/tmp/events.jsonl"),
            EventSource::File(PathBuf::from("/tmp/events.jsonl"))
        );
        assert!(source_exists("-"));
        assert!(!source_exists("/definitely/not/here.jsonl"));
    }

    #[test]
    fn reader_thread_reads_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            "{\"path\":\"/x\",\"kind\":\"deleted\",\"timestamp\":1000.5}\n",
        )
        .unwrap();
        let engine = engine();
        let (queue, writer) = spawn_writer(Arc::clone(&engine), 4).unwrap();
        let reader = spawn_reader(EventSource::File(path), queue).unwrap();
        let report = reader.join().unwrap().unwrap();
        assert_eq!(report.queued, 1);
        writer.join().unwrap();
        assert_eq!(engine.snapshot().current_window.counts.delete_count, 1);
    }
}
