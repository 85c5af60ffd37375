//! Event normalizer: raw watch notifications → canonical events + operation categories.
//!
//! The watch layer cannot observe reads. A newly created entry is counted as the
//! read-activity proxy, and a move counts as a write because it mutates the
//! directory. Categories overlap on purpose: one event may feed several counters.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of change kinds delivered by the watch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl EventKind {
    /// Parse the loosely-spelled kind strings different watch backends emit.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "create" => Some(Self::Created),
            "modified" | "modify" | "changed" => Some(Self::Modified),
            "deleted" | "delete" | "removed" => Some(Self::Deleted),
            "moved" | "moved_to" | "move" | "renamed" | "rename" => Some(Self::Moved),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
        }
    }

    /// Category set for this kind. This table is the counting policy.
    #[must_use]
    pub const fn categories(self) -> OperationCategories {
        match self {
            Self::Created => OperationCategories(
                OperationCategories::READ_PROXY.0 | OperationCategories::CREATE.0,
            ),
            Self::Modified => {
                OperationCategories(OperationCategories::WRITE.0 | OperationCategories::MODIFY.0)
            }
            Self::Moved => OperationCategories::WRITE,
            Self::Deleted => OperationCategories::DELETE,
        }
    }

    /// Display label for the "last operation" column. Moves show as renames.
    #[must_use]
    pub const fn operation_label(self) -> &'static str {
        match self {
            Self::Created => "create",
            Self::Modified => "modify",
            Self::Deleted => "delete",
            Self::Moved => "rename",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-exclusive operation categories packed as bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationCategories(u8);

impl OperationCategories {
    pub const READ_PROXY: Self = Self(1 << 0);
    pub const WRITE: Self = Self(1 << 1);
    pub const CREATE: Self = Self(1 << 2);
    pub const MODIFY: Self = Self(1 << 3);
    pub const DELETE: Self = Self(1 << 4);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Number of categories set (the number of counters one event increments).
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the set categories, in a fixed order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        [
            (Self::READ_PROXY, "read_proxy"),
            (Self::WRITE, "write"),
            (Self::CREATE, "create"),
            (Self::MODIFY, "modify"),
            (Self::DELETE, "delete"),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
    }
}

/// Canonical change event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub path: String,
    pub kind: EventKind,
    pub is_directory: bool,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl Event {
    #[must_use]
    pub fn new(path: impl Into<String>, kind: EventKind, is_directory: bool, timestamp: f64) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory,
            timestamp,
        }
    }

    #[must_use]
    pub const fn categories(&self) -> OperationCategories {
        self.kind.categories()
    }
}

/// Raw notification as delivered by an external watch collaborator.
///
/// Every field is optional on the wire so that incomplete notifications reach the
/// normalizer and are counted as dropped rather than failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, alias = "src_path")]
    pub path: Option<String>,
    #[serde(default, alias = "event_type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Destination of a move, when the backend reports one.
    #[serde(default)]
    pub dest_path: Option<String>,
}

impl RawEvent {
    #[must_use]
    pub fn new(path: &str, kind: &str, is_directory: bool, timestamp: f64) -> Self {
        Self {
            path: Some(path.to_string()),
            kind: Some(kind.to_string()),
            is_directory,
            timestamp: Some(timestamp),
            dest_path: None,
        }
    }

    #[must_use]
    pub fn with_dest(mut self, dest: &str) -> Self {
        self.dest_path = Some(dest.to_string());
        self
    }
}

/// Why a raw notification was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedEvent {
    #[error("missing path")]
    MissingPath,
    #[error("missing event kind")]
    MissingKind,
    #[error("unknown event kind {0:?}")]
    UnknownKind(String),
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(f64),
}

/// Output of normalization: the event itself, plus the destination side of a move.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub primary: Event,
    pub destination: Option<Event>,
}

impl NormalizedEvent {
    /// Iterate the primary event, then the move destination if present.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        std::iter::once(&self.primary).chain(self.destination.as_ref())
    }

    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        let mut out = Vec::with_capacity(2);
        out.push(self.primary);
        out.extend(self.destination);
        out
    }
}

/// Convert a raw notification into canonical events.
pub fn normalize(raw: &RawEvent) -> Result<NormalizedEvent, MalformedEvent> {
    let path = raw
        .path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(MalformedEvent::MissingPath)?;
    let kind_raw = raw
        .kind
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or(MalformedEvent::MissingKind)?;
    let kind =
        EventKind::parse(kind_raw).ok_or_else(|| MalformedEvent::UnknownKind(kind_raw.to_string()))?;
    let timestamp = raw.timestamp.ok_or(MalformedEvent::MissingTimestamp)?;
    if !timestamp.is_finite() || timestamp < 0.0 {
        return Err(MalformedEvent::InvalidTimestamp(timestamp));
    }

    let primary = Event::new(path, kind, raw.is_directory, timestamp);
    let destination = match (kind, raw.dest_path.as_deref().map(str::trim)) {
        (EventKind::Moved, Some(dest)) if !dest.is_empty() && dest != path => Some(Event::new(
            dest,
            EventKind::Moved,
            raw.is_directory,
            timestamp,
        )),
        _ => None,
    };

    Ok(NormalizedEvent {
        primary,
        destination,
    })
}
