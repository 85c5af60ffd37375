//! SWM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SwmError>;

/// Top-level error type for the workload monitor.
///
/// Only conditions that stop an operation outright live here. Soft conditions of the
/// aggregation engine (malformed or late events, unknown paths, thin burst baselines)
/// are counters or `Option` results instead.
#[derive(Debug, Error)]
pub enum SwmError {
    #[error("[SWM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SWM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SWM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SWM-2001] event source failure for {source_name}: {details}")]
    EventSource {
        source_name: String,
        details: String,
    },

    #[error("[SWM-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SWM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SWM-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[SWM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SwmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SWM-1001",
            Self::MissingConfig { .. } => "SWM-1002",
            Self::ConfigParse { .. } => "SWM-1003",
            Self::EventSource { .. } => "SWM-2001",
            Self::Serialization { .. } => "SWM-2101",
            Self::Io { .. } => "SWM-3002",
            Self::ChannelClosed { .. } => "SWM-3003",
            Self::Runtime { .. } => "SWM-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::EventSource { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SwmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SwmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<SwmError> {
        vec![
            SwmError::InvalidConfig {
                details: String::new(),
            },
            SwmError::MissingConfig {
                path: PathBuf::new(),
            },
            SwmError::ConfigParse {
                context: "",
                details: String::new(),
            },
            SwmError::EventSource {
                source_name: String::new(),
                details: String::new(),
            },
            SwmError::Serialization {
                context: "",
                details: String::new(),
            },
            SwmError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            SwmError::ChannelClosed { component: "" },
            SwmError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(SwmError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_swm_prefix() {
        for err in &all_variants() {
            assert!(
                err.code().starts_with("SWM-"),
                "code {} must start with SWM-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = SwmError::InvalidConfig {
            details: "bad value".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SWM-1001"), "display should contain code: {msg}");
        assert!(msg.contains("bad value"), "display should contain details: {msg}");
    }

    #[test]
    fn retryable_errors_are_correct() {
        assert!(SwmError::ChannelClosed { component: "test" }.is_retryable());
        assert!(
            SwmError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            }
            .is_retryable()
        );
        assert!(
            !SwmError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !SwmError::MissingConfig {
                path: PathBuf::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = SwmError::io(
            "/tmp/events.jsonl",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "SWM-3002");
        assert!(err.to_string().contains("/tmp/events.jsonl"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: SwmError = json_err.into();
        assert_eq!(err.code(), "SWM-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: SwmError = toml_err.into();
        assert_eq!(err.code(), "SWM-1003");
    }
}
