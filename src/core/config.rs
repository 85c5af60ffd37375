//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SwmError};
use crate::monitor::classifier::Thresholds;

/// Full SWM configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub thresholds: ThresholdConfig,
    pub scope: ScopeConfig,
    pub paths: PathsConfig,
}

/// Window sizing, history retention and daemon cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of each aggregation window in seconds.
    pub time_window_seconds: f64,
    /// Number of closed windows retained in history.
    pub history_capacity: usize,
    /// Cap on distinct tracked paths; 0 disables eviction.
    pub max_tracked_paths: usize,
    /// Cadence of the idle-rollover tick.
    pub tick_interval_ms: u64,
    /// Cadence of snapshot publication.
    pub snapshot_interval_ms: u64,
    /// Closed windows included in each published snapshot.
    pub publish_history_limit: usize,
    /// Bounded capacity of the producer → engine queue.
    pub ingest_queue_capacity: usize,
}

/// Workload classification thresholds (window-scoped rates).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    pub read_frequency_threshold: u64,
    pub write_frequency_threshold: u64,
    pub modification_rate_threshold: u64,
    pub burst_intensity_multiplier: f64,
    pub burst_time_window_seconds: f64,
}

/// Which paths the monitor accepts events for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScopeConfig {
    /// Monitored storage roots. Empty means every path is in scope.
    pub monitored_paths: Vec<PathBuf>,
    /// When false, events outside `monitored_paths` are still accepted.
    pub restrict_to_monitored: bool,
}

/// Filesystem paths used by swm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_window_seconds: 1.0,
            history_capacity: 1_000,
            max_tracked_paths: 0,
            tick_interval_ms: 250,
            snapshot_interval_ms: 500,
            publish_history_limit: 10,
            ingest_queue_capacity: 8_192,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            read_frequency_threshold: 100,
            write_frequency_threshold: 100,
            modification_rate_threshold: 50,
            burst_intensity_multiplier: 3.0,
            burst_time_window_seconds: 5.0,
        }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            monitored_paths: Vec::new(),
            restrict_to_monitored: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[SWM-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("swm").join("config.toml");
        let data = home_dir.join(".local").join("share").join("swm");
        Self {
            config_file: cfg,
            state_file: data.join("state.json"),
            jsonl_log: data.join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SwmError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(SwmError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Engine-facing view of the thresholds, including the window width.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            time_window_seconds: self.engine.time_window_seconds,
            read_frequency_threshold: self.thresholds.read_frequency_threshold,
            write_frequency_threshold: self.thresholds.write_frequency_threshold,
            modification_rate_threshold: self.thresholds.modification_rate_threshold,
            burst_intensity_multiplier: self.thresholds.burst_intensity_multiplier,
            burst_time_window_seconds: self.thresholds.burst_time_window_seconds,
        }
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON so the value is stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(env_var)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // engine
        set_f64(
            &mut lookup,
            "SWM_ENGINE_TIME_WINDOW_SECONDS",
            &mut self.engine.time_window_seconds,
        )?;
        set_usize(
            &mut lookup,
            "SWM_ENGINE_HISTORY_CAPACITY",
            &mut self.engine.history_capacity,
        )?;
        set_usize(
            &mut lookup,
            "SWM_ENGINE_MAX_TRACKED_PATHS",
            &mut self.engine.max_tracked_paths,
        )?;
        set_u64(
            &mut lookup,
            "SWM_ENGINE_TICK_INTERVAL_MS",
            &mut self.engine.tick_interval_ms,
        )?;
        set_u64(
            &mut lookup,
            "SWM_ENGINE_SNAPSHOT_INTERVAL_MS",
            &mut self.engine.snapshot_interval_ms,
        )?;
        set_usize(
            &mut lookup,
            "SWM_ENGINE_PUBLISH_HISTORY_LIMIT",
            &mut self.engine.publish_history_limit,
        )?;
        set_usize(
            &mut lookup,
            "SWM_ENGINE_INGEST_QUEUE_CAPACITY",
            &mut self.engine.ingest_queue_capacity,
        )?;
        // thresholds
        set_u64(
            &mut lookup,
            "SWM_THRESHOLDS_READ_FREQUENCY_THRESHOLD",
            &mut self.thresholds.read_frequency_threshold,
        )?;
        set_u64(
            &mut lookup,
            "SWM_THRESHOLDS_WRITE_FREQUENCY_THRESHOLD",
            &mut self.thresholds.write_frequency_threshold,
        )?;
        set_u64(
            &mut lookup,
            "SWM_THRESHOLDS_MODIFICATION_RATE_THRESHOLD",
            &mut self.thresholds.modification_rate_threshold,
        )?;
        set_f64(
            &mut lookup,
            "SWM_THRESHOLDS_BURST_INTENSITY_MULTIPLIER",
            &mut self.thresholds.burst_intensity_multiplier,
        )?;
        set_f64(
            &mut lookup,
            "SWM_THRESHOLDS_BURST_TIME_WINDOW_SECONDS",
            &mut self.thresholds.burst_time_window_seconds,
        )?;
        // scope
        if let Some(raw) = lookup("SWM_SCOPE_MONITORED_PATHS") {
            self.scope.monitored_paths = env::split_paths(&raw).collect();
        }
        if let Some(raw) = lookup("SWM_SCOPE_RESTRICT_TO_MONITORED") {
            self.scope.restrict_to_monitored =
                parse_env_bool("SWM_SCOPE_RESTRICT_TO_MONITORED", &raw)?;
        }
        // paths
        if let Some(raw) = lookup("SWM_PATHS_STATE_FILE") {
            self.paths.state_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SWM_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Strip trailing slashes from monitored roots so prefix checks compare cleanly.
    fn normalize_paths(&mut self) {
        for path in &mut self.scope.monitored_paths {
            let trimmed = {
                let raw = path.to_string_lossy();
                let stripped = raw.trim_end_matches('/');
                if stripped.len() == raw.len() || stripped.is_empty() {
                    continue;
                }
                PathBuf::from(stripped)
            };
            *path = trimmed;
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let window = self.engine.time_window_seconds;
        if !(window.is_finite() && window > 0.0) {
            return Err(SwmError::InvalidConfig {
                details: format!("engine.time_window_seconds must be > 0, got {window}"),
            });
        }
        if self.engine.history_capacity == 0 {
            return Err(SwmError::InvalidConfig {
                details: "engine.history_capacity must be >= 1".to_string(),
            });
        }
        for (name, val) in [
            ("tick_interval_ms", self.engine.tick_interval_ms),
            ("snapshot_interval_ms", self.engine.snapshot_interval_ms),
        ] {
            if val == 0 {
                return Err(SwmError::InvalidConfig {
                    details: format!("engine.{name} must be > 0"),
                });
            }
        }
        if self.engine.ingest_queue_capacity == 0 {
            return Err(SwmError::InvalidConfig {
                details: "engine.ingest_queue_capacity must be >= 1".to_string(),
            });
        }
        self.thresholds().validate()
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_f64<F>(lookup: &mut F, name: &str, slot: &mut f64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<f64>().map_err(|error| SwmError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<u64>().map_err(|error| SwmError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_usize<F>(lookup: &mut F, name: &str, slot: &mut usize) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw
            .trim()
            .parse::<usize>()
            .map_err(|error| SwmError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| SwmError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
