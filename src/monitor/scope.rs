//! Monitored scope: which event paths belong to the configured storage roots.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::config::ScopeConfig;

/// Component-wise prefix filter over the monitored roots.
///
/// An empty root set, or a disabled restriction, accepts every path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredScope {
    roots: Vec<PathBuf>,
    restrict: bool,
}

impl MonitoredScope {
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, restrict: bool) -> Self {
        let mut roots = roots;
        roots.sort();
        roots.dedup();
        Self { roots, restrict }
    }

    /// Scope that accepts everything.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::new(config.monitored_paths.clone(), config.restrict_to_monitored)
    }

    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Whether events for `path` should be counted.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        if !self.restrict || self.roots.is_empty() {
            return true;
        }
        let candidate = Path::new(path);
        self.roots.iter().any(|root| candidate.starts_with(root))
    }
}
