//! Signal handling: SIGTERM/SIGINT stop the daemon, SIGHUP reloads thresholds and
//! scope from the config file, SIGUSR1 forces an immediate state file publish.
//!
//! The main loop polls these flags each tick rather than blocking on signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Signal state shared between the OS handlers and the daemon loop.
#[derive(Clone, Default)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    reload_flag: Arc<AtomicBool>,
    publish_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register OS signal hooks.
    ///
    /// Registration is best-effort: failures go to stderr and the flags can still
    /// be raised programmatically.
    #[must_use]
    pub fn install() -> Self {
        let handler = Self::detached();
        handler.register_signals();
        handler
    }

    /// Handler with no OS hooks. Only the `request_*` methods raise its flags.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check and clear a pending reload request.
    #[must_use]
    pub fn should_reload(&self) -> bool {
        self.reload_flag.swap(false, Ordering::Relaxed)
    }

    /// Check and clear a pending publish request.
    #[must_use]
    pub fn should_publish(&self) -> bool {
        self.publish_flag.swap(false, Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_reload(&self) {
        self.reload_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_publish(&self) {
        self.publish_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        for (signal, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&self.shutdown_flag)) {
                eprintln!("[SWM-SIGNAL] failed to register {name}: {e}");
            }
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGHUP, SIGUSR1};
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.reload_flag)) {
                eprintln!("[SWM-SIGNAL] failed to register SIGHUP: {e}");
            }
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.publish_flag)) {
                eprintln!("[SWM-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handler_starts_clear() {
        let handler = SignalHandler::detached();
        assert!(!handler.should_shutdown());
        assert!(!handler.should_reload());
        assert!(!handler.should_publish());
    }

    #[test]
    fn shutdown_is_sticky() {
        let handler = SignalHandler::detached();
        handler.request_shutdown();
        assert!(handler.should_shutdown());
        assert!(handler.should_shutdown());
    }

    #[test]
    fn reload_and_publish_clear_on_read() {
        let handler = SignalHandler::detached();
        handler.request_reload();
        handler.request_publish();
        assert!(handler.should_reload());
        assert!(!handler.should_reload());
        assert!(handler.should_publish());
        assert!(!handler.should_publish());
    }

    #[test]
    fn clones_share_flags() {
        let handler = SignalHandler::detached();
        let other = handler.clone();
        other.request_shutdown();
        assert!(handler.should_shutdown());
    }
}
