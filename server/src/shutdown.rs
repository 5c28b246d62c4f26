//! Latched shutdown signals and the console listener that raises them
//!
//! Two flags are shared by every thread of a server run:
//! - `exit`: an operator asked for a clean stop
//! - `error`: something fatal happened to shared state (mutex timeout,
//!   poisoned lock, thread creation failure)
//!
//! Both latch. Once set they stay set for the rest of the run. Components
//! sample them between blocking calls; `error` wins when both are set.

use log::{error, info, warn};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};

pub const EXIT_COMMAND: &str = "exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    Running,
    Exit,
    Error,
}

#[derive(Debug, Default)]
pub struct ShutdownSignals {
    exit: AtomicBool,
    error: AtomicBool,
}

impl ShutdownSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ShutdownStatus {
        if self.error.load(Ordering::SeqCst) {
            ShutdownStatus::Error
        } else if self.exit.load(Ordering::SeqCst) {
            ShutdownStatus::Exit
        } else {
            ShutdownStatus::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == ShutdownStatus::Running
    }

    /// Requests a clean stop. Refused once `error` is set, since the run has
    /// already failed.
    pub fn request_exit(&self) -> bool {
        if self.error.load(Ordering::SeqCst) {
            return false;
        }
        self.exit.store(true, Ordering::SeqCst);
        true
    }

    pub fn raise_error(&self) {
        self.error.store(true, Ordering::SeqCst);
    }

    pub fn error_raised(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }
}

/// Reads operator commands line by line until `exit` is accepted, the run
/// fails, or input ends.
///
/// Returns true when the listener stopped the server itself.
pub fn listen_for_exit<R: BufRead>(input: R, signals: &ShutdownSignals) -> bool {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console input failed: {}", e);
                return false;
            }
        };

        let command = line.trim();
        if command.eq_ignore_ascii_case(EXIT_COMMAND) {
            if signals.request_exit() {
                info!("Exit requested from console");
                return true;
            }
            error!("Exit requested but the server has already failed");
            return false;
        }

        if !signals.is_running() {
            return false;
        }
        if command.is_empty() {
            continue;
        }

        warn!("Unknown console command {:?}, type '{}' to stop", command, EXIT_COMMAND);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_signals_latch() {
        let signals = ShutdownSignals::new();
        assert_eq!(signals.status(), ShutdownStatus::Running);

        assert!(signals.request_exit());
        assert_eq!(signals.status(), ShutdownStatus::Exit);
        assert!(signals.request_exit());
        assert_eq!(signals.status(), ShutdownStatus::Exit);
    }

    #[test]
    fn test_error_takes_precedence() {
        let signals = ShutdownSignals::new();
        signals.request_exit();
        signals.raise_error();
        assert_eq!(signals.status(), ShutdownStatus::Error);
        assert!(!signals.request_exit());
    }

    #[test]
    fn test_listener_accepts_exit() {
        let signals = ShutdownSignals::new();
        let input = Cursor::new("help\n\nEXIT\nignored\n");
        assert!(listen_for_exit(input, &signals));
        assert_eq!(signals.status(), ShutdownStatus::Exit);
    }

    #[test]
    fn test_listener_stops_at_end_of_input() {
        let signals = ShutdownSignals::new();
        assert!(!listen_for_exit(Cursor::new("status\n"), &signals));
        assert_eq!(signals.status(), ShutdownStatus::Running);
    }

    #[test]
    fn test_listener_reports_failure_after_error() {
        let signals = ShutdownSignals::new();
        signals.raise_error();
        assert!(!listen_for_exit(Cursor::new("exit\n"), &signals));
        assert_eq!(signals.status(), ShutdownStatus::Error);
    }
}
