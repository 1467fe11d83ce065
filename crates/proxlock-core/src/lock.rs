//! Screen locking.
//!
//! The engine decides *when* to lock; this module owns *how*. The lock action
//! is fire-and-forget: the engine never observes success or failure, so the
//! locker logs its own outcome and throttles itself against rapid repeated
//! requests (re-entering Away can ask again within seconds).

use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, error, info};

/// Screen locker port.
pub trait ScreenLocker: Send + Sync {
    /// Lock the screen. Must return immediately; no outcome is reported.
    fn lock_screen(&self);
}

/// Minimum time between two lock invocations.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3);

#[cfg(target_os = "macos")]
const LOCK_COMMAND: (&str, &[&str]) = ("/usr/bin/pmset", &["displaysleepnow"]);
#[cfg(not(target_os = "macos"))]
const LOCK_COMMAND: (&str, &[&str]) = ("loginctl", &["lock-session"]);

/// Locks the screen by spawning the platform lock command
/// (`loginctl lock-session` on Linux, `pmset displaysleepnow` on macOS).
pub struct CommandScreenLocker {
    min_interval: Duration,
    last_lock: Mutex<Option<Instant>>,
}

impl CommandScreenLocker {
    /// Locker with the default 3-second self-throttle.
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_interval(DEFAULT_MIN_INTERVAL)
    }

    /// Locker with a custom minimum interval between lock commands.
    #[must_use]
    pub const fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_lock: Mutex::new(None),
        }
    }

    /// Throttle check; records the attempt time when it passes.
    fn should_lock(&self) -> bool {
        let Ok(mut last) = self.last_lock.lock() else {
            return false;
        };
        if let Some(at) = *last {
            if at.elapsed() < self.min_interval {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }
}

impl Default for CommandScreenLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenLocker for CommandScreenLocker {
    fn lock_screen(&self) {
        if !self.should_lock() {
            debug!("lock request ignored, too soon since last lock");
            return;
        }

        let (program, args) = LOCK_COMMAND;
        info!(command = program, "locking screen");

        tokio::spawn(async move {
            let output = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .output()
                .await;
            match output {
                Ok(output) if output.status.success() => info!("screen locked"),
                Ok(output) => error!(
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "lock command failed"
                ),
                Err(err) => error!(%err, command = program, "failed to spawn lock command"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_blocks_rapid_repeats() {
        let locker = CommandScreenLocker::with_min_interval(Duration::from_secs(3600));
        assert!(locker.should_lock());
        assert!(!locker.should_lock());
        assert!(!locker.should_lock());
    }

    #[test]
    fn zero_interval_never_throttles() {
        let locker = CommandScreenLocker::with_min_interval(Duration::ZERO);
        assert!(locker.should_lock());
        assert!(locker.should_lock());
    }
}
