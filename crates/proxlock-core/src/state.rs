//! The proximity state machine.
//!
//! Four states, two one-shot timers. Per-sample classification results drive
//! the main transitions; the lock timer debounces the Warning state so a
//! transient signal dip never locks the screen, and the signal-loss watchdog
//! guarantees a bounded-latency lock when samples stop arriving entirely.
//!
//! Timers are never aborted. Each armed timer carries a generation number;
//! cancelling a timer means bumping the generation, and a delivered
//! [`TimerFired`] is honored only when its generation is still current *and*
//! the state it expects still holds. This makes the cancel/fire race of the
//! underlying timer primitive irrelevant.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::classify::Classification;
use crate::types::EngineEvent;

/// Where the tracked device is believed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityState {
    /// No evidence yet; the only valid initial state.
    Unknown,
    /// The device is close.
    Present,
    /// The signal dropped below the lock threshold; the lock timer is running.
    Warning,
    /// The device is gone. Entering this state triggers the lock action.
    Away,
}

impl fmt::Display for ProximityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Present => "present",
            Self::Warning => "warning",
            Self::Away => "away",
        };
        f.write_str(name)
    }
}

/// Which one-shot timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The Warning-state debounce timer.
    Lock,
    /// The "no sample arrived in time" watchdog.
    SignalLoss,
}

/// Delivered when an armed timer elapses.
///
/// Stale firings (generation no longer current) are dropped by
/// [`ProximityStateMachine::handle_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// Timer kind that elapsed.
    pub kind: TimerKind,
    /// Generation the timer was armed with.
    pub generation: u64,
}

/// Durations for the two timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long Warning may persist before the screen locks.
    pub lock: Duration,
    /// How long the machine tolerates silence before assuming the device left.
    pub signal_loss: Duration,
}

/// Timer-guarded four-state decision engine.
///
/// All methods are synchronous and must be called from a single logical
/// thread (the monitor loop). Methods that cause a transition return the new
/// state exactly once per real change; self-transitions return `None`.
#[derive(Debug)]
pub struct ProximityStateMachine {
    state: ProximityState,
    timeouts: Timeouts,
    lock_generation: u64,
    watchdog_generation: u64,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl ProximityStateMachine {
    /// Create a machine in the Unknown state.
    ///
    /// Timer firings are delivered as [`EngineEvent::TimerFired`] on `events`;
    /// the caller must route them back into [`handle_timer`](Self::handle_timer).
    #[must_use]
    pub const fn new(timeouts: Timeouts, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            state: ProximityState::Unknown,
            timeouts,
            lock_generation: 0,
            watchdog_generation: 0,
            events,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProximityState {
        self.state
    }

    /// Replace the timer durations.
    ///
    /// Only affects timers armed afterwards; a timer already running keeps
    /// the duration it was armed with.
    pub fn update_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    /// Feed one classification result.
    ///
    /// Always re-arms the signal-loss watchdog first: the watchdog tracks
    /// sample liveness, not transitions.
    pub fn process_signal(&mut self, result: Classification) -> Option<ProximityState> {
        self.arm_watchdog();

        use Classification::{AbovePresent, BelowLock};
        use ProximityState::{Away, Present, Unknown, Warning};

        match (self.state, result) {
            (Unknown | Away, AbovePresent) => self.transition(Present),
            (Unknown, BelowLock) => self.transition(Away),
            (Present, BelowLock) => {
                let changed = self.transition(Warning);
                self.arm_lock_timer();
                changed
            }
            (Warning, AbovePresent) => {
                self.cancel_lock_timer();
                self.transition(Present)
            }
            _ => None,
        }
    }

    /// Handle an elapsed timer, ignoring stale generations.
    pub fn handle_timer(&mut self, fired: TimerFired) -> Option<ProximityState> {
        match fired.kind {
            TimerKind::Lock => {
                if fired.generation != self.lock_generation {
                    debug!(generation = fired.generation, "ignoring stale lock timer");
                    return None;
                }
                // Re-validate at callback time: cancellation and firing can race.
                if self.state != ProximityState::Warning {
                    return None;
                }
                info!("Lock timeout expired");
                self.cancel_lock_timer();
                self.transition(ProximityState::Away)
            }
            TimerKind::SignalLoss => {
                if fired.generation != self.watchdog_generation {
                    debug!(generation = fired.generation, "ignoring stale watchdog");
                    return None;
                }
                info!("Signal loss timeout expired");
                self.signal_lost()
            }
        }
    }

    /// No sample arrived in time: Present/Warning collapse to Away.
    pub fn signal_lost(&mut self) -> Option<ProximityState> {
        self.cancel_lock_timer();
        self.cancel_watchdog();

        match self.state {
            ProximityState::Present | ProximityState::Warning => {
                self.transition(ProximityState::Away)
            }
            ProximityState::Unknown | ProximityState::Away => None,
        }
    }

    /// The radio went down: presence can no longer be confirmed, assume Away.
    pub fn bluetooth_off(&mut self) -> Option<ProximityState> {
        self.cancel_lock_timer();
        self.cancel_watchdog();
        self.transition(ProximityState::Away)
    }

    /// Back to Unknown with all timers cancelled. Used on monitor stop.
    pub fn reset(&mut self) -> Option<ProximityState> {
        self.cancel_lock_timer();
        self.cancel_watchdog();
        self.transition(ProximityState::Unknown)
    }

    fn transition(&mut self, new_state: ProximityState) -> Option<ProximityState> {
        if new_state == self.state {
            return None;
        }
        let old_state = self.state;
        self.state = new_state;
        info!(from = %old_state, to = %new_state, "proximity state changed");
        Some(new_state)
    }

    fn arm_lock_timer(&mut self) {
        self.lock_generation += 1;
        self.spawn_timer(TimerKind::Lock, self.lock_generation, self.timeouts.lock);
    }

    fn cancel_lock_timer(&mut self) {
        self.lock_generation += 1;
    }

    fn arm_watchdog(&mut self) {
        self.watchdog_generation += 1;
        self.spawn_timer(
            TimerKind::SignalLoss,
            self.watchdog_generation,
            self.timeouts.signal_loss,
        );
    }

    fn cancel_watchdog(&mut self) {
        self.watchdog_generation += 1;
    }

    fn spawn_timer(&self, kind: TimerKind, generation: u64, after: Duration) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The receiver may be gone during shutdown; nothing to do then.
            let _ = events.send(EngineEvent::TimerFired(TimerFired { kind, generation }));
        });
    }
}
