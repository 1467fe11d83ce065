//! The proximity monitor: one loop that turns samples into lock decisions.
//!
//! The monitor owns the EMA filter, the hysteresis classifier, the power edge
//! detector and the state machine. Everything that can mutate them arrives as
//! an [`EngineEvent`] on a single mpsc channel, so the whole engine runs
//! serialized on one task and needs no internal locking. Timer callbacks
//! loop back through the same channel.
//!
//! Pipeline per accepted sample:
//! raw RSSI -> identity filter -> [`Ema`] -> [`HysteresisClassifier`] ->
//! [`ProximityStateMachine::process_signal`] -> optional lock action.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bluetooth::ScanControl;
use crate::classify::HysteresisClassifier;
use crate::config::AppConfig;
use crate::error::Result;
use crate::filter::Ema;
use crate::lock::ScreenLocker;
use crate::power::{PowerEdge, PowerEdgeDetector};
use crate::state::{ProximityState, ProximityStateMachine};
use crate::types::{EngineEvent, MonitorEvent, SignalReading};

/// Buffer for the outbound broadcast channel. Display consumers that lag
/// simply miss updates; decisions never depend on this channel.
const BROADCAST_CAPACITY: usize = 64;

/// The proximity detection engine, ready to be started.
pub struct ProximityMonitor {
    config: AppConfig,
    filter: Ema,
    classifier: HysteresisClassifier,
    machine: ProximityStateMachine,
    power: PowerEdgeDetector,
    locker: Arc<dyn ScreenLocker>,
    scanner: Arc<dyn ScanControl>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    notifications: broadcast::Sender<MonitorEvent>,
    state_tx: watch::Sender<ProximityState>,
}

/// Control handle for a running monitor.
pub struct MonitorHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
    state_rx: watch::Receiver<ProximityState>,
    notifications: broadcast::Sender<MonitorEvent>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ProximityMonitor {
    /// Build a monitor from a validated configuration.
    ///
    /// `events_tx` must be the sender side of the channel later passed to
    /// [`start`](Self::start); the state machine uses it to deliver timer
    /// firings onto the same loop.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation.
    pub fn new(
        config: AppConfig,
        locker: Arc<dyn ScreenLocker>,
        scanner: Arc<dyn ScanControl>,
        events_tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self> {
        config.validate()?;
        let filter = Ema::new(config.ema_alpha)?;
        let classifier = HysteresisClassifier::new(config.lock_threshold, config.present_threshold)?;
        let machine = ProximityStateMachine::new(config.timeouts(), events_tx.clone());
        let (state_tx, _) = watch::channel(ProximityState::Unknown);
        let (notifications, _) = broadcast::channel(BROADCAST_CAPACITY);

        Ok(Self {
            config,
            filter,
            classifier,
            machine,
            power: PowerEdgeDetector::new(),
            locker,
            scanner,
            events_tx,
            notifications,
            state_tx,
        })
    }

    /// Start scanning and spawn the event loop, consuming the monitor.
    #[must_use]
    pub fn start(self, events_rx: mpsc::UnboundedReceiver<EngineEvent>) -> MonitorHandle {
        info!("proximity monitor starting");
        self.scanner.start_scanning();

        let events = self.events_tx.clone();
        let state_rx = self.state_tx.subscribe();
        let notifications = self.notifications.clone();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(events_rx, shutdown_rx));

        MonitorHandle {
            events,
            state_rx,
            notifications,
            shutdown,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        info!("proximity monitor stopping");
        self.scanner.stop_scanning();
        let changed = self.machine.reset();
        self.publish_transition(changed);
        self.filter.reset();
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Sample(reading) => self.handle_sample(&reading),
            EngineEvent::RadioPower(is_on) => self.handle_radio_power(is_on),
            EngineEvent::ConfigChanged(config) => self.apply_config(config),
            EngineEvent::TimerFired(fired) => {
                let changed = self.machine.handle_timer(fired);
                self.publish_transition(changed);
            }
        }
    }

    fn handle_sample(&mut self, reading: &SignalReading) {
        if let Some(target) = &self.config.device_id {
            // A non-matching sample must not touch the engine at all; in
            // particular it must not refresh the signal-loss watchdog.
            if !reading.device_id.eq_ignore_ascii_case(target) {
                trace!(device = %reading.device_id, "ignoring sample from non-target device");
                return;
            }
        }

        let raw = reading.rssi;
        let filtered = self.filter.update(raw);
        let result = self.classifier.evaluate(filtered);
        debug!(raw, filtered, ?result, "processed sample");

        let changed = self.machine.process_signal(result);
        self.publish_transition(changed);
        let _ = self
            .notifications
            .send(MonitorEvent::SignalUpdate { raw, filtered });
    }

    fn handle_radio_power(&mut self, is_on: bool) {
        match self.power.update(is_on) {
            Some(PowerEdge::Off) => {
                if self.config.lock_on_bluetooth_disable {
                    let changed = self.machine.bluetooth_off();
                    self.publish_transition(changed);
                } else {
                    debug!("radio off ignored: lock_on_bluetooth_disable is false");
                }
            }
            Some(PowerEdge::On) => self.scanner.start_scanning(),
            None => {}
        }
    }

    /// Swap in a new configuration, preserving the machine's current state.
    ///
    /// Validation happens before anything live is replaced: a rejected config
    /// leaves the running engine fully unchanged.
    fn apply_config(&mut self, config: AppConfig) {
        if let Err(err) = config.validate() {
            warn!(%err, "rejecting configuration change");
            return;
        }
        let (Ok(filter), Ok(classifier)) = (
            Ema::new(config.ema_alpha),
            HysteresisClassifier::new(config.lock_threshold, config.present_threshold),
        ) else {
            // Unreachable after validate(), but never partially apply.
            warn!("rejecting configuration change");
            return;
        };

        self.filter = filter;
        self.classifier = classifier;
        self.machine.update_timeouts(config.timeouts());
        self.config = config;
        info!("applied new configuration");
    }

    fn publish_transition(&self, changed: Option<ProximityState>) {
        let Some(state) = changed else { return };
        self.state_tx.send_replace(state);
        let _ = self.notifications.send(MonitorEvent::StateChanged(state));

        if state == ProximityState::Away {
            // Enablement is checked at the moment of transition, so a disable
            // that happened mid-Warning still prevents the lock.
            if self.config.enabled {
                self.locker.lock_screen();
            } else {
                info!("lock suppressed: monitoring disabled");
            }
        }
    }
}

impl MonitorHandle {
    /// Sender for feeding events into the running loop. Scanners and the
    /// configuration watcher push through clones of this.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<EngineEvent> {
        self.events.clone()
    }

    /// Current proximity state.
    #[must_use]
    pub fn state(&self) -> ProximityState {
        *self.state_rx.borrow()
    }

    /// Watch channel mirroring the proximity state, for display.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ProximityState> {
        self.state_rx.clone()
    }

    /// Subscribe to state-change and signal-update notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.notifications.subscribe()
    }

    /// Stop the loop: end scanning, cancel timers, reset filter and state.
    ///
    /// Calling `stop` on an already-stopped monitor is a no-op.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::bluetooth::MockScanner;

    const TARGET: &str = "AA:BB:CC:DD:EE:FF";
    const OTHER: &str = "11:22:33:44:55:66";

    #[derive(Default)]
    struct CountingLocker {
        locks: AtomicUsize,
    }

    impl CountingLocker {
        fn count(&self) -> usize {
            self.locks.load(Ordering::SeqCst)
        }
    }

    impl ScreenLocker for CountingLocker {
        fn lock_screen(&self) {
            self.locks.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Rig {
        handle: MonitorHandle,
        scanner: Arc<MockScanner>,
        locker: Arc<CountingLocker>,
    }

    fn config() -> AppConfig {
        AppConfig {
            // Pass-through filter keeps classification deterministic per sample.
            ema_alpha: 1.0,
            lock_timeout_secs: 0.1,
            signal_loss_timeout_secs: 100.0,
            ..AppConfig::default()
        }
    }

    fn start(config: AppConfig) -> Rig {
        let (tx, rx) = mpsc::unbounded_channel();
        let scanner = Arc::new(MockScanner::new(tx.clone()));
        let locker = Arc::new(CountingLocker::default());
        let monitor = ProximityMonitor::new(
            config,
            Arc::clone(&locker) as Arc<dyn ScreenLocker>,
            Arc::clone(&scanner) as Arc<dyn ScanControl>,
            tx,
        )
        .unwrap();
        let handle = monitor.start(rx);
        Rig {
            handle,
            scanner,
            locker,
        }
    }

    /// Let the monitor loop drain its channel (and fire due timers under
    /// paused time).
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn settle_for(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn drain_states(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<ProximityState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let MonitorEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        states
    }

    #[tokio::test(start_paused = true)]
    async fn start_begins_scanning_and_stop_ends_it() {
        let mut rig = start(config());
        assert!(rig.scanner.is_scanning());

        rig.handle.stop().await;
        assert!(!rig.scanner.is_scanning());
        assert_eq!(rig.handle.state(), ProximityState::Unknown);

        // Stopping again is a no-op.
        rig.handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn strong_signal_sets_present_without_locking() {
        let rig = start(config());
        rig.scanner.emit_sample(TARGET, -40.0);
        settle().await;

        assert_eq!(rig.handle.state(), ProximityState::Present);
        assert_eq!(rig.locker.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_timeout_locks_with_full_notification_sequence() {
        let rig = start(config());
        let mut events = rig.handle.subscribe();

        rig.scanner.emit_sample(TARGET, -40.0);
        rig.scanner.emit_sample(TARGET, -90.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Warning);

        settle_for(Duration::from_millis(300)).await;
        assert_eq!(rig.handle.state(), ProximityState::Away);
        assert_eq!(rig.locker.count(), 1);
        assert_eq!(
            drain_states(&mut events),
            vec![
                ProximityState::Present,
                ProximityState::Warning,
                ProximityState::Away
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_from_warning_cancels_the_lock_timer() {
        let rig = start(config());
        rig.scanner.emit_sample(TARGET, -40.0);
        rig.scanner.emit_sample(TARGET, -90.0);
        rig.scanner.emit_sample(TARGET, -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);

        // Well past the 100 ms lock timeout; the stale timer must not act.
        settle_for(Duration::from_millis(500)).await;
        assert_eq!(rig.handle.state(), ProximityState::Present);
        assert_eq!(rig.locker.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_silence_trips_the_watchdog() {
        let rig = start(AppConfig {
            signal_loss_timeout_secs: 0.1,
            ..config()
        });
        rig.scanner.emit_sample(TARGET, -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);

        settle_for(Duration::from_millis(300)).await;
        assert_eq!(rig.handle.state(), ProximityState::Away);
        assert_eq!(rig.locker.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn radio_off_edge_locks_immediately() {
        let rig = start(config());
        rig.scanner.emit_power(true);
        rig.scanner.emit_sample(TARGET, -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);

        rig.scanner.emit_power(false);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Away);
        assert_eq!(rig.locker.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn radio_off_edge_ignored_when_option_disabled() {
        let rig = start(AppConfig {
            lock_on_bluetooth_disable: false,
            ..config()
        });
        rig.scanner.emit_power(true);
        rig.scanner.emit_sample(TARGET, -40.0);
        rig.scanner.emit_power(false);
        settle().await;

        assert_eq!(rig.handle.state(), ProximityState::Present);
        assert_eq!(rig.locker.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_target_samples_are_discarded_silently() {
        let rig = start(AppConfig {
            device_id: Some(TARGET.into()),
            ..config()
        });
        let mut events = rig.handle.subscribe();

        rig.scanner.emit_sample(OTHER, -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Unknown);
        assert!(events.try_recv().is_err(), "no signal update expected");

        rig.scanner.emit_sample(TARGET, -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);
    }

    #[tokio::test(start_paused = true)]
    async fn target_match_is_case_insensitive() {
        let rig = start(AppConfig {
            device_id: Some(TARGET.into()),
            ..config()
        });
        rig.scanner.emit_sample(&TARGET.to_lowercase(), -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_monitoring_suppresses_lock_until_reenabled() {
        let rig = start(AppConfig {
            enabled: false,
            ..config()
        });
        let sender = rig.handle.sender();

        rig.scanner.emit_sample(TARGET, -40.0);
        rig.scanner.emit_sample(TARGET, -90.0);
        settle_for(Duration::from_millis(300)).await;
        assert_eq!(rig.handle.state(), ProximityState::Away);
        assert_eq!(rig.locker.count(), 0);

        sender
            .send(EngineEvent::ConfigChanged(AppConfig {
                enabled: true,
                ..config()
            }))
            .unwrap();

        // Fresh Present -> Warning -> timeout cycle locks exactly once.
        rig.scanner.emit_sample(TARGET, -40.0);
        rig.scanner.emit_sample(TARGET, -90.0);
        settle_for(Duration::from_millis(300)).await;
        assert_eq!(rig.handle.state(), ProximityState::Away);
        assert_eq!(rig.locker.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn config_change_rebuilds_thresholds_but_preserves_state() {
        let rig = start(config());
        rig.scanner.emit_sample(TARGET, -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);

        rig.handle
            .sender()
            .send(EngineEvent::ConfigChanged(AppConfig {
                lock_threshold: -90.0,
                present_threshold: -70.0,
                ..config()
            }))
            .unwrap();
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);

        // -75 dBm sits in the new hysteresis band: no transition.
        rig.scanner.emit_sample(TARGET, -75.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);

        // -95 dBm is below the new lock threshold.
        rig.scanner.emit_sample(TARGET, -95.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_config_leaves_the_running_engine_unchanged() {
        let rig = start(config());
        rig.handle
            .sender()
            .send(EngineEvent::ConfigChanged(AppConfig {
                lock_threshold: -50.0,
                present_threshold: -80.0,
                ..config()
            }))
            .unwrap();
        settle().await;

        // The old thresholds still classify -40 dBm as present.
        rig.scanner.emit_sample(TARGET, -40.0);
        settle().await;
        assert_eq!(rig.handle.state(), ProximityState::Present);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_fails_construction() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scanner = Arc::new(MockScanner::new(tx.clone()));
        let locker = Arc::new(CountingLocker::default());
        let result = ProximityMonitor::new(
            AppConfig {
                ema_alpha: 0.0,
                ..AppConfig::default()
            },
            locker,
            scanner,
            tx,
        );
        assert!(result.err().is_some_and(|e| e.is_config_error()));
    }
}
