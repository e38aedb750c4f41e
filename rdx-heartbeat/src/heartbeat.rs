//! The heartbeat: a periodic driver for a [`CallbackRegistry`].
//!
//! A `Heartbeat` owns one registry and a spawned tick loop. Each tick either
//! burns one entry off the skip counter or executes every registered
//! callback with an empty change descriptor; the next tick is then scheduled
//! one pulse interval later, indefinitely, until `stop`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::change::ChangeDescriptor;
use crate::common::lock;
use crate::config::HeartbeatConfig;
use crate::events::HeartbeatEvent;
use crate::registry::CallbackRegistry;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Observable status of a [`Heartbeat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// Not ticking. The initial state, and the state after `stop`.
    Stopped,
    /// Ticking at the configured pulse.
    Started,
    /// Ticking, but upcoming beats are being suppressed by the skip
    /// counter. Informational only; the scheduler keeps running and the
    /// state stays `Delayed` until the next `start` or `stop`.
    Delayed,
}

/// A periodic pulse that executes a callback registry on every beat.
///
/// The registry is created once per heartbeat and never replaced; it is
/// handed out through [`Heartbeat::callbacks`] for direct registration.
pub struct Heartbeat {
    state: HeartbeatState,
    pulse: Arc<Mutex<Option<Duration>>>,
    beat_skips: Arc<AtomicU64>,
    // Stop-guard: a tick that already woke checks this before executing, so
    // stopping works even when the task abort races an in-flight tick.
    prevent_beat: Arc<AtomicBool>,
    beat_count: Arc<AtomicU64>,
    timer: Option<JoinHandle<()>>,
    registry: Arc<Mutex<CallbackRegistry>>,
    event_sender: broadcast::Sender<HeartbeatEvent>,
}

impl Heartbeat {
    /// Creates a stopped heartbeat with no pulse configured.
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: HeartbeatState::Stopped,
            pulse: Arc::new(Mutex::new(None)),
            beat_skips: Arc::new(AtomicU64::new(0)),
            prevent_beat: Arc::new(AtomicBool::new(false)),
            beat_count: Arc::new(AtomicU64::new(0)),
            timer: None,
            registry: Arc::new(Mutex::new(CallbackRegistry::new())),
            event_sender,
        }
    }

    /// Creates a stopped heartbeat with pulse and initial skips taken from
    /// the given config.
    pub fn from_config(config: &HeartbeatConfig) -> Self {
        let heartbeat = Self::new();
        *lock(&heartbeat.pulse) = config.pulse();
        heartbeat
            .beat_skips
            .store(config.beat_skips, Ordering::SeqCst);
        heartbeat
    }

    /// Starts ticking. Must be called inside a tokio runtime.
    ///
    /// If `pulse` is given it becomes the new interval and persists across
    /// later stop/start cycles. The first beat fires one full interval after
    /// this call; nothing executes synchronously. Starting an already
    /// started heartbeat replaces the running tick chain with a fresh one.
    ///
    /// A heartbeat with no pulse configured is not rejected; it ticks as
    /// fast as the scheduler allows, mirroring what a zero timeout does.
    pub fn start(&mut self, pulse: Option<Duration>) {
        if let Some(pulse) = pulse {
            *lock(&self.pulse) = Some(pulse);
        }
        self.prevent_beat.store(false, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.state = HeartbeatState::Started;

        let effective_pulse = *lock(&self.pulse);
        info!(?effective_pulse, "heartbeat started");
        self.event_sender
            .send(HeartbeatEvent::Started {
                pulse: effective_pulse,
                timestamp: chrono::Utc::now(),
            })
            .ok();

        let pulse = Arc::clone(&self.pulse);
        let beat_skips = Arc::clone(&self.beat_skips);
        let prevent_beat = Arc::clone(&self.prevent_beat);
        let beat_count = Arc::clone(&self.beat_count);
        let registry = Arc::clone(&self.registry);
        let event_sender = self.event_sender.clone();

        self.timer = Some(tokio::spawn(async move {
            loop {
                let delay = lock(&pulse).unwrap_or(Duration::ZERO);
                tokio::time::sleep(delay).await;
                if prevent_beat.load(Ordering::SeqCst) {
                    break;
                }
                let skipped = beat_skips
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |skips| {
                        skips.checked_sub(1)
                    })
                    .is_ok();
                if skipped {
                    let remaining = beat_skips.load(Ordering::SeqCst);
                    debug!(remaining, "beat skipped");
                    event_sender
                        .send(HeartbeatEvent::BeatSkipped { remaining })
                        .ok();
                } else {
                    lock(&registry).execute_empty();
                    let count = beat_count.fetch_add(1, Ordering::SeqCst) + 1;
                    event_sender
                        .send(HeartbeatEvent::Beat { beat_count: count })
                        .ok();
                }
            }
        }));
    }

    /// Stops ticking. After this returns, no further callback execution
    /// occurs until the next `start`.
    pub fn stop(&mut self) {
        self.state = HeartbeatState::Stopped;
        self.prevent_beat.store(true, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        // Acquiring the registry drains a beat that was already executing
        // when the guard went up; once we hold it, nothing is mid-pass.
        drop(lock(&self.registry));
        info!("heartbeat stopped");
        self.event_sender.send(HeartbeatEvent::Stopped).ok();
    }

    /// Marks upcoming beats to be suppressed.
    ///
    /// With `add` true the count accumulates onto any pending skips;
    /// otherwise it replaces them. The scheduler keeps running either way,
    /// the state merely reports `Delayed`.
    pub fn skip(&mut self, beats: u64, add: bool) {
        if add {
            self.beat_skips.fetch_add(beats, Ordering::SeqCst);
        } else {
            self.beat_skips.store(beats, Ordering::SeqCst);
        }
        self.state = HeartbeatState::Delayed;
        let pending_skips = self.beat_skips.load(Ordering::SeqCst);
        debug!(pending_skips, "beats marked for skipping");
        self.event_sender
            .send(HeartbeatEvent::Delayed { pending_skips })
            .ok();
    }

    /// The interval between beats, if one has been set.
    pub fn pulse(&self) -> Option<Duration> {
        *lock(&self.pulse)
    }

    /// Changes the interval between beats. Takes effect from the next
    /// scheduling decision; a running heartbeat does not need a restart.
    pub fn set_pulse(&mut self, pulse: Duration) {
        *lock(&self.pulse) = Some(pulse);
    }

    /// Number of upcoming beats that will be suppressed.
    pub fn beat_skips(&self) -> u64 {
        self.beat_skips.load(Ordering::SeqCst)
    }

    /// Total number of beats that have executed the registry.
    pub fn beat_count(&self) -> u64 {
        self.beat_count.load(Ordering::SeqCst)
    }

    /// Observable status of this heartbeat.
    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    /// The registry this heartbeat executes on every beat. Register
    /// callbacks through the returned handle.
    pub fn callbacks(&self) -> Arc<Mutex<CallbackRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Convenience for registering a callback directly on the heartbeat's
    /// registry.
    pub fn register(
        &self,
        callback: impl FnMut(&ChangeDescriptor) -> anyhow::Result<()> + Send + 'static,
    ) {
        lock(&self.registry).register(callback);
    }

    /// Subscribes to this heartbeat's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.event_sender.subscribe()
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.prevent_beat.store(true, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    const PULSE: Duration = Duration::from_millis(10);

    fn counting_heartbeat() -> (Heartbeat, Arc<AtomicU32>) {
        let heartbeat = Heartbeat::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        heartbeat.register(move |_descriptor| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (heartbeat, counter)
    }

    #[test]
    fn initial_state_is_stopped() {
        let heartbeat = Heartbeat::new();
        assert_eq!(heartbeat.state(), HeartbeatState::Stopped);
        assert_eq!(heartbeat.beat_skips(), 0);
        assert_eq!(heartbeat.pulse(), None);
    }

    #[test]
    fn skip_accumulates_and_replaces() {
        let mut heartbeat = Heartbeat::new();
        heartbeat.skip(1, true);
        heartbeat.skip(2, true);
        assert_eq!(heartbeat.beat_skips(), 3);
        assert_eq!(heartbeat.state(), HeartbeatState::Delayed);

        heartbeat.skip(3, false);
        assert_eq!(heartbeat.beat_skips(), 3);
        heartbeat.skip(0, false);
        assert_eq!(heartbeat.beat_skips(), 0);
        assert_eq!(heartbeat.state(), HeartbeatState::Delayed);
    }

    #[test]
    fn config_presets_pulse_and_skips() {
        let config = HeartbeatConfig {
            pulse_ms: Some(250),
            beat_skips: 2,
        };
        let heartbeat = Heartbeat::from_config(&config);
        assert_eq!(heartbeat.pulse(), Some(Duration::from_millis(250)));
        assert_eq!(heartbeat.beat_skips(), 2);
        assert_eq!(heartbeat.state(), HeartbeatState::Stopped);
    }

    #[tokio::test]
    async fn beats_execute_the_registry() {
        let (mut heartbeat, counter) = counting_heartbeat();
        heartbeat.start(Some(PULSE));
        assert_eq!(heartbeat.state(), HeartbeatState::Started);
        tokio::time::sleep(Duration::from_millis(150)).await;
        heartbeat.stop();
        let beats = counter.load(Ordering::SeqCst);
        assert!(beats >= 3, "expected at least 3 beats, saw {beats}");
        assert_eq!(heartbeat.beat_count(), beats as u64);
    }

    #[tokio::test]
    async fn first_beat_is_not_synchronous() {
        let (mut heartbeat, counter) = counting_heartbeat();
        heartbeat.start(Some(Duration::from_millis(200)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        heartbeat.stop();
    }

    #[tokio::test]
    async fn skipped_beats_are_suppressed_then_resume() {
        let (mut heartbeat, counter) = counting_heartbeat();
        let mut events = heartbeat.subscribe();
        heartbeat.skip(2, true);
        heartbeat.start(Some(PULSE));
        tokio::time::sleep(Duration::from_millis(200)).await;
        heartbeat.stop();

        assert_eq!(heartbeat.beat_skips(), 0);
        assert!(counter.load(Ordering::SeqCst) >= 1);

        let mut skipped = 0;
        let mut beats = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                HeartbeatEvent::BeatSkipped { .. } => skipped += 1,
                HeartbeatEvent::Beat { .. } => beats += 1,
                _ => {}
            }
        }
        assert_eq!(skipped, 2, "exactly the two marked beats are suppressed");
        assert!(beats >= 1);
    }

    #[tokio::test]
    async fn absolute_skip_overrides_accumulated_skips() {
        let mut heartbeat = Heartbeat::new();
        heartbeat.skip(10, true);
        heartbeat.skip(3, false);
        assert_eq!(heartbeat.beat_skips(), 3);
        let mut events = heartbeat.subscribe();
        heartbeat.start(Some(PULSE));
        tokio::time::sleep(Duration::from_millis(150)).await;
        heartbeat.stop();

        let skipped = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| matches!(event, HeartbeatEvent::BeatSkipped { .. }))
            .count();
        assert_eq!(skipped, 3);
    }

    #[tokio::test]
    async fn stop_prevents_any_further_execution() {
        let (mut heartbeat, counter) = counting_heartbeat();
        heartbeat.start(Some(Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(70)).await;
        heartbeat.stop();
        assert_eq!(heartbeat.state(), HeartbeatState::Stopped);
        let at_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), at_stop);
    }

    #[tokio::test]
    async fn pulse_persists_across_stop_start_cycles() {
        let (mut heartbeat, counter) = counting_heartbeat();
        heartbeat.start(Some(PULSE));
        heartbeat.stop();
        assert_eq!(heartbeat.pulse(), Some(PULSE));

        heartbeat.start(None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        heartbeat.stop();
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn restart_replaces_the_tick_chain() {
        let (mut heartbeat, counter) = counting_heartbeat();
        heartbeat.start(Some(PULSE));
        heartbeat.start(Some(PULSE));
        tokio::time::sleep(Duration::from_millis(105)).await;
        heartbeat.stop();
        // A leaked second chain would roughly double the rate.
        let beats = counter.load(Ordering::SeqCst);
        assert!(beats <= 14, "expected a single tick chain, saw {beats} beats");
    }

    #[tokio::test]
    async fn event_stream_reports_transitions() {
        let mut heartbeat = Heartbeat::new();
        let mut events = heartbeat.subscribe();
        heartbeat.start(Some(Duration::from_millis(500)));
        heartbeat.skip(1, true);
        heartbeat.stop();

        assert!(matches!(
            events.try_recv().unwrap(),
            HeartbeatEvent::Started { pulse: Some(_), .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            HeartbeatEvent::Delayed { pending_skips: 1 }
        ));
        assert!(matches!(events.try_recv().unwrap(), HeartbeatEvent::Stopped));
    }
}
