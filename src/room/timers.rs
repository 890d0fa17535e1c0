//! Cancellable scheduled work owned by a room
//!
//! Timer tasks never touch room state. Each firing is posted back to the
//! router loop as a [`TimerFired`] carrying the generation it was armed with;
//! the room accepts it only if that slot is still armed with the same
//! generation, so a firing queued just before a cancel is discarded.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::ws::router::LoopEvent;

/// Channel timers post their firings into
pub type TimerSender = mpsc::UnboundedSender<LoopEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Once per second while counting down
    Countdown,
    /// Fixed simulation step while playing
    Step,
    /// Single shot idle expiry
    Inactivity,
}

/// A timer firing on its way to the router loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub code: String,
    pub kind: TimerKind,
    pub generation: u64,
}

/// Result of advancing the countdown by one second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Broadcast this value
    Value(u8),
    /// Counted past zero; start the match
    Finished,
}

#[derive(Debug, Default)]
struct TimerSlot {
    handle: Option<AbortHandle>,
    generation: u64,
}

impl TimerSlot {
    /// Safe to call on an idle slot
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    fn accepts(&self, generation: u64) -> bool {
        self.is_armed() && self.generation == generation
    }
}

/// The countdown, step clock and inactivity timer of one room
pub struct RoomTimers {
    code: String,
    events: TimerSender,
    countdown: TimerSlot,
    clock: TimerSlot,
    inactivity: TimerSlot,
    countdown_value: Option<u8>,
}

impl RoomTimers {
    pub fn new(code: String, events: TimerSender) -> Self {
        Self {
            code,
            events,
            countdown: TimerSlot::default(),
            clock: TimerSlot::default(),
            inactivity: TimerSlot::default(),
            countdown_value: None,
        }
    }

    /// Whether a firing of `kind` armed with `generation` is still current
    pub fn accepts(&self, kind: TimerKind, generation: u64) -> bool {
        self.slot(kind).accepts(generation)
    }

    /// Generation the `kind` slot was last armed with
    #[cfg(test)]
    pub fn generation(&self, kind: TimerKind) -> u64 {
        self.slot(kind).generation
    }

    #[cfg(test)]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slot(kind).is_armed()
    }

    /// Begin counting down from `from`, one value per `period`
    pub fn start_countdown(&mut self, from: u8, period: Duration) {
        self.cancel_countdown();
        self.countdown_value = Some(from);
        self.arm_repeating(TimerKind::Countdown, period);
    }

    /// Step the countdown; the timer is cancelled once it runs out
    pub fn next_countdown(&mut self) -> CountdownTick {
        match self.countdown_value {
            Some(value) if value > 0 => {
                self.countdown_value = Some(value - 1);
                CountdownTick::Value(value - 1)
            }
            _ => {
                self.cancel_countdown();
                CountdownTick::Finished
            }
        }
    }

    pub fn cancel_countdown(&mut self) {
        self.countdown.cancel();
        self.countdown_value = None;
    }

    pub fn start_clock(&mut self, period: Duration) {
        self.arm_repeating(TimerKind::Step, period);
    }

    /// Idempotent: stopping an already stopped clock is a no-op
    pub fn stop_clock(&mut self) {
        self.clock.cancel();
    }

    #[cfg(test)]
    pub fn clock_running(&self) -> bool {
        self.clock.is_armed()
    }

    /// (Re)arm the single-shot inactivity timer
    pub fn arm_inactivity(&mut self, timeout: Duration) {
        let slot = self.slot_mut(TimerKind::Inactivity);
        slot.cancel();
        slot.generation += 1;
        let generation = slot.generation;

        let events = self.events.clone();
        let fired = self.fired(TimerKind::Inactivity, generation);
        let handle = tokio::spawn(async move {
            sleep(timeout).await;
            let _ = events.send(LoopEvent::Timer(fired));
        })
        .abort_handle();

        self.inactivity.handle = Some(handle);
    }

    pub fn cancel_inactivity(&mut self) {
        self.inactivity.cancel();
    }

    pub fn cancel_all(&mut self) {
        self.cancel_countdown();
        self.stop_clock();
        self.cancel_inactivity();
    }

    fn arm_repeating(&mut self, kind: TimerKind, period: Duration) {
        let slot = self.slot_mut(kind);
        slot.cancel();
        slot.generation += 1;
        let generation = slot.generation;

        let events = self.events.clone();
        let fired = self.fired(kind, generation);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.send(LoopEvent::Timer(fired.clone())).is_err() {
                    break;
                }
            }
        })
        .abort_handle();

        self.slot_mut(kind).handle = Some(handle);
    }

    fn fired(&self, kind: TimerKind, generation: u64) -> TimerFired {
        TimerFired {
            code: self.code.clone(),
            kind,
            generation,
        }
    }

    fn slot(&self, kind: TimerKind) -> &TimerSlot {
        match kind {
            TimerKind::Countdown => &self.countdown,
            TimerKind::Step => &self.clock,
            TimerKind::Inactivity => &self.inactivity,
        }
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Countdown => &mut self.countdown,
            TimerKind::Step => &mut self.clock,
            TimerKind::Inactivity => &mut self.inactivity,
        }
    }
}

impl Drop for RoomTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
