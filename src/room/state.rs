//! Room state machine: slot reservations, connection bindings and the
//! match lifecycle from lobby through countdown, play and result

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::game::arena::generate_walls;
use crate::game::{Letter, Rect, Simulation, TankInput};
use crate::ws::outbox::{ConnId, Outbox};
use crate::ws::protocol::ServerMsg;

use super::error::RoomError;
use super::timers::{CountdownTick, RoomTimers, TimerKind, TimerSender};
use super::RoomSettings;

/// Room phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Lobby: slots can be claimed
    Waiting,
    /// Counting down to the match
    Countdown,
    /// Simulation clock running
    Playing,
    /// Match decided, final state retained
    Finished,
}

/// What the router should do after a timer was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Continue,
    /// Room sat idle too long and must be removed
    Expired,
}

pub struct Room {
    code: String,
    player_count: usize,
    settings: RoomSettings,
    state: RoomState,
    reserved: BTreeSet<Letter>,
    host: Option<ConnId>,
    host_navigating: bool,
    controllers: BTreeMap<Letter, ConnId>,
    walls: Vec<Rect>,
    simulation: Option<Simulation>,
    timers: RoomTimers,
}

impl Room {
    /// A fresh waiting room; the inactivity timer starts immediately
    pub fn new(
        code: String,
        player_count: usize,
        host: ConnId,
        settings: RoomSettings,
        events: TimerSender,
    ) -> Self {
        let mut timers = RoomTimers::new(code.clone(), events);
        timers.arm_inactivity(settings.inactivity_timeout);

        Self {
            code,
            player_count,
            settings,
            state: RoomState::Waiting,
            reserved: BTreeSet::new(),
            host: Some(host),
            host_navigating: false,
            controllers: BTreeMap::new(),
            walls: Vec::new(),
            simulation: None,
            timers,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    #[cfg(test)]
    pub fn host(&self) -> Option<ConnId> {
        self.host
    }

    #[cfg(test)]
    pub fn is_host_navigating(&self) -> bool {
        self.host_navigating
    }

    #[cfg(test)]
    pub fn controller(&self, letter: Letter) -> Option<ConnId> {
        self.controllers.get(&letter).copied()
    }

    #[cfg(test)]
    pub fn is_reserved(&self, letter: Letter) -> bool {
        self.reserved.contains(&letter)
    }

    #[cfg(test)]
    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    #[cfg(test)]
    pub fn walls(&self) -> &[Rect] {
        &self.walls
    }

    #[cfg(test)]
    pub fn simulation(&self) -> Option<&Simulation> {
        self.simulation.as_ref()
    }

    #[cfg(test)]
    pub fn simulation_mut(&mut self) -> Option<&mut Simulation> {
        self.simulation.as_mut()
    }

    #[cfg(test)]
    pub fn timers(&self) -> &RoomTimers {
        &self.timers
    }

    fn letters(&self) -> &'static [Letter] {
        Letter::configured(self.player_count)
    }

    fn all_reserved(&self) -> bool {
        self.letters().iter().all(|l| self.reserved.contains(l))
    }

    /// Host plus every bound controller
    pub fn recipients(&self) -> Vec<ConnId> {
        self.host
            .into_iter()
            .chain(self.controllers.values().copied())
            .collect()
    }

    fn broadcast(&self, out: &dyn Outbox, msg: &ServerMsg) {
        out.broadcast(&self.recipients(), msg);
    }

    /// Bind `conn` as the display for this room
    pub fn observe(&mut self, conn: ConnId) {
        self.host = Some(conn);
        self.host_navigating = false;
        debug!(room = %self.code, conn = %conn, "Host observing room");
    }

    /// Reserve the first free configured letter for `conn`
    pub fn claim_slot(&mut self, conn: ConnId, out: &dyn Outbox) -> Result<Letter, RoomError> {
        if self.state != RoomState::Waiting {
            return Err(RoomError::AlreadyStarted);
        }

        let letter = self
            .letters()
            .iter()
            .copied()
            .find(|l| !self.reserved.contains(l))
            .ok_or(RoomError::Full)?;

        self.reserved.insert(letter);
        out.send(conn, &ServerMsg::SlotClaimed { player: letter });

        if let Some(host) = self.host {
            out.send(
                host,
                &ServerMsg::PlayerJoined {
                    count: self.reserved.len(),
                    player: letter,
                    total: self.player_count,
                },
            );
        }

        info!(room = %self.code, conn = %conn, player = %letter, "Slot claimed");
        Ok(letter)
    }

    /// Bind `conn` as the controller of `letter`, replacing any earlier one
    pub fn attach(
        &mut self,
        conn: ConnId,
        letter: Letter,
        out: &dyn Outbox,
    ) -> Result<(), RoomError> {
        if !self.letters().contains(&letter) {
            return Err(RoomError::InvalidSlot(letter));
        }

        if let Some(previous) = self.controllers.insert(letter, conn) {
            if previous != conn {
                debug!(room = %self.code, player = %letter, "Controller replaced");
            }
        }
        out.send(conn, &ServerMsg::Attached { player: letter });

        // A controller rejoining mid-match needs the layout
        if self.state == RoomState::Playing {
            out.send(
                conn,
                &ServerMsg::GameStart {
                    walls: self.walls.clone(),
                    player_count: self.player_count,
                },
            );
        }

        info!(room = %self.code, conn = %conn, player = %letter, "Controller attached");
        Ok(())
    }

    /// Returns false if `conn` is not the current host
    pub fn mark_host_navigating(&mut self, conn: ConnId) -> bool {
        if self.host != Some(conn) {
            return false;
        }
        self.host_navigating = true;
        true
    }

    /// Host-issued start: needs every configured letter reserved
    pub fn start_game(&mut self, out: &dyn Outbox) -> Result<(), RoomError> {
        match self.state {
            RoomState::Waiting => {}
            RoomState::Finished => {
                return Err(RoomError::InvalidTransition(
                    "Match is over, restart to play again",
                ))
            }
            RoomState::Countdown | RoomState::Playing => {
                return Err(RoomError::InvalidTransition("Game already in progress"))
            }
        }
        if !self.all_reserved() {
            return Err(RoomError::PlayersNotReady);
        }

        let unattached: Vec<Letter> = self
            .letters()
            .iter()
            .copied()
            .filter(|l| !self.controllers.contains_key(l))
            .collect();
        if !unattached.is_empty() {
            warn!(room = %self.code, ?unattached, "Starting with reserved slots that have no controller");
        }

        // The display swaps pages once the countdown starts
        self.host_navigating = true;
        self.begin_countdown(out);
        Ok(())
    }

    /// Tear down whatever is running and count down again
    pub fn restart(&mut self, out: &dyn Outbox) -> Result<(), RoomError> {
        if !self.all_reserved() {
            return Err(RoomError::PlayersNotReady);
        }

        self.timers.cancel_all();
        self.simulation = None;
        self.state = RoomState::Waiting;
        info!(room = %self.code, "Room restarting");
        self.begin_countdown(out);
        Ok(())
    }

    fn begin_countdown(&mut self, out: &dyn Outbox) {
        self.timers.cancel_inactivity();
        self.state = RoomState::Countdown;

        let from = self.settings.countdown_from;
        self.broadcast(out, &ServerMsg::CountdownStart);
        self.broadcast(out, &ServerMsg::Countdown { value: from });
        self.timers.start_countdown(from, self.settings.countdown_period);

        info!(room = %self.code, from, "Countdown started");
    }

    /// Controller state for `letter`; ignored unless playing
    pub fn tank_input(&mut self, letter: Letter, input: TankInput) {
        if self.state != RoomState::Playing {
            return;
        }
        if let Some(sim) = self.simulation.as_mut() {
            sim.set_input(letter, input);
        }
    }

    /// Entry point for timer firings routed back from the loop
    pub fn on_timer(&mut self, kind: TimerKind, generation: u64, out: &dyn Outbox) -> TimerOutcome {
        if !self.timers.accepts(kind, generation) {
            debug!(room = %self.code, ?kind, generation, "Discarding stale timer");
            return TimerOutcome::Continue;
        }

        match kind {
            TimerKind::Countdown => {
                self.countdown_tick(out);
                TimerOutcome::Continue
            }
            TimerKind::Step => {
                self.step_at(Instant::now(), out);
                TimerOutcome::Continue
            }
            TimerKind::Inactivity => self.expire(out),
        }
    }

    fn countdown_tick(&mut self, out: &dyn Outbox) {
        match self.timers.next_countdown() {
            CountdownTick::Value(value) => self.broadcast(out, &ServerMsg::Countdown { value }),
            CountdownTick::Finished => self.start_match(out),
        }
    }

    fn start_match(&mut self, out: &dyn Outbox) {
        self.timers.cancel_countdown();
        self.timers.cancel_inactivity();
        self.state = RoomState::Playing;

        self.walls = generate_walls();
        self.simulation = Some(Simulation::new(self.letters(), self.walls.clone()));

        self.broadcast(
            out,
            &ServerMsg::GameStart {
                walls: self.walls.clone(),
                player_count: self.player_count,
            },
        );
        self.timers.start_clock(self.settings.tick_period);

        info!(room = %self.code, players = self.player_count, "Match started");
    }

    /// Advance the simulation one step and deliver its results
    pub fn step_at(&mut self, now: Instant, out: &dyn Outbox) {
        if self.state != RoomState::Playing {
            return;
        }
        let Some(sim) = self.simulation.as_mut() else {
            return;
        };

        let report = sim.step(now);

        for letter in &report.eliminated {
            info!(room = %self.code, player = %letter, "Tank eliminated");
            if let Some(conn) = self.controllers.get(letter) {
                out.send(*conn, &ServerMsg::Eliminated);
            }
        }

        self.broadcast(out, &report.snapshot);

        if let Some(winner) = report.outcome {
            self.timers.stop_clock();
            self.state = RoomState::Finished;
            self.broadcast(out, &ServerMsg::GameOver { winner });
            self.timers.arm_inactivity(self.settings.inactivity_timeout);
            info!(room = %self.code, %winner, "Match finished");
        }
    }

    fn expire(&mut self, out: &dyn Outbox) -> TimerOutcome {
        self.timers.cancel_inactivity();
        if self.state == RoomState::Playing {
            return TimerOutcome::Continue;
        }

        self.broadcast(out, &ServerMsg::RoomExpired);
        self.timers.cancel_all();
        info!(room = %self.code, "Room expired");
        TimerOutcome::Expired
    }

    /// Host connection closed
    pub fn disconnect_host(&mut self, conn: ConnId, out: &dyn Outbox) {
        if self.host != Some(conn) {
            return;
        }
        self.host = None;

        if self.host_navigating {
            debug!(room = %self.code, "Host left while navigating");
            return;
        }

        self.interrupt("host".to_string(), out);
    }

    /// Controller connection closed; stale connections for a rebound letter are ignored
    pub fn disconnect_controller(&mut self, letter: Letter, conn: ConnId, out: &dyn Outbox) {
        if self.controllers.get(&letter) != Some(&conn) {
            return;
        }
        self.controllers.remove(&letter);

        if self.state == RoomState::Playing {
            self.interrupt(format!("Tank {}", letter), out);
        }
    }

    /// Stop the clock, fall back to the lobby if a match was live, and
    /// tell everyone who left
    fn interrupt(&mut self, who: String, out: &dyn Outbox) {
        self.timers.stop_clock();
        if self.state == RoomState::Playing {
            self.state = RoomState::Waiting;
            self.simulation = None;
        }

        warn!(room = %self.code, who = %who, "Connection lost");
        self.broadcast(out, &ServerMsg::PlayerDisconnected { who });
        self.timers.arm_inactivity(self.settings.inactivity_timeout);
    }
}
