//! Protocol router: the single control loop that owns every room
//!
//! Socket readers, disconnects and room timers all post [`LoopEvent`]s into
//! one channel. The router drains it on one task, so room state is never
//! touched concurrently. A slow handler delays every other room sharing the
//! loop, so handlers must stay short and never await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::{Letter, TankInput};
use crate::room::{RoomError, RoomRegistry, RoomState, TimerFired, TimerOutcome};

use super::outbox::{ConnId, Outbox};
use super::protocol::{ClientMsg, ServerMsg};

/// Work item for the router loop
#[derive(Debug)]
pub enum LoopEvent {
    /// Decoded message from a connection
    Inbound { conn: ConnId, msg: ClientMsg },
    /// Connection closed
    Disconnected { conn: ConnId },
    /// A room timer fired
    Timer(TimerFired),
}

/// What a connection is to its room. Fixed once bound, except that a
/// claimant becomes a player when it attaches and a player may move to
/// another letter outside a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Claimant(Letter),
    Player(Letter),
}

#[derive(Debug, Clone)]
struct Binding {
    code: String,
    role: Role,
}

pub struct ProtocolRouter {
    registry: RoomRegistry,
    bindings: HashMap<ConnId, Binding>,
    outbox: Arc<dyn Outbox>,
    active_rooms: Arc<AtomicUsize>,
    events: mpsc::UnboundedReceiver<LoopEvent>,
}

impl ProtocolRouter {
    pub fn new(
        registry: RoomRegistry,
        outbox: Arc<dyn Outbox>,
        active_rooms: Arc<AtomicUsize>,
        events: mpsc::UnboundedReceiver<LoopEvent>,
    ) -> Self {
        Self {
            registry,
            bindings: HashMap::new(),
            outbox,
            active_rooms,
            events,
        }
    }

    /// Drain the event channel until every sender is gone
    pub async fn run(mut self) {
        info!("Protocol router started");
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
        info!("Protocol router stopped");
    }

    pub fn handle(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Inbound { conn, msg } => self.handle_message(conn, msg),
            LoopEvent::Disconnected { conn } => self.handle_disconnect(conn),
            LoopEvent::Timer(fired) => self.handle_timer(fired),
        }
        self.active_rooms
            .store(self.registry.len(), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn role_of(&self, conn: ConnId) -> Option<Role> {
        self.bindings.get(&conn).map(|b| b.role)
    }

    fn handle_message(&mut self, conn: ConnId, msg: ClientMsg) {
        let result = match msg {
            ClientMsg::CreateRoom { player_count } => self.create_room(conn, player_count),
            ClientMsg::Observe { code } => self.observe(conn, code),
            ClientMsg::ClaimSlot { code } => self.claim_slot(conn, code),
            ClientMsg::Attach { code, player } => self.attach(conn, code, player),
            ClientMsg::HostNavigating {} => {
                self.host_navigating(conn);
                Ok(())
            }
            ClientMsg::StartGame {} => self.start_game(conn),
            ClientMsg::TankInput { input } => {
                self.tank_input(conn, input);
                Ok(())
            }
            ClientMsg::RestartGame {} => self.restart_game(conn),
        };

        if let Err(e) = result {
            warn!(conn = %conn, error = %e, "Request rejected");
            self.outbox.send(conn, &ServerMsg::error(e.to_string()));
        }
    }

    /// A connection may only ever belong to one room
    fn check_bindable(&self, conn: ConnId, code: &str) -> Result<(), RoomError> {
        match self.bindings.get(&conn) {
            Some(binding) if binding.code != code => Err(RoomError::InvalidTransition(
                "Connection already belongs to another room",
            )),
            _ => Ok(()),
        }
    }

    fn bind(&mut self, conn: ConnId, code: String, role: Role) {
        self.bindings.insert(conn, Binding { code, role });
    }

    /// Room and role for a bound connection
    fn binding(&self, conn: ConnId) -> Option<(String, Role)> {
        self.bindings.get(&conn).map(|b| (b.code.clone(), b.role))
    }

    fn create_room(&mut self, conn: ConnId, player_count: Option<u8>) -> Result<(), RoomError> {
        if self.bindings.contains_key(&conn) {
            return Err(RoomError::InvalidTransition(
                "Connection already belongs to another room",
            ));
        }

        let room = self.registry.create(player_count, conn)?;
        let code = room.code().to_string();
        let player_count = room.player_count();

        self.bind(conn, code.clone(), Role::Host);
        self.outbox
            .send(conn, &ServerMsg::RoomCreated { code, player_count });
        Ok(())
    }

    /// Unknown codes are ignored
    fn observe(&mut self, conn: ConnId, code: String) -> Result<(), RoomError> {
        if !self.registry.contains(&code) {
            debug!(conn = %conn, room = %code, "Observe for unknown room");
            return Ok(());
        }
        self.check_bindable(conn, &code)?;
        if matches!(self.role_of(conn), Some(Role::Claimant(_) | Role::Player(_))) {
            return Err(RoomError::InvalidTransition(
                "Controller connection cannot display the room",
            ));
        }

        if let Some(room) = self.registry.get_mut(&code) {
            room.observe(conn);
        }
        self.bind(conn, code, Role::Host);
        Ok(())
    }

    fn claim_slot(&mut self, conn: ConnId, code: String) -> Result<(), RoomError> {
        if !self.registry.contains(&code) {
            return Err(RoomError::NotFound);
        }
        self.check_bindable(conn, &code)?;
        if self.bindings.contains_key(&conn) {
            return Err(RoomError::InvalidTransition(
                "Connection already has a role in this room",
            ));
        }

        let room = self.registry.get_mut(&code).ok_or(RoomError::NotFound)?;
        let letter = room.claim_slot(conn, &*self.outbox)?;
        self.bind(conn, code, Role::Claimant(letter));
        Ok(())
    }

    fn attach(&mut self, conn: ConnId, code: String, letter: Letter) -> Result<(), RoomError> {
        if !self.registry.contains(&code) {
            return Err(RoomError::NotFound);
        }
        self.check_bindable(conn, &code)?;
        let previous = self.role_of(conn);
        if previous == Some(Role::Host) {
            return Err(RoomError::InvalidTransition(
                "Host connection cannot control a tank",
            ));
        }

        let room = self.registry.get_mut(&code).ok_or(RoomError::NotFound)?;
        let switching = match previous {
            Some(Role::Player(old)) if old != letter => Some(old),
            _ => None,
        };
        if switching.is_some() && room.state() == RoomState::Playing {
            return Err(RoomError::InvalidTransition(
                "Cannot switch tanks during a match",
            ));
        }
        room.attach(conn, letter, &*self.outbox)?;

        // Outside a match this only releases the old letter
        if let Some(old) = switching {
            room.disconnect_controller(old, conn, &*self.outbox);
        }
        self.bind(conn, code, Role::Player(letter));
        Ok(())
    }

    fn host_navigating(&mut self, conn: ConnId) {
        let Some((code, Role::Host)) = self.binding(conn) else {
            return;
        };
        if let Some(room) = self.registry.get_mut(&code) {
            room.mark_host_navigating(conn);
        }
    }

    /// Only the host may start; anyone else is ignored
    fn start_game(&mut self, conn: ConnId) -> Result<(), RoomError> {
        let Some((code, Role::Host)) = self.binding(conn) else {
            debug!(conn = %conn, "start_game from a non-host connection");
            return Ok(());
        };
        let room = self.registry.get_mut(&code).ok_or(RoomError::NotFound)?;
        room.start_game(&*self.outbox)
    }

    fn tank_input(&mut self, conn: ConnId, input: TankInput) {
        let Some((code, Role::Player(letter))) = self.binding(conn) else {
            return;
        };
        if let Some(room) = self.registry.get_mut(&code) {
            room.tank_input(letter, input);
        }
    }

    /// Any connection bound to the room may restart it
    fn restart_game(&mut self, conn: ConnId) -> Result<(), RoomError> {
        let Some((code, _)) = self.binding(conn) else {
            return Ok(());
        };
        let room = self.registry.get_mut(&code).ok_or(RoomError::NotFound)?;
        room.restart(&*self.outbox)
    }

    fn handle_disconnect(&mut self, conn: ConnId) {
        let Some(binding) = self.bindings.remove(&conn) else {
            return;
        };
        let Some(room) = self.registry.get_mut(&binding.code) else {
            return;
        };

        match binding.role {
            Role::Host => room.disconnect_host(conn, &*self.outbox),
            Role::Player(letter) => room.disconnect_controller(letter, conn, &*self.outbox),
            // The reservation outlives the claim page
            Role::Claimant(_) => {}
        }
    }

    fn handle_timer(&mut self, fired: TimerFired) {
        let Some(room) = self.registry.get_mut(&fired.code) else {
            return;
        };

        if room.on_timer(fired.kind, fired.generation, &*self.outbox) == TimerOutcome::Expired {
            self.drop_room(&fired.code);
        }
    }

    /// Remove a room and unbind everything that pointed at it
    fn drop_room(&mut self, code: &str) {
        if self.registry.remove(code).is_some() {
            self.bindings.retain(|_, b| b.code != code);
            info!(room = %code, "Room removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::timers::TimerKind;
    use crate::room::RoomSettings;
    use crate::test_support::{loop_channel, RecordingOutbox};
    use serde_json::json;

    struct Harness {
        router: ProtocolRouter,
        out: Arc<RecordingOutbox>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = loop_channel();
            let out = Arc::new(RecordingOutbox::default());
            let registry = RoomRegistry::new(RoomSettings::default(), tx);
            let router = ProtocolRouter::new(
                registry,
                out.clone(),
                Arc::new(AtomicUsize::new(0)),
                rx,
            );
            Self { router, out }
        }

        fn send(&mut self, conn: ConnId, raw: &str) {
            let msg = ClientMsg::decode(raw).expect("test payload should decode");
            self.router.handle(LoopEvent::Inbound { conn, msg });
        }

        fn disconnect(&mut self, conn: ConnId) {
            self.router.handle(LoopEvent::Disconnected { conn });
        }

        fn fire(&mut self, code: &str, kind: TimerKind) {
            let generation = self
                .router
                .registry()
                .get(code)
                .expect("room should exist")
                .timers()
                .generation(kind);
            self.router.handle(LoopEvent::Timer(TimerFired {
                code: code.to_string(),
                kind,
                generation,
            }));
        }

        fn create(&mut self, host: ConnId, player_count: u8) -> String {
            self.send(
                host,
                &format!(r#"{{"type":"create_room","playerCount":{player_count}}}"#),
            );
            let created = self.out.to(host).pop().expect("room_created");
            created["code"].as_str().unwrap().to_string()
        }

        fn state(&self, code: &str) -> RoomState {
            self.router.registry().get(code).unwrap().state()
        }

        /// Claim and attach every slot, returning controller connections
        fn fill(&mut self, code: &str, player_count: usize) -> Vec<ConnId> {
            (0..player_count)
                .map(|_| {
                    let claimant = ConnId::new();
                    self.send(claimant, &format!(r#"{{"type":"claim_slot","code":"{code}"}}"#));
                    let letter = self.out.to(claimant).pop().unwrap()["player"]
                        .as_str()
                        .unwrap()
                        .to_string();
                    self.disconnect(claimant);

                    let controller = ConnId::new();
                    self.send(
                        controller,
                        &format!(r#"{{"type":"attach","code":"{code}","player":"{letter}"}}"#),
                    );
                    controller
                })
                .collect()
        }

        fn play(&mut self, host: ConnId, code: &str) {
            self.send(host, r#"{"type":"start_game"}"#);
            while self.state(code) == RoomState::Countdown {
                self.fire(code, TimerKind::Countdown);
            }
        }
    }

    #[tokio::test]
    async fn create_room_replies_with_code_and_count() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        assert_eq!(code.len(), 6);
        assert_eq!(
            h.out.to(host),
            vec![json!({"type": "room_created", "code": code, "playerCount": 2})]
        );
        assert_eq!(h.router.role_of(host), Some(Role::Host));
        assert_eq!(h.router.active_rooms.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn invalid_player_count_is_reported() {
        let mut h = Harness::new();
        let host = ConnId::new();
        h.send(host, r#"{"type":"create_room","playerCount":7}"#);
        assert_eq!(h.out.types_to(host), vec!["error"]);
        assert!(h.router.registry().is_empty());
    }

    #[tokio::test]
    async fn third_claim_in_two_player_room_is_full() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let claim = format!(r#"{{"type":"claim_slot","code":"{code}"}}"#);

        let (c1, c2, c3) = (ConnId::new(), ConnId::new(), ConnId::new());
        h.send(c1, &claim);
        h.send(c2, &claim);
        h.send(c3, &claim);

        assert_eq!(h.out.to(c1), vec![json!({"type": "slot_claimed", "player": "A"})]);
        assert_eq!(h.out.to(c2), vec![json!({"type": "slot_claimed", "player": "B"})]);
        assert_eq!(
            h.out.to(c3),
            vec![json!({"type": "error", "message": "Room is full"})]
        );
        assert_eq!(h.router.role_of(c3), None);
    }

    #[tokio::test]
    async fn unknown_room_errors_for_claim_and_attach_but_not_observe() {
        let mut h = Harness::new();
        let conn = ConnId::new();
        h.send(conn, r#"{"type":"claim_slot","code":"000000"}"#);
        h.send(conn, r#"{"type":"attach","code":"000000","player":"A"}"#);
        h.send(conn, r#"{"type":"observe","code":"000000"}"#);
        assert_eq!(
            h.out.to(conn),
            vec![
                json!({"type": "error", "message": "Room not found"}),
                json!({"type": "error", "message": "Room not found"}),
            ]
        );
    }

    #[tokio::test]
    async fn claim_after_start_is_rejected() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        h.fill(&code, 2);
        h.send(host, r#"{"type":"start_game"}"#);

        let late = ConnId::new();
        h.send(late, &format!(r#"{{"type":"claim_slot","code":"{code}"}}"#));
        assert_eq!(
            h.out.to(late),
            vec![json!({"type": "error", "message": "Game already started"})]
        );
    }

    #[tokio::test]
    async fn start_before_everyone_joined_is_rejected() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 3);
        h.fill(&code, 2);
        h.out.clear();
        h.send(host, r#"{"type":"start_game"}"#);
        assert_eq!(
            h.out.to(host),
            vec![json!({"type": "error", "message": "Not all players have joined yet"})]
        );
        assert_eq!(h.state(&code), RoomState::Waiting);
    }

    #[tokio::test]
    async fn only_the_host_may_start() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let controllers = h.fill(&code, 2);
        h.send(controllers[0], r#"{"type":"start_game"}"#);
        assert_eq!(h.state(&code), RoomState::Waiting);
    }

    #[tokio::test]
    async fn full_match_flow_reaches_game_state() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let controllers = h.fill(&code, 2);
        h.play(host, &code);
        assert_eq!(h.state(&code), RoomState::Playing);

        h.out.clear();
        h.send(
            controllers[0],
            r#"{"type":"tank_input","input":{"left":true}}"#,
        );
        // Input from a non-player connection is ignored
        h.send(host, r#"{"type":"tank_input","input":{"right":true}}"#);
        h.fire(&code, TimerKind::Step);

        let state = h.out.to(host).pop().unwrap();
        assert_eq!(state["type"], "game_state");
        assert_eq!(state["tanks"]["A"]["angle"], 43.0);
        assert_eq!(state["tanks"]["B"]["angle"], 135.0);
    }

    #[tokio::test]
    async fn player_disconnect_mid_match_is_broadcast() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let controllers = h.fill(&code, 2);
        h.play(host, &code);
        h.out.clear();

        h.disconnect(controllers[0]);
        assert_eq!(h.state(&code), RoomState::Waiting);
        assert_eq!(
            h.out.to(controllers[1]),
            vec![json!({"type": "player_disconnected", "who": "Tank A"})]
        );

        // The player reconnects and anyone bound may restart
        let again = ConnId::new();
        h.send(again, &format!(r#"{{"type":"attach","code":"{code}","player":"A"}}"#));
        h.send(controllers[1], r#"{"type":"restart_game"}"#);
        assert_eq!(h.state(&code), RoomState::Countdown);
    }

    #[tokio::test]
    async fn claimant_disconnect_keeps_reservation() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let claimant = ConnId::new();
        h.send(claimant, &format!(r#"{{"type":"claim_slot","code":"{code}"}}"#));
        h.disconnect(claimant);
        assert!(h.router.registry().get(&code).unwrap().is_reserved(Letter::A));
    }

    #[tokio::test]
    async fn host_navigating_survives_disconnect_and_observe_rebinds() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let controllers = h.fill(&code, 2);
        h.send(host, r#"{"type":"host_navigating"}"#);
        h.out.clear();

        h.disconnect(host);
        assert!(h.out.to(controllers[0]).is_empty());

        let display = ConnId::new();
        h.send(display, &format!(r#"{{"type":"observe","code":"{code}"}}"#));
        assert_eq!(h.router.registry().get(&code).unwrap().host(), Some(display));

        h.disconnect(display);
        assert_eq!(
            h.out.to(controllers[0]),
            vec![json!({"type": "player_disconnected", "who": "host"})]
        );
    }

    #[tokio::test]
    async fn connection_cannot_join_a_second_room() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let first = h.create(host, 2);
        let other_host = ConnId::new();
        let second = h.create(other_host, 2);

        let conn = ConnId::new();
        h.send(conn, &format!(r#"{{"type":"claim_slot","code":"{first}"}}"#));
        h.send(conn, &format!(r#"{{"type":"claim_slot","code":"{second}"}}"#));
        assert_eq!(h.out.types_to(conn), vec!["slot_claimed", "error"]);
        assert_eq!(h.router.registry().get(&second).unwrap().reserved_count(), 0);
    }

    #[tokio::test]
    async fn expiry_removes_room_and_bindings() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        h.fire(&code, TimerKind::Inactivity);

        assert_eq!(h.out.to(host).pop().unwrap(), json!({"type": "room_expired"}));
        assert!(h.router.registry().get(&code).is_none());
        assert_eq!(h.router.role_of(host), None);
        assert_eq!(h.router.active_rooms.load(Ordering::Relaxed), 0);

        // Late timers for a removed room are ignored
        h.router.handle(LoopEvent::Timer(TimerFired {
            code: code.clone(),
            kind: TimerKind::Step,
            generation: 1,
        }));
    }

    #[tokio::test]
    async fn restart_from_unbound_connection_is_ignored() {
        let mut h = Harness::new();
        let stranger = ConnId::new();
        h.send(stranger, r#"{"type":"restart_game"}"#);
        assert!(h.out.to(stranger).is_empty());
    }

    #[tokio::test]
    async fn host_cannot_claim_a_slot_and_can_still_start() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        h.out.clear();

        h.send(host, &format!(r#"{{"type":"claim_slot","code":"{code}"}}"#));
        assert_eq!(h.out.types_to(host), vec!["error"]);
        assert_eq!(h.router.role_of(host), Some(Role::Host));
        assert_eq!(h.router.registry().get(&code).unwrap().reserved_count(), 0);

        h.fill(&code, 2);
        h.send(host, r#"{"type":"start_game"}"#);
        assert_eq!(h.state(&code), RoomState::Countdown);
    }

    #[tokio::test]
    async fn claimant_cannot_reserve_a_second_letter() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 3);
        let claim = format!(r#"{{"type":"claim_slot","code":"{code}"}}"#);

        let conn = ConnId::new();
        h.send(conn, &claim);
        h.send(conn, &claim);
        assert_eq!(h.out.types_to(conn), vec!["slot_claimed", "error"]);
        assert_eq!(h.router.role_of(conn), Some(Role::Claimant(Letter::A)));
        assert_eq!(h.router.registry().get(&code).unwrap().reserved_count(), 1);
    }

    #[tokio::test]
    async fn player_cannot_become_the_display() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let controllers = h.fill(&code, 2);
        h.out.clear();

        h.send(controllers[0], &format!(r#"{{"type":"observe","code":"{code}"}}"#));
        assert_eq!(h.out.types_to(controllers[0]), vec!["error"]);
        assert_eq!(h.router.role_of(controllers[0]), Some(Role::Player(Letter::A)));

        let room = h.router.registry().get(&code).unwrap();
        assert_eq!(room.host(), Some(host));
        assert_eq!(room.controller(Letter::A), Some(controllers[0]));
    }

    #[tokio::test]
    async fn switching_tanks_mid_match_is_rejected() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 2);
        let controllers = h.fill(&code, 2);
        h.play(host, &code);
        h.out.clear();

        h.send(
            controllers[0],
            &format!(r#"{{"type":"attach","code":"{code}","player":"B"}}"#),
        );
        assert_eq!(
            h.out.to(controllers[0]),
            vec![json!({"type": "error", "message": "Cannot switch tanks during a match"})]
        );
        assert!(h.out.to(host).is_empty());
        assert_eq!(h.state(&code), RoomState::Playing);

        let room = h.router.registry().get(&code).unwrap();
        assert_eq!(room.controller(Letter::A), Some(controllers[0]));
        assert_eq!(room.controller(Letter::B), Some(controllers[1]));
    }

    #[tokio::test]
    async fn switching_tanks_in_the_lobby_releases_the_old_letter() {
        let mut h = Harness::new();
        let host = ConnId::new();
        let code = h.create(host, 3);
        let controllers = h.fill(&code, 2);
        h.out.clear();

        h.send(
            controllers[0],
            &format!(r#"{{"type":"attach","code":"{code}","player":"C"}}"#),
        );
        assert_eq!(h.out.types_to(controllers[0]), vec!["attached"]);
        assert!(h.out.to(host).is_empty());
        assert_eq!(h.router.role_of(controllers[0]), Some(Role::Player(Letter::C)));

        let room = h.router.registry().get(&code).unwrap();
        assert_eq!(room.controller(Letter::A), None);
        assert_eq!(room.controller(Letter::C), Some(controllers[0]));
    }
}
