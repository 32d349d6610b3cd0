use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use arena::PlayerId;
use arena::clock::ClockSync;
use arena::diagnostics::FlightRecorder;
use arena::error::NetError;
use arena::event::{EventBus, GameEvent};
use arena::map::ArenaMap;
use arena::match_state::MatchPhase;
use arena::net::TransportSession;
use arena::physics::{self, PlayerPhysicsState};
use arena::protocol::{
    InputButtons, MatchEventKind, Message, NO_WINNER, PlayerEventKind, PlayerStateData, StateFlags,
    StateSnapshot,
};

use super::config::ClientConfig;
use super::input::InputCapture;
use super::interpolation::{InterpolationBuffer, RemoteEntityView};
use super::prediction::PredictionSystem;

/// The whole client netcode stack behind one facade: transport session,
/// clock calibration, local prediction, remote interpolation and the flight
/// recorder. The render loop drives it with local wall-clock milliseconds.
pub struct GameClient {
    config: ClientConfig,
    session: TransportSession,
    clock: ClockSync,
    prediction: PredictionSystem,
    interpolation: InterpolationBuffer,
    recorder: FlightRecorder,
    input: InputCapture,
    inbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
    local_id: Option<PlayerId>,
    yaw: f32,
    pitch: f32,
    match_phase: MatchPhase,
    winner: Option<PlayerId>,
    awaiting_full_state: bool,
    known_players: HashMap<PlayerId, PlayerStateData>,
    last_clock_sync_ms: f64,
}

impl GameClient {
    pub fn new(config: ClientConfig) -> Self {
        let inbox: Rc<RefCell<VecDeque<Vec<u8>>>> = Rc::new(RefCell::new(VecDeque::new()));
        let mut session = TransportSession::new(config.server_addr.clone(), config.session.clone());
        let sink = Rc::clone(&inbox);
        session.on_message(move |frame| sink.borrow_mut().push_back(frame.to_vec()));

        let prediction = PredictionSystem::new(
            config.prediction.clone(),
            config.physics.clone(),
            ArenaMap::duel_arena(),
            PlayerPhysicsState::at(glam::Vec3::ZERO),
        );

        Self {
            session,
            clock: ClockSync::new(config.clock.clone()),
            prediction,
            interpolation: InterpolationBuffer::new(config.interpolation.clone()),
            recorder: FlightRecorder::new(config.recorder.clone()),
            input: InputCapture::new(),
            inbox,
            local_id: None,
            yaw: 0.0,
            pitch: 0.0,
            match_phase: MatchPhase::Waiting,
            winner: None,
            awaiting_full_state: false,
            known_players: HashMap::new(),
            last_clock_sync_ms: f64::NEG_INFINITY,
            config,
        }
    }

    pub fn connect(&mut self, now_ms: f64, bus: &mut EventBus) -> Result<(), NetError> {
        self.session.connect(now_ms, bus)?;
        self.awaiting_full_state = true;
        self.session.send(&Message::FullStateRequest.encode())?;
        Ok(())
    }

    pub fn disconnect(&mut self, now_ms: f64, bus: &mut EventBus) {
        self.session.disconnect(now_ms, bus);
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    pub fn match_phase(&self) -> MatchPhase {
        self.match_phase
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn predicted_state(&self) -> &PlayerPhysicsState {
        self.prediction.predicted_state()
    }

    pub fn input_mut(&mut self) -> &mut InputCapture {
        &mut self.input
    }

    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    /// Remote entities at the interpolated render point for `now_ms`.
    pub fn remote_views(&self, now_ms: f64) -> Vec<RemoteEntityView> {
        self.interpolation
            .sample(self.clock.local_to_server(now_ms), self.local_id)
    }

    /// Capture one tick's input: rotate the view by the drained look deltas,
    /// predict locally, and put the packet on the wire.
    pub fn send_input(&mut self, now_ms: f64, bus: &mut EventBus) {
        if !self.session.is_connected() || self.local_id.is_none() {
            return;
        }

        let server_now = self.clock.local_to_server(now_ms);
        let tick = self.interpolation.latest_tick().unwrap_or(0);
        let packet = self.input.build_packet(tick, server_now);

        self.yaw = physics::normalize_angle(
            self.yaw + packet.look_delta_x as f32 * self.config.look_sensitivity,
        );
        let pitch_limit = std::f32::consts::FRAC_PI_2 * 0.98;
        self.pitch = (self.pitch + packet.look_delta_y as f32 * self.config.look_sensitivity)
            .clamp(-pitch_limit, pitch_limit);

        self.prediction.apply_input(&packet, self.yaw, server_now, bus);
        self.recorder.record_input(server_now, &packet);

        if let Err(err) = self.session.send(&Message::Input(packet).encode()) {
            log::warn!("input send failed: {err}");
        }
    }

    /// Pump the session, process everything inbound, keep the clock fresh.
    pub fn update(&mut self, now_ms: f64, bus: &mut EventBus) {
        self.session.update(now_ms, bus);

        loop {
            let frame = self.inbox.borrow_mut().pop_front();
            let Some(frame) = frame else { break };
            match Message::decode(&frame) {
                Ok(message) => self.handle_message(message, now_ms, bus),
                Err(err) => log::warn!("undecodable frame: {err}"),
            }
        }

        if self.session.is_connected()
            && now_ms - self.last_clock_sync_ms >= self.config.clock_sync_interval_ms
        {
            self.last_clock_sync_ms = now_ms;
            let request = Message::ClockSyncRequest {
                client_send_ms: now_ms,
            };
            if let Err(err) = self.session.send(&request.encode()) {
                log::debug!("clock sync send failed: {err}");
            }
        }
    }

    pub fn export_diagnostics(&self, now_ms: f64) -> serde_json::Value {
        self.recorder.export(now_ms)
    }

    fn handle_message(&mut self, message: Message, now_ms: f64, bus: &mut EventBus) {
        match message {
            Message::Snapshot(snapshot) => self.handle_snapshot(snapshot, now_ms, bus),
            Message::InputAck { sequence_number } => {
                self.prediction.acknowledge_input(sequence_number);
                bus.publish(now_ms, GameEvent::InputAcknowledged { sequence_number });
            }
            Message::ClockSyncResponse {
                client_send_ms,
                server_time_ms,
            } => {
                self.clock
                    .add_sample(client_send_ms, server_time_ms, now_ms, bus);
                if self.clock.is_calibrated() {
                    let mid_local = (client_send_ms + now_ms) / 2.0;
                    self.clock.check_drift(server_time_ms, mid_local, bus);
                    let rtt = self.clock.rtt_ms();
                    if rtt > self.config.high_latency_threshold_ms {
                        bus.publish(now_ms, GameEvent::HighLatency { rtt_ms: rtt });
                    }
                }
            }
            Message::PlayerEvent { kind, entity_id } => match kind {
                PlayerEventKind::Joined => {
                    if self.local_id.is_none() {
                        // The first join notice after connecting names us.
                        self.local_id = Some(entity_id);
                        bus.publish(
                            now_ms,
                            GameEvent::ConnectionEstablished {
                                player: Some(entity_id),
                                rtt_ms: self.clock.rtt_ms(),
                            },
                        );
                    } else {
                        log::info!("player {entity_id} joined");
                    }
                }
                PlayerEventKind::Left => log::info!("player {entity_id} left"),
                PlayerEventKind::Kicked => {
                    log::warn!("player {entity_id} was kicked");
                }
            },
            Message::MatchEvent { kind, value } => match kind {
                MatchEventKind::CountdownTick => log::info!("match starts in {value}"),
                MatchEventKind::Start => log::info!("match started"),
                MatchEventKind::End => {
                    let winner = (value as u16 != NO_WINNER).then_some(value as u16);
                    self.winner = winner;
                    log::info!("match over, winner {winner:?}");
                }
            },
            Message::Keepalive => {}
            other => log::debug!("ignoring server-bound message {other:?}"),
        }
    }

    fn handle_snapshot(&mut self, snapshot: StateSnapshot, now_ms: f64, bus: &mut EventBus) {
        let server_now = self.clock.local_to_server(now_ms);
        let snapshot = self.expand(snapshot);

        self.match_phase = snapshot.match_state;

        if let Some(local_id) = self.local_id {
            if let Some(local) = snapshot.player(local_id) {
                let server_state = physics_from_wire(local, snapshot.server_timestamp_ms);
                let acked = self.prediction.last_acknowledged_sequence();
                if let Some(report) =
                    self.prediction
                        .reconcile(&server_state, acked, server_now, bus)
                {
                    self.recorder.record_reconciliation(
                        server_now,
                        snapshot.tick_number,
                        report.error_magnitude,
                        report.inputs_replayed,
                    );
                }
            }
        }

        if self.awaiting_full_state && !snapshot.is_delta {
            self.awaiting_full_state = false;
            bus.publish(
                now_ms,
                GameEvent::FullStateSync {
                    tick_number: snapshot.tick_number,
                },
            );
        }

        self.recorder.record_snapshot(server_now, &snapshot);
        self.interpolation.push_snapshot(snapshot);
    }

    /// Merge a delta into the last known full player set; full snapshots
    /// replace it.
    fn expand(&mut self, snapshot: StateSnapshot) -> StateSnapshot {
        if !snapshot.is_delta {
            self.known_players = snapshot
                .players
                .iter()
                .map(|p| (p.entity_id, *p))
                .collect();
            return snapshot;
        }

        for player in &snapshot.players {
            self.known_players.insert(player.entity_id, *player);
        }

        let mut expanded = snapshot;
        expanded.is_delta = false;
        expanded.players = self.known_players.values().copied().collect();
        expanded.players.sort_by_key(|p| p.entity_id);
        expanded
    }
}

/// Authoritative physics state reconstructed from a snapshot entry.
fn physics_from_wire(data: &PlayerStateData, server_timestamp_ms: f64) -> PlayerPhysicsState {
    let grounded = data.flags.contains(StateFlags::GROUNDED);
    PlayerPhysicsState {
        position: data.position,
        velocity: data.velocity,
        grounded,
        last_grounded_ms: if grounded { server_timestamp_ms } else { 0.0 },
        landing_penalty_end_ms: 0.0,
    }
}

/// Convenience wrapper for harness code: fire button for exactly one packet.
impl GameClient {
    pub fn pull_trigger(&mut self) {
        self.input.set_button(InputButtons::FIRE, true);
    }

    pub fn release_trigger(&mut self) {
        self.input.set_button(InputButtons::FIRE, false);
    }
}
