use std::collections::VecDeque;

use arena::event::{EventBus, GameEvent};
use arena::map::ArenaMap;
use arena::physics::{self, MoveInput, PhysicsConfig, PlayerPhysicsState, StepEffects};
use arena::protocol::InputPacket;

#[derive(Debug, Clone)]
pub struct PredictionConfig {
    pub tick_rate: u32,
    /// Position error above which the client snaps to the server and
    /// replays.
    pub reconciliation_threshold: f32,
    pub max_pending_inputs: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            reconciliation_threshold: 0.1,
            max_pending_inputs: 128,
        }
    }
}

/// What a correction actually did, for the flight recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileReport {
    pub error_magnitude: f32,
    pub inputs_replayed: usize,
}

#[derive(Debug, Clone)]
struct PendingInput {
    sequence: u32,
    input: MoveInput,
    /// View yaw captured when the input was applied; replays use it, not the
    /// current yaw.
    yaw_at_apply: f32,
    time_at_apply_ms: f64,
}

/// Client-side prediction: every local input advances the predicted state
/// immediately with the same pure physics step the server runs, and the
/// unacknowledged tail replays on top of each authoritative correction.
pub struct PredictionSystem {
    config: PredictionConfig,
    physics_config: PhysicsConfig,
    map: ArenaMap,
    dt: f32,
    state: PlayerPhysicsState,
    pending: VecDeque<PendingInput>,
    last_acknowledged_sequence: u32,
}

impl PredictionSystem {
    pub fn new(
        config: PredictionConfig,
        physics_config: PhysicsConfig,
        map: ArenaMap,
        initial: PlayerPhysicsState,
    ) -> Self {
        let dt = 1.0 / config.tick_rate as f32;
        Self {
            config,
            physics_config,
            map,
            dt,
            state: initial,
            pending: VecDeque::new(),
            last_acknowledged_sequence: 0,
        }
    }

    pub fn predicted_state(&self) -> &PlayerPhysicsState {
        &self.state
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn last_acknowledged_sequence(&self) -> u32 {
        self.last_acknowledged_sequence
    }

    pub fn reset(&mut self, state: PlayerPhysicsState) {
        self.state = state;
        self.pending.clear();
        self.last_acknowledged_sequence = 0;
    }

    /// Record and immediately apply one local input.
    pub fn apply_input(
        &mut self,
        packet: &InputPacket,
        yaw: f32,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> StepEffects {
        let input = MoveInput::from_packet(packet);

        self.pending.push_back(PendingInput {
            sequence: packet.sequence_number,
            input,
            yaw_at_apply: yaw,
            time_at_apply_ms: now_ms,
        });
        if self.pending.len() > self.config.max_pending_inputs {
            if let Some(dropped) = self.pending.pop_front() {
                bus.publish(
                    now_ms,
                    GameEvent::InputBufferOverflow {
                        dropped_sequence: dropped.sequence,
                    },
                );
            }
        }

        let (next, effects) = physics::step(
            &self.state,
            &input,
            yaw,
            self.dt,
            now_ms,
            &self.physics_config,
            &self.map,
        );
        self.state = next;
        effects
    }

    /// Drop inputs the server has confirmed.
    pub fn acknowledge_input(&mut self, sequence: u32) {
        while self
            .pending
            .front()
            .is_some_and(|p| !arena::protocol::sequence_greater_than(p.sequence, sequence))
        {
            self.pending.pop_front();
        }
        if arena::protocol::sequence_greater_than(sequence, self.last_acknowledged_sequence) {
            self.last_acknowledged_sequence = sequence;
        }
    }

    /// Compare against the authoritative state for `server_sequence`. Within
    /// threshold this is a no-op; past it the state snaps to the server and
    /// the unacknowledged inputs replay in order with their captured yaws.
    pub fn reconcile(
        &mut self,
        server_state: &PlayerPhysicsState,
        server_sequence: u32,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> Option<ReconcileReport> {
        let error_magnitude = server_state.position.distance(self.state.position);
        if error_magnitude <= self.config.reconciliation_threshold {
            return None;
        }

        bus.publish(now_ms, GameEvent::DesyncDetected { error_magnitude });

        self.acknowledge_input(server_sequence);

        let mut replayed = *server_state;
        for pending in &self.pending {
            let (next, _) = physics::step(
                &replayed,
                &pending.input,
                pending.yaw_at_apply,
                self.dt,
                pending.time_at_apply_ms,
                &self.physics_config,
                &self.map,
            );
            replayed = next;
        }
        let inputs_replayed = self.pending.len();
        self.state = replayed;

        bus.publish(
            now_ms,
            GameEvent::Reconciliation {
                tick_number: server_sequence,
                error_magnitude,
                inputs_replayed,
            },
        );

        Some(ReconcileReport {
            error_magnitude,
            inputs_replayed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use arena::event::EventKind;
    use arena::protocol::InputButtons;
    use glam::Vec3;

    use super::*;

    fn system() -> PredictionSystem {
        PredictionSystem::new(
            PredictionConfig::default(),
            PhysicsConfig::default(),
            ArenaMap::flat(100.0),
            PlayerPhysicsState::at(Vec3::ZERO),
        )
    }

    fn forward_packet(seq: u32, now: f64) -> InputPacket {
        let mut packet = InputPacket::new(seq, seq);
        packet.movement_y = 1.0;
        packet.client_timestamp_ms = now;
        packet
    }

    #[test]
    fn inputs_move_the_predicted_state_immediately() {
        let mut prediction = system();
        let mut bus = EventBus::new();

        prediction.apply_input(&forward_packet(1, 16.0), 0.0, 16.0, &mut bus);
        assert!(prediction.predicted_state().position.z < 0.0);
        assert_eq!(prediction.pending_count(), 1);
    }

    #[test]
    fn acknowledge_trims_the_log() {
        let mut prediction = system();
        let mut bus = EventBus::new();
        for seq in 1..=5 {
            prediction.apply_input(&forward_packet(seq, seq as f64 * 16.0), 0.0, seq as f64 * 16.0, &mut bus);
        }

        prediction.acknowledge_input(3);
        assert_eq!(prediction.pending_count(), 2);
        assert_eq!(prediction.last_acknowledged_sequence(), 3);
    }

    #[test]
    fn overflow_drops_oldest_pending() {
        let mut prediction = PredictionSystem::new(
            PredictionConfig {
                max_pending_inputs: 3,
                ..Default::default()
            },
            PhysicsConfig::default(),
            ArenaMap::flat(100.0),
            PlayerPhysicsState::at(Vec3::ZERO),
        );
        let mut bus = EventBus::new();
        let dropped = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&dropped);
        bus.subscribe(EventKind::InputBufferOverflow, move |env| {
            if let GameEvent::InputBufferOverflow { dropped_sequence } = env.event {
                sink.borrow_mut().push(dropped_sequence);
            }
        });

        for seq in 1..=5 {
            prediction.apply_input(&forward_packet(seq, seq as f64 * 16.0), 0.0, seq as f64 * 16.0, &mut bus);
        }
        assert_eq!(prediction.pending_count(), 3);
        assert_eq!(*dropped.borrow(), vec![1, 2]);
    }

    #[test]
    fn small_error_is_left_alone() {
        let mut prediction = system();
        let mut bus = EventBus::new();
        prediction.apply_input(&forward_packet(1, 16.0), 0.0, 16.0, &mut bus);

        let before = *prediction.predicted_state();
        let mut server = before;
        server.position.x += 0.05;
        prediction.reconcile(&server, 1, 32.0, &mut bus);

        assert_eq!(*prediction.predicted_state(), before);
    }

    /// The S1 cycle: five inputs, the server acks two and reports a different
    /// position; the replayed tail must land exactly where replaying inputs
    /// 3..5 from the server state lands.
    #[test]
    fn reconcile_replays_unacknowledged_inputs() {
        let mut prediction = system();
        let mut bus = EventBus::new();

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        bus.subscribe_all(move |env| sink.borrow_mut().push(env.event.clone()));

        for seq in 1..=5u32 {
            prediction.apply_input(&forward_packet(seq, seq as f64 * 16.0), 0.0, seq as f64 * 16.0, &mut bus);
        }

        let mut server = PlayerPhysicsState::at(Vec3::new(2.0, 0.0, 2.0));
        server.velocity = Vec3::new(0.0, 0.0, 1.0);
        server.last_grounded_ms = 80.0;
        prediction.reconcile(&server, 2, 100.0, &mut bus);

        // Expected: server state stepped through inputs 3, 4, 5.
        let config = PhysicsConfig::default();
        let map = ArenaMap::flat(100.0);
        let mut expected = server;
        for seq in 3..=5u32 {
            let input = MoveInput::from_packet(&forward_packet(seq, 0.0));
            let (next, _) = physics::step(
                &expected,
                &input,
                0.0,
                1.0 / 60.0,
                seq as f64 * 16.0,
                &config,
                &map,
            );
            expected = next;
        }
        let predicted = prediction.predicted_state();
        assert!((predicted.position - expected.position).length() < 1e-5);

        let kinds: Vec<_> = events.borrow().iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&EventKind::DesyncDetected));
        let reconciliation = events
            .borrow()
            .iter()
            .find_map(|e| match e {
                GameEvent::Reconciliation {
                    inputs_replayed, ..
                } => Some(*inputs_replayed),
                _ => None,
            })
            .unwrap();
        assert_eq!(reconciliation, 3);
    }

    /// With nothing pending, reconciliation converges exactly onto the
    /// server position.
    #[test]
    fn reconcile_with_empty_log_matches_server() {
        let mut prediction = system();
        let mut bus = EventBus::new();
        for seq in 1..=4 {
            prediction.apply_input(&forward_packet(seq, seq as f64 * 16.0), 0.3, seq as f64 * 16.0, &mut bus);
        }

        let server = PlayerPhysicsState::at(Vec3::new(-3.0, 0.0, 7.0));
        prediction.reconcile(&server, 4, 100.0, &mut bus);

        assert_eq!(prediction.predicted_state().position, server.position);
        assert_eq!(prediction.pending_count(), 0);
    }

    #[test]
    fn jump_input_is_replayed_with_captured_yaw() {
        let mut prediction = system();
        let mut bus = EventBus::new();

        let mut packet = forward_packet(1, 16.0);
        packet.buttons = InputButtons::JUMP;
        // Applied with a yaw pointing +X (-pi/2).
        prediction.apply_input(&packet, -std::f32::consts::FRAC_PI_2, 16.0, &mut bus);

        let server = PlayerPhysicsState::at(Vec3::ZERO);
        prediction.reconcile(&server, 0, 32.0, &mut bus);

        // Replay moved along +X despite the method receiving no yaw.
        assert!(prediction.predicted_state().position.x > 0.0);
        assert!((prediction.predicted_state().position.z).abs() < 1e-4);
    }
}
