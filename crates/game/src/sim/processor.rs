use std::collections::{BTreeMap, HashMap};

use glam::Vec3;

use crate::PlayerId;
use crate::anticheat::{AntiCheat, AntiCheatConfig};
use crate::combat::{CombatConfig, CombatSystem, FireCommand};
use crate::error::GameError;
use crate::event::{EventBus, GameEvent};
use crate::lagcomp::{Capsule, LagCompConfig, LagCompensation, WorldSnapshot};
use crate::map::ArenaMap;
use crate::match_state::{MatchConfig, MatchPhase, MatchStateMachine};
use crate::physics::{self, MoveInput, PhysicsConfig, PlayerPhysicsState};
use crate::protocol::{InputButtons, InputPacket, PlayerStateData, StateFlags, StateSnapshot};
use crate::spawn::{SpawnConfig, SpawnPoint, SpawnSystem};

use super::queue::InputQueue;

/// Pitch is clamped just short of straight up/down.
const PITCH_LIMIT_FACTOR: f32 = 0.98;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Radians of view rotation per look-delta unit.
    pub look_sensitivity: f32,
    pub max_input_queue: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            look_sensitivity: 0.002,
            max_input_queue: super::queue::MAX_INPUT_QUEUE_SIZE,
        }
    }
}

/// Every tunable the authoritative simulation needs, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub processor: ProcessorConfig,
    pub physics: PhysicsConfig,
    pub combat: CombatConfig,
    pub match_rules: MatchConfig,
    pub spawn: SpawnConfig,
    pub anticheat: AntiCheatConfig,
    pub lagcomp: LagCompConfig,
}

/// Authoritative view of one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerServerState {
    pub player_id: PlayerId,
    pub physics: PlayerPhysicsState,
    pub pitch: f32,
    pub yaw: f32,
    pub last_processed_sequence: u32,
}

/// Advances the authoritative world one tick at a time: match phase, queued
/// inputs through physics and anti-cheat, combat and respawns, then the
/// lag-compensation record and the outbound snapshot, in that fixed order.
pub struct TickProcessor {
    config: ProcessorConfig,
    physics_config: PhysicsConfig,
    map: ArenaMap,
    players: BTreeMap<PlayerId, PlayerServerState>,
    queues: BTreeMap<PlayerId, InputQueue>,
    combat: CombatSystem,
    match_machine: MatchStateMachine,
    spawns: SpawnSystem,
    anticheat: AntiCheat,
    lagcomp: LagCompensation,
    pending_kicks: Vec<PlayerId>,
}

impl TickProcessor {
    pub fn new(config: EngineConfig, map: ArenaMap, spawn_points: Vec<SpawnPoint>) -> Self {
        Self {
            physics_config: config.physics,
            map,
            players: BTreeMap::new(),
            queues: BTreeMap::new(),
            combat: CombatSystem::new(config.combat),
            match_machine: MatchStateMachine::new(config.match_rules),
            spawns: SpawnSystem::new(spawn_points, config.spawn),
            anticheat: AntiCheat::new(config.anticheat),
            lagcomp: LagCompensation::new(config.lagcomp),
            pending_kicks: Vec::new(),
            config: config.processor,
        }
    }

    pub fn match_phase(&self) -> MatchPhase {
        self.match_machine.phase()
    }

    pub fn winner_id(&self) -> Option<PlayerId> {
        self.match_machine.winner_id()
    }

    pub fn player_state(&self, player: PlayerId) -> Option<&PlayerServerState> {
        self.players.get(&player)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn combat(&self) -> &CombatSystem {
        &self.combat
    }

    /// Players the anti-cheat decided to kick since the last call. The
    /// session layer owns the actual disconnect.
    pub fn take_pending_kicks(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.pending_kicks)
    }

    /// Pick a joining player's spawn, away from everyone already present.
    pub fn select_spawn(
        &mut self,
        player: PlayerId,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> Result<SpawnPoint, GameError> {
        let others = self.other_positions(player);
        self.spawns.select(player, &others, now_ms, bus)
    }

    pub fn add_player(
        &mut self,
        player: PlayerId,
        spawn_position: Vec3,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> Result<(), GameError> {
        if self.players.contains_key(&player) {
            return Err(GameError::PlayerAlreadyExists(player));
        }

        let mut physics = PlayerPhysicsState::at(spawn_position);
        physics.last_grounded_ms = now_ms;

        self.players.insert(
            player,
            PlayerServerState {
                player_id: player,
                physics,
                pitch: 0.0,
                yaw: 0.0,
                last_processed_sequence: 0,
            },
        );
        self.queues
            .insert(player, InputQueue::new(self.config.max_input_queue));
        self.combat.initialize_player(player);
        self.match_machine.player_connected(player, now_ms, bus);
        log::info!("player {player} joined at {spawn_position}");
        Ok(())
    }

    pub fn remove_player(&mut self, player: PlayerId, now_ms: f64, bus: &mut EventBus) {
        if self.players.remove(&player).is_none() {
            return;
        }
        self.queues.remove(&player);
        self.combat.remove_player(player);
        self.anticheat.remove_player(player);
        self.match_machine.player_disconnected(player, now_ms, bus);
        log::info!("player {player} removed");
    }

    /// Queue an input for its owner. Unknown players are a no-op; stale
    /// sequences are dropped; a full queue drops its oldest entry.
    pub fn queue_input(&mut self, player: PlayerId, packet: InputPacket, now_ms: f64, bus: &mut EventBus) {
        let Some(state) = self.players.get(&player) else {
            return;
        };
        let last = state.last_processed_sequence;
        if last != 0 && !crate::protocol::sequence_greater_than(packet.sequence_number, last) {
            // Already processed (or older): drop.
            return;
        }

        let Some(queue) = self.queues.get_mut(&player) else {
            return;
        };
        if let Some(dropped_sequence) = queue.push(packet) {
            bus.publish(now_ms, GameEvent::InputBufferOverflow { dropped_sequence });
        }
    }

    /// One authoritative simulation step. Always returns the snapshot to
    /// broadcast for this tick.
    pub fn process_tick(
        &mut self,
        tick_number: u32,
        dt: f32,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> StateSnapshot {
        self.match_machine.update(now_ms, bus);

        if self.match_machine.phase() == MatchPhase::Playing {
            let ids: Vec<PlayerId> = self.players.keys().copied().collect();
            for id in ids {
                self.process_player_inputs(id, dt, now_ms, bus);
            }
        }

        self.process_respawns(now_ms, bus);
        self.record_history(tick_number, now_ms);

        self.build_snapshot(tick_number, now_ms)
    }

    fn process_player_inputs(&mut self, id: PlayerId, dt: f32, now_ms: f64, bus: &mut EventBus) {
        let last = match self.players.get(&id) {
            Some(state) => state.last_processed_sequence,
            None => return,
        };
        let ready = match self.queues.get_mut(&id) {
            Some(queue) => queue.drain_ready(last),
            None => return,
        };

        for input in ready {
            self.apply_input(id, &input, dt, now_ms, bus);
        }
    }

    fn apply_input(
        &mut self,
        id: PlayerId,
        input: &InputPacket,
        dt: f32,
        now_ms: f64,
        bus: &mut EventBus,
    ) {
        let Some(mut state) = self.players.get(&id).copied() else {
            return;
        };

        // Consumed either way; rejection only discards the movement delta.
        state.last_processed_sequence = input.sequence_number;

        if let Err(err) = self
            .anticheat
            .validate_timestamp(input.client_timestamp_ms, now_ms)
        {
            if self.anticheat.record_violation(id, &err, now_ms, bus) {
                self.pending_kicks.push(id);
            }
            self.players.insert(id, state);
            return;
        }

        state.yaw = physics::normalize_angle(
            state.yaw + input.look_delta_x as f32 * self.config.look_sensitivity,
        );
        let pitch_limit = std::f32::consts::FRAC_PI_2 * PITCH_LIMIT_FACTOR;
        state.pitch = (state.pitch + input.look_delta_y as f32 * self.config.look_sensitivity)
            .clamp(-pitch_limit, pitch_limit);

        let mut movement = MoveInput::from_packet(input);
        if movement.jump {
            if let Err(err) = self.anticheat.validate_jump(&state.physics, true, now_ms) {
                if self.anticheat.record_violation(id, &err, now_ms, bus) {
                    self.pending_kicks.push(id);
                }
                movement.jump = false;
            }
        }

        let alive = self
            .combat
            .player_state(id)
            .is_none_or(|c| !c.is_dead);
        if alive {
            let (candidate, effects) = physics::step(
                &state.physics,
                &movement,
                state.yaw,
                dt,
                now_ms,
                &self.physics_config,
                &self.map,
            );

            match self.anticheat.validate_move(
                &state.physics,
                &candidate,
                self.physics_config.max_speed,
                dt,
                now_ms,
            ) {
                Ok(()) => {
                    state.physics = candidate;
                    if effects.jumped {
                        bus.publish(now_ms, GameEvent::Jump { player: id });
                    }
                    if let Some(fall_speed) = effects.hard_landing {
                        bus.publish(now_ms, GameEvent::LandImpact { player: id, fall_speed });
                    }
                }
                Err(err) => {
                    if self.anticheat.record_violation(id, &err, now_ms, bus) {
                        self.pending_kicks.push(id);
                    }
                }
            }

            if input.buttons.contains(InputButtons::FIRE) {
                self.players.insert(id, state);
                self.fire(id, input.client_timestamp_ms, now_ms, bus);
                state = self.players[&id];
            }
        }

        self.players.insert(id, state);
    }

    fn fire(&mut self, shooter: PlayerId, client_timestamp_ms: f64, now_ms: f64, bus: &mut EventBus) {
        let Some(state) = self.players.get(&shooter) else {
            return;
        };
        let origin = state.physics.eye_position(&self.physics_config);
        let direction = physics::view_direction(state.yaw, state.pitch);

        // Evaluate the shot where the shooter saw the world; fall back to the
        // current tick when history is unavailable.
        let capsules = self
            .lagcomp
            .capsules_at_time(client_timestamp_ms, now_ms)
            .unwrap_or_else(|_| self.current_capsules());

        let world_distance = self
            .map
            .raycast(origin, direction, self.combat.config().weapon_range);

        let cmd = FireCommand {
            shooter,
            origin,
            direction,
            client_timestamp_ms,
        };

        match self.combat.process_fire(&cmd, &capsules, world_distance, now_ms, bus) {
            Ok(Some(hit)) => {
                let died = self.combat.apply_damage(
                    hit.target,
                    shooter,
                    hit.damage,
                    hit.hit_position,
                    now_ms,
                    bus,
                );
                if died {
                    self.match_machine.record_kill(shooter, hit.target, now_ms, bus);
                }
            }
            Ok(None) => {}
            Err(err) => log::debug!("fire rejected for {shooter}: {err}"),
        }
    }

    fn process_respawns(&mut self, now_ms: f64, bus: &mut EventBus) {
        for id in self.combat.update(now_ms) {
            let others = self.other_positions(id);
            let Ok(point) = self.spawns.select(id, &others, now_ms, bus) else {
                continue;
            };

            if let Some(state) = self.players.get_mut(&id) {
                let mut physics = PlayerPhysicsState::at(point.position);
                physics.last_grounded_ms = now_ms;
                state.physics = physics;
                state.yaw = physics::yaw_from_direction(point.look_direction);
                state.pitch = 0.0;
            }
            self.combat.respawn_player(id, now_ms);
        }
    }

    fn record_history(&mut self, tick_number: u32, now_ms: f64) {
        let mut snapshot = WorldSnapshot::new(tick_number, now_ms);
        for (&id, state) in &self.players {
            snapshot
                .player_positions
                .insert(id, state.physics.position);
            snapshot.player_capsules.insert(id, self.capsule_of(state));
        }
        self.lagcomp.record_snapshot(snapshot);
        self.lagcomp.prune_old_snapshots(now_ms);
    }

    fn build_snapshot(&self, tick_number: u32, now_ms: f64) -> StateSnapshot {
        let mut snapshot = StateSnapshot::new(tick_number, now_ms, self.match_machine.phase());

        for (&id, state) in &self.players {
            let combat = self.combat.player_state(id);

            let mut flags = StateFlags::empty();
            if state.physics.grounded {
                flags |= StateFlags::GROUNDED;
            }
            let health = match combat {
                Some(c) => {
                    if c.is_dead {
                        flags |= StateFlags::DEAD;
                    }
                    if c.is_invulnerable(now_ms) {
                        flags |= StateFlags::INVULNERABLE;
                    }
                    if c.is_respawning() {
                        flags |= StateFlags::RESPAWNING;
                    }
                    c.health
                }
                None => 0,
            };

            snapshot.players.push(PlayerStateData {
                entity_id: id,
                position: state.physics.position,
                pitch: state.pitch,
                yaw: state.yaw,
                velocity: state.physics.velocity,
                health,
                flags,
            });
        }

        snapshot.scores = self.match_machine.scores().clone();
        snapshot
    }

    fn current_capsules(&self) -> HashMap<PlayerId, Capsule> {
        self.players
            .iter()
            .map(|(&id, state)| (id, self.capsule_of(state)))
            .collect()
    }

    fn capsule_of(&self, state: &PlayerServerState) -> Capsule {
        Capsule {
            base: state.physics.position,
            radius: self.physics_config.player_radius,
            height: self.physics_config.player_height,
        }
    }

    fn other_positions(&self, player: PlayerId) -> Vec<Vec3> {
        self.players
            .iter()
            .filter(|&(&id, _)| id != player)
            .map(|(_, s)| s.physics.position)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> (TickProcessor, EventBus) {
        let config = EngineConfig::default();
        (
            TickProcessor::new(config, ArenaMap::flat(50.0), SpawnSystem::duel_arena_points()),
            EventBus::new(),
        )
    }

    fn start_match(p: &mut TickProcessor, bus: &mut EventBus) -> f64 {
        p.add_player(1, Vec3::new(0.0, 0.0, 0.0), 0.0, bus).unwrap();
        p.add_player(2, Vec3::new(0.0, 0.0, -10.0), 0.0, bus).unwrap();
        // Let the countdown elapse.
        let now = 3000.0;
        p.process_tick(0, 1.0 / 60.0, now, bus);
        assert_eq!(p.match_phase(), MatchPhase::Playing);
        now
    }

    fn moving_input(seq: u32, tick: u32, now: f64) -> InputPacket {
        let mut packet = InputPacket::new(seq, tick);
        packet.movement_y = 1.0;
        packet.client_timestamp_ms = now;
        packet
    }

    #[test]
    fn duplicate_player_is_rejected() {
        let (mut p, mut bus) = processor();
        p.add_player(1, Vec3::ZERO, 0.0, &mut bus).unwrap();
        assert!(matches!(
            p.add_player(1, Vec3::ZERO, 0.0, &mut bus),
            Err(GameError::PlayerAlreadyExists(1))
        ));
    }

    #[test]
    fn inputs_apply_in_sequence_and_move_the_player() {
        let (mut p, mut bus) = processor();
        let mut now = start_match(&mut p, &mut bus);

        // Out-of-order delivery; the queue restores order.
        now += 16.0;
        p.queue_input(1, moving_input(2, 1, now), now, &mut bus);
        p.queue_input(1, moving_input(1, 1, now), now, &mut bus);
        p.queue_input(1, moving_input(3, 1, now), now, &mut bus);
        p.process_tick(1, 1.0 / 60.0, now, &mut bus);

        let state = p.player_state(1).unwrap();
        assert_eq!(state.last_processed_sequence, 3);
        assert!(state.physics.position.z < 0.0);
    }

    #[test]
    fn gap_in_sequence_stalls_processing() {
        let (mut p, mut bus) = processor();
        let mut now = start_match(&mut p, &mut bus);

        now += 16.0;
        p.queue_input(1, moving_input(1, 1, now), now, &mut bus);
        p.queue_input(1, moving_input(3, 1, now), now, &mut bus);
        p.process_tick(1, 1.0 / 60.0, now, &mut bus);
        assert_eq!(p.player_state(1).unwrap().last_processed_sequence, 1);

        now += 16.0;
        p.queue_input(1, moving_input(2, 2, now), now, &mut bus);
        p.process_tick(2, 1.0 / 60.0, now, &mut bus);
        assert_eq!(p.player_state(1).unwrap().last_processed_sequence, 3);
    }

    #[test]
    fn inputs_are_ignored_outside_playing() {
        let (mut p, mut bus) = processor();
        p.add_player(1, Vec3::ZERO, 0.0, &mut bus).unwrap();
        p.queue_input(1, moving_input(1, 0, 10.0), 10.0, &mut bus);
        p.process_tick(0, 1.0 / 60.0, 10.0, &mut bus);

        let state = p.player_state(1).unwrap();
        assert_eq!(state.last_processed_sequence, 0);
        assert_eq!(state.physics.position, Vec3::ZERO);
    }

    #[test]
    fn unknown_player_input_is_a_noop() {
        let (mut p, mut bus) = processor();
        p.queue_input(99, moving_input(1, 0, 0.0), 0.0, &mut bus);
        assert_eq!(p.player_count(), 0);
    }

    #[test]
    fn look_deltas_rotate_and_clamp() {
        let (mut p, mut bus) = processor();
        let mut now = start_match(&mut p, &mut bus);

        now += 16.0;
        let mut packet = InputPacket::new(1, 1);
        packet.look_delta_x = 100;
        packet.look_delta_y = 30_000;
        packet.client_timestamp_ms = now;
        p.queue_input(1, packet, now, &mut bus);
        p.process_tick(1, 1.0 / 60.0, now, &mut bus);

        let state = p.player_state(1).unwrap();
        assert!((state.yaw - 0.2).abs() < 1e-4);
        let limit = std::f32::consts::FRAC_PI_2 * 0.98;
        assert!((state.pitch - limit).abs() < 1e-5);
    }

    #[test]
    fn fire_kills_and_scores() {
        let (mut p, mut bus) = processor();
        let mut now = start_match(&mut p, &mut bus);

        // Player 1 at origin faces -Z at player 2 ten meters out. The eye
        // sits above the capsule center, so the first input pitches down to
        // aim at it; four shots at 100 health and 25 damage.
        for shot in 0..4u32 {
            now += 250.0;
            let mut packet = InputPacket::new(shot + 1, shot + 1);
            packet.buttons = InputButtons::FIRE;
            if shot == 0 {
                packet.look_delta_y = -35;
            }
            packet.client_timestamp_ms = now;
            p.queue_input(1, packet, now, &mut bus);
            p.process_tick(shot + 1, 1.0 / 60.0, now, &mut bus);
        }

        let victim = p.combat().player_state(2).unwrap();
        assert!(victim.is_dead);

        // Kill recorded for the shooter.
        let snapshot = p.process_tick(10, 1.0 / 60.0, now + 16.0, &mut bus);
        assert_eq!(snapshot.scores.get(&1), Some(&1));
        assert!(
            snapshot
                .player(2)
                .unwrap()
                .flags
                .contains(StateFlags::DEAD)
        );
    }

    #[test]
    fn dead_players_respawn_with_invulnerability() {
        let (mut p, mut bus) = processor();
        let mut now = start_match(&mut p, &mut bus);

        now += 250.0;
        let mut packet = InputPacket::new(1, 1);
        packet.buttons = InputButtons::FIRE;
        packet.look_delta_y = -35;
        packet.client_timestamp_ms = now;
        p.queue_input(1, packet, now, &mut bus);
        // Soften the target first so one shot kills.
        for _ in 0..3 {
            p.combat.apply_damage(2, 1, 25, Vec3::ZERO, now, &mut bus);
        }
        p.process_tick(1, 1.0 / 60.0, now, &mut bus);
        assert!(p.combat().player_state(2).unwrap().is_dead);

        // Respawn timer elapses.
        let respawn_at = now + 3000.0;
        let snapshot = p.process_tick(2, 1.0 / 60.0, respawn_at, &mut bus);

        let revived = p.combat().player_state(2).unwrap();
        assert!(!revived.is_dead);
        assert_eq!(revived.health, 100);
        assert!(
            snapshot
                .player(2)
                .unwrap()
                .flags
                .contains(StateFlags::INVULNERABLE)
        );
        // Moved to a spawn point, facing the arena.
        let state = p.player_state(2).unwrap();
        assert!(state.physics.position.distance(Vec3::new(0.0, 0.0, -10.0)) > 1.0);
    }

    #[test]
    fn teleport_input_is_discarded_but_consumed() {
        let (mut p, mut bus) = processor();
        let mut now = start_match(&mut p, &mut bus);

        // A legitimate step first.
        now += 16.0;
        p.queue_input(1, moving_input(1, 1, now), now, &mut bus);
        p.process_tick(1, 1.0 / 60.0, now, &mut bus);
        let before = p.player_state(1).unwrap().physics.position;

        // Stale timestamp triggers the timestamp violation: delta discarded,
        // sequence still consumed.
        now += 16.0;
        let mut cheat = moving_input(2, 2, now - 60_000.0);
        cheat.movement_y = 1.0;
        p.queue_input(1, cheat, now, &mut bus);
        p.process_tick(2, 1.0 / 60.0, now, &mut bus);

        let state = p.player_state(1).unwrap();
        assert_eq!(state.last_processed_sequence, 2);
        assert_eq!(state.physics.position, before);
    }

    #[test]
    fn snapshot_carries_match_and_players() {
        let (mut p, mut bus) = processor();
        let now = start_match(&mut p, &mut bus);

        let snapshot = p.process_tick(5, 1.0 / 60.0, now + 16.0, &mut bus);
        assert_eq!(snapshot.match_state, MatchPhase::Playing);
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.scores.len(), 2);
        assert_eq!(snapshot.tick_number, 5);
        assert!(snapshot.player(1).unwrap().flags.contains(StateFlags::GROUNDED));
    }
}
