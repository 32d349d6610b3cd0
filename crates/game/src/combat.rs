use std::collections::HashMap;

use glam::Vec3;

use crate::PlayerId;
use crate::error::{CombatError, ValidationError};
use crate::event::{EventBus, GameEvent};
use crate::lagcomp::Capsule;

#[derive(Debug, Clone)]
pub struct CombatConfig {
    pub max_health: u8,
    pub damage: u8,
    pub fire_rate_cooldown_ms: f64,
    pub weapon_range: f32,
    pub respawn_time_ms: f64,
    pub invulnerability_duration_ms: f64,
    /// Added to the capsule radius for the hit test.
    pub hit_radius_bonus: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            max_health: 100,
            damage: 25,
            fire_rate_cooldown_ms: 200.0,
            weapon_range: 100.0,
            respawn_time_ms: 3000.0,
            invulnerability_duration_ms: 2000.0,
            hit_radius_bonus: 0.2,
        }
    }
}

/// Combat-side view of one player. `is_dead` holds exactly when health is 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerCombatState {
    pub health: u8,
    pub last_fire_time_ms: f64,
    pub death_time_ms: Option<f64>,
    pub respawn_time_ms: Option<f64>,
    pub invulnerable_until_ms: f64,
    pub is_dead: bool,
}

impl PlayerCombatState {
    fn new(max_health: u8) -> Self {
        Self {
            health: max_health,
            last_fire_time_ms: f64::NEG_INFINITY,
            death_time_ms: None,
            respawn_time_ms: None,
            invulnerable_until_ms: 0.0,
            is_dead: false,
        }
    }

    pub fn is_invulnerable(&self, now_ms: f64) -> bool {
        now_ms < self.invulnerable_until_ms
    }

    pub fn is_respawning(&self) -> bool {
        self.is_dead && self.respawn_time_ms.is_some()
    }
}

/// A shot as the tick processor hands it over: eye origin plus the view
/// direction derived from yaw/pitch.
#[derive(Debug, Clone, Copy)]
pub struct FireCommand {
    pub shooter: PlayerId,
    pub origin: Vec3,
    pub direction: Vec3,
    pub client_timestamp_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub target: PlayerId,
    pub hit_position: Vec3,
    pub damage: u8,
}

/// Weapon fire, damage, death and respawn timing. Hit detection runs against
/// the lag-compensated capsules the caller provides.
pub struct CombatSystem {
    config: CombatConfig,
    players: HashMap<PlayerId, PlayerCombatState>,
}

impl CombatSystem {
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            players: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    pub fn initialize_player(&mut self, player: PlayerId) {
        self.players
            .insert(player, PlayerCombatState::new(self.config.max_health));
    }

    pub fn remove_player(&mut self, player: PlayerId) {
        self.players.remove(&player);
    }

    /// Read-only snapshot; combat state is mutated only through this system.
    pub fn player_state(&self, player: PlayerId) -> Option<PlayerCombatState> {
        self.players.get(&player).copied()
    }

    /// Validate and resolve one shot. The ray is cut at the nearest world
    /// surface (`world_distance`) and the weapon range; the nearest capsule
    /// hit inside that distance wins, ties to the lower id.
    pub fn process_fire(
        &mut self,
        cmd: &FireCommand,
        capsules: &HashMap<PlayerId, Capsule>,
        world_distance: Option<f32>,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> Result<Option<HitResult>, CombatError> {
        let shooter = self
            .players
            .get_mut(&cmd.shooter)
            .ok_or(CombatError::UnknownPlayer(cmd.shooter))?;
        if shooter.is_dead {
            return Err(CombatError::PlayerDead(cmd.shooter));
        }

        let since_last = now_ms - shooter.last_fire_time_ms;
        if since_last < self.config.fire_rate_cooldown_ms {
            return Err(CombatError::Rejected(ValidationError::FireRateViolation {
                remaining_ms: self.config.fire_rate_cooldown_ms - since_last,
            }));
        }
        shooter.last_fire_time_ms = now_ms;

        bus.publish(
            now_ms,
            GameEvent::WeaponFired {
                player: cmd.shooter,
                origin: cmd.origin,
                direction: cmd.direction,
            },
        );

        let max_distance = world_distance
            .unwrap_or(f32::INFINITY)
            .min(self.config.weapon_range);

        let mut best: Option<(f32, PlayerId)> = None;
        for (&id, capsule) in capsules {
            if id == cmd.shooter {
                continue;
            }
            let Some(target) = self.players.get(&id) else {
                continue;
            };
            if target.is_dead || target.is_invulnerable(now_ms) {
                continue;
            }

            let radius = capsule.radius + self.config.hit_radius_bonus;
            let Some(distance) =
                ray_sphere(cmd.origin, cmd.direction, capsule.center(), radius)
            else {
                continue;
            };
            if distance > max_distance {
                continue;
            }

            let better = match best {
                None => true,
                Some((best_distance, best_id)) => {
                    distance < best_distance || (distance == best_distance && id < best_id)
                }
            };
            if better {
                best = Some((distance, id));
            }
        }

        let Some((distance, target)) = best else {
            return Ok(None);
        };

        let hit_position = cmd.origin + cmd.direction * distance;
        let result = HitResult {
            target,
            hit_position,
            damage: self.config.damage,
        };
        bus.publish(
            now_ms,
            GameEvent::HitConfirmed {
                attacker: cmd.shooter,
                target,
                position: hit_position,
                damage: result.damage,
            },
        );
        Ok(Some(result))
    }

    /// Subtract health, clamping at 0. Returns true when this application
    /// killed the victim (death is entered exactly once).
    pub fn apply_damage(
        &mut self,
        victim: PlayerId,
        attacker: PlayerId,
        damage: u8,
        _position: Vec3,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> bool {
        let Some(state) = self.players.get_mut(&victim) else {
            return false;
        };
        if state.is_dead || state.is_invulnerable(now_ms) {
            return false;
        }

        state.health = state.health.saturating_sub(damage);
        let health_after = state.health;
        bus.publish(
            now_ms,
            GameEvent::PlayerDamaged {
                player: victim,
                attacker,
                damage,
                health_after,
            },
        );

        if health_after == 0 {
            state.is_dead = true;
            state.death_time_ms = Some(now_ms);
            state.respawn_time_ms = Some(now_ms + self.config.respawn_time_ms);
            bus.publish(
                now_ms,
                GameEvent::PlayerDeath {
                    player: victim,
                    killer: Some(attacker),
                },
            );
            return true;
        }
        false
    }

    /// Players whose respawn timer has elapsed.
    pub fn update(&mut self, now_ms: f64) -> Vec<PlayerId> {
        let mut ready: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|(_, s)| s.is_dead && s.respawn_time_ms.is_some_and(|t| now_ms >= t))
            .map(|(&id, _)| id)
            .collect();
        ready.sort_unstable();
        ready
    }

    pub fn respawn_player(&mut self, player: PlayerId, now_ms: f64) {
        if let Some(state) = self.players.get_mut(&player) {
            state.health = self.config.max_health;
            state.is_dead = false;
            state.death_time_ms = None;
            state.respawn_time_ms = None;
            state.invulnerable_until_ms = now_ms + self.config.invulnerability_duration_ms;
        }
    }
}

/// Ray vs sphere, returning the entry distance. A ray starting inside the
/// sphere hits at distance 0.
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let to_center = center - origin;
    if to_center.length_squared() <= radius * radius {
        return Some(0.0);
    }

    let projection = to_center.dot(direction);
    if projection < 0.0 {
        return None;
    }

    let closest_sq = to_center.length_squared() - projection * projection;
    let radius_sq = radius * radius;
    if closest_sq > radius_sq {
        return None;
    }

    Some(projection - (radius_sq - closest_sq).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule_at(pos: Vec3) -> Capsule {
        Capsule {
            base: pos,
            radius: 0.4,
            height: 1.8,
        }
    }

    fn straight_shot(shooter: PlayerId, now: f64) -> FireCommand {
        FireCommand {
            shooter,
            origin: Vec3::new(0.0, 1.6, 0.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
            client_timestamp_ms: now,
        }
    }

    fn arena_with(players: &[PlayerId]) -> (CombatSystem, EventBus) {
        let mut combat = CombatSystem::new(CombatConfig::default());
        for &p in players {
            combat.initialize_player(p);
        }
        (combat, EventBus::new())
    }

    fn target_capsules() -> HashMap<PlayerId, Capsule> {
        // Player 2 standing 10 m straight ahead (-Z), chest height aligned.
        let mut capsules = HashMap::new();
        capsules.insert(1, capsule_at(Vec3::new(0.0, 0.0, 0.0)));
        capsules.insert(2, capsule_at(Vec3::new(0.0, 0.7, -10.0)));
        capsules
    }

    #[test]
    fn fire_hits_capsule_ahead() {
        let (mut combat, mut bus) = arena_with(&[1, 2]);
        let hit = combat
            .process_fire(&straight_shot(1, 1000.0), &target_capsules(), None, 1000.0, &mut bus)
            .unwrap()
            .expect("should hit");
        assert_eq!(hit.target, 2);
        assert_eq!(hit.damage, 25);
        assert!(hit.hit_position.z < 0.0);
    }

    #[test]
    fn fire_rate_is_enforced() {
        let (mut combat, mut bus) = arena_with(&[1, 2]);
        let capsules = target_capsules();

        assert!(
            combat
                .process_fire(&straight_shot(1, 1000.0), &capsules, None, 1000.0, &mut bus)
                .is_ok()
        );
        let err = combat
            .process_fire(&straight_shot(1, 1100.0), &capsules, None, 1100.0, &mut bus)
            .unwrap_err();
        assert!(matches!(
            err,
            CombatError::Rejected(ValidationError::FireRateViolation { .. })
        ));
        // Cooldown elapsed: accepted again.
        assert!(
            combat
                .process_fire(&straight_shot(1, 1200.0), &capsules, None, 1200.0, &mut bus)
                .is_ok()
        );
    }

    #[test]
    fn world_geometry_blocks_the_shot() {
        let (mut combat, mut bus) = arena_with(&[1, 2]);
        // A wall 3 m ahead, target at 10 m.
        let hit = combat
            .process_fire(
                &straight_shot(1, 1000.0),
                &target_capsules(),
                Some(3.0),
                1000.0,
                &mut bus,
            )
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn invulnerable_and_dead_targets_are_skipped() {
        let (mut combat, mut bus) = arena_with(&[1, 2]);
        combat.respawn_player(2, 1000.0);

        let hit = combat
            .process_fire(&straight_shot(1, 1500.0), &target_capsules(), None, 1500.0, &mut bus)
            .unwrap();
        assert!(hit.is_none(), "invulnerable target must not be hittable");

        // After the window passes, the same shot lands.
        let hit = combat
            .process_fire(&straight_shot(1, 4000.0), &target_capsules(), None, 4000.0, &mut bus)
            .unwrap();
        assert_eq!(hit.unwrap().target, 2);
    }

    #[test]
    fn damage_clamps_and_kills_once() {
        let (mut combat, mut bus) = arena_with(&[1, 2]);

        for _ in 0..3 {
            assert!(!combat.apply_damage(2, 1, 25, Vec3::ZERO, 1000.0, &mut bus));
        }
        assert!(combat.apply_damage(2, 1, 30, Vec3::ZERO, 1000.0, &mut bus));

        let state = combat.player_state(2).unwrap();
        assert_eq!(state.health, 0);
        assert!(state.is_dead);
        assert_eq!(state.respawn_time_ms, Some(4000.0));

        // Dead players ignore further damage.
        assert!(!combat.apply_damage(2, 1, 25, Vec3::ZERO, 1100.0, &mut bus));
    }

    #[test]
    fn dead_shooter_cannot_fire() {
        let (mut combat, mut bus) = arena_with(&[1, 2]);
        combat.apply_damage(1, 2, 100, Vec3::ZERO, 1000.0, &mut bus);

        let err = combat
            .process_fire(&straight_shot(1, 1500.0), &target_capsules(), None, 1500.0, &mut bus)
            .unwrap_err();
        assert!(matches!(err, CombatError::PlayerDead(1)));
    }

    #[test]
    fn respawn_cycle() {
        let (mut combat, mut bus) = arena_with(&[1, 2]);
        combat.apply_damage(2, 1, 100, Vec3::ZERO, 1000.0, &mut bus);

        assert!(combat.update(2000.0).is_empty());
        assert_eq!(combat.update(4000.0), vec![2]);

        combat.respawn_player(2, 4000.0);
        let state = combat.player_state(2).unwrap();
        assert_eq!(state.health, 100);
        assert!(!state.is_dead);
        assert!(state.is_invulnerable(5000.0));
        assert!(!state.is_invulnerable(6001.0));
    }

    #[test]
    fn nearest_hit_wins() {
        let (mut combat, mut bus) = arena_with(&[1, 2, 3]);
        let mut capsules = target_capsules();
        capsules.insert(3, capsule_at(Vec3::new(0.0, 0.7, -5.0)));

        let hit = combat
            .process_fire(&straight_shot(1, 1000.0), &capsules, None, 1000.0, &mut bus)
            .unwrap()
            .unwrap();
        assert_eq!(hit.target, 3);
    }
}
