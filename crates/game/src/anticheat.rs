use std::collections::{HashMap, VecDeque};

use crate::PlayerId;
use crate::error::ValidationError;
use crate::event::{EventBus, GameEvent};
use crate::physics::PlayerPhysicsState;

#[derive(Debug, Clone)]
pub struct AntiCheatConfig {
    /// Allowed headroom over the configured maximum speed.
    pub max_speed_multiplier: f32,
    /// Grace window after leaving the ground during which speed and jump
    /// checks stay lenient.
    pub coyote_time_ms: f64,
    pub max_timestamp_deviation_ms: f64,
    pub violation_window_ms: f64,
    pub violation_threshold: usize,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            max_speed_multiplier: 1.5,
            coyote_time_ms: 100.0,
            max_timestamp_deviation_ms: 2000.0,
            violation_window_ms: 10_000.0,
            violation_threshold: 10,
        }
    }
}

/// Server-side movement validation. Each check is independent and never
/// mutates player state; the caller discards the rejected delta.
pub struct AntiCheat {
    config: AntiCheatConfig,
    violations: HashMap<PlayerId, VecDeque<f64>>,
}

impl AntiCheat {
    pub fn new(config: AntiCheatConfig) -> Self {
        Self {
            config,
            violations: HashMap::new(),
        }
    }

    pub fn remove_player(&mut self, player: PlayerId) {
        self.violations.remove(&player);
    }

    /// Horizontal displacement check. Vertical motion is integrator-owned
    /// (gravity and jumps are applied server-side) and not client-claimable,
    /// so only the ground plane distance is compared.
    pub fn validate_move(
        &self,
        previous: &PlayerPhysicsState,
        candidate: &PlayerPhysicsState,
        max_speed: f32,
        dt: f32,
        now_ms: f64,
    ) -> Result<(), ValidationError> {
        if dt <= 0.0 {
            return Err(ValidationError::InvalidInput);
        }

        let in_coyote = !previous.grounded
            && now_ms - previous.last_grounded_ms <= self.config.coyote_time_ms;
        if in_coyote {
            return Ok(());
        }

        let delta = candidate.position - previous.position;
        let horizontal = (delta.x * delta.x + delta.z * delta.z).sqrt();
        let speed = horizontal / dt;
        let limit = max_speed * self.config.max_speed_multiplier;

        if speed > limit + 1e-3 {
            return Err(ValidationError::SpeedViolation { speed, max: limit });
        }
        Ok(())
    }

    pub fn validate_jump(
        &self,
        state: &PlayerPhysicsState,
        jump_pressed: bool,
        now_ms: f64,
    ) -> Result<(), ValidationError> {
        if !jump_pressed || state.grounded {
            return Ok(());
        }
        if now_ms - state.last_grounded_ms <= self.config.coyote_time_ms {
            return Ok(());
        }
        Err(ValidationError::InvalidJump)
    }

    pub fn validate_timestamp(
        &self,
        client_timestamp_ms: f64,
        server_now_ms: f64,
    ) -> Result<(), ValidationError> {
        let deviation_ms = (client_timestamp_ms - server_now_ms).abs();
        if deviation_ms > self.config.max_timestamp_deviation_ms {
            return Err(ValidationError::TimestampViolation { deviation_ms });
        }
        Ok(())
    }

    /// Count a rejected input inside the rolling window. Returns true when
    /// the player crossed the kick threshold with this violation.
    pub fn record_violation(
        &mut self,
        player: PlayerId,
        error: &ValidationError,
        now_ms: f64,
        bus: &mut EventBus,
    ) -> bool {
        let window = self.violations.entry(player).or_default();
        window.push_back(now_ms);
        let cutoff = now_ms - self.config.violation_window_ms;
        while window.front().is_some_and(|&t| t < cutoff) {
            window.pop_front();
        }

        let count = window.len() as u32;
        log::debug!("player {player} violation: {error} ({count} in window)");
        bus.publish(
            now_ms,
            GameEvent::ViolationDetected {
                player,
                reason: error.to_string(),
                count,
            },
        );

        if count as usize > self.config.violation_threshold {
            bus.publish(
                now_ms,
                GameEvent::PlayerKicked {
                    player,
                    reason: error.to_string(),
                    violations: count,
                },
            );
            self.violations.remove(&player);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn grounded_at(position: Vec3) -> PlayerPhysicsState {
        PlayerPhysicsState::at(position)
    }

    #[test]
    fn legal_speed_passes() {
        let ac = AntiCheat::new(AntiCheatConfig::default());
        let prev = grounded_at(Vec3::ZERO);
        let mut next = prev;
        next.position = Vec3::new(8.0 / 60.0, 0.0, 0.0);

        assert!(ac.validate_move(&prev, &next, 8.0, 1.0 / 60.0, 0.0).is_ok());
    }

    #[test]
    fn teleport_is_rejected() {
        let ac = AntiCheat::new(AntiCheatConfig::default());
        let prev = grounded_at(Vec3::ZERO);
        let mut next = prev;
        next.position = Vec3::new(5.0, 0.0, 0.0);

        let err = ac
            .validate_move(&prev, &next, 8.0, 1.0 / 60.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, ValidationError::SpeedViolation { .. }));
    }

    #[test]
    fn coyote_window_tolerates_speed() {
        let ac = AntiCheat::new(AntiCheatConfig::default());
        let mut prev = grounded_at(Vec3::ZERO);
        prev.grounded = false;
        prev.last_grounded_ms = 1000.0;
        let mut next = prev;
        next.position = Vec3::new(5.0, 0.0, 0.0);

        // 50 ms after leaving ground: tolerated.
        assert!(
            ac.validate_move(&prev, &next, 8.0, 1.0 / 60.0, 1050.0)
                .is_ok()
        );
        // 500 ms after: not.
        assert!(
            ac.validate_move(&prev, &next, 8.0, 1.0 / 60.0, 1500.0)
                .is_err()
        );
    }

    #[test]
    fn airborne_jump_outside_coyote_is_invalid() {
        let ac = AntiCheat::new(AntiCheatConfig::default());
        let mut state = grounded_at(Vec3::new(0.0, 3.0, 0.0));
        state.grounded = false;
        state.last_grounded_ms = 0.0;

        assert!(ac.validate_jump(&state, true, 50.0).is_ok());
        assert_eq!(
            ac.validate_jump(&state, true, 500.0).unwrap_err(),
            ValidationError::InvalidJump
        );
        assert!(ac.validate_jump(&state, false, 500.0).is_ok());
    }

    #[test]
    fn timestamp_deviation() {
        let ac = AntiCheat::new(AntiCheatConfig::default());
        assert!(ac.validate_timestamp(10_000.0, 10_500.0).is_ok());
        assert!(matches!(
            ac.validate_timestamp(10_000.0, 13_000.0),
            Err(ValidationError::TimestampViolation { .. })
        ));
    }

    #[test]
    fn violations_expire_and_threshold_kicks() {
        let config = AntiCheatConfig {
            violation_threshold: 3,
            violation_window_ms: 1000.0,
            ..Default::default()
        };
        let mut ac = AntiCheat::new(config);
        let mut bus = EventBus::new();
        let err = ValidationError::InvalidJump;

        assert!(!ac.record_violation(1, &err, 0.0, &mut bus));
        assert!(!ac.record_violation(1, &err, 100.0, &mut bus));
        assert!(!ac.record_violation(1, &err, 200.0, &mut bus));
        // Fourth inside the window crosses the threshold.
        assert!(ac.record_violation(1, &err, 300.0, &mut bus));

        // After a kick the slate is clean; old entries also age out.
        assert!(!ac.record_violation(1, &err, 5000.0, &mut bus));
        assert!(!ac.record_violation(1, &err, 5100.0, &mut bus));
        assert!(!ac.record_violation(1, &err, 7000.0, &mut bus));
        assert!(!ac.record_violation(1, &err, 7100.0, &mut bus));
    }
}
