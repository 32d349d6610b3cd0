use glam::Vec3;

use crate::map::ArenaMap;
use crate::protocol::{InputButtons, InputPacket};

/// Movement portion of an input, decoded from the wire packet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveInput {
    pub movement_x: f32,
    pub movement_y: f32,
    pub jump: bool,
    pub crouch: bool,
}

impl MoveInput {
    pub fn from_packet(packet: &InputPacket) -> Self {
        Self {
            movement_x: packet.movement_x,
            movement_y: packet.movement_y,
            jump: packet.buttons.contains(InputButtons::JUMP),
            crouch: packet.buttons.contains(InputButtons::CROUCH),
        }
    }

    pub fn is_active(&self) -> bool {
        self.movement_x * self.movement_x + self.movement_y * self.movement_y > 0.001
    }
}

/// Kinematic state of one player. Mutated only by [`step`]; `position` is the
/// feet point and is bounded by collision resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPhysicsState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    pub last_grounded_ms: f64,
    pub landing_penalty_end_ms: f64,
}

impl PlayerPhysicsState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            grounded: true,
            last_grounded_ms: 0.0,
            landing_penalty_end_ms: 0.0,
        }
    }

    pub fn eye_position(&self, config: &PhysicsConfig) -> Vec3 {
        self.position + Vec3::new(0.0, config.eye_height, 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    pub max_speed: f32,
    pub crouch_speed_factor: f32,
    pub accelerate_ground: f32,
    pub accelerate_air: f32,
    pub decelerate_ground: f32,
    pub decelerate_air: f32,
    pub gravity: f32,
    pub jump_power: f32,
    pub max_fall_speed: f32,
    pub coyote_time_ms: f64,
    pub hard_landing_speed: f32,
    pub landing_penalty_ms: f64,
    pub landing_penalty_factor: f32,
    pub player_radius: f32,
    pub player_height: f32,
    pub eye_height: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            max_speed: 8.0,
            crouch_speed_factor: 0.5,
            accelerate_ground: 7.0,
            accelerate_air: 2.0,
            decelerate_ground: 25.0,
            decelerate_air: 0.5,
            gravity: 24.0,
            jump_power: 8.0,
            max_fall_speed: 50.0,
            coyote_time_ms: 100.0,
            hard_landing_speed: 12.0,
            landing_penalty_ms: 400.0,
            landing_penalty_factor: 0.4,
            player_radius: 0.4,
            player_height: 1.8,
            eye_height: 1.6,
        }
    }
}

/// Side effects of a step the caller may want to announce.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepEffects {
    pub jumped: bool,
    /// Downward speed at impact when the landing exceeded the penalty
    /// threshold.
    pub hard_landing: Option<f32>,
}

/// Advance one player by `dt` seconds. Pure and total: the same inputs always
/// produce the same state, which is what lets the client replay unacknowledged
/// inputs during reconciliation.
pub fn step(
    state: &PlayerPhysicsState,
    input: &MoveInput,
    yaw: f32,
    dt: f32,
    now_ms: f64,
    config: &PhysicsConfig,
    map: &ArenaMap,
) -> (PlayerPhysicsState, StepEffects) {
    let mut next = *state;
    let mut effects = StepEffects::default();

    let wish = wish_direction(input, yaw);
    let penalized = now_ms < next.landing_penalty_end_ms;

    let mut target_speed = config.max_speed;
    if input.crouch {
        target_speed *= config.crouch_speed_factor;
    }
    if penalized {
        target_speed *= config.landing_penalty_factor;
    }

    let horizontal = Vec3::new(next.velocity.x, 0.0, next.velocity.z);
    let new_horizontal = if wish.length_squared() > 0.001 {
        let accelerate = if next.grounded {
            config.accelerate_ground
        } else {
            config.accelerate_air
        };
        let blend = (accelerate * dt).min(1.0);
        horizontal.lerp(wish * target_speed, blend)
    } else {
        let decelerate = if next.grounded {
            config.decelerate_ground
        } else {
            config.decelerate_air
        };
        let speed = horizontal.length();
        if speed < 1e-4 {
            Vec3::ZERO
        } else {
            let drop = (decelerate * dt).min(speed);
            horizontal - horizontal / speed * drop
        }
    };
    next.velocity.x = new_horizontal.x;
    next.velocity.z = new_horizontal.z;

    if !next.grounded {
        next.velocity.y = (next.velocity.y - config.gravity * dt).max(-config.max_fall_speed);
    }

    let in_coyote = now_ms - next.last_grounded_ms <= config.coyote_time_ms;
    if input.jump && next.velocity.y <= 0.0 && (next.grounded || in_coyote) {
        next.velocity.y = config.jump_power;
        next.grounded = false;
        effects.jumped = true;
    }

    next.position += next.velocity * dt;

    next.position = map.clamp_to_bounds(next.position, config.player_radius);
    next.position = map.push_out(next.position, config.player_radius, config.player_height);

    let floor = map.floor_height(next.position.x, next.position.z, state.position.y);
    if next.position.y <= floor && next.velocity.y <= 0.0 {
        let impact_speed = -next.velocity.y;
        if !state.grounded && impact_speed >= config.hard_landing_speed {
            effects.hard_landing = Some(impact_speed);
            next.landing_penalty_end_ms = now_ms + config.landing_penalty_ms;
        }
        next.position.y = floor;
        next.velocity.y = 0.0;
        next.grounded = true;
    } else if next.position.y > floor + 1e-3 {
        next.grounded = false;
    }

    if next.grounded {
        next.last_grounded_ms = now_ms;
    }

    (next, effects)
}

/// World-space wish direction from the local movement axes and the view yaw.
/// Forward at yaw 0 is -Z, matching the fire direction convention.
fn wish_direction(input: &MoveInput, yaw: f32) -> Vec3 {
    if !input.is_active() {
        return Vec3::ZERO;
    }

    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let forward = Vec3::new(-sin_yaw, 0.0, -cos_yaw);
    let right = Vec3::new(cos_yaw, 0.0, -sin_yaw);

    let wish = right * input.movement_x + forward * input.movement_y;
    if wish.length_squared() > 1.0 {
        wish.normalize()
    } else {
        wish
    }
}

/// View direction from yaw and pitch; used by the fire path and spawn facing.
pub fn view_direction(yaw: f32, pitch: f32) -> Vec3 {
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let (sin_pitch, cos_pitch) = pitch.sin_cos();
    Vec3::new(-sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch).normalize()
}

/// Yaw whose view direction matches the given y-flattened direction.
pub fn yaw_from_direction(direction: Vec3) -> f32 {
    if direction.x == 0.0 && direction.z == 0.0 {
        return 0.0;
    }
    (-direction.x).atan2(-direction.z)
}

/// Wrap into (-pi, pi].
pub fn normalize_angle(angle: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let mut normalized = angle % two_pi;
    if normalized > std::f32::consts::PI {
        normalized -= two_pi;
    } else if normalized <= -std::f32::consts::PI {
        normalized += two_pi;
    }
    normalized
}
