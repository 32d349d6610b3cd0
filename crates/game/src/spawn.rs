use glam::Vec3;
use serde::Deserialize;

use crate::PlayerId;
use crate::error::{GameError, PhysicsError};
use crate::event::{EventBus, GameEvent};

/// One manifest row; `look_direction` is derived toward the arena center.
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnManifestEntry {
    pub id: u32,
    pub position: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub id: u32,
    pub position: Vec3,
    /// Toward the arena center, y-flattened.
    pub look_direction: Vec3,
}

impl SpawnPoint {
    pub fn new(id: u32, position: Vec3, arena_center: Vec3) -> Self {
        let mut toward = arena_center - position;
        toward.y = 0.0;
        let look_direction = if toward.length_squared() > 1e-6 {
            toward.normalize()
        } else {
            Vec3::new(0.0, 0.0, -1.0)
        };
        Self {
            id,
            position,
            look_direction,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Score per millisecond since last use.
    pub reuse_bonus: f32,
    pub blocked_penalty: f32,
    pub blocked_distance: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            reuse_bonus: 0.001,
            blocked_penalty: 100.0,
            blocked_distance: 3.0,
        }
    }
}

/// Picks respawn locations: far from opponents, not recently used, never on
/// top of someone. Ties resolve to manifest order.
pub struct SpawnSystem {
    config: SpawnConfig,
    points: Vec<SpawnPoint>,
    last_used_ms: Vec<f64>,
}

impl SpawnSystem {
    pub fn new(points: Vec<SpawnPoint>, config: SpawnConfig) -> Self {
        let last_used_ms = vec![0.0; points.len()];
        Self {
            config,
            points,
            last_used_ms,
        }
    }

    pub fn from_manifest(json: &str, arena_center: Vec3, config: SpawnConfig) -> Result<Self, PhysicsError> {
        let entries: Vec<SpawnManifestEntry> =
            serde_json::from_str(json).map_err(|e| PhysicsError::ManifestLoadFailed(e.to_string()))?;
        if entries.is_empty() {
            return Err(PhysicsError::ManifestLoadFailed(
                "manifest contains no spawn points".into(),
            ));
        }
        let points = entries
            .into_iter()
            .map(|e| SpawnPoint::new(e.id, Vec3::from(e.position), arena_center))
            .collect();
        Ok(Self::new(points, config))
    }

    /// The stock duel arena corners, facing inward.
    pub fn duel_arena_points() -> Vec<SpawnPoint> {
        let center = Vec3::ZERO;
        [
            Vec3::new(-15.0, 0.0, -15.0),
            Vec3::new(15.0, 0.0, -15.0),
            Vec3::new(-15.0, 0.0, 15.0),
            Vec3::new(15.0, 0.0, 15.0),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, pos)| SpawnPoint::new(i as u32, pos, center))
        .collect()
    }

    pub fn points(&self) -> &[SpawnPoint] {
        &self.points
    }

    /// Highest-scoring spawn for `player`, marking it used.
    pub fn select(
        &mut self,
        player: PlayerId,
        other_positions: &[Vec3],
        now_ms: f64,
        bus: &mut EventBus,
    ) -> Result<SpawnPoint, GameError> {
        if self.points.is_empty() {
            return Err(GameError::SpawnFailed);
        }

        let mut best_index = 0;
        let mut best_score = f32::MIN;

        for (index, point) in self.points.iter().enumerate() {
            let distance_score: f32 = other_positions
                .iter()
                .map(|other| point.position.distance(*other))
                .sum();

            let age_ms = (now_ms - self.last_used_ms[index]).max(0.0);
            let reuse_score = age_ms as f32 * self.config.reuse_bonus;

            let blocked = other_positions
                .iter()
                .any(|other| point.position.distance(*other) < self.config.blocked_distance);
            let penalty = if blocked { self.config.blocked_penalty } else { 0.0 };

            let score = distance_score + reuse_score - penalty;
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }

        self.last_used_ms[best_index] = now_ms;
        let point = self.points[best_index].clone();
        bus.publish(
            now_ms,
            GameEvent::PlayerSpawned {
                player,
                position: point.position,
            },
        );
        Ok(point)
    }
}
