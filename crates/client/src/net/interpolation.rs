use std::collections::{BTreeSet, VecDeque};

use arena::PlayerId;
use arena::physics::normalize_angle;
use arena::protocol::{StateFlags, StateSnapshot};
use glam::Vec3;

#[derive(Debug, Clone)]
pub struct InterpolationConfig {
    pub buffer_size: usize,
    /// Render offset behind server time; hides jitter by keeping the render
    /// point between two known snapshots.
    pub interpolation_delay_ms: f64,
    /// Beyond this, a silent entity freezes instead of extrapolating.
    pub max_extrapolation_ms: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            buffer_size: 32,
            interpolation_delay_ms: 100.0,
            max_extrapolation_ms: 200.0,
        }
    }
}

/// A remote entity as it should be rendered right now.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntityView {
    pub entity_id: PlayerId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub health: u8,
    pub flags: StateFlags,
    pub is_extrapolating: bool,
    pub is_stale: bool,
}

/// Bounded, tick-ordered window of authoritative snapshots that renders
/// remote entities at `render_time - delay`, between two known states where
/// possible and velocity-extrapolated (briefly) where not.
pub struct InterpolationBuffer {
    config: InterpolationConfig,
    snapshots: VecDeque<StateSnapshot>,
}

impl InterpolationBuffer {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            snapshots: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest_tick(&self) -> Option<u32> {
        self.snapshots.back().map(|s| s.tick_number)
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Insert sorted by tick, replacing duplicates, pruning oldest-out.
    pub fn push_snapshot(&mut self, snapshot: StateSnapshot) {
        match self
            .snapshots
            .iter()
            .rposition(|s| s.tick_number <= snapshot.tick_number)
        {
            Some(index) if self.snapshots[index].tick_number == snapshot.tick_number => {
                self.snapshots[index] = snapshot;
            }
            Some(index) => self.snapshots.insert(index + 1, snapshot),
            None => self.snapshots.push_front(snapshot),
        }

        while self.snapshots.len() > self.config.buffer_size {
            self.snapshots.pop_front();
        }
    }

    /// Remote-entity views at `render_time_ms` (server timebase). The local
    /// player is excluded; it is predicted, not interpolated.
    pub fn sample(
        &self,
        render_time_ms: f64,
        local_id: Option<PlayerId>,
    ) -> Vec<RemoteEntityView> {
        if self.snapshots.is_empty() {
            return Vec::new();
        }

        let target = render_time_ms - self.config.interpolation_delay_ms;

        let mut ids = BTreeSet::new();
        for snapshot in &self.snapshots {
            for player in &snapshot.players {
                if Some(player.entity_id) != local_id {
                    ids.insert(player.entity_id);
                }
            }
        }

        ids.into_iter()
            .filter_map(|id| self.sample_entity(id, target))
            .collect()
    }

    fn sample_entity(&self, id: PlayerId, target_ms: f64) -> Option<RemoteEntityView> {
        // B: latest snapshot at or before the target containing the entity;
        // A: the next one after B.
        let before_index = self
            .snapshots
            .iter()
            .rposition(|s| s.server_timestamp_ms <= target_ms && s.player(id).is_some());

        let Some(before_index) = before_index else {
            // Nothing old enough: clamp to the earliest known state.
            let snapshot = self
                .snapshots
                .iter()
                .find(|s| s.player(id).is_some())?;
            let player = snapshot.player(id)?;
            return Some(RemoteEntityView {
                entity_id: id,
                position: player.position,
                velocity: player.velocity,
                pitch: player.pitch,
                yaw: player.yaw,
                health: player.health,
                flags: player.flags,
                is_extrapolating: false,
                is_stale: false,
            });
        };

        let before_snapshot = &self.snapshots[before_index];
        let before = before_snapshot.player(id)?;

        let after = self
            .snapshots
            .iter()
            .skip(before_index + 1)
            .find(|s| s.player(id).is_some());

        if let Some(after_snapshot) = after {
            let after = after_snapshot.player(id)?;
            let span = after_snapshot.server_timestamp_ms - before_snapshot.server_timestamp_ms;
            let t = if span > 0.0 {
                (((target_ms - before_snapshot.server_timestamp_ms) / span) as f32).clamp(0.0, 1.0)
            } else {
                0.0
            };

            return Some(RemoteEntityView {
                entity_id: id,
                position: before.position.lerp(after.position, t),
                velocity: before.velocity.lerp(after.velocity, t),
                pitch: lerp_angle(before.pitch, after.pitch, t),
                yaw: lerp_angle(before.yaw, after.yaw, t),
                health: if t < 0.5 { before.health } else { after.health },
                flags: if t < 0.5 { before.flags } else { after.flags },
                is_extrapolating: false,
                is_stale: false,
            });
        }

        // Only a past state: extrapolate along the last known velocity until
        // the staleness horizon, then freeze.
        let age_ms = target_ms - before_snapshot.server_timestamp_ms;
        if age_ms > self.config.max_extrapolation_ms {
            return Some(RemoteEntityView {
                entity_id: id,
                position: before.position,
                velocity: before.velocity,
                pitch: before.pitch,
                yaw: before.yaw,
                health: before.health,
                flags: before.flags,
                is_extrapolating: false,
                is_stale: true,
            });
        }

        Some(RemoteEntityView {
            entity_id: id,
            position: before.position + before.velocity * (age_ms as f32 / 1000.0),
            velocity: before.velocity,
            pitch: before.pitch,
            yaw: before.yaw,
            health: before.health,
            flags: before.flags,
            is_extrapolating: true,
            is_stale: false,
        })
    }
}

/// Shortest-arc angle interpolation, wrapping at +/-pi.
fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    normalize_angle(from + normalize_angle(to - from) * t)
}
