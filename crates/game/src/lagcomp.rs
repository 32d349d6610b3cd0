use std::collections::{HashMap, VecDeque};

use glam::Vec3;

use crate::PlayerId;

/// Player hit volume at a moment in time. `base` is the feet point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub base: Vec3,
    pub radius: f32,
    pub height: f32,
}

impl Capsule {
    pub fn center(&self) -> Vec3 {
        self.base + Vec3::new(0.0, self.height / 2.0, 0.0)
    }

    fn lerp(&self, other: &Capsule, t: f32) -> Capsule {
        Capsule {
            base: self.base.lerp(other.base, t),
            radius: self.radius,
            height: self.height,
        }
    }
}

/// Historical world record used to rewind hit detection.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub tick_number: u32,
    pub timestamp_ms: f64,
    pub player_positions: HashMap<PlayerId, Vec3>,
    pub player_capsules: HashMap<PlayerId, Capsule>,
}

impl WorldSnapshot {
    pub fn new(tick_number: u32, timestamp_ms: f64) -> Self {
        Self {
            tick_number,
            timestamp_ms,
            player_positions: HashMap::new(),
            player_capsules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LagCompConfig {
    pub history_duration_ms: f64,
    pub max_rewind_ms: f64,
}

impl Default for LagCompConfig {
    fn default() -> Self {
        Self {
            history_duration_ms: 1000.0,
            max_rewind_ms: 250.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RewindError {
    #[error("no snapshots recorded")]
    NoHistory,
}

/// Bounded history of world snapshots, ordered by tick, letting the server
/// evaluate a shot at the time the shooter perceived the world.
pub struct LagCompensation {
    config: LagCompConfig,
    snapshots: VecDeque<WorldSnapshot>,
}

impl LagCompensation {
    pub fn new(config: LagCompConfig) -> Self {
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

    /// Append, keeping the store sorted by tick. Out-of-order records are
    /// inserted at their position; duplicates replace the previous entry.
    pub fn record_snapshot(&mut self, snapshot: WorldSnapshot) {
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
    }

    pub fn prune_old_snapshots(&mut self, now_ms: f64) {
        let cutoff = now_ms - self.config.history_duration_ms;
        while self
            .snapshots
            .front()
            .is_some_and(|s| s.timestamp_ms < cutoff)
        {
            self.snapshots.pop_front();
        }
    }

    /// Snapshot whose timestamp is closest to `t`, with `t` first clamped to
    /// the rewind horizon. Any claimed client timestamp is therefore bounded.
    pub fn snapshot_at_time(&self, t_ms: f64, now_ms: f64) -> Result<&WorldSnapshot, RewindError> {
        if self.snapshots.is_empty() {
            return Err(RewindError::NoHistory);
        }

        let t = self.clamp_rewind(t_ms, now_ms);
        let after = self
            .snapshots
            .partition_point(|s| s.timestamp_ms <= t);

        let candidate = if after == 0 {
            &self.snapshots[0]
        } else if after >= self.snapshots.len() {
            &self.snapshots[self.snapshots.len() - 1]
        } else {
            let before = &self.snapshots[after - 1];
            let next = &self.snapshots[after];
            if (t - before.timestamp_ms) <= (next.timestamp_ms - t) {
                before
            } else {
                next
            }
        };

        Ok(candidate)
    }

    /// Interpolated capsules at `t`, using the two temporally adjacent
    /// snapshots. A player present only in the earlier snapshot is used
    /// unchanged.
    pub fn capsules_at_time(
        &self,
        t_ms: f64,
        now_ms: f64,
    ) -> Result<HashMap<PlayerId, Capsule>, RewindError> {
        if self.snapshots.is_empty() {
            return Err(RewindError::NoHistory);
        }

        let t = self.clamp_rewind(t_ms, now_ms);
        let after = self
            .snapshots
            .partition_point(|s| s.timestamp_ms <= t);

        if after == 0 {
            return Ok(self.snapshots[0].player_capsules.clone());
        }
        let before = &self.snapshots[after - 1];
        let Some(next) = self.snapshots.get(after) else {
            return Ok(before.player_capsules.clone());
        };

        let span = next.timestamp_ms - before.timestamp_ms;
        let alpha = if span > 0.0 {
            (((t - before.timestamp_ms) / span) as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut capsules = HashMap::with_capacity(before.player_capsules.len());
        for (&id, capsule) in &before.player_capsules {
            let interpolated = match next.player_capsules.get(&id) {
                Some(later) => capsule.lerp(later, alpha),
                None => *capsule,
            };
            capsules.insert(id, interpolated);
        }

        Ok(capsules)
    }

    pub fn snapshot_at_tick(&self, tick: u32) -> Option<&WorldSnapshot> {
        let index = self
            .snapshots
            .partition_point(|s| s.tick_number < tick);
        self.snapshots
            .get(index)
            .filter(|s| s.tick_number == tick)
    }

    fn clamp_rewind(&self, t_ms: f64, now_ms: f64) -> f64 {
        t_ms.max(now_ms - self.config.max_rewind_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule_at(x: f32) -> Capsule {
        Capsule {
            base: Vec3::new(x, 0.0, 0.0),
            radius: 0.4,
            height: 1.8,
        }
    }

    fn snapshot(tick: u32, t: f64, x: f32) -> WorldSnapshot {
        let mut ws = WorldSnapshot::new(tick, t);
        ws.player_positions.insert(2, Vec3::new(x, 0.0, 0.0));
        ws.player_capsules.insert(2, capsule_at(x));
        ws
    }

    fn history_16ms() -> LagCompensation {
        let mut lag = LagCompensation::new(LagCompConfig::default());
        for tick in 0..=60 {
            let t = tick as f64 * 16.0;
            lag.record_snapshot(snapshot(tick, t, tick as f32));
        }
        lag
    }

    #[test]
    fn rewind_is_clamped_to_horizon() {
        let lag = history_16ms();
        let now = 960.0;

        // A wildly stale claimed timestamp clamps to now - 250.
        let found = lag.snapshot_at_time(-40.0, now).unwrap();
        assert!((found.timestamp_ms - 710.0).abs() <= 16.0);
        assert!(now - found.timestamp_ms <= 270.0);
    }

    #[test]
    fn closest_snapshot_wins() {
        let lag = history_16ms();
        let found = lag.snapshot_at_time(800.0, 960.0).unwrap();
        assert_eq!(found.tick_number, 50);

        let found = lag.snapshot_at_time(807.9, 960.0).unwrap();
        assert_eq!(found.tick_number, 50);
        let found = lag.snapshot_at_time(808.1, 960.0).unwrap();
        assert_eq!(found.tick_number, 51);
    }

    #[test]
    fn capsules_interpolate_between_brackets() {
        let mut lag = LagCompensation::new(LagCompConfig::default());
        lag.record_snapshot(snapshot(1, 100.0, 0.0));
        lag.record_snapshot(snapshot(2, 200.0, 10.0));

        let capsules = lag.capsules_at_time(150.0, 220.0).unwrap();
        assert!((capsules[&2].base.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn before_only_player_is_used_unchanged() {
        let mut lag = LagCompensation::new(LagCompConfig::default());
        let mut first = snapshot(1, 100.0, 3.0);
        first.player_capsules.insert(7, capsule_at(9.0));
        lag.record_snapshot(first);
        lag.record_snapshot(snapshot(2, 200.0, 6.0));

        let capsules = lag.capsules_at_time(150.0, 220.0).unwrap();
        assert_eq!(capsules[&7].base.x, 9.0);
    }

    #[test]
    fn prune_drops_expired_history() {
        let mut lag = history_16ms();
        assert_eq!(lag.len(), 61);
        lag.prune_old_snapshots(1500.0);
        assert!(lag.len() < 61);
        assert!(
            lag.snapshot_at_time(0.0, 1500.0)
                .unwrap()
                .timestamp_ms
                >= 500.0
        );
    }

    #[test]
    fn exact_tick_lookup() {
        let lag = history_16ms();
        assert_eq!(lag.snapshot_at_tick(30).unwrap().tick_number, 30);
        assert!(lag.snapshot_at_tick(1000).is_none());
    }

    #[test]
    fn empty_history_is_an_error() {
        let lag = LagCompensation::new(LagCompConfig::default());
        assert_eq!(
            lag.snapshot_at_time(0.0, 0.0).unwrap_err(),
            RewindError::NoHistory
        );
    }
}
