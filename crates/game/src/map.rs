use glam::Vec3;

/// Axis-aligned block, the only obstacle primitive in the arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn contains_xz(&self, x: f32, z: f32) -> bool {
        x >= self.min.x && x <= self.max.x && z >= self.min.z && z <= self.max.z
    }

    /// Slab-method ray test. Returns the entry distance along `direction`
    /// (assumed normalized) when the ray hits within `max_distance`.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = max_distance;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if d.abs() < 1e-8 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }
}

/// Static arena geometry: a flat floor, outer walls expressed as bounds, and
/// a handful of cover blocks. Positions are player feet; collision resolution
/// keeps feet at or above the standable surface.
#[derive(Debug, Clone)]
pub struct ArenaMap {
    pub bounds: Aabb,
    pub ground_y: f32,
    pub blocks: Vec<Aabb>,
}

impl ArenaMap {
    /// How far above a block top the feet may be while still standing on it.
    const GROUND_EPSILON: f32 = 0.02;

    pub fn new(bounds: Aabb, ground_y: f32, blocks: Vec<Aabb>) -> Self {
        Self {
            bounds,
            ground_y,
            blocks,
        }
    }

    /// The stock duel arena: 40x40 floor with four cover blocks and a center
    /// riser.
    pub fn duel_arena() -> Self {
        let bounds = Aabb::new(Vec3::new(-20.0, 0.0, -20.0), Vec3::new(20.0, 12.0, 20.0));
        let blocks = vec![
            Aabb::from_center(Vec3::new(8.0, 1.0, 8.0), Vec3::new(1.5, 1.0, 1.5)),
            Aabb::from_center(Vec3::new(-8.0, 1.0, 8.0), Vec3::new(1.5, 1.0, 1.5)),
            Aabb::from_center(Vec3::new(8.0, 1.0, -8.0), Vec3::new(1.5, 1.0, 1.5)),
            Aabb::from_center(Vec3::new(-8.0, 1.0, -8.0), Vec3::new(1.5, 1.0, 1.5)),
            Aabb::from_center(Vec3::new(0.0, 0.5, 0.0), Vec3::new(2.5, 0.5, 2.5)),
        ];
        Self::new(bounds, 0.0, blocks)
    }

    /// Empty flat floor, handy for tests with hand-placed geometry.
    pub fn flat(half_size: f32) -> Self {
        let bounds = Aabb::new(
            Vec3::new(-half_size, 0.0, -half_size),
            Vec3::new(half_size, 12.0, half_size),
        );
        Self::new(bounds, 0.0, Vec::new())
    }

    /// Highest standable surface under the feet at (x, z). Block tops count
    /// only when the feet are not already below them.
    pub fn floor_height(&self, x: f32, z: f32, feet_y: f32) -> f32 {
        let mut floor = self.ground_y;
        for block in &self.blocks {
            if block.contains_xz(x, z)
                && block.max.y > floor
                && feet_y >= block.max.y - Self::GROUND_EPSILON
            {
                floor = block.max.y;
            }
        }
        floor
    }

    /// Keep a player capsule center inside the playable bounds.
    pub fn clamp_to_bounds(&self, position: Vec3, radius: f32) -> Vec3 {
        Vec3::new(
            position
                .x
                .clamp(self.bounds.min.x + radius, self.bounds.max.x - radius),
            position.y.min(self.bounds.max.y),
            position
                .z
                .clamp(self.bounds.min.z + radius, self.bounds.max.z - radius),
        )
    }

    /// Push a capsule horizontally out of any block it overlaps. Resolution
    /// is along the smallest-penetration axis, one block at a time.
    pub fn push_out(&self, position: Vec3, radius: f32, height: f32) -> Vec3 {
        let mut pos = position;
        for block in &self.blocks {
            let feet = pos.y;
            let head = pos.y + height;
            if head <= block.min.y || feet >= block.max.y - Self::GROUND_EPSILON {
                continue;
            }
            let expanded = Aabb::new(
                block.min - Vec3::new(radius, 0.0, radius),
                block.max + Vec3::new(radius, 0.0, radius),
            );
            if !expanded.contains_xz(pos.x, pos.z) {
                continue;
            }

            let push_left = pos.x - expanded.min.x;
            let push_right = expanded.max.x - pos.x;
            let push_back = pos.z - expanded.min.z;
            let push_front = expanded.max.z - pos.z;

            let min_push = push_left.min(push_right).min(push_back).min(push_front);
            if min_push == push_left {
                pos.x = expanded.min.x;
            } else if min_push == push_right {
                pos.x = expanded.max.x;
            } else if min_push == push_back {
                pos.z = expanded.min.z;
            } else {
                pos.z = expanded.max.z;
            }
        }
        pos
    }

    /// Distance to the nearest world surface along `direction`, used to cut
    /// weapon rays short. `direction` must be normalized.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        let mut nearest: Option<f32> = None;

        if direction.y < -1e-6 {
            let t = (self.ground_y - origin.y) / direction.y;
            if t >= 0.0 && t <= max_distance {
                nearest = Some(t);
            }
        }

        for block in &self.blocks {
            if let Some(t) = block.raycast(origin, direction, max_distance) {
                if nearest.is_none_or(|n| t < n) {
                    nearest = Some(t);
                }
            }
        }

        nearest
    }
}
