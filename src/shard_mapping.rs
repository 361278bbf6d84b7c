use std::collections::HashMap;

use crate::model::{Point, ShardInfo};

/// Ephemeral, per-request value object grouping points by the shard they
/// were routed to. Built single-threaded by the mapper before fan-out and
/// read-only thereafter.
#[derive(Debug, Default)]
pub struct ShardMapping {
    points: HashMap<u64, Vec<Point>>,
    shards: HashMap<u64, ShardInfo>,
}

impl ShardMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `point` to `shard`'s list, preserving input order. The first add
    /// for a shard id creates its list; the shard descriptor is recorded on
    /// first sight and subsequent identical descriptors are harmless no-ops.
    pub fn add_point(&mut self, shard: ShardInfo, point: Point) {
        self.points.entry(shard.id).or_default().push(point);
        self.shards.entry(shard.id).or_insert(shard);
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn shard_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.points.keys().copied()
    }

    pub fn points_for(&self, shard_id: u64) -> &[Point] {
        self.points
            .get(&shard_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn shard(&self, shard_id: u64) -> Option<&ShardInfo> {
        self.shards.get(&shard_id)
    }
}
