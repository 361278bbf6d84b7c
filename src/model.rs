use std::sync::Arc;
use std::time::Duration;

use crate::consistency::ConsistencyLevel;

/// A single timestamped sample, opaque to the coordinator beyond the fields
/// it needs to route and replicate the point.
///
/// Cloning a `Point` never copies the payload: the payload is reference
/// counted so that fanning the same batch out to N replicas is O(N) in
/// pointer copies, not in bytes.
#[derive(Debug, Clone)]
pub struct Point {
    time: i64,
    series_hash: u64,
    payload: Arc<[u8]>,
}

impl Point {
    pub fn new(time: i64, series_hash: u64, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            time,
            series_hash,
            payload: payload.into(),
        }
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn series_hash(&self) -> u64 {
        self.series_hash
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A batch of points destined for one database, under one consistency level.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub database: String,
    pub retention_policy: String,
    pub consistency: ConsistencyLevel,
    pub points: Vec<Point>,
}

impl WriteRequest {
    pub fn new(database: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            database: database.into(),
            retention_policy: String::new(),
            consistency: ConsistencyLevel::default(),
            points,
        }
    }

    pub fn with_retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = rp.into();
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }
}

/// Retention policy metadata, read-only to the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicyInfo {
    pub shard_group_duration: Duration,
    pub replication_factor: u32,
}

/// One shard: a unit of storage with an ordered, non-empty list of owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub id: u64,
    pub owners: Vec<u64>,
}

/// A time-bounded bucket of shards. `shard_for` is the pure hash-to-shard
/// mapping the coordinator relies on for deterministic, stable routing.
#[derive(Debug, Clone)]
pub struct ShardGroupInfo {
    pub id: u64,
    pub start_time: i64,
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    /// Select the shard within this group that owns the series identified
    /// by `series_hash`. Pure function of `series_hash` and `self.shards`.
    pub fn shard_for(&self, series_hash: u64) -> &ShardInfo {
        let idx = (series_hash % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub name: String,
    pub default_retention_policy: String,
}

/// Truncate a timestamp to the start of the shard-group-duration window
/// that covers it, flooring toward negative infinity.
pub fn truncate_to_shard_group(time: i64, duration: Duration) -> i64 {
    let width = duration.as_nanos() as i64;
    time.div_euclid(width) * width
}
