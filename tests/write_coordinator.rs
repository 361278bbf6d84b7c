use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use write_coordinator::{
    ConsistencyLevel, CoordinatorConfig, CoordinatorError, CoordinatorResult, DatabaseInfo, HintedHandoff, LocalStore,
    MetaStore, Point, PointsWriter, RemoteError, RemoteShardWriter, RetentionPolicyInfo, ShardGroupInfo, ShardInfo,
    WriteMetrics, WriteRequest,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct FixedMeta {
    node_id: u64,
    databases: HashMap<String, DatabaseInfo>,
    retention_policies: HashMap<(String, String), RetentionPolicyInfo>,
    group: ShardGroupInfo,
}

#[async_trait]
impl MetaStore for FixedMeta {
    fn node_id(&self) -> u64 {
        self.node_id
    }

    async fn database(&self, name: &str) -> anyhow::Result<Option<DatabaseInfo>> {
        Ok(self.databases.get(name).cloned())
    }

    async fn retention_policy(&self, db: &str, policy: &str) -> anyhow::Result<Option<RetentionPolicyInfo>> {
        Ok(self
            .retention_policies
            .get(&(db.to_string(), policy.to_string()))
            .copied())
    }

    async fn create_shard_group_if_not_exists(
        &self,
        _db: &str,
        _policy: &str,
        _timestamp: i64,
    ) -> anyhow::Result<ShardGroupInfo> {
        Ok(self.group.clone())
    }

    async fn shard_owner(&self, _shard_id: u64) -> anyhow::Result<(String, String, ShardGroupInfo)> {
        unimplemented!("not exercised by these scenarios")
    }
}

#[derive(Default)]
struct OkLocal {
    writes: AtomicUsize,
}

#[async_trait]
impl LocalStore for OkLocal {
    async fn create_shard(&self, _db: &str, _policy: &str, _shard_id: u64) -> CoordinatorResult<()> {
        Ok(())
    }

    async fn write_to_shard(&self, _shard_id: u64, _points: Arc<[Point]>) -> CoordinatorResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedRemote {
    outcomes: Mutex<HashMap<u64, Result<(), RemoteError>>>,
}

#[async_trait]
impl RemoteShardWriter for ScriptedRemote {
    async fn write_shard(&self, _shard_id: u64, owner: u64, _points: Arc<[Point]>) -> Result<(), RemoteError> {
        self.outcomes.lock().unwrap().remove(&owner).unwrap_or(Ok(()))
    }
}

#[derive(Default)]
struct AlwaysSucceedsHandoff {
    enqueued: Mutex<Vec<u64>>,
}

#[async_trait]
impl HintedHandoff for AlwaysSucceedsHandoff {
    async fn write_shard(&self, _shard_id: u64, owner: u64, _points: Arc<[Point]>) -> anyhow::Result<()> {
        self.enqueued.lock().unwrap().push(owner);
        Ok(())
    }
}

fn three_owner_group(local_node: u64) -> ShardGroupInfo {
    ShardGroupInfo {
        id: 1,
        start_time: 0,
        shards: vec![ShardInfo {
            id: 100,
            owners: vec![local_node, 2, 3],
        }],
    }
}

fn meta(local_node: u64) -> FixedMeta {
    let mut retention_policies = HashMap::new();
    retention_policies.insert(
        ("mydb".to_string(), "autogen".to_string()),
        RetentionPolicyInfo {
            shard_group_duration: Duration::from_secs(3600),
            replication_factor: 3,
        },
    );
    let mut databases = HashMap::new();
    databases.insert(
        "mydb".to_string(),
        DatabaseInfo {
            name: "mydb".to_string(),
            default_retention_policy: "autogen".to_string(),
        },
    );

    FixedMeta {
        node_id: local_node,
        databases,
        retention_policies,
        group: three_owner_group(local_node),
    }
}

fn request(consistency: ConsistencyLevel) -> WriteRequest {
    WriteRequest::new(
        "mydb",
        vec![
            Point::new(0, 1, Arc::from(&b"a"[..])),
            Point::new(1, 2, Arc::from(&b"b"[..])),
        ],
    )
    .with_consistency(consistency)
}

/// A retryable remote failure handed off successfully counts as a replica
/// success under ANY, but must not generalise to ALL — there the original
/// error still surfaces.
#[tokio::test]
async fn handoff_under_any_but_not_under_all() {
    init_logging();
    let local_node = 1;

    let mut any_outcomes = HashMap::new();
    any_outcomes.insert(2, Err(RemoteError::retryable("peer 2 unreachable")));
    let any_remote = Arc::new(ScriptedRemote {
        outcomes: Mutex::new(any_outcomes),
    });
    let any_handoff = Arc::new(AlwaysSucceedsHandoff::default());
    let any_writer = PointsWriter::new(
        CoordinatorConfig::new(local_node),
        Arc::new(meta(local_node)),
        Arc::new(OkLocal::default()),
        any_remote,
        any_handoff.clone(),
        Arc::new(WriteMetrics::new()),
    );

    let result = any_writer.write_points(&request(ConsistencyLevel::Any)).await;
    assert!(result.is_ok(), "ANY should tolerate a handed-off retryable failure: {result:?}");
    assert_eq!(any_handoff.enqueued.lock().unwrap().as_slice(), &[2]);
    assert_eq!(any_writer.metrics().snapshot().point_req_hh, 2);

    let mut all_outcomes = HashMap::new();
    all_outcomes.insert(2, Err(RemoteError::retryable("peer 2 unreachable")));
    let all_remote = Arc::new(ScriptedRemote {
        outcomes: Mutex::new(all_outcomes),
    });
    let all_handoff = Arc::new(AlwaysSucceedsHandoff::default());
    let all_writer = PointsWriter::new(
        CoordinatorConfig::new(local_node),
        Arc::new(meta(local_node)),
        Arc::new(OkLocal::default()),
        all_remote,
        all_handoff.clone(),
        Arc::new(WriteMetrics::new()),
    );

    let result = all_writer.write_points(&request(ConsistencyLevel::All)).await;
    assert!(
        matches!(result, Err(CoordinatorError::PartialWrite { .. })),
        "ALL must still surface the original error even though handoff succeeded: {result:?}"
    );
    assert_eq!(all_handoff.enqueued.lock().unwrap().as_slice(), &[2]);
    assert_eq!(all_writer.metrics().snapshot().point_req_hh, 2);
}

/// Quorum reached by two of three owners; the third owner's later
/// non-retryable failure must not flip the already-decided outcome.
#[tokio::test]
async fn quorum_write_succeeds_despite_a_straggler_failure() {
    init_logging();
    let local_node = 1;

    let mut outcomes = HashMap::new();
    outcomes.insert(2, Ok(()));
    outcomes.insert(3, Err(RemoteError::permanent("disk full")));
    let remote = Arc::new(ScriptedRemote {
        outcomes: Mutex::new(outcomes),
    });

    let writer = PointsWriter::new(
        CoordinatorConfig::new(local_node),
        Arc::new(meta(local_node)),
        Arc::new(OkLocal::default()),
        remote,
        Arc::new(AlwaysSucceedsHandoff::default()),
        Arc::new(WriteMetrics::new()),
    );

    let result = writer.write_points(&request(ConsistencyLevel::Quorum)).await;
    assert!(result.is_ok());

    let snapshot = writer.metrics().snapshot();
    assert_eq!(snapshot.write_ok, 1);
    assert_eq!(snapshot.write_partial, 0);
    assert_eq!(snapshot.write_error, 0);
}

#[tokio::test]
async fn close_mid_write_abandons_outstanding_requests() {
    init_logging();
    let local_node = 1;

    let remote = Arc::new(ScriptedRemote {
        outcomes: Mutex::new(HashMap::new()),
    });
    let writer = Arc::new(PointsWriter::new(
        CoordinatorConfig::new(local_node).with_write_timeout(Duration::from_secs(30)),
        Arc::new(meta(local_node)),
        Arc::new(OkLocal::default()),
        remote,
        Arc::new(AlwaysSucceedsHandoff::default()),
        Arc::new(WriteMetrics::new()),
    ));

    writer.close();
    let result = writer.write_points(&request(ConsistencyLevel::One)).await;
    assert!(matches!(result, Err(CoordinatorError::WriteFailed { .. })));
}
