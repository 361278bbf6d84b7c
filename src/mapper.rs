use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::model::{truncate_to_shard_group, DatabaseInfo, RetentionPolicyInfo, ShardGroupInfo, WriteRequest};
use crate::shard_mapping::ShardMapping;

/// Collaborator interface onto the metadata store: databases, retention
/// policies, and shard-group/shard ownership. Out of scope for this crate;
/// consumed as a trait object so the mapper and façade never depend on a
/// concrete implementation.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// This coordinator's node identity, stable for the process lifetime.
    fn node_id(&self) -> u64;

    /// Returns `Ok(None)` when the database is absent.
    async fn database(&self, name: &str) -> anyhow::Result<Option<DatabaseInfo>>;

    /// Returns `Ok(None)` when the policy is absent.
    async fn retention_policy(&self, db: &str, policy: &str) -> anyhow::Result<Option<RetentionPolicyInfo>>;

    /// Idempotent: concurrent callers for the same truncated timestamp must
    /// observe the same group.
    async fn create_shard_group_if_not_exists(
        &self,
        db: &str,
        policy: &str,
        timestamp: i64,
    ) -> anyhow::Result<ShardGroupInfo>;

    /// Reverse lookup from shard id to its owning database/policy/group, used
    /// for diagnostics only.
    async fn shard_owner(&self, shard_id: u64) -> anyhow::Result<(String, String, ShardGroupInfo)>;
}

/// Resolves retention policy, creates any missing shard groups covering the
/// batch's timestamps, and assigns each point to exactly one shard.
#[derive(Clone)]
pub struct ShardMapper {
    meta: Arc<dyn MetaStore>,
}

impl ShardMapper {
    pub fn new(meta: Arc<dyn MetaStore>) -> Self {
        Self { meta }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip_all,
            fields(db = %request.database, retention_policy = %retention_policy, num_points = request.points.len())
        )
    )]
    pub async fn map_shards(&self, request: &WriteRequest, retention_policy: &str) -> CoordinatorResult<ShardMapping> {
        let rp = self
            .meta
            .retention_policy(&request.database, retention_policy)
            .await
            .map_err(CoordinatorError::Other)?
            .ok_or_else(|| CoordinatorError::RetentionPolicyNotFound {
                db: request.database.clone(),
                policy: retention_policy.to_string(),
            })?;

        let mut groups: HashMap<i64, ShardGroupInfo> = HashMap::new();
        for point in &request.points {
            let truncated = truncate_to_shard_group(point.time(), rp.shard_group_duration);
            if groups.contains_key(&truncated) {
                continue;
            }
            let group = self
                .meta
                .create_shard_group_if_not_exists(&request.database, retention_policy, truncated)
                .await
                .map_err(CoordinatorError::Other)?;
            #[cfg(feature = "tracing")]
            tracing::debug!(shard_group = group.id, truncated_time = truncated, "resolved shard group");
            groups.insert(truncated, group);
        }

        let mut mapping = ShardMapping::new();
        for point in &request.points {
            let truncated = truncate_to_shard_group(point.time(), rp.shard_group_duration);
            let group = groups
                .get(&truncated)
                .expect("shard group was created for every distinct truncated timestamp");
            let shard = group.shard_for(point.series_hash()).clone();
            mapping.add_point(shard, point.clone());
        }

        Ok(mapping)
    }
}
