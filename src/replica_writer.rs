use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::consistency::ConsistencyLevel;
use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::metrics::WriteMetrics;
use crate::model::{Point, ShardInfo};

/// Collaborator interface onto the local storage engine for this node.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Idempotent.
    async fn create_shard(&self, db: &str, policy: &str, shard_id: u64) -> CoordinatorResult<()>;

    /// Returns [`CoordinatorError::ShardNotFound`] exactly when the shard has
    /// never been created locally.
    async fn write_to_shard(&self, shard_id: u64, points: Arc<[Point]>) -> CoordinatorResult<()>;
}

/// Error returned by a [`RemoteShardWriter`], pre-classified by the storage
/// layer as retryable or not. Retryable errors are transport-level, timeout,
/// or peer-unreachable conditions; the coordinator never inspects the
/// message to guess.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub message: String,
    pub retryable: bool,
}

impl RemoteError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Collaborator interface onto the remote shard writer that transports a
/// batch to a peer node.
#[async_trait]
pub trait RemoteShardWriter: Send + Sync {
    async fn write_shard(&self, shard_id: u64, owner_node_id: u64, points: Arc<[Point]>) -> Result<(), RemoteError>;
}

/// Collaborator interface onto the durable hinted-handoff queue.
#[async_trait]
pub trait HintedHandoff: Send + Sync {
    async fn write_shard(&self, shard_id: u64, owner_node_id: u64, points: Arc<[Point]>) -> anyhow::Result<()>;
}

/// For one shard, concurrently dispatches a point batch to every owning
/// replica and accounts acknowledgements against the consistency level's
/// required count. The hardest part of the coordinator: see the per-replica
/// dispatch rule and the accumulation loop below.
#[derive(Clone)]
pub struct ReplicaWriter {
    node_id: u64,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteShardWriter>,
    hinted_handoff: Arc<dyn HintedHandoff>,
    metrics: Arc<WriteMetrics>,
}

impl ReplicaWriter {
    pub fn new(
        node_id: u64,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteShardWriter>,
        hinted_handoff: Arc<dyn HintedHandoff>,
        metrics: Arc<WriteMetrics>,
    ) -> Self {
        Self {
            node_id,
            local,
            remote,
            hinted_handoff,
            metrics,
        }
    }

    /// Fan a batch out to every owner of `shard`, honouring `consistency`,
    /// the coordinator's closing signal, and `timeout`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip_all,
            fields(shard_id = shard.id, consistency = %consistency, owners = shard.owners.len())
        )
    )]
    pub async fn write_to_shard(
        &self,
        shard: &ShardInfo,
        db: &str,
        retention_policy: &str,
        consistency: ConsistencyLevel,
        points: Arc<[Point]>,
        closing: &mut broadcast::Receiver<()>,
        timeout: Duration,
    ) -> CoordinatorResult<()> {
        let owners = shard.owners.len();
        let required = consistency.required(owners);

        let (tx, mut rx) = mpsc::channel::<(u64, CoordinatorResult<()>)>(owners.max(1));

        for &owner in &shard.owners {
            let tx = tx.clone();
            let points = Arc::clone(&points);
            let db = db.to_string();
            let retention_policy = retention_policy.to_string();
            let shard_id = shard.id;
            let this = self.clone();
            tokio::spawn(async move {
                let outcome = this
                    .dispatch_one(shard_id, owner, &db, &retention_policy, consistency, points)
                    .await;
                // The channel is sized to exactly `owners`, so this send
                // never blocks even after the accumulator below has
                // returned early or timed out.
                let _ = tx.send((owner, outcome)).await;
            });
        }
        drop(tx);

        let mut wrote = 0usize;
        let mut received = 0usize;
        let mut first_error: Option<CoordinatorError> = None;

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                _ = closing.recv() => {
                    return Err(CoordinatorError::write_failed("coordinator closed"));
                }

                () = &mut sleep => {
                    WriteMetrics::add(&self.metrics.write_timeout, 1);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(shard_id = shard.id, required, wrote, "write timed out before required acks");
                    return Err(CoordinatorError::Timeout(timeout));
                }

                outcome = rx.recv() => {
                    let Some((owner, outcome)) = outcome else {
                        break;
                    };
                    received += 1;
                    match outcome {
                        Ok(()) => {
                            wrote += 1;
                            if wrote >= required {
                                WriteMetrics::add(&self.metrics.write_ok, 1);
                                #[cfg(feature = "tracing")]
                                tracing::debug!(shard_id = shard.id, wrote, required, "required acks reached");
                                return Ok(());
                            }
                        }
                        Err(err) => {
                            log::warn!(
                                "replica write failed: shard={} owner={} err={err}",
                                shard.id,
                                owner,
                            );
                            #[cfg(feature = "tracing")]
                            tracing::warn!(shard_id = shard.id, owner, %err, "replica write failed");
                            if first_error.is_none() {
                                first_error = Some(err);
                            }
                        }
                    }
                    if received == owners {
                        break;
                    }
                }
            }
        }

        if wrote > 0 {
            WriteMetrics::add(&self.metrics.write_partial, 1);
            Err(CoordinatorError::PartialWrite { acked: wrote, required })
        } else {
            WriteMetrics::add(&self.metrics.write_error, 1);
            let reason = first_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no replica acknowledged".to_string());
            Err(CoordinatorError::write_failed(reason))
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, fields(shard_id, owner, consistency = %consistency))
    )]
    async fn dispatch_one(
        &self,
        shard_id: u64,
        owner: u64,
        db: &str,
        retention_policy: &str,
        consistency: ConsistencyLevel,
        points: Arc<[Point]>,
    ) -> CoordinatorResult<()> {
        if owner == self.node_id {
            WriteMetrics::add(&self.metrics.point_req_local, points.len() as u64);
            return self.dispatch_local(shard_id, db, retention_policy, points).await;
        }

        WriteMetrics::add(&self.metrics.point_req_remote, points.len() as u64);
        self.dispatch_remote(shard_id, owner, consistency, points).await
    }

    async fn dispatch_local(
        &self,
        shard_id: u64,
        db: &str,
        retention_policy: &str,
        points: Arc<[Point]>,
    ) -> CoordinatorResult<()> {
        match self.local.write_to_shard(shard_id, Arc::clone(&points)).await {
            Ok(()) => Ok(()),
            Err(CoordinatorError::ShardNotFound) => {
                self.local.create_shard(db, retention_policy, shard_id).await?;
                self.local.write_to_shard(shard_id, points).await
            }
            Err(err) => Err(err),
        }
    }

    async fn dispatch_remote(
        &self,
        shard_id: u64,
        owner: u64,
        consistency: ConsistencyLevel,
        points: Arc<[Point]>,
    ) -> CoordinatorResult<()> {
        let point_count = points.len() as u64;
        match self.remote.write_shard(shard_id, owner, Arc::clone(&points)).await {
            Ok(()) => Ok(()),
            Err(remote_err) if remote_err.is_retryable() => {
                WriteMetrics::add(&self.metrics.point_req_hh, point_count);
                let handoff_ok = self
                    .hinted_handoff
                    .write_shard(shard_id, owner, points)
                    .await
                    .is_ok();
                #[cfg(feature = "tracing")]
                tracing::debug!(shard_id, owner, handoff_ok, "enqueued retryable remote write for hinted handoff");

                // Handoff-under-ANY is the one place a retryable remote
                // error becomes a success; every other consistency level
                // still reports the original remote error.
                if consistency == ConsistencyLevel::Any && handoff_ok {
                    Ok(())
                } else {
                    Err(CoordinatorError::Remote(remote_err))
                }
            }
            Err(remote_err) => Err(CoordinatorError::Remote(remote_err)),
        }
    }
}
