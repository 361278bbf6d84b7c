use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::CoordinatorConfig;
use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::mapper::{MetaStore, ShardMapper};
use crate::metrics::WriteMetrics;
use crate::model::WriteRequest;
use crate::replica_writer::{HintedHandoff, LocalStore, RemoteShardWriter, ReplicaWriter};

/// Lifecycle and per-request entry point for the write coordinator.
///
/// Orchestrates the shard mapper and the replica writer across shards and
/// aggregates their per-shard results for the caller. Collaborators are set
/// once at construction and never mutated afterward.
pub struct PointsWriter {
    config: CoordinatorConfig,
    mapper: ShardMapper,
    replica_writer: ReplicaWriter,
    metrics: Arc<WriteMetrics>,
    meta: Arc<dyn MetaStore>,
    closing: broadcast::Sender<()>,
    closed: AtomicBool,
}

impl PointsWriter {
    pub fn new(
        config: CoordinatorConfig,
        meta: Arc<dyn MetaStore>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteShardWriter>,
        hinted_handoff: Arc<dyn HintedHandoff>,
        metrics: Arc<WriteMetrics>,
    ) -> Self {
        let (closing, _) = broadcast::channel(1);
        let mapper = ShardMapper::new(meta.clone());
        let replica_writer = ReplicaWriter::new(config.node_id, local, remote, hinted_handoff, metrics.clone());

        Self {
            config,
            mapper,
            replica_writer,
            metrics,
            meta,
            closing,
            closed: AtomicBool::new(false),
        }
    }

    /// Idempotent: ensures the closing signal is armed.
    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
        log::debug!("points writer opened");
    }

    /// Fires the closing signal exactly once; later calls are no-ops. Every
    /// in-flight write observing the signal abandons and returns
    /// `WriteFailed`.
    pub fn close(&self) {
        if self.closed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            let _ = self.closing.send(());
            log::debug!("points writer closed");
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip_all,
            fields(db = %request.database, consistency = %request.consistency, num_points = request.points.len())
        )
    )]
    pub async fn write_points(&self, request: &WriteRequest) -> CoordinatorResult<()> {
        self.metrics.req.fetch_add(1, Ordering::Relaxed);
        self.metrics.point_req.fetch_add(request.points.len() as u64, Ordering::Relaxed);

        if self.closed.load(Ordering::SeqCst) {
            return Err(CoordinatorError::write_failed("coordinator closed"));
        }

        let retention_policy = self.resolve_retention_policy(request).await?;
        let mapping = self.mapper.map_shards(request, &retention_policy).await?;

        let shard_ids: Vec<u64> = mapping.shard_ids().collect();
        let (tx, mut rx) = mpsc::channel::<CoordinatorResult<()>>(shard_ids.len().max(1));

        for shard_id in &shard_ids {
            let shard = mapping
                .shard(*shard_id)
                .expect("every id returned by shard_ids() has a descriptor")
                .clone();
            let points: Arc<[_]> = mapping.points_for(*shard_id).to_vec().into();
            let db = request.database.clone();
            let retention_policy = retention_policy.clone();
            let consistency = request.consistency;
            let timeout = self.config.write_timeout;
            let replica_writer = self.replica_writer.clone();
            let mut closing_rx = self.closing.subscribe();
            let tx = tx.clone();

            #[cfg(feature = "tracing")]
            tracing::debug!(shard_id = shard.id, owners = shard.owners.len(), %consistency, "dispatching shard fan-out");

            tokio::spawn(async move {
                let result = replica_writer
                    .write_to_shard(&shard, &db, &retention_policy, consistency, points, &mut closing_rx, timeout)
                    .await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut closing_rx = self.closing.subscribe();
        let mut first_error = None;
        let mut remaining = shard_ids.len();

        while remaining > 0 {
            tokio::select! {
                biased;

                _ = closing_rx.recv() => {
                    return Err(CoordinatorError::write_failed("coordinator closed"));
                }

                outcome = rx.recv() => {
                    let Some(outcome) = outcome else {
                        break;
                    };
                    remaining -= 1;
                    if let Err(err) = outcome {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(err) => {
                log::error!("write request failed: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn resolve_retention_policy(&self, request: &WriteRequest) -> CoordinatorResult<String> {
        if !request.retention_policy.is_empty() {
            return Ok(request.retention_policy.clone());
        }

        let database = self
            .meta
            .database(&request.database)
            .await
            .map_err(CoordinatorError::Other)?
            .ok_or_else(|| CoordinatorError::DatabaseNotFound(request.database.clone()))?;

        Ok(database.default_retention_policy)
    }

    pub fn metrics(&self) -> WriteMetricsSnapshotHandle<'_> {
        WriteMetricsSnapshotHandle(&self.metrics)
    }
}

/// Thin read-only handle so callers can snapshot metrics without cloning the
/// underlying counters.
pub struct WriteMetricsSnapshotHandle<'a>(&'a Arc<WriteMetrics>);

impl WriteMetricsSnapshotHandle<'_> {
    pub fn snapshot(&self) -> crate::metrics::WriteMetricsSnapshot {
        self.0.snapshot()
    }
}
