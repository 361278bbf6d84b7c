use std::sync::atomic::{AtomicU64, Ordering};

/// Counter group for the "write" metrics map described in the coordinator's
/// observability contract. Always constructor-injected (`Arc<WriteMetrics>`)
/// rather than read from a hidden process-wide registry, so tests can assert
/// on it directly and two independently constructed coordinators never share
/// counters.
#[derive(Debug, Default)]
pub struct WriteMetrics {
    pub(crate) req: AtomicU64,
    pub(crate) point_req: AtomicU64,
    pub(crate) point_req_local: AtomicU64,
    pub(crate) point_req_remote: AtomicU64,
    pub(crate) point_req_hh: AtomicU64,
    pub(crate) write_ok: AtomicU64,
    pub(crate) write_partial: AtomicU64,
    pub(crate) write_timeout: AtomicU64,
    pub(crate) write_error: AtomicU64,
}

impl WriteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WriteMetricsSnapshot {
        WriteMetricsSnapshot {
            req: self.req.load(Ordering::Relaxed),
            point_req: self.point_req.load(Ordering::Relaxed),
            point_req_local: self.point_req_local.load(Ordering::Relaxed),
            point_req_remote: self.point_req_remote.load(Ordering::Relaxed),
            point_req_hh: self.point_req_hh.load(Ordering::Relaxed),
            write_ok: self.write_ok.load(Ordering::Relaxed),
            write_partial: self.write_partial.load(Ordering::Relaxed),
            write_timeout: self.write_timeout.load(Ordering::Relaxed),
            write_error: self.write_error.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, delta: u64) {
        counter.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Point-in-time read of every counter in [`WriteMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteMetricsSnapshot {
    pub req: u64,
    pub point_req: u64,
    pub point_req_local: u64,
    pub point_req_remote: u64,
    pub point_req_hh: u64,
    pub write_ok: u64,
    pub write_partial: u64,
    pub write_timeout: u64,
    pub write_error: u64,
}
