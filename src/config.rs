use std::time::Duration;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinator-wide configuration, set once at construction and read-only
/// thereafter.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub write_timeout: Duration,
    pub node_id: u64,
}

impl CoordinatorConfig {
    pub fn new(node_id: u64) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            node_id: 0,
        }
    }
}
