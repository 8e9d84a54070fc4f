//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum combined note+drawing items per batch save.
    pub max_batch_items: usize,
    /// Maximum rows returned by a single pull page.
    pub max_pull_batch: u32,
}

impl ServerConfig {
    /// Creates a configuration with the default limits.
    pub fn new() -> Self {
        Self {
            max_batch_items: casebook_protocol::MAX_BATCH_ITEMS,
            max_pull_batch: 500,
        }
    }

    /// Sets the batch item limit.
    pub fn with_max_batch_items(mut self, limit: usize) -> Self {
        self.max_batch_items = limit;
        self
    }

    /// Sets the pull page limit.
    pub fn with_max_pull_batch(mut self, limit: u32) -> Self {
        self.max_pull_batch = limit;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
