//! Runtime settings for the background workers.
//!
//! Loading and validating the config file is the server's job; these are
//! the already validated values.

mod store;

pub use store::{ConfigStore, ConfigWatcher};

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Pause between ticks.
    pub interval: Duration,
    /// Most rows read per tick.
    pub batch_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            batch_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectorConfig {
    /// Deadline for one read-model upsert.
    pub upsert_timeout: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            upsert_timeout: Duration::from_secs(2),
        }
    }
}
