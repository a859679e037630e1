//! Configuration for the in-memory block state.

use serde::{Deserialize, Serialize};

/// Configuration for the in-memory block cache.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The maximum number of blocks held in memory.
    ///
    /// Inserting beyond this bound evicts the least recently used block;
    /// evicted blocks are served from durable storage instead.
    pub cache_capacity: usize,
}

// we like our default configs to be explicit
#[allow(unknown_lints)]
#[allow(clippy::derivable_impls)]
impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
        }
    }
}
