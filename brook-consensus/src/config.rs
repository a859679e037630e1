//! Configuration for block verification.

use serde::{Deserialize, Serialize};

use brook_chain::merkle::TreeHasher;

/// Configuration for the verification pipeline.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Whether block verification runs at all.
    ///
    /// Disabling verification is a deployment mode for relay-only nodes,
    /// not an error path. With verification disabled the node also stops
    /// acknowledging blocks entirely, because an acknowledgment asserts
    /// the block was verified.
    pub enabled: bool,

    /// The number of leaf hashes reduced per parallel subtree task.
    ///
    /// Must be a power of two, at least 2. Larger chunks amortize task
    /// dispatch over more hashing; smaller chunks start hashing earlier
    /// for small blocks.
    pub hash_chunk_size: usize,
}

// we like our default configs to be explicit
#[allow(unknown_lints)]
#[allow(clippy::derivable_impls)]
impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_chunk_size: TreeHasher::DEFAULT_CHUNK_SIZE,
        }
    }
}
