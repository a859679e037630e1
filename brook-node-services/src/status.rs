//! Node health readback for acknowledged blocks.

use std::sync::RwLock;

use brook_chain::block::{Hash, Number};

/// Health and readiness reporting for the acknowledgment pipeline.
///
/// The pipeline records each acknowledged block here; liveness policy and
/// how the value is served (health endpoints, readiness probes) belong to
/// the operational layer.
pub trait ServiceStatus: Send + Sync {
    /// Records the latest acknowledged block.
    fn set_latest_acknowledged(&self, number: Number, hash: Hash);

    /// The latest acknowledged block, if any block was acknowledged yet.
    fn latest_acknowledged(&self) -> Option<(Number, Hash)>;
}

/// A thread-safe in-process [`ServiceStatus`] implementation.
#[derive(Debug, Default)]
pub struct StatusHandle {
    latest: RwLock<Option<(Number, Hash)>>,
}

impl StatusHandle {
    /// Creates a handle with no block acknowledged yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceStatus for StatusHandle {
    fn set_latest_acknowledged(&self, number: Number, hash: Hash) {
        *self.latest.write().expect("status lock poisoned") = Some((number, hash));
    }

    fn latest_acknowledged(&self) -> Option<(Number, Hash)> {
        *self.latest.read().expect("status lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_handle_tracks_the_latest_ack() {
        let status = StatusHandle::new();
        assert_eq!(status.latest_acknowledged(), None);

        let hash = Hash::digest(b"root");
        status.set_latest_acknowledged(Number(5), hash);
        status.set_latest_acknowledged(Number(6), hash);
        assert_eq!(status.latest_acknowledged(), Some((Number(6), hash)));
    }
}
