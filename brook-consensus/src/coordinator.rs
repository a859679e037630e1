//! Demultiplexing of the ordered item stream into per-block sessions.
//!
//! The coordinator consumes the node's single ordered item stream. A block
//! header opens a new session; the previous session stops receiving items
//! the instant the header arrives and resolves in the background, where
//! its computed root is compared against the new header's declared
//! previous hash. A continuity mismatch is logged and counted, never
//! fatal: the stream keeps flowing and the new session opens regardless.
//!
//! The transport drives the coordinator through [`VerificationService`], a
//! `tower::Service` over item batches.

use std::{
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures::future;
use tower::Service;
use tracing::warn;

use brook_chain::block::{Hash, Item, Number};
use brook_node_services::{BlockRemover, Notifier, ServiceStatus};

use crate::{
    ack::AckCoordinator,
    config::Config,
    error::BlockError,
    session::{ResultReceiver, VerificationSession},
};

/// Demultiplexes the ordered item stream into per-block verification
/// sessions and enforces hash-chain continuity across consecutive blocks.
pub struct VerificationCoordinator {
    hash_chunk_size: usize,
    /// The session receiving items, until the next header closes it.
    /// Closed sessions keep resolving in the background; they overlap in
    /// flight but never in item ownership.
    current: Option<VerificationSession>,
    ack: Arc<AckCoordinator>,
}

impl VerificationCoordinator {
    /// Creates a coordinator that reports verification outcomes to `ack`.
    ///
    /// # Panics
    ///
    /// If `config.hash_chunk_size` is not a power of two, at least 2.
    pub fn new(config: &Config, ack: Arc<AckCoordinator>) -> Self {
        assert!(
            config.hash_chunk_size >= 2 && config.hash_chunk_size.is_power_of_two(),
            "hash_chunk_size must be a power of two, at least 2",
        );
        VerificationCoordinator {
            hash_chunk_size: config.hash_chunk_size,
            current: None,
            ack,
        }
    }

    /// Ingests the next ordered batch of block items.
    ///
    /// The first item decides attribution: a header closes the current
    /// session and opens a new one; any other item belongs to the current
    /// session. A batch arriving before any header cannot be attributed to
    /// a block and is discarded with a warning.
    pub fn on_item_batch(&mut self, items: &[Item]) -> Result<(), BlockError> {
        let Some(first) = items.first() else {
            return Err(BlockError::EmptyBatch);
        };

        if let Some(header) = first.header() {
            metrics::counter!("verification.blocks.received").increment(1);
            if let Some(mut previous) = self.current.take() {
                // A proof normally resolved the previous session already;
                // if not, the block ended unproven.
                previous.close_without_proof();
                Self::spawn_continuity_check(
                    previous.subscribe(),
                    previous.block_number(),
                    header.previous_block_hash,
                );
            } else {
                warn!(block = %header.number, "no previous session to check chain continuity against");
            }
            let session = VerificationSession::new(header, self.hash_chunk_size);
            self.spawn_result_dispatch(session.subscribe());
            self.current = Some(session);
        }

        match self.current.as_mut() {
            Some(session) => session.append_items(items),
            None => {
                warn!("received block items before any block header, discarding");
                metrics::counter!("verification.items.unattributed").increment(1);
                Ok(())
            }
        }
    }

    /// Compares the previous session's computed root against the hash the
    /// new header declared for it, off the delivery thread.
    ///
    /// Best-effort only: a mismatch is observable misbehavior by the
    /// producer, but halting would also drop every later, possibly valid
    /// block, so processing continues.
    fn spawn_continuity_check(
        mut receiver: ResultReceiver,
        previous_number: Number,
        declared_previous_hash: Hash,
    ) {
        tokio::spawn(async move {
            let result = match receiver.wait_for(Option::is_some).await {
                Ok(guard) => *guard,
                // The session was dropped without resolving.
                Err(_) => return,
            };
            let Some(result) = result else { return };
            if result.block_hash != declared_previous_hash {
                warn!(
                    previous_block = %previous_number,
                    computed = %result.block_hash,
                    declared = %declared_previous_hash,
                    "header's declared previous hash does not match the computed root"
                );
                metrics::counter!("verification.chain.continuity.mismatch").increment(1);
            }
        });
    }

    /// Forwards the session's resolved outcome to the acknowledgment
    /// coordinator.
    fn spawn_result_dispatch(&self, mut receiver: ResultReceiver) {
        let ack = self.ack.clone();
        tokio::spawn(async move {
            let result = match receiver.wait_for(Option::is_some).await {
                Ok(guard) => *guard,
                Err(_) => return,
            };
            let Some(result) = result else { return };
            if result.success {
                ack.block_verified(result.block_number, result.block_hash);
            } else {
                ack.block_verification_failed(result.block_number);
            }
        });
    }
}

/// A `tower::Service` fronting the coordinator for transport integration.
///
/// Cloning the service shares the underlying coordinator. Batches must be
/// delivered in stream order; the service applies each batch synchronously
/// and never exerts backpressure, since hashing happens off the delivery
/// thread.
#[derive(Clone)]
pub struct VerificationService {
    coordinator: Arc<Mutex<VerificationCoordinator>>,
}

impl Service<Vec<Item>> for VerificationService {
    type Response = ();
    type Error = BlockError;
    type Future = future::Ready<Result<(), BlockError>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, items: Vec<Item>) -> Self::Future {
        let mut coordinator = self
            .coordinator
            .lock()
            .expect("verification coordinator lock poisoned");
        future::ready(coordinator.on_item_batch(&items))
    }
}

/// Wires the verification pipeline together.
///
/// Returns the transport-facing service and the acknowledgment coordinator
/// handle the persistence collaborator reports into.
///
/// `persistence_enabled` reflects the storage deployment mode: when either
/// persistence or verification is configured as a no-op stage, an
/// acknowledgment could not assert anything, so acknowledgment tracking is
/// skipped entirely.
pub fn init(
    config: &Config,
    persistence_enabled: bool,
    notifier: Arc<dyn Notifier>,
    service_status: Arc<dyn ServiceStatus>,
    block_remover: Arc<dyn BlockRemover>,
) -> (VerificationService, Arc<AckCoordinator>) {
    let skip_acknowledgement = !config.enabled || !persistence_enabled;
    let ack = Arc::new(AckCoordinator::new(
        skip_acknowledgement,
        notifier,
        service_status,
        block_remover,
    ));
    let coordinator = VerificationCoordinator::new(config, ack.clone());
    let service = VerificationService {
        coordinator: Arc::new(Mutex::new(coordinator)),
    };
    (service, ack)
}
