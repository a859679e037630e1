//! Per-block verification sessions.
//!
//! A session owns the streaming tree hasher for exactly one block. Items
//! arrive in stream order and leaf-bearing items are absorbed into the
//! tree immediately; the block proof (or, failing that, the next block's
//! header) triggers resolution. The outcome resolves at most once and is
//! broadcast through a watch channel, so any number of readers can await
//! it without consuming it.

use tokio::sync::watch;
use tracing::{debug, error, warn};

use brook_chain::{
    block::{Hash, Header, Item, Number},
    merkle::{TreeHasher, EMPTY_ROOT},
};

use crate::error::BlockError;

/// The resolved outcome of one block's verification.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VerificationResult {
    /// The block this outcome belongs to.
    pub block_number: Number,
    /// The root hash computed over the block's leaf-bearing items.
    pub block_hash: Hash,
    /// Whether the computed root matched the root declared by the block's
    /// proof.
    pub success: bool,
}

/// A receiver that resolves with a block's verification outcome.
///
/// Holds `None` until the outcome resolves; the outcome is written at most
/// once and stays readable afterwards.
pub type ResultReceiver = watch::Receiver<Option<VerificationResult>>;

/// What the session is doing with incoming items.
enum SessionState {
    /// Items are still arriving; the hasher is accumulating leaves.
    Streaming(TreeHasher),
    /// Resolution has been triggered; late items are discarded.
    Resolving,
}

/// The live accumulation state for exactly one block's verification.
pub struct VerificationSession {
    block_number: Number,
    state: SessionState,
    result_tx: watch::Sender<Option<VerificationResult>>,
}

impl VerificationSession {
    /// Opens a session for the block `header` begins.
    ///
    /// `hash_chunk_size` is handed to the owned tree hasher; see
    /// [`Config::hash_chunk_size`](crate::Config#structfield.hash_chunk_size).
    pub fn new(header: &Header, hash_chunk_size: usize) -> Self {
        debug!(block = %header.number, "opened verification session");
        let (result_tx, _result_rx) = watch::channel(None);
        VerificationSession {
            block_number: header.number,
            state: SessionState::Streaming(TreeHasher::with_chunk_size(hash_chunk_size)),
            result_tx,
        }
    }

    /// The block this session verifies.
    pub fn block_number(&self) -> Number {
        self.block_number
    }

    /// Subscribes to the session's single-resolution outcome.
    pub fn subscribe(&self) -> ResultReceiver {
        self.result_tx.subscribe()
    }

    /// Whether resolution has already been triggered.
    pub fn is_resolving(&self) -> bool {
        matches!(self.state, SessionState::Resolving)
    }

    /// Absorbs the next items of the block, in arrival order.
    ///
    /// When the batch ends with the block proof, resolution is triggered:
    /// the root computation completes on background tasks and the result
    /// channel resolves, without blocking the caller. Items arriving after
    /// resolution was triggered are discarded with a warning.
    pub fn append_items(&mut self, items: &[Item]) -> Result<(), BlockError> {
        let SessionState::Streaming(hasher) = &mut self.state else {
            warn!(
                block = %self.block_number,
                "discarding items for a block whose proof was already received"
            );
            return Ok(());
        };

        for (index, item) in items.iter().enumerate() {
            if let Some(header) = item.header() {
                // The session's own header opens its first batch; any other
                // header is a framing error by the transport.
                if index == 0 && header.number == self.block_number {
                    continue;
                }
                return Err(BlockError::MisplacedHeader(header.number));
            }
            if let Some(leaf) = item.leaf_hash() {
                hasher
                    .add_leaf(leaf)
                    .expect("hasher is never finalized while the session is streaming");
            }
        }

        if let Some(proof) = items.last().and_then(Item::proof) {
            self.resolve(Some(proof.block_root_hash));
        }
        Ok(())
    }

    /// Resolves a session whose block ended without a proof because the
    /// next block's header arrived first. The outcome is `success = false`:
    /// a block with no proof cannot be verified.
    ///
    /// Does nothing when the proof already triggered resolution.
    pub fn close_without_proof(&mut self) {
        if matches!(self.state, SessionState::Streaming(_)) {
            warn!(block = %self.block_number, "block ended without a proof");
            self.resolve(None);
        }
    }

    /// Moves the hasher onto a background task, computes the root, and
    /// resolves the result channel exactly once.
    fn resolve(&mut self, declared_root: Option<Hash>) {
        let state = std::mem::replace(&mut self.state, SessionState::Resolving);
        let SessionState::Streaming(mut hasher) = state else {
            return;
        };
        let block_number = self.block_number;
        let result_tx = self.result_tx.clone();

        // The root is awaited on a spawned task so resolution never blocks
        // the thread delivering items.
        tokio::spawn(async move {
            let result = match hasher.root_hash().await {
                Ok(block_hash) => VerificationResult {
                    block_number,
                    block_hash,
                    success: declared_root == Some(block_hash),
                },
                Err(err) => {
                    error!(block = %block_number, %err, "root hash computation failed");
                    VerificationResult {
                        block_number,
                        // No meaningful root exists when accumulation fails.
                        block_hash: EMPTY_ROOT,
                        success: false,
                    }
                }
            };

            if result.success {
                metrics::counter!("verification.blocks.verified").increment(1);
            } else {
                debug!(block = %block_number, "block verification failed");
                metrics::counter!("verification.blocks.failed").increment(1);
            }

            result_tx.send_replace(Some(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use brook_chain::merkle::SequentialTreeHasher;

    use crate::tests::{header_item, proof_item, state_change_item, transaction_item};

    /// The root the block's leaf-bearing items reduce to, via the oracle.
    fn oracle_root(items: &[Item]) -> Hash {
        let mut hasher = SequentialTreeHasher::new();
        for leaf in items.iter().filter_map(Item::leaf_hash) {
            hasher.add_leaf(leaf).expect("not finalized");
        }
        hasher.root_hash()
    }

    async fn resolved(mut receiver: ResultReceiver) -> VerificationResult {
        let guard = receiver
            .wait_for(Option::is_some)
            .await
            .expect("session resolves before dropping the sender");
        let result = *guard;
        result.expect("guarded by wait_for")
    }

    #[tokio::test]
    async fn session_resolves_on_proof() {
        brook_test::init();

        let items = vec![
            header_item(3, Hash::digest(b"previous")),
            transaction_item(b"one"),
            state_change_item(b"two"),
            transaction_item(b"three"),
        ];
        let root = oracle_root(&items);

        let mut session = VerificationSession::new(
            items[0].header().expect("first item is the header"),
            TreeHasher::DEFAULT_CHUNK_SIZE,
        );
        let receiver = session.subscribe();

        session.append_items(&items).expect("well-formed batch");
        assert!(!session.is_resolving());

        session
            .append_items(&[proof_item(root)])
            .expect("well-formed batch");
        assert!(session.is_resolving());

        let result = resolved(receiver).await;
        assert_eq!(result.block_number, Number(3));
        assert_eq!(result.block_hash, root);
        assert!(result.success);
    }

    #[tokio::test]
    async fn proof_mismatch_resolves_failure() {
        brook_test::init();

        let header = header_item(1, Hash::digest(b"previous"));
        let mut session = VerificationSession::new(
            header.header().expect("item is a header"),
            TreeHasher::DEFAULT_CHUNK_SIZE,
        );
        let receiver = session.subscribe();

        session
            .append_items(&[
                header,
                transaction_item(b"payload"),
                proof_item(Hash::digest(b"not the root")),
            ])
            .expect("well-formed batch");

        let result = resolved(receiver).await;
        assert!(!result.success);
        assert_eq!(result.block_hash, oracle_root(&[transaction_item(b"payload")]));
    }

    #[tokio::test]
    async fn close_without_proof_resolves_failure() {
        brook_test::init();

        let header = header_item(2, Hash::digest(b"previous"));
        let mut session = VerificationSession::new(
            header.header().expect("item is a header"),
            TreeHasher::DEFAULT_CHUNK_SIZE,
        );
        let receiver = session.subscribe();

        session
            .append_items(&[header, transaction_item(b"unproven")])
            .expect("well-formed batch");
        session.close_without_proof();
        // A repeat close must not re-resolve.
        session.close_without_proof();

        let result = resolved(receiver).await;
        assert!(!result.success);
        assert_eq!(result.block_number, Number(2));
    }

    #[tokio::test]
    async fn late_items_are_discarded() {
        brook_test::init();

        let header = header_item(4, Hash::digest(b"previous"));
        let body = [header.clone(), transaction_item(b"only")];
        let root = oracle_root(&body);

        let mut session = VerificationSession::new(
            header.header().expect("item is a header"),
            TreeHasher::DEFAULT_CHUNK_SIZE,
        );
        let receiver = session.subscribe();

        session.append_items(&body).expect("well-formed batch");
        session
            .append_items(&[proof_item(root)])
            .expect("well-formed batch");
        session
            .append_items(&[transaction_item(b"too late")])
            .expect("late items are dropped, not an error");

        let result = resolved(receiver).await;
        assert!(result.success);
        assert_eq!(result.block_hash, root);
    }

    #[tokio::test]
    async fn misplaced_header_is_a_synchronous_error() {
        brook_test::init();

        let header = header_item(5, Hash::digest(b"previous"));
        let mut session = VerificationSession::new(
            header.header().expect("item is a header"),
            TreeHasher::DEFAULT_CHUNK_SIZE,
        );

        let stray = header_item(6, Hash::digest(b"stray"));
        let result = session.append_items(&[header, stray]);
        assert_eq!(result, Err(BlockError::MisplacedHeader(Number(6))));
    }
}
