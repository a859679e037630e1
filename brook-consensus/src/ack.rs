//! Ordered, exactly-once block acknowledgment.
//!
//! A block is acknowledged only after two independent completion signals
//! arrive for it: its bytes durably persisted, and its contents verified.
//! The signals come from different threads in any relative order; the
//! coordinator tracks them per block number and releases acknowledgments
//! in strictly ascending order with no gaps, each exactly once. The
//! compare-and-set on the per-block `ack_sent` flag is the sole guard
//! against duplicate emission when sweeps race.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, OnceLock,
    },
};

use tracing::{debug, error, warn};

use brook_chain::block::{Hash, Number};
use brook_node_services::{BlockRemover, EndOfStreamCode, Notifier, ServiceStatus};

/// Completion state for one in-flight block.
///
/// `persisted` and `verified` are independent set-once flags, idempotent
/// under repeated or concurrent signals. `ack_sent` transitions false→true
/// at most once, under compare-and-set.
#[derive(Debug, Default)]
pub struct AckBlockStatus {
    persisted: AtomicBool,
    verified: AtomicBool,
    ack_sent: AtomicBool,
}

impl AckBlockStatus {
    /// Marks the block's bytes durably written. Idempotent.
    pub fn set_persisted(&self) {
        self.persisted.store(true, Ordering::Release);
    }

    /// Marks the block's contents verified. Idempotent.
    pub fn set_verified(&self) {
        self.verified.store(true, Ordering::Release);
    }

    /// Whether the block's bytes are durably written.
    pub fn is_persisted(&self) -> bool {
        self.persisted.load(Ordering::Acquire)
    }

    /// Whether the block's contents are verified.
    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    /// Atomically claims the right to emit this block's acknowledgment.
    ///
    /// Returns true exactly once, for the caller that wins the false→true
    /// transition; every later or concurrent caller gets false.
    pub fn mark_ack_sent(&self) -> bool {
        self.ack_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the acknowledgment was already claimed.
    pub fn is_ack_sent(&self) -> bool {
        self.ack_sent.load(Ordering::Acquire)
    }
}

/// Tracking record for one block awaiting acknowledgment.
///
/// Created lazily when the first signal for a block number arrives and
/// dropped as soon as its acknowledgment is emitted, so memory stays
/// bounded by the number of in-flight blocks.
#[derive(Debug, Default)]
pub struct BlockInfo {
    /// The verified root hash. Written once, before the verified flag is
    /// set, so any reader that observes `verified` also sees the hash.
    hash: OnceLock<Hash>,
    status: AckBlockStatus,
}

impl BlockInfo {
    /// The verified root hash, if verification completed.
    pub fn block_hash(&self) -> Option<Hash> {
        self.hash.get().copied()
    }

    /// The block's completion state.
    pub fn status(&self) -> &AckBlockStatus {
        &self.status
    }
}

/// The tracked blocks and the acknowledgment high-water mark.
#[derive(Debug, Default)]
struct AckState {
    /// In-flight blocks keyed by number. A `BTreeMap` so the bootstrap
    /// sweep can find the minimum tracked number.
    blocks: BTreeMap<Number, Arc<BlockInfo>>,
    /// The last acknowledged block. `None` until the first acknowledgment;
    /// the first sweep then starts at the minimum tracked number, so
    /// streams that do not begin at genesis acknowledge correctly from
    /// their first observed block.
    last_acknowledged: Option<Number>,
}

/// Tracks per-block completion signals and emits ordered, exactly-once
/// acknowledgments.
///
/// All entry points are safe to call concurrently from any thread.
pub struct AckCoordinator {
    state: Mutex<AckState>,
    /// Set when persistence or verification is configured as a no-op
    /// stage: every tracking entry point returns before touching state and
    /// no acknowledgments are ever emitted.
    skip_acknowledgement: bool,
    notifier: Arc<dyn Notifier>,
    service_status: Arc<dyn ServiceStatus>,
    block_remover: Arc<dyn BlockRemover>,
}

impl AckCoordinator {
    /// Creates a coordinator reporting through the given collaborators.
    pub fn new(
        skip_acknowledgement: bool,
        notifier: Arc<dyn Notifier>,
        service_status: Arc<dyn ServiceStatus>,
        block_remover: Arc<dyn BlockRemover>,
    ) -> Self {
        AckCoordinator {
            state: Mutex::new(AckState::default()),
            skip_acknowledgement,
            notifier,
            service_status,
            block_remover,
        }
    }

    /// Records that block `number`'s bytes are durably written.
    ///
    /// Idempotent; safe to call from any thread, in any order relative to
    /// the verification signal.
    pub fn block_persisted(&self, number: Number) {
        if self.skip_acknowledgement {
            return;
        }
        self.track(number).status.set_persisted();
        self.attempt_acks();
    }

    /// Records block `number`'s verified root hash.
    ///
    /// Idempotent; safe to call from any thread, in any order relative to
    /// the persistence signal.
    pub fn block_verified(&self, number: Number, hash: Hash) {
        if self.skip_acknowledgement {
            return;
        }
        let info = self.track(number);
        // The hash must be in place before the verified flag: the sweep
        // reads it only after observing `verified`.
        let _ = info.hash.set(hash);
        info.status.set_verified();
        self.attempt_acks();
    }

    /// Aborts acknowledgment for a block whose verification failed.
    ///
    /// Bypasses the ordering machinery entirely: producers receive an
    /// end-of-stream signal naming the last block known good, and the
    /// persistence collaborator is asked to remove the failed block's
    /// bytes. Removal errors are logged, not propagated; the stream abort
    /// has already been signaled.
    pub fn block_verification_failed(&self, number: Number) {
        let last_acknowledged = self.lock().last_acknowledged;
        warn!(block = %number, "block failed verification, aborting stream");
        self.notifier
            .send_end_of_stream(last_acknowledged, EndOfStreamCode::BadBlockProof);
        if let Err(err) = self.block_remover.remove_block(number) {
            error!(block = %number, %err, "failed to remove unverified block");
        }
    }

    /// The last acknowledged block number, if any block was acknowledged.
    pub fn last_acknowledged(&self) -> Option<Number> {
        self.lock().last_acknowledged
    }

    /// Returns the tracking record for `number`, creating it on demand.
    fn track(&self, number: Number) -> Arc<BlockInfo> {
        self.lock().blocks.entry(number).or_default().clone()
    }

    /// Acknowledges every consecutive ready block, starting at the next
    /// expected number.
    ///
    /// Runs on whichever thread delivered the triggering signal. Sweeps
    /// may race: the per-block CAS lets exactly one of them emit any given
    /// block's acknowledgment, and `last_acknowledged` only advances after
    /// the emission, so a racing sweep cannot overtake the winner and
    /// acknowledge a later block first.
    fn attempt_acks(&self) {
        loop {
            let (next, info) = {
                let state = self.lock();
                let next = match state.last_acknowledged {
                    Some(last) => last.next(),
                    // Nothing acknowledged yet: start at the lowest
                    // tracked block.
                    None => match state.blocks.keys().next() {
                        Some(first) => *first,
                        None => return,
                    },
                };
                match state.blocks.get(&next) {
                    Some(info) => (next, info.clone()),
                    None => return,
                }
            };

            if !info.status.is_persisted() || !info.status.is_verified() {
                return;
            }
            let Some(hash) = info.block_hash() else {
                return;
            };
            if !info.status.mark_ack_sent() {
                // A concurrent sweep claimed this block; it will carry on
                // through any blocks that became ready after it.
                return;
            }

            // No lock is held while notifying: a slow sink must not stall
            // the threads delivering completion signals.
            self.notifier.send_ack(next, hash, false);
            self.service_status.set_latest_acknowledged(next, hash);

            {
                let mut state = self.lock();
                state.last_acknowledged = Some(next);
                state.blocks.remove(&next);
            }

            metrics::counter!("ack.blocks.acked").increment(1);
            debug!(block = %next, "acknowledged block");
        }
    }

    fn lock(&self) -> MutexGuard<'_, AckState> {
        self.state.lock().expect("ack state lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use brook_node_services::StatusHandle;

    use crate::tests::{NotifierEvent, RecordingNotifier, RecordingRemover};

    struct Harness {
        coordinator: AckCoordinator,
        notifier: Arc<RecordingNotifier>,
        status: Arc<StatusHandle>,
        remover: Arc<RecordingRemover>,
    }

    fn harness(skip_acknowledgement: bool) -> Harness {
        harness_with_remover(skip_acknowledgement, RecordingRemover::default())
    }

    fn harness_with_remover(skip_acknowledgement: bool, remover: RecordingRemover) -> Harness {
        brook_test::init();
        let notifier = Arc::new(RecordingNotifier::default());
        let status = Arc::new(StatusHandle::new());
        let remover = Arc::new(remover);
        let coordinator = AckCoordinator::new(
            skip_acknowledgement,
            notifier.clone(),
            status.clone(),
            remover.clone(),
        );
        Harness {
            coordinator,
            notifier,
            status,
            remover,
        }
    }

    fn root(number: u64) -> Hash {
        Hash::digest(number.to_be_bytes())
    }

    #[test]
    fn acks_release_in_order_from_interleaved_signals() {
        let h = harness(false);

        h.coordinator.block_verified(Number(3), root(3));
        h.coordinator.block_verified(Number(1), root(1));
        h.coordinator.block_persisted(Number(1));
        h.coordinator.block_persisted(Number(2));
        h.coordinator.block_verified(Number(2), root(2));
        h.coordinator.block_persisted(Number(3));

        assert_eq!(
            h.notifier.acked_numbers(),
            vec![Number(1), Number(2), Number(3)],
        );
        assert_eq!(h.coordinator.last_acknowledged(), Some(Number(3)));
        assert_eq!(
            h.status.latest_acknowledged(),
            Some((Number(3), root(3))),
        );
    }

    #[test]
    fn a_block_needs_both_signals() {
        let h = harness(false);

        h.coordinator.block_persisted(Number(1));
        assert_eq!(h.notifier.acked_numbers(), Vec::<Number>::new());

        h.coordinator.block_verified(Number(1), root(1));
        assert_eq!(h.notifier.acked_numbers(), vec![Number(1)]);
    }

    #[test]
    fn one_signal_can_release_a_run_of_blocks() {
        let h = harness(false);

        for number in 2..=5u64 {
            h.coordinator.block_persisted(Number(number));
            h.coordinator.block_verified(Number(number), root(number));
        }
        // Blocks 2..=5 are ready but gated behind block 1.
        assert_eq!(h.notifier.acked_numbers(), Vec::<Number>::new());

        h.coordinator.block_persisted(Number(1));
        h.coordinator.block_verified(Number(1), root(1));

        let expected: Vec<Number> = (1..=5).map(Number).collect();
        assert_eq!(h.notifier.acked_numbers(), expected);
    }

    #[test]
    fn duplicate_signals_are_harmless() {
        let h = harness(false);

        h.coordinator.block_persisted(Number(1));
        h.coordinator.block_persisted(Number(1));
        h.coordinator.block_verified(Number(1), root(1));
        h.coordinator.block_verified(Number(1), root(1));
        // Signals arriving again after the ack must not re-acknowledge.
        h.coordinator.block_persisted(Number(1));
        h.coordinator.block_verified(Number(1), root(1));

        assert_eq!(h.notifier.acked_numbers(), vec![Number(1)]);
    }

    #[test]
    fn skip_mode_emits_nothing() {
        let h = harness(true);

        for number in 1..=4u64 {
            h.coordinator.block_persisted(Number(number));
            h.coordinator.block_verified(Number(number), root(number));
        }

        assert_eq!(h.notifier.events(), Vec::new());
        assert_eq!(h.coordinator.last_acknowledged(), None);
        assert_eq!(h.status.latest_acknowledged(), None);
    }

    #[test]
    fn bootstrap_starts_at_the_first_observed_block() {
        let h = harness(false);

        h.coordinator.block_persisted(Number(9));
        h.coordinator.block_verified(Number(9), root(9));
        h.coordinator.block_persisted(Number(10));
        h.coordinator.block_verified(Number(10), root(10));

        // No waiting for blocks 0..=8 that this stream never carried.
        assert_eq!(h.notifier.acked_numbers(), vec![Number(9), Number(10)]);
    }

    #[test]
    fn verification_failure_aborts_the_stream() {
        let h = harness(false);

        h.coordinator.block_persisted(Number(1));
        h.coordinator.block_verified(Number(1), root(1));
        h.coordinator.block_verification_failed(Number(2));

        let events = h.notifier.events();
        assert_eq!(
            events.last(),
            Some(&NotifierEvent::EndOfStream {
                last_acknowledged: Some(Number(1)),
                code: EndOfStreamCode::BadBlockProof,
            }),
        );
        assert_eq!(h.remover.removed(), vec![Number(2)]);
    }

    #[test]
    fn removal_errors_are_logged_not_fatal() {
        let h = harness_with_remover(false, RecordingRemover::failing());

        h.coordinator.block_verification_failed(Number(7));

        assert_eq!(h.remover.removed(), vec![Number(7)]);
        assert_eq!(
            h.notifier.events(),
            vec![NotifierEvent::EndOfStream {
                last_acknowledged: None,
                code: EndOfStreamCode::BadBlockProof,
            }],
        );
    }

    #[test]
    fn concurrent_signals_ack_each_block_exactly_once() {
        let h = harness(false);
        let blocks = 100u64;

        std::thread::scope(|scope| {
            let coordinator = &h.coordinator;
            scope.spawn(move || {
                for number in 0..blocks {
                    coordinator.block_persisted(Number(number));
                }
            });
            scope.spawn(move || {
                // Verify in reverse, maximizing out-of-order buffering.
                for number in (0..blocks).rev() {
                    coordinator.block_verified(Number(number), root(number));
                }
            });
        });

        let expected: Vec<Number> = (0..blocks).map(Number).collect();
        assert_eq!(h.notifier.acked_numbers(), expected);
        assert_eq!(h.coordinator.last_acknowledged(), Some(Number(blocks - 1)));
    }
}
