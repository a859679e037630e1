//! The outbound channel back to block producers.

use brook_chain::block::{Hash, Number};

/// Protocol reason codes carried by an end-of-stream signal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EndOfStreamCode {
    /// The stream ended normally.
    Success,
    /// The producer stayed silent past the liveness deadline.
    Timeout,
    /// The producer streamed items that cannot follow the current block.
    OutOfOrder,
    /// A block's proof did not match its computed contents.
    BadBlockProof,
    /// The producer is streaming blocks the node already holds.
    Behind,
}

/// The outbound notification contract to block producers.
///
/// The verification and acknowledgment core calls these methods as facts
/// become known; delivery, retry, and backpressure on the producer
/// connection are the transport's concern, so the methods are
/// fire-and-forget.
pub trait Notifier: Send + Sync {
    /// Sends the acknowledgment for `block_number`.
    ///
    /// `is_duplicate` marks an acknowledgment that repeats one already sent
    /// for the same block, for producers that resend on reconnect.
    fn send_ack(&self, block_number: Number, block_hash: Hash, is_duplicate: bool);

    /// Aborts the stream, telling producers the last block known good and
    /// why the stream cannot continue.
    ///
    /// `last_acknowledged` is `None` when no block was ever acknowledged.
    fn send_end_of_stream(&self, last_acknowledged: Option<Number>, code: EndOfStreamCode);

    /// Reports that the downstream notification channel itself is broken
    /// and the affected subscriber path must unsubscribe.
    fn notify_unrecoverable_error(&self);
}
