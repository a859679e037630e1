//! Errors that can occur when ingesting the block item stream.
//!
//! Only batches the node cannot attribute or frame are synchronous errors.
//! Sequencing anomalies it recovers from locally (items before any header,
//! chain-continuity mismatches) are logged and counted instead, and
//! verification failures travel through the asynchronous result path.

use thiserror::Error;

use brook_chain::block::Number;

/// A block item batch that cannot be processed.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum BlockError {
    /// An empty batch carries nothing to attribute to a block.
    #[error("received an empty block item batch")]
    EmptyBatch,

    /// A block header may only open a batch; one arriving later in a batch
    /// means the transport framed the stream wrong.
    #[error("header for block {0} arrived past the first position of a batch")]
    MisplacedHeader(Number),
}
