use super::{Hash, Number};

/// A block header: the item that opens every block in the stream.
///
/// Besides marking the block boundary, the header carries the root hash the
/// producer declares for the preceding block. Chain continuity holds when
/// that declared hash equals the root the node computed for the previous
/// block itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// The number of the block this header opens.
    pub number: Number,
    /// The declared root hash of the previous block.
    pub previous_block_hash: Hash,
}
