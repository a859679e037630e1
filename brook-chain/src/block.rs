//! Blocks and block-related structures (numbers, headers, stream items).

use std::fmt;

mod hash;
mod header;
mod item;
mod number;

pub use hash::{Hash, HASH_LENGTH};
pub use header::Header;
pub use item::{BlockProof, Item, StateChange, Transaction};
pub use number::Number;

/// A block, reassembled from the items a producer streamed for it.
///
/// Blocks only exist in this form after the fact: during streaming the node
/// works on individual [`Item`]s, and a `Block` is put together for
/// consumers once the item sequence for one block number is complete.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// The header that opened the block.
    pub header: Header,
    /// Every item of the block, in arrival order, header included.
    pub items: Vec<Item>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "block {} ({} items)", self.header.number, self.items.len())
    }
}
