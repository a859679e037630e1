//! Items of the block stream.

use super::{Hash, Header};

/// An already-decoded transaction payload.
///
/// The wire framing is the transport's concern; by the time an item reaches
/// this crate its bytes have been extracted from the stream envelope.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    /// The serialized transaction content, as the producer streamed it.
    pub data: Vec<u8>,
}

/// An already-decoded state-change record payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateChange {
    /// The serialized state-change content, as the producer streamed it.
    pub data: Vec<u8>,
}

/// The end-of-block marker, declaring the block's root hash.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockProof {
    /// The root hash the producer declares for the block's item tree.
    pub block_root_hash: Hash,
    /// The producer's signature over the declared root.
    ///
    /// Carried for callers that perform end-to-end signature validation;
    /// the hashing pipeline itself never checks it.
    pub signature: Vec<u8>,
}

/// One item of the block stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Item {
    /// Opens a new block.
    Header(Header),
    /// A transaction belonging to the current block.
    Transaction(Transaction),
    /// A state-change record belonging to the current block.
    StateChange(StateChange),
    /// Closes the current block and declares its root hash.
    Proof(BlockProof),
}

impl Item {
    /// Returns the header if this item opens a block.
    pub fn header(&self) -> Option<&Header> {
        match self {
            Item::Header(header) => Some(header),
            _ => None,
        }
    }

    /// Returns the proof if this item closes a block.
    pub fn proof(&self) -> Option<&BlockProof> {
        match self {
            Item::Proof(proof) => Some(proof),
            _ => None,
        }
    }

    /// The leaf hash this item contributes to its block's Merkle tree.
    ///
    /// Headers and proofs frame the block and contribute nothing; only
    /// transaction and state-change payloads are hashed into the tree, in
    /// arrival order.
    pub fn leaf_hash(&self) -> Option<Hash> {
        match self {
            Item::Transaction(transaction) => Some(Hash::digest(&transaction.data)),
            Item::StateChange(state_change) => Some(Hash::digest(&state_change.data)),
            Item::Header(_) | Item::Proof(_) => None,
        }
    }
}
