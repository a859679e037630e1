//! Streaming Merkle tree accumulation over block item leaves.
//!
//! Leaves arrive one at a time, in stream order, and the root is not known
//! until the block ends. At every level of the tree, adjacent nodes combine
//! left to right; a trailing unpaired node is promoted unchanged to the
//! next level. The promotion rule is load-bearing for compatibility: a
//! duplicate-last-node tree (as Bitcoin builds) or a padded tree computes
//! different roots for the same leaf sequence.
//!
//! [`TreeHasher`] is the production accumulator. It cuts the leaf sequence
//! into fixed-size chunks and reduces each completed chunk to its subtree
//! root on the rayon pool while later leaves keep arriving. Chunk roots are
//! kept in arrival order, so the final combination is identical to a
//! strictly sequential left-to-right reduction: concurrency is an
//! optimization, never an observable behavior change.
//!
//! [`SequentialTreeHasher`] is the reference implementation, kept as the
//! oracle the parallel accumulator is tested against.

use thiserror::Error;
use tokio::sync::oneshot;

use sha2::{Digest, Sha384};

use crate::block::Hash;

pub mod proof;


/// The root hash of a tree with no leaves: the SHA-384 digest of the empty
/// byte string.
///
/// This is a fixed convention, chosen so an empty block still produces a
/// well-defined, non-zero root.
pub const EMPTY_ROOT: Hash = Hash([
    0x38, 0xb0, 0x60, 0xa7, 0x51, 0xac, 0x96, 0x38, 0x4c, 0xd9, 0x32, 0x7e, 0xb1, 0xb1, 0xe3,
    0x6a, 0x21, 0xfd, 0xb7, 0x11, 0x14, 0xbe, 0x07, 0x43, 0x4c, 0x0c, 0xc7, 0xbf, 0x63, 0xf6,
    0xe1, 0xda, 0x27, 0x4e, 0xde, 0xbf, 0xe7, 0x6f, 0x65, 0xfb, 0xd5, 0x1a, 0xd2, 0xf1, 0x48,
    0x98, 0xb9, 0x5b,
]);

/// Errors from streaming tree accumulation.
#[derive(Error, Copy, Clone, Debug, Eq, PartialEq)]
pub enum MerkleError {
    /// The accumulator is finalized by the first root hash request; adding
    /// further leaves afterwards is a bug in the calling code.
    #[error("cannot add a leaf after the root hash has been requested")]
    AlreadyFinalized,

    /// A parallel subtree task died before returning its root.
    #[error("a subtree hashing task was dropped before completing")]
    WorkerLost,
}

/// Combines two sibling nodes into their parent node hash.
fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut digest = Sha384::new();
    digest.update(left.0);
    digest.update(right.0);
    Hash(digest.finalize().into())
}

/// Reduces one tree level: pairs combine left to right, and a trailing
/// unpaired node is promoted unchanged.
fn reduce_level(nodes: &[Hash]) -> Vec<Hash> {
    nodes
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => combine(left, right),
            [lone] => *lone,
            _ => unreachable!("chunks(2) yields one or two nodes"),
        })
        .collect()
}

/// Sequentially reduces a node sequence to a single root.
fn reduce_to_root(mut nodes: Vec<Hash>) -> Hash {
    if nodes.is_empty() {
        return EMPTY_ROOT;
    }
    while nodes.len() > 1 {
        nodes = reduce_level(&nodes);
    }
    nodes[0]
}

/// The rightmost completed subtree roots of a tree with `nodes.len()`
/// equal-height nodes, indexed by height above those nodes.
///
/// A completed subtree exists at height `h` exactly where bit `h` of the
/// node count is set; higher-order subtrees cover the leftmost nodes.
fn peaks_of(nodes: &[Hash]) -> Vec<Option<Hash>> {
    let count = nodes.len();
    if count == 0 {
        return Vec::new();
    }
    let heights = (usize::BITS - count.leading_zeros()) as usize;
    let mut peaks = vec![None; heights];
    let mut offset = 0;
    for height in (0..heights).rev() {
        if count & (1 << height) != 0 {
            let width = 1 << height;
            peaks[height] = Some(reduce_to_root(nodes[offset..offset + width].to_vec()));
            offset += width;
        }
    }
    peaks
}

/// An immutable snapshot of accumulator state: enough to extend the tree by
/// one more leaf without replaying the leaves already absorbed.
///
/// The snapshot holds the leaf count and the rightmost completed subtree
/// root at each height (lowest height first); a root is present exactly
/// where the corresponding bit of the leaf count is set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeStatus {
    num_leaves: u64,
    peaks: Vec<Option<Hash>>,
}

impl TreeStatus {
    /// The status of a tree with no leaves.
    pub fn empty() -> Self {
        TreeStatus {
            num_leaves: 0,
            peaks: Vec::new(),
        }
    }

    /// The number of leaves absorbed when the snapshot was taken.
    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    /// The rightmost completed subtree roots, lowest height first.
    pub fn peaks(&self) -> &[Option<Hash>] {
        &self.peaks
    }
}

/// Computes the root of the tree obtained by appending exactly one more
/// leaf to the snapshotted accumulator, without replaying prior leaves.
///
/// Folding the new leaf under every completed subtree root, lowest height
/// first, yields the same root a full left-to-right reduction of all
/// `status.num_leaves() + 1` leaves would.
pub fn root_hash_from(status: &TreeStatus, leaf: Hash) -> Hash {
    let mut hash = leaf;
    for peak in status.peaks.iter().flatten() {
        hash = combine(peak, &hash);
    }
    hash
}

/// The reference streaming accumulator: buffers every leaf and reduces the
/// whole tree level by level when the root is requested.
///
/// Too slow for the ingest path, but its output defines correctness; the
/// parallel [`TreeHasher`] must match it for every leaf sequence.
#[derive(Clone, Debug, Default)]
pub struct SequentialTreeHasher {
    leaves: Vec<Hash>,
    root: Option<Hash>,
    finalized: bool,
}

impl SequentialTreeHasher {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next leaf of the stream.
    pub fn add_leaf(&mut self, leaf: Hash) -> Result<(), MerkleError> {
        if self.finalized {
            return Err(MerkleError::AlreadyFinalized);
        }
        self.leaves.push(leaf);
        Ok(())
    }

    /// The leaves absorbed so far, in arrival order.
    pub fn leaves(&self) -> &[Hash] {
        &self.leaves
    }

    /// Finalizes the tree and returns its root hash.
    ///
    /// The first call finalizes the accumulator; no further leaves can be
    /// added. Repeat calls return the cached root.
    pub fn root_hash(&mut self) -> Hash {
        self.finalized = true;
        *self
            .root
            .get_or_insert_with(|| reduce_to_root(self.leaves.clone()))
    }
}

/// A chunk's subtree root: already reduced, or still being reduced on the
/// rayon pool.
#[derive(Debug)]
enum ChunkRoot {
    Ready(Hash),
    Pending(oneshot::Receiver<Hash>),
}

/// The production streaming accumulator.
///
/// Leaves are buffered into fixed-size chunks (a power of two). Each chunk
/// that fills is handed to the rayon pool and reduced to its subtree root
/// while later leaves continue to arrive. Because chunks are consecutive,
/// power-of-two-sized leaf runs, every chunk root is a node the sequential
/// reduction would also compute, and combining the chunk roots (plus the
/// unfinished tail) left to right reproduces the sequential root exactly.
#[derive(Debug)]
pub struct TreeHasher {
    chunk_size: usize,
    /// Leaves not yet part of a completed chunk.
    tail: Vec<Hash>,
    /// Completed chunk subtree roots, in arrival order.
    chunks: Vec<ChunkRoot>,
    num_leaves: u64,
    root: Option<Hash>,
    finalized: bool,
}

impl Default for TreeHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeHasher {
    /// The default number of leaves reduced per parallel subtree task.
    pub const DEFAULT_CHUNK_SIZE: usize = 32;

    /// Creates an accumulator with the default chunk size.
    pub fn new() -> Self {
        Self::with_chunk_size(Self::DEFAULT_CHUNK_SIZE)
    }

    /// Creates an accumulator that dispatches subtree reduction in chunks
    /// of `chunk_size` leaves.
    ///
    /// # Panics
    ///
    /// If `chunk_size` is not a power of two, or is less than 2. Chunks
    /// must cover aligned power-of-two leaf runs for their roots to be
    /// nodes of the sequential reduction.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(
            chunk_size >= 2 && chunk_size.is_power_of_two(),
            "chunk size must be a power of two, at least 2",
        );
        TreeHasher {
            chunk_size,
            tail: Vec::with_capacity(chunk_size),
            chunks: Vec::new(),
            num_leaves: 0,
            root: None,
            finalized: false,
        }
    }

    /// Appends the next leaf of the stream.
    ///
    /// Completing a chunk schedules its reduction on the rayon pool; the
    /// caller never waits for hashing here.
    pub fn add_leaf(&mut self, leaf: Hash) -> Result<(), MerkleError> {
        if self.finalized {
            return Err(MerkleError::AlreadyFinalized);
        }
        self.tail.push(leaf);
        self.num_leaves += 1;
        if self.tail.len() == self.chunk_size {
            let chunk = std::mem::take(&mut self.tail);
            // Rayon has no spawn that returns a value, so the subtree root
            // comes back through a oneshot channel.
            let (result_tx, result_rx) = oneshot::channel();
            rayon::spawn_fifo(move || {
                let _ = result_tx.send(reduce_to_root(chunk));
            });
            self.chunks.push(ChunkRoot::Pending(result_rx));
            self.tail = Vec::with_capacity(self.chunk_size);
        }
        Ok(())
    }

    /// The number of leaves added so far.
    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    /// Finalizes the tree and returns its root hash.
    ///
    /// The first call finalizes the accumulator: in-flight subtree
    /// reductions are awaited, no further leaves can be added, and repeat
    /// calls return the cached root.
    pub async fn root_hash(&mut self) -> Result<Hash, MerkleError> {
        self.finalized = true;
        if let Some(root) = self.root {
            return Ok(root);
        }
        let mut nodes = self.settled_chunk_roots().await?;
        if !self.tail.is_empty() {
            // The tail reduces independently of the chunked prefix: no pair
            // crosses a chunk boundary below the chunk height.
            nodes.push(reduce_to_root(self.tail.clone()));
        }
        let root = if nodes.is_empty() {
            EMPTY_ROOT
        } else {
            reduce_to_root(nodes)
        };
        self.root = Some(root);
        Ok(root)
    }

    /// Takes a resume snapshot of the accumulator.
    ///
    /// Awaits in-flight subtree reductions but does not finalize: more
    /// leaves may be added afterwards. The snapshot plus the next leaf are
    /// enough to recompute the next root via [`root_hash_from`].
    pub async fn status(&mut self) -> Result<TreeStatus, MerkleError> {
        let chunk_roots = self.settled_chunk_roots().await?;
        // Peaks below the chunk height come from the tail; peaks at and
        // above it come from the chunk roots, which combine among
        // themselves exactly like leaves of a smaller tree. Together they
        // are the binary decomposition of the total leaf count.
        let chunk_height = self.chunk_size.trailing_zeros() as usize;
        let mut peaks = peaks_of(&self.tail);
        let chunk_peaks = peaks_of(&chunk_roots);
        if !chunk_peaks.is_empty() {
            peaks.resize(chunk_height, None);
            peaks.extend(chunk_peaks);
        }
        Ok(TreeStatus {
            num_leaves: self.num_leaves,
            peaks,
        })
    }

    /// Waits for every dispatched chunk and returns the chunk roots in
    /// arrival order, caching them for later calls.
    async fn settled_chunk_roots(&mut self) -> Result<Vec<Hash>, MerkleError> {
        let mut roots = Vec::with_capacity(self.chunks.len());
        for chunk in self.chunks.iter_mut() {
            let root = match chunk {
                ChunkRoot::Ready(root) => *root,
                ChunkRoot::Pending(receiver) => {
                    receiver.await.map_err(|_| MerkleError::WorkerLost)?
                }
            };
            *chunk = ChunkRoot::Ready(root);
            roots.push(root);
        }
        Ok(roots)
    }
}
