//! Pluggable block signature verification.

use brook_chain::block::Hash;

/// Verifies producer signatures over block root hashes.
///
/// Callers that need end-to-end validation of a block proof check the
/// signature through this capability. The hashing and verification core
/// never invokes it: root-hash comparison alone decides a block's
/// verification outcome.
pub trait SignatureVerifier: Send + Sync {
    /// Whether `signature` is a valid signature over `hash`.
    fn verify_signature(&self, hash: &Hash, signature: &[u8]) -> bool;
}
