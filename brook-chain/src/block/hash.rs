use std::fmt;

use sha2::{Digest, Sha384};

/// The number of bytes in a SHA-384 digest.
pub const HASH_LENGTH: usize = 48;

/// A SHA-384 digest of block-stream content.
///
/// The same digest type serves every hashing role in the node: the leaf
/// hash contributed by a single block item, the rolled-up internal nodes of
/// a block's Merkle tree, the block's root hash, and the previous-block
/// hash a header declares for chain continuity.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; HASH_LENGTH]);

impl Hash {
    /// Computes the SHA-384 digest of `data`.
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        Hash(Sha384::digest(data).into())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Hash").field(&hex::encode(self.0)).finish()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; HASH_LENGTH]> for Hash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Hash(bytes)
    }
}

impl From<Hash> for [u8; HASH_LENGTH] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::str::FromStr for Hash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; HASH_LENGTH];
        hex::decode_to_slice(s, &mut bytes[..])?;
        Ok(Hash(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_display_round_trips_through_from_str() {
        let hash = Hash::digest(b"brook");
        let parsed: Hash = hash.to_string().parse().expect("valid hex");
        assert_eq!(hash, parsed);
    }

    #[test]
    fn digest_matches_known_vector() {
        // SHA-384 of the empty string, a published test vector.
        let expected = "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da\
                        274edebfe76f65fbd51ad2f14898b95b";
        assert_eq!(Hash::digest([]).to_string(), expected);
    }
}
