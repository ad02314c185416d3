//! Pure content hashing: `bytes -> (algorithm_tag, lowercase_hex_digest)`.
//!
//! Fixed to a single strong cryptographic hash: a 512-bit digest.
//! Collision resistance of the chosen hash is a system assumption; equal
//! digests are treated as equal blocks unconditionally.

use sha2::{Digest, Sha512};
use std::fmt;

/// Name of the only supported hash algorithm.
pub const ALGORITHM: &str = "sha512";

/// A `(algorithm_tag, hex_string)` pair identifying a block's content.
///
/// Immutable once constructed. `hex` is always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockDigest {
    algo: String,
    hex: String,
}

impl BlockDigest {
    /// Construct from an already-computed algorithm tag and hex string.
    /// The hex string is lowercased to normalize external input (e.g. a
    /// manifest line written by a differently-cased encoder).
    #[must_use]
    pub fn new(algo: impl Into<String>, hex: impl Into<String>) -> Self {
        Self { algo: algo.into(), hex: hex.into().to_ascii_lowercase() }
    }

    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algo
    }

    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// The name under which this block's content is stored in a backend.
    #[must_use]
    pub fn object_name(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.algo, self.hex)
    }
}

/// Hash a byte buffer, producing its `BlockDigest` under the fixed hash
/// algorithm.
#[must_use]
pub fn hash(bytes: &[u8]) -> BlockDigest {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    BlockDigest::new(ALGORITHM, hex::encode(digest))
}
