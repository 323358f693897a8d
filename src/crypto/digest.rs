//! SHA-256 digest helpers.

use sha2::{Digest, Sha256};

/// Compute SHA-256 of `data` and return the lowercase hex encoding.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
