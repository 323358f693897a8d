//! Cryptographic primitives for request signing and device hashing.

pub mod digest;
pub mod signing;
