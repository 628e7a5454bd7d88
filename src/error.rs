//! Error types returned by filter construction, merging and deserialization.

use std::io;
use thiserror::Error;

/// Errors produced by `block-bloom` operations.
///
/// Inserting and probing never fail; only constructing, merging and decoding a filter can.
#[derive(Debug, Error)]
pub enum Error {
    /// A constructor argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A serialized filter was malformed or truncated.
    #[error("invalid serialized filter: {0}")]
    InvalidData(String),

    /// Two filters could not be merged because their shapes differ.
    #[error(
        "incompatible filters: {bits} bits with {hashes} hash functions cannot absorb \
         {other_bits} bits with {other_hashes} hash functions"
    )]
    IncompatibleFilters {
        /// Bit length of the receiving filter.
        bits: u64,
        /// Hash function count of the receiving filter.
        hashes: u32,
        /// Bit length of the filter being merged in.
        other_bits: u64,
        /// Hash function count of the filter being merged in.
        other_hashes: u32,
    },

    /// The underlying reader or writer failed.
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
