//! Space-efficient probabilistic data structures for approximate membership queries in a set.

mod block_bloom_filter;
mod dynamic_bloom_filter;

pub use self::block_bloom_filter::BlockBloomFilter;
pub use self::block_bloom_filter::{DEFAULT_BLOCK_SIZE, DEFAULT_FPP, MAX_BLOCK_SIZE};
pub use self::dynamic_bloom_filter::DynamicBloomFilter;
