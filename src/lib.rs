//! # block-bloom
//!
//! `block-bloom` contains cache-friendly bloom filters: a blocked bloom filter that confines all
//! of an element's bits to one 512-bit block, and a dynamic bloom filter that grows by appending
//! blocked filters of a fixed capacity. Elements are hashed with a 64-bit Murmur3 digest whose
//! halves drive double hashing, so filters built from the same parameters agree bit for bit and
//! can be merged or shipped around in their serialized form.
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! block-bloom = "*"
//! ```
//!
//! ```rust
//! use block_bloom::bloom::BlockBloomFilter;
//!
//! let mut filter = BlockBloomFilter::new(1000, 0.01).unwrap();
//! filter.add_string("foo");
//! assert!(filter.test_string("foo"));
//! ```
//!
//! ## Features
//!
//!  - `serde`: derives `Serialize` and `Deserialize` for the filters and hash builders.
//!
//! ## References
//!
//!  - [Less hashing, same performance: Building a better Bloom filter](https://dl.acm.org/citation.cfm?id=1400125)
//!  > Kirsch, Adam, and Michael Mitzenmacher. 2008. “Less Hashing, Same Performance: Building a Better Bloom Filter.” *Random Struct. Algorithms* 33 (2). New York, NY, USA: John Wiley & Sons, Inc.: 187–218. doi:[10.1002/rsa.v33:2](https://doi.org/10.1002/rsa.v33:2).
//!  - [Cache-, Hash- and Space-Efficient Bloom Filters](https://dl.acm.org/citation.cfm?id=1768570)
//!  > Putze, Felix, Peter Sanders, and Johannes Singler. 2007. “Cache-, Hash- and Space-Efficient Bloom Filters.” In *Proceedings of the 6th International Conference on Experimental Algorithms*, 108–21. WEA ’07. Berlin, Heidelberg: Springer-Verlag.
//!  - [The Dynamic Bloom Filters](https://ieeexplore.ieee.org/document/5017086)
//!  > Guo, Deke, Jie Wu, Honghui Chen, Ye Yuan, and Xueshan Luo. 2010. “The Dynamic Bloom Filters.” *IEEE Transactions on Knowledge and Data Engineering* 22 (1): 120–33. doi:[10.1109/TKDE.2009.57](https://doi.org/10.1109/TKDE.2009.57).

#![warn(missing_docs)]

pub mod bit_set;
pub mod bloom;
mod error;
mod key;
pub mod sizing;
mod util;

pub use crate::error::{Error, Result};
pub use crate::key::BloomKey;
pub use crate::util::{Murmur3Builder, Murmur3Hasher, SipHasherBuilder, DEFAULT_MURMUR3_SEED};
