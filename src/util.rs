use byteorder::{ByteOrder, LittleEndian};
use rand::Rng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use siphasher::sip::SipHasher;
use std::hash::{BuildHasher, Hasher};
use std::{cmp, fmt};

/// Seed used by [`Murmur3Builder::default`].
pub const DEFAULT_MURMUR3_SEED: u64 = 104_729;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;
const R1: u32 = 31;
const R2: u32 = 27;
const M: u64 = 5;
const N1: u64 = 0x52dc_e729;

/// Streaming 64-bit Murmur3 hasher.
///
/// Bytes are consumed in little-endian 8-byte blocks; a trailing partial block is mixed in by
/// [`Hasher::finish`] together with the total input length. Feeding the same bytes in one call
/// or in several calls produces the same digest.
///
/// # Examples
///
/// ```
/// use block_bloom::Murmur3Hasher;
/// use std::hash::Hasher;
///
/// let mut hasher = Murmur3Hasher::with_seed(104_729);
/// hasher.write(b"abcdefgh");
/// assert_eq!(hasher.finish(), 0x0a20_25e4_fc40_126d);
/// ```
#[derive(Clone, Debug)]
pub struct Murmur3Hasher {
    hash: u64,
    total: u64,
    buf: [u8; 8],
    buf_len: usize,
}

impl Murmur3Hasher {
    /// Constructs a new `Murmur3Hasher` with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Murmur3Hasher {
            hash: seed,
            total: 0,
            buf: [0; 8],
            buf_len: 0,
        }
    }

    #[inline]
    fn mix_block(&mut self, k: u64) {
        self.hash ^= mix_k(k);
        self.hash = self
            .hash
            .rotate_left(R2)
            .wrapping_mul(M)
            .wrapping_add(N1);
        self.total += 8;
    }
}

impl Default for Murmur3Hasher {
    fn default() -> Self {
        Self::with_seed(DEFAULT_MURMUR3_SEED)
    }
}

impl Hasher for Murmur3Hasher {
    fn finish(&self) -> u64 {
        let mut hash = self.hash;
        if self.buf_len > 0 {
            let mut tail = [0u8; 8];
            tail[..self.buf_len].copy_from_slice(&self.buf[..self.buf_len]);
            hash ^= mix_k(LittleEndian::read_u64(&tail));
        }
        hash ^= self.total + self.buf_len as u64;
        fmix64(hash)
    }

    fn write(&mut self, mut bytes: &[u8]) {
        if self.buf_len + bytes.len() < 8 {
            self.buf[self.buf_len..self.buf_len + bytes.len()].copy_from_slice(bytes);
            self.buf_len += bytes.len();
            return;
        }

        if self.buf_len != 0 {
            let wanted = 8 - self.buf_len;
            self.buf[self.buf_len..].copy_from_slice(&bytes[..wanted]);
            let k = LittleEndian::read_u64(&self.buf);
            self.mix_block(k);
            bytes = &bytes[wanted..];
            self.buf_len = 0;
        }

        let mut chunks = bytes.chunks_exact(8);
        for chunk in &mut chunks {
            self.mix_block(LittleEndian::read_u64(chunk));
        }

        let rem = chunks.remainder();
        self.buf[..rem.len()].copy_from_slice(rem);
        self.buf_len = rem.len();
    }
}

#[inline]
fn mix_k(k: u64) -> u64 {
    k.wrapping_mul(C1).rotate_left(R1).wrapping_mul(C2)
}

/// Finalization mix: force all bits of a hash block to avalanche.
#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^ (k >> 33)
}

/// The default hash builder for all filters.
///
/// Filters that are merged, or that are serialized and read back elsewhere, must be built with
/// the same seed.
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Murmur3Builder {
    seed: u64,
}

impl Murmur3Builder {
    /// Constructs a new `Murmur3Builder` that seeds every hasher with `seed`.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::Murmur3Builder;
    ///
    /// let hash_builder = Murmur3Builder::with_seed(42);
    /// assert_eq!(hash_builder.seed(), 42);
    /// ```
    pub fn with_seed(seed: u64) -> Self {
        Murmur3Builder { seed }
    }

    /// Returns the seed handed to every hasher.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for Murmur3Builder {
    fn default() -> Self {
        Self::with_seed(DEFAULT_MURMUR3_SEED)
    }
}

impl BuildHasher for Murmur3Builder {
    type Hasher = Murmur3Hasher;

    #[inline]
    fn build_hasher(&self) -> Murmur3Hasher {
        Murmur3Hasher::with_seed(self.seed)
    }
}

/// A SipHash-1-3 hash builder, usable in place of [`Murmur3Builder`].
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy)]
pub struct SipHasherBuilder {
    k0: u64,
    k1: u64,
    hasher: SipHasher,
}

impl SipHasherBuilder {
    /// Constructs a new `SipHasherBuilder` that uses the thread-local RNG to seed itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::SipHasherBuilder;
    ///
    /// let hash_builder = SipHasherBuilder::from_entropy();
    /// ```
    pub fn from_entropy() -> Self {
        let mut rng = rand::thread_rng();
        Self::from_seed(rng.gen(), rng.gen())
    }

    /// Constructs a new `SipHasherBuilder` that is seeded with the given keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::SipHasherBuilder;
    ///
    /// let hash_builder = SipHasherBuilder::from_seed(0, 0);
    /// ```
    pub fn from_seed(k0: u64, k1: u64) -> Self {
        SipHasherBuilder {
            k0,
            k1,
            hasher: SipHasher::new_with_keys(k0, k1),
        }
    }
}

impl fmt::Debug for SipHasherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipHasherBuilder")
            .field("k0", &self.k0)
            .field("k1", &self.k1)
            .finish()
    }
}

impl cmp::PartialEq for SipHasherBuilder {
    fn eq(&self, other: &SipHasherBuilder) -> bool {
        self.k0 == other.k0 && self.k1 == other.k1
    }
}

impl BuildHasher for SipHasherBuilder {
    type Hasher = SipHasher;

    #[inline]
    fn build_hasher(&self) -> SipHasher {
        self.hasher
    }
}

/// Digests `bytes` as-is, without the length prefix `Hash for [u8]` would add.
#[inline]
pub(crate) fn hash64(hash_builder: &impl BuildHasher, bytes: &[u8]) -> u64 {
    let mut hasher = hash_builder.build_hasher();
    hasher.write(bytes);
    hasher.finish()
}
