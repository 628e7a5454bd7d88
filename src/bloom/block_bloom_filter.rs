use crate::bit_set::BitSet;
use crate::error::{Error, Result};
use crate::key::BloomKey;
use crate::sizing;
use crate::util::{self, Murmur3Builder};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
#[cfg(feature = "serde")]
use serde_crate::{de, Deserialize, Deserializer, Serialize};
use std::cmp;
use std::convert::TryFrom;
use std::hash::BuildHasher;
use std::io::{Read, Write};
use std::ptr;
use tracing::{trace, warn};

/// False positive probability used when none is given.
pub const DEFAULT_FPP: f64 = 0.05;

/// Default number of 64-bit words per block: 512 bits, one cache line.
pub const DEFAULT_BLOCK_SIZE: usize = 8;

/// Largest supported number of 64-bit words per block.
pub const MAX_BLOCK_SIZE: usize = 8;

const BIT_OFFSET_MASK: i32 = 63;

const READ_CHUNK_WORDS: usize = 1 << 16;

/// A space-efficient probabilistic data structure to test for membership in a set, with all of
/// an element's bits confined to a single cache-line sized block.
///
/// The 64-bit digest of an element is split into two 32-bit halves `h1` and `h2`. Their sum picks
/// a block, and `h1 + (i + 1) * h2` for `i` in `1..=K` picks the `K` bits to set inside that
/// block: the low bits select a word of the block and the next six bits select a bit of that
/// word. Confining every probe to one block costs a slightly higher false positive probability
/// than a classic bloom filter of the same size, but an insert or a lookup touches one cache
/// line only. A lookup gathers the `K` bits into a per-word mask and checks the whole block in a
/// single branch-free pass.
///
/// Filters are sized from an expected number of entries `n` and a false positive probability
/// `fpp`; the bit array is then padded to a whole number of blocks.
///
/// # Examples
///
/// ```
/// use block_bloom::bloom::BlockBloomFilter;
///
/// # fn main() -> Result<(), block_bloom::Error> {
/// let mut filter = BlockBloomFilter::new(10_000, 0.05)?;
///
/// assert!(!filter.test_string("foo"));
/// filter.add_string("foo");
/// assert!(filter.test_string("foo"));
///
/// filter.insert(&42i64);
/// assert!(filter.contains(&42i64));
///
/// assert_eq!(filter.size_in_bytes(), 7808);
/// assert_eq!(filter.num_hash_functions(), 4);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(crate = "serde_crate"))]
pub struct BlockBloomFilter<B = Murmur3Builder> {
    bit_set: BitSet,
    expected_entries: u64,
    fpp: f64,
    hasher_count: u32,
    block_size: usize,
    block_size_bits: u32,
    block_count: usize,
    hash_builder: B,
}

impl BlockBloomFilter {
    /// Constructs a new, empty `BlockBloomFilter` sized for `expected_entries` items at a false
    /// positive probability of `fpp`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `expected_entries` is zero or does not fit in an
    /// `i64`, or if `fpp` is not strictly between 0 and 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// assert!(BlockBloomFilter::new(100, 0.01).is_ok());
    /// assert!(BlockBloomFilter::new(0, 0.01).is_err());
    /// assert!(BlockBloomFilter::new(100, 1.0).is_err());
    /// ```
    pub fn new(expected_entries: u64, fpp: f64) -> Result<Self> {
        Self::with_hasher(expected_entries, fpp, Murmur3Builder::default())
    }

    /// Constructs a new, empty `BlockBloomFilter` sized for `expected_entries` items at the
    /// default false positive probability of [`DEFAULT_FPP`].
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::{BlockBloomFilter, DEFAULT_FPP};
    ///
    /// let filter = BlockBloomFilter::with_expected_entries(100).unwrap();
    /// assert_eq!(filter.false_positive_probability(), DEFAULT_FPP);
    /// ```
    pub fn with_expected_entries(expected_entries: u64) -> Result<Self> {
        Self::new(expected_entries, DEFAULT_FPP)
    }

    /// Reconstructs a filter from the output of [`BlockBloomFilter::serialize`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if the header is missing or out of range, or if the number
    /// of words does not match the shape implied by the header.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// # fn main() -> Result<(), block_bloom::Error> {
    /// let mut filter = BlockBloomFilter::new(100, 0.01)?;
    /// filter.add_long(7);
    ///
    /// let restored = BlockBloomFilter::from_serialized(&filter.serialize())?;
    /// assert!(restored.test_long(7));
    /// assert_eq!(restored, filter);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_serialized(serialized: &[i64]) -> Result<Self> {
        Self::from_serialized_with_hasher(serialized, DEFAULT_BLOCK_SIZE, Murmur3Builder::default())
    }

    /// Reads a filter written by [`BlockBloomFilter::write_to`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the reader fails or ends early, and [`Error::InvalidData`] under
    /// the same conditions as [`BlockBloomFilter::from_serialized`].
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        Self::read_from_with_hasher(reader, DEFAULT_BLOCK_SIZE, Murmur3Builder::default())
    }
}

impl<B> BlockBloomFilter<B>
where
    B: BuildHasher,
{
    /// Constructs a new, empty `BlockBloomFilter` sized for `expected_entries` items at a false
    /// positive probability of `fpp`, hashing with `hash_builder`.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    /// use block_bloom::SipHasherBuilder;
    ///
    /// let filter =
    ///     BlockBloomFilter::with_hasher(100, 0.01, SipHasherBuilder::from_seed(0, 0)).unwrap();
    /// ```
    pub fn with_hasher(expected_entries: u64, fpp: f64, hash_builder: B) -> Result<Self> {
        Self::with_block_size_and_hasher(expected_entries, fpp, DEFAULT_BLOCK_SIZE, hash_builder)
    }

    /// Constructs a new, empty `BlockBloomFilter` whose blocks are `block_size` words long.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] under the same conditions as
    /// [`BlockBloomFilter::new`], or if `block_size` is not a power of two no larger than
    /// [`MAX_BLOCK_SIZE`].
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    /// use block_bloom::Murmur3Builder;
    ///
    /// let filter =
    ///     BlockBloomFilter::with_block_size_and_hasher(100, 0.05, 4, Murmur3Builder::default())
    ///         .unwrap();
    /// assert_eq!(filter.block_size(), 4);
    /// assert_eq!(filter.block_count(), 3);
    /// ```
    pub fn with_block_size_and_hasher(
        expected_entries: u64,
        fpp: f64,
        block_size: usize,
        hash_builder: B,
    ) -> Result<Self> {
        let (word_count, hasher_count) = Self::shape(expected_entries, fpp, block_size)?;
        Ok(Self::from_parts(
            BitSet::new(word_count),
            expected_entries,
            fpp,
            hasher_count,
            block_size,
            hash_builder,
        ))
    }

    /// Reconstructs a filter from the output of [`BlockBloomFilter::serialize`], for a filter
    /// that was built with `block_size` words per block and `hash_builder`.
    pub fn from_serialized_with_hasher(
        serialized: &[i64],
        block_size: usize,
        hash_builder: B,
    ) -> Result<Self> {
        if serialized.len() < 2 {
            return Err(Error::InvalidData(format!(
                "expected at least 2 header entries, got {}",
                serialized.len()
            )));
        }
        let (expected_entries, fpp) = Self::decode_header(serialized[0], serialized[1])?;
        let words = &serialized[2..];
        let hasher_count = Self::check_shape(expected_entries, fpp, block_size, words.len())?;
        Ok(Self::from_parts(
            BitSet::from_words(words.iter().map(|word| *word as u64).collect()),
            expected_entries,
            fpp,
            hasher_count,
            block_size,
            hash_builder,
        ))
    }

    /// Reads a filter written by [`BlockBloomFilter::write_to`], for a filter that was built with
    /// `block_size` words per block and `hash_builder`.
    pub fn read_from_with_hasher<R: Read>(
        mut reader: R,
        block_size: usize,
        hash_builder: B,
    ) -> Result<Self> {
        let len = reader.read_u64::<LittleEndian>()?;
        if len < 2 {
            return Err(Error::InvalidData(format!(
                "expected at least 2 header entries, got {}",
                len
            )));
        }
        let word_count = usize::try_from(len - 2).map_err(|_| {
            Error::InvalidData(format!("{} words do not fit in memory", len - 2))
        })?;
        let expected_entries = reader.read_i64::<LittleEndian>()?;
        let fpp_bits = reader.read_i64::<LittleEndian>()?;
        let (expected_entries, fpp) = Self::decode_header(expected_entries, fpp_bits)?;
        let hasher_count = Self::check_shape(expected_entries, fpp, block_size, word_count)?;

        // Grows with the words actually read, so a truncated stream fails before the whole
        // declared length is allocated.
        let mut words = Vec::with_capacity(cmp::min(word_count, READ_CHUNK_WORDS));
        while words.len() < word_count {
            let start = words.len();
            words.resize(cmp::min(word_count, start + READ_CHUNK_WORDS), 0);
            reader.read_u64_into::<LittleEndian>(&mut words[start..])?;
        }
        Ok(Self::from_parts(
            BitSet::from_words(words),
            expected_entries,
            fpp,
            hasher_count,
            block_size,
            hash_builder,
        ))
    }

    /// Validates construction arguments and returns the padded word count and the number of hash
    /// functions, without allocating.
    fn shape(expected_entries: u64, fpp: f64, block_size: usize) -> Result<(usize, u32)> {
        if expected_entries == 0 || expected_entries > i64::max_value() as u64 {
            return Err(Error::InvalidArgument(format!(
                "expected entries must be in 1..={}, got {}",
                i64::max_value(),
                expected_entries
            )));
        }
        if !(fpp > 0.0 && fpp < 1.0) {
            return Err(Error::InvalidArgument(format!(
                "false positive probability must be > 0.0 and < 1.0, got {}",
                fpp
            )));
        }
        if !block_size.is_power_of_two() || block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidArgument(format!(
                "block size must be a power of two no larger than {}, got {}",
                MAX_BLOCK_SIZE, block_size
            )));
        }

        let num_bits = sizing::optimal_num_of_bits(expected_entries, fpp);
        let hasher_count = sizing::optimal_num_of_hash_functions(expected_entries, num_bits);
        let word_count = num_bits / 64 + u64::from(num_bits % 64 != 0);
        // Always pads, so an already aligned word count gains one whole block.
        let word_count = usize::try_from(word_count)
            .ok()
            .and_then(|word_count| word_count.checked_add(block_size - word_count % block_size))
            .filter(|word_count| (*word_count as u64).checked_mul(64).is_some())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{} entries at fpp {} need more bits than can be addressed",
                    expected_entries, fpp
                ))
            })?;
        Ok((word_count, hasher_count))
    }

    fn decode_header(expected_entries: i64, fpp_bits: i64) -> Result<(u64, f64)> {
        if expected_entries <= 0 {
            return Err(Error::InvalidData(format!(
                "expected entries must be > 0, got {}",
                expected_entries
            )));
        }
        Ok((expected_entries as u64, f64::from_bits(fpp_bits as u64)))
    }

    /// Checks that `word_count` stored words match the shape implied by the header and returns
    /// the number of hash functions.
    fn check_shape(
        expected_entries: u64,
        fpp: f64,
        block_size: usize,
        word_count: usize,
    ) -> Result<u32> {
        let (expected_words, hasher_count) = Self::shape(expected_entries, fpp, block_size)
            .map_err(|err| match err {
                Error::InvalidArgument(msg) => Error::InvalidData(msg),
                err => err,
            })?;
        if word_count != expected_words {
            warn!(
                expected_entries = expected_entries,
                fpp = fpp,
                expected_words = expected_words,
                actual_words = word_count,
                "rejected serialized bloom filter"
            );
            return Err(Error::InvalidData(format!(
                "expected {} words for {} entries at fpp {}, got {}",
                expected_words, expected_entries, fpp, word_count
            )));
        }
        Ok(hasher_count)
    }

    fn from_parts(
        bit_set: BitSet,
        expected_entries: u64,
        fpp: f64,
        hasher_count: u32,
        block_size: usize,
        hash_builder: B,
    ) -> Self {
        trace!(
            expected_entries = expected_entries,
            fpp = fpp,
            num_bits = bit_set.bit_len(),
            hasher_count = hasher_count,
            block_size = block_size,
            "built block bloom filter"
        );
        BlockBloomFilter {
            block_count: bit_set.word_count() / block_size,
            bit_set,
            expected_entries,
            fpp,
            hasher_count,
            block_size,
            block_size_bits: block_size.trailing_zeros(),
            hash_builder,
        }
    }

    /// Returns an empty filter with the same shape and hash builder as `self`.
    pub(crate) fn empty_like(&self) -> Self
    where
        B: Clone,
    {
        BlockBloomFilter {
            bit_set: BitSet::new(self.bit_set.word_count()),
            expected_entries: self.expected_entries,
            fpp: self.fpp,
            hasher_count: self.hasher_count,
            block_size: self.block_size,
            block_size_bits: self.block_size_bits,
            block_count: self.block_count,
            hash_builder: self.hash_builder.clone(),
        }
    }

    #[inline]
    fn split_hash(hash: u64) -> (i32, i32) {
        (hash as i32, (hash >> 32) as i32)
    }

    /// Returns the index of the first word of the block `h1` and `h2` select.
    #[inline]
    fn block_offset(&self, h1: i32, h2: i32) -> usize {
        let mut first_hash = h1.wrapping_add(h2);
        if first_hash < 0 {
            first_hash = !first_hash;
        }
        (first_hash as usize % self.block_count) << self.block_size_bits
    }

    /// Returns the word within the block and the bit within that word of the `i`-th probe.
    #[inline]
    fn probe(&self, h1: i32, h2: i32, i: i32) -> (usize, u32) {
        let mut combined_hash = h1.wrapping_add((i + 1).wrapping_mul(h2));
        if combined_hash < 0 {
            combined_hash = !combined_hash;
        }
        let word_offset = (combined_hash & (self.block_size as i32 - 1)) as usize;
        let bit_pos = ((combined_hash >> self.block_size_bits) & BIT_OFFSET_MASK) as u32;
        (word_offset, bit_pos)
    }

    fn insert_hash(&mut self, hash: u64) {
        let (h1, h2) = Self::split_hash(hash);
        let block_offset = self.block_offset(h1, h2);
        for i in 1..=self.hasher_count as i32 {
            let (word_offset, bit_pos) = self.probe(h1, h2, i);
            let word_index = (block_offset + word_offset) as u64;
            self.bit_set.set(word_index * 64 + u64::from(bit_pos));
        }
    }

    fn contains_hash(&self, hash: u64) -> bool {
        let (h1, h2) = Self::split_hash(hash);
        let block_offset = self.block_offset(h1, h2);

        let mut masks = [0u64; MAX_BLOCK_SIZE];
        for i in 1..=self.hasher_count as i32 {
            let (word_offset, bit_pos) = self.probe(h1, h2, i);
            masks[word_offset] |= 1 << bit_pos;
        }

        let block = &self.bit_set.words()[block_offset..block_offset + self.block_size];
        let missing = block
            .iter()
            .zip(masks.iter())
            .fold(0, |missing, (word, mask)| missing | ((word & mask) ^ mask));
        missing == 0
    }

    /// Inserts an element into the filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// let mut filter = BlockBloomFilter::new(100, 0.01).unwrap();
    ///
    /// filter.insert("foo");
    /// filter.insert(&[1u8, 2, 3][..]);
    /// filter.insert(&1.5f64);
    /// ```
    pub fn insert<K>(&mut self, key: &K)
    where
        K: BloomKey + ?Sized,
    {
        let hash = key.with_bytes(|bytes| util::hash64(&self.hash_builder, bytes));
        self.insert_hash(hash);
    }

    /// Checks if an element is possibly in the filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// let mut filter = BlockBloomFilter::new(100, 0.01).unwrap();
    ///
    /// assert!(!filter.contains("foo"));
    /// filter.insert("foo");
    /// assert!(filter.contains("foo"));
    /// ```
    pub fn contains<K>(&self, key: &K) -> bool
    where
        K: BloomKey + ?Sized,
    {
        let hash = key.with_bytes(|bytes| util::hash64(&self.hash_builder, bytes));
        self.contains_hash(hash)
    }

    /// Inserts a byte sequence.
    pub fn add_bytes(&mut self, val: &[u8]) {
        self.insert(val)
    }

    /// Inserts a single byte.
    pub fn add_byte(&mut self, val: i8) {
        self.insert(&val)
    }

    /// Inserts a 32-bit integer.
    pub fn add_int(&mut self, val: i32) {
        self.insert(&val)
    }

    /// Inserts a 64-bit integer.
    pub fn add_long(&mut self, val: i64) {
        self.insert(&val)
    }

    /// Inserts a 32-bit float by its bit pattern.
    pub fn add_float(&mut self, val: f32) {
        self.insert(&val)
    }

    /// Inserts a 64-bit float by its bit pattern.
    pub fn add_double(&mut self, val: f64) {
        self.insert(&val)
    }

    /// Inserts the UTF-8 bytes of a string.
    pub fn add_string(&mut self, val: &str) {
        self.insert(val)
    }

    /// Checks if a byte sequence is possibly in the filter.
    pub fn test_bytes(&self, val: &[u8]) -> bool {
        self.contains(val)
    }

    /// Checks if a single byte is possibly in the filter.
    pub fn test_byte(&self, val: i8) -> bool {
        self.contains(&val)
    }

    /// Checks if a 32-bit integer is possibly in the filter.
    pub fn test_int(&self, val: i32) -> bool {
        self.contains(&val)
    }

    /// Checks if a 64-bit integer is possibly in the filter.
    pub fn test_long(&self, val: i64) -> bool {
        self.contains(&val)
    }

    /// Checks if a 32-bit float is possibly in the filter.
    pub fn test_float(&self, val: f32) -> bool {
        self.contains(&val)
    }

    /// Checks if a 64-bit float is possibly in the filter.
    pub fn test_double(&self, val: f64) -> bool {
        self.contains(&val)
    }

    /// Checks if a string is possibly in the filter.
    pub fn test_string(&self, val: &str) -> bool {
        self.contains(val)
    }

    /// Returns `true` if `other` is a different filter with the same bit length and the same
    /// number of hash functions, which is what [`BlockBloomFilter::merge`] requires.
    ///
    /// Both filters must also hash with equally seeded hash builders for a merge to be
    /// meaningful; that is not checked.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// let a = BlockBloomFilter::new(100, 0.05).unwrap();
    /// let b = BlockBloomFilter::new(100, 0.05).unwrap();
    /// let c = BlockBloomFilter::new(10_000, 0.05).unwrap();
    ///
    /// assert!(a.is_compatible(&b));
    /// assert!(!a.is_compatible(&a));
    /// assert!(!a.is_compatible(&c));
    /// ```
    pub fn is_compatible(&self, other: &Self) -> bool {
        !ptr::eq(self, other) && self.same_shape(other)
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.num_bits() == other.num_bits() && self.hasher_count == other.hasher_count
    }

    /// Sets `self` to the union of `self` and `other`: afterwards every element of either filter
    /// tests positive in `self`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatibleFilters`] and leaves `self` untouched if the filters differ
    /// in bit length or number of hash functions.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// # fn main() -> Result<(), block_bloom::Error> {
    /// let mut a = BlockBloomFilter::new(100, 0.05)?;
    /// let mut b = BlockBloomFilter::new(100, 0.05)?;
    /// a.add_string("foo");
    /// b.add_string("bar");
    ///
    /// a.merge(&b)?;
    /// assert!(a.test_string("foo"));
    /// assert!(a.test_string("bar"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if !self.same_shape(other) {
            warn!(
                bits = self.num_bits(),
                hashes = self.hasher_count,
                other_bits = other.num_bits(),
                other_hashes = other.hasher_count,
                "rejected merge of incompatible bloom filters"
            );
            return Err(Error::IncompatibleFilters {
                bits: self.num_bits(),
                hashes: self.hasher_count,
                other_bits: other.num_bits(),
                other_hashes: other.hasher_count,
            });
        }
        self.bit_set.union(&other.bit_set);
        Ok(())
    }

    /// Returns the filter as `[n, fpp bits, word 0, word 1, ...]`: the expected number of
    /// entries, the false positive probability reinterpreted as an `i64`, then every backing
    /// word.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// let filter = BlockBloomFilter::new(100, 0.05).unwrap();
    /// let serialized = filter.serialize();
    ///
    /// assert_eq!(serialized[0], 100);
    /// assert_eq!(f64::from_bits(serialized[1] as u64), 0.05);
    /// assert_eq!(serialized.len(), 2 + 16);
    /// ```
    pub fn serialize(&self) -> Vec<i64> {
        let mut serialized = Vec::with_capacity(2 + self.bit_set.word_count());
        serialized.push(self.expected_entries as i64);
        serialized.push(self.fpp.to_bits() as i64);
        serialized.extend(self.bit_set.words().iter().map(|word| *word as i64));
        serialized
    }

    /// Writes the output of [`BlockBloomFilter::serialize`] to `writer` as little-endian 64-bit
    /// integers, preceded by the number of integers.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// # fn main() -> Result<(), block_bloom::Error> {
    /// let mut filter = BlockBloomFilter::new(100, 0.05)?;
    /// filter.add_int(3);
    ///
    /// let mut buf = Vec::new();
    /// filter.write_to(&mut buf)?;
    /// assert_eq!(buf.len(), 8 * (1 + 2 + 16));
    ///
    /// let restored = BlockBloomFilter::read_from(&buf[..])?;
    /// assert_eq!(restored, filter);
    /// # Ok(())
    /// # }
    /// ```
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_u64::<LittleEndian>(2 + self.bit_set.word_count() as u64)?;
        writer.write_i64::<LittleEndian>(self.expected_entries as i64)?;
        writer.write_i64::<LittleEndian>(self.fpp.to_bits() as i64)?;
        for word in self.bit_set.words() {
            writer.write_u64::<LittleEndian>(*word)?;
        }
        Ok(())
    }

    /// Returns the size of the bit array in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.num_bits() / 8
    }

    /// Returns the number of bits in the filter, padding included.
    pub fn num_bits(&self) -> u64 {
        self.bit_set.bit_len()
    }

    /// Returns the number of hash functions used by the filter.
    pub fn num_hash_functions(&self) -> u32 {
        self.hasher_count
    }

    /// Returns the false positive probability the filter was configured with.
    pub fn false_positive_probability(&self) -> f64 {
        self.fpp
    }

    /// Returns the number of entries the filter was sized for.
    pub fn expected_num_entries(&self) -> u64 {
        self.expected_entries
    }

    /// Returns the backing words of the filter.
    pub fn bit_set(&self) -> &[u64] {
        self.bit_set.words()
    }

    /// Returns the number of 64-bit words per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the number of blocks.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Returns the number of set bits in the filter.
    pub fn count_ones(&self) -> u64 {
        self.bit_set.count_ones()
    }

    /// Returns the estimated false positive probability of the filter from its fill ratio. This
    /// value will increase as more items are added.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::BlockBloomFilter;
    ///
    /// let mut filter = BlockBloomFilter::new(100, 0.01).unwrap();
    /// assert!(filter.estimated_fpp() < std::f64::EPSILON);
    ///
    /// filter.add_string("foo");
    /// assert!(filter.estimated_fpp() > std::f64::EPSILON);
    /// assert!(filter.estimated_fpp() < 0.01);
    /// ```
    pub fn estimated_fpp(&self) -> f64 {
        let single_fpp = self.count_ones() as f64 / self.num_bits() as f64;
        single_fpp.powi(self.hasher_count as i32)
    }

    /// Returns a reference to the filter's hash builder.
    pub fn hash_builder(&self) -> &B {
        &self.hash_builder
    }
}

/// Deserialized filters are checked like [`BlockBloomFilter::from_serialized_with_hasher`]: the
/// stored words must match the shape implied by the stored `n`, `fpp` and block size.
#[cfg(feature = "serde")]
impl<'de, B> Deserialize<'de> for BlockBloomFilter<B>
where
    B: BuildHasher + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(crate = "serde_crate", rename = "BlockBloomFilter")]
        struct Fields<B> {
            bit_set: BitSet,
            expected_entries: u64,
            fpp: f64,
            hasher_count: u32,
            block_size: usize,
            block_size_bits: u32,
            block_count: usize,
            hash_builder: B,
        }

        let fields = Fields::<B>::deserialize(deserializer)?;
        let hasher_count = Self::check_shape(
            fields.expected_entries,
            fields.fpp,
            fields.block_size,
            fields.bit_set.word_count(),
        )
        .map_err(de::Error::custom)?;
        let filter = Self::from_parts(
            fields.bit_set,
            fields.expected_entries,
            fields.fpp,
            hasher_count,
            fields.block_size,
            fields.hash_builder,
        );
        if filter.hasher_count != fields.hasher_count
            || filter.block_size_bits != fields.block_size_bits
            || filter.block_count != fields.block_count
        {
            return Err(de::Error::custom(Error::InvalidData(format!(
                "stored {} hash functions, {} block size bits and {} blocks, expected {}, {} and {}",
                fields.hasher_count,
                fields.block_size_bits,
                fields.block_count,
                filter.hasher_count,
                filter.block_size_bits,
                filter.block_count
            ))));
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockBloomFilter, DEFAULT_FPP};
    use crate::error::Error;
    use crate::sizing;
    use crate::util::tests::sip_hash_builder;
    use crate::Murmur3Builder;
    use byteorder::{LittleEndian, WriteBytesExt};
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    const COUNT: usize = 100;

    fn filter() -> BlockBloomFilter {
        BlockBloomFilter::with_expected_entries(10_000).unwrap()
    }

    #[test]
    fn test_illegal_arguments() {
        for &(n, fpp) in &[(0, 0.0), (0, 0.1), (1, 0.0), (1, 1.0), (1, -1.0), (1, f64::NAN)] {
            match BlockBloomFilter::new(n, fpp) {
                Err(Error::InvalidArgument(_)) => {}
                other => panic!("expected invalid argument for ({}, {}), got {:?}", n, fpp, other),
            }
        }
        assert!(BlockBloomFilter::new(i64::max_value() as u64 + 1, 0.1).is_err());
    }

    #[test]
    fn test_illegal_block_size() {
        for &block_size in &[0, 3, 16] {
            assert!(BlockBloomFilter::with_block_size_and_hasher(
                100,
                0.05,
                block_size,
                Murmur3Builder::default()
            )
            .is_err());
        }
    }

    #[test]
    fn test_shape() {
        let filter = filter();
        assert_eq!(filter.expected_num_entries(), 10_000);
        assert_eq!(filter.false_positive_probability(), DEFAULT_FPP);
        assert_eq!(filter.num_hash_functions(), 4);
        assert_eq!(filter.num_bits(), 62464);
        assert_eq!(filter.size_in_bytes(), 7808);
        assert_eq!(filter.bit_set().len(), 976);
        assert_eq!(filter.block_size(), 8);
        assert_eq!(filter.block_count(), 122);
    }

    #[test]
    fn test_block_padding() {
        // 1 entry at fpp 0.05 needs 6 bits, so one word before padding.
        let filter = BlockBloomFilter::new(1, 0.05).unwrap();
        assert_eq!(filter.bit_set().len(), 8);
        assert_eq!(filter.block_count(), 1);

        // One word is already aligned to one-word blocks and still gains a block.
        let hash_builder = Murmur3Builder::default();
        let filter = BlockBloomFilter::with_block_size_and_hasher(1, 0.05, 1, hash_builder).unwrap();
        assert_eq!(filter.bit_set().len(), 2);
        assert_eq!(filter.block_count(), 2);
    }

    #[test]
    fn test_insert_sets_hash_count_bits_in_one_block() {
        let mut filter = BlockBloomFilter::new(100, 0.05).unwrap();
        assert_eq!(filter.num_hash_functions(), 4);
        filter.add_string("foo");
        assert_eq!(filter.count_ones(), 4);
        assert!(filter.test_string("foo"));
        assert!(!filter.test_string("bar"));

        let touched = filter
            .bit_set()
            .iter()
            .enumerate()
            .filter(|(_, word)| **word != 0)
            .map(|(index, _)| index / filter.block_size())
            .collect::<Vec<_>>();
        assert!(touched.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_bytes() {
        let mut bf = filter();
        let val: &[u8] = &[1, 2, 3];
        let val1: &[u8] = &[1, 2, 3, 4];
        let val2: &[u8] = &[1, 2, 3, 4, 5];
        let val3: &[u8] = &[1, 2, 3, 4, 5, 6];

        assert!(!bf.test_bytes(val));
        assert!(!bf.test_bytes(val1));
        assert!(!bf.test_bytes(val2));
        assert!(!bf.test_bytes(val3));
        bf.add_bytes(val);
        assert!(bf.test_bytes(val));
        assert!(!bf.test_bytes(val1));
        assert!(!bf.test_bytes(val2));
        assert!(!bf.test_bytes(val3));
        bf.add_bytes(val1);
        assert!(bf.test_bytes(val));
        assert!(bf.test_bytes(val1));
        assert!(!bf.test_bytes(val2));
        assert!(!bf.test_bytes(val3));
        bf.add_bytes(val2);
        assert!(bf.test_bytes(val));
        assert!(bf.test_bytes(val1));
        assert!(bf.test_bytes(val2));
        assert!(!bf.test_bytes(val3));
        bf.add_bytes(val3);
        assert!(bf.test_bytes(val));
        assert!(bf.test_bytes(val1));
        assert!(bf.test_bytes(val2));
        assert!(bf.test_bytes(val3));

        let mut rand_val = vec![0u8; COUNT];
        for i in 0..COUNT {
            for (j, byte) in rand_val.iter_mut().enumerate() {
                *byte = (i * 31 + j * 7) as u8;
            }
            bf.add_bytes(&rand_val);
        }
        // last value should be present
        assert!(bf.test_bytes(&rand_val));
        // most likely this value should not exist
        rand_val[..5].copy_from_slice(&[0; 5]);
        assert!(!bf.test_bytes(&rand_val));

        assert_eq!(bf.size_in_bytes(), 7808);
    }

    #[test]
    fn test_byte() {
        let mut bf = filter();
        let vals = [i8::min_value(), 1, 2, i8::max_value()];

        for (i, val) in vals.iter().enumerate() {
            assert!(vals[i..].iter().all(|val| !bf.test_byte(*val)));
            bf.add_byte(*val);
            assert!(vals[..=i].iter().all(|val| bf.test_byte(*val)));
        }

        let mut rand_val = 0;
        for i in 0..COUNT {
            rand_val = (i * 37 % 127) as i8;
            bf.add_byte(rand_val);
        }
        assert!(bf.test_byte(rand_val));
        assert!(!bf.test_byte(-120));

        assert_eq!(bf.size_in_bytes(), 7808);
    }

    #[test]
    fn test_int() {
        let mut bf = filter();
        let vals = [i32::min_value(), 1, 2, i32::max_value()];

        for (i, val) in vals.iter().enumerate() {
            assert!(vals[i..].iter().all(|val| !bf.test_int(*val)));
            bf.add_int(*val);
            assert!(vals[..=i].iter().all(|val| bf.test_int(*val)));
        }

        let mut rand_val = 0;
        for i in 0..COUNT as i32 {
            rand_val = i.wrapping_mul(0x9e37_79b9_u32 as i32);
            bf.add_int(rand_val);
        }
        assert!(bf.test_int(rand_val));
        assert!(!bf.test_int(-120));

        assert_eq!(bf.size_in_bytes(), 7808);
    }

    #[test]
    fn test_long() {
        let mut bf = filter();
        let vals = [i64::min_value(), 1, 2, i64::max_value()];

        for (i, val) in vals.iter().enumerate() {
            assert!(vals[i..].iter().all(|val| !bf.test_long(*val)));
            bf.add_long(*val);
            assert!(vals[..=i].iter().all(|val| bf.test_long(*val)));
        }

        let mut rand_val = 0;
        for i in 0..COUNT as i64 {
            rand_val = i.wrapping_mul(0x9e37_79b9_7f4a_7c15_u64 as i64);
            bf.add_long(rand_val);
        }
        assert!(bf.test_long(rand_val));
        assert!(!bf.test_long(-120));

        assert_eq!(bf.size_in_bytes(), 7808);
    }

    #[test]
    fn test_float() {
        let mut bf = filter();
        let vals = [f32::from_bits(1), 1.1, 2.2, std::f32::MAX];

        for (i, val) in vals.iter().enumerate() {
            assert!(vals[i..].iter().all(|val| !bf.test_float(*val)));
            bf.add_float(*val);
            assert!(vals[..=i].iter().all(|val| bf.test_float(*val)));
        }

        let mut rand_val = 0.0;
        for i in 0..COUNT {
            rand_val = i as f32 * 1.5;
            bf.add_float(rand_val);
        }
        assert!(bf.test_float(rand_val));
        assert!(!bf.test_float(-120.2));

        assert_eq!(bf.size_in_bytes(), 7808);
    }

    #[test]
    fn test_double() {
        let mut bf = filter();
        let vals = [f64::from_bits(1), 1.1, 2.2, std::f64::MAX];

        for (i, val) in vals.iter().enumerate() {
            assert!(vals[i..].iter().all(|val| !bf.test_double(*val)));
            bf.add_double(*val);
            assert!(vals[..=i].iter().all(|val| bf.test_double(*val)));
        }

        let mut rand_val = 0.0;
        for i in 0..COUNT {
            rand_val = i as f64 * 1.5;
            bf.add_double(rand_val);
        }
        assert!(bf.test_double(rand_val));
        assert!(!bf.test_double(-120.2));

        assert_eq!(bf.size_in_bytes(), 7808);
    }

    #[test]
    fn test_string() {
        let mut bf = filter();
        let vals = ["bloo", "bloom fil", "bloom filter", "cuckoo filter"];

        for (i, val) in vals.iter().enumerate() {
            assert!(vals[i..].iter().all(|val| !bf.test_string(val)));
            bf.add_string(val);
            assert!(vals[..=i].iter().all(|val| bf.test_string(val)));
        }

        let mut rand_val = String::new();
        for i in 0..COUNT {
            rand_val = (i * 7919).to_string();
            bf.add_string(&rand_val);
        }
        assert!(bf.test_string(&rand_val));
        assert!(!bf.test_string("-120"));

        assert_eq!(bf.size_in_bytes(), 7808);
    }

    #[test]
    fn test_typed_and_generic_agree() {
        let mut bf = filter();
        bf.add_long(17);
        bf.add_string("foo");
        bf.add_bytes(b"bar");

        assert!(bf.contains(&17i64));
        assert!(bf.contains("foo"));
        assert!(bf.contains(&String::from("foo")));
        assert!(bf.contains(&b"bar".to_vec()));
        assert!(bf.contains(&b"bar"[..]));
    }

    #[test]
    fn test_merge() {
        let mut bf = filter();
        let vals = ["bloo", "bloom fil", "bloom filter", "cuckoo filter"];
        vals.iter().for_each(|val| bf.add_string(val));

        let mut bf2 = filter();
        let vals2 = ["2_bloo", "2_bloom fil", "2_bloom filter", "2_cuckoo filter"];
        vals2.iter().for_each(|val| bf2.add_string(val));

        assert!(vals.iter().all(|val| bf.test_string(val)));
        assert!(vals2.iter().all(|val| !bf.test_string(val)));

        assert!(bf.is_compatible(&bf2));
        bf.merge(&bf2).unwrap();

        assert!(vals.iter().all(|val| bf.test_string(val)));
        assert!(vals2.iter().all(|val| bf.test_string(val)));
        assert!(bf2.is_compatible(&bf));
        assert!(vals.iter().all(|val| !bf2.test_string(val)));
    }

    #[test]
    fn test_merge_incompatible() {
        let mut bf = filter();
        bf.add_string("foo");
        let before = bf.clone();

        let mut other = BlockBloomFilter::new(100, 0.05).unwrap();
        other.add_string("bar");
        assert!(!bf.is_compatible(&other));

        match bf.merge(&other) {
            Err(Error::IncompatibleFilters {
                bits,
                hashes,
                other_bits,
                other_hashes,
            }) => {
                assert_eq!(bits, 62464);
                assert_eq!(hashes, 4);
                assert_eq!(other_bits, 1024);
                assert_eq!(other_hashes, 4);
            }
            other => panic!("expected incompatible filters, got {:?}", other),
        }
        assert_eq!(bf, before);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut bf = filter();
        for i in 0..1000 {
            bf.add_long(i);
        }

        let serialized = bf.serialize();
        assert_eq!(serialized.len(), 2 + 976);
        assert_eq!(serialized[0], 10_000);
        assert_eq!(serialized[1], DEFAULT_FPP.to_bits() as i64);

        let de_bf = BlockBloomFilter::from_serialized(&serialized).unwrap();
        assert_eq!(de_bf.expected_num_entries(), bf.expected_num_entries());
        assert_eq!(de_bf.num_bits(), bf.num_bits());
        assert_eq!(de_bf.num_hash_functions(), bf.num_hash_functions());
        assert_eq!(de_bf.bit_set(), bf.bit_set());
        assert!((0..1000).all(|i| de_bf.test_long(i)));
        assert_eq!(de_bf, bf);
    }

    #[test]
    fn test_deserialize_malformed() {
        let bf = filter();
        let serialized = bf.serialize();

        let cases = vec![
            vec![],
            vec![10_000],
            serialized[..serialized.len() - 1].to_vec(),
            [&serialized[..], &[0][..]].concat(),
            [&[0, serialized[1]][..], &serialized[2..]].concat(),
            [&[-5, serialized[1]][..], &serialized[2..]].concat(),
            [&[10_000, 1.5f64.to_bits() as i64][..], &serialized[2..]].concat(),
        ];
        for case in cases {
            match BlockBloomFilter::from_serialized(&case) {
                Err(Error::InvalidData(_)) => {}
                other => panic!("expected invalid data, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_unaddressable_size() {
        match BlockBloomFilter::new(i64::max_value() as u64, 1e-300) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {:?}", other),
        }

        let serialized = [i64::max_value(), 1e-300f64.to_bits() as i64, 0, 0];
        match BlockBloomFilter::from_serialized(&serialized) {
            Err(Error::InvalidData(_)) => {}
            other => panic!("expected invalid data, got {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_huge_header() {
        let expected_entries = 1_000_000_000_000_000_000i64;
        let fpp_bits = 0.05f64.to_bits() as i64;

        let mut serialized = vec![expected_entries, fpp_bits];
        serialized.extend_from_slice(&[0; 8]);
        match BlockBloomFilter::from_serialized(&serialized) {
            Err(Error::InvalidData(_)) => {}
            other => panic!("expected invalid data, got {:?}", other),
        }

        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(serialized.len() as u64).unwrap();
        for value in &serialized {
            buf.write_i64::<LittleEndian>(*value).unwrap();
        }
        match BlockBloomFilter::read_from(&buf[..]) {
            Err(Error::InvalidData(_)) => {}
            other => panic!("expected invalid data, got {:?}", other),
        }

        // A length consistent with the header, but the stream ends after it.
        let num_bits = sizing::optimal_num_of_bits(expected_entries as u64, 0.05);
        let word_count = (num_bits + 63) / 64;
        let word_count = word_count + 8 - word_count % 8;
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(2 + word_count).unwrap();
        buf.write_i64::<LittleEndian>(expected_entries).unwrap();
        buf.write_i64::<LittleEndian>(fpp_bits).unwrap();
        match BlockBloomFilter::read_from(&buf[..]) {
            Err(Error::Io(_)) => {}
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn test_bit_layout() {
        let mut bf = BlockBloomFilter::new(100, 0.05).unwrap();
        bf.add_long(0);
        bf.add_long(-1);
        bf.add_long(123_456_789);
        bf.add_long(i64::min_value());
        bf.add_string("hello world, bloom");

        let mut expected = vec![0u64; 16];
        expected[2] = 1_125_899_908_939_776;
        expected[6] = 274_877_906_952;
        expected[8] = 70_368_744_178_177;
        expected[10] = 1_048_576;
        expected[11] = 262_144;
        expected[12] = 1_162_183_790_559_232;
        expected[13] = 524_288;
        expected[14] = 8_796_093_153_412;
        expected[15] = 9_223_389_629_040_820_480;
        assert_eq!(bf.bit_set(), &expected[..]);

        let serialized = bf.serialize();
        assert_eq!(serialized[..2], [100, 0.05f64.to_bits() as i64]);
        assert!(serialized[2..]
            .iter()
            .zip(expected.iter())
            .all(|(word, expected)| *word as u64 == *expected));
    }

    #[test]
    fn test_write_read() {
        let mut bf = filter();
        bf.add_string("foo");

        let mut buf = Vec::new();
        bf.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 8 * (1 + 2 + 976));

        let de_bf = BlockBloomFilter::read_from(&buf[..]).unwrap();
        assert!(de_bf.test_string("foo"));
        assert_eq!(de_bf, bf);

        match BlockBloomFilter::read_from(&buf[..buf.len() - 8]) {
            Err(Error::Io(_)) => {}
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn test_block_sizes() {
        for &block_size in &[1, 2, 4, 8] {
            let mut bf = BlockBloomFilter::with_block_size_and_hasher(
                1000,
                0.05,
                block_size,
                Murmur3Builder::default(),
            )
            .unwrap();
            assert_eq!(bf.bit_set().len() % block_size, 0);
            for i in 0..1000 {
                bf.add_long(i);
            }
            assert!((0..1000).all(|i| bf.test_long(i)));

            let de_bf = BlockBloomFilter::from_serialized_with_hasher(
                &bf.serialize(),
                block_size,
                Murmur3Builder::default(),
            )
            .unwrap();
            assert_eq!(de_bf, bf);
        }
    }

    #[test]
    fn test_sip_hasher() {
        let mut bf = BlockBloomFilter::with_hasher(1000, 0.05, sip_hash_builder()).unwrap();
        for i in 0..1000 {
            bf.add_int(i);
        }
        assert!((0..1000).all(|i| bf.test_int(i)));
        assert_eq!(bf.hash_builder(), &sip_hash_builder());
    }

    #[test]
    fn test_estimated_fpp() {
        let mut bf = BlockBloomFilter::new(100, 0.05).unwrap();
        assert!(bf.estimated_fpp() < std::f64::EPSILON);

        bf.add_string("foo");

        let expected_fpp = (4f64 / 1024f64).powi(4);
        assert!((bf.estimated_fpp() - expected_fpp).abs() < std::f64::EPSILON);
    }

    fn check_fpp(size: i64, tolerance: f64) {
        let mut bf = BlockBloomFilter::with_expected_entries(size as u64).unwrap();
        for i in 0..size {
            bf.add_long(i);
        }
        for i in 0..size {
            assert!(bf.test_long(i));
        }

        let mut rng = XorShiftRng::seed_from_u64(123);
        let mut fp = 0;
        for _ in 0..size {
            let probe = i64::from(rng.gen::<i32>());
            // out of range probes
            if (probe > size || probe < 0) && bf.test_long(probe) {
                fp += 1;
            }
        }

        let actual_fpp = fp as f64 / size as f64;
        let expected_fpp = bf.false_positive_probability();
        assert!(actual_fpp > 0.0);
        assert!(
            actual_fpp < expected_fpp + tolerance,
            "observed fpp {} for an expected {}",
            actual_fpp,
            expected_fpp
        );
    }

    #[test]
    fn test_fpp_1k() {
        check_fpp(1000, 0.02);
    }

    #[test]
    fn test_fpp_10k() {
        check_fpp(10_000, 0.01);
    }

    #[test]
    fn test_fpp_100k() {
        check_fpp(100_000, 0.005);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_ser_de() {
        let mut filter = filter();
        filter.add_string("foo");

        let serialized_filter = bincode::serialize(&filter).unwrap();
        let de_filter: BlockBloomFilter = bincode::deserialize(&serialized_filter).unwrap();

        assert!(de_filter.test_string("foo"));
        assert_eq!(filter, de_filter);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_ser_de_rejects_inconsistent_fields() {
        let hash_builder = Murmur3Builder::default();
        let fields = (vec![0u64; 16], 100u64, 0.05f64, 4u32, 8usize, 3u32, 2usize, hash_builder);
        let de_filter: BlockBloomFilter =
            bincode::deserialize(&bincode::serialize(&fields).unwrap()).unwrap();
        assert_eq!(de_filter, BlockBloomFilter::new(100, 0.05).unwrap());

        let corrupted = vec![
            // block size above the maximum
            (vec![0u64; 16], 100u64, 0.05f64, 4u32, 16usize, 4u32, 1usize, hash_builder),
            // word count does not match (n, fpp)
            (vec![0u64; 8], 100u64, 0.05f64, 4u32, 8usize, 3u32, 1usize, hash_builder),
            // no blocks
            (vec![0u64; 16], 100u64, 0.05f64, 4u32, 8usize, 3u32, 0usize, hash_builder),
            // hash function count does not match (n, fpp)
            (vec![0u64; 16], 100u64, 0.05f64, 9u32, 8usize, 3u32, 2usize, hash_builder),
            // fpp out of range
            (vec![0u64; 16], 100u64, 1.5f64, 4u32, 8usize, 3u32, 2usize, hash_builder),
        ];
        for fields in corrupted {
            let serialized = bincode::serialize(&fields).unwrap();
            assert!(bincode::deserialize::<BlockBloomFilter>(&serialized).is_err());
        }
    }
}
