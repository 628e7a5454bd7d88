//! Fixed-length list of bits packed into 64-bit words.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::mem;

const WORD_BIT_COUNT: u64 = (mem::size_of::<u64>() * 8) as u64;

/// A fixed-length list of bits implemented using a `Vec<u64>`.
///
/// Bits can only be set, never cleared, and the length never changes after construction. Bit
/// `i` lives in bit `i % 64` of word `i / 64`.
///
/// # Examples
///
/// ```
/// use block_bloom::bit_set::BitSet;
///
/// let mut bs = BitSet::new(2);
///
/// bs.set(0);
/// bs.set(65);
/// assert!(bs.get(0));
/// assert!(bs.get(65));
/// assert!(!bs.get(1));
/// assert_eq!(bs.words(), &[1, 2]);
///
/// let mut other = BitSet::new(2);
/// other.set(1);
/// bs.union(&other);
/// assert_eq!(bs.words(), &[3, 2]);
/// assert_eq!(bs.count_ones(), 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Constructs a new `BitSet` with `word_count` words. All bits are initialized to false.
    pub fn new(word_count: usize) -> Self {
        BitSet {
            words: vec![0; word_count],
        }
    }

    /// Constructs a `BitSet` that takes ownership of `words` as its backing storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bit_set::BitSet;
    ///
    /// let bs = BitSet::from_words(vec![0b101]);
    /// assert!(bs.get(0));
    /// assert!(!bs.get(1));
    /// assert!(bs.get(2));
    /// ```
    pub fn from_words(words: Vec<u64>) -> Self {
        BitSet { words }
    }

    /// Sets the bit at index `index`.
    ///
    /// Out-of-range indices are a caller bug: they panic in debug builds and on the slice bounds
    /// check in release builds.
    #[inline]
    pub fn set(&mut self, index: u64) {
        debug_assert!(index < self.bit_len(), "bit index {} out of range", index);
        self.words[(index / WORD_BIT_COUNT) as usize] |= 1 << (index % WORD_BIT_COUNT);
    }

    /// Returns `true` if the bit at index `index` is set.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get(&self, index: u64) -> bool {
        assert!(index < self.bit_len(), "bit index {} out of range", index);
        (self.words[(index / WORD_BIT_COUNT) as usize] >> (index % WORD_BIT_COUNT)) & 1 != 0
    }

    /// Sets `self` to the union of `self` and `other`.
    ///
    /// # Panics
    ///
    /// Panics if the two `BitSet` are of different lengths.
    pub fn union(&mut self, other: &Self) {
        assert_eq!(self.words.len(), other.words.len());
        for (x, y) in self.words.iter_mut().zip(other.words.iter()) {
            *x |= *y;
        }
    }

    /// Returns the backing words.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Returns the number of backing words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Returns the number of bits in the `BitSet`.
    pub fn bit_len(&self) -> u64 {
        self.words.len() as u64 * WORD_BIT_COUNT
    }

    /// Returns the number of set bits in the `BitSet`.
    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|word| u64::from(word.count_ones())).sum()
    }
}
