use crate::bloom::block_bloom_filter::{BlockBloomFilter, DEFAULT_FPP};
#[cfg(feature = "serde")]
use crate::error::Error;
use crate::error::Result;
use crate::key::BloomKey;
use crate::util::Murmur3Builder;
#[cfg(feature = "serde")]
use serde_crate::{de, Deserialize, Deserializer, Serialize};
use std::hash::BuildHasher;
use tracing::debug;

/// A growable, space-efficient probabilistic data structure to test for membership in a set.
///
/// A dynamic bloom filter is a matrix of [`BlockBloomFilter`] rows that all share the same
/// capacity and false positive probability. Only the last row accepts inserts; once it has
/// recorded `row_capacity` inserts a fresh row is appended and earlier rows are never written
/// again. An element is reported as present if any row reports it, so there are still no false
/// negatives, but the false positive probability grows with the number of rows towards
/// `1 - (1 - fpp)^rows`. Workloads that keep growing are better served by rebuilding a larger
/// filter.
///
/// Inserts are counted, not deduplicated: inserting the same element twice uses two slots of the
/// active row.
///
/// # Examples
///
/// ```
/// use block_bloom::bloom::DynamicBloomFilter;
///
/// # fn main() -> Result<(), block_bloom::Error> {
/// let mut filter = DynamicBloomFilter::new(100, 0.05)?;
///
/// for i in 0..150 {
///     filter.add_long(i);
/// }
///
/// assert!(filter.test_long(0));
/// assert!(filter.test_long(149));
/// assert_eq!(filter.row_count(), 2);
/// assert_eq!(filter.bitset_size(), 2 * 1024);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(crate = "serde_crate"))]
pub struct DynamicBloomFilter<B = Murmur3Builder> {
    matrix: Vec<BlockBloomFilter<B>>,
    row_capacity: u64,
    current_row_records: u64,
}

impl DynamicBloomFilter {
    /// Constructs a new, empty `DynamicBloomFilter` whose rows hold `row_capacity` items each at
    /// a false positive probability of `fpp`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] under the same conditions as
    /// [`BlockBloomFilter::new`].
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::DynamicBloomFilter;
    ///
    /// let filter = DynamicBloomFilter::new(100, 0.01).unwrap();
    /// assert_eq!(filter.row_count(), 1);
    /// ```
    pub fn new(row_capacity: u64, fpp: f64) -> Result<Self> {
        Self::with_hasher(row_capacity, fpp, Murmur3Builder::default())
    }

    /// Constructs a new, empty `DynamicBloomFilter` whose rows hold `row_capacity` items each at
    /// the default false positive probability of [`DEFAULT_FPP`].
    pub fn with_row_capacity(row_capacity: u64) -> Result<Self> {
        Self::new(row_capacity, DEFAULT_FPP)
    }
}

impl<B> DynamicBloomFilter<B>
where
    B: BuildHasher + Clone,
{
    /// Constructs a new, empty `DynamicBloomFilter` whose rows hold `row_capacity` items each at
    /// a false positive probability of `fpp`, and hash with `hash_builder`.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::DynamicBloomFilter;
    /// use block_bloom::SipHasherBuilder;
    ///
    /// let filter =
    ///     DynamicBloomFilter::with_hasher(100, 0.01, SipHasherBuilder::from_seed(0, 0)).unwrap();
    /// ```
    pub fn with_hasher(row_capacity: u64, fpp: f64, hash_builder: B) -> Result<Self> {
        Ok(DynamicBloomFilter {
            matrix: vec![BlockBloomFilter::with_hasher(
                row_capacity,
                fpp,
                hash_builder,
            )?],
            row_capacity,
            current_row_records: 0,
        })
    }

    fn add_row(&mut self) {
        let row = self
            .matrix
            .first()
            .expect("Expected non-empty matrix.")
            .empty_like();
        self.matrix.push(row);
        self.current_row_records = 0;
        debug!(
            row = self.matrix.len() - 1,
            row_capacity = self.row_capacity,
            fpp = self.false_positive_probability(),
            "appended dynamic bloom filter row"
        );
    }

    /// Returns the row that accepts the next insert, appending one if the last row is full.
    fn active_row(&mut self) -> &mut BlockBloomFilter<B> {
        if self.current_row_records >= self.row_capacity {
            self.add_row();
        }
        self.matrix.last_mut().expect("Expected non-empty matrix.")
    }

    /// Inserts an element into the active row of the dynamic bloom filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::DynamicBloomFilter;
    ///
    /// let mut filter = DynamicBloomFilter::new(100, 0.01).unwrap();
    ///
    /// filter.insert("foo");
    /// ```
    pub fn insert<K>(&mut self, key: &K)
    where
        K: BloomKey + ?Sized,
    {
        self.active_row().insert(key);
        self.current_row_records += 1;
    }

    /// Checks if an element is possibly in any row of the dynamic bloom filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::DynamicBloomFilter;
    ///
    /// let mut filter = DynamicBloomFilter::new(100, 0.01).unwrap();
    ///
    /// assert!(!filter.contains("foo"));
    /// filter.insert("foo");
    /// assert!(filter.contains("foo"));
    /// ```
    pub fn contains<K>(&self, key: &K) -> bool
    where
        K: BloomKey + ?Sized,
    {
        self.matrix.iter().any(|row| row.contains(key))
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

    /// Returns the total number of bits across all rows.
    pub fn bitset_size(&self) -> u64 {
        self.matrix.iter().map(|row| row.num_bits()).sum()
    }

    /// Returns the false positive probability each row was configured with. This is not the
    /// probability of the whole matrix; see [`DynamicBloomFilter::effective_fpp`].
    pub fn false_positive_probability(&self) -> f64 {
        self.matrix
            .first()
            .expect("Expected non-empty matrix.")
            .false_positive_probability()
    }

    /// Returns the false positive probability of the matrix if every row were filled to
    /// capacity: `1 - (1 - fpp)^rows`.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_bloom::bloom::DynamicBloomFilter;
    ///
    /// let mut filter = DynamicBloomFilter::new(10, 0.05).unwrap();
    /// assert!((filter.effective_fpp() - 0.05).abs() < 1e-12);
    ///
    /// for i in 0..11 {
    ///     filter.add_int(i);
    /// }
    /// assert!((filter.effective_fpp() - (1.0 - 0.95 * 0.95)).abs() < 1e-12);
    /// ```
    pub fn effective_fpp(&self) -> f64 {
        1.0 - self
            .matrix
            .iter()
            .map(|row| 1.0 - row.false_positive_probability())
            .product::<f64>()
    }

    /// Returns the rows of the dynamic bloom filter, oldest first. The last row is the active
    /// one.
    pub fn matrix(&self) -> &[BlockBloomFilter<B>] {
        &self.matrix
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.matrix.len()
    }

    /// Returns the number of inserts each row accepts before a new row is appended.
    pub fn row_capacity(&self) -> u64 {
        self.row_capacity
    }

    /// Returns the number of inserts recorded by the active row.
    pub fn current_row_records(&self) -> u64 {
        self.current_row_records
    }

    /// Returns the number of inserts recorded across all rows.
    pub fn insert_count(&self) -> u64 {
        (self.matrix.len() as u64 - 1) * self.row_capacity + self.current_row_records
    }

    /// Returns a reference to the hash builder shared by every row.
    pub fn hash_builder(&self) -> &B {
        self.matrix
            .first()
            .expect("Expected non-empty matrix.")
            .hash_builder()
    }
}

#[cfg(feature = "serde")]
fn check_rows<B>(
    matrix: &[BlockBloomFilter<B>],
    row_capacity: u64,
    current_row_records: u64,
) -> Result<()>
where
    B: BuildHasher,
{
    let first = matrix
        .first()
        .ok_or_else(|| Error::InvalidData(String::from("dynamic bloom filter has no rows")))?;
    if current_row_records > row_capacity {
        return Err(Error::InvalidData(format!(
            "active row holds {} records, more than its capacity of {}",
            current_row_records, row_capacity
        )));
    }
    let mismatch = matrix.iter().position(|row| {
        row.expected_num_entries() != row_capacity
            || row.false_positive_probability().to_bits()
                != first.false_positive_probability().to_bits()
            || row.block_size() != first.block_size()
    });
    if let Some(index) = mismatch {
        let row = &matrix[index];
        return Err(Error::InvalidData(format!(
            "row {} holds {} entries at fpp {} with block size {}, expected {} entries at fpp {} \
             with block size {}",
            index,
            row.expected_num_entries(),
            row.false_positive_probability(),
            row.block_size(),
            row_capacity,
            first.false_positive_probability(),
            first.block_size()
        )));
    }
    Ok(())
}

/// Deserialized filters must have at least one row, and every row must share the configured
/// capacity, false positive probability and block size.
#[cfg(feature = "serde")]
impl<'de, B> Deserialize<'de> for DynamicBloomFilter<B>
where
    B: BuildHasher + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(
            crate = "serde_crate",
            rename = "DynamicBloomFilter",
            bound = "B: std::hash::BuildHasher + serde_crate::Deserialize<'de>"
        )]
        struct Fields<B> {
            matrix: Vec<BlockBloomFilter<B>>,
            row_capacity: u64,
            current_row_records: u64,
        }

        let fields = Fields::<B>::deserialize(deserializer)?;
        check_rows(&fields.matrix, fields.row_capacity, fields.current_row_records)
            .map_err(de::Error::custom)?;
        Ok(DynamicBloomFilter {
            matrix: fields.matrix,
            row_capacity: fields.row_capacity,
            current_row_records: fields.current_row_records,
        })
    }
}
