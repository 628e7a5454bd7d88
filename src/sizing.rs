//! Closed-form sizing of bloom filters.
//!
//! Both functions are pure and decide every filter's shape, so their integer outputs are part
//! of the serialized format: a filter rebuilt from `(n, fpp)` must come out with exactly the same
//! bit length and hash function count.

use std::cmp;
use std::f64::consts::LN_2;

/// Returns the number of bits needed to hold `n` entries at a false positive probability of `p`.
///
/// The result is `-n * ln(p) / ln(2)^2` truncated toward zero. A probability of zero is replaced
/// by the smallest positive `f64` so the result stays finite.
///
/// # Examples
///
/// ```
/// use block_bloom::sizing::optimal_num_of_bits;
///
/// assert_eq!(optimal_num_of_bits(1000, 0.03), 7298);
/// assert_eq!(optimal_num_of_bits(0, 0.03), 0);
/// ```
pub fn optimal_num_of_bits(n: u64, p: f64) -> u64 {
    let p = if p == 0.0 { f64::from_bits(1) } else { p };
    (-(n as f64) * p.ln() / (LN_2 * LN_2)) as u64
}

/// Returns the number of hash functions that minimizes the false positive probability of an
/// `m`-bit filter holding `n` entries. Never less than one.
///
/// # Examples
///
/// ```
/// use block_bloom::sizing::optimal_num_of_hash_functions;
///
/// assert_eq!(optimal_num_of_hash_functions(10, 100), 7);
/// assert_eq!(optimal_num_of_hash_functions(0, 0), 1);
/// ```
pub fn optimal_num_of_hash_functions(n: u64, m: u64) -> u32 {
    if n == 0 {
        return 1;
    }
    let k = (m as f64 / n as f64 * LN_2 + 0.5).floor() as u32;
    cmp::max(1, k)
}
