//! Canonical byte encodings of the values a filter accepts.

use byteorder::{ByteOrder, LittleEndian};

/// A value that can be inserted into or probed against a filter.
///
/// Every key is reduced to a canonical byte sequence before hashing:
///
/// - byte sequences and strings as their raw (UTF-8) bytes,
/// - single bytes as a one-byte sequence,
/// - 32-bit and 64-bit integers as fixed-width little-endian bytes,
/// - floats as their IEEE-754 bit pattern, encoded like the integer of the same width.
///
/// Two keys with the same encoding are indistinguishable to a filter, so `1i32` and `1u32`
/// collide while `1i32` and `1i64` do not.
///
/// # Examples
///
/// ```
/// use block_bloom::BloomKey;
///
/// assert_eq!(0x0102_0304i32.with_bytes(|bytes| bytes.to_vec()), vec![4, 3, 2, 1]);
/// assert_eq!(1.0f32.with_bytes(|bytes| bytes.to_vec()), vec![0, 0, 0x80, 0x3f]);
/// assert_eq!("ab".with_bytes(|bytes| bytes.to_vec()), vec![b'a', b'b']);
/// ```
pub trait BloomKey {
    /// Calls `f` with the canonical bytes of `self`.
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R;
}

impl BloomKey for [u8] {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self)
    }
}

impl BloomKey for Vec<u8> {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self.as_slice())
    }
}

impl BloomKey for str {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self.as_bytes())
    }
}

impl BloomKey for String {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self.as_bytes())
    }
}

impl<T> BloomKey for &T
where
    T: BloomKey + ?Sized,
{
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        (**self).with_bytes(f)
    }
}

impl BloomKey for i8 {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&[*self as u8])
    }
}

impl BloomKey for u8 {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&[*self])
    }
}

macro_rules! impl_fixed_width_key {
    ($($ty:ty => $width:expr, $write:ident, $conv:expr;)*) => {
        $(
            impl BloomKey for $ty {
                #[inline]
                fn with_bytes<R, F>(&self, f: F) -> R
                where
                    F: FnOnce(&[u8]) -> R,
                {
                    let mut buf = [0u8; $width];
                    LittleEndian::$write(&mut buf, $conv(*self));
                    f(&buf)
                }
            }
        )*
    };
}

impl_fixed_width_key! {
    i32 => 4, write_i32, |v: i32| v;
    u32 => 4, write_u32, |v: u32| v;
    i64 => 8, write_i64, |v: i64| v;
    u64 => 8, write_u64, |v: u64| v;
    f32 => 4, write_u32, |v: f32| v.to_bits();
    f64 => 8, write_u64, |v: f64| v.to_bits();
}
