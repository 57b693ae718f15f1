// Axel '0vercl0k' Souchet - March 4 2024
//! Tiny helpers to pull bits / bit ranges out of integers; used when decoding
//! page table entries and pool headers.
use std::ops::RangeInclusive;

pub trait Bits: Sized {
    /// Get the value of the bit at `n`.
    #[must_use]
    fn bit(&self, n: usize) -> Self;

    /// Get the bits in the inclusive range `r`, shifted down to bit 0.
    #[must_use]
    fn bits(&self, r: RangeInclusive<usize>) -> Self;
}

macro_rules! impl_bits {
    ($($ty:ty),*) => {
        $(impl Bits for $ty {
            fn bit(&self, n: usize) -> Self {
                debug_assert!(n < <$ty>::BITS as usize);

                (*self >> n) & 1
            }

            fn bits(&self, r: RangeInclusive<usize>) -> Self {
                let (start, end) = r.into_inner();
                debug_assert!(start <= end && end < <$ty>::BITS as usize);
                let width = end - start + 1;
                let mask = if width == <$ty>::BITS as usize {
                    <$ty>::MAX
                } else {
                    (1 << width) - 1
                };

                (*self >> start) & mask
            }
        })*
    };
}

impl_bits!(u8, u16, u32, u64);
