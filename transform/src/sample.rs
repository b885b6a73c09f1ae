//! Pixel sample element types and the numeric rules shared by all kernels.
//!
//! Every transform in this crate reads input samples and writes output
//! samples of independent element types.
//! The [`Sample`] trait gives the pixel loops a single, generic view
//! over these types, so that each algorithm is written once
//! and instantiated for every input/output pair found at run time.

use num_traits::{NumCast, PrimInt, ToPrimitive};

use crate::image::BitDepth;

/// A pixel sample element type
/// (one of `u8`, `i8`, `u16`, `i16`, `u32`, `i32`).
pub trait Sample: PrimInt + Send + Sync + 'static {
    /// The storage depth represented by this element type.
    const DEPTH: BitDepth;

    /// Whether the element type is signed.
    const SIGNED: bool;

    /// Widen the sample into a signed 64-bit integer.
    #[inline]
    fn widen(self) -> i64 {
        // all supported element types fit in an i64
        self.to_i64().unwrap_or_default()
    }

    /// Narrow a 64-bit value into this element type,
    /// saturating at the limits of the storage.
    #[inline]
    fn saturate(value: i64) -> Self {
        let lo = Self::min_value().to_i64().unwrap_or(i64::MIN);
        let hi = Self::max_value().to_i64().unwrap_or(i64::MAX);
        <Self as NumCast>::from(value.clamp(lo, hi)).unwrap_or_else(Self::zero)
    }

    /// The lowest value representable with the given high bit.
    ///
    /// This is 0 for unsigned samples
    /// and `-2^high_bit` for signed samples.
    #[inline]
    fn min_for(high_bit: u32) -> i64 {
        if Self::SIGNED {
            -(1_i64 << high_bit)
        } else {
            0
        }
    }
}

macro_rules! impl_sample {
    ($t: ty, $depth: ident, $signed: expr) => {
        impl Sample for $t {
            const DEPTH: BitDepth = BitDepth::$depth;
            const SIGNED: bool = $signed;
        }
    };
}

impl_sample!(u8, U8, false);
impl_sample!(i8, S8, true);
impl_sample!(u16, U16, false);
impl_sample!(i16, S16, true);
impl_sample!(u32, U32, false);
impl_sample!(i32, S32, true);

/// The number of distinct values representable with the given high bit.
#[inline]
pub fn num_values(high_bit: u32) -> i64 {
    1_i64 << (high_bit + 1)
}

/// The value range covered by a sample type at a given high bit.
///
/// This is the shared clamp-and-offset policy of the pipeline:
/// results are computed relative to zero,
/// then anchored to the minimum value of the output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct SampleRange {
    /// the lowest representable value
    pub min: i64,
    /// the number of representable values
    pub count: i64,
}

impl SampleRange {
    #[inline]
    pub fn of<T: Sample>(high_bit: u32) -> Self {
        SampleRange {
            min: T::min_for(high_bit),
            count: num_values(high_bit),
        }
    }

    /// The highest representable value.
    #[inline]
    pub fn max(&self) -> i64 {
        self.min + self.count - 1
    }

    /// Store a value relative to zero into this range:
    /// negative values become the minimum,
    /// values at or above `ceiling` become the maximum,
    /// anything else is offset by the minimum.
    #[inline]
    pub fn store(&self, relative: i64, ceiling: i64) -> i64 {
        if relative < 0 {
            self.min
        } else if relative >= ceiling {
            self.max()
        } else {
            (self.min + relative).min(self.max())
        }
    }

    /// Clamp an absolute value into this range.
    #[inline]
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max())
    }
}
