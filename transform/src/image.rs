//! The in-memory image model consumed and produced by the transforms.

use std::fmt;
use std::sync::Arc;

use snafu::ensure;

use crate::lut::Palette;
use crate::sample::{num_values, Sample};
use crate::{InvalidBufferLengthSnafu, InvalidHighBitSnafu, Result};

/// The storage type of each pixel sample:
/// element width and signedness.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum BitDepth {
    /// unsigned 8-bit samples
    U8,
    /// signed 8-bit samples
    S8,
    /// unsigned 16-bit samples
    U16,
    /// signed 16-bit samples
    S16,
    /// unsigned 32-bit samples
    U32,
    /// signed 32-bit samples
    S32,
}

impl BitDepth {
    /// The number of bits of each storage element.
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::U8 | BitDepth::S8 => 8,
            BitDepth::U16 | BitDepth::S16 => 16,
            BitDepth::U32 | BitDepth::S32 => 32,
        }
    }

    /// Whether the samples are signed (two's complement).
    pub fn is_signed(self) -> bool {
        matches!(self, BitDepth::S8 | BitDepth::S16 | BitDepth::S32)
    }

    /// The highest high bit supported by this storage.
    pub fn max_high_bit(self) -> u32 {
        self.bits() - 1
    }

    /// The smallest storage type able to hold samples
    /// with the given high bit and signedness.
    ///
    /// High bits above 31 are served by 32-bit storage.
    pub fn for_high_bit(high_bit: u32, signed: bool) -> Self {
        match (high_bit, signed) {
            (0..=7, false) => BitDepth::U8,
            (0..=7, true) => BitDepth::S8,
            (8..=15, false) => BitDepth::U16,
            (8..=15, true) => BitDepth::S16,
            (_, false) => BitDepth::U32,
            (_, true) => BitDepth::S32,
        }
    }

    /// The unsigned storage type of the same width.
    pub fn to_unsigned(self) -> Self {
        match self {
            BitDepth::U8 | BitDepth::S8 => BitDepth::U8,
            BitDepth::U16 | BitDepth::S16 => BitDepth::U16,
            BitDepth::U32 | BitDepth::S32 => BitDepth::U32,
        }
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_signed() { 'S' } else { 'U' };
        write!(f, "{}{}", sign, self.bits())
    }
}

/// The number of channels implied by a color space.
///
/// The RGB and YBR families carry 3 channels per pixel,
/// monochrome and palette color images carry one.
pub fn channels_for_color_space(color_space: &str) -> u32 {
    let normalized = crate::transform::color::normalize_color_space(color_space);
    if normalized == "RGB" || normalized.starts_with("YBR_") {
        3
    } else {
        1
    }
}

/// Owned pixel samples, one variant per storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    /// unsigned 8-bit samples
    U8(Vec<u8>),
    /// signed 8-bit samples
    S8(Vec<i8>),
    /// unsigned 16-bit samples
    U16(Vec<u16>),
    /// signed 16-bit samples
    S16(Vec<i16>),
    /// unsigned 32-bit samples
    U32(Vec<u32>),
    /// signed 32-bit samples
    S32(Vec<i32>),
}

/// Evaluate an expression over the typed vector of a pixel buffer.
macro_rules! with_buffer {
    ($buffer: expr, $v: ident => $body: expr) => {
        match $buffer {
            $crate::image::PixelBuffer::U8($v) => $body,
            $crate::image::PixelBuffer::S8($v) => $body,
            $crate::image::PixelBuffer::U16($v) => $body,
            $crate::image::PixelBuffer::S16($v) => $body,
            $crate::image::PixelBuffer::U32($v) => $body,
            $crate::image::PixelBuffer::S32($v) => $body,
        }
    };
}
pub(crate) use with_buffer;

impl PixelBuffer {
    /// Create a zero-filled buffer of the given storage type.
    pub fn zeroed(depth: BitDepth, len: usize) -> Self {
        match depth {
            BitDepth::U8 => PixelBuffer::U8(vec![0; len]),
            BitDepth::S8 => PixelBuffer::S8(vec![0; len]),
            BitDepth::U16 => PixelBuffer::U16(vec![0; len]),
            BitDepth::S16 => PixelBuffer::S16(vec![0; len]),
            BitDepth::U32 => PixelBuffer::U32(vec![0; len]),
            BitDepth::S32 => PixelBuffer::S32(vec![0; len]),
        }
    }

    /// The storage type of the samples.
    pub fn depth(&self) -> BitDepth {
        match self {
            PixelBuffer::U8(_) => BitDepth::U8,
            PixelBuffer::S8(_) => BitDepth::S8,
            PixelBuffer::U16(_) => BitDepth::U16,
            PixelBuffer::S16(_) => BitDepth::S16,
            PixelBuffer::U32(_) => BitDepth::U32,
            PixelBuffer::S32(_) => BitDepth::S32,
        }
    }

    /// The number of samples in the buffer.
    pub fn len(&self) -> usize {
        with_buffer!(self, v => v.len())
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve a sample widened to 64 bits.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> i64 {
        with_buffer!(self, v => v[index].widen())
    }

    /// Store a sample, saturating it into the storage type.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: i64) {
        fn put<T: Sample>(v: &mut [T], index: usize, value: i64) {
            v[index] = T::saturate(value);
        }
        with_buffer!(self, v => put(v, index, value))
    }
}

/// A decoded image:
/// a grid of `width` x `height` pixels,
/// each made of `channels` interleaved samples,
/// stored row by row.
///
/// The _high bit_ is the index of the most significant meaningful bit
/// of each sample, which may be lower than the storage width.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    high_bit: u32,
    color_space: String,
    channels: u32,
    palette: Option<Arc<Palette>>,
    buffer: PixelBuffer,
}

impl Image {
    /// Create a zero-filled image.
    ///
    /// The number of channels is derived from the color space.
    /// Fails if `high_bit` does not fit in the storage type.
    pub fn new(
        width: u32,
        height: u32,
        depth: BitDepth,
        color_space: impl Into<String>,
        high_bit: u32,
    ) -> Result<Self> {
        let color_space = color_space.into();
        let channels = channels_for_color_space(&color_space);
        let len = width as usize * height as usize * channels as usize;
        Self::from_buffer(
            width,
            height,
            color_space,
            high_bit,
            PixelBuffer::zeroed(depth, len),
        )
    }

    /// Create an image from existing samples.
    ///
    /// Fails if `high_bit` does not fit in the storage type,
    /// or if the buffer does not hold exactly
    /// `width * height * channels` samples.
    pub fn from_buffer(
        width: u32,
        height: u32,
        color_space: impl Into<String>,
        high_bit: u32,
        buffer: PixelBuffer,
    ) -> Result<Self> {
        let color_space = color_space.into();
        let depth = buffer.depth();
        ensure!(
            high_bit <= depth.max_high_bit(),
            InvalidHighBitSnafu { high_bit, depth }
        );
        let channels = channels_for_color_space(&color_space);
        let expected = width as usize * height as usize * channels as usize;
        ensure!(
            buffer.len() == expected,
            InvalidBufferLengthSnafu {
                expected,
                got: buffer.len(),
            }
        );
        Ok(Image {
            width,
            height,
            high_bit,
            color_space,
            channels,
            palette: None,
            buffer,
        })
    }

    /// The width of the image in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The height of the image in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The storage type of the samples.
    pub fn depth(&self) -> BitDepth {
        self.buffer.depth()
    }

    /// The index of the most significant meaningful bit.
    pub fn high_bit(&self) -> u32 {
        self.high_bit
    }

    /// The color space identifier, such as `MONOCHROME2` or `RGB`.
    pub fn color_space(&self) -> &str {
        &self.color_space
    }

    /// The number of interleaved samples per pixel.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// The palette used by `PALETTE COLOR` images.
    pub fn palette(&self) -> Option<&Arc<Palette>> {
        self.palette.as_ref()
    }

    /// Attach or detach a palette.
    pub fn set_palette(&mut self, palette: Option<Arc<Palette>>) {
        self.palette = palette;
    }

    /// Builder-style variant of [`set_palette`](Image::set_palette).
    pub fn with_palette(mut self, palette: Option<Arc<Palette>>) -> Self {
        self.palette = palette;
        self
    }

    /// The underlying samples.
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Mutable access to the underlying samples.
    pub fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    /// Consume the image, keeping only its samples.
    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    /// Retrieve the sample at the given buffer index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> i64 {
        self.buffer.get(index)
    }

    /// Store a sample at the given buffer index,
    /// saturating it into the storage type.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: i64) {
        self.buffer.set(index, value)
    }

    /// The lowest value allowed by the high bit and signedness.
    pub fn min_value(&self) -> i64 {
        if self.depth().is_signed() {
            -(1_i64 << self.high_bit)
        } else {
            0
        }
    }

    /// The highest value allowed by the high bit and signedness.
    pub fn max_value(&self) -> i64 {
        self.min_value() + num_values(self.high_bit) - 1
    }

    /// The number of samples in a full row of the image.
    pub(crate) fn row_len(&self) -> usize {
        self.width as usize * self.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn new_image_has_expected_shape() {
        let image = Image::new(4, 3, BitDepth::U16, "RGB", 11).unwrap();
        assert_eq!(image.channels(), 3);
        assert_eq!(image.buffer().len(), 36);
        assert_eq!(image.depth(), BitDepth::U16);
        assert_eq!(image.min_value(), 0);
        assert_eq!(image.max_value(), 4095);

        let image = Image::new(2, 2, BitDepth::S16, "MONOCHROME2", 15).unwrap();
        assert_eq!(image.channels(), 1);
        assert_eq!(image.min_value(), -32768);
        assert_eq!(image.max_value(), 32767);
    }

    #[test]
    fn high_bit_must_fit_storage() {
        let err = Image::new(1, 1, BitDepth::U8, "MONOCHROME2", 8).unwrap_err();
        assert!(matches!(err, Error::InvalidHighBit { high_bit: 8, .. }));
    }

    #[test]
    fn buffer_length_is_checked() {
        let err = Image::from_buffer(2, 2, "RGB", 7, PixelBuffer::U8(vec![0; 4])).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidBufferLength {
                expected: 12,
                got: 4,
                ..
            }
        ));
    }

    #[test]
    fn samples_saturate_on_write() {
        let mut image = Image::new(2, 1, BitDepth::S8, "MONOCHROME2", 7).unwrap();
        image.set(0, 1000);
        image.set(1, -1000);
        assert_eq!(image.get(0), 127);
        assert_eq!(image.get(1), -128);
    }

    #[test]
    fn depth_for_high_bit() {
        assert_eq!(BitDepth::for_high_bit(7, false), BitDepth::U8);
        assert_eq!(BitDepth::for_high_bit(11, true), BitDepth::S16);
        assert_eq!(BitDepth::for_high_bit(16, false), BitDepth::U32);
        assert_eq!(BitDepth::S16.to_unsigned(), BitDepth::U16);
        assert_eq!(BitDepth::S32.to_string(), "S32");
    }

    #[test]
    fn channels_by_color_space() {
        assert_eq!(channels_for_color_space("RGB"), 3);
        assert_eq!(channels_for_color_space("YBR_FULL_422"), 3);
        assert_eq!(channels_for_color_space("YBR_PARTIAL"), 3);
        assert_eq!(channels_for_color_space("MONOCHROME1"), 1);
        assert_eq!(channels_for_color_space("PALETTE COLOR"), 1);
    }
}
