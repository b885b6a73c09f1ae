//! Bit depth remapping.

use crate::image::{BitDepth, Image};
use crate::sample::{Sample, SampleRange};
use crate::transform::{
    check_channels, check_color_space, run_kernel, Region, RowKernel, Transform,
};
use crate::Result;

/// Shifts samples from the high bit of the input image
/// to the high bit of the output image.
///
/// Widening is lossless,
/// narrowing drops the least significant bits.
/// The color space is left untouched:
/// the output image must be in the color space of the input.
///
/// # Example
///
/// ```
/// # use dicom_transform::{BitDepth, Image, PixelBuffer, Transform, TransformHighBit};
/// let input = Image::from_buffer(2, 1, "MONOCHROME2", 7, PixelBuffer::U8(vec![1, 255]))?;
/// let output = TransformHighBit::with_output(BitDepth::U16, 15).apply(&input)?;
/// assert_eq!(output.buffer(), &PixelBuffer::U16(vec![256, 65280]));
/// # Ok::<(), dicom_transform::Error>(())
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformHighBit {
    output: Option<(BitDepth, u32)>,
}

impl TransformHighBit {
    /// Create a transform which allocates outputs like its inputs.
    ///
    /// The output depth is then decided by the caller
    /// through the output image passed to
    /// [`run_transform`](Transform::run_transform).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform which allocates outputs
    /// with the given storage and high bit.
    pub fn with_output(depth: BitDepth, high_bit: u32) -> Self {
        TransformHighBit {
            output: Some((depth, high_bit)),
        }
    }
}

impl Transform for TransformHighBit {
    fn allocate_output_image(&self, input: &Image, width: u32, height: u32) -> Result<Image> {
        let (depth, high_bit) = self
            .output
            .unwrap_or_else(|| (input.depth(), input.high_bit()));
        Ok(Image::new(width, height, depth, input.color_space(), high_bit)?
            .with_palette(input.palette().cloned()))
    }

    fn run_transform(
        &self,
        input: &Image,
        region: Region,
        output: &mut Image,
        output_top_left: (u32, u32),
    ) -> Result<()> {
        check_color_space(input.color_space(), output)?;
        check_channels(input, output)?;
        run_kernel(&Shift, input, region, output, output_top_left)
    }
}

struct Shift;

impl RowKernel for Shift {
    fn process_row<I: Sample, O: Sample>(
        &self,
        input: &[I],
        input_high_bit: u32,
        output: &mut [O],
        output_high_bit: u32,
    ) {
        let input_range = SampleRange::of::<I>(input_high_bit);
        let output_range = SampleRange::of::<O>(output_high_bit);
        let shift = output_high_bit as i32 - input_high_bit as i32;
        for (i, o) in input.iter().zip(output.iter_mut()) {
            let value = i.widen() - input_range.min;
            let value = if shift >= 0 {
                value << shift
            } else {
                value >> -shift
            };
            let value = value.clamp(0, output_range.count - 1);
            *o = O::saturate(output_range.min + value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelBuffer;
    use crate::Error;

    fn ramp_u8() -> Image {
        let data = (0..=255).collect();
        Image::from_buffer(16, 16, "MONOCHROME2", 7, PixelBuffer::U8(data)).unwrap()
    }

    #[test]
    fn widen_8_to_16_bits() {
        let input = ramp_u8();
        let output = TransformHighBit::with_output(BitDepth::U16, 15)
            .apply(&input)
            .unwrap();
        assert_eq!(output.color_space(), "MONOCHROME2");
        for i in 0..256 {
            assert_eq!(output.get(i), input.get(i) << 8);
        }
    }

    #[test]
    fn narrow_8_to_4_bits() {
        let input = ramp_u8();
        let output = TransformHighBit::with_output(BitDepth::U8, 3)
            .apply(&input)
            .unwrap();
        for i in 0..256 {
            assert_eq!(output.get(i), input.get(i) >> 4);
        }
    }

    #[test]
    fn signed_to_unsigned_keeps_order() {
        let input =
            Image::from_buffer(3, 1, "MONOCHROME2", 7, PixelBuffer::S8(vec![-128, 0, 127]))
                .unwrap();
        let mut output = Image::new(3, 1, BitDepth::U16, "MONOCHROME2", 11).unwrap();
        TransformHighBit::new()
            .run_transform(&input, Region::full(&input), &mut output, (0, 0))
            .unwrap();
        assert_eq!(output.buffer(), &PixelBuffer::U16(vec![0, 2048, 4080]));
    }

    #[test]
    fn color_space_is_kept() {
        let rgb = Image::from_buffer(1, 1, "RGB", 7, PixelBuffer::U8(vec![255, 0, 0])).unwrap();
        let mut ybr = Image::new(1, 1, BitDepth::U8, "YBR_FULL", 7).unwrap();
        let err = TransformHighBit::new()
            .run_transform(&rgb, Region::full(&rgb), &mut ybr, (0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::ColorSpaceMismatch { .. }));
        assert_eq!(ybr.buffer(), &PixelBuffer::U8(vec![0, 0, 0]));

        let gray = Image::from_buffer(1, 1, "MONOCHROME2", 7, PixelBuffer::U8(vec![10])).unwrap();
        let mut inverted = Image::new(1, 1, BitDepth::U16, "MONOCHROME1", 15).unwrap();
        let err = TransformHighBit::new()
            .run_transform(&gray, Region::full(&gray), &mut inverted, (0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::ColorSpaceMismatch { .. }));
        assert_eq!(inverted.buffer(), &PixelBuffer::U16(vec![0]));

        // subsampling suffixes name the same color space
        let mut full = Image::new(1, 1, BitDepth::U8, "YBR_FULL_422", 7).unwrap();
        let ybr = Image::from_buffer(1, 1, "YBR_FULL", 7, PixelBuffer::U8(vec![1, 2, 3])).unwrap();
        TransformHighBit::new()
            .run_transform(&ybr, Region::full(&ybr), &mut full, (0, 0))
            .unwrap();
        assert_eq!(full.buffer(), &PixelBuffer::U8(vec![1, 2, 3]));
    }

    #[test]
    fn default_allocation_mirrors_input() {
        let input = Image::new(5, 4, BitDepth::S16, "RGB", 11).unwrap();
        let output = TransformHighBit::new()
            .allocate_output_image(&input, 2, 3)
            .unwrap();
        assert_eq!(output.depth(), BitDepth::S16);
        assert_eq!(output.high_bit(), 11);
        assert_eq!(output.color_space(), "RGB");
        assert_eq!((output.width(), output.height()), (2, 3));
        assert!(!TransformHighBit::new().is_empty());
    }

    #[test]
    fn invalid_output_high_bit() {
        let input = ramp_u8();
        let err = TransformHighBit::with_output(BitDepth::U8, 9)
            .allocate_output_image(&input, 1, 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHighBit { .. }));
    }
}
