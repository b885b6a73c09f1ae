//! Modality LUT transformation:
//! from stored pixel values to meaningful values.

use std::sync::Arc;

use dicom_object::InMemDicomObject;
use snafu::ResultExt;

use crate::attribute;
use crate::image::{BitDepth, Image};
use crate::lut::Lut;
use crate::sample::{Sample, SampleRange};
use crate::transform::{check_channels, run_kernel, Region, RowKernel, Transform};
use crate::{GetAttributeSnafu, Result};

/// Description of a modality rescale function,
/// defined by a _rescale slope_ and _rescale intercept_.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rescale {
    /// the rescale slope
    pub slope: f64,
    /// the rescale intercept
    pub intercept: f64,
}

impl Default for Rescale {
    fn default() -> Self {
        Rescale::new(1., 0.)
    }
}

impl Rescale {
    /// Create a new rescale function.
    #[inline]
    pub fn new(slope: f64, intercept: f64) -> Self {
        Rescale { slope, intercept }
    }

    /// Apply the rescale function to a value.
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        self.slope * value + self.intercept
    }

    /// Whether the function maps every value onto itself.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.slope == 1. && self.intercept == 0.
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ModalityFunction {
    Rescale(Rescale),
    Lookup(Arc<Lut>),
}

/// Converts stored pixel values into meaningful values,
/// either through a linear rescale
/// or through an explicit modality LUT.
///
/// When both are available in a data set,
/// the LUT takes precedence.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityVoiLut {
    function: ModalityFunction,
}

impl ModalityVoiLut {
    /// Create a modality transform from a data set,
    /// using the first item of the _Modality LUT Sequence_ if present,
    /// or else the _Rescale Slope_ and _Rescale Intercept_
    /// (defaulting to 1 and 0).
    pub fn from_dataset(obj: &InMemDicomObject) -> Result<Self> {
        if let Some(lut) = attribute::modality_lut(obj).context(GetAttributeSnafu)? {
            return Ok(Self::from_lut(Arc::new(lut)));
        }
        Ok(Self::from_rescale(Rescale::new(
            attribute::rescale_slope(obj),
            attribute::rescale_intercept(obj),
        )))
    }

    /// Create a modality transform with a linear rescale.
    pub fn from_rescale(rescale: Rescale) -> Self {
        ModalityVoiLut {
            function: ModalityFunction::Rescale(rescale),
        }
    }

    /// Create a modality transform with a look-up table.
    pub fn from_lut(lut: Arc<Lut>) -> Self {
        ModalityVoiLut {
            function: ModalityFunction::Lookup(lut),
        }
    }

    /// The rescale function, if not in LUT mode.
    pub fn rescale(&self) -> Option<Rescale> {
        match &self.function {
            ModalityFunction::Rescale(rescale) => Some(*rescale),
            ModalityFunction::Lookup(_) => None,
        }
    }

    /// The modality LUT, if in LUT mode.
    pub fn lut(&self) -> Option<&Arc<Lut>> {
        match &self.function {
            ModalityFunction::Rescale(_) => None,
            ModalityFunction::Lookup(lut) => Some(lut),
        }
    }
}

impl Transform for ModalityVoiLut {
    fn is_empty(&self) -> bool {
        matches!(&self.function, ModalityFunction::Rescale(r) if r.is_identity())
    }

    fn allocate_output_image(&self, input: &Image, width: u32, height: u32) -> Result<Image> {
        match &self.function {
            ModalityFunction::Lookup(lut) => allocate_for_lut(lut, input, width, height),
            ModalityFunction::Rescale(rescale) if rescale.is_identity() => Ok(Image::new(
                width,
                height,
                input.depth(),
                input.color_space(),
                input.high_bit(),
            )?
            .with_palette(input.palette().cloned())),
            ModalityFunction::Rescale(rescale) => {
                let a = rescale.apply(input.min_value() as f64);
                let b = rescale.apply(input.max_value() as f64);
                let low = a.min(b).floor();
                let high = a.max(b).ceil();
                let high_bit = (15..31)
                    .find(|&hb| {
                        let half = (1_i64 << hb) as f64;
                        low >= -half && high < half
                    })
                    .unwrap_or(31);
                let depth = BitDepth::for_high_bit(high_bit, true);
                Image::new(width, height, depth, input.color_space(), high_bit)
            }
        }
    }

    fn run_transform(
        &self,
        input: &Image,
        region: Region,
        output: &mut Image,
        output_top_left: (u32, u32),
    ) -> Result<()> {
        check_channels(input, output)?;
        match &self.function {
            ModalityFunction::Rescale(rescale) => {
                run_kernel(&RescaleKernel(*rescale), input, region, output, output_top_left)
            }
            ModalityFunction::Lookup(lut) => {
                run_kernel(&LookupKernel(lut), input, region, output, output_top_left)
            }
        }
    }
}

/// Allocate an output image able to hold the entries of a LUT:
/// unsigned, with as many significant bits as the LUT entries.
pub(crate) fn allocate_for_lut(lut: &Lut, input: &Image, width: u32, height: u32) -> Result<Image> {
    let bits = lut.bits().max(32 - lut.max_entry().leading_zeros());
    let depth = BitDepth::for_high_bit(bits - 1, false);
    Image::new(width, height, depth, input.color_space(), bits - 1)
}

struct RescaleKernel(Rescale);

impl RowKernel for RescaleKernel {
    fn process_row<I: Sample, O: Sample>(
        &self,
        input: &[I],
        _input_high_bit: u32,
        output: &mut [O],
        output_high_bit: u32,
    ) {
        let range = SampleRange::of::<O>(output_high_bit);
        for (i, o) in input.iter().zip(output.iter_mut()) {
            let value = self.0.apply(i.widen() as f64).round() as i64;
            *o = O::saturate(range.clamp(value));
        }
    }
}

/// Maps every sample through a LUT.
pub(crate) struct LookupKernel<'a>(pub &'a Lut);

impl RowKernel for LookupKernel<'_> {
    fn process_row<I: Sample, O: Sample>(
        &self,
        input: &[I],
        _input_high_bit: u32,
        output: &mut [O],
        output_high_bit: u32,
    ) {
        let range = SampleRange::of::<O>(output_high_bit);
        for (i, o) in input.iter().zip(output.iter_mut()) {
            let value = self.0.mapped_value(i.widen()) as i64;
            *o = O::saturate(range.clamp(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelBuffer;

    fn samples() -> Image {
        Image::from_buffer(
            6,
            1,
            "MONOCHROME2",
            7,
            PixelBuffer::U8(vec![0, 10, 20, 30, 40, 50]),
        )
        .unwrap()
    }

    /// Applying a common rescale function to a value
    /// gives the expected output.
    #[test]
    fn modality_lut_baseline() {
        let rescale = Rescale::new(1., -1024.);

        assert_eq!(rescale.apply(0.), -1024.);
        assert_eq!(rescale.apply(1.), -1023.);
        assert_eq!(rescale.apply(2.), -1022.);
        assert_eq!(rescale.apply(1024.), 0.);
    }

    #[test]
    fn rescale_slope_and_intercept() {
        let modality = ModalityVoiLut::from_rescale(Rescale::new(2., -1.));
        assert!(!modality.is_empty());
        let output = modality.apply(&samples()).unwrap();
        assert_eq!(output.depth(), BitDepth::S16);
        assert_eq!(output.high_bit(), 15);
        assert_eq!(
            output.buffer(),
            &PixelBuffer::S16(vec![-1, 19, 39, 59, 79, 99])
        );
    }

    #[test]
    fn wide_rescale_needs_32_bits() {
        let input = Image::new(1, 1, BitDepth::U16, "MONOCHROME2", 15).unwrap();
        let modality = ModalityVoiLut::from_rescale(Rescale::new(4., -1024.));
        let output = modality.allocate_output_image(&input, 1, 1).unwrap();
        assert_eq!(output.depth(), BitDepth::S32);
        assert_eq!(output.high_bit(), 18);
    }

    #[test]
    fn identity_rescale_is_empty() {
        let modality = ModalityVoiLut::from_rescale(Rescale::default());
        assert!(modality.is_empty());
        let input = samples();
        let output = modality.apply(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn lookup_table() {
        let lut = Lut::new(16, 2, vec![100, 200, 300]).unwrap();
        let modality = ModalityVoiLut::from_lut(Arc::new(lut));
        assert!(modality.rescale().is_none());
        let input = Image::from_buffer(
            6,
            1,
            "MONOCHROME2",
            7,
            PixelBuffer::U8(vec![0, 1, 2, 3, 4, 5]),
        )
        .unwrap();
        let output = modality.apply(&input).unwrap();
        assert_eq!(output.depth(), BitDepth::U16);
        assert_eq!(output.high_bit(), 15);
        assert_eq!(
            output.buffer(),
            &PixelBuffer::U16(vec![100, 100, 100, 200, 300, 300])
        );
    }
}
