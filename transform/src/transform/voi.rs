//! Value of Interest (VOI) transformation:
//! from meaningful values to displayable values.

use std::sync::Arc;

use dicom_object::InMemDicomObject;
use snafu::{ensure, ResultExt};
use tracing::{debug, warn};

use crate::attribute;
use crate::image::{with_buffer, BitDepth, Image};
use crate::lut::Lut;
use crate::sample::{Sample, SampleRange};
use crate::transform::modality::{allocate_for_lut, LookupKernel};
use crate::transform::{check_bounds, check_channels, run_kernel, Region, RowKernel, Transform};
use crate::{GetAttributeSnafu, InvalidWindowParametersSnafu, Result};

/// The parameters of a single window level
/// for a VOI LUT transformation,
/// comprising the window center and the window width.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WindowLevel {
    /// The _Window Width_.
    ///
    /// Always greater than 0
    pub width: f64,
    /// The _Window Center_.
    pub center: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum VoiFunction {
    FullRange,
    Linear(WindowLevel),
    Lookup(Arc<Lut>),
}

/// Maps meaningful values into a displayable range.
///
/// The transform is in one of three modes,
/// the last one configured taking effect:
///
/// - full range (the initial mode):
///   the whole input range is mapped onto the whole output range;
/// - linear: a window defined by a center and a width
///   is mapped onto the output range,
///   values outside of the window are clamped;
/// - lookup: values are mapped through a VOI LUT.
///
/// # Example
///
/// ```
/// # use dicom_transform::{Image, PixelBuffer, Region, Transform, VoiLut};
/// let input = Image::from_buffer(3, 1, "MONOCHROME2", 7, PixelBuffer::U8(vec![0, 10, 50]))?;
/// let mut voi = VoiLut::new();
/// voi.set_center_width(0., 50.)?;
/// let output = voi.apply(&input)?;
/// assert_eq!(output.buffer(), &PixelBuffer::U8(vec![128, 179, 255]));
/// # Ok::<(), dicom_transform::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VoiLut {
    function: VoiFunction,
}

impl Default for VoiLut {
    fn default() -> Self {
        VoiLut {
            function: VoiFunction::FullRange,
        }
    }
}

impl VoiLut {
    /// Create a VOI transform in full range mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a VOI transform in linear mode.
    pub fn with_center_width(center: f64, width: f64) -> Result<Self> {
        let mut voi = Self::new();
        voi.set_center_width(center, width)?;
        Ok(voi)
    }

    /// Create a VOI transform in lookup mode.
    pub fn with_lut(lut: Arc<Lut>) -> Self {
        VoiLut {
            function: VoiFunction::Lookup(lut),
        }
    }

    /// Create a VOI transform from a data set,
    /// using the first item of the _VOI LUT Sequence_ if present,
    /// or else the first _Window Center_ and _Window Width_ pair,
    /// or else the full range.
    pub fn from_dataset(obj: &InMemDicomObject) -> Result<Self> {
        let luts = attribute::voi_luts(obj).context(GetAttributeSnafu)?;
        if let Some(lut) = luts.into_iter().next() {
            return Ok(Self::with_lut(Arc::new(lut)));
        }

        let centers = attribute::window_centers(obj).context(GetAttributeSnafu)?;
        let widths = attribute::window_widths(obj).context(GetAttributeSnafu)?;
        match (centers.first(), widths.first()) {
            (Some(&center), Some(&width)) => {
                let mut voi = Self::new();
                if voi.set_center_width(center, width).is_err() {
                    warn!(
                        "Ignoring window with center {} and width {}",
                        center, width
                    );
                }
                Ok(voi)
            }
            _ => Ok(Self::new()),
        }
    }

    /// Switch to linear mode with the given window.
    ///
    /// The width must be greater than zero.
    /// On failure the previous mode is kept.
    pub fn set_center_width(&mut self, center: f64, width: f64) -> Result<()> {
        ensure!(
            center.is_finite() && width.is_finite() && width > 0.,
            InvalidWindowParametersSnafu { center, width }
        );
        self.function = VoiFunction::Linear(WindowLevel { width, center });
        Ok(())
    }

    /// Switch to lookup mode with the given LUT.
    pub fn set_lut(&mut self, lut: Arc<Lut>) {
        self.function = VoiFunction::Lookup(lut);
    }

    /// Switch to linear mode with a window
    /// enclosing all samples in a region of the image.
    ///
    /// The center is the middle point between the lowest
    /// and the highest sample (rounded up),
    /// the width is their distance (at least 1).
    pub fn apply_optimal_voi(&mut self, image: &Image, region: Region) -> Result<()> {
        check_bounds(image, region, image, (region.x, region.y))?;
        let Some((min, max)) = scan_min_max(image, region) else {
            warn!("Cannot compute an optimal window over an empty region");
            return Ok(());
        };
        let center = (min + max + 1).div_euclid(2);
        let width = (max - min).max(1);
        debug!(
            "optimal window over [{}, {}]: center {}, width {}",
            min, max, center, width
        );
        self.set_center_width(center as f64, width as f64)
    }

    /// The window in use, if in linear mode.
    pub fn window_level(&self) -> Option<WindowLevel> {
        match &self.function {
            VoiFunction::Linear(window) => Some(*window),
            _ => None,
        }
    }

    /// The window center, if in linear mode.
    pub fn center(&self) -> Option<f64> {
        self.window_level().map(|w| w.center)
    }

    /// The window width, if in linear mode.
    pub fn width(&self) -> Option<f64> {
        self.window_level().map(|w| w.width)
    }

    /// The LUT in use, if in lookup mode.
    pub fn lut(&self) -> Option<&Arc<Lut>> {
        match &self.function {
            VoiFunction::Lookup(lut) => Some(lut),
            _ => None,
        }
    }
}

fn scan_min_max(image: &Image, region: Region) -> Option<(i64, i64)> {
    if region.is_empty() {
        return None;
    }
    let channels = image.channels() as usize;
    let row_len = image.row_len();
    let x = region.x as usize * channels;
    let len = region.width as usize * channels;
    with_buffer!(image.buffer(), data => {
        data.chunks(row_len)
            .skip(region.y as usize)
            .take(region.height as usize)
            .flat_map(|row| &row[x..x + len])
            .fold(None, |acc: Option<(i64, i64)>, v| {
                let v = v.widen();
                Some(match acc {
                    None => (v, v),
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                })
            })
    })
}

impl Transform for VoiLut {
    fn allocate_output_image(&self, input: &Image, width: u32, height: u32) -> Result<Image> {
        if let VoiFunction::Lookup(lut) = &self.function {
            return allocate_for_lut(lut, input, width, height);
        }
        let depth = match input.depth() {
            BitDepth::U8 | BitDepth::S8 => BitDepth::U8,
            _ => BitDepth::U16,
        };
        let high_bit = input.high_bit().min(depth.max_high_bit());
        Image::new(width, height, depth, input.color_space(), high_bit)
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
            VoiFunction::FullRange => run_kernel(
                &WindowKernel { window: None },
                input,
                region,
                output,
                output_top_left,
            ),
            VoiFunction::Linear(window) => run_kernel(
                &WindowKernel {
                    window: Some(*window),
                },
                input,
                region,
                output,
                output_top_left,
            ),
            VoiFunction::Lookup(lut) => {
                run_kernel(&LookupKernel(lut), input, region, output, output_top_left)
            }
        }
    }
}

/// Linear windowing.
///
/// Without a window, or with a window narrower than 2,
/// the whole input range is used.
struct WindowKernel {
    window: Option<WindowLevel>,
}

impl RowKernel for WindowKernel {
    fn process_row<I: Sample, O: Sample>(
        &self,
        input: &[I],
        input_high_bit: u32,
        output: &mut [O],
        output_high_bit: u32,
    ) {
        let input_range = SampleRange::of::<I>(input_high_bit);
        let output_range = SampleRange::of::<O>(output_high_bit);

        let (low, span) = match self.window {
            Some(WindowLevel { width, center }) if width > 1. => {
                let low = (center - width / 2.) as i64;
                let high = (center + width / 2.) as i64;
                (low, (high - low).max(1))
            }
            _ => (input_range.min, input_range.count),
        };

        let ratio = output_range.count as f64 / span as f64;
        let out_min = output_range.min as f64;
        let out_max = output_range.max() as f64;
        for (i, o) in input.iter().zip(output.iter_mut()) {
            let value = 0.5 + (i.widen() - low) as f64 * ratio + out_min;
            let value = if value <= out_min {
                output_range.min
            } else if value >= out_max {
                output_range.max()
            } else {
                value as i64
            };
            *o = O::saturate(value);
        }
    }
}
