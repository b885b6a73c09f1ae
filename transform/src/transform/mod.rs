//! The transform contract and the shared pixel loop.
//!
//! Every stage of the pipeline implements [`Transform`]:
//! it declares the color spaces it consumes and produces,
//! allocates suitable output images,
//! and runs over a rectangular region of an input image,
//! writing into an output image at a given offset.
//!
//! Concrete transforms describe their per-row arithmetic
//! generically over the input and output sample types.
//! The pixel storage of both images is only known at run time,
//! so the driver in this module validates the request
//! and then dispatches on the pair of storage types.

use std::fmt;

use snafu::ensure;
use tracing::debug;

use crate::image::{with_buffer, Image};
use crate::sample::Sample;
use crate::{ChannelsMismatchSnafu, ColorSpaceMismatchSnafu, RegionOutOfBoundsSnafu, Result};

pub mod chain;
pub mod color;
pub mod high_bit;
pub mod modality;
pub mod voi;

/// A rectangular region of an image, in pixels.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub struct Region {
    /// left column
    pub x: u32,
    /// top row
    pub y: u32,
    /// number of columns
    pub width: u32,
    /// number of rows
    pub height: u32,
}

impl Region {
    /// Create a new region.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    /// The region covering a whole image.
    pub fn full(image: &Image) -> Self {
        Region::new(0, 0, image.width(), image.height())
    }

    /// Whether the region covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A stage of the image transform pipeline.
///
/// Implementations must not retain references to the images
/// given to them, and must not write any output pixel
/// when a call fails.
pub trait Transform: Send + Sync + fmt::Debug {
    /// The color space required from input images.
    ///
    /// The empty string means that any color space is accepted.
    fn initial_color_space(&self) -> &str {
        ""
    }

    /// The color space of the images produced.
    ///
    /// The empty string means that the color space is left unchanged.
    fn final_color_space(&self) -> &str {
        ""
    }

    /// Whether applying this transform has no effect.
    fn is_empty(&self) -> bool {
        false
    }

    /// Create an image of the given size
    /// able to hold the output of this transform
    /// when fed with images like `input`.
    ///
    /// The input image is only inspected, never modified.
    fn allocate_output_image(&self, input: &Image, width: u32, height: u32) -> Result<Image>;

    /// Transform the `region` of the `input` image,
    /// writing the result into `output`
    /// with the top left corner at `output_top_left`.
    fn run_transform(
        &self,
        input: &Image,
        region: Region,
        output: &mut Image,
        output_top_left: (u32, u32),
    ) -> Result<()>;

    /// Transform a whole image into a newly allocated one.
    fn apply(&self, input: &Image) -> Result<Image> {
        let mut output = self.allocate_output_image(input, input.width(), input.height())?;
        self.run_transform(input, Region::full(input), &mut output, (0, 0))?;
        Ok(output)
    }
}

/// Check that a region of the input image
/// and a region of the same extent in the output image
/// are both within bounds.
pub(crate) fn check_bounds(
    input: &Image,
    region: Region,
    output: &Image,
    output_top_left: (u32, u32),
) -> Result<()> {
    check_region(input, region)?;
    check_region(
        output,
        Region::new(
            output_top_left.0,
            output_top_left.1,
            region.width,
            region.height,
        ),
    )
}

fn check_region(image: &Image, region: Region) -> Result<()> {
    let right = region.x as u64 + region.width as u64;
    let bottom = region.y as u64 + region.height as u64;
    ensure!(
        right <= image.width() as u64 && bottom <= image.height() as u64,
        RegionOutOfBoundsSnafu {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            image_width: image.width(),
            image_height: image.height(),
        }
    );
    Ok(())
}

/// Check that an image is in the given color space,
/// unless the constraint is empty.
pub(crate) fn check_color_space(constraint: &str, image: &Image) -> Result<()> {
    if constraint.is_empty() {
        return Ok(());
    }
    let expected = color::normalize_color_space(constraint);
    let found = color::normalize_color_space(image.color_space());
    ensure!(
        expected == found,
        ColorSpaceMismatchSnafu {
            expected,
            found: image.color_space(),
        }
    );
    Ok(())
}

/// Check the color spaces of both images against a transform.
pub(crate) fn check_color_spaces(
    transform: &dyn Transform,
    input: &Image,
    output: &Image,
) -> Result<()> {
    check_color_space(transform.initial_color_space(), input)?;
    check_color_space(transform.final_color_space(), output)
}

/// Check that both images have the same number of channels,
/// as required by transforms working on each sample alone.
pub(crate) fn check_channels(input: &Image, output: &Image) -> Result<()> {
    ensure!(
        input.channels() == output.channels(),
        ChannelsMismatchSnafu {
            expected: input.channels(),
            got: output.channels(),
        }
    );
    Ok(())
}

/// The arithmetic of a transform over one row of a region.
///
/// `input` holds `width * input channels` samples
/// and `output` holds `width * output channels` samples.
pub(crate) trait RowKernel: Sync {
    fn process_row<I: Sample, O: Sample>(
        &self,
        input: &[I],
        input_high_bit: u32,
        output: &mut [O],
        output_high_bit: u32,
    );
}

/// Validate a request, then run a kernel over every row of the region.
///
/// Color spaces are checked by the caller,
/// since kernels do not know about them.
pub(crate) fn run_kernel<K: RowKernel>(
    kernel: &K,
    input: &Image,
    region: Region,
    output: &mut Image,
    output_top_left: (u32, u32),
) -> Result<()> {
    check_bounds(input, region, output, output_top_left)?;
    if region.is_empty() {
        return Ok(());
    }

    let source = Geometry {
        x: region.x as usize,
        y: region.y as usize,
        channels: input.channels() as usize,
        row_len: input.row_len(),
        high_bit: input.high_bit(),
    };
    let destination = Geometry {
        x: output_top_left.0 as usize,
        y: output_top_left.1 as usize,
        channels: output.channels() as usize,
        row_len: output.row_len(),
        high_bit: output.high_bit(),
    };
    let width = region.width as usize;
    let height = region.height as usize;
    debug!(
        "running kernel over {}x{} region, {} -> {}",
        width,
        height,
        input.depth(),
        output.depth()
    );

    with_buffer!(input.buffer(), src => {
        with_buffer!(output.buffer_mut(), dst => {
            run_rows(
                kernel,
                src.as_slice(),
                &source,
                dst.as_mut_slice(),
                &destination,
                width,
                height,
            )
        })
    });
    Ok(())
}

/// Where a region sits in a buffer.
struct Geometry {
    x: usize,
    y: usize,
    channels: usize,
    row_len: usize,
    high_bit: u32,
}

fn run_rows<K, I, O>(
    kernel: &K,
    input: &[I],
    source: &Geometry,
    output: &mut [O],
    destination: &Geometry,
    width: usize,
    height: usize,
) where
    K: RowKernel,
    I: Sample,
    O: Sample,
{
    let process = |(row, out_row): (usize, &mut [O])| {
        let start = (source.y + row) * source.row_len + source.x * source.channels;
        let src = &input[start..start + width * source.channels];
        let offset = destination.x * destination.channels;
        let dst = &mut out_row[offset..offset + width * destination.channels];
        kernel.process_row(src, source.high_bit, dst, destination.high_bit);
    };

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        output
            .par_chunks_mut(destination.row_len)
            .skip(destination.y)
            .take(height)
            .enumerate()
            .for_each(process);
    }
    #[cfg(not(feature = "rayon"))]
    {
        output
            .chunks_mut(destination.row_len)
            .skip(destination.y)
            .take(height)
            .enumerate()
            .for_each(process);
    }
}
