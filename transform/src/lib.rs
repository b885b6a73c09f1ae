//! This crate contains the DICOM image transform pipeline:
//! composable operations which convert decoded pixel data
//! between color spaces, bit depths,
//! and clinically meaningful intensity ranges.
//!
//! - [`image`] defines the in-memory [`Image`] model
//!   over runtime-typed pixel storage.
//! - [`lut`] defines look-up tables and palettes.
//! - [`transform`] defines the [`Transform`] contract
//!   and all concrete transforms:
//!   color conversions, [`TransformHighBit`],
//!   [`ModalityVoiLut`], [`VoiLut`], and [`TransformsChain`].
//! - [`attribute`] and [`dataset`] read the relevant attributes
//!   and native pixel data out of a DICOM object.
//! - [`bitmap`] renders an image into a packed 8-bit bitmap.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! use dicom_transform::{read_image, ModalityVoiLut, Region, Transform, TransformsChain, VoiLut};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let obj = dicom_object::open_file("ct.dcm")?;
//! let image = read_image(&obj, 0)?;
//!
//! let modality = ModalityVoiLut::from_dataset(&obj)?;
//! let mut voi = VoiLut::from_dataset(&obj)?;
//! if voi.window_level().is_none() && voi.lut().is_none() {
//!     let rescaled = modality.apply(&image)?;
//!     voi.apply_optimal_voi(&rescaled, Region::full(&rescaled))?;
//! }
//!
//! let mut chain = TransformsChain::new();
//! chain.add_transform(Arc::new(modality));
//! chain.add_transform(Arc::new(voi));
//! let output = chain.apply(&image)?;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]

use snafu::{Backtrace, Snafu};

pub mod attribute;
pub mod bitmap;
pub mod dataset;
pub mod image;
pub mod lut;
pub mod sample;
pub mod transform;

pub use crate::bitmap::{BitmapType, DrawBitmap};
pub use crate::dataset::read_image;
pub use crate::image::{BitDepth, Image, PixelBuffer};
pub use crate::lut::{Lut, Palette};
pub use crate::sample::Sample;
pub use crate::transform::chain::TransformsChain;
pub use crate::transform::color::{color_transform, ColorTransform};
pub use crate::transform::high_bit::TransformHighBit;
pub use crate::transform::modality::{ModalityVoiLut, Rescale};
pub use crate::transform::voi::{VoiLut, WindowLevel};
pub use crate::transform::{Region, Transform};

/// An error raised by the image transform pipeline.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The color space of an image does not match
    /// what the transform requires or produces.
    #[snafu(display("Expected color space {}, but image is {}", expected, found))]
    ColorSpaceMismatch {
        expected: String,
        found: String,
        backtrace: Backtrace,
    },

    /// A region lies outside of the image.
    #[snafu(display(
        "Region {}x{} at ({}, {}) out of bounds of {}x{} image",
        width,
        height,
        x,
        y,
        image_width,
        image_height
    ))]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
        backtrace: Backtrace,
    },

    /// The window parameters are not usable.
    #[snafu(display("Invalid window center {} / width {}", center, width))]
    InvalidWindowParameters {
        center: f64,
        width: f64,
        backtrace: Backtrace,
    },

    /// There is no known conversion between two color spaces.
    #[snafu(display("Unsupported conversion from {} to {}", from, to))]
    UnsupportedConversion {
        from: String,
        to: String,
        backtrace: Backtrace,
    },

    /// The high bit does not fit in the pixel storage.
    #[snafu(display("High bit {} does not fit in {} storage", high_bit, depth))]
    InvalidHighBit {
        high_bit: u32,
        depth: BitDepth,
        backtrace: Backtrace,
    },

    /// The pixel buffer does not match the image shape.
    #[snafu(display("Expected {} pixel samples, got {}", expected, got))]
    InvalidBufferLength {
        expected: usize,
        got: usize,
        backtrace: Backtrace,
    },

    /// The number of channels is not the one the transform works on.
    #[snafu(display("Expected {} channels, got {}", expected, got))]
    ChannelsMismatch {
        expected: u32,
        got: u32,
        backtrace: Backtrace,
    },

    /// A palette color image has no palette attached.
    #[snafu(display("Palette color image has no palette"))]
    MissingPalette { backtrace: Backtrace },

    /// An attribute could not be read from the DICOM object.
    #[snafu(display("Could not read attribute"))]
    GetAttribute {
        #[snafu(backtrace)]
        source: attribute::GetAttributeError,
    },

    /// The pixel data cannot be read into an image.
    #[snafu(display("Unsupported pixel data: {}", reason))]
    UnsupportedPixelData {
        reason: String,
        backtrace: Backtrace,
    },
}

/// Type alias for a result from this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
