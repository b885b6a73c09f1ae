//! Color space conversions.
//!
//! A [`ColorTransform`] converts between two named color spaces.
//! It is generic over the storage of both images:
//! results are computed relative to the input range
//! and anchored to the output range,
//! so a color transform also adapts between bit depths.
//!
//! [`color_transform`] finds a conversion between any two
//! supported color spaces, going through RGB when needed.

use std::sync::Arc;

use snafu::OptionExt;
use tracing::debug;

use crate::image::{channels_for_color_space, BitDepth, Image};
use crate::transform::chain::TransformsChain;
use crate::transform::{check_bounds, check_color_spaces, run_kernel, Region, Transform};
use crate::{MissingPaletteSnafu, Result, UnsupportedConversionSnafu};

mod matrix;
mod palette;

use self::matrix::ColorMatrix;
use self::palette::PaletteLookup;

/// Normalize a color space name:
/// surrounding spaces are removed,
/// letters are uppercased
/// and the subsampling suffix (`_422`, `_420`) is dropped.
pub fn normalize_color_space(color_space: &str) -> String {
    let normalized = color_space.trim().to_uppercase();
    match normalized
        .strip_suffix("_422")
        .or_else(|| normalized.strip_suffix("_420"))
    {
        Some(base) => base.to_string(),
        None => normalized,
    }
}

/// Whether the color space is a monochrome one.
pub fn is_monochrome(color_space: &str) -> bool {
    normalize_color_space(color_space).starts_with("MONOCHROME")
}

/// Whether the color space declares horizontally subsampled chroma.
pub fn is_subsampled_x(color_space: &str) -> bool {
    let cs = color_space.trim().to_uppercase();
    cs.ends_with("_422") || cs.ends_with("_420")
}

/// Whether the color space declares vertically subsampled chroma.
pub fn is_subsampled_y(color_space: &str) -> bool {
    color_space.trim().to_uppercase().ends_with("_420")
}

/// Whether the color space supports chroma subsampling.
pub fn can_subsample(color_space: &str) -> bool {
    normalize_color_space(color_space).starts_with("YBR_")
}

/// Name the subsampled variant of a color space.
///
/// Color spaces which cannot be subsampled are returned normalized.
pub fn make_subsampled(color_space: &str, subsample_x: bool, subsample_y: bool) -> String {
    let normalized = normalize_color_space(color_space);
    if !can_subsample(&normalized) {
        return normalized;
    }
    if subsample_y {
        normalized + "_420"
    } else if subsample_x {
        normalized + "_422"
    } else {
        normalized
    }
}

/// The number of channels of a color space.
pub fn channels_count(color_space: &str) -> u32 {
    channels_for_color_space(color_space)
}

#[derive(Debug, PartialEq)]
enum Conversion {
    Matrix(&'static ColorMatrix),
    Palette,
}

/// The registry of direct conversions.
static CONVERSIONS: &[(&str, &str, Conversion)] = &[
    ("RGB", "YBR_FULL", Conversion::Matrix(&matrix::RGB_TO_YBR_FULL)),
    ("YBR_FULL", "RGB", Conversion::Matrix(&matrix::YBR_FULL_TO_RGB)),
    ("RGB", "YBR_ICT", Conversion::Matrix(&matrix::RGB_TO_YBR_FULL)),
    ("YBR_ICT", "RGB", Conversion::Matrix(&matrix::YBR_FULL_TO_RGB)),
    ("RGB", "YBR_PARTIAL", Conversion::Matrix(&matrix::RGB_TO_YBR_PARTIAL)),
    ("YBR_PARTIAL", "RGB", Conversion::Matrix(&matrix::YBR_PARTIAL_TO_RGB)),
    ("RGB", "MONOCHROME2", Conversion::Matrix(&matrix::RGB_TO_MONOCHROME2)),
    ("RGB", "MONOCHROME1", Conversion::Matrix(&matrix::RGB_TO_MONOCHROME1)),
    ("MONOCHROME2", "RGB", Conversion::Matrix(&matrix::MONOCHROME2_TO_RGB)),
    ("MONOCHROME1", "RGB", Conversion::Matrix(&matrix::MONOCHROME1_TO_RGB)),
    ("MONOCHROME1", "MONOCHROME2", Conversion::Matrix(&matrix::MONOCHROME_INVERT)),
    ("MONOCHROME2", "MONOCHROME1", Conversion::Matrix(&matrix::MONOCHROME_INVERT)),
    ("MONOCHROME2", "YBR_FULL", Conversion::Matrix(&matrix::MONOCHROME2_TO_YBR_FULL)),
    ("YBR_FULL", "MONOCHROME2", Conversion::Matrix(&matrix::YBR_FULL_TO_MONOCHROME2)),
    ("PALETTE COLOR", "RGB", Conversion::Palette),
];

/// A direct conversion between two color spaces.
///
/// # Example
///
/// ```
/// # use dicom_transform::{ColorTransform, Image, PixelBuffer, Transform};
/// let ybr = Image::from_buffer(1, 1, "YBR_PARTIAL", 7, PixelBuffer::U8(vec![235, 128, 128]))?;
/// let rgb = ColorTransform::new("YBR_PARTIAL", "RGB")?.apply(&ybr)?;
/// assert_eq!(rgb.buffer(), &PixelBuffer::U8(vec![255, 255, 255]));
/// # Ok::<(), dicom_transform::Error>(())
/// ```
#[derive(Debug)]
pub struct ColorTransform {
    from: &'static str,
    to: &'static str,
    conversion: &'static Conversion,
}

impl ColorTransform {
    /// Create the direct conversion between two color spaces.
    ///
    /// Fails with [`UnsupportedConversion`](crate::Error::UnsupportedConversion)
    /// if there is no direct conversion.
    /// Use [`color_transform`] to also obtain indirect conversions.
    pub fn new(from: &str, to: &str) -> Result<Self> {
        Self::lookup(&normalize_color_space(from), &normalize_color_space(to))
            .context(UnsupportedConversionSnafu { from, to })
    }

    fn lookup(from: &str, to: &str) -> Option<Self> {
        CONVERSIONS
            .iter()
            .find(|(f, t, _)| *f == from && *t == to)
            .map(|(from, to, conversion)| ColorTransform {
                from: *from,
                to: *to,
                conversion,
            })
    }
}

impl Transform for ColorTransform {
    fn initial_color_space(&self) -> &str {
        self.from
    }

    fn final_color_space(&self) -> &str {
        self.to
    }

    fn allocate_output_image(&self, input: &Image, width: u32, height: u32) -> Result<Image> {
        match self.conversion {
            Conversion::Matrix(_) => {
                Image::new(width, height, input.depth(), self.to, input.high_bit())
            }
            Conversion::Palette => {
                let bits = input.palette().map(|p| p.bits()).unwrap_or(8);
                let depth = if bits <= 8 {
                    BitDepth::U8
                } else {
                    BitDepth::U16
                };
                Image::new(width, height, depth, self.to, bits - 1)
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
        check_color_spaces(self, input, output)?;
        match self.conversion {
            Conversion::Matrix(matrix) => run_kernel(*matrix, input, region, output, output_top_left),
            Conversion::Palette => {
                check_bounds(input, region, output, output_top_left)?;
                let palette = input.palette().context(MissingPaletteSnafu)?;
                run_kernel(
                    &PaletteLookup { palette },
                    input,
                    region,
                    output,
                    output_top_left,
                )
            }
        }
    }
}

/// Obtain a transform converting images from one color space to another.
///
/// - Equal color spaces (after normalization) yield an empty chain.
/// - Registered pairs yield a direct [`ColorTransform`].
/// - Other pairs are converted through RGB with a two stage chain.
///
/// Fails with [`UnsupportedConversion`](crate::Error::UnsupportedConversion)
/// if no path exists.
pub fn color_transform(from: &str, to: &str) -> Result<Arc<dyn Transform>> {
    let initial = normalize_color_space(from);
    let target = normalize_color_space(to);

    if initial == target {
        return Ok(Arc::new(TransformsChain::new()));
    }
    if let Some(direct) = ColorTransform::lookup(&initial, &target) {
        return Ok(Arc::new(direct));
    }

    let to_rgb = ColorTransform::lookup(&initial, "RGB");
    let from_rgb = ColorTransform::lookup("RGB", &target);
    match (to_rgb, from_rgb) {
        (Some(first), Some(second)) => {
            debug!("converting {} to {} through RGB", initial, target);
            let mut chain = TransformsChain::new();
            chain.add_transform(Arc::new(first));
            chain.add_transform(Arc::new(second));
            Ok(Arc::new(chain))
        }
        _ => UnsupportedConversionSnafu { from, to }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelBuffer;
    use crate::lut::{Lut, Palette};
    use crate::Error;
    use rstest::rstest;

    #[rstest]
    #[case(" ybr_full_422 ", "YBR_FULL")]
    #[case("YBR_PARTIAL_420", "YBR_PARTIAL")]
    #[case("MONOCHROME2", "MONOCHROME2")]
    #[case("palette color", "PALETTE COLOR")]
    fn normalization(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_color_space(input), expected);
    }

    #[test]
    fn subsampling_names() {
        assert!(is_subsampled_x("YBR_FULL_422"));
        assert!(!is_subsampled_y("YBR_FULL_422"));
        assert!(is_subsampled_x("YBR_FULL_420"));
        assert!(is_subsampled_y("YBR_FULL_420"));
        assert!(!is_subsampled_x("RGB"));
        assert!(can_subsample("YBR_PARTIAL"));
        assert!(!can_subsample("RGB"));
        assert_eq!(make_subsampled("YBR_FULL", true, false), "YBR_FULL_422");
        assert_eq!(make_subsampled("YBR_FULL", true, true), "YBR_FULL_420");
        assert_eq!(make_subsampled("RGB", true, true), "RGB");
        assert!(is_monochrome("monochrome1"));
        assert_eq!(channels_count("YBR_ICT"), 3);
        assert_eq!(channels_count("MONOCHROME2"), 1);
    }

    #[test]
    fn wrong_input_color_space_is_rejected() {
        let transform = ColorTransform::new("YBR_PARTIAL", "RGB").unwrap();
        let input = Image::new(1, 1, BitDepth::U8, "YBR_FULL", 7).unwrap();
        let mut output = Image::new(1, 1, BitDepth::U8, "RGB", 7).unwrap();
        let err = transform
            .run_transform(&input, Region::full(&input), &mut output, (0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::ColorSpaceMismatch { .. }));

        let mut output = Image::new(1, 1, BitDepth::U8, "MONOCHROME2", 7).unwrap();
        let input = Image::new(1, 1, BitDepth::U8, "YBR_PARTIAL", 7).unwrap();
        let err = transform
            .run_transform(&input, Region::full(&input), &mut output, (0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::ColorSpaceMismatch { .. }));
    }

    #[test]
    fn unsupported_pairs() {
        assert!(matches!(
            ColorTransform::new("MONOCHROME2", "YBR_PARTIAL"),
            Err(Error::UnsupportedConversion { .. })
        ));
        assert!(matches!(
            color_transform("RGB", "PALETTE COLOR"),
            Err(Error::UnsupportedConversion { .. })
        ));
    }

    #[test]
    fn factory_paths() {
        let t = color_transform("YBR_FULL_422", "ybr_full").unwrap();
        assert!(t.is_empty());

        let t = color_transform("YBR_PARTIAL", "RGB").unwrap();
        assert_eq!(t.initial_color_space(), "YBR_PARTIAL");
        assert_eq!(t.final_color_space(), "RGB");

        // no direct conversion, goes through RGB
        let t = color_transform("YBR_PARTIAL", "MONOCHROME1").unwrap();
        assert!(!t.is_empty());
        assert_eq!(t.initial_color_space(), "YBR_PARTIAL");
        assert_eq!(t.final_color_space(), "MONOCHROME1");
        let input =
            Image::from_buffer(1, 1, "YBR_PARTIAL", 7, PixelBuffer::U8(vec![235, 128, 128]))
                .unwrap();
        let output = t.apply(&input).unwrap();
        assert_eq!(output.color_space(), "MONOCHROME1");
        assert_eq!(output.get(0), 0);
    }

    #[test]
    fn palette_to_rgb() {
        let palette = Palette::new(
            Lut::new(16, 0, vec![0, 0xFFFF, 0x8000]).unwrap(),
            Lut::new(16, 0, vec![0, 0, 0x8000]).unwrap(),
            Lut::new(16, 0, vec![0xFFFF, 0, 0x8000]).unwrap(),
        );
        let input = Image::from_buffer(3, 1, "PALETTE COLOR", 7, PixelBuffer::U8(vec![0, 1, 2]))
            .unwrap()
            .with_palette(Some(Arc::new(palette)));
        let transform = ColorTransform::new("PALETTE COLOR", "RGB").unwrap();
        let output = transform.apply(&input).unwrap();
        assert_eq!(output.depth(), BitDepth::U16);
        assert_eq!(output.high_bit(), 15);
        assert_eq!(
            output.buffer(),
            &PixelBuffer::U16(vec![0, 0, 0xFFFF, 0xFFFF, 0, 0, 0x8000, 0x8000, 0x8000])
        );

        let bare = Image::new(1, 1, BitDepth::U8, "PALETTE COLOR", 7).unwrap();
        let mut output = transform.allocate_output_image(&bare, 1, 1).unwrap();
        let err = transform
            .run_transform(&bare, Region::full(&bare), &mut output, (0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::MissingPalette { .. }));
    }
}
