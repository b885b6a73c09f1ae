//! Rendering images into 8-bit bitmaps.

use std::borrow::Cow;
use std::sync::Arc;

use crate::image::{BitDepth, Image};
use crate::transform::color::{color_transform, normalize_color_space};
use crate::transform::high_bit::TransformHighBit;
use crate::transform::Transform;
use crate::Result;

/// The memory layout of a rendered bitmap pixel.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum BitmapType {
    /// red, green, blue
    #[default]
    Rgb,
    /// blue, green, red
    Bgr,
    /// red, green, blue, alpha
    Rgba,
    /// blue, green, red, alpha
    Bgra,
}

impl BitmapType {
    /// The number of bytes of each pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            BitmapType::Rgb | BitmapType::Bgr => 3,
            BitmapType::Rgba | BitmapType::Bgra => 4,
        }
    }

    fn is_bgr(self) -> bool {
        matches!(self, BitmapType::Bgr | BitmapType::Bgra)
    }

    fn has_alpha(self) -> bool {
        matches!(self, BitmapType::Rgba | BitmapType::Bgra)
    }
}

/// Renders images into packed 8-bit bitmaps,
/// optionally applying a transform first
/// (typically a modality and VOI chain).
///
/// The image is then converted to RGB
/// and its samples narrowed to 8 bits.
#[derive(Debug, Clone, Default)]
pub struct DrawBitmap {
    transform: Option<Arc<dyn Transform>>,
}

impl DrawBitmap {
    /// Create a bitmap renderer.
    pub fn new(transform: Option<Arc<dyn Transform>>) -> Self {
        DrawBitmap { transform }
    }

    /// Render the image into 8-bit RGB samples,
    /// row after row without padding.
    pub fn render(&self, image: &Image) -> Result<Image> {
        let mut current = Cow::Borrowed(image);
        if let Some(transform) = self.transform.as_ref().filter(|t| !t.is_empty()) {
            current = Cow::Owned(transform.apply(&current)?);
        }
        if normalize_color_space(current.color_space()) != "RGB" {
            let to_rgb = color_transform(current.color_space(), "RGB")?;
            current = Cow::Owned(to_rgb.apply(&current)?);
        }
        if current.depth() != BitDepth::U8 || current.high_bit() != 7 {
            current = Cow::Owned(TransformHighBit::with_output(BitDepth::U8, 7).apply(&current)?);
        }
        Ok(current.into_owned())
    }

    /// Render the image into a bitmap of the given type.
    ///
    /// Each row is padded with zeros
    /// up to a multiple of `row_align` bytes.
    pub fn bitmap(&self, image: &Image, kind: BitmapType, row_align: usize) -> Result<Vec<u8>> {
        Ok(pack(&self.render(image)?, kind, row_align))
    }

    /// Render the image into an RGB [`DynamicImage`](::image::DynamicImage).
    #[cfg(feature = "image")]
    pub fn to_dynamic_image(&self, image: &Image) -> Result<::image::DynamicImage> {
        use snafu::OptionExt;

        let rgb = self.render(image)?;
        let data = pack(&rgb, BitmapType::Rgb, 1);
        let got = data.len();
        let buffer = ::image::RgbImage::from_raw(rgb.width(), rgb.height(), data).context(
            crate::InvalidBufferLengthSnafu {
                expected: rgb.width() as usize * rgb.height() as usize * 3,
                got,
            },
        )?;
        Ok(::image::DynamicImage::ImageRgb8(buffer))
    }
}

fn pack(rgb: &Image, kind: BitmapType, row_align: usize) -> Vec<u8> {
    let width = rgb.width() as usize;
    let row_len = width * kind.bytes_per_pixel();
    let stride = match row_align {
        0 | 1 => row_len,
        align => row_len.div_ceil(align) * align,
    };

    let mut out = Vec::with_capacity(stride * rgb.height() as usize);
    for y in 0..rgb.height() as usize {
        for x in 0..width {
            let i = (y * width + x) * 3;
            let (r, g, b) = (rgb.get(i) as u8, rgb.get(i + 1) as u8, rgb.get(i + 2) as u8);
            if kind.is_bgr() {
                out.extend_from_slice(&[b, g, r]);
            } else {
                out.extend_from_slice(&[r, g, b]);
            }
            if kind.has_alpha() {
                out.push(0xFF);
            }
        }
        out.resize(out.len() + stride - row_len, 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelBuffer;
    use crate::transform::voi::VoiLut;

    fn gray() -> Image {
        Image::from_buffer(
            3,
            1,
            "MONOCHROME2",
            11,
            PixelBuffer::U16(vec![0, 2048, 4095]),
        )
        .unwrap()
    }

    #[test]
    fn monochrome_to_rgb_bitmap() {
        let draw = DrawBitmap::new(None);
        let bitmap = draw.bitmap(&gray(), BitmapType::Rgb, 1).unwrap();
        assert_eq!(bitmap, vec![0, 0, 0, 128, 128, 128, 255, 255, 255]);
    }

    #[test]
    fn rows_are_padded() {
        let draw = DrawBitmap::new(None);
        let bitmap = draw.bitmap(&gray(), BitmapType::Rgb, 4).unwrap();
        assert_eq!(bitmap.len(), 12);
        assert_eq!(&bitmap[9..], &[0, 0, 0]);

        let bitmap = draw.bitmap(&gray(), BitmapType::Bgra, 8).unwrap();
        assert_eq!(bitmap.len(), 16);
        assert_eq!(&bitmap[4..8], &[128, 128, 128, 255]);
    }

    #[test]
    fn channel_order() {
        let rgb = Image::from_buffer(1, 1, "RGB", 7, PixelBuffer::U8(vec![1, 2, 3])).unwrap();
        let draw = DrawBitmap::default();
        assert_eq!(draw.bitmap(&rgb, BitmapType::Bgr, 1).unwrap(), vec![3, 2, 1]);
        assert_eq!(
            draw.bitmap(&rgb, BitmapType::Rgba, 1).unwrap(),
            vec![1, 2, 3, 255]
        );
    }

    #[test]
    fn transform_is_applied_first() {
        let voi: Arc<dyn Transform> = Arc::new(VoiLut::with_center_width(1024., 2048.).unwrap());
        let draw = DrawBitmap::new(Some(voi));
        let bitmap = draw.bitmap(&gray(), BitmapType::Rgb, 1).unwrap();
        assert_eq!(&bitmap[0..3], &[0, 0, 0]);
        assert_eq!(&bitmap[3..6], &[255, 255, 255]);
    }
}
