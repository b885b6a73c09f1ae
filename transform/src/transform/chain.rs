//! Composition of transforms.

use std::sync::Arc;

use snafu::ensure;
use tracing::debug;

use crate::image::Image;
use crate::transform::color::normalize_color_space;
use crate::transform::high_bit::TransformHighBit;
use crate::transform::{check_bounds, check_color_space, Region, Transform};
use crate::{ColorSpaceMismatchSnafu, Result};

/// An ordered sequence of transforms applied as a single one.
///
/// Each stage reads the output of the previous one;
/// intermediate images are allocated by the stage producing them.
/// Transforms are held by shared reference,
/// so the same transform may also be used elsewhere.
///
/// A chain with no transforms copies its input unchanged.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use dicom_transform::{ColorTransform, Image, PixelBuffer, Transform, TransformsChain};
/// let input = Image::from_buffer(2, 1, "MONOCHROME2", 7, PixelBuffer::U8(vec![3, 200]))?;
/// let mut chain = TransformsChain::new();
/// chain.add_transform(Arc::new(ColorTransform::new("MONOCHROME2", "RGB")?));
/// chain.add_transform(Arc::new(ColorTransform::new("RGB", "MONOCHROME2")?));
/// assert_eq!(chain.apply(&input)?, input);
/// # Ok::<(), dicom_transform::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct TransformsChain {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformsChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform to the chain.
    pub fn add_transform(&mut self, transform: Arc<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// The transforms in the chain, in order of application.
    pub fn transforms(&self) -> &[Arc<dyn Transform>] {
        &self.transforms
    }

    /// The number of transforms in the chain.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check the color space constraints between adjacent transforms.
    fn check_links(&self) -> Result<()> {
        for pair in self.transforms.windows(2) {
            let produced = pair[0].final_color_space();
            let required = pair[1].initial_color_space();
            if produced.is_empty() || required.is_empty() {
                continue;
            }
            ensure!(
                normalize_color_space(produced) == normalize_color_space(required),
                ColorSpaceMismatchSnafu {
                    expected: required,
                    found: produced,
                }
            );
        }
        Ok(())
    }
}

impl Transform for TransformsChain {
    fn initial_color_space(&self) -> &str {
        self.transforms
            .iter()
            .map(|t| t.initial_color_space())
            .find(|cs| !cs.is_empty())
            .unwrap_or("")
    }

    fn final_color_space(&self) -> &str {
        self.transforms
            .iter()
            .rev()
            .map(|t| t.final_color_space())
            .find(|cs| !cs.is_empty())
            .unwrap_or("")
    }

    fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    fn allocate_output_image(&self, input: &Image, width: u32, height: u32) -> Result<Image> {
        let Some((last, stages)) = self.transforms.split_last() else {
            return Ok(Image::new(
                width,
                height,
                input.depth(),
                input.color_space(),
                input.high_bit(),
            )?
            .with_palette(input.palette().cloned()));
        };

        // propagate the image shape without materializing full images
        let mut shape: Option<Image> = None;
        for transform in stages {
            let source = shape.as_ref().unwrap_or(input);
            shape = Some(transform.allocate_output_image(source, 1, 1)?);
        }
        last.allocate_output_image(shape.as_ref().unwrap_or(input), width, height)
    }

    fn run_transform(
        &self,
        input: &Image,
        region: Region,
        output: &mut Image,
        output_top_left: (u32, u32),
    ) -> Result<()> {
        check_bounds(input, region, output, output_top_left)?;
        check_color_space(self.initial_color_space(), input)?;
        check_color_space(self.final_color_space(), output)?;
        self.check_links()?;

        let Some((last, stages)) = self.transforms.split_last() else {
            return TransformHighBit::new().run_transform(input, region, output, output_top_left);
        };
        if region.is_empty() {
            return Ok(());
        }

        let mut intermediate: Option<Image> = None;
        for transform in stages {
            let (source, source_region) = match &intermediate {
                Some(image) => (image, Region::full(image)),
                None => (input, region),
            };
            let mut next =
                transform.allocate_output_image(source, region.width, region.height)?;
            debug!(
                "chain intermediate: {}x{} {} {}",
                next.width(),
                next.height(),
                next.depth(),
                next.color_space()
            );
            transform.run_transform(source, source_region, &mut next, (0, 0))?;
            intermediate = Some(next);
        }

        match &intermediate {
            Some(image) => last.run_transform(image, Region::full(image), output, output_top_left),
            None => last.run_transform(input, region, output, output_top_left),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{BitDepth, PixelBuffer};
    use crate::transform::color::ColorTransform;
    use crate::transform::modality::{ModalityVoiLut, Rescale};
    use crate::transform::voi::VoiLut;
    use crate::Error;

    fn samples() -> Image {
        Image::from_buffer(
            3,
            2,
            "MONOCHROME2",
            7,
            PixelBuffer::U8(vec![0, 10, 20, 30, 40, 50]),
        )
        .unwrap()
    }

    #[test]
    fn empty_chain_copies() {
        let chain = TransformsChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.initial_color_space(), "");
        let input = samples();
        let output = chain.apply(&input).unwrap();
        assert_eq!(output, input);

        let mut output = Image::new(2, 2, BitDepth::U8, "MONOCHROME2", 7).unwrap();
        chain
            .run_transform(&input, Region::new(1, 0, 2, 2), &mut output, (0, 0))
            .unwrap();
        assert_eq!(output.buffer(), &PixelBuffer::U8(vec![10, 20, 40, 50]));
    }

    #[test]
    fn shared_transforms() {
        let to_rgb: Arc<dyn Transform> = Arc::new(ColorTransform::new("MONOCHROME2", "RGB").unwrap());
        let mut chain = TransformsChain::new();
        chain.add_transform(to_rgb.clone());
        chain.add_transform(Arc::new(ColorTransform::new("RGB", "MONOCHROME2").unwrap()));
        assert_eq!(Arc::strong_count(&to_rgb), 2);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.initial_color_space(), "MONOCHROME2");
        assert_eq!(chain.final_color_space(), "MONOCHROME2");

        let input = samples();
        assert_eq!(chain.apply(&input).unwrap(), input);
        // the shared transform is still usable on its own
        assert_eq!(to_rgb.apply(&input).unwrap().channels(), 3);
    }

    #[test]
    fn allocation_follows_the_whole_chain() {
        let mut chain = TransformsChain::new();
        chain.add_transform(Arc::new(ModalityVoiLut::from_rescale(Rescale::new(2., -1.))));
        chain.add_transform(Arc::new(VoiLut::with_center_width(49., 100.).unwrap()));
        chain.add_transform(Arc::new(ColorTransform::new("MONOCHROME2", "RGB").unwrap()));

        let input = samples();
        let before = input.clone();
        let output = chain.allocate_output_image(&input, 7, 5).unwrap();
        assert_eq!(input, before);
        assert_eq!((output.width(), output.height()), (7, 5));
        assert_eq!(output.depth(), BitDepth::U16);
        assert_eq!(output.high_bit(), 15);
        assert_eq!(output.color_space(), "RGB");

        let output = chain.apply(&input).unwrap();
        assert_eq!(output.channels(), 3);
        // rescaled values -1..99 fill the window 0..100 in order
        let grays: Vec<i64> = (0..6).map(|i| output.get(i * 3)).collect();
        assert!(grays.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(output.get(1), output.get(0));
    }

    #[test]
    fn mismatched_links_are_rejected() {
        let mut chain = TransformsChain::new();
        chain.add_transform(Arc::new(ColorTransform::new("MONOCHROME2", "RGB").unwrap()));
        chain.add_transform(Arc::new(ColorTransform::new("YBR_FULL", "RGB").unwrap()));
        let input = samples();
        let mut output = Image::new(3, 2, BitDepth::U8, "RGB", 7).unwrap();
        let err = chain
            .run_transform(&input, Region::full(&input), &mut output, (0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::ColorSpaceMismatch { .. }));
        assert!(matches!(output.buffer(), PixelBuffer::U8(d) if d.iter().all(|&v| v == 0)));
    }
}
