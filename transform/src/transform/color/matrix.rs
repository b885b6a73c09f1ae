//! Fixed-point color matrices.
//!
//! Coefficients are scaled by 16384 (14-bit fixed point).
//! Each output channel is a dot product of the recentered input channels,
//! rounded by adding 8191 before an arithmetic shift by 14 bits,
//! so negative products round down like positive ones.

use crate::sample::{num_values, Sample, SampleRange};
use crate::transform::RowKernel;

const SHIFT: u32 = 14;
const ROUNDING: i64 = 8191;

/// An origin within the value range of a channel,
/// relative to the range minimum.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Origin {
    /// the minimum value
    Minimum,
    /// the luma floor of partial range encodings: `2^(high_bit - 3)`
    Floor,
    /// the middle of the range: `2^high_bit`
    Middle,
}

impl Origin {
    #[inline]
    fn relative(self, high_bit: u32) -> i64 {
        match self {
            Origin::Minimum => 0,
            Origin::Floor if high_bit >= 3 => 1 << (high_bit - 3),
            Origin::Floor => 0,
            Origin::Middle => 1 << high_bit,
        }
    }
}

/// A conversion between two color spaces
/// expressed as a matrix over the input channels.
#[derive(Debug, PartialEq)]
pub(crate) struct ColorMatrix {
    /// the origin subtracted from each input channel
    pub inputs: &'static [Origin],
    /// the coefficients and the output origin of each output channel
    pub outputs: &'static [([i64; 3], Origin)],
    /// whether outputs are mirrored within the range
    pub invert: bool,
}

impl RowKernel for ColorMatrix {
    fn process_row<I: Sample, O: Sample>(
        &self,
        input: &[I],
        input_high_bit: u32,
        output: &mut [O],
        output_high_bit: u32,
    ) {
        let input_range = SampleRange::of::<I>(input_high_bit);
        let output_range = SampleRange::of::<O>(output_high_bit);
        let ceiling = num_values(input_high_bit);

        let mut origins = [0_i64; 3];
        for (origin, o) in self.inputs.iter().zip(origins.iter_mut()) {
            *o = input_range.min + origin.relative(input_high_bit);
        }

        let pixels = input
            .chunks_exact(self.inputs.len())
            .zip(output.chunks_exact_mut(self.outputs.len()));
        for (src, dst) in pixels {
            let mut x = [0_i64; 3];
            for ((v, s), origin) in x.iter_mut().zip(src).zip(&origins) {
                *v = s.widen() - origin;
            }
            for (d, (coefficients, origin)) in dst.iter_mut().zip(self.outputs) {
                let dot: i64 = coefficients.iter().zip(&x).map(|(c, v)| c * v).sum();
                let mut value = ((dot + ROUNDING) >> SHIFT) + origin.relative(input_high_bit);
                if self.invert {
                    value = ceiling - 1 - value;
                }
                *d = O::saturate(output_range.store(value, ceiling));
            }
        }
    }
}

use Origin::{Floor, Middle, Minimum};

pub(crate) static YBR_PARTIAL_TO_RGB: ColorMatrix = ColorMatrix {
    inputs: &[Floor, Middle, Middle],
    outputs: &[
        ([19071, 0, 26148], Minimum),
        ([19071, -6406, -13320], Minimum),
        ([19071, 33063, 0], Minimum),
    ],
    invert: false,
};

pub(crate) static RGB_TO_YBR_PARTIAL: ColorMatrix = ColorMatrix {
    inputs: &[Minimum, Minimum, Minimum],
    outputs: &[
        ([4207, 8260, 1604], Floor),
        ([-2428, -4768, 7196], Middle),
        ([7196, -6026, -1170], Middle),
    ],
    invert: false,
};

pub(crate) static YBR_FULL_TO_RGB: ColorMatrix = ColorMatrix {
    inputs: &[Minimum, Middle, Middle],
    outputs: &[
        ([16384, 0, 22970], Minimum),
        ([16384, -5638, -11700], Minimum),
        ([16384, 29032, 0], Minimum),
    ],
    invert: false,
};

pub(crate) static RGB_TO_YBR_FULL: ColorMatrix = ColorMatrix {
    inputs: &[Minimum, Minimum, Minimum],
    outputs: &[
        ([4899, 9617, 1868], Minimum),
        ([-2765, -5427, 8192], Middle),
        ([8192, -6860, -1332], Middle),
    ],
    invert: false,
};

pub(crate) static RGB_TO_MONOCHROME2: ColorMatrix = ColorMatrix {
    inputs: &[Minimum, Minimum, Minimum],
    outputs: &[([4899, 9617, 1868], Minimum)],
    invert: false,
};

pub(crate) static RGB_TO_MONOCHROME1: ColorMatrix = ColorMatrix {
    inputs: &[Minimum, Minimum, Minimum],
    outputs: &[([4899, 9617, 1868], Minimum)],
    invert: true,
};

pub(crate) static MONOCHROME2_TO_RGB: ColorMatrix = ColorMatrix {
    inputs: &[Minimum],
    outputs: &[
        ([16384, 0, 0], Minimum),
        ([16384, 0, 0], Minimum),
        ([16384, 0, 0], Minimum),
    ],
    invert: false,
};

pub(crate) static MONOCHROME1_TO_RGB: ColorMatrix = ColorMatrix {
    inputs: &[Minimum],
    outputs: &[
        ([16384, 0, 0], Minimum),
        ([16384, 0, 0], Minimum),
        ([16384, 0, 0], Minimum),
    ],
    invert: true,
};

pub(crate) static MONOCHROME_INVERT: ColorMatrix = ColorMatrix {
    inputs: &[Minimum],
    outputs: &[([16384, 0, 0], Minimum)],
    invert: true,
};

pub(crate) static MONOCHROME2_TO_YBR_FULL: ColorMatrix = ColorMatrix {
    inputs: &[Minimum],
    outputs: &[
        ([16384, 0, 0], Minimum),
        ([0, 0, 0], Middle),
        ([0, 0, 0], Middle),
    ],
    invert: false,
};

pub(crate) static YBR_FULL_TO_MONOCHROME2: ColorMatrix = ColorMatrix {
    inputs: &[Minimum, Middle, Middle],
    outputs: &[([16384, 0, 0], Minimum)],
    invert: false,
};

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn convert<I: Sample, O: Sample>(matrix: &ColorMatrix, input: &[I], high_bit: u32) -> Vec<O> {
        let mut output = vec![O::zero(); input.len() / matrix.inputs.len() * matrix.outputs.len()];
        matrix.process_row(input, high_bit, &mut output, high_bit);
        output
    }

    #[rstest]
    #[case([235, 128, 128], [255, 255, 255])]
    #[case([255, 128, 128], [255, 255, 255])]
    #[case([16, 128, 128], [0, 0, 0])]
    #[case([0, 128, 128], [0, 0, 0])]
    #[case([81, 91, 240], [254, 0, 1])]
    fn ybr_partial_to_rgb(#[case] ybr: [u8; 3], #[case] rgb: [u8; 3]) {
        assert_eq!(convert::<u8, u8>(&YBR_PARTIAL_TO_RGB, &ybr, 7), rgb);
    }

    #[rstest]
    #[case([255, 255, 255], [235, 128, 128])]
    #[case([0, 0, 0], [16, 128, 128])]
    #[case([255, 0, 0], [81, 90, 240])]
    fn rgb_to_ybr_partial(#[case] rgb: [u8; 3], #[case] ybr: [u8; 3]) {
        assert_eq!(convert::<u8, u8>(&RGB_TO_YBR_PARTIAL, &rgb, 7), ybr);
    }

    #[test]
    fn negative_chroma_rounds_down() {
        // Cr: (-168480 + 8191) / 16384 is about -9.78
        assert_eq!(
            convert::<u8, u8>(&RGB_TO_YBR_PARTIAL, &[32, 32, 176], 7),
            [58, 191, 118]
        );
    }

    #[test]
    fn rgb_to_ybr_full_white() {
        assert_eq!(
            convert::<u8, u8>(&RGB_TO_YBR_FULL, &[255, 255, 255], 7),
            [255, 128, 128]
        );
        assert_eq!(
            convert::<u8, u8>(&YBR_FULL_TO_RGB, &[255, 128, 128], 7),
            [255, 255, 255]
        );
    }

    #[test]
    fn signed_samples_are_recentered() {
        // black and white in signed 8-bit storage
        let out = convert::<i8, i8>(&RGB_TO_MONOCHROME2, &[-128, -128, -128, 127, 127, 127], 7);
        assert_eq!(out, [-128, 127]);
        let out = convert::<i8, u8>(&RGB_TO_MONOCHROME2, &[127, 127, 127], 7);
        assert_eq!(out, [255]);
    }

    #[test]
    fn monochrome_inversion() {
        assert_eq!(convert::<u8, u8>(&MONOCHROME_INVERT, &[0, 10, 255], 7), [255, 245, 0]);
        assert_eq!(
            convert::<u16, u16>(&MONOCHROME1_TO_RGB, &[0, 4095], 11),
            [4095, 4095, 4095, 0, 0, 0]
        );
    }

    #[test]
    fn monochrome_to_ybr_full_is_gray() {
        assert_eq!(
            convert::<u8, u8>(&MONOCHROME2_TO_YBR_FULL, &[77], 7),
            [77, 128, 128]
        );
        assert_eq!(
            convert::<u8, u8>(&YBR_FULL_TO_MONOCHROME2, &[77, 128, 128], 7),
            [77]
        );
    }
}
