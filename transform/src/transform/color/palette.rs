//! Palette color lookup.

use crate::lut::{Lut, Palette};
use crate::sample::{Sample, SampleRange};
use crate::transform::RowKernel;

/// Expands palette indices into red, green and blue samples.
#[derive(Debug)]
pub(crate) struct PaletteLookup<'a> {
    pub palette: &'a Palette,
}

/// Align a LUT entry to the bit width of the output.
#[inline]
fn align(lut: &Lut, index: i64, output_bits: u32) -> i64 {
    let value = lut.mapped_value(index) as i64;
    let bits = lut.bits();
    if output_bits >= bits {
        value << (output_bits - bits)
    } else {
        value >> (bits - output_bits)
    }
}

impl RowKernel for PaletteLookup<'_> {
    fn process_row<I: Sample, O: Sample>(
        &self,
        input: &[I],
        _input_high_bit: u32,
        output: &mut [O],
        output_high_bit: u32,
    ) {
        let range = SampleRange::of::<O>(output_high_bit);
        let bits = output_high_bit + 1;
        let luts = [&self.palette.red, &self.palette.green, &self.palette.blue];
        for (index, rgb) in input.iter().zip(output.chunks_exact_mut(3)) {
            let index = index.widen();
            for (o, lut) in rgb.iter_mut().zip(luts) {
                *o = O::saturate(range.clamp(range.min + align(lut, index, bits)));
            }
        }
    }
}
