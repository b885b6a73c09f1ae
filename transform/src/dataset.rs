//! Reading images out of DICOM objects.
//!
//! Only native (uncompressed) pixel data is supported here.
//! Encapsulated pixel data needs a codec to be decoded first.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use dicom_object::InMemDicomObject;
use snafu::{ensure, OptionExt, ResultExt};
use tracing::debug;

use crate::attribute::{self, PixelRepresentation};
use crate::image::{BitDepth, Image, PixelBuffer};
use crate::transform::color::{is_subsampled_x, is_subsampled_y, normalize_color_space};
use crate::{GetAttributeSnafu, Result, UnsupportedPixelDataSnafu};

/// Read a frame of the native pixel data of a DICOM object into an image.
///
/// - Planar pixel data (_Planar Configuration_ = 1)
///   is interleaved.
/// - Horizontally subsampled `YBR_FULL_422` pixel data
///   is expanded into `YBR_FULL`.
/// - Samples are masked or sign-extended from the _High Bit_.
/// - `PALETTE COLOR` images carry the palette of the object.
///
/// The pixel data is interpreted as little endian.
pub fn read_image(obj: &InMemDicomObject, frame: u32) -> Result<Image> {
    let rows = attribute::rows(obj).context(GetAttributeSnafu)? as u32;
    let cols = attribute::cols(obj).context(GetAttributeSnafu)? as u32;
    let bits_allocated = attribute::bits_allocated(obj).context(GetAttributeSnafu)? as u32;
    let high_bit = attribute::high_bit(obj).context(GetAttributeSnafu)? as u32;
    let signed = attribute::pixel_representation(obj).context(GetAttributeSnafu)?
        == PixelRepresentation::Signed;
    let samples_per_pixel = attribute::samples_per_pixel(obj).context(GetAttributeSnafu)? as usize;
    let planar = attribute::planar_configuration(obj) == 1;
    let frames = attribute::number_of_frames(obj).context(GetAttributeSnafu)?;
    let photometric = attribute::photometric_interpretation(obj).context(GetAttributeSnafu)?;

    ensure!(
        frame < frames,
        UnsupportedPixelDataSnafu {
            reason: format!("frame #{} requested, but there are {} frames", frame, frames),
        }
    );

    let pixel_data = attribute::pixel_data(obj).context(GetAttributeSnafu)?;
    let bytes = pixel_data
        .value()
        .primitive()
        .context(UnsupportedPixelDataSnafu {
            reason: "encapsulated pixel data",
        })?
        .to_bytes();

    let subsampled = is_subsampled_x(&photometric);
    ensure!(
        !is_subsampled_y(&photometric),
        UnsupportedPixelDataSnafu {
            reason: format!("vertically subsampled color space {}", photometric),
        }
    );
    ensure!(
        !subsampled || (samples_per_pixel == 3 && cols % 2 == 0),
        UnsupportedPixelDataSnafu {
            reason: format!("{} with {} columns", photometric, cols),
        }
    );

    let sample_size = (bits_allocated / 8) as usize;
    let pixels = rows as usize * cols as usize;
    let frame_samples = if subsampled {
        pixels * 2
    } else {
        pixels * samples_per_pixel
    };
    let frame_len = frame_samples * sample_size;
    let start = frame as usize * frame_len;
    let frame_bytes = bytes
        .get(start..start + frame_len)
        .context(UnsupportedPixelDataSnafu {
            reason: format!(
                "pixel data holds {} bytes, frame #{} needs {}",
                bytes.len(),
                frame,
                start + frame_len
            ),
        })?;
    debug!(
        "reading frame #{}: {}x{}, {} bits allocated, {}",
        frame, cols, rows, bits_allocated, photometric
    );

    let (frame_bytes, color_space) = if subsampled {
        (
            upsample_422(frame_bytes, sample_size),
            normalize_color_space(&photometric),
        )
    } else if planar && samples_per_pixel > 1 {
        (
            interleave_planes(frame_bytes, samples_per_pixel, sample_size),
            photometric.clone(),
        )
    } else {
        (frame_bytes.to_vec(), photometric.clone())
    };

    let depth = BitDepth::for_high_bit(bits_allocated - 1, signed);
    let buffer = decode_samples(&frame_bytes, depth);
    let mut image = Image::from_buffer(cols, rows, color_space, high_bit, buffer)?;
    normalize_stored_bits(&mut image);

    if normalize_color_space(&photometric) == "PALETTE COLOR" {
        let palette = attribute::palette(obj).context(GetAttributeSnafu)?;
        image.set_palette(Some(Arc::new(palette)));
    }
    Ok(image)
}

fn decode_samples(bytes: &[u8], depth: BitDepth) -> PixelBuffer {
    let n = bytes.len() / (depth.bits() / 8) as usize;
    match depth {
        BitDepth::U8 => PixelBuffer::U8(bytes.to_vec()),
        BitDepth::S8 => PixelBuffer::S8(bytes.iter().map(|&b| b as i8).collect()),
        BitDepth::U16 => {
            let mut data = vec![0; n];
            LittleEndian::read_u16_into(bytes, &mut data);
            PixelBuffer::U16(data)
        }
        BitDepth::S16 => {
            let mut data = vec![0; n];
            LittleEndian::read_i16_into(bytes, &mut data);
            PixelBuffer::S16(data)
        }
        BitDepth::U32 => {
            let mut data = vec![0; n];
            LittleEndian::read_u32_into(bytes, &mut data);
            PixelBuffer::U32(data)
        }
        BitDepth::S32 => {
            let mut data = vec![0; n];
            LittleEndian::read_i32_into(bytes, &mut data);
            PixelBuffer::S32(data)
        }
    }
}

/// Turn color planes (`RRR...GGG...BBB...`)
/// into interleaved samples (`RGBRGB...`).
fn interleave_planes(bytes: &[u8], planes: usize, sample_size: usize) -> Vec<u8> {
    let plane_len = bytes.len() / planes;
    let pixels = plane_len / sample_size;
    let mut out = Vec::with_capacity(bytes.len());
    for i in 0..pixels {
        for p in 0..planes {
            let start = p * plane_len + i * sample_size;
            out.extend_from_slice(&bytes[start..start + sample_size]);
        }
    }
    out
}

/// Expand `Y1 Y2 Cb Cr` groups into `Y1 Cb Cr Y2 Cb Cr`.
fn upsample_422(bytes: &[u8], sample_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() / 2 * 3);
    for group in bytes.chunks_exact(4 * sample_size) {
        let (y1, rest) = group.split_at(sample_size);
        let (y2, chroma) = rest.split_at(sample_size);
        out.extend_from_slice(y1);
        out.extend_from_slice(chroma);
        out.extend_from_slice(y2);
        out.extend_from_slice(chroma);
    }
    out
}

/// Discard the bits above the high bit,
/// extending the sign of signed samples.
fn normalize_stored_bits(image: &mut Image) {
    let high_bit = image.high_bit();
    if high_bit == image.depth().max_high_bit() {
        return;
    }
    let signed = image.depth().is_signed();
    let shift = 63 - high_bit;
    let mask = (1_i64 << (high_bit + 1)) - 1;
    for i in 0..image.buffer().len() {
        let v = image.get(i);
        let v = if signed {
            (v << shift) >> shift
        } else {
            v & mask
        };
        image.set(i, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use dicom_core::{dicom_value, DataElement, PrimitiveValue, VR};
    use dicom_dictionary_std::tags;
    use dicom_object::mem::InMemElement;

    fn object(
        photometric: &str,
        samples_per_pixel: u16,
        bits: u16,
        high_bit: u16,
        signed: bool,
        pixel_data: InMemElement,
    ) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [2])),
            DataElement::new(tags::COLUMNS, VR::US, dicom_value!(U16, [2])),
            DataElement::new(tags::BITS_ALLOCATED, VR::US, dicom_value!(U16, [bits])),
            DataElement::new(tags::HIGH_BIT, VR::US, dicom_value!(U16, [high_bit])),
            DataElement::new(
                tags::PIXEL_REPRESENTATION,
                VR::US,
                dicom_value!(U16, [signed as u16]),
            ),
            DataElement::new(
                tags::SAMPLES_PER_PIXEL,
                VR::US,
                dicom_value!(U16, [samples_per_pixel]),
            ),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from(photometric),
            ),
            pixel_data,
        ])
    }

    #[test]
    fn read_monochrome_16bit_frames() {
        let pixel_data = DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            dicom_value!(U16, [1, 2, 3, 4, 5, 6, 7, 8]),
        );
        let mut obj = object("MONOCHROME2", 1, 16, 11, false, pixel_data);
        obj.put(DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from("2"),
        ));

        let image = read_image(&obj, 1).unwrap();
        assert_eq!(image.depth(), BitDepth::U16);
        assert_eq!(image.high_bit(), 11);
        assert_eq!(image.buffer(), &PixelBuffer::U16(vec![5, 6, 7, 8]));

        let err = read_image(&obj, 2).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPixelData { .. }));
    }

    #[test]
    fn signed_samples_are_sign_extended() {
        // 0x0FFF is -1 in 12 bits
        let pixel_data = DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            dicom_value!(U16, [0x0FFF, 0x0800, 0x07FF, 0x0001]),
        );
        let obj = object("MONOCHROME2", 1, 16, 11, true, pixel_data);
        let image = read_image(&obj, 0).unwrap();
        assert_eq!(image.buffer(), &PixelBuffer::S16(vec![-1, -2048, 2047, 1]));
    }

    #[test]
    fn planar_rgb_is_interleaved() {
        let pixel_data = DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            dicom_value!(U8, [1, 2, 3, 4, 10, 20, 30, 40, 100, 200, 255, 0]),
        );
        let mut obj = object("RGB", 3, 8, 7, false, pixel_data);
        obj.put(DataElement::new(
            tags::PLANAR_CONFIGURATION,
            VR::US,
            dicom_value!(U16, [1]),
        ));
        let image = read_image(&obj, 0).unwrap();
        assert_eq!(image.channels(), 3);
        assert_eq!(
            image.buffer(),
            &PixelBuffer::U8(vec![1, 10, 100, 2, 20, 200, 3, 30, 255, 4, 40, 0])
        );
    }

    #[test]
    fn ybr_422_is_expanded() {
        let pixel_data = DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            dicom_value!(U8, [10, 20, 128, 129, 30, 40, 100, 101]),
        );
        let obj = object("YBR_FULL_422", 3, 8, 7, false, pixel_data);
        let image = read_image(&obj, 0).unwrap();
        assert_eq!(image.color_space(), "YBR_FULL");
        assert_eq!(
            image.buffer(),
            &PixelBuffer::U8(vec![
                10, 128, 129, 20, 128, 129, 30, 100, 101, 40, 100, 101
            ])
        );
    }

    #[test]
    fn short_pixel_data_is_rejected() {
        let pixel_data = DataElement::new(tags::PIXEL_DATA, VR::OB, dicom_value!(U8, [1, 2]));
        let obj = object("MONOCHROME2", 1, 8, 7, false, pixel_data);
        let err = read_image(&obj, 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPixelData { .. }));
    }
}
