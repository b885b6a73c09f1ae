//! Utility module for fetching key attributes from a DICOM object.
//!
//! All accessors work on an [`InMemDicomObject`],
//! so that they apply equally to a whole data set
//! (a file object dereferences into one)
//! and to the items of a sequence.

use byteorder::{ByteOrder, LittleEndian};
use dicom_core::value::{ConvertValueError, PrimitiveValue};
use dicom_core::{DataDictionary, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};

use crate::lut::{Lut, LutError, Palette};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum GetAttributeError {
    #[snafu(display("Missing required attribute `{}`", name))]
    MissingRequiredField {
        name: &'static str,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not convert attribute `{}`", name))]
    ConvertValue {
        name: &'static str,
        source: ConvertValueError,
        backtrace: Backtrace,
    },

    #[snafu(display("Semantically invalid value `{}` for attribute `{}`", value, name))]
    InvalidValue {
        name: &'static str,
        value: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Invalid look-up table in `{}`", name))]
    InvalidLut {
        name: &'static str,
        source: LutError,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = GetAttributeError> = std::result::Result<T, E>;

/// Get the Columns from the DICOM object
pub fn cols<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<u16> {
    retrieve_required_u16(obj, tags::COLUMNS, "Columns")
}

/// Get the Rows from the DICOM object
pub fn rows<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<u16> {
    retrieve_required_u16(obj, tags::ROWS, "Rows")
}

/// Get the PhotoMetricInterpretation from the DICOM object
pub fn photometric_interpretation<D: DataDictionary + Clone>(
    obj: &InMemDicomObject<D>,
) -> Result<String> {
    let value = obj
        .get(tags::PHOTOMETRIC_INTERPRETATION)
        .and_then(|e| e.value().primitive())
        .context(MissingRequiredFieldSnafu {
            name: "PhotometricInterpretation",
        })?;
    Ok(value.to_str().trim().to_string())
}

/// Get the SamplesPerPixel from the DICOM object
pub fn samples_per_pixel<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<u16> {
    retrieve_required_u16(obj, tags::SAMPLES_PER_PIXEL, "SamplesPerPixel")
}

/// Get the PlanarConfiguration from the DICOM object, returning 0 by default
pub fn planar_configuration<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> u16 {
    obj.get(tags::PLANAR_CONFIGURATION)
        .and_then(|e| e.to_int().ok())
        .unwrap_or(0)
}

/// Get the BitsAllocated from the DICOM object
pub fn bits_allocated<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<u16> {
    let bits = retrieve_required_u16(obj, tags::BITS_ALLOCATED, "BitsAllocated")?;
    ensure!(
        matches!(bits, 8 | 16 | 32),
        InvalidValueSnafu {
            name: "BitsAllocated",
            value: bits.to_string(),
        }
    );
    Ok(bits)
}

/// Get the HighBit from the DICOM object
pub fn high_bit<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<u16> {
    retrieve_required_u16(obj, tags::HIGH_BIT, "HighBit")
}

/// Get the PixelData element from the DICOM object
pub fn pixel_data<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<&InMemElement<D>> {
    obj.get(tags::PIXEL_DATA)
        .context(MissingRequiredFieldSnafu { name: "PixelData" })
}

/// Get the RescaleIntercept from the DICOM object or returns 0
pub fn rescale_intercept<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> f64 {
    obj.get(tags::RESCALE_INTERCEPT)
        .and_then(|e| e.to_float64().ok())
        .unwrap_or(0.)
}

/// Get the RescaleSlope from the DICOM object or returns 1.0
pub fn rescale_slope<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> f64 {
    obj.get(tags::RESCALE_SLOPE)
        .and_then(|e| e.to_float64().ok())
        .unwrap_or(1.0)
}

/// Get the NumberOfFrames from the DICOM object,
/// returning 1 if it is not present
pub fn number_of_frames<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<u32> {
    let Some(elem) = obj.get(tags::NUMBER_OF_FRAMES) else {
        return Ok(1);
    };

    let integer = elem.to_int::<i32>().context(ConvertValueSnafu {
        name: "NumberOfFrames",
    })?;

    ensure!(
        integer > 0,
        InvalidValueSnafu {
            name: "NumberOfFrames",
            value: integer.to_string(),
        }
    );

    Ok(integer as u32)
}

/// Retrieve all WindowCenter values from the DICOM object.
///
/// The list is empty if the attribute does not exist.
pub fn window_centers<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<Vec<f64>> {
    retrieve_optional_multi_f64(obj, tags::WINDOW_CENTER, "WindowCenter")
}

/// Retrieve all WindowWidth values from the DICOM object.
///
/// The list is empty if the attribute does not exist.
pub fn window_widths<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<Vec<f64>> {
    retrieve_optional_multi_f64(obj, tags::WINDOW_WIDTH, "WindowWidth")
}

/// Retrieve the LUT of the first item in the Modality LUT Sequence, if any.
pub fn modality_lut<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<Option<Lut>> {
    let Some(items) = obj.get(tags::MODALITY_LUT_SEQUENCE).and_then(|e| e.value().items()) else {
        return Ok(None);
    };
    items
        .first()
        .map(|item| lut_from_item(item, "ModalityLUTSequence"))
        .transpose()
}

/// Retrieve the LUTs of all items in the VOI LUT Sequence.
pub fn voi_luts<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<Vec<Lut>> {
    let Some(items) = obj.get(tags::VOILUT_SEQUENCE).and_then(|e| e.value().items()) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| lut_from_item(item, "VOILUTSequence"))
        .collect()
}

/// Retrieve the red, green and blue palette color LUTs.
pub fn palette<D: DataDictionary + Clone>(obj: &InMemDicomObject<D>) -> Result<Palette> {
    let red = read_lut(
        obj,
        tags::RED_PALETTE_COLOR_LOOKUP_TABLE_DESCRIPTOR,
        tags::RED_PALETTE_COLOR_LOOKUP_TABLE_DATA,
        "RedPaletteColorLookupTableData",
    )?;
    let green = read_lut(
        obj,
        tags::GREEN_PALETTE_COLOR_LOOKUP_TABLE_DESCRIPTOR,
        tags::GREEN_PALETTE_COLOR_LOOKUP_TABLE_DATA,
        "GreenPaletteColorLookupTableData",
    )?;
    let blue = read_lut(
        obj,
        tags::BLUE_PALETTE_COLOR_LOOKUP_TABLE_DESCRIPTOR,
        tags::BLUE_PALETTE_COLOR_LOOKUP_TABLE_DATA,
        "BluePaletteColorLookupTableData",
    )?;
    Ok(Palette::new(red, green, blue))
}

fn lut_from_item<D: DataDictionary + Clone>(
    item: &InMemDicomObject<D>,
    name: &'static str,
) -> Result<Lut> {
    let lut = read_lut(item, tags::LUT_DESCRIPTOR, tags::LUT_DATA, name)?;
    let description = item
        .get(tags::LUT_EXPLANATION)
        .and_then(|e| e.value().primitive())
        .map(|v| v.to_str().trim().to_string())
        .unwrap_or_default();
    Ok(lut.with_description(description))
}

fn read_lut<D: DataDictionary + Clone>(
    obj: &InMemDicomObject<D>,
    descriptor_tag: Tag,
    data_tag: Tag,
    name: &'static str,
) -> Result<Lut> {
    let descriptor = obj
        .get(descriptor_tag)
        .context(MissingRequiredFieldSnafu { name })?;
    let signed = descriptor.vr() == VR::SS;
    let descriptor: Vec<u32> = descriptor
        .to_multi_int::<i32>()
        .context(ConvertValueSnafu { name })?
        .into_iter()
        .map(|v| v as u16 as u32)
        .collect();

    let data = obj.get(data_tag).context(MissingRequiredFieldSnafu { name })?;
    let data: Vec<u32> = match data.value().primitive() {
        // raw bytes hold little endian 16-bit words
        Some(PrimitiveValue::U8(bytes)) => bytes
            .chunks(2)
            .map(|c| {
                if c.len() == 2 {
                    LittleEndian::read_u16(c) as u32
                } else {
                    c[0] as u32
                }
            })
            .collect(),
        _ => data
            .to_multi_int::<u32>()
            .context(ConvertValueSnafu { name })?,
    };

    Lut::from_descriptor(&descriptor, signed, &data).context(InvalidLutSnafu { name })
}

#[inline]
fn retrieve_required_u16<D>(obj: &InMemDicomObject<D>, tag: Tag, name: &'static str) -> Result<u16>
where
    D: DataDictionary + Clone,
{
    obj.get(tag)
        .context(MissingRequiredFieldSnafu { name })?
        .to_int()
        .context(ConvertValueSnafu { name })
}

#[inline]
fn retrieve_optional_multi_f64<D>(
    obj: &InMemDicomObject<D>,
    tag: Tag,
    name: &'static str,
) -> Result<Vec<f64>>
where
    D: DataDictionary + Clone,
{
    let Some(elem) = obj.get(tag) else {
        return Ok(Vec::new());
    };
    elem.to_multi_float64().context(ConvertValueSnafu { name })
}

/// An interpreted representation of the DICOM _Pixel Representation_ attribute.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum PixelRepresentation {
    /// unsigned pixel data sample values
    Unsigned,
    /// signed pixel data sample values
    Signed,
}

/// Get the PixelRepresentation from the DICOM object
pub fn pixel_representation<D: DataDictionary + Clone>(
    obj: &InMemDicomObject<D>,
) -> Result<PixelRepresentation> {
    let p = retrieve_required_u16(obj, tags::PIXEL_REPRESENTATION, "PixelRepresentation")?;

    match p {
        0 => Ok(PixelRepresentation::Unsigned),
        1 => Ok(PixelRepresentation::Signed),
        _ => InvalidValueSnafu {
            name: "PixelRepresentation",
            value: p.to_string(),
        }
        .fail(),
    }
}
