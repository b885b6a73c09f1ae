//! Look-up table (LUT) data type.
//!
//! This module contains the [`Lut`] data type,
//! which maps stored or meaningful sample values
//! onto unsigned output values,
//! as described by a DICOM _LUT Descriptor_ and _LUT Data_ pair.
//! It is used by the modality and VOI transforms
//! and by the three channels of a [`Palette`].

use snafu::{ensure, Snafu};
use tracing::warn;

/// The LUT could not be created.
#[derive(Debug, PartialEq, Snafu)]
#[non_exhaustive]
pub enum LutError {
    /// LUT Descriptor must have 3 values, but had {len}
    #[snafu(display("LUT Descriptor must have 3 values, but had {}", len))]
    InvalidDescriptor { len: usize },
    /// Unsupported LUT entry bit depth {bits}
    #[snafu(display("Unsupported LUT entry bit depth {}", bits))]
    InvalidBits { bits: u32 },
    /// LUT has no entries
    #[snafu(display("LUT has no entries"))]
    NoEntries,
    /// LUT data size does not match the descriptor
    #[snafu(display("Expected {} LUT entries, but data holds {}", expected, got))]
    DataSizeMismatch { expected: usize, got: usize },
}

/// A look up table for sample value transformations.
///
/// Inputs are mapped to an entry by subtracting
/// the first mapped value, clamping to the available entries.
///
/// # Example
///
/// ```
/// # use dicom_transform::Lut;
/// let lut = Lut::new(16, 2, vec![100, 200, 300])?;
///
/// assert_eq!(lut.mapped_value(0), 100);
/// assert_eq!(lut.mapped_value(3), 200);
/// assert_eq!(lut.mapped_value(10), 300);
/// # Ok::<(), dicom_transform::lut::LutError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lut {
    /// the number of significant bits of each entry
    bits: u32,
    /// the input value mapped to the first entry
    first_mapped: i32,
    /// the table entries
    data: Vec<u32>,
    /// the _LUT Explanation_, if any
    description: String,
}

impl Lut {
    /// Create a new LUT from its entries.
    ///
    /// Entries are truncated to the given number of bits.
    pub fn new(bits: u32, first_mapped: i32, mut data: Vec<u32>) -> Result<Self, LutError> {
        ensure!((1..=16).contains(&bits), InvalidBitsSnafu { bits });
        ensure!(!data.is_empty(), NoEntriesSnafu);
        let mask = (1_u32 << bits) - 1;
        for v in &mut data {
            *v &= mask;
        }
        Ok(Lut {
            bits,
            first_mapped,
            data,
            description: String::new(),
        })
    }

    /// Create a LUT from the three values of a _LUT Descriptor_
    /// and the raw values of the respective _LUT Data_.
    ///
    /// - `descriptor`: number of entries (0 meaning 65536),
    ///   first mapped value, and number of bits per entry
    /// - `signed_first_mapped`:
    ///   whether the first mapped value is to be interpreted as signed
    ///   (descriptor encoded as `SS`)
    /// - `data`: the LUT data words;
    ///   8-bit entries may come packed two per 16-bit word,
    ///   low byte first
    pub fn from_descriptor(
        descriptor: &[u32],
        signed_first_mapped: bool,
        data: &[u32],
    ) -> Result<Self, LutError> {
        ensure!(
            descriptor.len() == 3,
            InvalidDescriptorSnafu {
                len: descriptor.len()
            }
        );
        let size = match descriptor[0] {
            0 => 0x1_0000,
            n => n as usize,
        };
        let first_mapped = if signed_first_mapped {
            descriptor[1] as u16 as i16 as i32
        } else {
            descriptor[1] as i32
        };
        let bits = descriptor[2];
        ensure!((1..=16).contains(&bits), InvalidBitsSnafu { bits });

        let entries: Vec<u32> = if data.len() == size {
            data.to_vec()
        } else if bits <= 8 && (data.len() == size.div_ceil(2)) {
            // two entries per 16-bit word
            data.iter()
                .flat_map(|w| [w & 0xFF, (w >> 8) & 0xFF])
                .take(size)
                .collect()
        } else if data.len() > size {
            warn!(
                "LUT data holds {} entries, expected {}; ignoring the excess",
                data.len(),
                size
            );
            data[..size].to_vec()
        } else {
            return DataSizeMismatchSnafu {
                expected: size,
                got: data.len(),
            }
            .fail();
        };

        Lut::new(bits, first_mapped, entries)
    }

    /// Attach a description (_LUT Explanation_).
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The number of significant bits of each entry.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// The input value mapped to the first entry.
    pub fn first_mapped(&self) -> i32 {
        self.first_mapped
    }

    /// The number of entries.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The description of the LUT.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// All entries of the LUT.
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    /// Map an input value onto its entry.
    ///
    /// Values before the first mapped value
    /// map to the first entry,
    /// values after the last mapped value
    /// map to the last entry.
    #[inline]
    pub fn mapped_value(&self, input: i64) -> u32 {
        let last = self.data.len() as i64 - 1;
        let index = (input - self.first_mapped as i64).clamp(0, last);
        self.data[index as usize]
    }

    /// The lowest entry of the table.
    pub fn min_entry(&self) -> u32 {
        self.data.iter().copied().min().unwrap_or(0)
    }

    /// The highest entry of the table.
    pub fn max_entry(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }
}

/// The red, green and blue LUTs of a `PALETTE COLOR` image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    /// red channel LUT
    pub red: Lut,
    /// green channel LUT
    pub green: Lut,
    /// blue channel LUT
    pub blue: Lut,
}

impl Palette {
    /// Create a palette from its three channel LUTs.
    pub fn new(red: Lut, green: Lut, blue: Lut) -> Self {
        Palette { red, green, blue }
    }

    /// The widest entry bit depth among the three channels.
    pub fn bits(&self) -> u32 {
        self.red.bits().max(self.green.bits()).max(self.blue.bits())
    }
}
