//! # Raw detector payloads
//!
//! Decoding of the numeric part of instrument files into shaped arrays.
//!
//! ## Overview
//! -----------------
//! CASCADE files store their counts as a flat run of little-endian 4-byte signed integers.
//! Two layouts coexist on disk:
//!
//! * time-resolved acquisitions, [`TOF_SHAPE`] = `(foil, time bin, pixel, pixel)`,
//! * single-frame images, [`IMAGE_SHAPE`] = `(pixel, pixel)`.
//!
//! [`extract_binary`] takes the richest shape allowed by the [`ArrayFormat`] hint and
//! truncates the payload to its element count (the header text appended to the payload is
//! dropped this way). A payload too short for the time-resolved shape falls back to the image
//! shape without error; only a payload shorter than one image is rejected.
//!
//! ASCII scan files are read into a [`StructuredTable`](ascii_table::StructuredTable), see
//! [`ascii_table`].
pub mod ascii_table;

use std::fs;

use camino::Utf8Path;
use log::warn;
use ndarray::{Array2, Array4, Axis};

use crate::constants::{Count, FoilIndex, IMAGE_LEN, IMAGE_SHAPE, TOF_LEN, TOF_SHAPE};
use crate::instrument::ArrayFormat;
use crate::nredux_errors::ReductionError;
use ascii_table::StructuredTable;

/// Numeric content of one measurement file.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDataArray {
    /// Single-frame detector image
    Image(Array2<Count>),
    /// Time-resolved acquisition, foil × time bin × pixel × pixel
    TimeResolved(Array4<Count>),
    /// Named-column scan table
    Table(StructuredTable),
}

impl RawDataArray {
    /// Array shape; `(rows, columns)` for a table.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            RawDataArray::Image(a) => a.shape().to_vec(),
            RawDataArray::TimeResolved(a) => a.shape().to_vec(),
            RawDataArray::Table(t) => vec![t.len(), t.names().len()],
        }
    }

    /// Sum of all detector counts, `None` for a table.
    pub fn total_counts(&self) -> Option<i64> {
        match self {
            RawDataArray::Image(a) => Some(a.iter().map(|&c| c as i64).sum()),
            RawDataArray::TimeResolved(a) => Some(a.iter().map(|&c| c as i64).sum()),
            RawDataArray::Table(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&Array2<Count>> {
        match self {
            RawDataArray::Image(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_time_resolved(&self) -> Option<&Array4<Count>> {
        match self {
            RawDataArray::TimeResolved(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&StructuredTable> {
        match self {
            RawDataArray::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Stack the requested foils of a time-resolved payload, in the given order.
    ///
    /// Return
    /// ----------
    /// * `(foils.len(), time bins, pixel, pixel)` array, or an error when the payload is not
    ///   time-resolved or a foil index is out of range.
    pub fn select_foils(&self, foils: &[FoilIndex]) -> Result<Array4<Count>, ReductionError> {
        let RawDataArray::TimeResolved(data) = self else {
            return Err(ReductionError::ShapeMismatch {
                expected: TOF_SHAPE.to_vec(),
                found: self.shape().iter().product(),
            });
        };
        let n = data.len_of(Axis(0));
        if let Some(&bad) = foils.iter().find(|&&f| f >= n) {
            return Err(ReductionError::ChannelIndexOutOfRange { index: bad, len: n });
        }
        Ok(data.select(Axis(0), foils))
    }
}

/// Decode little-endian `i32` words; trailing bytes not filling a word are dropped.
fn decode_counts(bytes: &[u8], limit: usize) -> Vec<Count> {
    bytes
        .chunks_exact(4)
        .take(limit)
        .map(|w| Count::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect()
}

fn image_from(bytes: &[u8]) -> Result<RawDataArray, ReductionError> {
    let counts = decode_counts(bytes, IMAGE_LEN);
    let found = counts.len();
    Array2::from_shape_vec(IMAGE_SHAPE, counts)
        .map(RawDataArray::Image)
        .map_err(|_| ReductionError::ShapeMismatch {
            expected: IMAGE_SHAPE.to_vec(),
            found,
        })
}

/// Shape a binary payload according to `format`.
///
/// Arguments
/// -----------------
/// * `bytes` – the whole file content.
/// * `format` – [`ArrayFormat::TimeResolved`] or [`ArrayFormat::Image`].
///
/// Return
/// ----------
/// * [`RawDataArray::TimeResolved`] when the hint allows it and enough words are present,
///   else [`RawDataArray::Image`].
/// * `Err(ReductionError::ShapeMismatch)` when not even one image fits, or
///   `Err(ReductionError::InvalidLoaderMode)` for a table format.
pub fn extract_binary(bytes: &[u8], format: &ArrayFormat) -> Result<RawDataArray, ReductionError> {
    match format {
        ArrayFormat::TimeResolved => {
            let counts = decode_counts(bytes, TOF_LEN);
            let found = counts.len();
            match Array4::from_shape_vec(TOF_SHAPE, counts) {
                Ok(array) => Ok(RawDataArray::TimeResolved(array)),
                Err(_) => {
                    warn!(
                        "payload of {found} words does not fit {TOF_SHAPE:?}, \
                         falling back to {IMAGE_SHAPE:?}"
                    );
                    image_from(bytes)
                }
            }
        }
        ArrayFormat::Image => image_from(bytes),
        ArrayFormat::Structured(_) | ArrayFormat::Inferred => Err(
            ReductionError::InvalidLoaderMode("table formats are not binary payloads".into()),
        ),
    }
}

/// Read and shape the binary payload of the file at `path`.
pub fn read_binary_file(
    path: &Utf8Path,
    format: &ArrayFormat,
) -> Result<RawDataArray, ReductionError> {
    let bytes = fs::read(path)?;
    extract_binary(&bytes, format)
}
