//! # File loaders
//!
//! Loaders turn a file number into a [`DataFile`]: the header as a [`MetadataDocument`] and,
//! unless switched off, the numeric payload as a [`RawDataArray`].
//!
//! ## Overview
//! -----------------
//! * [`CascadeLoader`] – CASCADE `.tof`/`.pad` files: binary payload followed by a `###section`
//!   text header.
//! * [`AsciiLoader`] – NICOS `.dat` scan files: `# ##section` header and a whitespace-delimited
//!   table whose column names come from the `Scan data` header section.
//!
//! Both read the file once, in a scoped read, then derive metadata and payload from the same
//! bytes. The [`LoaderSettings`] drive what is kept: the metadata selection is applied to the
//! parsed document, `rawdata = false` skips the payload and the array format chooses its shape.
use std::fs;

use log::{debug, info};

use crate::constants::FileNumber;
use crate::data_path::DataPath;
use crate::instrument::{ArrayFormat, LoaderSettings, Mode};
use crate::metadata::header_parser::{
    parse_header_bytes, HeaderDialect, SCAN_DATA_SECTION, SCAN_NAMES_KEY,
};
use crate::metadata::MetadataDocument;
use crate::nredux_errors::ReductionError;
use crate::raw_data::ascii_table::StructuredTable;
use crate::raw_data::{extract_binary, RawDataArray};

/// Content of one measurement file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub metadata: MetadataDocument,
    /// `None` when the loader settings switch the payload off.
    pub rawdata: Option<RawDataArray>,
}

pub trait FileLoader {
    fn settings(&self) -> &LoaderSettings;

    /// Read measurement `file_number`.
    ///
    /// Return
    /// ----------
    /// * The [`DataFile`], or the I/O / shape error raised while reading it.
    fn read_out_data(&self, file_number: FileNumber) -> Result<DataFile, ReductionError>;
}

/// Loader for CASCADE detector files.
#[derive(Debug, Clone)]
pub struct CascadeLoader<P> {
    data_path: P,
    settings: LoaderSettings,
}

impl<P: DataPath> CascadeLoader<P> {
    /// Return
    /// ----------
    /// * `Err(ReductionError::InvalidLoaderMode)` unless the settings describe a binary mode.
    pub fn new(data_path: P, settings: LoaderSettings) -> Result<Self, ReductionError> {
        if !settings.mode().is_binary() {
            return Err(ReductionError::InvalidLoaderMode(format!(
                "CASCADE files are not read in {} mode",
                settings.mode()
            )));
        }
        Ok(CascadeLoader {
            data_path,
            settings,
        })
    }
}

impl<P: DataPath> FileLoader for CascadeLoader<P> {
    fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    fn read_out_data(&self, file_number: FileNumber) -> Result<DataFile, ReductionError> {
        let path = self.data_path.resolve(file_number);
        let bytes = fs::read(&path)?;

        let metadata = if self.settings.metadata().is_nothing() {
            MetadataDocument::new()
        } else {
            parse_header_bytes(&bytes, HeaderDialect::Cascade)
                .apply_selection(self.settings.metadata())
        };
        let rawdata = if self.settings.rawdata() {
            Some(extract_binary(&bytes, self.settings.array_format())?)
        } else {
            None
        };

        info!(
            "read {path}: {} metadata sections, payload {:?}",
            metadata.len(),
            rawdata.as_ref().map(RawDataArray::shape)
        );
        Ok(DataFile { metadata, rawdata })
    }
}

/// Loader for NICOS ASCII scan files.
#[derive(Debug, Clone)]
pub struct AsciiLoader<P> {
    data_path: P,
    settings: LoaderSettings,
}

impl<P: DataPath> AsciiLoader<P> {
    /// Return
    /// ----------
    /// * `Err(ReductionError::InvalidLoaderMode)` unless the settings are in `DAT` mode.
    pub fn new(data_path: P, settings: LoaderSettings) -> Result<Self, ReductionError> {
        if settings.mode() != Mode::Dat {
            return Err(ReductionError::InvalidLoaderMode(format!(
                "ASCII scan files are not read in {} mode",
                settings.mode()
            )));
        }
        Ok(AsciiLoader {
            data_path,
            settings,
        })
    }
}

impl<P: DataPath> FileLoader for AsciiLoader<P> {
    fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    fn read_out_data(&self, file_number: FileNumber) -> Result<DataFile, ReductionError> {
        let path = self.data_path.resolve(file_number);
        let bytes = fs::read(&path)?;
        // the column names live in the header, so it is parsed even when no metadata is kept
        let header = parse_header_bytes(&bytes, HeaderDialect::Ascii);

        let rawdata = if self.settings.rawdata() {
            let text = String::from_utf8_lossy(&bytes);
            let table = match self.settings.array_format() {
                ArrayFormat::Structured(specs) => {
                    let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
                    StructuredTable::parse(&text, &names, Some(specs.as_slice()))?
                }
                _ => {
                    let names = header
                        .get(SCAN_DATA_SECTION, SCAN_NAMES_KEY)
                        .and_then(|v| v.as_str_tuple())
                        .ok_or_else(|| ReductionError::MissingScanColumns(path.to_string()))?;
                    StructuredTable::parse(&text, names, None)?
                }
            };
            debug!("{path}: {} scan points", table.len());
            Some(RawDataArray::Table(table))
        } else {
            None
        };

        let metadata = header.apply_selection(self.settings.metadata());
        info!("read {path}: {} metadata sections", metadata.len());
        Ok(DataFile { metadata, rawdata })
    }
}
