//! # Instrument loader settings
//!
//! Immutable per-run configuration injected into the file loaders and the reduction.
//!
//! ## Overview
//! -----------------
//! A [`LoaderSettings`] value is built once, from an instrument preset, and then only read:
//!
//! * [`Instrument`] × [`Mode`] select the default [`ArrayFormat`] of the raw payload
//!   (`TOF` → `(8, 16, 128, 128)`, `PAD`/`SANS` → `(128, 128)`, `DAT` → structured table),
//! * `foils` lists the detection channels used by the reduction,
//! * `metadata` restricts/renames the header entries ([`MetadataSelection`]),
//! * `rawdata` switches the payload read off entirely.
//!
//! Not every combination is valid: PANDA only writes `.dat` files and MIRA has no SANS mode.
//!
//! ## Example
//! -----------------
//! ```rust
//! use nredux::instrument::{Instrument, LoaderSettings, Mode, Setting};
//!
//! let settings = LoaderSettings::builder(Instrument::Reseda, Mode::Tof)
//!     .foils(vec![0, 1, 2])
//!     .build()
//!     .unwrap();
//! assert_eq!(settings.get_setting("foils"), Some(Setting::Foils(&[0, 1, 2])));
//!
//! assert!(LoaderSettings::builder(Instrument::Panda, Mode::Tof).build().is_err());
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::str::FromStr;

use camino::Utf8Path;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::{FoilIndex, FOILS};
use crate::nredux_errors::ReductionError;
use crate::raw_data::ascii_table::ColumnSpec;

/// Instruments whose file layouts are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    Reseda,
    Mira,
    Panda,
}

impl Instrument {
    /// Channels used by the reduction when none are configured.
    pub fn default_foils(&self) -> Vec<FoilIndex> {
        match self {
            Instrument::Reseda => vec![7, 6, 5, 0, 1, 2],
            Instrument::Mira => vec![0, 5, 6, 1],
            Instrument::Panda => Vec::new(),
        }
    }

    /// Check that the instrument writes files of the given mode.
    pub fn supports(&self, mode: Mode) -> bool {
        !matches!(
            (self, mode),
            (Instrument::Mira, Mode::Sans)
                | (Instrument::Panda, Mode::Tof | Mode::Pad | Mode::Sans)
        )
    }
}

impl FromStr for Instrument {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RESEDA" => Ok(Instrument::Reseda),
            "MIRA" => Ok(Instrument::Mira),
            "PANDA" => Ok(Instrument::Panda),
            _ => Err(ReductionError::InvalidParameter(format!(
                "unknown instrument '{s}'"
            ))),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Instrument::Reseda => "RESEDA",
            Instrument::Mira => "MIRA",
            Instrument::Panda => "PANDA",
        };
        write!(f, "{name}")
    }
}

/// Acquisition mode, i.e. the kind of file being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Time-resolved CASCADE payload (`.tof`)
    Tof,
    /// Single-frame CASCADE image (`.pad`)
    Pad,
    /// Single-frame CASCADE image recorded in SANS configuration (`.pad`)
    Sans,
    /// NICOS ASCII scan file (`.dat`)
    Dat,
}

impl Mode {
    pub fn default_array_format(&self) -> ArrayFormat {
        match self {
            Mode::Tof => ArrayFormat::TimeResolved,
            Mode::Pad | Mode::Sans => ArrayFormat::Image,
            Mode::Dat => ArrayFormat::Inferred,
        }
    }

    pub fn is_binary(&self) -> bool {
        !matches!(self, Mode::Dat)
    }
}

impl FromStr for Mode {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TOF" => Ok(Mode::Tof),
            "PAD" => Ok(Mode::Pad),
            "SANS" => Ok(Mode::Sans),
            "DAT" => Ok(Mode::Dat),
            _ => Err(ReductionError::InvalidLoaderMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Tof => "TOF",
            Mode::Pad => "PAD",
            Mode::Sans => "SANS",
            Mode::Dat => "DAT",
        };
        write!(f, "{name}")
    }
}

/// Expected layout of the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayFormat {
    /// `(foils, time bins, pixels, pixels)`; falls back to [`ArrayFormat::Image`] when the
    /// payload is too small.
    TimeResolved,
    /// `(pixels, pixels)`
    Image,
    /// Structured table with explicitly declared columns.
    Structured(Vec<ColumnSpec>),
    /// Structured table whose column types are inferred from the first data row.
    Inferred,
}

impl ArrayFormat {
    fn is_binary(&self) -> bool {
        matches!(self, ArrayFormat::TimeResolved | ArrayFormat::Image)
    }
}

/// One selected metadata key, optionally renamed.
///
/// Deserializes from `{"key": "tau", "alias": "tau_M"}` as well as from the pair form
/// `["tau", "tau_M"]` / `["tau", null]` used by alias files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub key: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl SelectionEntry {
    pub fn new(key: &str, alias: Option<&str>) -> Self {
        SelectionEntry {
            key: key.to_string(),
            alias: alias.map(str::to_string),
        }
    }
}

/// Which metadata entries a loader keeps.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MetadataSelection {
    /// Keep the whole document.
    #[default]
    All,
    /// Skip the header entirely.
    Nothing,
    /// Keep only the listed keys of the listed sections.
    Filter(BTreeMap<String, Vec<SelectionEntry>>),
}

impl MetadataSelection {
    /// Parse a JSON alias document `{"section": [["key", "alias" | null], ...], ...}`.
    pub fn from_json_str(json: &str) -> Result<Self, ReductionError> {
        let filter: BTreeMap<String, Vec<SelectionEntry>> = serde_json::from_str(json)?;
        Ok(MetadataSelection::Filter(filter))
    }

    /// Load a JSON alias file (see [`MetadataSelection::from_json_str`]).
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ReductionError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, MetadataSelection::Nothing)
    }
}

/// Typed view over one loader setting, see [`LoaderSettings::get_setting`].
#[derive(Debug, Clone, PartialEq)]
pub enum Setting<'a> {
    Foils(&'a [FoilIndex]),
    Metadata(&'a MetadataSelection),
    Rawdata(bool),
    ArrayFormat(&'a ArrayFormat),
    Instrument(Instrument),
    Mode(Mode),
}

/// Configuration of a file loader and of the reduction fed by it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    instrument: Instrument,
    mode: Mode,
    foils: Vec<FoilIndex>,
    metadata: MetadataSelection,
    rawdata: bool,
    array_format: ArrayFormat,
}

impl LoaderSettings {
    /// Start from the preset of `instrument` in `mode`.
    ///
    /// See also
    /// ------------
    /// * [`LoaderSettingsBuilder::build`] – validation rules.
    pub fn builder(instrument: Instrument, mode: Mode) -> LoaderSettingsBuilder {
        LoaderSettingsBuilder::new(instrument, mode)
    }

    /// Preset settings without any override.
    pub fn preset(instrument: Instrument, mode: Mode) -> Result<Self, ReductionError> {
        Self::builder(instrument, mode).build()
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn foils(&self) -> &[FoilIndex] {
        &self.foils
    }

    pub fn metadata(&self) -> &MetadataSelection {
        &self.metadata
    }

    pub fn rawdata(&self) -> bool {
        self.rawdata
    }

    pub fn array_format(&self) -> &ArrayFormat {
        &self.array_format
    }

    /// Look a setting up by name.
    ///
    /// Arguments
    /// -----------------
    /// * `key` – one of `"foils"`, `"metadata"`, `"rawdata"`, `"array_format"`,
    ///   `"instrument"`, `"mode"`.
    ///
    /// Return
    /// ----------
    /// * The typed setting, or `None` for an unknown key.
    pub fn get_setting(&self, key: &str) -> Option<Setting<'_>> {
        match key {
            "foils" => Some(Setting::Foils(&self.foils)),
            "metadata" => Some(Setting::Metadata(&self.metadata)),
            "rawdata" => Some(Setting::Rawdata(self.rawdata)),
            "array_format" => Some(Setting::ArrayFormat(&self.array_format)),
            "instrument" => Some(Setting::Instrument(self.instrument)),
            "mode" => Some(Setting::Mode(self.mode)),
            _ => {
                debug!("no loader setting named '{key}'");
                None
            }
        }
    }
}

/// Builder for [`LoaderSettings`], with validation.
#[derive(Debug, Clone)]
pub struct LoaderSettingsBuilder {
    settings: LoaderSettings,
}

impl LoaderSettingsBuilder {
    pub fn new(instrument: Instrument, mode: Mode) -> Self {
        LoaderSettingsBuilder {
            settings: LoaderSettings {
                instrument,
                mode,
                foils: instrument.default_foils(),
                metadata: MetadataSelection::All,
                rawdata: true,
                array_format: mode.default_array_format(),
            },
        }
    }

    pub fn foils(mut self, v: Vec<FoilIndex>) -> Self {
        self.settings.foils = v;
        self
    }
    pub fn metadata(mut self, v: MetadataSelection) -> Self {
        self.settings.metadata = v;
        self
    }
    pub fn rawdata(mut self, v: bool) -> Self {
        self.settings.rawdata = v;
        self
    }
    pub fn array_format(mut self, v: ArrayFormat) -> Self {
        self.settings.array_format = v;
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * the instrument must support the mode (PANDA: `DAT` only, MIRA: no `SANS`),
    /// * binary modes need a binary array format, `DAT` a structured one,
    /// * in `TOF` mode `foils` must be non-empty and every index below [`FOILS`],
    /// * foil indices must be unique.
    ///
    /// Return
    /// ----------
    /// * `Err(ReductionError::InvalidLoaderMode)` for an unsupported mode or array format,
    ///   `Err(ReductionError::InvalidParameter)` for a bad foil list.
    pub fn build(self) -> Result<LoaderSettings, ReductionError> {
        let s = &self.settings;

        if !s.instrument.supports(s.mode) {
            return Err(ReductionError::InvalidLoaderMode(format!(
                "{} has no {} mode",
                s.instrument, s.mode
            )));
        }
        if s.mode.is_binary() != s.array_format.is_binary() {
            return Err(ReductionError::InvalidLoaderMode(format!(
                "array format {:?} does not fit {} mode",
                s.array_format, s.mode
            )));
        }

        let unique: BTreeSet<&FoilIndex> = s.foils.iter().collect();
        if unique.len() != s.foils.len() {
            return Err(ReductionError::InvalidParameter(
                "foil indices must be unique".into(),
            ));
        }
        if s.mode == Mode::Tof {
            if s.foils.is_empty() {
                return Err(ReductionError::InvalidParameter(
                    "TOF mode needs at least one foil".into(),
                ));
            }
            if let Some(bad) = s.foils.iter().find(|&&f| f >= FOILS) {
                return Err(ReductionError::InvalidParameter(format!(
                    "foil index {bad} exceeds the {FOILS} recorded foils"
                )));
            }
        }

        Ok(self.settings)
    }
}
