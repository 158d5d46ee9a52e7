//! # Batch reductions
//!
//! A [`ReductionStructure`] holds the reductions of a series of measurement files, runs them,
//! collates scalar parameters from their metadata and exports the result as a text table.
//!
//! ## Overview
//! -----------------
//! * [`Reduction`] – one file: its [`DataFile`], the selected channels as a
//!   `(channel, time bin, y, x)` array and the [`ReductionJob`] applied to them.
//! * [`ReductionStructure::analyze`] – looks every requested metadata key up in every run and
//!   stores the values under the requested alias. The echo time is always collected, as
//!   [`ECHO_TIME_ALIAS`].
//! * [`ReductionStructure::write_table`] / [`ReductionStructure::export`] – one header line of
//!   `#`-prefixed column names, then one fixed-width row per run.
//!
//! ## Example
//! -----------------
//! ```rust,no_run
//! use camino::Utf8Path;
//! use nredux::data_path::CustomDataPath;
//! use nredux::file_loader::{CascadeLoader, FileLoader};
//! use nredux::instrument::{Instrument, LoaderSettings, Mode};
//! use nredux::reduction::job_result::ResultKind;
//! use nredux::reduction::structure::{ExportLayout, ReductionStructure};
//! use nredux::reduction::ReductionJob;
//! use nredux::roi::RoiSpec;
//! use nredux::sine_fit::FitBackend;
//!
//! let settings = LoaderSettings::preset(Instrument::Reseda, Mode::Tof)?;
//! let loader = CascadeLoader::new(CustomDataPath::new("tests/data/00147720.tof"), settings)?;
//! let job = ReductionJob::roi(
//!     RoiSpec::Lrbt([20, 25, 54, 75]),
//!     FitBackend::default(),
//!     ResultKind::AllAverage,
//! );
//!
//! let mut structure =
//!     ReductionStructure::from_components([(&loader as &dyn FileLoader, 147720, job)])?;
//! structure.run_all()?;
//! structure.analyze(&[("selector_lambda", "lambda")]);
//! structure.export(Utf8Path::new("contrast.txt"), ExportLayout::Combined)?;
//! # Ok::<(), nredux::nredux_errors::ReductionError>(())
//! ```
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use itertools::Itertools;
use log::{info, warn};
use ndarray::Array4;

use crate::constants::{
    Count, FileNumber, FoilIndex, CLOSE_ATOL, CLOSE_RTOL, ECHO_TIME_ALIAS, ECHO_TIME_KEY,
};
use crate::file_loader::{DataFile, FileLoader};
use crate::metadata::{Lookup, MetadataDocument};
use crate::nredux_errors::ReductionError;
use crate::reduction::job_result::ReductionJobResult;
use crate::reduction::ReductionJob;

/// Width of every exported column.
const COLUMN_WIDTH: usize = 16;

/// Reduction of one measurement file.
#[derive(Debug, Clone)]
pub struct Reduction {
    file_number: FileNumber,
    metadata: MetadataDocument,
    selected: Array4<Count>,
    job: ReductionJob,
    result: Option<ReductionJobResult>,
}

impl Reduction {
    /// Read `file_number` through `loader` and select the configured channels.
    pub fn new<L>(
        loader: &L,
        file_number: FileNumber,
        job: ReductionJob,
    ) -> Result<Self, ReductionError>
    where
        L: FileLoader + ?Sized,
    {
        let data = loader.read_out_data(file_number)?;
        Self::from_data_file(file_number, data, loader.settings().foils(), job)
    }

    /// Build a reduction from already loaded data.
    ///
    /// Return
    /// ----------
    /// * `Err(ReductionError::InvalidParameter)` when the payload was not read, or the
    ///   [`select_foils`](crate::raw_data::RawDataArray::select_foils) error for a payload that
    ///   is not time-resolved.
    pub fn from_data_file(
        file_number: FileNumber,
        data: DataFile,
        foils: &[FoilIndex],
        job: ReductionJob,
    ) -> Result<Self, ReductionError> {
        let Some(raw) = data.rawdata else {
            return Err(ReductionError::InvalidParameter(format!(
                "file {file_number} was loaded without its raw data"
            )));
        };
        Ok(Reduction {
            file_number,
            selected: raw.select_foils(foils)?,
            metadata: data.metadata,
            job,
            result: None,
        })
    }

    /// Run the job (again) and keep its result.
    pub fn run(&mut self) -> Result<&ReductionJobResult, ReductionError> {
        let result = self.job.run(self.selected.view())?;
        info!(
            "file {}: contrast {:.4} ± {:.4}",
            self.file_number,
            result.contrast(),
            result.contrast_err()
        );
        Ok(self.result.insert(result))
    }

    pub fn file_number(&self) -> FileNumber {
        self.file_number
    }

    pub fn metadata(&self) -> &MetadataDocument {
        &self.metadata
    }

    /// `(channel, time bin, y, x)` counts handed to the job.
    pub fn selected(&self) -> &Array4<Count> {
        &self.selected
    }

    pub fn job(&self) -> &ReductionJob {
        &self.job
    }

    /// `None` until [`Reduction::run`] succeeded.
    pub fn result(&self) -> Option<&ReductionJobResult> {
        self.result.as_ref()
    }
}

/// Collated value of one parameter over the runs of a structure.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Same value (within tolerance) in every run.
    Scalar(f64),
    /// One value per run, in run order.
    PerRun(Vec<f64>),
}

impl ParamValue {
    /// Collapse to a scalar when all values are close to the first one.
    fn collate(values: Vec<f64>) -> Self {
        match values.first() {
            Some(&first) if values.iter().all(|&v| is_close(v, first)) => {
                ParamValue::Scalar(first)
            }
            _ => ParamValue::PerRun(values),
        }
    }

    /// Value of run `run`.
    pub fn value(&self, run: usize) -> Option<f64> {
        match self {
            ParamValue::Scalar(v) => Some(*v),
            ParamValue::PerRun(values) => values.get(run).copied(),
        }
    }
}

/// `|a − b| ≤ atol + rtol·|b|`
fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= CLOSE_ATOL + CLOSE_RTOL * b.abs()
}

/// Columns written per run by [`ReductionStructure::write_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportLayout {
    /// `contrast`, `contrast_err` of the combined result.
    #[default]
    Combined,
    /// `contrast_i`, `contrast_err_i` of every channel.
    PerChannel,
}

/// Ordered collection of reductions with collated parameters.
#[derive(Debug, Clone, Default)]
pub struct ReductionStructure {
    reductions: Vec<Reduction>,
    parameters: BTreeMap<String, ParamValue>,
}

impl ReductionStructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one [`Reduction`] per `(loader, file number, job)` triple.
    pub fn from_components<'a, I>(components: I) -> Result<Self, ReductionError>
    where
        I: IntoIterator<Item = (&'a dyn FileLoader, FileNumber, ReductionJob)>,
    {
        let reductions = components
            .into_iter()
            .map(|(loader, file_number, job)| Reduction::new(loader, file_number, job))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReductionStructure {
            reductions,
            parameters: BTreeMap::new(),
        })
    }

    pub fn push(&mut self, reduction: Reduction) {
        self.reductions.push(reduction);
    }

    pub fn reductions(&self) -> &[Reduction] {
        &self.reductions
    }

    pub fn len(&self) -> usize {
        self.reductions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reductions.is_empty()
    }

    /// Run every reduction, stopping at the first failure.
    pub fn run_all(&mut self) -> Result<(), ReductionError> {
        for reduction in &mut self.reductions {
            reduction.run()?;
        }
        info!("reduced {} files", self.reductions.len());
        Ok(())
    }

    /// Collate metadata parameters over all runs.
    ///
    /// Arguments
    /// -----------------
    /// * `param_keys` – `(metadata key, alias)` pairs. `(tau, tau_M)` is always added on top
    ///   of them; a pair reusing the alias `tau_M` replaces it.
    ///
    /// Return
    /// ----------
    /// * The parameters stored so far, by alias. Only [`MetaValue::Float`] entries are
    ///   collected: a key found nowhere in a run, or holding any other value (integer,
    ///   quantity, text), contributes `0.0` for that run (with a warning). Values equal to
    ///   within `rtol = 1e-5`, `atol = 1e-8` in every run collapse to a [`ParamValue::Scalar`].
    ///
    /// [`MetaValue::Float`]: crate::metadata::MetaValue::Float
    pub fn analyze(&mut self, param_keys: &[(&str, &str)]) -> &BTreeMap<String, ParamValue> {
        // alias -> metadata key
        let mut keys: BTreeMap<&str, &str> = BTreeMap::new();
        keys.insert(ECHO_TIME_ALIAS, ECHO_TIME_KEY);
        keys.extend(param_keys.iter().map(|&(key, alias)| (alias, key)));

        for (alias, key) in keys {
            let values = self
                .reductions
                .iter()
                .map(|r| match r.metadata().find(key) {
                    Some(Lookup::Entry { value, .. }) => value.as_float().unwrap_or_else(|| {
                        warn!(
                            "file {}: '{key}' = '{value}' is not a float, using 0.0",
                            r.file_number()
                        );
                        0.0
                    }),
                    Some(Lookup::Section(_)) => {
                        warn!("file {}: '{key}' names a section, using 0.0", r.file_number());
                        0.0
                    }
                    None => {
                        warn!("file {}: no metadata entry '{key}', using 0.0", r.file_number());
                        0.0
                    }
                })
                .collect();
            self.parameters
                .insert(alias.to_string(), ParamValue::collate(values));
        }
        &self.parameters
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn parameter(&self, alias: &str) -> Option<&ParamValue> {
        self.parameters.get(alias)
    }

    /// Write the collated parameters and contrasts as a fixed-width text table.
    ///
    /// Arguments
    /// -----------------
    /// * `writer` – destination.
    /// * `layout` – contrast columns, see [`ExportLayout`]. Runs with fewer channels than the
    ///   widest run are padded with NaN.
    ///
    /// Return
    /// ----------
    /// * `Err(ReductionError::InvalidParameter)` when a run has no result yet, or the I/O error
    ///   of the writer.
    pub fn write_table<W: Write>(
        &self,
        mut writer: W,
        layout: ExportLayout,
    ) -> Result<(), ReductionError> {
        let results = self
            .reductions
            .iter()
            .map(|r| {
                r.result().ok_or_else(|| {
                    ReductionError::InvalidParameter(format!(
                        "file {} has not been reduced",
                        r.file_number()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let channels = results.iter().map(|r| r.fits().len()).max().unwrap_or(0);
        let mut names: Vec<String> = self.parameters.keys().cloned().collect();
        match layout {
            ExportLayout::Combined => {
                names.extend(["contrast".to_string(), "contrast_err".to_string()])
            }
            ExportLayout::PerChannel => {
                for c in 0..channels {
                    names.push(format!("contrast_{c}"));
                    names.push(format!("contrast_err_{c}"));
                }
            }
        }

        let header = names
            .iter()
            .map(|name| format!(" {name:>w$}", w = COLUMN_WIDTH))
            .join("");
        writeln!(writer, "#{header}")?;

        for (run, result) in results.iter().enumerate() {
            let mut row: Vec<f64> = self
                .parameters
                .values()
                .map(|p| p.value(run).unwrap_or(f64::NAN))
                .collect();
            match layout {
                ExportLayout::Combined => row.extend([result.contrast(), result.contrast_err()]),
                ExportLayout::PerChannel => {
                    let pairs = result.channel_contrasts();
                    for c in 0..channels {
                        let (v, e) = pairs.get(c).copied().unwrap_or((f64::NAN, f64::NAN));
                        row.extend([v, e]);
                    }
                }
            }

            let line = row
                .iter()
                .map(|value| format!(" {value:>w$.8e}", w = COLUMN_WIDTH))
                .join("");
            writeln!(writer, " {line}")?;
        }
        Ok(())
    }

    /// Write the table of [`ReductionStructure::write_table`] to the file at `path`.
    pub fn export(&self, path: &Utf8Path, layout: ExportLayout) -> Result<(), ReductionError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_table(&mut writer, layout)?;
        writer.flush()?;
        info!("exported {} runs to {path}", self.reductions.len());
        Ok(())
    }
}
