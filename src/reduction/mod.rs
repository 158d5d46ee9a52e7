//! # Contrast reduction
//!
//! From time-resolved detector counts to a MIEZE contrast.
//!
//! ## Overview
//! -----------------
//! A [`ReductionJob`] receives the selected channels of one measurement as a
//! `(channel, time bin, y, x)` array. For every channel it sums a region of interest
//! ([`RoiSpec`]) into one count per time bin, fits the sine with its [`FitBackend`]
//! and finally combines the channel fits into a [`ReductionJobResult`] according to its
//! [`ResultKind`].
//!
//! | job | ROI |
//! |---|---|
//! | [`JobKind::Roi`] | one ROI shared by every channel, given or placed by [`default_roi`] |
//! | [`JobKind::MultiRoi`] | one ROI per channel |
//! | [`JobKind::Bootstrap`] | representative ROI found by the [`bootstrap`] search |
//! | [`JobKind::Superimposed`] | reserved, fails with [`ReductionError::NotImplemented`] |
//!
//! The weights of every sine fit are Poisson weights `1/√count` (zero for empty bins).
//!
//! ## See also
//! ------------
//! * [`structure`] – batches of reductions over many files, with parameter collation and export.
pub mod bootstrap;
pub mod job_result;
pub mod structure;

use std::fmt;

use log::debug;
use ndarray::{ArrayView4, Axis};

use crate::constants::Count;
use crate::nredux_errors::ReductionError;
use crate::roi::{default_roi, RoiSpec};
use crate::sine_fit::{poisson_weights, time_bins, FitBackend, SineFit, SineFitResult};
use bootstrap::BootstrapParams;
use job_result::{ReductionJobResult, ResultKind};

/// Kinds of reduction jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Roi,
    MultiRoi,
    Bootstrap,
    Superimposed,
}

impl JobKind {
    /// Resolve a job key: `"roi"` (or `"individual_fitting"`), `"multiroi"`, `"bootstrap"`,
    /// `"superimposed"` (or `"superimposed_fitting"`), in any case.
    pub fn from_key(key: &str) -> Result<Self, ReductionError> {
        match key.to_ascii_lowercase().as_str() {
            "roi" | "individual_fitting" => Ok(JobKind::Roi),
            "multiroi" => Ok(JobKind::MultiRoi),
            "bootstrap" => Ok(JobKind::Bootstrap),
            "superimposed" | "superimposed_fitting" => Ok(JobKind::Superimposed),
            _ => Err(ReductionError::UnknownJob(key.to_string())),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            JobKind::Roi => "roi",
            JobKind::MultiRoi => "multiroi",
            JobKind::Bootstrap => "bootstrap",
            JobKind::Superimposed => "superimposed",
        };
        write!(f, "{key}")
    }
}

/// ROI configuration of a job.
#[derive(Debug, Clone, PartialEq)]
enum JobRoi {
    Shared(RoiSpec),
    BeamCentered,
    PerChannel(Vec<RoiSpec>),
    Bootstrap(BootstrapParams),
    Superimposed,
}

/// One configured reduction: ROI strategy, fit backend and result combination.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionJob {
    roi: JobRoi,
    backend: FitBackend,
    result: ResultKind,
}

impl ReductionJob {
    pub fn roi(roi: RoiSpec, backend: FitBackend, result: ResultKind) -> Self {
        ReductionJob {
            roi: JobRoi::Shared(roi),
            backend,
            result,
        }
    }

    /// Shared ROI placed by [`default_roi`] around the beam centre fitted on the summed
    /// counts of every run.
    pub fn beam_centered(backend: FitBackend, result: ResultKind) -> Self {
        ReductionJob {
            roi: JobRoi::BeamCentered,
            backend,
            result,
        }
    }

    /// ROI `rois[i]` is applied to channel `i`; the number of ROIs must match the number of
    /// channels at run time.
    pub fn multi_roi(rois: Vec<RoiSpec>, backend: FitBackend, result: ResultKind) -> Self {
        ReductionJob {
            roi: JobRoi::PerChannel(rois),
            backend,
            result,
        }
    }

    pub fn bootstrap(params: BootstrapParams, backend: FitBackend, result: ResultKind) -> Self {
        ReductionJob {
            roi: JobRoi::Bootstrap(params),
            backend,
            result,
        }
    }

    pub fn superimposed(backend: FitBackend, result: ResultKind) -> Self {
        ReductionJob {
            roi: JobRoi::Superimposed,
            backend,
            result,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self.roi {
            JobRoi::Shared(_) | JobRoi::BeamCentered => JobKind::Roi,
            JobRoi::PerChannel(_) => JobKind::MultiRoi,
            JobRoi::Bootstrap(_) => JobKind::Bootstrap,
            JobRoi::Superimposed => JobKind::Superimposed,
        }
    }

    pub fn backend(&self) -> &FitBackend {
        &self.backend
    }

    pub fn result_kind(&self) -> &ResultKind {
        &self.result
    }

    /// Reduce the selected channels of one measurement.
    ///
    /// Arguments
    /// -----------------
    /// * `selected` – `(channel, time bin, y, x)` counts, channels in reduction order.
    ///
    /// Return
    /// ----------
    /// * The combined [`ReductionJobResult`]. Non-converged fits are part of the result, not
    ///   errors.
    /// * `Err` for a ROI that cannot be applied, a ROI count not matching the channels, a
    ///   reserved job or backend, or a result kind naming a missing channel.
    pub fn run(
        &self,
        selected: ArrayView4<'_, Count>,
    ) -> Result<ReductionJobResult, ReductionError> {
        let channels = selected.len_of(Axis(0));
        debug!("running {} job on {channels} channels", self.kind());

        let fits = match &self.roi {
            JobRoi::Shared(roi) => (0..channels)
                .map(|c| self.fit_channel(&selected, c, roi))
                .collect::<Result<Vec<_>, _>>()?,
            JobRoi::BeamCentered => {
                let roi = default_roi(bootstrap::beam_center(&selected)?);
                debug!("default ROI {roi}");
                (0..channels)
                    .map(|c| self.fit_channel(&selected, c, &roi))
                    .collect::<Result<Vec<_>, _>>()?
            }
            JobRoi::PerChannel(rois) => {
                if rois.len() != channels {
                    return Err(ReductionError::InvalidRoiSpecification(format!(
                        "{} ROIs given for {channels} channels",
                        rois.len()
                    )));
                }
                rois.iter()
                    .enumerate()
                    .map(|(c, roi)| self.fit_channel(&selected, c, roi))
                    .collect::<Result<Vec<_>, _>>()?
            }
            JobRoi::Bootstrap(params) => bootstrap::run(selected.view(), &self.backend, params)?,
            JobRoi::Superimposed => {
                return Err(ReductionError::NotImplemented(
                    "superimposed fitting of all channels".into(),
                ))
            }
        };

        ReductionJobResult::create(fits, &self.result)
    }

    fn fit_channel(
        &self,
        selected: &ArrayView4<'_, Count>,
        channel: usize,
        roi: &RoiSpec,
    ) -> Result<SineFitResult, ReductionError> {
        let counts = roi.extract(selected.index_axis(Axis(0), channel))?;
        self.backend
            .fit(&time_bins(counts.len()), &counts, &poisson_weights(&counts))
    }
}

#[cfg(test)]
mod reduction_test {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array4;
    use std::f64::consts::PI;

    /// Two channels of noiseless MIEZE signal, `per_pixel·(1 + c·sin(ωt + φ))` inside a
    /// 10 × 10 spot at x, y ∈ 60..70 and no counts elsewhere.
    pub(crate) fn mieze_channels(contrasts: &[f64]) -> Array4<Count> {
        Array4::from_shape_fn((contrasts.len(), 16, 128, 128), |(ch, t, y, x)| {
            if (60..70).contains(&y) && (60..70).contains(&x) {
                let phase = PI / 8.0 * t as f64 + PI / 3.0;
                (100.0 * (1.0 + contrasts[ch] * phase.sin())).round() as Count
            } else {
                0
            }
        })
    }

    #[test]
    fn test_job_keys() {
        assert_eq!(JobKind::from_key("ROI"), Ok(JobKind::Roi));
        assert_eq!(JobKind::from_key("individual_fitting"), Ok(JobKind::Roi));
        assert_eq!(JobKind::from_key("bootstrap"), Ok(JobKind::Bootstrap));
        assert_eq!(
            JobKind::from_key("unknown_job"),
            Err(ReductionError::UnknownJob("unknown_job".into()))
        );
    }

    #[test]
    fn test_roi_job_recovers_contrast() {
        let data = mieze_channels(&[0.6, 0.4]);
        let job = ReductionJob::roi(
            RoiSpec::Lrbt([55, 75, 55, 75]),
            FitBackend::default(),
            ResultKind::SelectFoil(1),
        );
        let result = job.run(data.view()).unwrap();
        assert_eq!(result.fits().len(), 2);
        assert_relative_eq!(result.fits()[0].contrast, 0.6, max_relative = 0.01);
        assert_relative_eq!(result.contrast(), 0.4, max_relative = 0.01);
        assert_relative_eq!(result.fits()[0].phase, PI / 3.0, max_relative = 0.01);
    }

    #[test]
    fn test_beam_centered_job_uses_default_roi() {
        let data = mieze_channels(&[0.6, 0.4]);
        let center = bootstrap::beam_center(&data.view()).unwrap();
        assert_relative_eq!(center.0, 64.5, epsilon = 0.3);
        assert_relative_eq!(center.1, 64.5, epsilon = 0.3);

        let job = ReductionJob::beam_centered(FitBackend::default(), ResultKind::SelectFoil(1));
        assert_eq!(job.kind(), JobKind::Roi);
        let result = job.run(data.view()).unwrap();
        assert_eq!(result.fits().len(), 2);
        assert_relative_eq!(result.fits()[0].contrast, 0.6, max_relative = 0.01);
        assert_relative_eq!(result.contrast(), 0.4, max_relative = 0.01);
    }

    #[test]
    fn test_multi_roi_requires_one_roi_per_channel() {
        let data = mieze_channels(&[0.6, 0.4]);
        let job = ReductionJob::multi_roi(
            vec![RoiSpec::Lrbt([55, 75, 55, 75])],
            FitBackend::default(),
            ResultKind::AllAverage,
        );
        assert!(matches!(
            job.run(data.view()),
            Err(ReductionError::InvalidRoiSpecification(_))
        ));

        let job = ReductionJob::multi_roi(
            vec![RoiSpec::Lrbt([55, 75, 55, 75]), RoiSpec::Lbwh([60, 60, 10, 10])],
            FitBackend::default(),
            ResultKind::AllAverage,
        );
        let result = job.run(data.view()).unwrap();
        assert!(result.contrast() > 0.4 && result.contrast() < 0.6);
    }

    #[test]
    fn test_reserved_jobs() {
        let data = mieze_channels(&[0.5]);
        let superimposed =
            ReductionJob::superimposed(FitBackend::default(), ResultKind::AllAverage);
        assert!(matches!(
            superimposed.run(data.view()),
            Err(ReductionError::NotImplemented(_))
        ));

        let minuit = ReductionJob::roi(
            RoiSpec::Lrbt([55, 75, 55, 75]),
            FitBackend::Minuit,
            ResultKind::AllAverage,
        );
        assert!(matches!(
            minuit.run(data.view()),
            Err(ReductionError::NotImplemented(_))
        ));
    }
}
