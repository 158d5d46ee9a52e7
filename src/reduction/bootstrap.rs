//! # Bootstrap ROI search
//!
//! Randomised search for a region of interest whose contrast does not depend on where exactly
//! its boundaries were drawn.
//!
//! ## Overview
//! -----------------
//! 1. The beam centre `(c0, c1)` is fitted on the detector image summed over channels and time
//!    bins (or taken from [`BootstrapParams::center`]).
//! 2. `steps` candidate ROIs are drawn: each of the four boundaries sits at a distance
//!    `d ∼ N(offset_center, offset_sigma)` from the centre, rounded to whole pixels,
//!    `lrbt = [c1 − d₁, c1 + d₂, c0 − d₃, c0 + d₄]`.
//! 3. Only the probe channel is fitted for every candidate.
//! 4. The valid candidate contrasts (finite contrast and error) are combined by inverse-variance
//!    weighting into the bootstrap estimate.
//! 5. The candidate whose contrast is closest to that estimate becomes the representative ROI.
//!    How candidates without a valid contrast take part in this search is set by
//!    [`RepresentativePolicy`].
//! 6. All channels are fitted once with the representative ROI, and the [`BootstrapSummary`] is
//!    attached to every channel result.
//!
//! Runs are reproducible when [`BootstrapParams::seed`] is set.
use std::fmt;

use log::{info, warn};
use ndarray::{ArrayView4, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::beam_center::fit_beam_center;
use crate::constants::{Count, FoilIndex};
use crate::nredux_errors::ReductionError;
use crate::reduction::job_result::weighted_average;
use crate::roi::RoiSpec;
use crate::sine_fit::{poisson_weights, time_bins, FitBackend, SineFit, SineFitResult};

/// Treatment of candidates without a valid contrast in the representative search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepresentativePolicy {
    /// Only valid candidates can become the representative ROI.
    #[default]
    SkipInvalid,
    /// Invalid contrasts count as `0.0`, so an invalid candidate wins whenever the estimate is
    /// closer to zero than every valid contrast.
    CoerceNanToZero,
}

/// Parameters of the bootstrap search.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapParams {
    /// Mean boundary distance from the beam centre, in pixels.
    pub offset_center: f64,
    /// Standard deviation of the boundary distance, in pixels.
    pub offset_sigma: f64,
    /// Number of candidate ROIs.
    pub steps: usize,
    /// Channel position fitted for every candidate.
    pub probe_channel: FoilIndex,
    pub seed: Option<u64>,
    pub policy: RepresentativePolicy,
    /// Beam centre `(axis 0, axis 1)`; fitted from the data when `None`.
    pub center: Option<(f64, f64)>,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        BootstrapParams {
            offset_center: 4.5,
            offset_sigma: 1.0,
            steps: 100,
            probe_channel: 0,
            seed: None,
            policy: RepresentativePolicy::SkipInvalid,
            center: None,
        }
    }
}

impl BootstrapParams {
    pub fn builder() -> BootstrapParamsBuilder {
        BootstrapParamsBuilder::new()
    }
}

impl fmt::Display for BootstrapParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 36;
            writeln!(f, "Bootstrap ROI search")?;
            writeln!(f, "--------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            line!("offset_center = {:.2} px", self.offset_center, "Mean boundary distance")?;
            line!("offset_sigma  = {:.2} px", self.offset_sigma, "Boundary distance spread")?;
            line!("steps         = {}", self.steps, "Candidate ROIs drawn")?;
            line!("probe_channel = {}", self.probe_channel, "Channel fitted per candidate")?;
            line!("seed          = {:?}", self.seed, "None draws from the OS")?;
            line!("policy        = {:?}", self.policy, "Invalid candidates in the search")?;
            line!("center        = {:?}", self.center, "None fits the beam centre")?;
            Ok(())
        } else {
            write!(
                f,
                "BootstrapParams(offset=N({:.2}, {:.2}) px, steps={}, probe_channel={}, seed={:?})",
                self.offset_center, self.offset_sigma, self.steps, self.probe_channel, self.seed
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapParamsBuilder {
    params: BootstrapParams,
}

impl BootstrapParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset_center(mut self, v: f64) -> Self {
        self.params.offset_center = v;
        self
    }

    pub fn offset_sigma(mut self, v: f64) -> Self {
        self.params.offset_sigma = v;
        self
    }

    pub fn steps(mut self, v: usize) -> Self {
        self.params.steps = v;
        self
    }

    pub fn probe_channel(mut self, v: FoilIndex) -> Self {
        self.params.probe_channel = v;
        self
    }

    pub fn seed(mut self, v: u64) -> Self {
        self.params.seed = Some(v);
        self
    }

    pub fn policy(mut self, v: RepresentativePolicy) -> Self {
        self.params.policy = v;
        self
    }

    pub fn center(mut self, c0: f64, c1: f64) -> Self {
        self.params.center = Some((c0, c1));
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `offset_center` finite, `offset_sigma` finite and ≥ 0,
    /// * `steps` ≥ 1,
    /// * a given `center` must be finite.
    pub fn build(self) -> Result<BootstrapParams, ReductionError> {
        let p = &self.params;
        if !p.offset_center.is_finite() {
            return Err(ReductionError::InvalidParameter(
                "offset_center must be finite".into(),
            ));
        }
        if !(p.offset_sigma.is_finite() && p.offset_sigma >= 0.0) {
            return Err(ReductionError::InvalidParameter(
                "offset_sigma must be finite and >= 0".into(),
            ));
        }
        if p.steps == 0 {
            return Err(ReductionError::InvalidParameter(
                "steps must be >= 1".into(),
            ));
        }
        if let Some((c0, c1)) = p.center {
            if !(c0.is_finite() && c1.is_finite()) {
                return Err(ReductionError::InvalidParameter(
                    "beam center must be finite".into(),
                ));
            }
        }
        Ok(self.params)
    }
}

/// Outcome of the candidate search, attached to every channel result.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSummary {
    /// Inverse-variance mean of the valid candidate contrasts.
    pub estimate: f64,
    pub error: f64,
    /// Representative ROI.
    pub roi: RoiSpec,
    /// Candidates drawn.
    pub steps: usize,
    /// Candidates with a finite contrast and error.
    pub valid: usize,
}

/// One drawn ROI with the contrast of the probe channel.
#[derive(Debug, Clone)]
struct Candidate {
    roi: RoiSpec,
    contrast: f64,
    contrast_err: f64,
}

impl Candidate {
    fn is_valid(&self) -> bool {
        self.contrast.is_finite() && self.contrast_err.is_finite()
    }
}

fn fit_channel(
    backend: &FitBackend,
    selected: &ArrayView4<'_, Count>,
    channel: usize,
    roi: &RoiSpec,
) -> Result<SineFitResult, ReductionError> {
    let counts = roi.extract(selected.index_axis(Axis(0), channel))?;
    backend.fit(&time_bins(counts.len()), &counts, &poisson_weights(&counts))
}

/// Beam centre `(c0, c1)` of the channel and time sum of `selected`.
pub(crate) fn beam_center(selected: &ArrayView4<'_, Count>) -> Result<(f64, f64), ReductionError> {
    let image = selected
        .mapv(f64::from)
        .sum_axis(Axis(0))
        .sum_axis(Axis(0));
    match fit_beam_center(image.view())?.as_slice() {
        [c0, c1] => Ok((*c0, *c1)),
        other => Err(ReductionError::ShapeMismatch {
            expected: vec![2],
            found: other.len(),
        }),
    }
}

/// Draw the candidate boundaries around `center`.
fn draw_candidates<R: Rng + ?Sized>(
    center: (f64, f64),
    params: &BootstrapParams,
    rng: &mut R,
) -> Result<Vec<RoiSpec>, ReductionError> {
    let offset = Normal::new(params.offset_center, params.offset_sigma)?;
    let (c0, c1) = center;
    Ok((0..params.steps)
        .map(|_| {
            let mut d = || offset.sample(&mut *rng);
            let (left, right, bottom, top) = (c1 - d(), c1 + d(), c0 - d(), c0 + d());
            RoiSpec::Lrbt([left, right, bottom, top].map(|v| v.round() as i64))
        })
        .collect())
}

/// Position of the candidate closest to `estimate`.
fn representative(
    candidates: &[Candidate],
    estimate: f64,
    policy: RepresentativePolicy,
) -> Option<usize> {
    let distance = |c: &Candidate| match policy {
        RepresentativePolicy::SkipInvalid if !c.is_valid() => None,
        RepresentativePolicy::CoerceNanToZero if c.contrast.is_nan() => Some(estimate.abs()),
        _ => Some((c.contrast - estimate).abs()),
    };
    candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| distance(c).map(|d| (i, d)))
        .filter(|(_, d)| !d.is_nan())
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Run the bootstrap search with an explicit random source.
///
/// Arguments
/// -----------------
/// * `selected` – `(channel, time bin, y, x)` counts of the reduced channels.
/// * `backend` – sine-fit backend used for candidates and the final fit.
/// * `params` – search parameters; `params.seed` is ignored here.
/// * `rng` – random source for the boundary offsets.
///
/// Return
/// ----------
/// * One [`SineFitResult`] per channel, each carrying the [`BootstrapSummary`].
/// * `Err(ReductionError::NoValidBootstrapCandidate)` when no candidate yields a finite
///   contrast, `Err(ReductionError::ChannelIndexOutOfRange)` for a bad probe channel.
pub fn run_with_rng<R: Rng + ?Sized>(
    selected: ArrayView4<'_, Count>,
    backend: &FitBackend,
    params: &BootstrapParams,
    rng: &mut R,
) -> Result<Vec<SineFitResult>, ReductionError> {
    let channels = selected.len_of(Axis(0));
    if params.probe_channel >= channels {
        return Err(ReductionError::ChannelIndexOutOfRange {
            index: params.probe_channel,
            len: channels,
        });
    }

    let center = match params.center {
        Some(c) => c,
        None => beam_center(&selected)?,
    };

    let candidates = draw_candidates(center, params, rng)?
        .into_iter()
        .map(|roi| {
            let fit = fit_channel(backend, &selected, params.probe_channel, &roi)?;
            Ok(Candidate {
                roi,
                contrast: fit.contrast,
                contrast_err: fit.contrast_err,
            })
        })
        .collect::<Result<Vec<_>, ReductionError>>()?;

    let valid = candidates.iter().filter(|c| c.is_valid()).count();
    if valid == 0 {
        return Err(ReductionError::NoValidBootstrapCandidate);
    }
    if valid < candidates.len() {
        warn!(
            "bootstrap: {} of {} candidates without a valid contrast",
            candidates.len() - valid,
            candidates.len()
        );
    }

    let (estimate, error) = weighted_average(
        candidates
            .iter()
            .filter(|c| c.is_valid())
            .map(|c| (c.contrast, c.contrast_err)),
    );
    let Some(best) = representative(&candidates, estimate, params.policy) else {
        return Err(ReductionError::NoValidBootstrapCandidate);
    };
    let roi = candidates[best].roi.clone();
    info!(
        "bootstrap: contrast {estimate:.4} ± {error:.4} over {valid} candidates, \
         representative ROI {roi}"
    );

    let summary = BootstrapSummary {
        estimate,
        error,
        roi: roi.clone(),
        steps: params.steps,
        valid,
    };
    (0..channels)
        .map(|channel| {
            let mut fit = fit_channel(backend, &selected, channel, &roi)?;
            fit.bootstrap = Some(summary.clone());
            Ok(fit)
        })
        .collect()
}

/// Run the bootstrap search, seeding the random source from [`BootstrapParams::seed`] (or from
/// the operating system when unset).
///
/// See also
/// ------------
/// * [`run_with_rng`] – full description of the search.
pub fn run(
    selected: ArrayView4<'_, Count>,
    backend: &FitBackend,
    params: &BootstrapParams,
) -> Result<Vec<SineFitResult>, ReductionError> {
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    run_with_rng(selected, backend, params, &mut rng)
}

#[cfg(test)]
mod bootstrap_test {
    use super::*;

    fn candidate(contrast: f64, contrast_err: f64, left: i64) -> Candidate {
        Candidate {
            roi: RoiSpec::Lrbt([left, left + 9, 60, 69]),
            contrast,
            contrast_err,
        }
    }

    #[test]
    fn test_builder_validation() {
        assert!(BootstrapParams::builder().steps(0).build().is_err());
        assert!(BootstrapParams::builder().offset_sigma(-1.0).build().is_err());
        assert!(BootstrapParams::builder().center(f64::NAN, 3.0).build().is_err());

        let p = BootstrapParams::builder().steps(20).seed(7).build().unwrap();
        assert_eq!(p.steps, 20);
        assert_eq!(p.seed, Some(7));
        assert_eq!(p.offset_center, 4.5);
    }

    #[test]
    fn test_display() {
        let p = BootstrapParams::default();
        assert!(p.to_string().starts_with("BootstrapParams(offset=N(4.50, 1.00) px, steps=100"));
        let table = format!("{p:#}");
        assert!(table.contains("steps         = 100"));
        assert!(table.contains("# Candidate ROIs drawn"));
    }

    #[test]
    fn test_draws_are_seeded() {
        let params = BootstrapParams::builder().steps(5).build().unwrap();
        let a = draw_candidates((64.0, 64.0), &params, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = draw_candidates((64.0, 64.0), &params, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        for roi in &a {
            let [l, r, b, t] = roi.bounds().unwrap();
            assert!(l < 64 && r > 64 && b < 64 && t > 64);
        }
    }

    #[test]
    fn test_zero_sigma_draws_fixed_window() {
        let params = BootstrapParams::builder().offset_sigma(0.0).steps(3).build().unwrap();
        let rois = draw_candidates((40.2, 70.0), &params, &mut StdRng::seed_from_u64(1)).unwrap();
        // 70 ± 4.5 and 40.2 ± 4.5, rounded half away from zero
        assert!(rois.iter().all(|r| *r == RoiSpec::Lrbt([66, 75, 36, 45])));
    }

    #[test]
    fn test_representative_policies() {
        let candidates = vec![
            candidate(0.30, 0.02, 10),
            candidate(f64::NAN, f64::NAN, 20),
            candidate(0.50, 0.02, 30),
        ];
        // estimate near zero: only the coercing policy lets the NaN candidate win
        use RepresentativePolicy::{CoerceNanToZero, SkipInvalid};
        assert_eq!(representative(&candidates, 0.05, SkipInvalid), Some(0));
        assert_eq!(representative(&candidates, 0.05, CoerceNanToZero), Some(1));
        assert_eq!(representative(&candidates, 0.45, SkipInvalid), Some(2));

        let invalid = vec![candidate(f64::NAN, f64::NAN, 0)];
        assert_eq!(representative(&invalid, 0.4, SkipInvalid), None);
    }
}
