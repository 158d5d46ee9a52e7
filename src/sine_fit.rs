//! # MIEZE sine fit
//!
//! Fit of one period of the time-modulated neutron intensity,
//!
//! ```text
//! I(t) = A·sin(ω·t + φ) + y₀,   ω = 2π/16 (fixed)
//! ```
//!
//! and reduction of the best-fit parameters to the contrast `A / y₀`.
//!
//! ## Overview
//! -----------------
//! The fit is backend-agnostic: callers hold a [`FitBackend`] and talk to it through the
//! [`SineFit`] trait. Only the Levenberg–Marquardt backend is implemented; the Minuit variant is
//! an extension point and reports [`ReductionError::NotImplemented`].
//!
//! Starting values are derived from the series itself (see [`initial_parameters`]) and the
//! parameters are bounded by `A ≥ 0`, `0 ≤ φ ≤ 2π` and `y₀ ≥ 0`.
//!
//! A fit that does not converge is not an error: the result carries `success = false`, and any
//! uncertainty that cannot be derived from the covariance is NaN (or `None` for the raw
//! parameter errors).
use std::str::FromStr;

use crate::constants::{DPI, MIEZE_OMEGA};
use crate::fitting::levenberg_marquardt::{minimize, LmConfig};
use crate::fitting::models::sine_model;
use crate::fitting::{FitOutcome, FitParameter};
use crate::nredux_errors::ReductionError;
use crate::reduction::bootstrap::BootstrapSummary;
use crate::uncertainty::{propagate_mult_div, Factor};

/// The four sine parameters, `A`, `ω`, `φ`, `y₀`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SineParams<T> {
    pub a: T,
    pub omega: T,
    pub phi: T,
    pub y0: T,
}

/// Backend-independent summary of one sine fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SineFitResult {
    /// `A / y₀`
    pub contrast: f64,
    /// NaN when the standard error of `A` or `y₀` is undefined.
    pub contrast_err: f64,
    pub phase: f64,
    pub phase_err: Option<f64>,
    pub chisqr: f64,
    pub redchi: f64,
    pub success: bool,
    pub raw_fit_vals: SineParams<f64>,
    /// `omega` is never fitted, its error is always `None`.
    pub raw_fit_errs: SineParams<Option<f64>>,
    /// Filled in by the bootstrap job.
    pub bootstrap: Option<BootstrapSummary>,
}

impl SineFitResult {
    pub(crate) fn from_outcome(outcome: &FitOutcome) -> Self {
        let value = |name: &str| outcome.value(name).unwrap_or(f64::NAN);
        let stderr = |name: &str| outcome.stderr(name);

        let raw_fit_vals = SineParams {
            a: value("A"),
            omega: value("omega"),
            phi: value("phi"),
            y0: value("y0"),
        };
        let raw_fit_errs = SineParams {
            a: stderr("A"),
            omega: stderr("omega"),
            phi: stderr("phi"),
            y0: stderr("y0"),
        };

        let contrast = raw_fit_vals.a / raw_fit_vals.y0;
        let contrast_err = match (raw_fit_errs.a, raw_fit_errs.y0) {
            (Some(a_err), Some(y0_err)) => {
                propagate_mult_div(&[
                    Factor::mul(raw_fit_vals.a, a_err),
                    Factor::div(raw_fit_vals.y0, y0_err),
                ])
                .1
            }
            _ => f64::NAN,
        };

        SineFitResult {
            contrast,
            contrast_err,
            phase: raw_fit_vals.phi,
            phase_err: raw_fit_errs.phi,
            chisqr: outcome.chisqr,
            redchi: outcome.redchi,
            success: outcome.success,
            raw_fit_vals,
            raw_fit_errs,
            bootstrap: None,
        }
    }
}

/// Anything able to fit the MIEZE sine to a counts series.
pub trait SineFit {
    /// Fit `counts` sampled at `x`.
    ///
    /// Arguments
    /// -----------------
    /// * `x` – time-bin positions, usually `0..16`.
    /// * `counts` – ROI counts per time bin.
    /// * `weights` – residual weights; NaN and infinite entries are replaced by zero.
    fn fit(
        &self,
        x: &[f64],
        counts: &[f64],
        weights: &[f64],
    ) -> Result<SineFitResult, ReductionError>;
}

/// Available fit backends.
#[derive(Debug, Clone, PartialEq)]
pub enum FitBackend {
    LevenbergMarquardt(LmConfig),
    /// Reserved; every fit fails with [`ReductionError::NotImplemented`].
    Minuit,
}

impl Default for FitBackend {
    fn default() -> Self {
        FitBackend::LevenbergMarquardt(LmConfig::default())
    }
}

impl FromStr for FitBackend {
    type Err = ReductionError;

    /// `"lmfit"`, `"lm"` or `"levenberg_marquardt"`, and `"iminuit"` or `"minuit"`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lmfit" | "lm" | "levenberg_marquardt" => Ok(FitBackend::default()),
            "iminuit" | "minuit" => Ok(FitBackend::Minuit),
            _ => Err(ReductionError::UnknownFitBackend(s.to_string())),
        }
    }
}

impl SineFit for FitBackend {
    fn fit(
        &self,
        x: &[f64],
        counts: &[f64],
        weights: &[f64],
    ) -> Result<SineFitResult, ReductionError> {
        match self {
            FitBackend::LevenbergMarquardt(config) => {
                let weights = sanitize_weights(weights);
                let params = initial_parameters(counts);
                let outcome = minimize(sine_model, x, counts, &weights, &params, config)?;
                Ok(SineFitResult::from_outcome(&outcome))
            }
            FitBackend::Minuit => Err(ReductionError::NotImplemented(
                "the Minuit fit backend".into(),
            )),
        }
    }
}

/// Replace NaN and ±∞ weights by zero.
pub fn sanitize_weights(weights: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .map(|&w| if w.is_finite() { w } else { 0.0 })
        .collect()
}

/// Poisson weights `1/√count`; empty bins get weight zero.
pub fn poisson_weights(counts: &[f64]) -> Vec<f64> {
    let inv_sqrt: Vec<f64> = counts.iter().map(|&c| 1.0 / c.sqrt()).collect();
    sanitize_weights(&inv_sqrt)
}

/// Data-derived starting point of the sine fit, ordered `[A, ω, φ, y₀]`.
///
/// * `A₀ = (max − min) / 2`
/// * `y₀,₀ = mean`
/// * `φ₀ = ((2 − k/8 + 1/2) mod 2)·π`, `k` being the (first) bin holding the maximum, which puts
///   the crest of the seeded sine on that bin.
pub fn initial_parameters(counts: &[f64]) -> [FitParameter; 4] {
    let (argmax, max) = counts
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, c)| if c > best.1 { (i, c) } else { best });
    let min = counts.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = counts.iter().sum::<f64>() / counts.len().max(1) as f64;
    let amplitude = if counts.is_empty() { 0.0 } else { (max - min) / 2.0 };
    let phase = ((2.0 - argmax as f64 / 8.0 + 0.5) % 2.0) * std::f64::consts::PI;

    [
        FitParameter::new("A", amplitude).min(0.0),
        FitParameter::new("omega", MIEZE_OMEGA).fixed(),
        FitParameter::new("phi", phase).min(0.0).max(DPI),
        FitParameter::new("y0", mean).min(0.0),
    ]
}

/// Time-bin abscissae `0, 1, …, n − 1`.
pub fn time_bins(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

#[cfg(test)]
mod sine_fit_test {
    use super::*;
    use crate::fitting::FittedParameter;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    const SERIES: [f64; 16] = [
        508.0, 484.0, 481.0, 435.0, 417.0, 284.0, 275.0, 168.0, 130.0, 99.0, 121.0, 116.0, 195.0,
        267.0, 373.0, 399.0,
    ];

    fn assert_recovers(result: &SineFitResult) {
        assert!(result.success);
        assert_relative_eq!(result.raw_fit_vals.a, 200.0, max_relative = 0.05);
        assert_relative_eq!(result.raw_fit_vals.omega, PI / 8.0);
        assert_relative_eq!(result.raw_fit_vals.phi, PI / 3.0, max_relative = 0.05);
        assert_relative_eq!(result.raw_fit_vals.y0, 300.0, max_relative = 0.05);
        assert_relative_eq!(result.contrast, result.raw_fit_vals.a / result.raw_fit_vals.y0);
        assert!(result.contrast_err.is_finite() && result.contrast_err > 0.0);
        assert_eq!(result.raw_fit_errs.omega, None);
    }

    #[test]
    fn test_recovery_sqrt_weights() {
        let weights: Vec<f64> = SERIES.iter().map(|c| c.sqrt()).collect();
        let result = FitBackend::default()
            .fit(&time_bins(16), &SERIES, &weights)
            .unwrap();
        assert_recovers(&result);
    }

    #[test]
    fn test_recovery_poisson_weights() {
        let result = FitBackend::default()
            .fit(&time_bins(16), &SERIES, &poisson_weights(&SERIES))
            .unwrap();
        assert_recovers(&result);
        // Poisson weights make χ²ᵣ of order one for counting noise
        assert!(result.redchi > 0.5 && result.redchi < 5.0);
    }

    #[test]
    fn test_empty_bin_is_ignored() {
        let mut counts = SERIES;
        counts[9] = 0.0;
        let weights = poisson_weights(&counts);
        assert_eq!(weights[9], 0.0);

        let result = FitBackend::default().fit(&time_bins(16), &counts, &weights).unwrap();
        assert_relative_eq!(result.raw_fit_vals.y0, 300.0, max_relative = 0.05);
    }

    #[test]
    fn test_seeding() {
        let params = initial_parameters(&SERIES);
        assert_eq!(params[0].value, (508.0 - 99.0) / 2.0);
        assert_eq!(params[1].value, MIEZE_OMEGA);
        assert!(!params[1].vary);
        // maximum in bin 0 → φ₀ = π/2
        assert_relative_eq!(params[2].value, PI / 2.0);
        assert_eq!(params[3].min, 0.0);
    }

    #[test]
    fn test_missing_stderr_gives_nan_contrast_error() {
        let fitted = |name: &str, value: f64, stderr: Option<f64>| FittedParameter {
            name: name.into(),
            value,
            stderr,
        };
        let outcome = FitOutcome {
            params: vec![
                fitted("A", 100.0, None),
                fitted("omega", MIEZE_OMEGA, None),
                fitted("phi", 1.0, Some(0.1)),
                fitted("y0", 200.0, Some(5.0)),
            ],
            chisqr: 12.0,
            redchi: 1.0,
            success: false,
            nfev: 40,
        };
        let result = SineFitResult::from_outcome(&outcome);
        assert_eq!(result.contrast, 0.5);
        assert!(result.contrast_err.is_nan());
        assert_eq!(result.phase_err, Some(0.1));
        assert!(!result.success);
    }

    #[test]
    fn test_backend_selection() {
        assert_eq!("lmfit".parse::<FitBackend>(), Ok(FitBackend::default()));
        assert_eq!("IMINUIT".parse::<FitBackend>(), Ok(FitBackend::Minuit));
        assert_eq!(
            "scipy".parse::<FitBackend>(),
            Err(ReductionError::UnknownFitBackend("scipy".into()))
        );
        assert!(matches!(
            FitBackend::Minuit.fit(&time_bins(16), &SERIES, &[1.0; 16]),
            Err(ReductionError::NotImplemented(_))
        ));
    }
}
