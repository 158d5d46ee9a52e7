//! # Beam centre detection
//!
//! Both estimators work on the marginal profile of every axis, i.e. the detector counts summed
//! over all other axes, and therefore accept images of any dimension.
//!
//! * [`fast_beam_center`] – count-weighted centroid. A beam cut by the detector edge pulls the
//!   centroid inwards, as does a flat background.
//! * [`fit_beam_center`] – Gaussian peak plus constant background fitted to each profile.
use log::debug;
use ndarray::{ArrayView, Axis, RemoveAxis};

use crate::fitting::levenberg_marquardt::{minimize, LmConfig};
use crate::fitting::models::gaussian_model;
use crate::fitting::FitParameter;
use crate::nredux_errors::ReductionError;

/// Full width at half maximum of a Gaussian, in units of σ (rounded).
const FWHM_PER_SIGMA: f64 = 2.35;

fn marginals<A, D>(data: &ArrayView<'_, A, D>) -> Vec<Vec<f64>>
where
    A: Copy + Into<f64>,
    D: RemoveAxis,
{
    let counts = data.mapv(Into::<f64>::into);
    (0..counts.ndim())
        .map(|i| counts.axis_iter(Axis(i)).map(|sub| sub.sum()).collect())
        .collect()
}

/// Count-weighted centroid along every axis.
///
/// Return
/// ----------
/// * One coordinate per axis, in pixel index units. NaN for an image without counts.
pub fn fast_beam_center<A, D>(data: ArrayView<'_, A, D>) -> Vec<f64>
where
    A: Copy + Into<f64>,
    D: RemoveAxis,
{
    marginals(&data)
        .into_iter()
        .map(|profile| {
            let total: f64 = profile.iter().sum();
            profile
                .iter()
                .enumerate()
                .map(|(i, c)| i as f64 * c)
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Gaussian-fitted beam centre along every axis.
///
/// Each marginal profile is fitted with `amp/√(2πσ²)·exp(−½((x − x₀)/σ)²) + bckg`, seeded from
/// the profile itself: `x₀` at the maximum, `σ` from the number of bins above half maximum,
/// `amp` from the peak height and `bckg = 0`. All four parameters are non-negative and `x₀`
/// stays on the axis.
///
/// Return
/// ----------
/// * The fitted `x₀` of every axis. A profile whose fit does not converge still reports its
///   last `x₀`.
pub fn fit_beam_center<A, D>(data: ArrayView<'_, A, D>) -> Result<Vec<f64>, ReductionError>
where
    A: Copy + Into<f64>,
    D: RemoveAxis,
{
    let config = LmConfig::default();
    marginals(&data)
        .into_iter()
        .enumerate()
        .map(|(axis, profile)| {
            let x: Vec<f64> = (0..profile.len()).map(|i| i as f64).collect();
            let (argmax, peak) = profile
                .iter()
                .copied()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, c)| {
                    if c > best.1 {
                        (i, c)
                    } else {
                        best
                    }
                });
            let above_half = profile.iter().filter(|&&c| c > peak / 2.0).count();
            let sigma = above_half as f64 / FWHM_PER_SIGMA;

            let amp = peak * (2.0 * std::f64::consts::PI).sqrt() * sigma;
            let params = [
                FitParameter::new("amp", amp).min(0.0),
                FitParameter::new("x0", argmax as f64)
                    .min(0.0)
                    .max(profile.len() as f64),
                FitParameter::new("sig", sigma).min(0.0),
                FitParameter::new("bckg", 0.0).min(0.0),
            ];
            let weights = vec![1.0; profile.len()];
            let outcome = minimize(gaussian_model, &x, &profile, &weights, &params, &config)?;
            if !outcome.success {
                debug!("beam profile fit along axis {axis} did not converge");
            }
            Ok(outcome.value("x0").unwrap_or(argmax as f64))
        })
        .collect()
}
