//! # Reduction job results
//!
//! Combination of the per-channel [`SineFitResult`]s of one job into a single contrast.
//!
//! ## Overview
//! -----------------
//! The combination rule is a closed set, selected by [`ResultKind`]:
//!
//! | kind | key | contrast |
//! |---|---|---|
//! | [`ResultKind::AllAverage`] | `"allaverage"` | inverse-variance mean over every channel |
//! | [`ResultKind::SelectiveAverage`] | `"selectiveaverage"` | same, over the listed channels |
//! | [`ResultKind::SelectFoil`] | `"selectfoil"` | one channel, unchanged |
//!
//! The weighted mean is `C = Σ(cᵢ/eᵢ²) / Σ(1/eᵢ²)` with error `(Σ 1/eᵢ²)^(−1/2)`. NaN terms are
//! left out of each sum independently, so a channel whose fit produced no error estimate does
//! not poison the average.
use std::fmt;

use crate::constants::FoilIndex;
use crate::nredux_errors::ReductionError;
use crate::sine_fit::SineFitResult;

/// How the channel results of a job are combined.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultKind {
    #[default]
    AllAverage,
    /// Average over the listed channel positions.
    SelectiveAverage(Vec<FoilIndex>),
    /// Channel position whose result is passed through.
    SelectFoil(FoilIndex),
}

impl ResultKind {
    /// Resolve a result-kind key.
    ///
    /// Arguments
    /// -----------------
    /// * `key` – `"allaverage"`, `"selectiveaverage"` or `"selectfoil"`.
    /// * `foilsidx` – channel positions, required by `"selectiveaverage"`.
    /// * `idx` – channel position, required by `"selectfoil"`.
    ///
    /// Return
    /// ----------
    /// * `Err(ReductionError::UnknownResultKind)` naming an unknown key, or
    ///   `Err(ReductionError::MissingResultArgument)` when the kind's argument is absent.
    pub fn from_key(
        key: &str,
        foilsidx: Option<Vec<FoilIndex>>,
        idx: Option<FoilIndex>,
    ) -> Result<Self, ReductionError> {
        let missing = |argument: &str| ReductionError::MissingResultArgument {
            kind: key.to_string(),
            argument: argument.to_string(),
        };
        match key {
            "allaverage" => Ok(ResultKind::AllAverage),
            "selectiveaverage" => foilsidx
                .map(ResultKind::SelectiveAverage)
                .ok_or_else(|| missing("foilsidx")),
            "selectfoil" => idx.map(ResultKind::SelectFoil).ok_or_else(|| missing("idx")),
            _ => Err(ReductionError::UnknownResultKind(key.to_string())),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ResultKind::AllAverage => "allaverage",
            ResultKind::SelectiveAverage(_) => "selectiveaverage",
            ResultKind::SelectFoil(_) => "selectfoil",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::AllAverage => write!(f, "allaverage"),
            ResultKind::SelectiveAverage(idx) => write!(f, "selectiveaverage{idx:?}"),
            ResultKind::SelectFoil(idx) => write!(f, "selectfoil[{idx}]"),
        }
    }
}

/// Inverse-variance weighted mean of `(value, error)` pairs, NaN terms skipped.
///
/// Return
/// ----------
/// * `(mean, error)`; `(NaN, ∞)` when no pair carries weight.
pub fn weighted_average<I>(pairs: I) -> (f64, f64)
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let nan_to_zero = |v: f64| if v.is_nan() { 0.0 } else { v };
    let (num, den) = pairs.into_iter().fold((0.0, 0.0), |(num, den), (c, e)| {
        let w = e.powi(-2);
        (num + nan_to_zero(c * w), den + nan_to_zero(w))
    });
    (num / den, den.powf(-0.5))
}

/// Combined contrast of one reduction job, with the channel fits it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionJobResult {
    kind: ResultKind,
    contrast: f64,
    contrast_err: f64,
    fits: Vec<SineFitResult>,
}

impl ReductionJobResult {
    /// Combine channel fits according to `kind`.
    ///
    /// Return
    /// ----------
    /// * `Err(ReductionError::ChannelIndexOutOfRange)` when `kind` names a channel position not
    ///   present in `fits`.
    pub fn create(fits: Vec<SineFitResult>, kind: &ResultKind) -> Result<Self, ReductionError> {
        let check = |idx: FoilIndex| {
            if idx < fits.len() {
                Ok(idx)
            } else {
                Err(ReductionError::ChannelIndexOutOfRange {
                    index: idx,
                    len: fits.len(),
                })
            }
        };

        let (contrast, contrast_err) = match kind {
            ResultKind::AllAverage => {
                weighted_average(fits.iter().map(|r| (r.contrast, r.contrast_err)))
            }
            ResultKind::SelectiveAverage(indices) => {
                let selected = indices
                    .iter()
                    .map(|&i| check(i).map(|i| (fits[i].contrast, fits[i].contrast_err)))
                    .collect::<Result<Vec<_>, _>>()?;
                weighted_average(selected)
            }
            ResultKind::SelectFoil(idx) => {
                let fit = &fits[check(*idx)?];
                (fit.contrast, fit.contrast_err)
            }
        };

        Ok(ReductionJobResult {
            kind: kind.clone(),
            contrast,
            contrast_err,
            fits,
        })
    }

    pub fn kind(&self) -> &ResultKind {
        &self.kind
    }

    pub fn contrast(&self) -> f64 {
        self.contrast
    }

    pub fn contrast_err(&self) -> f64 {
        self.contrast_err
    }

    /// Channel fits, in the order of the reduced channels.
    pub fn fits(&self) -> &[SineFitResult] {
        &self.fits
    }

    /// `(contrast, contrast_err)` of every channel.
    pub fn channel_contrasts(&self) -> Vec<(f64, f64)> {
        self.fits
            .iter()
            .map(|r| (r.contrast, r.contrast_err))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod job_result_test {
    use super::*;
    use crate::constants::MIEZE_OMEGA;
    use crate::sine_fit::SineParams;
    use approx::assert_relative_eq;

    pub(crate) fn channel(contrast: f64, contrast_err: f64) -> SineFitResult {
        SineFitResult {
            contrast,
            contrast_err,
            phase: 1.0,
            phase_err: Some(0.01),
            chisqr: 16.0,
            redchi: 1.2,
            success: true,
            raw_fit_vals: SineParams {
                a: contrast * 300.0,
                omega: MIEZE_OMEGA,
                phi: 1.0,
                y0: 300.0,
            },
            raw_fit_errs: SineParams {
                a: Some(1.0),
                omega: None,
                phi: Some(0.01),
                y0: Some(1.0),
            },
            bootstrap: None,
        }
    }

    #[test]
    fn test_all_average() {
        let fits = vec![channel(0.5, 0.1), channel(0.7, 0.2)];
        let result = ReductionJobResult::create(fits, &ResultKind::AllAverage).unwrap();

        let (w1, w2) = (1.0 / 0.1f64.powi(2), 1.0 / 0.2f64.powi(2));
        assert_relative_eq!(result.contrast(), (0.5 * w1 + 0.7 * w2) / (w1 + w2), epsilon = 1e-12);
        assert_relative_eq!(result.contrast_err(), (w1 + w2).powf(-0.5), epsilon = 1e-12);
        assert_relative_eq!(result.contrast(), 0.54, epsilon = 1e-12);
        assert_eq!(result.fits().len(), 2);
    }

    #[test]
    fn test_selective_average_and_select_foil() {
        let fits = vec![channel(0.5, 0.1), channel(0.7, 0.2), channel(0.9, 0.3)];

        let kind = ResultKind::SelectiveAverage(vec![1]);
        let selective = ReductionJobResult::create(fits.clone(), &kind).unwrap();
        assert_relative_eq!(selective.contrast(), 0.7, epsilon = 1e-12);
        assert_relative_eq!(selective.contrast_err(), 0.2, epsilon = 1e-12);

        let foil = ReductionJobResult::create(fits.clone(), &ResultKind::SelectFoil(2)).unwrap();
        assert_eq!((foil.contrast(), foil.contrast_err()), (0.9, 0.3));

        assert_eq!(
            ReductionJobResult::create(fits, &ResultKind::SelectFoil(3)),
            Err(ReductionError::ChannelIndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_nan_channel_is_skipped() {
        let fits = vec![channel(0.5, 0.1), channel(0.7, f64::NAN)];
        let result = ReductionJobResult::create(fits, &ResultKind::AllAverage).unwrap();
        assert_relative_eq!(result.contrast(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(result.contrast_err(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_result_kind_keys() {
        assert_eq!(ResultKind::from_key("allaverage", None, None), Ok(ResultKind::AllAverage));
        assert_eq!(
            ResultKind::from_key("selectiveaverage", Some(vec![0, 2]), None),
            Ok(ResultKind::SelectiveAverage(vec![0, 2]))
        );
        assert_eq!(
            ResultKind::from_key("selectfoil", None, None),
            Err(ReductionError::MissingResultArgument {
                kind: "selectfoil".into(),
                argument: "idx".into()
            })
        );
        assert_eq!(
            ResultKind::from_key("median", None, None),
            Err(ReductionError::UnknownResultKind("median".into()))
        );
        assert_eq!(ResultKind::SelectFoil(4).key(), "selectfoil");
    }
}
