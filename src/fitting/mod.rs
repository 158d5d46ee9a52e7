//! # Bounded least-squares fitting
//!
//! Numerical backend shared by the MIEZE sine fit and the beam-centre Gaussian fit.
//!
//! ## Overview
//! -----------------
//! A model is a plain function `f(x, params) -> y` over a named, ordered parameter list.
//! Each [`FitParameter`] carries its starting value, optional bounds and a `vary` flag; fixed
//! parameters are passed to the model unchanged and excluded from the Jacobian.
//!
//! [`levenberg_marquardt::minimize`] minimises the weighted residual
//! `χ² = Σ (wᵢ·(f(xᵢ) − yᵢ))²` and reports the result as a [`FitOutcome`]:
//! best-fit values, standard errors from the scaled covariance `(JᵀJ)⁻¹·χ²ᵣ`, the
//! goodness-of-fit figures and a convergence flag.
//!
//! The model functions live in [`models`].
pub mod levenberg_marquardt;
pub mod models;

use crate::nredux_errors::ReductionError;

/// One model parameter of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitParameter {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub vary: bool,
}

impl FitParameter {
    /// An unbounded, varying parameter.
    pub fn new(name: &str, value: f64) -> Self {
        FitParameter {
            name: name.to_string(),
            value,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            vary: true,
        }
    }

    pub fn min(mut self, v: f64) -> Self {
        self.min = v;
        self
    }

    pub fn max(mut self, v: f64) -> Self {
        self.max = v;
        self
    }

    /// Hold the parameter at its starting value.
    pub fn fixed(mut self) -> Self {
        self.vary = false;
        self
    }

    pub(crate) fn clamp(&self, v: f64) -> f64 {
        v.max(self.min).min(self.max)
    }

    pub(crate) fn validate(&self) -> Result<(), ReductionError> {
        if self.value.is_nan() {
            return Err(ReductionError::InvalidParameter(format!(
                "starting value of '{}' is NaN",
                self.name
            )));
        }
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(ReductionError::InvalidParameter(format!(
                "bounds of '{}' are not ordered: [{}, {}]",
                self.name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Best-fit value of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedParameter {
    pub name: String,
    pub value: f64,
    /// `None` for fixed parameters and when the covariance matrix is singular.
    pub stderr: Option<f64>,
}

/// Result of a least-squares minimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub params: Vec<FittedParameter>,
    pub chisqr: f64,
    /// `chisqr / max(1, ndata − nvary)`
    pub redchi: f64,
    pub success: bool,
    pub nfev: usize,
}

impl FitOutcome {
    pub fn get(&self, name: &str) -> Option<&FittedParameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|p| p.value)
    }

    pub fn stderr(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|p| p.stderr)
    }
}

#[cfg(test)]
mod fitting_test {
    use super::*;

    #[test]
    fn test_parameter_validation() {
        assert!(FitParameter::new("a", 1.0).min(0.0).max(2.0).validate().is_ok());
        assert!(FitParameter::new("a", 1.0).min(3.0).max(2.0).validate().is_err());
        assert!(FitParameter::new("a", f64::NAN).validate().is_err());

        let p = FitParameter::new("phi", 7.0).min(0.0).max(6.0);
        assert_eq!(p.clamp(p.value), 6.0);
        assert!(!FitParameter::new("omega", 0.4).fixed().vary);
    }
}
