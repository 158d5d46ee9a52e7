//! # Uncertainty propagation
//!
//! First-order propagation for products and quotients of independent, normally distributed
//! quantities: relative errors add in quadrature,
//!
//! ```text
//! z = Π vᵢ^(±1),   σz = |z| · √(Σ (σᵢ / vᵢ)²)
//! ```

/// One factor of a product/quotient chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factor {
    pub value: f64,
    pub error: f64,
    /// Divide by `value` instead of multiplying.
    pub invert: bool,
}

impl Factor {
    pub fn mul(value: f64, error: f64) -> Self {
        Factor {
            value,
            error,
            invert: false,
        }
    }

    pub fn div(value: f64, error: f64) -> Self {
        Factor {
            value,
            error,
            invert: true,
        }
    }
}

impl From<(f64, f64, bool)> for Factor {
    fn from((value, error, invert): (f64, f64, bool)) -> Self {
        Factor {
            value,
            error,
            invert,
        }
    }
}

/// Combine `factors` by multiplication/division and propagate their errors.
///
/// Arguments
/// -----------------
/// * `factors` – the chain, applied left to right. An empty chain is the neutral product `(1, 0)`.
///
/// Return
/// ----------
/// * `(value, error)`. A zero or NaN factor makes the error NaN, since its relative error is
///   undefined.
///
/// ```rust
/// use nredux::uncertainty::{propagate_mult_div, Factor};
///
/// let (v, e) = propagate_mult_div(&[Factor::mul(1.0, 0.1), Factor::div(2.0, 0.2)]);
/// assert_eq!(v, 0.5);
/// assert!((e - 0.070710678).abs() < 1e-9);
/// ```
pub fn propagate_mult_div(factors: &[Factor]) -> (f64, f64) {
    let (value, rel_sq) = factors.iter().fold((1.0, 0.0), |(acc, rel_sq), f| {
        let acc = if f.invert { acc / f.value } else { acc * f.value };
        (acc, rel_sq + (f.error / f.value).powi(2))
    });
    (value, value.abs() * f64::sqrt(rel_sq))
}
