//! Model functions for [`minimize`](super::levenberg_marquardt::minimize).
//!
//! The `*_model` adapters take the parameter slice in the order the fits declare it.

/// `A·sin(ω·x + φ) + y₀`
pub fn sine(x: f64, amplitude: f64, omega: f64, phase: f64, offset: f64) -> f64 {
    amplitude * (omega * x + phase).sin() + offset
}

/// `amp / √(2πσ²) · exp(−(x − x₀)² / 2σ²) + bckg`
///
/// `amp` is the area under the peak, not its height.
pub fn gaussian(x: f64, amp: f64, center: f64, sigma: f64, background: f64) -> f64 {
    let z = (x - center) / sigma;
    amp / (2.0 * std::f64::consts::PI * sigma * sigma).sqrt() * (-0.5 * z * z).exp() + background
}

/// [`sine`] over `[A, ω, φ, y₀]`.
pub(crate) fn sine_model(x: f64, p: &[f64]) -> f64 {
    sine(x, p[0], p[1], p[2], p[3])
}

/// [`gaussian`] over `[amp, x₀, σ, bckg]`.
pub(crate) fn gaussian_model(x: f64, p: &[f64]) -> f64 {
    gaussian(x, p[0], p[1], p[2], p[3])
}
