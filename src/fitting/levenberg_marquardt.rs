//! # Levenberg–Marquardt with box constraints
//!
//! Damped Gauss–Newton minimisation of a weighted residual vector, with simple bounds on
//! every parameter.
//!
//! ## Overview
//! -----------------
//! Each iteration
//!
//! 1. evaluates the forward-difference Jacobian `J` of the weighted residuals,
//! 2. freezes the parameters sitting on a bound whose descent direction points outwards,
//! 3. solves `(JᵀJ + λ·diag(JᵀJ))·δ = −Jᵀr` for the remaining ones,
//! 4. projects `p + δ` back into the bounds and accepts it when `χ²` decreases.
//!
//! On acceptance `λ` shrinks by ten, on rejection it grows by ten. The run stops when the
//! relative decrease of `χ²` drops below `ftol`, when the step becomes smaller than
//! `xtol·(‖p‖ + xtol)`, or when `λ` saturates (no descent direction left). Exhausting the
//! function-evaluation budget stops the run with `success = false`.
//!
//! Standard errors are the square roots of the diagonal of `(JᵀJ)⁻¹·χ²ᵣ`, evaluated at the
//! best-fit point.
use std::cmp::Ordering::Greater;

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::{FitOutcome, FitParameter, FittedParameter};
use crate::nredux_errors::ReductionError;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
/// Relative forward-difference step, ≈ √ε of `f64`.
const DIFF_STEP: f64 = 1.49e-8;

/// Stopping criteria of [`minimize`].
#[derive(Debug, Clone, PartialEq)]
pub struct LmConfig {
    pub ftol: f64,
    pub xtol: f64,
    /// Budget of model evaluations, Jacobian columns included.
    pub max_nfev: usize,
}

impl Default for LmConfig {
    fn default() -> Self {
        LmConfig {
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            max_nfev: 2000,
        }
    }
}

impl LmConfig {
    pub fn builder() -> LmConfigBuilder {
        LmConfigBuilder::new()
    }
}

#[derive(Debug, Clone)]
pub struct LmConfigBuilder {
    config: LmConfig,
}

impl Default for LmConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LmConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LmConfig::default(),
        }
    }

    pub fn ftol(mut self, v: f64) -> Self {
        self.config.ftol = v;
        self
    }

    pub fn xtol(mut self, v: f64) -> Self {
        self.config.xtol = v;
        self
    }

    pub fn max_nfev(mut self, v: usize) -> Self {
        self.config.max_nfev = v;
        self
    }

    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    pub fn build(self) -> Result<LmConfig, ReductionError> {
        let c = &self.config;
        if !Self::gt0(c.ftol) || !Self::gt0(c.xtol) {
            return Err(ReductionError::InvalidParameter(
                "ftol and xtol must be > 0".into(),
            ));
        }
        if c.max_nfev == 0 {
            return Err(ReductionError::InvalidParameter(
                "max_nfev must be >= 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Weighted residuals of one model over one data set, with an evaluation counter.
struct Problem<'a, F> {
    model: F,
    x: &'a [f64],
    data: &'a [f64],
    weights: &'a [f64],
    params: &'a [FitParameter],
    free: Vec<usize>,
    nfev: usize,
}

impl<F> Problem<'_, F>
where
    F: Fn(f64, &[f64]) -> f64,
{
    fn residuals(&mut self, p: &[f64]) -> DVector<f64> {
        self.nfev += 1;
        DVector::from_iterator(
            self.x.len(),
            self.x
                .iter()
                .zip(self.data)
                .zip(self.weights)
                .map(|((&xi, &yi), &wi)| wi * ((self.model)(xi, p) - yi)),
        )
    }

    /// `N × nfree` forward-difference Jacobian around `p`, `r0` being the residuals at `p`.
    fn jacobian(&mut self, p: &[f64], r0: &DVector<f64>) -> DMatrix<f64> {
        let free = self.free.clone();
        let mut jac = DMatrix::zeros(self.x.len(), free.len());
        let mut probe = p.to_vec();
        for (col, &i) in free.iter().enumerate() {
            let mut h = DIFF_STEP * p[i].abs().max(1.0);
            if p[i] + h > self.params[i].max {
                h = -h;
            }
            probe[i] = p[i] + h;
            let r = self.residuals(&probe);
            jac.set_column(col, &((r - r0) / h));
            probe[i] = p[i];
        }
        jac
    }

    /// `p + step` projected on the bounds; `step` is indexed by free parameter.
    fn project(&self, p: &[f64], step: &DVector<f64>) -> Vec<f64> {
        let mut trial = p.to_vec();
        for (col, &i) in self.free.iter().enumerate() {
            trial[i] = self.params[i].clamp(p[i] + step[col]);
        }
        trial
    }

    /// Free parameters (by column) pinned on a bound the descent direction `−grad` leaves.
    fn frozen(&self, p: &[f64], grad: &DVector<f64>) -> Vec<bool> {
        self.free
            .iter()
            .enumerate()
            .map(|(col, &i)| {
                let q = &self.params[i];
                (p[i] <= q.min && grad[col] > 0.0) || (p[i] >= q.max && grad[col] < 0.0)
            })
            .collect()
    }

    fn free_norm(&self, p: &[f64]) -> f64 {
        self.free.iter().map(|&i| p[i] * p[i]).sum::<f64>().sqrt()
    }
}

/// Damped normal equations with the frozen rows and columns decoupled.
fn damped_system(
    jtj: &DMatrix<f64>,
    grad: &DVector<f64>,
    frozen: &[bool],
    lambda: f64,
) -> (DMatrix<f64>, DVector<f64>) {
    let m = grad.len();
    let mut lhs = jtj.clone();
    let mut rhs = -grad.clone();
    for k in 0..m {
        if frozen[k] {
            lhs.row_mut(k).fill(0.0);
            lhs.column_mut(k).fill(0.0);
            lhs[(k, k)] = 1.0;
            rhs[k] = 0.0;
        } else {
            let d = jtj[(k, k)];
            lhs[(k, k)] = d + lambda * if d > 0.0 { d } else { 1.0 };
        }
    }
    (lhs, rhs)
}

fn solve(lhs: DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    match lhs.clone().cholesky() {
        Some(chol) => Some(chol.solve(rhs)),
        None => lhs.lu().solve(rhs),
    }
}

/// Minimise `Σ (wᵢ·(model(xᵢ, p) − yᵢ))²` over the varying parameters.
///
/// Arguments
/// -----------------
/// * `model` – `f(x, p)`, `p` ordered like `params`.
/// * `x`, `data`, `weights` – abscissae, observations and residual weights, all the same length.
/// * `params` – starting values, bounds and `vary` flags. Starting values outside their bounds
///   are clamped.
/// * `config` – stopping criteria.
///
/// Return
/// ----------
/// * A [`FitOutcome`] with one [`FittedParameter`] per entry of `params`, in order.
/// * `Err(ReductionError::ShapeMismatch)` when the input lengths differ, or
///   `Err(ReductionError::InvalidParameter)` for empty data or malformed parameters.
///
/// See also
/// ------------
/// * [`LmConfig`] – tolerance defaults.
pub fn minimize<F>(
    model: F,
    x: &[f64],
    data: &[f64],
    weights: &[f64],
    params: &[FitParameter],
    config: &LmConfig,
) -> Result<FitOutcome, ReductionError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    if x.is_empty() {
        return Err(ReductionError::InvalidParameter(
            "cannot fit an empty data set".into(),
        ));
    }
    for len in [data.len(), weights.len()] {
        if len != x.len() {
            return Err(ReductionError::ShapeMismatch {
                expected: vec![x.len()],
                found: len,
            });
        }
    }
    for param in params {
        param.validate()?;
    }

    let mut problem = Problem {
        model,
        x,
        data,
        weights,
        params,
        free: (0..params.len()).filter(|&i| params[i].vary).collect(),
        nfev: 0,
    };
    let m = problem.free.len();

    let mut p: Vec<f64> = params.iter().map(|q| q.clamp(q.value)).collect();
    let mut r = problem.residuals(&p);
    let mut chisqr = r.norm_squared();
    let mut lambda = LAMBDA_INIT;
    let mut success = m == 0;

    'outer: while m > 0 && problem.nfev < config.max_nfev {
        if chisqr == 0.0 {
            success = true;
            break;
        }
        if !chisqr.is_finite() {
            debug!("non-finite chi-square, aborting the fit");
            break;
        }

        let jac = problem.jacobian(&p, &r);
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &r;
        let frozen = problem.frozen(&p, &grad);

        loop {
            if problem.nfev >= config.max_nfev {
                break 'outer;
            }
            let (lhs, rhs) = damped_system(&jtj, &grad, &frozen, lambda);
            if let Some(step) = solve(lhs, &rhs) {
                let trial = problem.project(&p, &step);
                let r_trial = problem.residuals(&trial);
                let chisqr_trial = r_trial.norm_squared();

                if chisqr_trial < chisqr {
                    let step_norm = problem
                        .free
                        .iter()
                        .map(|&i| (trial[i] - p[i]).powi(2))
                        .sum::<f64>()
                        .sqrt();
                    let converged = (chisqr - chisqr_trial) <= config.ftol * chisqr
                        || step_norm <= config.xtol * (problem.free_norm(&p) + config.xtol);

                    p = trial;
                    r = r_trial;
                    chisqr = chisqr_trial;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);

                    if converged {
                        success = true;
                        break 'outer;
                    }
                    continue 'outer;
                }
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                success = true;
                break 'outer;
            }
        }
    }

    if problem.nfev >= config.max_nfev && !success {
        debug!("fit stopped after {} evaluations", problem.nfev);
    }

    let ndata = x.len();
    let redchi = chisqr / ndata.saturating_sub(m).max(1) as f64;

    let mut stderr = vec![None; params.len()];
    if m > 0 && chisqr.is_finite() {
        let jac = problem.jacobian(&p, &r);
        if let Some(cov) = (jac.transpose() * &jac).try_inverse() {
            for (col, &i) in problem.free.iter().enumerate() {
                let var = cov[(col, col)] * redchi;
                if var.is_finite() && var >= 0.0 {
                    stderr[i] = Some(var.sqrt());
                }
            }
        }
    }

    Ok(FitOutcome {
        params: params
            .iter()
            .zip(p)
            .zip(stderr)
            .map(|((q, value), stderr)| FittedParameter {
                name: q.name.clone(),
                value,
                stderr,
            })
            .collect(),
        chisqr,
        redchi,
        success,
        nfev: problem.nfev,
    })
}
