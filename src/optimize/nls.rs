//! Damped Gauss–Newton non-linear least squares.
//!
//! Minimizes `VᵀWV` over the parameter vector using a numeric Jacobian
//! (central differences) and the damped normal equations
//!
//! ```text
//! (JᵀWJ + λI) ΔX = −JᵀWV
//! ```
//!
//! λ follows the usual trust-region schedule: ×10 on a worsening step
//! (which is rejected), ÷10 on an accepted one.

use std::sync::atomic::AtomicBool;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::{cancelled, OptOutcome};
use crate::error::{Error, Result};

/// Relative step of the central-difference Jacobian.
const JACOBIAN_STEP: f64 = 1.0e-6;
/// Initial damping.
const LAMBDA_INIT: f64 = 1.0e-3;
/// Damping bounds keep the normal matrix solvable without freezing the step.
const LAMBDA_MAX: f64 = 1.0e12;

#[derive(Debug, Clone)]
pub struct NlsConfig {
    /// Convergence tolerance on the step and the gradient.
    pub eps: f64,
    pub max_iterations: u32,
}

impl Default for NlsConfig {
    fn default() -> Self {
        Self {
            eps: 1.0e-10,
            max_iterations: 200,
        }
    }
}

/// Residual callback: fill `V` (and update `W`) for the given `X`.
pub type ResidualFn<'a> =
    dyn FnMut(&mut DVector<f64>, &mut DVector<f64>, &mut DVector<f64>) -> Result<()> + 'a;

fn weighted_cost(v: &DVector<f64>, w: &DVector<f64>) -> f64 {
    v.iter().zip(w.iter()).map(|(vi, wi)| wi * vi * vi).sum()
}

/// Minimize the weighted residual norm starting from `x0`.
///
/// `m2` is the residual length (2m); `w` is shared input-output state with
/// the residual callback across iterations.
pub fn minimize(
    residual: &mut ResidualFn<'_>,
    x0: &DVector<f64>,
    w: &mut DVector<f64>,
    m2: usize,
    config: &NlsConfig,
    cancel: Option<&AtomicBool>,
) -> Result<OptOutcome> {
    let dim = x0.len();
    if w.len() != m2 {
        return Err(Error::DimensionMismatch {
            expected: m2,
            got: w.len(),
        });
    }

    let mut x = x0.clone();
    let mut v = DVector::zeros(m2);
    residual(&mut x, &mut v, w)?;
    let mut cost = weighted_cost(&v, w);

    let mut lambda = LAMBDA_INIT;
    let mut iterations = 0u32;

    while iterations < config.max_iterations {
        iterations += 1;
        if cancelled(cancel) {
            break;
        }

        // Numeric Jacobian by central differences. The weight vector is
        // frozen during differentiation so both sides see the same points.
        let mut jac = DMatrix::<f64>::zeros(m2, dim);
        let w_frozen = w.clone();
        for j in 0..dim {
            let step = JACOBIAN_STEP * x[j].abs().max(1.0);
            let mut x_hi = x.clone();
            let mut x_lo = x.clone();
            x_hi[j] += step;
            x_lo[j] -= step;
            let mut v_hi = DVector::zeros(m2);
            let mut v_lo = DVector::zeros(m2);
            let mut w_hi = w_frozen.clone();
            let mut w_lo = w_frozen.clone();
            residual(&mut x_hi, &mut v_hi, &mut w_hi)?;
            residual(&mut x_lo, &mut v_lo, &mut w_lo)?;
            // The sanitizer may have moved the perturbed coordinate.
            let denom = x_hi[j] - x_lo[j];
            if denom.abs() < f64::EPSILON {
                continue;
            }
            for i in 0..m2 {
                jac[(i, j)] = (v_hi[i] - v_lo[i]) / denom;
            }
        }

        // Gradient JᵀWV and normal matrix JᵀWJ.
        let mut grad = DVector::zeros(dim);
        let mut normal = DMatrix::zeros(dim, dim);
        for i in 0..m2 {
            if w[i] == 0.0 {
                continue;
            }
            for a in 0..dim {
                grad[a] += jac[(i, a)] * w[i] * v[i];
                for b in 0..dim {
                    normal[(a, b)] += jac[(i, a)] * w[i] * jac[(i, b)];
                }
            }
        }

        // Gradient convergence.
        if grad.amax() < config.eps {
            debug!(iterations, cost, "NLS gradient vanished");
            break;
        }

        // Damped step; raise λ until the normal matrix solves and the step
        // improves the cost.
        let mut stepped = false;
        while lambda <= LAMBDA_MAX {
            let mut damped = normal.clone();
            for a in 0..dim {
                damped[(a, a)] += lambda;
            }
            let Some(delta) = damped.lu().solve(&(-&grad)) else {
                lambda *= 10.0;
                continue;
            };

            let mut x_trial = &x + &delta;
            let mut v_trial = DVector::zeros(m2);
            let mut w_trial = w.clone();
            match residual(&mut x_trial, &mut v_trial, &mut w_trial) {
                Ok(()) => {
                    let trial_cost = weighted_cost(&v_trial, &w_trial);
                    if trial_cost < cost {
                        // Accepted: relax the damping.
                        let step_norm = delta.amax();
                        x = x_trial;
                        v = v_trial;
                        *w = w_trial;
                        cost = trial_cost;
                        lambda = (lambda / 10.0).max(1.0e-12);
                        stepped = true;

                        if step_norm < config.eps * (1.0 + x.amax()) {
                            debug!(iterations, cost, "NLS step vanished");
                            return Ok(OptOutcome {
                                x,
                                cost,
                                iterations,
                            });
                        }
                        break;
                    }
                    lambda *= 10.0;
                }
                Err(_) => {
                    lambda *= 10.0;
                }
            }
        }

        if !stepped {
            debug!(iterations, cost, lambda, "NLS stalled at maximum damping");
            break;
        }
    }

    Ok(OptOutcome {
        x,
        cost,
        iterations,
    })
}
