//! Nelder–Mead simplex descent.
//!
//! The initial simplex puts one vertex at the lower bound and scatters the
//! remaining `dim` vertices uniformly inside the box, from the caller's
//! seeded RNG. Standard coefficients: reflection 1, expansion 2,
//! contraction 0.5, shrink 0.5. The search stops when the cost span across
//! the simplex drops below `eps · max(1, best)` or the iteration cap hits.

use std::sync::atomic::AtomicBool;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use super::{cancelled, OptOutcome};
use crate::error::{Error, Result};

/// Reflection coefficient.
const ALPHA: f64 = 1.0;
/// Expansion coefficient.
const GAMMA: f64 = 2.0;
/// Contraction coefficient.
const RHO: f64 = 0.5;
/// Shrink coefficient.
const SIGMA: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct SimplexConfig {
    /// Convergence tolerance on the cost span.
    pub eps: f64,
    /// Iteration cap.
    pub max_iterations: u32,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            eps: 1.0e-10,
            max_iterations: 500,
        }
    }
}

impl SimplexConfig {
    /// The looser tolerance used for oblique-aspect searches, where the
    /// cost surface is rougher.
    pub fn oblique() -> Self {
        Self {
            eps: 1.0e-8,
            ..Self::default()
        }
    }
}

/// Minimize `cost` inside `[lo, hi]`.
///
/// Reflected and expanded vertices are not clamped back into the box; the
/// cost callback's own sanitization is the only guard.
/// TODO: decide whether to re-enable a hard containment check on new
/// vertices if oblique searches wander out of their intervals.
pub fn minimize(
    cost: &mut dyn FnMut(&mut DVector<f64>) -> f64,
    lo: &DVector<f64>,
    hi: &DVector<f64>,
    config: &SimplexConfig,
    rng: &mut StdRng,
    cancel: Option<&AtomicBool>,
) -> Result<OptOutcome> {
    let dim = lo.len();
    if hi.len() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            got: hi.len(),
        });
    }
    for j in 0..dim {
        if lo[j] > hi[j] {
            return Err(Error::BadInterval {
                min: lo[j],
                max: hi[j],
            });
        }
    }

    // Initial simplex: the lower corner plus dim randomized vertices.
    let mut vertices: Vec<DVector<f64>> = Vec::with_capacity(dim + 1);
    vertices.push(lo.clone());
    for _ in 0..dim {
        let mut v = lo.clone();
        for j in 0..dim {
            v[j] += rng.gen::<f64>() * (hi[j] - lo[j]);
        }
        vertices.push(v);
    }
    let mut costs: Vec<f64> = vertices.iter_mut().map(|v| cost(v)).collect();

    let mut iterations = 0u32;
    while iterations < config.max_iterations {
        iterations += 1;
        if cancelled(cancel) {
            break;
        }

        // Order the simplex: best first, worst last.
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| costs[a].partial_cmp(&costs[b]).unwrap());
        let best = order[0];
        let worst = order[dim];
        let second_worst = order[dim - 1];

        // Convergence on the cost span.
        let span = costs[worst] - costs[best];
        if span < config.eps * costs[best].abs().max(1.0) {
            debug!(iterations, best_cost = costs[best], "simplex converged");
            break;
        }

        // Centroid of all vertices but the worst.
        let mut centroid = DVector::zeros(dim);
        for &i in &order[..dim] {
            centroid += &vertices[i];
        }
        centroid /= dim as f64;

        // Reflection.
        let mut reflected = &centroid + (&centroid - &vertices[worst]) * ALPHA;
        let reflected_cost = cost(&mut reflected);

        if reflected_cost < costs[best] {
            // Expansion.
            let mut expanded = &centroid + (&reflected - &centroid) * GAMMA;
            let expanded_cost = cost(&mut expanded);
            if expanded_cost < reflected_cost {
                vertices[worst] = expanded;
                costs[worst] = expanded_cost;
            } else {
                vertices[worst] = reflected;
                costs[worst] = reflected_cost;
            }
        } else if reflected_cost < costs[second_worst] {
            vertices[worst] = reflected;
            costs[worst] = reflected_cost;
        } else {
            // Contraction: outside toward the reflected point when it beats
            // the worst vertex, inside otherwise.
            let (mut contracted, against) = if reflected_cost < costs[worst] {
                (&centroid + (&reflected - &centroid) * RHO, reflected_cost)
            } else {
                (&centroid + (&vertices[worst] - &centroid) * RHO, costs[worst])
            };
            let contracted_cost = cost(&mut contracted);
            if contracted_cost < against {
                vertices[worst] = contracted;
                costs[worst] = contracted_cost;
            } else {
                // Shrink everything toward the best vertex.
                let anchor = vertices[best].clone();
                for &i in order.iter().skip(1) {
                    let mut v = &anchor + (&vertices[i] - &anchor) * SIGMA;
                    costs[i] = cost(&mut v);
                    vertices[i] = v;
                }
            }
        }
    }

    let best = (0..=dim)
        .min_by(|&a, &b| costs[a].partial_cmp(&costs[b]).unwrap())
        .unwrap();
    Ok(OptOutcome {
        x: vertices[best].clone(),
        cost: costs[best],
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// A strictly convex quadratic in five variables converges from any
    /// random simplex of bounded span.
    #[test]
    fn test_quadratic_convergence() {
        let target = [0.3, -0.2, 0.7, 0.1, -0.5];
        let mut cost = |x: &mut DVector<f64>| -> f64 {
            x.iter()
                .zip(&target)
                .map(|(v, t)| (v - t) * (v - t))
                .sum()
        };
        let lo = DVector::from_element(5, -1.0);
        let hi = DVector::from_element(5, 1.0);
        let config = SimplexConfig {
            eps: 1.0e-12,
            max_iterations: 500,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let out = minimize(&mut cost, &lo, &hi, &config, &mut rng, None).unwrap();
        assert!(out.cost < 1.0e-8, "cost {} after {} iters", out.cost, out.iterations);
        assert!(out.iterations < 500);
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let mut cost = |x: &mut DVector<f64>| -> f64 { x.iter().map(|v| v * v).sum() };
        let lo = DVector::from_element(5, -2.0);
        let hi = DVector::from_element(5, 2.0);
        let config = SimplexConfig::default();
        let a = minimize(
            &mut cost,
            &lo,
            &hi,
            &config,
            &mut StdRng::seed_from_u64(42),
            None,
        )
        .unwrap();
        let b = minimize(
            &mut cost,
            &lo,
            &hi,
            &config,
            &mut StdRng::seed_from_u64(42),
            None,
        )
        .unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_bad_interval_rejected() {
        let mut cost = |_: &mut DVector<f64>| 0.0;
        let lo = DVector::from_vec(vec![1.0, 0.0]);
        let hi = DVector::from_vec(vec![0.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(minimize(
            &mut cost,
            &lo,
            &hi,
            &SimplexConfig::default(),
            &mut rng,
            None
        )
        .is_err());
    }
}
