//! Differential Evolution global minimizer.
//!
//! Population-based search with pluggable mutation strategies and adaptive
//! control of the mutation factor F (and crossover rate CR). Individuals
//! stay inside the box through reflection; greedy `≤` replacement keeps the
//! population monotone; invalid evaluations survive at cost `f64::MAX` so
//! the population can still explore around them.

use std::sync::atomic::AtomicBool;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use super::{cancelled, OptOutcome};
use crate::error::{Error, Result};

/// Mutation strategies. The `dir` variants orient the difference vector
/// from the higher-cost toward the lower-cost individual; the `best`
/// variants center on the current best; SACP adapts F and CR from the
/// spread of three sorted candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationStrategy {
    Rand1,
    Rand2,
    RandDir1,
    RandDir2,
    #[default]
    Best1,
    Best2,
    RandBestDir1,
    TargetToBest1,
    Sacp,
}

/// Adaptive-control schemes for the mutation factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdaptiveControl {
    /// F stays at its configured value.
    #[default]
    Constant,
    /// F = 0.5 · (max_gen − g) / max_gen.
    Decreasing,
    /// F ∈ [0.5, 1.5) redrawn per individual.
    Random,
    /// Per-coordinate jitter around 0.5.
    Jitter,
    /// Mutation factor driven by the improvement of the population minimum.
    Mfde,
    /// Self-adaptive per-individual F and CR with switch probability τ = 0.1.
    Sam,
}

#[derive(Debug, Clone)]
pub struct DeConfig {
    /// Population size; 0 means 5 × dim.
    pub population: usize,
    pub max_generations: u32,
    /// Convergence tolerance on the population cost spread.
    pub eps: f64,
    /// Mutation factor (initial value under adaptive control).
    pub f: f64,
    /// Crossover rate.
    pub cr: f64,
    pub strategy: MutationStrategy,
    pub adaptive: AdaptiveControl,
    /// Generations without improvement of the minimum before stopping.
    pub stall_generations: u32,
}

impl Default for DeConfig {
    fn default() -> Self {
        Self {
            population: 0,
            max_generations: 1000,
            eps: 1.0e-9,
            f: 0.8,
            cr: 0.5,
            strategy: MutationStrategy::default(),
            adaptive: AdaptiveControl::default(),
            stall_generations: 100,
        }
    }
}

/// Switch probability of the SAM scheme.
const SAM_TAU: f64 = 0.1;

fn pick_distinct(rng: &mut StdRng, population: usize, exclude: &[usize]) -> usize {
    loop {
        let i = rng.gen_range(0..population);
        if !exclude.contains(&i) {
            return i;
        }
    }
}

fn best_index(costs: &[f64]) -> usize {
    costs
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap()
}

/// `a + f ∘ b` where `f` is scalar or per-coordinate.
fn scaled(a: &DVector<f64>, f: &[f64], b: DVector<f64>) -> DVector<f64> {
    let mut out = a.clone();
    for j in 0..out.len() {
        out[j] += f[j.min(f.len() - 1)] * b[j];
    }
    out
}

/// Minimize `cost` inside `[lo, hi]`.
pub fn minimize(
    cost: &mut dyn FnMut(&mut DVector<f64>) -> f64,
    lo: &DVector<f64>,
    hi: &DVector<f64>,
    config: &DeConfig,
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
    let population = if config.population == 0 {
        5 * dim
    } else {
        config.population
    };
    if population < dim + 1 {
        return Err(Error::BadData(format!(
            "population {population} too small for dimension {dim}"
        )));
    }

    // Initial population: uniform in the box.
    let mut p_a: Vec<DVector<f64>> = (0..population)
        .map(|_| {
            let mut v = DVector::zeros(dim);
            for j in 0..dim {
                v[j] = lo[j] + (hi[j] - lo[j]) * rng.gen::<f64>();
            }
            v
        })
        .collect();
    let mut p_v: Vec<f64> = p_a.iter_mut().map(|x| cost(x)).collect();

    let mut q_a = p_a.clone();
    let mut q_v = p_v.clone();

    let mut min_res = p_v.iter().cloned().fold(f64::MAX, f64::min);
    let mut min_res_old = min_res;
    let mut min_res_old_100 = min_res;

    // Per-individual factors for the SAM scheme.
    let mut fm = vec![config.f; population];
    let mut crm = vec![config.cr; population];

    let mut f_vec = vec![config.f; dim];
    let mut cr = config.cr;

    let mut generation = 0u32;
    while generation < config.max_generations {
        if cancelled(cancel) {
            break;
        }

        if config.adaptive == AdaptiveControl::Decreasing {
            let f = 0.5 * (config.max_generations - generation) as f64
                / config.max_generations as f64;
            f_vec.fill(f);
        }

        let mut dg = 1.2;
        let aver_res = p_v.iter().filter(|v| v.is_finite()).sum::<f64>()
            / p_v.iter().filter(|v| v.is_finite()).count().max(1) as f64;

        for i in 0..population {
            // Adaptive control of F (and CR).
            match config.adaptive {
                AdaptiveControl::Random => {
                    f_vec.fill(0.5 * (1.0 + rng.gen::<f64>()));
                }
                AdaptiveControl::Jitter => {
                    for f in f_vec.iter_mut() {
                        *f = 0.5 * (1.0 + 0.001 * (rng.gen::<f64>() - 0.5));
                    }
                }
                AdaptiveControl::Mfde if generation > 0 => {
                    let r = rng.gen::<f64>();
                    let f = if min_res < min_res_old {
                        1.5 * (r * r * dg).sqrt()
                    } else {
                        (r * r * dg).sqrt() - 0.2
                    };
                    f_vec.fill(f);
                    dg -= 1.0 / population as f64;
                }
                AdaptiveControl::Sam => {
                    if rng.gen::<f64>() < SAM_TAU {
                        fm[i] = 0.1 + 0.9 * rng.gen::<f64>();
                    }
                    f_vec.fill(fm[i]);
                    if rng.gen::<f64>() < SAM_TAU {
                        crm[i] = rng.gen::<f64>();
                    }
                    cr = crm[i];
                }
                _ => {}
            }

            // Mutation.
            let u = mutate(
                &p_a,
                &p_v,
                i,
                population,
                &mut f_vec,
                &mut cr,
                aver_res,
                config.strategy,
                rng,
            );

            // Binomial crossover with at least one forced swap.
            let mut trial = p_a[i].clone();
            let mut swaps = 0usize;
            for j in 0..dim {
                if rng.gen::<f64>() < cr {
                    trial[j] = u[j];
                    swaps += 1;
                }
            }
            if swaps == 0 {
                let j = rng.gen_range(0..dim);
                trial[j] = u[j];
            }

            // Reflect into the box; a degenerate interval pins the value.
            for j in 0..dim {
                while trial[j] < lo[j] || trial[j] > hi[j] {
                    if lo[j] == hi[j] {
                        trial[j] = lo[j];
                    } else if trial[j] > hi[j] {
                        trial[j] = 2.0 * hi[j] - trial[j];
                    } else {
                        trial[j] = 2.0 * lo[j] - trial[j];
                    }
                }
            }

            // Greedy replacement.
            let trial_cost = cost(&mut trial);
            if trial_cost <= p_v[i] {
                q_a[i] = trial;
                q_v[i] = trial_cost;
            }
        }

        // The population is replaced wholesale so that mutations within one
        // generation never see half-updated individuals.
        p_a.clone_from(&q_a);
        p_v.clone_from(&q_v);

        min_res_old = min_res;
        let max_res = p_v.iter().cloned().fold(f64::MIN, f64::max);
        min_res = p_v.iter().cloned().fold(f64::MAX, f64::min);
        let diff = max_res - min_res;

        generation += 1;

        // Termination: population diversity collapsed, or no improvement
        // across the stall window.
        // TODO: an extra absolute guard (min_res < 1e2) on both branches
        // stays disabled; enable it if large-residual datasets terminate
        // too early.
        let stall_window = config.stall_generations.max(1);
        let tol = config.eps * min_res.abs().max(1.0);
        let stalled =
            generation % stall_window == 0 && (min_res - min_res_old_100).abs() < tol;
        if diff < tol || stalled {
            debug!(generation, min_res, max_res, diff, "DE converged");
            break;
        }
        if generation % stall_window == 0 {
            min_res_old_100 = min_res;
        }
        if generation % 50 == 0 {
            debug!(generation, min_res, max_res, "DE progress");
        }
    }

    let best = best_index(&p_v);
    Ok(OptOutcome {
        x: p_a[best].clone(),
        cost: p_v[best],
        iterations: generation,
    })
}

/// Build the mutated vector `U` for individual `i`.
#[allow(clippy::too_many_arguments)]
fn mutate(
    p_a: &[DVector<f64>],
    p_v: &[f64],
    i: usize,
    population: usize,
    f_vec: &mut [f64],
    cr: &mut f64,
    aver_res: f64,
    strategy: MutationStrategy,
    rng: &mut StdRng,
) -> DVector<f64> {
    match strategy {
        MutationStrategy::Rand1 => {
            let i1 = pick_distinct(rng, population, &[i]);
            let i2 = pick_distinct(rng, population, &[i, i1]);
            let i3 = pick_distinct(rng, population, &[i, i1, i2]);
            scaled(&p_a[i1], f_vec, &p_a[i2] - &p_a[i3])
        }
        MutationStrategy::Rand2 => {
            let i1 = pick_distinct(rng, population, &[i]);
            let i2 = pick_distinct(rng, population, &[i, i1]);
            let i3 = pick_distinct(rng, population, &[i, i1, i2]);
            let i4 = pick_distinct(rng, population, &[i, i1, i2, i3]);
            let i5 = pick_distinct(rng, population, &[i, i1, i2, i3, i4]);
            scaled(&p_a[i1], f_vec, &p_a[i2] + &p_a[i4] - &p_a[i3] - &p_a[i5])
        }
        MutationStrategy::RandDir1 => {
            let i1 = pick_distinct(rng, population, &[i]);
            let i2 = pick_distinct(rng, population, &[i, i1]);
            // Orient the difference downhill.
            let (a, b) = if p_v[i1] <= p_v[i2] { (i1, i2) } else { (i2, i1) };
            scaled(&p_a[a], f_vec, &p_a[a] - &p_a[b])
        }
        MutationStrategy::RandDir2 => {
            let i1 = pick_distinct(rng, population, &[i]);
            let i2 = pick_distinct(rng, population, &[i, i1]);
            let i3 = pick_distinct(rng, population, &[i, i1, i2]);
            let i4 = pick_distinct(rng, population, &[i, i1, i2, i3]);
            let (a1, a2) = if p_v[i1] <= p_v[i2] { (i1, i2) } else { (i2, i1) };
            let (b1, b2) = if p_v[i3] <= p_v[i4] { (i3, i4) } else { (i4, i3) };
            scaled(&p_a[a1], f_vec, &p_a[a1] - &p_a[a2] + &p_a[b1] - &p_a[b2])
        }
        MutationStrategy::Best1 => {
            let best = best_index(p_v);
            let i1 = pick_distinct(rng, population, &[i, best]);
            let i2 = pick_distinct(rng, population, &[i, best, i1]);
            scaled(&p_a[best], f_vec, &p_a[i1] - &p_a[i2])
        }
        MutationStrategy::Best2 => {
            let best = best_index(p_v);
            let i1 = pick_distinct(rng, population, &[i, best]);
            let i2 = pick_distinct(rng, population, &[i, best, i1]);
            let i3 = pick_distinct(rng, population, &[i, best, i1, i2]);
            let i4 = pick_distinct(rng, population, &[i, best, i1, i2, i3]);
            scaled(&p_a[best], f_vec, &p_a[i1] - &p_a[i2] + &p_a[i3] - &p_a[i4])
        }
        MutationStrategy::RandBestDir1 => {
            let best = best_index(p_v);
            let i1 = pick_distinct(rng, population, &[i, best]);
            let i2 = pick_distinct(rng, population, &[i, best, i1]);
            scaled(
                &p_a[best],
                f_vec,
                &p_a[best] + &p_a[i1] - &p_a[i] - &p_a[i2],
            )
        }
        MutationStrategy::TargetToBest1 => {
            let best = best_index(p_v);
            let i1 = pick_distinct(rng, population, &[i, best]);
            let i2 = pick_distinct(rng, population, &[i, best, i1]);
            let toward_best = scaled(&p_a[i], f_vec, &p_a[best] - &p_a[i]);
            scaled(&toward_best, f_vec, &p_a[i1] - &p_a[i2])
        }
        MutationStrategy::Sacp => {
            // Sort three candidates by cost; adapt F from their spread and
            // CR from the individual's distance to the population average.
            let i1 = pick_distinct(rng, population, &[i]);
            let i2 = pick_distinct(rng, population, &[i, i1]);
            let i3 = pick_distinct(rng, population, &[i, i1, i2]);
            let mut cand = [i1, i2, i3];
            cand.sort_by(|&a, &b| p_v[a].partial_cmp(&p_v[b]).unwrap());
            let [c0, c1, c2] = cand;

            let spread = p_v[c2] - p_v[c0];
            let f = if spread > 0.0 && spread.is_finite() {
                0.1 + 0.8 * (p_v[c1] - p_v[c0]) / spread
            } else {
                0.5
            };
            f_vec.fill(f);

            *cr = if p_v[i] >= aver_res && spread > 0.0 && spread.is_finite() {
                0.1 + 0.5 * (p_v[i] - p_v[c0]) / spread
            } else {
                0.1
            };

            scaled(&p_a[c0], f_vec, &p_a[c1] - &p_a[c2])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sphere_cost(target: [f64; 5]) -> impl FnMut(&mut DVector<f64>) -> f64 {
        move |x: &mut DVector<f64>| {
            x.iter()
                .zip(&target)
                .map(|(v, t)| (v - t) * (v - t))
                .sum()
        }
    }

    fn bounds() -> (DVector<f64>, DVector<f64>) {
        (DVector::from_element(5, -2.0), DVector::from_element(5, 2.0))
    }

    #[test]
    fn test_sphere_minimum_found() {
        let target = [0.5, -1.0, 0.0, 1.5, -0.3];
        let (lo, hi) = bounds();
        let mut rng = StdRng::seed_from_u64(11);
        let out = minimize(
            &mut sphere_cost(target),
            &lo,
            &hi,
            &DeConfig::default(),
            &mut rng,
            None,
        )
        .unwrap();
        assert!(out.cost < 1.0e-6, "cost {}", out.cost);
        for (v, t) in out.x.iter().zip(&target) {
            assert!((v - t).abs() < 1.0e-3, "{v} vs {t}");
        }
    }

    #[test]
    fn test_every_strategy_respects_bounds() {
        let strategies = [
            MutationStrategy::Rand1,
            MutationStrategy::Rand2,
            MutationStrategy::RandDir1,
            MutationStrategy::RandDir2,
            MutationStrategy::Best1,
            MutationStrategy::Best2,
            MutationStrategy::RandBestDir1,
            MutationStrategy::TargetToBest1,
            MutationStrategy::Sacp,
        ];
        let (lo, hi) = bounds();
        for strategy in strategies {
            let config = DeConfig {
                strategy,
                max_generations: 40,
                ..DeConfig::default()
            };
            let mut rng = StdRng::seed_from_u64(3);
            let mut cost = |x: &mut DVector<f64>| -> f64 {
                // Every evaluated vector must already be inside the box.
                for j in 0..x.len() {
                    assert!(
                        x[j] >= lo[j] - 1e-12 && x[j] <= hi[j] + 1e-12,
                        "{strategy:?} left the box: {}",
                        x[j]
                    );
                }
                x.iter().map(|v| v * v).sum()
            };
            minimize(&mut cost, &lo, &hi, &config, &mut rng, None).unwrap();
        }
    }

    #[test]
    fn test_degenerate_interval_pins_coordinate() {
        let lo = DVector::from_vec(vec![-2.0, 1.5, -2.0, -2.0, -2.0]);
        let hi = DVector::from_vec(vec![2.0, 1.5, 2.0, 2.0, 2.0]);
        let mut rng = StdRng::seed_from_u64(5);
        let config = DeConfig {
            max_generations: 30,
            ..DeConfig::default()
        };
        let out = minimize(
            &mut sphere_cost([0.0; 5]),
            &lo,
            &hi,
            &config,
            &mut rng,
            None,
        )
        .unwrap();
        assert_eq!(out.x[1], 1.5);
    }

    #[test]
    fn test_adaptive_schemes_run() {
        let schemes = [
            AdaptiveControl::Constant,
            AdaptiveControl::Decreasing,
            AdaptiveControl::Random,
            AdaptiveControl::Jitter,
            AdaptiveControl::Mfde,
            AdaptiveControl::Sam,
        ];
        let (lo, hi) = bounds();
        for adaptive in schemes {
            let config = DeConfig {
                adaptive,
                max_generations: 150,
                ..DeConfig::default()
            };
            let mut rng = StdRng::seed_from_u64(23);
            let out = minimize(
                &mut sphere_cost([0.1, 0.2, -0.1, 0.0, 0.4]),
                &lo,
                &hi,
                &config,
                &mut rng,
                None,
            )
            .unwrap();
            assert!(out.cost < 1.0e-2, "{adaptive:?}: cost {}", out.cost);
        }
    }

    #[test]
    fn test_invalid_evaluations_survive() {
        // A cost that is invalid on half the box still converges to the
        // valid minimum.
        let (lo, hi) = bounds();
        let mut cost = |x: &mut DVector<f64>| -> f64 {
            if x[0] < 0.0 {
                f64::MAX
            } else {
                x.iter().map(|v| (v - 0.5) * (v - 0.5)).sum()
            }
        };
        let mut rng = StdRng::seed_from_u64(9);
        let out = minimize(&mut cost, &lo, &hi, &DeConfig::default(), &mut rng, None).unwrap();
        assert!(out.cost < 1.0e-5, "cost {}", out.cost);
    }
}
