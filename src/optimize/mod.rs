//! Interchangeable minimizers over the residual functor.
//!
//! All four share the same contract: a cost callback over a bounded
//! 5-dimensional parameter vector, and an [`OptOutcome`] with the best
//! vector, its cost, and the iteration count. The callback may sanitize its
//! argument in place (the residual functor does); invalid evaluations cost
//! `f64::MAX`.
//!
//! Cancellation is cooperative: each minimizer checks the optional flag
//! once per iteration or generation and returns its best-so-far result.

pub mod de;
pub mod grid;
pub mod nls;
pub mod simplex;

use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::DVector;


/// Which minimizer drives the parameter search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizerKind {
    /// Exhaustive evaluation of the aspect sampler's grid.
    #[default]
    GridSearch,
    /// Nelder–Mead simplex descent.
    Simplex,
    /// Differential Evolution.
    DifferentialEvolution,
    /// Damped Gauss–Newton non-linear least squares.
    LeastSquares,
}

/// Result of one minimizer run.
#[derive(Debug, Clone)]
pub struct OptOutcome {
    pub x: DVector<f64>,
    pub cost: f64,
    pub iterations: u32,
}

pub(crate) fn cancelled(flag: Option<&AtomicBool>) -> bool {
    flag.is_some_and(|f| f.load(Ordering::Relaxed))
}
