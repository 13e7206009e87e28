//! Crate error type.
//!
//! Every fallible operation in the crate returns [`Result`]. Per-point
//! projection failures are contained by the callers (the offending point is
//! disabled through its weight); the variants here surface only when a whole
//! sample, family, or analysis cannot proceed.

use thiserror::Error;

/// Errors raised by the cartometric analysis core.
#[derive(Debug, Error)]
pub enum Error {
    /// Empty or mismatched input sets, or no candidate surviving an analysis
    /// that was required to produce one.
    #[error("bad data: {0}")]
    BadData(String),

    /// A projection equation is undefined at the queried point
    /// (log of non-positive value, division by zero, inverse trig out of range).
    #[error("math domain error: {0}")]
    MathDomain(String),

    /// A singular normal matrix or a degenerate geometry (J = 0 in the
    /// Helmert key: all source points coincide).
    #[error("singular geometry: {0}")]
    MathSingular(String),

    /// Vector or interval shapes do not agree.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// An interval with min > max.
    #[error("bad interval: [{min}, {max}]")]
    BadInterval { min: f64, max: f64 },

    /// An unrecognized projection family name.
    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
