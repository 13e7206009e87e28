//! projdetect: detection of the cartographic projection of early maps.
//!
//! Given control points read off a map drawing together with their known
//! geographic coordinates, the analyzer searches a catalog of spherical
//! projection families for the hypothesis that best reproduces the drawing:
//! the family, the sphere radius, the cartographic pole (aspect), the
//! central parallel and meridian. The search combines
//!
//! 1. a deterministic grid over the aspect space,
//! 2. a Nelder–Mead simplex descent,
//! 3. a Differential Evolution global search,
//! 4. a damped Gauss–Newton least-squares refinement,
//!
//! all driven by a residual that forward-projects the reference points,
//! filters singularities and outliers, and aligns the projected set to the
//! drawing with a weighted 2-D Helmert similarity. Candidate hypotheses are
//! scored by a battery of cartometric criteria and ranked.
//!
//! The expression parser for projection definition files, point/drawing
//! I/O, the Voronoi diagram construction, and the command-line driver live
//! outside this crate; the Voronoi shape subsystem is reached through the
//! narrow [`shape::CellShapeSource`] interface.

pub mod align;
pub mod analysis;
pub mod error;
pub mod geo;
pub mod graticule;
pub mod optimize;
pub mod projection;
pub mod residual;
pub mod sampler;
pub mod shape;

pub use analysis::{
    compute_one_sample, AnalysisParams, CartAnalysis, CriteriaSet, MatchMethod, Sample,
    SampleOutcome,
};
pub use error::{Error, Result};
pub use geo::{GeoPoint, Interval, PlanarPoint};
pub use graticule::{MeridianLine, ParallelLine};
pub use optimize::OptimizerKind;
pub use projection::{Aspect, Projection, ProjectionKind};
