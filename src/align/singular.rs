//! Removal of points where the oblique-pole transform degenerates.
//!
//! A reference point is singular for a given cartographic pole when it
//! coincides with the pole itself or lies on the antimeridian of the pole,
//! where the transformed longitude flips sign discontinuously.

use crate::geo::{red_lon0, GeoPoint, PlanarPoint, MAX_LON};
use crate::graticule::IndexPairs;

/// Exact-degree comparisons survive one wrap round-trip at this tolerance.
const SINGULAR_EPS: f64 = 1.0e-9;

/// Whether a reference point is singular for the pole `(latp, lonp)`.
pub fn is_singular(p: &GeoPoint, latp: f64, lonp: f64) -> bool {
    if (p.lat - latp).abs() < SINGULAR_EPS && (p.lon - lonp).abs() < SINGULAR_EPS {
        return true;
    }
    (red_lon0(p.lon, lonp).abs() - MAX_LON).abs() < SINGULAR_EPS
}

/// Filter a paired test/reference set, dropping singular points.
///
/// Returns the surviving parallel lists plus the old→new index pairs needed
/// to rewrite meridian/parallel point-index sets.
pub fn remove_singular_points(
    test: &[PlanarPoint],
    reference: &[GeoPoint],
    latp: f64,
    lonp: f64,
) -> (Vec<PlanarPoint>, Vec<GeoPoint>, IndexPairs) {
    let mut test_out = Vec::with_capacity(test.len());
    let mut ref_out = Vec::with_capacity(reference.len());
    let mut pairs = IndexPairs::new();

    for (i, (t, r)) in test.iter().zip(reference.iter()).enumerate() {
        if !is_singular(r, latp, lonp) {
            pairs.push((i, test_out.len()));
            test_out.push(*t);
            ref_out.push(*r);
        }
    }
    (test_out, ref_out, pairs)
}
