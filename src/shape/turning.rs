//! Turning-function distance between polylines.
//!
//! The turning function describes a polyline by segment direction versus
//! normalized arc length: a step function over [0, 1]. Comparing the step
//! functions of two polylines is scale-invariant by construction and
//! optionally rotation-invariant by removing the length-weighted circular
//! mean of the direction differences.
//!
//! The step functions are merged over their combined breakpoints, so the
//! polylines may have different vertex counts (graticule lines share their
//! counts, merged Voronoi cells usually do not).

use crate::error::{Error, Result};
use crate::geo::PlanarPoint;

/// Whether the comparison should forgive a global rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationMode {
    /// Differences are taken against the raw segment directions.
    Dependent,
    /// The weighted mean direction difference is removed first.
    Invariant,
}

/// Step function of a polyline: direction (degrees) per segment and the
/// cumulative normalized arc length at each segment end.
struct TurningFn {
    dirs: Vec<f64>,
    ends: Vec<f64>,
}

fn turning_fn(poly: &[PlanarPoint]) -> Result<TurningFn> {
    if poly.len() < 2 {
        return Err(Error::BadData(
            "turning function needs at least two points".into(),
        ));
    }
    let mut dirs = Vec::with_capacity(poly.len() - 1);
    let mut lens = Vec::with_capacity(poly.len() - 1);
    let mut total = 0.0;
    let mut last_dir = 0.0;
    for w in poly.windows(2) {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        let len = dx.hypot(dy);
        if len > 0.0 {
            last_dir = dy.atan2(dx).to_degrees();
        }
        // Zero-length segments keep the previous direction and add no arc.
        dirs.push(last_dir);
        lens.push(len);
        total += len;
    }
    if total <= 0.0 {
        return Err(Error::MathSingular(
            "turning function of a degenerate polyline".into(),
        ));
    }
    let mut ends = Vec::with_capacity(lens.len());
    let mut acc = 0.0;
    for l in &lens {
        acc += l / total;
        ends.push(acc);
    }
    // Guard the float tail.
    *ends.last_mut().unwrap() = 1.0;
    Ok(TurningFn { dirs, ends })
}

/// Wrap an angle difference into (−180, 180].
fn wrap_diff(d: f64) -> f64 {
    let mut w = (d + 180.0).rem_euclid(360.0) - 180.0;
    if w == -180.0 {
        w = 180.0;
    }
    w
}

/// Piecewise difference of the two step functions over merged breakpoints:
/// (interval length, wrapped direction difference).
fn merged_diffs(a: &TurningFn, b: &TurningFn) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(a.ends.len() + b.ends.len());
    let (mut ia, mut ib) = (0usize, 0usize);
    let mut s = 0.0;
    while ia < a.ends.len() && ib < b.ends.len() {
        let next = a.ends[ia].min(b.ends[ib]);
        let dt = next - s;
        if dt > 0.0 {
            out.push((dt, wrap_diff(a.dirs[ia] - b.dirs[ib])));
        }
        if a.ends[ia] <= next + f64::EPSILON {
            ia += 1;
        }
        if b.ends[ib] <= next + f64::EPSILON {
            ib += 1;
        }
        s = next;
    }
    out
}

/// Turning-function distance between two polylines, in degrees.
///
/// The distance is the arc-length-weighted L1 difference of the two
/// direction step functions; scale-invariant always, rotation-invariant
/// when requested.
pub fn turning_distance(a: &[PlanarPoint], b: &[PlanarPoint], mode: RotationMode) -> Result<f64> {
    let fa = turning_fn(a)?;
    let fb = turning_fn(b)?;
    let diffs = merged_diffs(&fa, &fb);

    let offset = match mode {
        RotationMode::Dependent => 0.0,
        RotationMode::Invariant => {
            // Length-weighted circular mean of the differences.
            let (mut s, mut c) = (0.0, 0.0);
            for &(w, d) in &diffs {
                s += w * d.to_radians().sin();
                c += w * d.to_radians().cos();
            }
            s.atan2(c).to_degrees()
        }
    };

    Ok(diffs
        .iter()
        .map(|&(w, d)| w * wrap_diff(d - offset).abs())
        .sum())
}

/// Gather a polyline from an index list over a point arena.
pub fn polyline(points: &[PlanarPoint], indices: &[usize]) -> Vec<PlanarPoint> {
    indices.iter().map(|&i| points[i]).collect()
}
