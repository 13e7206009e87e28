//! Sample pre-acceptance heuristic.
//!
//! Before a (projection, aspect) hypothesis enters the full criterion
//! battery, its projected graticule is compared against the drawn one:
//! a grossly rotated alignment, a poor point match, or dissimilar shapes of
//! the prime meridian / equator / pole parallels reject the sample cheaply.

use tracing::debug;

use super::turning::{polyline, turning_distance, RotationMode};
use crate::align::helmert::{match_ratio_circle, transform_points};
use crate::error::Result;
use crate::geo::{mean_nn_distance, PlanarPoint, MAX_LAT, MIN_LAT};
use crate::graticule::{MeridianLine, ParallelLine};

/// Half-width of the accepted rotation window around multiples of 90°.
pub const REM_DIV_ROT_ANGLE: f64 = 2.0;
/// Tolerance of the circular point match, as a fraction of the mean
/// nearest-neighbour spacing.
pub const MATCHING_FACTOR: f64 = 0.3;
/// Turning-function budget per polyline point, degrees. The effective
/// threshold scales with the polyline size and the caller's sensitivity.
pub const TURNING_FUNCTION_MAX_DIFFERENCE: f64 = 2.0;
/// Minimum fraction of points the circular match must place.
const MIN_MATCH_PERCENT: f64 = 75.0;

/// Why a sample was rejected, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum HeuristicReport {
    Accepted,
    RejectedRotation { rotation_deg: f64 },
    RejectedMatchRatio { percent: f64 },
    RejectedLineShape { line: String, distance: f64 },
}

impl HeuristicReport {
    pub fn accepted(&self) -> bool {
        matches!(self, HeuristicReport::Accepted)
    }
}

/// Compare one graticule line of the two sets; `None` when similar enough.
fn line_gate(
    label: &str,
    indices: &[usize],
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
    sensitivity: f64,
) -> Result<Option<HeuristicReport>> {
    let a = polyline(test, indices);
    let b = polyline(projected, indices);
    let d = turning_distance(&a, &b, RotationMode::Invariant)?;
    let budget = TURNING_FUNCTION_MAX_DIFFERENCE * indices.len() as f64 * sensitivity;
    if d > budget {
        return Ok(Some(HeuristicReport::RejectedLineShape {
            line: label.to_string(),
            distance: d,
        }));
    }
    Ok(None)
}

/// Run the shape heuristic for one sample.
///
/// `test` and `projected` are the parallel filtered point sets; the
/// meridian/parallel index lists must already be rewritten to them.
pub fn check_sample(
    meridians: &[MeridianLine],
    parallels: &[ParallelLine],
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
    sensitivity: f64,
) -> Result<HeuristicReport> {
    // Full-set similarity: the test set expressed in the projected frame.
    let (key, transformed) = transform_points(test, projected)?;

    // Rotation gate: accept only alignments close to a multiple of 90°.
    let rotation = key.rotation_deg();
    let folded = (rotation.abs() + 3.0 * REM_DIV_ROT_ANGLE).rem_euclid(90.0);
    if folded > 6.0 * REM_DIV_ROT_ANGLE {
        debug!(rotation, "heuristic: sample too rotated");
        return Ok(HeuristicReport::RejectedRotation {
            rotation_deg: rotation,
        });
    }

    // Circular match: at least 75% of points must land inside the tolerance.
    let tolerance = MATCHING_FACTOR * sensitivity * mean_nn_distance(projected);
    let (percent, _) = match_ratio_circle(projected, &transformed, tolerance);
    if percent < MIN_MATCH_PERCENT {
        debug!(percent, "heuristic: circular match too low");
        return Ok(HeuristicReport::RejectedMatchRatio { percent });
    }

    // Shape gates on the distinguished graticule lines.
    let mut prime_meridian_found = false;
    for m in meridians {
        if m.lon == 0.0 {
            prime_meridian_found = true;
            if let Some(r) = line_gate("prime meridian", &m.point_indices, test, projected, sensitivity)? {
                return Ok(r);
            }
        }
    }

    let mut equator_found = false;
    for p in parallels {
        if p.lat == 0.0 {
            equator_found = true;
            if let Some(r) = line_gate("equator", &p.point_indices, test, projected, sensitivity)? {
                return Ok(r);
            }
        }
        if p.lat == MAX_LAT {
            if let Some(r) = line_gate("north pole", &p.point_indices, test, projected, sensitivity)? {
                return Ok(r);
            }
        }
        if p.lat == MIN_LAT {
            if let Some(r) = line_gate("south pole", &p.point_indices, test, projected, sensitivity)? {
                return Ok(r);
            }
        }
    }

    // Fall back to the median lines of the dataset when the distinguished
    // ones are absent.
    if !prime_meridian_found && !meridians.is_empty() {
        let median = &meridians[meridians.len() / 2];
        if let Some(r) = line_gate("median meridian", &median.point_indices, test, projected, sensitivity)? {
            return Ok(r);
        }
    }
    if !equator_found && !parallels.is_empty() {
        let median = &parallels[parallels.len() / 2];
        if let Some(r) = line_gate("median parallel", &median.point_indices, test, projected, sensitivity)? {
            return Ok(r);
        }
    }

    Ok(HeuristicReport::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> (Vec<PlanarPoint>, Vec<MeridianLine>, Vec<ParallelLine>) {
        // 4x4 grid; rows are parallels, columns are meridians.
        let mut pts = Vec::new();
        for j in 0..4 {
            for i in 0..4 {
                pts.push(PlanarPoint::new(i as f64 * 10.0, j as f64 * 10.0));
            }
        }
        let meridians = (0..4)
            .map(|i| MeridianLine::new(i as f64 * 10.0, (0..4).map(|j| j * 4 + i).collect()))
            .collect();
        let parallels = (0..4)
            .map(|j| ParallelLine::new(j as f64 * 10.0, (0..4).map(|i| j * 4 + i).collect()))
            .collect();
        (pts, meridians, parallels)
    }

    #[test]
    fn test_identical_sets_accepted() {
        let (pts, meridians, parallels) = grid_points();
        let report = check_sample(&meridians, &parallels, &pts, &pts, 1.0).unwrap();
        assert!(report.accepted());
    }

    #[test]
    fn test_rotated_by_45_rejected() {
        let (pts, meridians, parallels) = grid_points();
        let (s, c) = (45.0_f64.to_radians().sin(), 45.0_f64.to_radians().cos());
        let rotated: Vec<PlanarPoint> = pts
            .iter()
            .map(|p| PlanarPoint::new(c * p.x - s * p.y, s * p.x + c * p.y))
            .collect();
        let report = check_sample(&meridians, &parallels, &rotated, &pts, 1.0).unwrap();
        assert!(matches!(report, HeuristicReport::RejectedRotation { .. }));
    }

    #[test]
    fn test_rotation_by_90_accepted() {
        // A quarter turn is indistinguishable from a differently-mounted
        // map sheet and must pass the rotation gate.
        let (pts, meridians, parallels) = grid_points();
        let rotated: Vec<PlanarPoint> = pts
            .iter()
            .map(|p| PlanarPoint::new(-p.y, p.x))
            .collect();
        let report = check_sample(&meridians, &parallels, &rotated, &pts, 1.0).unwrap();
        assert!(report.accepted());
    }

    #[test]
    fn test_scrambled_points_rejected() {
        let (pts, meridians, parallels) = grid_points();
        let mut scrambled = pts.clone();
        // Swap far-apart points to wreck the match ratio without rotating.
        for k in (0..scrambled.len()).step_by(2) {
            let j = scrambled.len() - 1 - k;
            scrambled.swap(k, j);
        }
        let report = check_sample(&meridians, &parallels, &scrambled, &pts, 1.0).unwrap();
        assert!(!report.accepted());
    }
}
