//! Aspect sampler: candidate (latp, lonp, lat0) triples for the grid search
//! and the heuristic intervals shared by every optimizer.
//!
//! The sampler walks the aspect's admissible grid, optionally restricted to
//! the data-driven heuristic intervals, and scores every triple with a
//! complexity criterion built from the Tissot distortion at the extreme
//! corners of the transformed bounding box. Triples worse than twice the
//! mean are dropped.

use tracing::debug;

use crate::error::Result;
use crate::geo::{geographic_extent, GeoPoint, Interval, MAX_LAT, MAX_LON, MIN_LON};
use crate::projection::tissot::distortion_hk;
use crate::projection::transform::to_aspect_frame;
use crate::projection::{Aspect, Projection, ProjectionKind};

/// One candidate pole position with its complexity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolePosition {
    pub latp: f64,
    pub lonp: f64,
    pub lat0: f64,
    pub complexity: f64,
}

/// Data-driven latp/lonp intervals for a family.
///
/// The restriction only applies when the mapped area is small: when the
/// reference longitudes cover three or more quadrants the whole-family
/// intervals are kept. A wrapped lonp interval (min > max) crosses the
/// antimeridian and is handled by the consumers as two runs.
pub fn heuristic_intervals(
    reference: &[GeoPoint],
    kind: ProjectionKind,
) -> Result<(Interval, Interval)> {
    let (lat_extent, lon_extent) = geographic_extent(reference)?;

    // Quadrant coverage of the reference longitudes.
    let mut quadrants = [false; 4];
    for p in reference {
        let q = match p.lon {
            l if l > MIN_LON && l < -90.0 => 0,
            l if (-90.0..0.0).contains(&l) => 1,
            l if (0.0..90.0).contains(&l) => 2,
            _ => 3,
        };
        quadrants[q] = true;
    }
    let covered = quadrants.iter().filter(|&&q| q).count();
    if covered >= 3 {
        // Large area: the heuristic cannot shrink anything safely.
        return Ok((kind.latp_interval(), kind.lonp_interval()));
    }

    let latp = kind.latp_interval_for(lat_extent);
    let mut lonp = kind.lonp_interval_for(lon_extent);

    // If the data straddles the antimeridian, the heuristic band does too.
    if quadrants[0] && quadrants[3] {
        lonp = Interval::new(lonp.max, lonp.min);
    }
    debug!(?latp, ?lonp, family = %kind, "heuristic pole intervals");
    Ok((latp, lonp))
}

/// Complexity criterion of one pole position: distortion-derived score at
/// the two extreme corners of the transformed bounding box, weighted by
/// the corner latitude.
fn complexity_criterion(
    reference: &[GeoPoint],
    proj: &Projection,
) -> f64 {
    // Transformed bounding box of the reference set.
    let mut lat_min = MAX_LAT;
    let mut lat_max = -MAX_LAT;
    let mut lon_min = MAX_LON;
    let mut lon_max = -MAX_LON;
    for g in reference {
        let (lat_t, lon_t) = to_aspect_frame(
            g.lat,
            g.lon,
            proj.latp,
            proj.lonp,
            proj.kind.lon_direction(),
        );
        lat_min = lat_min.min(lat_t);
        lat_max = lat_max.max(lat_t);
        lon_min = lon_min.min(lon_t);
        lon_max = lon_max.max(lon_t);
    }

    let mut crit = 0.0;
    let mut weight_sum = 0.0;
    for (lat, lon) in [(lat_min, lon_min), (lat_max, lon_max)] {
        let (h, k) = match distortion_hk(lat, lon, proj) {
            Ok(hk) => hk,
            Err(_) => (1.0, 1.0),
        };
        let weight = lat.to_radians().cos();
        crit += (0.5 * ((h - 1.0).abs() + (k - 1.0).abs()) + h / k - 1.0) * weight;
        weight_sum += weight;
    }
    if weight_sum > 0.0 {
        crit / weight_sum
    } else {
        0.0
    }
}

/// Enumerate candidate pole positions for one family and aspect.
///
/// Normal aspect: the pole is pinned, only `lat0` varies. Transverse: the
/// pole walks the equator. Oblique: the full latp × lonp × lat0 grid. With
/// the heuristic enabled, positions outside the data-driven intervals are
/// skipped and positions scoring worse than twice the mean complexity are
/// dropped; the survivors come back sorted by `latp`.
#[allow(clippy::too_many_arguments)]
pub fn enumerate_pole_positions(
    reference: &[GeoPoint],
    kind: ProjectionKind,
    r: f64,
    aspect: Aspect,
    latp_step: f64,
    lonp_step: f64,
    lat0_step: f64,
    perform_heuristic: bool,
) -> Result<Vec<PolePosition>> {
    let lat0_iv = kind.lat0_interval();
    let (latp_heur, lonp_heur) = if perform_heuristic {
        heuristic_intervals(reference, kind)?
    } else {
        (kind.latp_interval(), kind.lonp_interval())
    };

    let (latp_iv, lonp_iv) = match aspect {
        Aspect::Normal => (Interval::new(MAX_LAT, MAX_LAT), Interval::new(0.0, 0.0)),
        Aspect::Transverse => (Interval::new(0.0, 0.0), kind.lonp_interval()),
        Aspect::Oblique => (kind.latp_interval(), kind.lonp_interval()),
    };

    let lonp_admitted = |lonp: f64| -> bool {
        if aspect == Aspect::Normal || !perform_heuristic {
            return true;
        }
        if lonp_heur.min <= lonp_heur.max {
            lonp_heur.contains(lonp)
        } else {
            // Wrapped interval across the antimeridian.
            lonp >= lonp_heur.min || lonp <= lonp_heur.max
        }
    };
    let latp_admitted = |latp: f64| -> bool {
        aspect != Aspect::Oblique || !perform_heuristic || latp_heur.contains(latp)
    };

    let mut positions = Vec::new();
    let mut crit_sum = 0.0;

    let mut latp = latp_iv.min;
    while latp <= latp_iv.max {
        let mut lonp = lonp_iv.min;
        while lonp <= lonp_iv.max {
            if latp_admitted(latp) && lonp_admitted(lonp) {
                let mut lat0 = lat0_iv.min;
                while lat0 <= lat0_iv.max {
                    let proj = Projection {
                        kind,
                        r,
                        latp,
                        lonp,
                        lat0,
                        lon0: 0.0,
                        c: kind.default_c(),
                        dx: 0.0,
                        dy: 0.0,
                    };
                    let complexity = if perform_heuristic {
                        complexity_criterion(reference, &proj)
                    } else {
                        0.0
                    };
                    crit_sum += complexity;
                    positions.push(PolePosition {
                        latp,
                        lonp,
                        lat0,
                        complexity,
                    });
                    if lat0_iv.span() == 0.0 {
                        break;
                    }
                    lat0 += lat0_step;
                }
            }
            if lonp_iv.span() == 0.0 {
                break;
            }
            lonp += lonp_step;
        }
        if latp_iv.span() == 0.0 {
            break;
        }
        latp += latp_step;
    }

    // Drop positions scoring worse than twice the mean complexity.
    if perform_heuristic && positions.len() > 10 {
        let cutoff = 2.0 * crit_sum / positions.len() as f64;
        positions.retain(|p| p.complexity <= cutoff);
        positions.sort_by(|a, b| a.latp.partial_cmp(&b.latp).unwrap());
    }

    debug!(
        family = %kind,
        %aspect,
        count = positions.len(),
        "enumerated pole positions"
    );
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_area() -> Vec<GeoPoint> {
        let mut pts = Vec::new();
        for lat in [40.0, 45.0, 50.0] {
            for lon in [10.0, 15.0, 20.0] {
                pts.push(GeoPoint::new(lat, lon));
            }
        }
        pts
    }

    #[test]
    fn test_normal_aspect_single_pole() {
        let positions = enumerate_pole_positions(
            &small_area(),
            ProjectionKind::Mercator,
            1.0,
            Aspect::Normal,
            10.0,
            10.0,
            10.0,
            false,
        )
        .unwrap();
        assert!(!positions.is_empty());
        assert!(positions.iter().all(|p| p.latp == 90.0 && p.lonp == 0.0));
        // lat0 walks its admissible interval.
        let lat0s: Vec<f64> = positions.iter().map(|p| p.lat0).collect();
        assert!(lat0s.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_transverse_pole_on_equator() {
        let positions = enumerate_pole_positions(
            &small_area(),
            ProjectionKind::Mercator,
            1.0,
            Aspect::Transverse,
            10.0,
            30.0,
            20.0,
            false,
        )
        .unwrap();
        assert!(positions.iter().all(|p| p.latp == 0.0));
        assert!(positions.iter().any(|p| p.lonp != 0.0));
    }

    #[test]
    fn test_heuristic_restricts_oblique_grid() {
        let all = enumerate_pole_positions(
            &small_area(),
            ProjectionKind::Stereographic,
            1.0,
            Aspect::Oblique,
            30.0,
            30.0,
            30.0,
            false,
        )
        .unwrap();
        let restricted = enumerate_pole_positions(
            &small_area(),
            ProjectionKind::Stereographic,
            1.0,
            Aspect::Oblique,
            30.0,
            30.0,
            30.0,
            true,
        )
        .unwrap();
        assert!(restricted.len() < all.len());
        // Survivors are sorted by latp when the heuristic trimmed the list.
        if restricted.len() > 1 {
            assert!(restricted.windows(2).all(|w| w[0].latp <= w[1].latp));
        }
    }

    #[test]
    fn test_heuristic_intervals_small_area() {
        let (latp, lonp) =
            heuristic_intervals(&small_area(), ProjectionKind::Stereographic).unwrap();
        // The azimuthal pole is expected near the area centre (lat 45).
        assert!(latp.contains(45.0));
        // Bands are rounded to 10 degrees.
        assert_eq!(latp.min % 10.0, 0.0);
        assert_eq!(lonp.min % 10.0, 0.0);
    }
}
