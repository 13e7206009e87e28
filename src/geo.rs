//! Geographic and planar point types plus the angular helpers shared by the
//! whole crate.
//!
//! # Conventions
//!
//! - Latitudes and longitudes are **degrees** at every public boundary;
//!   radians appear only inside projection formulas.
//! - Latitude ∈ [−90, 90], longitude ∈ (−180, 180].
//! - Planar coordinates are in the map's paper units (whatever the digitized
//!   drawing used); the similarity alignment absorbs the unknown scale.

use crate::error::{Error, Result};

/// Latitude of the geographic north pole, degrees.
pub const MAX_LAT: f64 = 90.0;
/// Latitude of the geographic south pole, degrees.
pub const MIN_LAT: f64 = -90.0;
/// Eastern edge of the longitude range, degrees.
pub const MAX_LON: f64 = 180.0;
/// Western edge of the longitude range, degrees.
pub const MIN_LON: f64 = -180.0;

/// Angular nudge applied when a projection formula is undefined at an
/// interior point; the point is re-evaluated once after shifting both
/// transformed coordinates by this amount (degrees).
pub const GRATICULE_ANGLE_SHIFT: f64 = 1.0e-4;

/// A point on the sphere, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A point in the map plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another planar point.
    pub fn dist(&self, other: &PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A closed interval of angles or radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Validate min ≤ max.
    pub fn checked(min: f64, max: f64) -> Result<Self> {
        if min > max {
            return Err(Error::BadInterval { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn mid(&self) -> f64 {
        0.5 * (self.min + self.max)
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Wrap a longitude into (−180, 180].
pub fn wrap_lon(lon: f64) -> f64 {
    let mut l = (lon + MAX_LON).rem_euclid(360.0) - MAX_LON;
    if l == MIN_LON {
        l = MAX_LON;
    }
    l
}

/// Reduce a longitude to a new central meridian `lon0`.
pub fn red_lon0(lon: f64, lon0: f64) -> f64 {
    wrap_lon(lon - lon0)
}

/// Reduce every reference longitude to the central meridian `lon0`,
/// returning a new set. A no-op clone when `lon0 == 0`.
pub fn reduce_to_central_meridian(reference: &[GeoPoint], lon0: f64) -> Vec<GeoPoint> {
    reference
        .iter()
        .map(|p| GeoPoint::new(p.lat, red_lon0(p.lon, lon0)))
        .collect()
}

/// Latitude and longitude extent of a reference point set.
pub fn geographic_extent(reference: &[GeoPoint]) -> Result<(Interval, Interval)> {
    if reference.is_empty() {
        return Err(Error::BadData("empty reference point set".into()));
    }
    let mut lat = Interval::new(f64::MAX, f64::MIN);
    let mut lon = Interval::new(f64::MAX, f64::MIN);
    for p in reference {
        lat.min = lat.min.min(p.lat);
        lat.max = lat.max.max(p.lat);
        lon.min = lon.min.min(p.lon);
        lon.max = lon.max.max(p.lon);
    }
    Ok((lat, lon))
}

/// Mean nearest-neighbour spacing of a planar point set.
///
/// Sets the natural length scale for the circular match tolerance. O(n²),
/// which is fine at control-point counts (tens of points).
pub fn mean_nn_distance(points: &[PlanarPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, p) in points.iter().enumerate() {
        let mut best = f64::MAX;
        for (j, q) in points.iter().enumerate() {
            if i != j {
                best = best.min(p.dist(q));
            }
        }
        sum += best;
    }
    sum / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wrap_lon() {
        assert_abs_diff_eq!(wrap_lon(190.0), -170.0);
        assert_abs_diff_eq!(wrap_lon(-190.0), 170.0);
        assert_abs_diff_eq!(wrap_lon(540.0), 180.0);
        assert_abs_diff_eq!(wrap_lon(-180.0), 180.0);
        assert_abs_diff_eq!(wrap_lon(45.0), 45.0);
    }

    #[test]
    fn test_red_lon0() {
        assert_abs_diff_eq!(red_lon0(100.0, 90.0), 10.0);
        assert_abs_diff_eq!(red_lon0(-170.0, 30.0), 160.0);
    }

    #[test]
    fn test_extent() {
        let pts = [
            GeoPoint::new(10.0, -5.0),
            GeoPoint::new(20.0, 15.0),
            GeoPoint::new(-3.0, 7.0),
        ];
        let (lat, lon) = geographic_extent(&pts).unwrap();
        assert_abs_diff_eq!(lat.min, -3.0);
        assert_abs_diff_eq!(lat.max, 20.0);
        assert_abs_diff_eq!(lon.min, -5.0);
        assert_abs_diff_eq!(lon.max, 15.0);
    }

    #[test]
    fn test_mean_nn_distance_grid() {
        // Unit grid: every point's nearest neighbour is at distance 1.
        let mut pts = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                pts.push(PlanarPoint::new(i as f64, j as f64));
            }
        }
        assert_abs_diff_eq!(mean_nn_distance(&pts), 1.0);
    }

    #[test]
    fn test_interval_checked() {
        assert!(Interval::checked(1.0, 0.0).is_err());
        assert!(Interval::checked(0.0, 1.0).is_ok());
    }
}
