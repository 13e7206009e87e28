//! Spherical oblique-pole transform.
//!
//! Rotates geographic coordinates into a projection's aspect frame: the
//! cartographic pole `(latp, lonp)` maps to the north pole of the rotated
//! frame, after which every family is evaluated in its normal form.
//!
//! With `(latp, lonp) = (90, 0)` the transform is the identity; near the
//! rotated poles the transformed longitude is arbitrary and pinned to 0.

use super::LonDirection;
use crate::geo::{wrap_lon, MAX_LAT};

/// Latitude within this distance of ±90° is treated as exactly at the
/// rotated pole, where the transformed longitude is undefined.
const POLE_EPS: f64 = 1.0e-10;

/// Rotate `(lat, lon)` into the aspect frame of the cartographic pole
/// `(latp, lonp)`, honoring the family's longitude-direction convention.
///
/// All angles in degrees. Returns `(lat_trans, lon_trans)`.
pub fn to_aspect_frame(
    lat: f64,
    lon: f64,
    latp: f64,
    lonp: f64,
    dir: LonDirection,
) -> (f64, f64) {
    if latp >= MAX_LAT - POLE_EPS && lonp.abs() < POLE_EPS {
        // Normal aspect: nothing to rotate.
        let lon_t = match dir {
            LonDirection::Normal => wrap_lon(lon),
            LonDirection::Reversed => wrap_lon(-lon),
        };
        return (lat, lon_t);
    }

    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_latp, cos_latp) = latp.to_radians().sin_cos();
    let dlon = (lon - lonp).to_radians();
    let (sin_dlon, cos_dlon) = dlon.sin_cos();

    // Latitude in the rotated frame.
    let s = (sin_latp * sin_lat + cos_latp * cos_lat * cos_dlon).clamp(-1.0, 1.0);
    let lat_t = s.asin().to_degrees();

    // At the rotated poles the longitude is arbitrary.
    if lat_t.abs() >= MAX_LAT - POLE_EPS {
        return (lat_t.clamp(-MAX_LAT, MAX_LAT), 0.0);
    }

    let num = cos_lat * sin_dlon;
    let den = sin_latp * cos_lat * cos_dlon - cos_latp * sin_lat;
    let mut lon_t = num.atan2(den).to_degrees();

    if dir == LonDirection::Reversed {
        lon_t = -lon_t;
    }
    (lat_t, wrap_lon(lon_t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normal_aspect_is_identity() {
        for &(lat, lon) in &[(0.0, 0.0), (45.0, 30.0), (-20.0, -110.0), (89.0, 179.0)] {
            let (lat_t, lon_t) = to_aspect_frame(lat, lon, 90.0, 0.0, LonDirection::Normal);
            assert_abs_diff_eq!(lat_t, lat, epsilon = 1e-12);
            assert_abs_diff_eq!(lon_t, lon, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_reversed_direction_negates_longitude() {
        let (_, lon_t) = to_aspect_frame(30.0, 40.0, 90.0, 0.0, LonDirection::Reversed);
        assert_abs_diff_eq!(lon_t, -40.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cart_pole_maps_to_north_pole() {
        let (latp, lonp) = (50.0, 15.0);
        let (lat_t, _) = to_aspect_frame(latp, lonp, latp, lonp, LonDirection::Normal);
        assert_abs_diff_eq!(lat_t, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_antipode_of_pole_maps_to_south_pole() {
        let (latp, lonp) = (50.0, 15.0);
        let (lat_t, _) = to_aspect_frame(-latp, wrap_lon(lonp + 180.0), latp, lonp, LonDirection::Normal);
        assert_abs_diff_eq!(lat_t, -90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_transverse_equator_point() {
        // Transverse frame with the pole at (0, 0): the point (0, 0) becomes
        // the rotated north pole, (0, 90) lies on the rotated equator.
        let (lat_t, _) = to_aspect_frame(0.0, 0.0, 0.0, 0.0, LonDirection::Normal);
        assert_abs_diff_eq!(lat_t, 90.0, epsilon = 1e-9);
        let (lat_t, _) = to_aspect_frame(0.0, 90.0, 0.0, 0.0, LonDirection::Normal);
        assert_abs_diff_eq!(lat_t, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotation_preserves_angular_distance() {
        // Angular distance from the cartographic pole equals the rotated
        // colatitude for any point.
        let (latp, lonp) = (35.0, -60.0);
        for &(lat, lon) in &[(10.0, 10.0), (-40.0, 120.0), (70.0, -170.0)] {
            let (lat_t, _) = to_aspect_frame(lat, lon, latp, lonp, LonDirection::Normal);
            let d = angular_distance(lat, lon, latp, lonp);
            assert_abs_diff_eq!(90.0 - lat_t, d, epsilon = 1e-9);
        }
    }

    fn angular_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let (s1, c1) = lat1.to_radians().sin_cos();
        let (s2, c2) = lat2.to_radians().sin_cos();
        let dl = (lon1 - lon2).to_radians();
        (s1 * s2 + c1 * c2 * dl.cos()).clamp(-1.0, 1.0).acos().to_degrees()
    }
}
