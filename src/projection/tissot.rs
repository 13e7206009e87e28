//! Tissot indicatrix semi-axes from numeric partials of the forward
//! formulas.
//!
//! The aspect sampler's complexity criterion and the Tissot match method
//! both need the local distortion ellipse. Partials are taken by central
//! differences directly in the aspect frame, so the caller passes
//! transformed coordinates.

use super::forward::forward_in_aspect;
use super::Projection;
use crate::error::Result;
use crate::geo::MAX_LAT;

/// Step for numeric partial derivatives, degrees.
pub const NUM_DERIV_STEP: f64 = 1.0e-3;

/// Local distortion ellipse parameters: semi-axes and orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TissotIndicatrix {
    /// Major semi-axis.
    pub a: f64,
    /// Minor semi-axis.
    pub b: f64,
    /// Orientation of the major axis, degrees from the x axis.
    pub ae: f64,
}

impl Default for TissotIndicatrix {
    /// The unit circle: used when the indicatrix cannot be computed.
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 1.0,
            ae: 0.0,
        }
    }
}

/// Meridian and parallel length-distortion factors `(h, k)` at a
/// transformed position, `h ≥ k`.
///
/// `h` is the scale along the meridian, `k` along the parallel:
/// `h = |∂P/∂φ| / R`, `k = |∂P/∂λ| / (R cos φ)`.
pub fn distortion_hk(lat_t: f64, lon_t: f64, proj: &Projection) -> Result<(f64, f64)> {
    // Stay inside the domain near the poles.
    let lat = lat_t.clamp(
        -MAX_LAT + 2.0 * NUM_DERIV_STEP,
        MAX_LAT - 2.0 * NUM_DERIV_STEP,
    );

    let p_lat_hi = forward_in_aspect(lat + NUM_DERIV_STEP, lon_t, proj)?;
    let p_lat_lo = forward_in_aspect(lat - NUM_DERIV_STEP, lon_t, proj)?;
    let p_lon_hi = forward_in_aspect(lat, lon_t + NUM_DERIV_STEP, proj)?;
    let p_lon_lo = forward_in_aspect(lat, lon_t - NUM_DERIV_STEP, proj)?;

    let two_steps_rad = (2.0 * NUM_DERIV_STEP).to_radians();
    let dx_dphi = (p_lat_hi.x - p_lat_lo.x) / two_steps_rad;
    let dy_dphi = (p_lat_hi.y - p_lat_lo.y) / two_steps_rad;
    let dx_dlam = (p_lon_hi.x - p_lon_lo.x) / two_steps_rad;
    let dy_dlam = (p_lon_hi.y - p_lon_lo.y) / two_steps_rad;

    let h = dx_dphi.hypot(dy_dphi) / proj.r;
    let k = dx_dlam.hypot(dy_dlam) / (proj.r * lat.to_radians().cos());

    if h >= k {
        Ok((h, k))
    } else {
        Ok((k, h))
    }
}

/// Distortion ellipse at a transformed position.
///
/// Falls back to the unit circle when the partials are not computable,
/// which keeps the Tissot match method usable everywhere.
pub fn indicatrix(lat_t: f64, lon_t: f64, proj: &Projection) -> TissotIndicatrix {
    match distortion_hk(lat_t, lon_t, proj) {
        Ok((h, k)) => TissotIndicatrix { a: h, b: k, ae: 0.0 },
        Err(_) => TissotIndicatrix::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionKind;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_equirectangular_distortion() {
        // h = 1 everywhere; k = cos(lat0)/cos(lat).
        let proj = Projection {
            lat0: 0.0,
            ..Projection::normal(ProjectionKind::Equirectangular, 1.0)
        };
        let (h, k) = distortion_hk(60.0, 10.0, &proj).unwrap();
        // h >= k ordering puts the parallel factor first here: at lat 60
        // the parallel is stretched by 1/cos(60) = 2.
        assert_abs_diff_eq!(h, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(k, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_mercator_conformal() {
        // Conformal projection: h == k at every point.
        let proj = Projection {
            lat0: 0.0,
            ..Projection::normal(ProjectionKind::Mercator, 1.0)
        };
        for lat in [0.0, 30.0, 55.0] {
            let (h, k) = distortion_hk(lat, 20.0, &proj).unwrap();
            assert_abs_diff_eq!(h, k, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sinusoidal_equal_area() {
        // Equal-area projection: h * k * cos(angle) == 1; along the central
        // meridian of the sinusoidal h = k = 1.
        let proj = Projection {
            lat0: 0.0,
            ..Projection::normal(ProjectionKind::Sinusoidal, 1.0)
        };
        let (h, k) = distortion_hk(40.0, 0.0, &proj).unwrap();
        assert_abs_diff_eq!(h * k, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_indicatrix_fallback() {
        // At the Mercator pole the partials blow up; the indicatrix must
        // fall back to the unit circle rather than fail.
        let proj = Projection {
            lat0: 0.0,
            ..Projection::normal(ProjectionKind::Gnomonic, 1.0)
        };
        let t = indicatrix(-89.999, 0.0, &proj);
        assert_abs_diff_eq!(t.a, 1.0);
        assert_abs_diff_eq!(t.b, 1.0);
    }
}
