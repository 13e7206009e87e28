//! Forward projection formulas.
//!
//! Every family is evaluated in its normal form in the aspect frame; the
//! oblique-pole rotation happens first in [`project`]. Formulas fail with
//! [`Error::MathDomain`] where they are undefined; [`project`] retries such
//! interior failures once with a small angular nudge before giving up.
//!
//! x grows east, y grows north. Azimuthal families are written in their
//! polar form (pole of the aspect frame at the origin); conic families put
//! the cone apex on the positive y axis. Constant offsets are irrelevant to
//! the analysis because the similarity alignment absorbs them.

use super::transform::to_aspect_frame;
use super::{Projection, ProjectionKind};
use crate::error::{Error, Result};
use crate::geo::{GeoPoint, PlanarPoint, GRATICULE_ANGLE_SHIFT, MAX_LAT};

use std::f64::consts::FRAC_PI_4;

/// Divisors smaller than this raise `MathDomain`.
const DIV_EPS: f64 = 1.0e-15;
/// Distance from a pole (degrees) below which pole-singular formulas fail.
const POLE_GUARD: f64 = 1.0e-9;

/// Forward-project a geographic point under a projection hypothesis.
///
/// Rotates into the aspect frame, evaluates the family formula, and applies
/// the planar offsets. A `MathDomain` failure at an interior point is
/// retried once with the transformed coordinates nudged by
/// [`GRATICULE_ANGLE_SHIFT`]; at the exact rotated pole the failure is
/// final.
pub fn project(point: &GeoPoint, proj: &Projection) -> Result<PlanarPoint> {
    let lon_red = crate::geo::red_lon0(point.lon, proj.lon0);
    let (lat_t, lon_t) = to_aspect_frame(
        point.lat,
        lon_red,
        proj.latp,
        proj.lonp,
        proj.kind.lon_direction(),
    );

    match forward_in_aspect(lat_t, lon_t, proj) {
        Ok(p) => Ok(with_offsets(p, proj)),
        Err(err) => {
            if lat_t.abs() >= MAX_LAT {
                return Err(err);
            }
            let p = forward_in_aspect(
                lat_t + GRATICULE_ANGLE_SHIFT,
                lon_t + GRATICULE_ANGLE_SHIFT,
                proj,
            )?;
            Ok(with_offsets(p, proj))
        }
    }
}

fn with_offsets(p: PlanarPoint, proj: &Projection) -> PlanarPoint {
    PlanarPoint::new(p.x + proj.dx, p.y + proj.dy)
}

/// Evaluate the family formula at an already-rotated position.
///
/// `lat_t`, `lon_t` in degrees.
pub fn forward_in_aspect(lat_t: f64, lon_t: f64, proj: &Projection) -> Result<PlanarPoint> {
    let phi = lat_t.to_radians();
    let lam = lon_t.to_radians();
    let phi0 = proj.lat0.to_radians();
    let r = proj.r;

    let (x, y) = match proj.kind {
        ProjectionKind::Equirectangular => (r * lam * phi0.cos(), r * phi),
        ProjectionKind::Mercator => {
            // tan(pi/2) is finite in doubles; gate the poles explicitly.
            if lat_t.abs() >= MAX_LAT - POLE_GUARD {
                return Err(Error::MathDomain(format!(
                    "mercator undefined at lat {lat_t}"
                )));
            }
            let t = (FRAC_PI_4 + 0.5 * phi).tan();
            if t <= 0.0 || !t.is_finite() {
                return Err(Error::MathDomain(format!(
                    "mercator undefined at lat {lat_t}"
                )));
            }
            (r * lam * phi0.cos(), r * t.ln())
        }
        ProjectionKind::Sinusoidal => (r * lam * phi.cos(), r * phi),
        ProjectionKind::Stereographic => {
            // The antipode of the projection centre goes to infinity.
            if lat_t <= -MAX_LAT + POLE_GUARD {
                return Err(Error::MathDomain(format!(
                    "stereographic undefined at lat {lat_t}"
                )));
            }
            polar_azimuthal(2.0 * r * (FRAC_PI_4 - 0.5 * phi).tan(), lam)
        }
        ProjectionKind::Orthographic => polar_azimuthal(r * phi.cos(), lam),
        ProjectionKind::Gnomonic => {
            let t = phi.tan();
            if t <= DIV_EPS {
                return Err(Error::MathDomain(format!(
                    "gnomonic undefined at lat {lat_t}"
                )));
            }
            polar_azimuthal(r / t, lam)
        }
        ProjectionKind::LambertAzimuthal => {
            polar_azimuthal(2.0 * r * (FRAC_PI_4 - 0.5 * phi).sin(), lam)
        }
        ProjectionKind::AzimuthalEquidistant => {
            polar_azimuthal(r * (std::f64::consts::FRAC_PI_2 - phi), lam)
        }
        ProjectionKind::Bonne => {
            let cot0 = cot(phi0)?;
            let rho = r * (cot0 + phi0 - phi);
            bonne_like(rho, r, phi, lam, r * cot0)?
        }
        ProjectionKind::Werner => {
            let rho = r * (std::f64::consts::FRAC_PI_2 - phi);
            bonne_like(rho, r, phi, lam, 0.0)?
        }
        ProjectionKind::LambertConic => {
            let n = cone_constant(proj)?;
            let cot0 = cot(phi0)?;
            let t0 = (FRAC_PI_4 - 0.5 * phi0).tan();
            let t = (FRAC_PI_4 - 0.5 * phi).tan();
            if t0.abs() < DIV_EPS || !t.is_finite() || t < 0.0 {
                return Err(Error::MathDomain(format!(
                    "lambert conic undefined at lat {lat_t}, lat0 {}",
                    proj.lat0
                )));
            }
            let rho = r * cot0 * (t / t0).powf(n);
            conic(rho, n * lam, r * cot0)
        }
        ProjectionKind::EquidistantConic => {
            let n = cone_constant(proj)?;
            let cot0 = cot(phi0)?;
            let rho = r * (cot0 + phi0 - phi);
            conic(rho, n * lam, r * cot0)
        }
        ProjectionKind::AlbersConic => {
            let n = cone_constant(proj)?;
            let big_c = phi0.cos().powi(2) + 2.0 * n * phi0.sin();
            let arg = big_c - 2.0 * n * phi.sin();
            let arg0 = big_c - 2.0 * n * phi0.sin();
            if arg < 0.0 || arg0 < 0.0 {
                return Err(Error::MathDomain(format!(
                    "albers undefined at lat {lat_t}"
                )));
            }
            let rho = r * arg.sqrt() / n;
            let rho0 = r * arg0.sqrt() / n;
            conic(rho, n * lam, rho0)
        }
    };

    if !x.is_finite() || !y.is_finite() {
        return Err(Error::MathDomain(format!(
            "{} produced a non-finite coordinate at ({lat_t}, {lon_t})",
            proj.kind
        )));
    }
    Ok(PlanarPoint::new(x, y))
}

/// Polar azimuthal layout: radius `rho` from the frame pole, azimuth from
/// the central meridian.
fn polar_azimuthal(rho: f64, lam: f64) -> (f64, f64) {
    (rho * lam.sin(), -rho * lam.cos())
}

/// Conic layout: cone apex at `(0, rho0)`, polar angle `theta` around it.
fn conic(rho: f64, theta: f64, rho0: f64) -> (f64, f64) {
    (rho * theta.sin(), rho0 - rho * theta.cos())
}

/// Bonne / Werner layout: the parallel arc through the point has radius
/// `rho` and is subtended at true length.
fn bonne_like(rho: f64, r: f64, phi: f64, lam: f64, y0: f64) -> Result<(f64, f64)> {
    if rho.abs() < DIV_EPS {
        return Err(Error::MathDomain(
            "bonne arc radius vanished at the cone apex".into(),
        ));
    }
    let e = r * lam * phi.cos() / rho;
    Ok((rho * e.sin(), y0 - rho * e.cos()))
}

/// Cone constant: the family constant when set, otherwise derived from the
/// central parallel.
fn cone_constant(proj: &Projection) -> Result<f64> {
    let n = if proj.c > 0.0 {
        proj.c
    } else {
        proj.lat0.to_radians().sin()
    };
    if n <= DIV_EPS {
        return Err(Error::MathDomain(format!(
            "cone constant degenerate for lat0 {}",
            proj.lat0
        )));
    }
    Ok(n)
}

fn cot(phi: f64) -> Result<f64> {
    let t = phi.tan();
    if t.abs() < DIV_EPS {
        return Err(Error::MathDomain(
            "cotangent undefined at the equator".into(),
        ));
    }
    Ok(1.0 / t)
}
