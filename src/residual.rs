//! The residual functor: cost vector of one parameter vector.
//!
//! Given `X = [R, latp, lonp, lat0, lon0]` the functor sanitizes the
//! parameters for the aspect under analysis, builds a transient projection
//! instance, forward-projects every reference point, and derives the
//! residual vector from the weighted 2-D Helmert ratios between the
//! projected set and the drawn test set:
//!
//! ```text
//! Vᵢ     = q1·x'ᵢ − q2·y'ᵢ − x_testᵢ     (centroid-reduced)
//! Vᵢ₊ₘ   = q2·x'ᵢ + q1·y'ᵢ − y_testᵢ
//! ```
//!
//! Points where the projection is undefined are disabled through the shared
//! weight vector; their residual entries stay exactly zero. The functor
//! never mutates shared projection state: every evaluation builds its own
//! instance from `X`.

use nalgebra::DVector;
use tracing::debug;

use crate::analysis::sample::{compute_one_sample, Sample, SampleOutcome};
use crate::analysis::AnalysisParams;
use crate::error::{Error, Result};
use crate::geo::{red_lon0, wrap_lon, GeoPoint, PlanarPoint, MAX_LAT, MAX_LON};
use crate::graticule::{MeridianLine, ParallelLine};
use crate::projection::forward::forward_in_aspect;
use crate::projection::transform::to_aspect_frame;
use crate::projection::{Aspect, Projection, ProjectionKind};
use crate::shape::CellShapeSource;

/// Index layout of the parameter vector.
pub const IX_R: usize = 0;
pub const IX_LATP: usize = 1;
pub const IX_LONP: usize = 2;
pub const IX_LAT0: usize = 3;
pub const IX_LON0: usize = 4;
/// Dimension of the parameter vector.
pub const PARAM_DIM: usize = 5;

/// Everything one evaluation of the cost function needs to borrow.
pub struct ResidualFunctor<'a> {
    pub test: &'a [PlanarPoint],
    pub reference: &'a [GeoPoint],
    pub meridians: &'a [MeridianLine],
    pub parallels: &'a [ParallelLine],
    pub kind: ProjectionKind,
    /// Family constant, fixed during optimization.
    pub c: f64,
    pub aspect: Aspect,
    pub params: &'a AnalysisParams,
    pub cells: Option<&'a dyn CellShapeSource>,
}

impl<'a> ResidualFunctor<'a> {
    /// Wrap out-of-period angles and force the aspect's pinned components.
    ///
    /// `X` is modified in place, which is part of the functor contract:
    /// optimizers observe the sanitized vector.
    pub fn sanitize(&self, x: &mut DVector<f64>) {
        let lat0_iv = self.kind.lat0_interval();

        // Radius must stay positive.
        x[IX_R] = x[IX_R].abs().max(f64::MIN_POSITIVE);

        match self.aspect {
            Aspect::Normal => {
                x[IX_LATP] = MAX_LAT;
                x[IX_LONP] = 0.0;
                if x[IX_LAT0].abs() > MAX_LAT {
                    x[IX_LAT0] %= 90.0;
                }
                if x[IX_LON0].abs() > MAX_LON {
                    x[IX_LON0] %= 180.0;
                }
                x[IX_LAT0] = x[IX_LAT0].clamp(lat0_iv.min, lat0_iv.max);
            }
            Aspect::Transverse => {
                x[IX_LATP] = 0.0;
                if x[IX_LONP].abs() > MAX_LON {
                    x[IX_LONP] %= 180.0;
                }
                if x[IX_LAT0].abs() > MAX_LAT {
                    x[IX_LAT0] %= 90.0;
                }
                x[IX_LAT0] = x[IX_LAT0].clamp(lat0_iv.min, lat0_iv.max);
                x[IX_LON0] = wrap_lon(x[IX_LON0]);
            }
            Aspect::Oblique => {
                if x[IX_LATP].abs() > MAX_LAT {
                    x[IX_LATP] %= 90.0;
                }
                if x[IX_LONP].abs() > MAX_LON {
                    x[IX_LONP] %= 180.0;
                }
                if x[IX_LAT0].abs() > MAX_LAT {
                    x[IX_LAT0] %= 90.0;
                }
                // A pole within a degree of the north pole is the normal
                // aspect; snap it there to kill the lonp degeneracy.
                if (x[IX_LATP] - MAX_LAT).abs() < 1.0 {
                    x[IX_LATP] = MAX_LAT;
                    x[IX_LONP] = 0.0;
                }
                // Recenter an out-of-interval central parallel.
                if !lat0_iv.contains(x[IX_LAT0]) {
                    x[IX_LAT0] = lat0_iv.mid();
                }
                // The central meridian is absorbed by lonp in the oblique
                // aspect.
                x[IX_LON0] = 0.0;
            }
        }
    }

    /// Build the transient projection instance for a sanitized vector.
    pub fn instance(&self, x: &DVector<f64>) -> Projection {
        Projection {
            kind: self.kind,
            r: x[IX_R],
            latp: x[IX_LATP],
            lonp: x[IX_LONP],
            lat0: x[IX_LAT0],
            lon0: x[IX_LON0],
            c: self.c,
            dx: 0.0,
            dy: 0.0,
        }
    }

    /// Evaluate the residual vector `V` for `X`, updating `W` in place.
    ///
    /// With `compute_analysis` the full criterion battery also runs and the
    /// weights are rebuilt from the resulting singular/outlier index sets;
    /// the passed `sample` receives the battery results plus the similarity
    /// by-products (rotation, offsets, radius scale).
    pub fn evaluate(
        &self,
        x: &mut DVector<f64>,
        v: &mut DVector<f64>,
        w: &mut DVector<f64>,
        compute_analysis: bool,
        sample: &mut Sample,
    ) -> Result<()> {
        let m = self.test.len();
        if x.len() != PARAM_DIM {
            return Err(Error::DimensionMismatch {
                expected: PARAM_DIM,
                got: x.len(),
            });
        }
        if v.len() != 2 * m || w.len() != 2 * m {
            return Err(Error::DimensionMismatch {
                expected: 2 * m,
                got: v.len().min(w.len()),
            });
        }

        self.sanitize(x);
        let proj = self.instance(x);

        if compute_analysis {
            match compute_one_sample(
                self.test,
                self.reference,
                self.meridians,
                self.parallels,
                &proj,
                self.params,
                self.cells,
            ) {
                Ok(SampleOutcome::Accepted(s, _)) => {
                    *sample = *s;
                    // Rebuild the weights from the survivor index sets:
                    // singular points and outliers weigh zero.
                    let mut keep = vec![false; m];
                    for &kb in &sample.k_best_indices {
                        if let Some(&orig) = sample.non_singular_indices.get(kb) {
                            if orig < m {
                                keep[orig] = true;
                            }
                        }
                    }
                    if sample.k_best_indices.is_empty() {
                        keep = vec![true; m];
                    }
                    for i in 0..m {
                        let wi = if keep[i] { 1.0 } else { 0.0 };
                        w[i] = wi;
                        w[i + m] = wi;
                    }
                }
                Ok(SampleOutcome::Rejected) => {
                    debug!(kind = %self.kind, "analysis pruned during optimization step");
                }
                Err(err) => {
                    if self.params.print_exceptions {
                        debug!(
                            kind = %self.kind,
                            latp = proj.latp,
                            lonp = proj.lonp,
                            lat0 = proj.lat0,
                            %err,
                            "per-sample analysis failed"
                        );
                    }
                }
            }
        }

        // Forward-project every reference point; failures disable the point.
        let mut projected = vec![PlanarPoint::default(); m];
        for i in 0..m {
            let lon_red = red_lon0(self.reference[i].lon, x[IX_LON0]);
            let (lat_t, lon_t) = to_aspect_frame(
                self.reference[i].lat,
                lon_red,
                x[IX_LATP],
                x[IX_LONP],
                self.kind.lon_direction(),
            );
            match forward_in_aspect(lat_t, lon_t, &proj) {
                Ok(p) => projected[i] = p,
                Err(_) => {
                    w[i] = 0.0;
                    w[i + m] = 0.0;
                }
            }
        }

        // Weighted centroids of both sets over the active points.
        let mut n_active = 0usize;
        let (mut xt, mut yt, mut xp, mut yp) = (0.0, 0.0, 0.0, 0.0);
        for i in 0..m {
            if w[i] != 0.0 {
                xt += self.test[i].x;
                yt += self.test[i].y;
                xp += projected[i].x;
                yp += projected[i].y;
                n_active += 1;
            }
        }
        if n_active < 2 {
            return Err(Error::BadData(
                "fewer than two evaluable points for the residual".into(),
            ));
        }
        let n = n_active as f64;
        let (xt, yt, xp, yp) = (xt / n, yt / n, xp / n, yp / n);

        // Weighted Helmert ratios projected → test (rotation + scale only;
        // the translation lives in the centroids).
        let (mut sum_xy_1, mut sum_xy_2, mut sum_xx_yy) = (0.0, 0.0, 0.0);
        for i in 0..m {
            if w[i] == 0.0 {
                continue;
            }
            let (txr, tyr) = (self.test[i].x - xt, self.test[i].y - yt);
            let (pxr, pyr) = (projected[i].x - xp, projected[i].y - yp);
            sum_xy_1 += w[i] * (txr * pxr + tyr * pyr);
            sum_xy_2 += w[i] * (tyr * pxr - txr * pyr);
            sum_xx_yy += w[i] * (pxr * pxr + pyr * pyr);
        }
        if sum_xx_yy == 0.0 {
            return Err(Error::MathSingular(
                "projected points coincide; Helmert ratios undefined".into(),
            ));
        }
        let q1 = sum_xy_1 / sum_xx_yy;
        let q2 = sum_xy_2 / sum_xx_yy;

        // Residuals: similarity-aligned projected coordinates minus the
        // reduced test coordinates. Disabled points contribute exactly zero.
        for i in 0..m {
            if w[i] != 0.0 {
                let (pxr, pyr) = (projected[i].x - xp, projected[i].y - yp);
                v[i] = q1 * pxr - q2 * pyr - (self.test[i].x - xt);
                v[i + m] = q2 * pxr + q1 * pyr - (self.test[i].y - yt);
            } else {
                v[i] = 0.0;
                v[i + m] = 0.0;
            }
        }

        // Similarity by-products.
        let scale = q1.hypot(q2);
        sample.rotation = q2.atan2(q1).to_degrees();
        sample.dx = xt - xp * q1 + yp * q2;
        sample.dy = yt - xp * q2 - yp * q1;
        sample.scale_helt = scale;

        // Let the similarity drive the radius: the optimizer's next step
        // starts from the scale-consistent sphere.
        x[IX_R] *= scale;
        sample.r = x[IX_R];
        sample.latp = x[IX_LATP];
        sample.lonp = x[IX_LONP];
        sample.lat0 = x[IX_LAT0];
        sample.lon0 = x[IX_LON0];

        Ok(())
    }

    /// Weighted squared cost `VᵀWV` of a residual vector.
    pub fn cost(v: &DVector<f64>, w: &DVector<f64>) -> f64 {
        v.iter().zip(w.iter()).map(|(vi, wi)| wi * vi * vi).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::forward::project;
    use approx::assert_abs_diff_eq;

    fn setup() -> (Vec<GeoPoint>, Vec<PlanarPoint>, Projection) {
        let reference: Vec<GeoPoint> = [
            (0.0, 0.0),
            (0.0, 20.0),
            (20.0, 0.0),
            (20.0, 20.0),
            (40.0, 10.0),
            (10.0, 35.0),
        ]
        .iter()
        .map(|&(lat, lon)| GeoPoint::new(lat, lon))
        .collect();
        let proj = Projection {
            lat0: 0.0,
            ..Projection::normal(ProjectionKind::Equirectangular, 50.0)
        };
        let test = reference.iter().map(|g| project(g, &proj).unwrap()).collect();
        (reference, test, proj)
    }

    fn functor<'a>(
        reference: &'a [GeoPoint],
        test: &'a [PlanarPoint],
        params: &'a AnalysisParams,
        aspect: Aspect,
    ) -> ResidualFunctor<'a> {
        ResidualFunctor {
            test,
            reference,
            meridians: &[],
            parallels: &[],
            kind: ProjectionKind::Equirectangular,
            c: 0.0,
            aspect,
            params,
            cells: None,
        }
    }

    #[test]
    fn test_true_parameters_give_zero_cost() {
        let (reference, test, proj) = setup();
        let params = AnalysisParams::default();
        let f = functor(&reference, &test, &params, Aspect::Normal);
        let m = test.len();
        let mut x = DVector::from_vec(vec![proj.r, 90.0, 0.0, proj.lat0, 0.0]);
        let mut v = DVector::zeros(2 * m);
        let mut w = DVector::from_element(2 * m, 1.0);
        let mut sample = Sample::new(&proj);
        f.evaluate(&mut x, &mut v, &mut w, false, &mut sample).unwrap();
        let cost = ResidualFunctor::cost(&v, &w);
        assert_abs_diff_eq!(cost, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sample.rotation, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(x[IX_R], proj.r, epsilon = 1e-9);
    }

    #[test]
    fn test_sanitizer_pins_aspect_components() {
        let (reference, test, _) = setup();
        let params = AnalysisParams::default();

        let f = functor(&reference, &test, &params, Aspect::Normal);
        let mut x = DVector::from_vec(vec![1.0, 42.0, 17.0, 200.0, 500.0]);
        f.sanitize(&mut x);
        assert_eq!(x[IX_LATP], 90.0);
        assert_eq!(x[IX_LONP], 0.0);
        let iv = ProjectionKind::Equirectangular.lat0_interval();
        assert!(iv.contains(x[IX_LAT0]));
        assert!(x[IX_LON0].abs() <= 180.0);

        let f = functor(&reference, &test, &params, Aspect::Transverse);
        let mut x = DVector::from_vec(vec![1.0, 42.0, -300.0, -10.0, 0.0]);
        f.sanitize(&mut x);
        assert_eq!(x[IX_LATP], 0.0);
        assert!(x[IX_LONP].abs() <= 180.0);
        assert!(iv.contains(x[IX_LAT0]));

        let f = functor(&reference, &test, &params, Aspect::Oblique);
        let mut x = DVector::from_vec(vec![1.0, 89.5, 77.0, 95.0, 12.0]);
        f.sanitize(&mut x);
        // Near-polar pole snaps to the normal aspect.
        assert_eq!(x[IX_LATP], 90.0);
        assert_eq!(x[IX_LONP], 0.0);
        assert!(iv.contains(x[IX_LAT0]));
        assert_eq!(x[IX_LON0], 0.0);
    }

    #[test]
    fn test_disabled_point_contributes_zero() {
        let (reference, test, proj) = setup();
        let params = AnalysisParams::default();
        let f = functor(&reference, &test, &params, Aspect::Normal);
        let m = test.len();
        let mut x = DVector::from_vec(vec![proj.r, 90.0, 0.0, 30.0, 0.0]);
        let mut v = DVector::zeros(2 * m);
        let mut w = DVector::from_element(2 * m, 1.0);
        // Disable point 2 up front.
        w[2] = 0.0;
        w[2 + m] = 0.0;
        let mut sample = Sample::new(&proj);
        f.evaluate(&mut x, &mut v, &mut w, false, &mut sample).unwrap();
        assert_eq!(v[2], 0.0);
        assert_eq!(v[2 + m], 0.0);
        // And the cost ignores it entirely.
        let cost_with = ResidualFunctor::cost(&v, &w);
        v[2] = 1.0e6;
        let cost_after = ResidualFunctor::cost(&v, &w);
        assert_abs_diff_eq!(cost_with, cost_after);
    }

    #[test]
    fn test_radius_rescaled_by_similarity() {
        let (reference, test, proj) = setup();
        let params = AnalysisParams::default();
        let f = functor(&reference, &test, &params, Aspect::Normal);
        let m = test.len();
        // Start with a radius 4x too small; the similarity scale should pull
        // it back toward the truth in one evaluation.
        let mut x = DVector::from_vec(vec![proj.r / 4.0, 90.0, 0.0, proj.lat0, 0.0]);
        let mut v = DVector::zeros(2 * m);
        let mut w = DVector::from_element(2 * m, 1.0);
        let mut sample = Sample::new(&proj);
        f.evaluate(&mut x, &mut v, &mut w, false, &mut sample).unwrap();
        assert_abs_diff_eq!(x[IX_R], proj.r, epsilon = 1e-6);
    }
}
