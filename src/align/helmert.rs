//! Weighted 2-D Helmert (similarity) and homothetic transformations.
//!
//! The closed-form weighted key maps a *source* point set onto a
//! *destination* set: both sets are reduced to their weighted centroids,
//! then
//!
//! ```text
//! c1 = Σ wᵢ (x'ᵢ·xᵢ + y'ᵢ·yᵢ) / J
//! c2 = Σ wᵢ (y'ᵢ·xᵢ − x'ᵢ·yᵢ) / J
//! J  = Σ wᵢ (xᵢ² + yᵢ²)
//! ```
//!
//! with primed coordinates destination-reduced and unprimed source-reduced.
//! Scale is `√(c1²+c2²)`, rotation `atan2(c2, c1)`; the translation falls
//! out of the centroids.

use crate::error::{Error, Result};
use crate::geo::PlanarPoint;
use crate::projection::tissot::TissotIndicatrix;

/// Transformation key of the weighted 2-D Helmert similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelmertKey {
    pub c1: f64,
    pub c2: f64,
    /// Weighted centroid of the source set.
    pub x_mass_src: f64,
    pub y_mass_src: f64,
    /// Weighted centroid of the destination set.
    pub x_mass_dst: f64,
    pub y_mass_dst: f64,
    /// Σ wᵢ (xᵢ² + yᵢ²) over the source-reduced coordinates.
    pub j: f64,
}

impl HelmertKey {
    /// Uniform scale factor of the similarity.
    pub fn scale(&self) -> f64 {
        self.c1.hypot(self.c2)
    }

    /// Rotation angle, degrees.
    pub fn rotation_deg(&self) -> f64 {
        self.c2.atan2(self.c1).to_degrees()
    }

    /// Translation of the affine form `p' = S·R·p + t`.
    pub fn translation(&self) -> (f64, f64) {
        (
            self.x_mass_dst - self.c1 * self.x_mass_src + self.c2 * self.y_mass_src,
            self.y_mass_dst - self.c2 * self.x_mass_src - self.c1 * self.y_mass_src,
        )
    }

    /// Map a source-frame point into the destination frame.
    pub fn apply(&self, p: &PlanarPoint) -> PlanarPoint {
        let xr = p.x - self.x_mass_src;
        let yr = p.y - self.y_mass_src;
        PlanarPoint::new(
            self.c1 * xr - self.c2 * yr + self.x_mass_dst,
            self.c2 * xr + self.c1 * yr + self.y_mass_dst,
        )
    }
}

/// Key of the homothetic (scale + translation, no rotation) transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomotheticKey {
    pub c: f64,
    pub x_mass_src: f64,
    pub y_mass_src: f64,
    pub x_mass_dst: f64,
    pub y_mass_dst: f64,
}

impl HomotheticKey {
    pub fn apply(&self, p: &PlanarPoint) -> PlanarPoint {
        PlanarPoint::new(
            self.c * (p.x - self.x_mass_src) + self.x_mass_dst,
            self.c * (p.y - self.y_mass_src) + self.y_mass_dst,
        )
    }

    pub fn translation(&self) -> (f64, f64) {
        (
            self.x_mass_dst - self.c * self.x_mass_src,
            self.y_mass_dst - self.c * self.y_mass_src,
        )
    }
}

struct Reduced {
    x_mass_src: f64,
    y_mass_src: f64,
    x_mass_dst: f64,
    y_mass_dst: f64,
}

fn validate(src: &[PlanarPoint], dst: &[PlanarPoint], weights: &[f64]) -> Result<()> {
    if src.len() < 2 || dst.len() < 2 {
        return Err(Error::BadData(
            "at least two points are needed for a similarity key".into(),
        ));
    }
    if src.len() != dst.len() {
        return Err(Error::DimensionMismatch {
            expected: src.len(),
            got: dst.len(),
        });
    }
    if weights.len() != src.len() {
        return Err(Error::DimensionMismatch {
            expected: src.len(),
            got: weights.len(),
        });
    }
    Ok(())
}

fn centroids(src: &[PlanarPoint], dst: &[PlanarPoint], weights: &[f64]) -> Result<Reduced> {
    let mut sw = 0.0;
    let (mut sxs, mut sys, mut sxd, mut syd) = (0.0, 0.0, 0.0, 0.0);
    for i in 0..src.len() {
        let w = weights[i];
        sxs += w * src[i].x;
        sys += w * src[i].y;
        sxd += w * dst[i].x;
        syd += w * dst[i].y;
        sw += w;
    }
    if sw <= 0.0 {
        return Err(Error::BadData("all weights are zero".into()));
    }
    Ok(Reduced {
        x_mass_src: sxs / sw,
        y_mass_src: sys / sw,
        x_mass_dst: sxd / sw,
        y_mass_dst: syd / sw,
    })
}

/// Compute the weighted Helmert key mapping `src` onto `dst`.
///
/// Fails with `MathSingular` when all weighted source points coincide
/// (J = 0).
pub fn helmert_key(src: &[PlanarPoint], dst: &[PlanarPoint], weights: &[f64]) -> Result<HelmertKey> {
    validate(src, dst, weights)?;
    let m = centroids(src, dst, weights)?;

    let (mut j, mut k1, mut k2) = (0.0, 0.0, 0.0);
    for i in 0..src.len() {
        let w = weights[i];
        let xs = src[i].x - m.x_mass_src;
        let ys = src[i].y - m.y_mass_src;
        let xd = dst[i].x - m.x_mass_dst;
        let yd = dst[i].y - m.y_mass_dst;
        j += w * (xs * xs + ys * ys);
        k1 += w * (xd * xs + yd * ys);
        k2 += w * (yd * xs - xd * ys);
    }

    if j == 0.0 {
        return Err(Error::MathSingular(
            "Helmert key divider J = 0: source points coincide".into(),
        ));
    }

    Ok(HelmertKey {
        c1: k1 / j,
        c2: k2 / j,
        x_mass_src: m.x_mass_src,
        y_mass_src: m.y_mass_src,
        x_mass_dst: m.x_mass_dst,
        y_mass_dst: m.y_mass_dst,
        j,
    })
}

/// Compute the weighted homothetic key mapping `src` onto `dst`.
pub fn homothetic_key(
    src: &[PlanarPoint],
    dst: &[PlanarPoint],
    weights: &[f64],
) -> Result<HomotheticKey> {
    validate(src, dst, weights)?;
    let m = centroids(src, dst, weights)?;

    let (mut j, mut k1) = (0.0, 0.0);
    for i in 0..src.len() {
        let w = weights[i];
        let xs = src[i].x - m.x_mass_src;
        let ys = src[i].y - m.y_mass_src;
        let xd = dst[i].x - m.x_mass_dst;
        let yd = dst[i].y - m.y_mass_dst;
        j += w * (xs * xs + ys * ys);
        k1 += w * (xd * xs + yd * ys);
    }

    if j == 0.0 {
        return Err(Error::MathSingular(
            "homothetic key divider J = 0: source points coincide".into(),
        ));
    }

    Ok(HomotheticKey {
        c: k1 / j,
        x_mass_src: m.x_mass_src,
        y_mass_src: m.y_mass_src,
        x_mass_dst: m.x_mass_dst,
        y_mass_dst: m.y_mass_dst,
    })
}

/// Transform every source point into the destination frame with a fresh
/// unweighted Helmert key; returns the key and the transformed set.
pub fn transform_points(
    src: &[PlanarPoint],
    dst: &[PlanarPoint],
) -> Result<(HelmertKey, Vec<PlanarPoint>)> {
    let weights = vec![1.0; src.len()];
    let key = helmert_key(src, dst, &weights)?;
    let transformed = src.iter().map(|p| key.apply(p)).collect();
    Ok((key, transformed))
}

/// Weighted standard deviation of the residuals between a destination set
/// and a transformed source set.
pub fn residual_std_dev(dst: &[PlanarPoint], transformed: &[PlanarPoint], weights: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut n_eff = 0usize;
    for i in 0..dst.len() {
        if weights[i] > 0.0 {
            let d = dst[i].dist(&transformed[i]);
            sum += weights[i] * d * d;
            n_eff += 1;
        }
    }
    if n_eff < 2 {
        return 0.0;
    }
    (sum / (n_eff - 1) as f64).sqrt()
}

/// Percentage of points whose transformed position lies within `tolerance`
/// of the corresponding reference position, plus the matched indices.
pub fn match_ratio_circle(
    reference: &[PlanarPoint],
    transformed: &[PlanarPoint],
    tolerance: f64,
) -> (f64, Vec<usize>) {
    let n = reference.len();
    if n == 0 {
        return (0.0, Vec::new());
    }
    let matched: Vec<usize> = (0..n)
        .filter(|&i| reference[i].dist(&transformed[i]) <= tolerance)
        .collect();
    (100.0 * matched.len() as f64 / n as f64, matched)
}

/// Percentage of points whose transformed position falls inside the
/// point's distortion ellipse scaled by `factor`, plus matched indices.
pub fn match_ratio_tissot(
    reference: &[PlanarPoint],
    transformed: &[PlanarPoint],
    indicatrices: &[TissotIndicatrix],
    factor: f64,
    unit: f64,
) -> (f64, Vec<usize>) {
    let n = reference.len();
    if n == 0 {
        return (0.0, Vec::new());
    }
    let matched: Vec<usize> = (0..n)
        .filter(|&i| {
            let t = &indicatrices[i];
            let (sin_ae, cos_ae) = t.ae.to_radians().sin_cos();
            let dx = transformed[i].x - reference[i].x;
            let dy = transformed[i].y - reference[i].y;
            // Rotate the offset into the ellipse frame.
            let u = dx * cos_ae + dy * sin_ae;
            let v = -dx * sin_ae + dy * cos_ae;
            let a = t.a * factor * unit;
            let b = t.b * factor * unit;
            if a <= 0.0 || b <= 0.0 {
                return false;
            }
            (u / a).powi(2) + (v / b).powi(2) <= 1.0
        })
        .collect();
    (100.0 * matched.len() as f64 / n as f64, matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<PlanarPoint> {
        vec![
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(1.0, 0.0),
            PlanarPoint::new(1.0, 1.0),
            PlanarPoint::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_self_alignment_is_identity() {
        let pts = square();
        let w = vec![1.0; pts.len()];
        let key = helmert_key(&pts, &pts, &w).unwrap();
        assert_abs_diff_eq!(key.c1, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(key.c2, 0.0, epsilon = 1e-12);
        // J equals the squared norm of the centroid-reduced set.
        assert_abs_diff_eq!(key.j, 2.0, epsilon = 1e-12);
        for p in &pts {
            let q = key.apply(p);
            assert_abs_diff_eq!(q.x, p.x, epsilon = 1e-12);
            assert_abs_diff_eq!(q.y, p.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_recovers_known_similarity() {
        let src = square();
        let (scale, rot_deg) = (2.5, 30.0_f64);
        let (s, c) = (rot_deg.to_radians().sin(), rot_deg.to_radians().cos());
        let dst: Vec<PlanarPoint> = src
            .iter()
            .map(|p| {
                PlanarPoint::new(
                    scale * (c * p.x - s * p.y) + 4.0,
                    scale * (s * p.x + c * p.y) - 7.0,
                )
            })
            .collect();
        let w = vec![1.0; src.len()];
        let key = helmert_key(&src, &dst, &w).unwrap();
        assert_abs_diff_eq!(key.scale(), scale, epsilon = 1e-12);
        assert_abs_diff_eq!(key.rotation_deg(), rot_deg, epsilon = 1e-12);
        let (dx, dy) = key.translation();
        assert_abs_diff_eq!(dx, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(dy, -7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_coincident_points_are_singular() {
        let src = vec![PlanarPoint::new(1.0, 1.0); 3];
        let dst = square()[..3].to_vec();
        let w = vec![1.0; 3];
        assert!(matches!(
            helmert_key(&src, &dst, &w),
            Err(crate::error::Error::MathSingular(_))
        ));
    }

    #[test]
    fn test_zero_weight_excludes_point() {
        let src = square();
        let mut dst = src.clone();
        // Corrupt one point but weight it out.
        dst[3] = PlanarPoint::new(100.0, -100.0);
        let w = vec![1.0, 1.0, 1.0, 0.0];
        let key = helmert_key(&src, &dst, &w).unwrap();
        assert_abs_diff_eq!(key.c1, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(key.c2, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_homothetic_no_rotation() {
        let src = square();
        let dst: Vec<PlanarPoint> = src
            .iter()
            .map(|p| PlanarPoint::new(3.0 * p.x + 1.0, 3.0 * p.y + 2.0))
            .collect();
        let w = vec![1.0; src.len()];
        let key = homothetic_key(&src, &dst, &w).unwrap();
        assert_abs_diff_eq!(key.c, 3.0, epsilon = 1e-12);
        let (dx, dy) = key.translation();
        assert_abs_diff_eq!(dx, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(dy, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_match_ratio_circle() {
        let a = square();
        let mut b = a.clone();
        b[0].x += 0.05;
        b[1].x += 10.0;
        let (ratio, matched) = match_ratio_circle(&a, &b, 0.1);
        assert_abs_diff_eq!(ratio, 75.0);
        assert_eq!(matched, vec![0, 2, 3]);
    }

    #[test]
    fn test_residual_std_dev_zero_on_exact() {
        let a = square();
        let w = vec![1.0; a.len()];
        assert_abs_diff_eq!(residual_std_dev(&a, &a, &w), 0.0);
    }
}
