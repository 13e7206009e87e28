//! Robust outlier detection by iteratively reweighted least squares on the
//! Helmert residual.
//!
//! The similarity key is re-estimated with residual-dependent Cauchy
//! weights `wᵢ = 1 / (1 + (rᵢ/σ)²)` until the key stabilizes; points whose
//! final weight falls below a cut are declared outliers and the surviving
//! ordered pair list is returned as the *k-best* set.

use tracing::debug;

use super::helmert::{helmert_key, HelmertKey};
use crate::error::{Error, Result};
use crate::geo::PlanarPoint;
use crate::graticule::IndexPairs;

/// Relative change in (c1, c2) below which the iteration has converged.
const KEY_CONVERGENCE: f64 = 1.0e-6;
/// Iteration cap.
const MAX_ITERATIONS: usize = 25;
/// Final weight below which a point is an outlier.
const OUTLIER_WEIGHT_CUT: f64 = 0.1;

/// Detect outliers between a test set and a projected set.
///
/// Returns the converged Helmert key (projected → test) and the old→new
/// index pairs of the k-best (inlier) points.
pub fn irls_k_best(
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
) -> Result<(HelmertKey, IndexPairs)> {
    let n = test.len();
    if n != projected.len() {
        return Err(Error::DimensionMismatch {
            expected: n,
            got: projected.len(),
        });
    }
    if n < 3 {
        return Err(Error::BadData(
            "outlier detection needs at least three points".into(),
        ));
    }

    let mut weights = vec![1.0; n];
    let mut key = helmert_key(projected, test, &weights)?;

    for iteration in 0..MAX_ITERATIONS {
        // Residuals under the current key.
        let residuals: Vec<f64> = (0..n)
            .map(|i| key.apply(&projected[i]).dist(&test[i]))
            .collect();

        let sum_w: f64 = weights.iter().sum();
        let sigma2: f64 = residuals
            .iter()
            .zip(&weights)
            .map(|(r, w)| w * r * r)
            .sum::<f64>()
            / sum_w;
        if sigma2 <= 0.0 {
            // Exact fit: nothing to reject.
            break;
        }

        for i in 0..n {
            weights[i] = 1.0 / (1.0 + residuals[i] * residuals[i] / sigma2);
        }

        let new_key = helmert_key(projected, test, &weights)?;
        let denom = key.c1.hypot(key.c2).max(1.0);
        let change = (new_key.c1 - key.c1).hypot(new_key.c2 - key.c2) / denom;
        key = new_key;

        if change < KEY_CONVERGENCE {
            debug!(iteration, change, "IRLS converged");
            break;
        }
    }

    let mut pairs = IndexPairs::new();
    for (i, &w) in weights.iter().enumerate() {
        if w >= OUTLIER_WEIGHT_CUT {
            pairs.push((i, pairs.len()));
        }
    }

    if pairs.len() < 3 {
        return Err(Error::BadData(
            "outlier rejection left fewer than three points".into(),
        ));
    }

    debug!(
        inliers = pairs.len(),
        outliers = n - pairs.len(),
        "IRLS outlier detection finished"
    );
    Ok((key, pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid() -> Vec<PlanarPoint> {
        let mut pts = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                pts.push(PlanarPoint::new(i as f64 * 10.0, j as f64 * 10.0));
            }
        }
        pts
    }

    #[test]
    fn test_clean_data_keeps_all_points() {
        let projected = grid();
        let test: Vec<PlanarPoint> = projected
            .iter()
            .map(|p| PlanarPoint::new(2.0 * p.x + 1.0, 2.0 * p.y - 3.0))
            .collect();
        let (key, pairs) = irls_k_best(&test, &projected).unwrap();
        assert_eq!(pairs.len(), projected.len());
        assert_abs_diff_eq!(key.scale(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gross_outlier_is_rejected() {
        let projected = grid();
        let mut test: Vec<PlanarPoint> = projected.clone();
        test[4] = PlanarPoint::new(500.0, -500.0);
        let (_, pairs) = irls_k_best(&test, &projected).unwrap();
        assert!(pairs.iter().all(|&(old, _)| old != 4));
        assert_eq!(pairs.len(), projected.len() - 1);
        // Survivor numbering is dense.
        for (new_expected, &(_, new)) in pairs.iter().enumerate() {
            assert_eq!(new, new_expected);
        }
    }

    #[test]
    fn test_too_few_points() {
        let a = vec![PlanarPoint::new(0.0, 0.0), PlanarPoint::new(1.0, 1.0)];
        assert!(irls_k_best(&a, &a).is_err());
    }
}
