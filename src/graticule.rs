//! Meridian and parallel definitions over the shared control-point arena.
//!
//! Lines never own points; they hold ordered indices into the reference /
//! test point slices. When the filtering stages drop points (singular
//! removal, outlier rejection), the survivor mapping is pushed through every
//! line here so indices stay live.

/// Minimum number of points a meridian or parallel must keep after
/// filtering to stay usable as a shape descriptor.
pub const MIN_LINE_POINTS: usize = 3;

/// An (approximately) constant-longitude polyline on the analyzed map.
#[derive(Debug, Clone, PartialEq)]
pub struct MeridianLine {
    /// Longitude of the meridian, degrees.
    pub lon: f64,
    /// Ordered indices into the control-point arena.
    pub point_indices: Vec<usize>,
}

impl MeridianLine {
    pub fn new(lon: f64, point_indices: Vec<usize>) -> Self {
        Self { lon, point_indices }
    }
}

/// An (approximately) constant-latitude polyline on the analyzed map.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelLine {
    /// Latitude of the parallel, degrees.
    pub lat: f64,
    /// Ordered indices into the control-point arena.
    pub point_indices: Vec<usize>,
}

impl ParallelLine {
    pub fn new(lat: f64, point_indices: Vec<usize>) -> Self {
        Self { lat, point_indices }
    }
}

/// Survivor mapping produced by a filtering stage: `pairs[k] = (old, new)`
/// lists the points that survived, ordered by `new`.
pub type IndexPairs = Vec<(usize, usize)>;

/// Rewrite one index list through a survivor mapping.
///
/// Indices missing from the mapping are dropped; survivors are remapped to
/// their new positions.
fn remap_indices(indices: &[usize], pairs: &IndexPairs) -> Vec<usize> {
    indices
        .iter()
        .filter_map(|&old| pairs.iter().find(|&&(o, _)| o == old).map(|&(_, new)| new))
        .collect()
}

/// Push a survivor mapping through every meridian and parallel.
///
/// Lines left with fewer than [`MIN_LINE_POINTS`] indices are removed
/// entirely; they can no longer act as shape descriptors.
pub fn correct_meridians_and_parallels(
    meridians: &mut Vec<MeridianLine>,
    parallels: &mut Vec<ParallelLine>,
    pairs: &IndexPairs,
) {
    meridians.retain_mut(|m| {
        m.point_indices = remap_indices(&m.point_indices, pairs);
        m.point_indices.len() >= MIN_LINE_POINTS
    });
    parallels.retain_mut(|p| {
        p.point_indices = remap_indices(&p.point_indices, pairs);
        p.point_indices.len() >= MIN_LINE_POINTS
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_drops_and_renumbers() {
        // Survivors: 0->0, 2->1, 3->2 (point 1 dropped)
        let pairs = vec![(0, 0), (2, 1), (3, 2)];
        let out = remap_indices(&[0, 1, 2, 3], &pairs);
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn test_correct_removes_short_lines() {
        let pairs = vec![(0, 0), (1, 1), (4, 2)];
        let mut meridians = vec![
            MeridianLine::new(0.0, vec![0, 1, 4]),
            MeridianLine::new(10.0, vec![2, 3, 4]),
        ];
        let mut parallels = vec![ParallelLine::new(0.0, vec![0, 1, 2, 4])];
        correct_meridians_and_parallels(&mut meridians, &mut parallels, &pairs);

        // First meridian keeps all three survivors; second collapses below
        // the minimum and is dropped.
        assert_eq!(meridians.len(), 1);
        assert_eq!(meridians[0].point_indices, vec![0, 1, 2]);
        // The parallel loses index 2/3 but keeps three survivors.
        assert_eq!(parallels.len(), 1);
        assert_eq!(parallels[0].point_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_correct_is_idempotent_on_identity() {
        let pairs: IndexPairs = (0..5).map(|i| (i, i)).collect();
        let mut meridians = vec![MeridianLine::new(0.0, vec![0, 2, 4])];
        let mut parallels = vec![ParallelLine::new(45.0, vec![1, 2, 3])];
        let before = (meridians.clone(), parallels.clone());
        correct_meridians_and_parallels(&mut meridians, &mut parallels, &pairs);
        assert_eq!((meridians, parallels), before);
    }
}
