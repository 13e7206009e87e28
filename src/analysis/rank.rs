//! Per-criterion ranking with tie handling and the aggregate rank.
//!
//! Each criterion sorts ascending; equal values (within the rounding
//! window) share a position and the following positions are skipped, so a
//! strictly ordered list ranks 1..n with no gaps. The aggregate rank is the
//! mean of the available per-criterion positions; samples without any
//! computed criterion sink to the bottom.

use super::sample::{CriteriaSet, Sample};

/// Two criterion values closer than this are considered tied.
pub const ARGUMENT_ROUND_ERROR: f64 = 1.0e-5;

fn assign_positions(
    samples: &mut [Sample],
    value: fn(&Sample) -> f64,
    available: fn(&Sample) -> bool,
    set_position: fn(&mut Sample, i32),
) {
    let mut order: Vec<usize> = (0..samples.len())
        .filter(|&i| available(&samples[i]))
        .collect();
    order.sort_by(|&a, &b| value(&samples[a]).partial_cmp(&value(&samples[b])).unwrap());

    let mut prev_value = f64::MIN;
    let mut prev_position = 1i32;
    for (idx, &i) in order.iter().enumerate() {
        let v = value(&samples[i]);
        let position = if idx > 0 && (v - prev_value).abs() <= ARGUMENT_ROUND_ERROR {
            prev_position
        } else {
            idx as i32 + 1
        };
        set_position(&mut samples[i], position);
        prev_value = v;
        prev_position = position;
    }
}

/// Rank every enabled criterion across the sample list, fill the aggregate
/// positions, and sort the list by aggregate rank.
pub fn rank_samples(samples: &mut Vec<Sample>, criteria: &CriteriaSet) {
    if criteria.cnd {
        assign_positions(
            samples,
            |s| s.cross_nn.value,
            |s| s.cross_nn.available(),
            |s, p| s.cross_nn.position = p,
        );
    }
    if criteria.homt {
        assign_positions(
            samples,
            |s| s.homt.value,
            |s| s.homt.available(),
            |s, p| s.homt.position = p,
        );
    }
    if criteria.helt {
        assign_positions(
            samples,
            |s| s.helt.value,
            |s| s.helt.available(),
            |s, p| s.helt.position = p,
        );
    }
    if criteria.gntf {
        assign_positions(
            samples,
            |s| s.gntf.value,
            |s| s.gntf.available(),
            |s, p| s.gntf.position = p,
        );
    }
    if criteria.vdtf {
        assign_positions(
            samples,
            |s| s.vdtf.value,
            |s| s.vdtf.available(),
            |s, p| s.vdtf.position = p,
        );
    }

    // Aggregate: mean of the available positions; missing criteria
    // (position −1) are excluded.
    for s in samples.iter_mut() {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (enabled, crit) in [
            (criteria.cnd, &s.cross_nn),
            (criteria.homt, &s.homt),
            (criteria.helt, &s.helt),
            (criteria.gntf, &s.gntf),
            (criteria.vdtf, &s.vdtf),
        ] {
            if enabled && crit.available() {
                sum += crit.position as f64;
                count += 1;
            }
        }
        s.aggregate_position = if count > 0 {
            sum / count as f64
        } else {
            f64::MAX
        };
    }

    samples.sort_by(|a, b| {
        a.aggregate_position
            .partial_cmp(&b.aggregate_position)
            .unwrap()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{Projection, ProjectionKind};

    fn sample_with_helt(value: f64) -> Sample {
        let proj = Projection::normal(ProjectionKind::Mercator, 1.0);
        let mut s = Sample::new(&proj);
        s.helt.value = value;
        s.helt.position = 1;
        s
    }

    fn helt_only() -> CriteriaSet {
        CriteriaSet {
            cnd: false,
            homt: false,
            helt: true,
            gntf: false,
            vdtf: false,
        }
    }

    #[test]
    fn test_strict_order_has_no_gaps() {
        let mut samples = vec![
            sample_with_helt(3.0),
            sample_with_helt(1.0),
            sample_with_helt(2.0),
        ];
        rank_samples(&mut samples, &helt_only());
        let positions: Vec<i32> = samples.iter().map(|s| s.helt.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        // Sorted by aggregate.
        assert!(samples[0].helt.value < samples[1].helt.value);
    }

    #[test]
    fn test_ties_share_and_skip() {
        let mut samples = vec![
            sample_with_helt(1.0),
            sample_with_helt(1.0),
            sample_with_helt(2.0),
            sample_with_helt(3.0),
        ];
        rank_samples(&mut samples, &helt_only());
        let positions: Vec<i32> = samples.iter().map(|s| s.helt.position).collect();
        // 1, 1, then skip to 3, then 4.
        assert_eq!(positions, vec![1, 1, 3, 4]);
    }

    #[test]
    fn test_missing_criterion_excluded_from_aggregate() {
        let mut with = sample_with_helt(1.0);
        with.gntf.value = 5.0;
        with.gntf.position = 1;
        let without = sample_with_helt(2.0);
        let mut samples = vec![with, without];
        let criteria = CriteriaSet {
            cnd: false,
            homt: false,
            helt: true,
            gntf: true,
            vdtf: false,
        };
        rank_samples(&mut samples, &criteria);
        // First sample: helt pos 1, gntf pos 1 -> aggregate 1.
        // Second: helt pos 2, gntf missing -> aggregate 2.
        assert_eq!(samples[0].aggregate_position, 1.0);
        assert_eq!(samples[1].aggregate_position, 2.0);
        assert_eq!(samples[1].gntf.position, -1);
    }
}
