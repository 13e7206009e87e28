//! Exhaustive grid evaluation over the aspect sampler's pole positions.
//!
//! The grid search differs from the other minimizers: every admissible
//! triple is evaluated with the *full* analysis (criterion battery and all)
//! and every triple that survives the shape heuristic produces a Sample.
//! This module only supplies the walking skeleton; the driver's callback
//! performs the evaluation and collects the results.

use std::sync::atomic::AtomicBool;

use tracing::debug;

use super::cancelled;
use crate::error::Result;
use crate::sampler::PolePosition;

/// Walk every pole position, invoking the evaluation callback. The
/// callback returns the cost of the position, or `None` when the position
/// produced no sample. Returns `(best_index, best_cost, evaluated)`.
pub fn search(
    positions: &[PolePosition],
    eval: &mut dyn FnMut(&PolePosition) -> Result<Option<f64>>,
    cancel: Option<&AtomicBool>,
) -> Result<(Option<usize>, f64, u32)> {
    let mut best: Option<usize> = None;
    let mut best_cost = f64::MAX;
    let mut evaluated = 0u32;

    for (i, pos) in positions.iter().enumerate() {
        if cancelled(cancel) {
            break;
        }
        match eval(pos)? {
            Some(cost) => {
                evaluated += 1;
                if cost < best_cost {
                    best_cost = cost;
                    best = Some(i);
                }
            }
            None => continue,
        }
    }

    debug!(
        total = positions.len(),
        evaluated, best_cost, "grid search finished"
    );
    Ok((best, best_cost, evaluated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions() -> Vec<PolePosition> {
        (0..10)
            .map(|i| PolePosition {
                latp: 90.0,
                lonp: 0.0,
                lat0: i as f64 * 10.0,
                complexity: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_finds_best_cost() {
        let ps = positions();
        let mut eval = |p: &PolePosition| -> Result<Option<f64>> {
            Ok(Some((p.lat0 - 42.0).abs()))
        };
        let (best, cost, evaluated) = search(&ps, &mut eval, None).unwrap();
        assert_eq!(best, Some(4)); // lat0 = 40 is closest to 42
        assert_eq!(cost, 2.0);
        assert_eq!(evaluated, 10);
    }

    #[test]
    fn test_skipped_positions_do_not_count() {
        let ps = positions();
        let mut eval = |p: &PolePosition| -> Result<Option<f64>> {
            if p.lat0 < 50.0 {
                Ok(None)
            } else {
                Ok(Some(p.lat0))
            }
        };
        let (best, cost, evaluated) = search(&ps, &mut eval, None).unwrap();
        assert_eq!(best, Some(5));
        assert_eq!(cost, 50.0);
        assert_eq!(evaluated, 5);
    }
}
