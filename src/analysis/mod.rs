//! The analysis driver: runs the selected optimizer over every candidate
//! projection family and aspect and collects the ranked Sample list.
//!
//! Per-family flow:
//! 1. an optional *target* hypothesis is evaluated at its published
//!    parameters and emitted with `is_target`,
//! 2. a similarity-only pass seeds the sphere radius,
//! 3. each enabled aspect builds its parameter box (optionally shrunk by
//!    the data-driven heuristic) and runs the optimizer,
//! 4. results outside the family's admissible intervals are discarded,
//! 5. surviving Samples are ranked per criterion and by aggregate rank.
//!
//! The core is single-threaded; a caller wanting parallelism can run one
//! driver per family and concatenate the Sample lists.

pub mod rank;
pub mod report;
pub mod sample;

use std::sync::atomic::AtomicBool;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geo::{geographic_extent, GeoPoint, Interval, PlanarPoint, MAX_LAT, MIN_LON};
use crate::graticule::{MeridianLine, ParallelLine};
use crate::optimize::de::DeConfig;
use crate::optimize::nls::NlsConfig;
use crate::optimize::simplex::SimplexConfig;
use crate::optimize::{grid, OptimizerKind};
use crate::projection::{Aspect, Projection};
use crate::residual::{ResidualFunctor, IX_R, PARAM_DIM};
use crate::sampler::{enumerate_pole_positions, heuristic_intervals};
use crate::shape::CellShapeSource;

pub use sample::{compute_one_sample, CriteriaSet, Criterion, Sample, SampleOutcome};

/// How the point-match percentage is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMethod {
    /// Fixed-radius circle around each point.
    #[default]
    Circle,
    /// Per-point Tissot distortion ellipse.
    Tissot,
}

/// Everything the caller can configure about one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisParams {
    pub optimizer: OptimizerKind,
    pub analyze_normal: bool,
    pub analyze_transverse: bool,
    pub analyze_oblique: bool,
    /// Prune hypotheses by graticule shape and restrict pole intervals from
    /// the data extent.
    pub perform_heuristic: bool,
    /// Scales every heuristic tolerance.
    pub heuristic_sensitivity: f64,
    /// Grid-search steps, degrees.
    pub lat0_step: f64,
    pub latp_step: f64,
    pub lonp_step: f64,
    pub remove_outliers: bool,
    pub correct_rotation: bool,
    pub match_method: MatchMethod,
    /// Log contained per-sample failures.
    pub print_exceptions: bool,
    /// Rows in the printed report.
    pub printed_results: usize,
    pub criteria: CriteriaSet,
    /// Pre-specified target hypotheses, evaluated before the search.
    pub analyzed_projections: Vec<Projection>,
    /// Seed for every stochastic optimizer in this analysis.
    pub seed: u64,
    pub simplex: SimplexConfig,
    pub de: DeConfig,
    pub nls: NlsConfig,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::GridSearch,
            analyze_normal: true,
            analyze_transverse: true,
            analyze_oblique: false,
            perform_heuristic: true,
            heuristic_sensitivity: 1.0,
            lat0_step: 10.0,
            latp_step: 10.0,
            lonp_step: 10.0,
            remove_outliers: false,
            correct_rotation: false,
            match_method: MatchMethod::Circle,
            print_exceptions: false,
            printed_results: 20,
            criteria: CriteriaSet::default(),
            analyzed_projections: Vec::new(),
            seed: 0,
            simplex: SimplexConfig::default(),
            de: DeConfig::default(),
            nls: NlsConfig::default(),
        }
    }
}

/// One analysis run over a fixed control-point set.
pub struct CartAnalysis<'a> {
    pub test: &'a [PlanarPoint],
    pub reference: &'a [GeoPoint],
    pub meridians: &'a [MeridianLine],
    pub parallels: &'a [ParallelLine],
    pub cells: Option<&'a dyn CellShapeSource>,
    pub params: AnalysisParams,
    /// Checked once per optimizer iteration / generation.
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> CartAnalysis<'a> {
    /// Analyze every candidate projection and return the ranked samples.
    pub fn run(&self, candidates: &[Projection]) -> Result<Vec<Sample>> {
        if self.test.is_empty() {
            return Err(Error::BadData("no test points".into()));
        }
        if self.test.len() != self.reference.len() {
            return Err(Error::BadData(format!(
                "test and reference sets differ: {} vs {}",
                self.test.len(),
                self.reference.len()
            )));
        }

        let mut samples: Vec<Sample> = Vec::new();
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        // Target hypotheses first.
        if !self.params.analyzed_projections.is_empty() {
            let mut any_target = false;
            for target in &self.params.analyzed_projections {
                match compute_one_sample(
                    self.test,
                    self.reference,
                    self.meridians,
                    self.parallels,
                    target,
                    &self.params,
                    self.cells,
                ) {
                    Ok(SampleOutcome::Accepted(mut s, _)) => {
                        s.is_target = true;
                        samples.push(*s);
                        any_target = true;
                    }
                    Ok(SampleOutcome::Rejected) => {
                        debug!(kind = %target.kind, "target hypothesis pruned by heuristic");
                    }
                    Err(err) => {
                        if self.params.print_exceptions {
                            debug!(kind = %target.kind, %err, "target hypothesis failed");
                        }
                    }
                }
            }
            if !any_target {
                return Err(Error::BadData(
                    "no analyzed projection survived; analysis stopped".into(),
                ));
            }
        }

        // Candidate families.
        for candidate in candidates {
            if let Err(err) = self.run_family(candidate, &mut samples, &mut rng) {
                // A family failure aborts that family only.
                info!(kind = %candidate.kind, %err, "family analysis aborted");
            }
        }

        rank::rank_samples(&mut samples, &self.params.criteria);
        Ok(samples)
    }

    /// Similarity-only pass at the catalog parameters: the Helmert scale of
    /// an exact hypothesis ties the drawing units to the sphere radius.
    fn initial_radius(&self, candidate: &Projection) -> f64 {
        let mut params = self.params.clone();
        params.criteria = CriteriaSet::helmert_only();
        params.perform_heuristic = false;
        params.remove_outliers = false;
        match compute_one_sample(
            self.test,
            self.reference,
            self.meridians,
            self.parallels,
            candidate,
            &params,
            None,
        ) {
            Ok(SampleOutcome::Accepted(s, _)) if s.scale_helt > 0.0 => {
                candidate.r / s.scale_helt
            }
            _ => candidate.r,
        }
    }

    fn run_family(
        &self,
        candidate: &Projection,
        samples: &mut Vec<Sample>,
        rng: &mut StdRng,
    ) -> Result<()> {
        let kind = candidate.kind;
        info!(family = %kind, "analyzing projection family");

        let r_init = self.initial_radius(candidate);
        debug!(family = %kind, r_init, "initial radius from similarity pass");

        let aspects = [
            (self.params.analyze_normal, Aspect::Normal),
            (self.params.analyze_transverse, Aspect::Transverse),
            (self.params.analyze_oblique, Aspect::Oblique),
        ];

        for (enabled, aspect) in aspects {
            if !enabled || !kind.supports_aspect(aspect) {
                continue;
            }
            match self.params.optimizer {
                OptimizerKind::GridSearch => {
                    self.run_grid(candidate, aspect, r_init, samples)?;
                }
                _ => {
                    self.run_parametric(candidate, aspect, r_init, samples, rng)?;
                }
            }
        }
        Ok(())
    }

    /// Grid search: full analysis at every admissible pole position.
    fn run_grid(
        &self,
        candidate: &Projection,
        aspect: Aspect,
        r_init: f64,
        samples: &mut Vec<Sample>,
    ) -> Result<()> {
        let kind = candidate.kind;
        let positions = enumerate_pole_positions(
            self.reference,
            kind,
            r_init,
            aspect,
            self.params.latp_step,
            self.params.lonp_step,
            self.params.lat0_step,
            self.params.perform_heuristic,
        )?;

        let mut eval = |pos: &crate::sampler::PolePosition| -> Result<Option<f64>> {
            let proj = Projection {
                kind,
                r: r_init,
                latp: pos.latp,
                lonp: pos.lonp,
                lat0: pos.lat0,
                lon0: 0.0,
                c: candidate.c,
                dx: 0.0,
                dy: 0.0,
            };
            match compute_one_sample(
                self.test,
                self.reference,
                self.meridians,
                self.parallels,
                &proj,
                &self.params,
                self.cells,
            ) {
                Ok(SampleOutcome::Accepted(mut s, cost)) => {
                    // The Helmert scale refines the gridded radius.
                    s.r = r_init / s.scale_helt.max(f64::MIN_POSITIVE);
                    samples.push(*s);
                    Ok(Some(cost))
                }
                Ok(SampleOutcome::Rejected) => Ok(None),
                Err(err) => {
                    if self.params.print_exceptions {
                        debug!(
                            family = %kind, latp = pos.latp, lonp = pos.lonp,
                            lat0 = pos.lat0, %err, "grid position discarded"
                        );
                    }
                    Ok(None)
                }
            }
        };
        grid::search(&positions, &mut eval, self.cancel)?;
        Ok(())
    }

    /// Parameter box of one aspect; a wrapped lonp interval yields two runs.
    fn parameter_boxes(
        &self,
        candidate: &Projection,
        aspect: Aspect,
        r_init: f64,
    ) -> Result<Vec<(DVector<f64>, DVector<f64>)>> {
        let kind = candidate.kind;
        let lat0_iv = kind.lat0_interval();
        let (_, lon_extent) = geographic_extent(self.reference)?;
        let (latp_heur, lonp_heur) = if self.params.perform_heuristic {
            heuristic_intervals(self.reference, kind)?
        } else {
            (kind.latp_interval(), kind.lonp_interval())
        };

        let r_lo = 0.1 * r_init;
        let r_hi = 10.0 * r_init;

        let make = |latp: Interval, lonp: Interval, lon0: Interval| {
            (
                DVector::from_vec(vec![r_lo, latp.min, lonp.min, lat0_iv.min, lon0.min]),
                DVector::from_vec(vec![r_hi, latp.max, lonp.max, lat0_iv.max, lon0.max]),
            )
        };

        // Split a wrapped interval (min > max crosses the antimeridian).
        let split = |iv: Interval| -> Vec<Interval> {
            if iv.min <= iv.max {
                vec![iv]
            } else {
                vec![
                    Interval::new(MIN_LON, iv.max),
                    Interval::new(iv.min, -MIN_LON),
                ]
            }
        };

        let boxes = match aspect {
            Aspect::Normal => {
                let pole = Interval::new(MAX_LAT, MAX_LAT);
                let lon0 = Interval::new(lon_extent.min, lon_extent.max);
                vec![make(pole, Interval::new(0.0, 0.0), lon0)]
            }
            Aspect::Transverse => split(lonp_heur)
                .into_iter()
                .map(|lonp| make(Interval::new(0.0, 0.0), lonp, Interval::new(0.0, 0.0)))
                .collect(),
            Aspect::Oblique => split(lonp_heur)
                .into_iter()
                .map(|lonp| make(latp_heur, lonp, Interval::new(0.0, 0.0)))
                .collect(),
        };
        Ok(boxes)
    }

    /// Simplex / DE / least-squares run over the residual functor.
    fn run_parametric(
        &self,
        candidate: &Projection,
        aspect: Aspect,
        r_init: f64,
        samples: &mut Vec<Sample>,
        rng: &mut StdRng,
    ) -> Result<()> {
        use crate::optimize::{de, nls, simplex};

        let kind = candidate.kind;
        let m = self.test.len();
        let functor = ResidualFunctor {
            test: self.test,
            reference: self.reference,
            meridians: self.meridians,
            parallels: self.parallels,
            kind,
            c: candidate.c,
            aspect,
            params: &self.params,
            cells: self.cells,
        };

        for (lo, hi) in self.parameter_boxes(candidate, aspect, r_init)? {
            let mut scratch = Sample::new(candidate);
            let mut v = DVector::zeros(2 * m);
            let mut w = DVector::from_element(2 * m, 1.0);

            let outcome = match self.params.optimizer {
                OptimizerKind::Simplex => {
                    let mut cost = |x: &mut DVector<f64>| -> f64 {
                        match functor.evaluate(x, &mut v, &mut w, false, &mut scratch) {
                            Ok(()) => ResidualFunctor::cost(&v, &w),
                            Err(_) => f64::MAX,
                        }
                    };
                    let config = if aspect == Aspect::Oblique {
                        SimplexConfig {
                            eps: self.params.simplex.eps.max(1.0e-8),
                            ..self.params.simplex.clone()
                        }
                    } else {
                        self.params.simplex.clone()
                    };
                    simplex::minimize(&mut cost, &lo, &hi, &config, rng, self.cancel)?
                }
                OptimizerKind::DifferentialEvolution => {
                    let mut cost = |x: &mut DVector<f64>| -> f64 {
                        match functor.evaluate(x, &mut v, &mut w, false, &mut scratch) {
                            Ok(()) => ResidualFunctor::cost(&v, &w),
                            Err(_) => f64::MAX,
                        }
                    };
                    de::minimize(&mut cost, &lo, &hi, &self.params.de, rng, self.cancel)?
                }
                OptimizerKind::LeastSquares => {
                    let mut residual = |x: &mut DVector<f64>,
                                        v: &mut DVector<f64>,
                                        w: &mut DVector<f64>|
                     -> Result<()> {
                        functor.evaluate(x, v, w, false, &mut scratch)
                    };
                    // Start from the box centre with the similarity radius.
                    let mut x0 = DVector::zeros(PARAM_DIM);
                    for j in 0..PARAM_DIM {
                        x0[j] = 0.5 * (lo[j] + hi[j]);
                    }
                    x0[IX_R] = r_init;
                    nls::minimize(
                        &mut residual,
                        &x0,
                        &mut w,
                        2 * m,
                        &self.params.nls,
                        self.cancel,
                    )?
                }
                OptimizerKind::GridSearch => unreachable!("grid search handled separately"),
            };

            debug!(
                family = %kind, %aspect,
                cost = outcome.cost, iterations = outcome.iterations,
                "optimizer finished"
            );

            // Full battery at the optimum.
            let mut x_best = outcome.x;
            functor.sanitize(&mut x_best);
            let proj_best = functor.instance(&x_best);

            // Containment post-filter against the family intervals.
            if !kind.lat0_interval().contains(proj_best.lat0)
                || !kind.latp_interval().contains(proj_best.latp)
                || !kind.lonp_interval().contains(proj_best.lonp)
            {
                debug!(family = %kind, %aspect, "optimum outside family intervals, discarded");
                continue;
            }

            match compute_one_sample(
                self.test,
                self.reference,
                self.meridians,
                self.parallels,
                &proj_best,
                &self.params,
                self.cells,
            ) {
                Ok(SampleOutcome::Accepted(mut s, _)) => {
                    s.r = proj_best.r / s.scale_helt.max(f64::MIN_POSITIVE);
                    samples.push(*s);
                }
                Ok(SampleOutcome::Rejected) => {
                    debug!(family = %kind, %aspect, "optimum pruned by shape heuristic");
                }
                Err(err) => {
                    if self.params.print_exceptions {
                        debug!(family = %kind, %aspect, %err, "optimum discarded");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::forward::project;
    use crate::projection::ProjectionKind;

    #[test]
    fn test_empty_input_is_bad_data() {
        let analysis = CartAnalysis {
            test: &[],
            reference: &[],
            meridians: &[],
            parallels: &[],
            cells: None,
            params: AnalysisParams::default(),
            cancel: None,
        };
        assert!(matches!(
            analysis.run(&[]),
            Err(Error::BadData(_))
        ));
    }

    #[test]
    fn test_mismatched_sets_are_bad_data() {
        let test = vec![PlanarPoint::new(0.0, 0.0); 4];
        let reference = vec![GeoPoint::new(0.0, 0.0); 3];
        let analysis = CartAnalysis {
            test: &test,
            reference: &reference,
            meridians: &[],
            parallels: &[],
            cells: None,
            params: AnalysisParams::default(),
            cancel: None,
        };
        assert!(analysis.run(&[]).is_err());
    }

    #[test]
    fn test_target_projection_marked() {
        let reference: Vec<GeoPoint> = [
            (0.0, 0.0),
            (0.0, 20.0),
            (20.0, 0.0),
            (20.0, 20.0),
            (35.0, 10.0),
        ]
        .iter()
        .map(|&(lat, lon)| GeoPoint::new(lat, lon))
        .collect();
        let truth = Projection {
            lat0: 0.0,
            ..Projection::normal(ProjectionKind::Equirectangular, 10.0)
        };
        let test: Vec<PlanarPoint> =
            reference.iter().map(|g| project(g, &truth).unwrap()).collect();
        let params = AnalysisParams {
            analyzed_projections: vec![truth],
            perform_heuristic: false,
            ..AnalysisParams::default()
        };
        let analysis = CartAnalysis {
            test: &test,
            reference: &reference,
            meridians: &[],
            parallels: &[],
            cells: None,
            params,
            cancel: None,
        };
        let samples = analysis.run(&[]).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].is_target);
        assert!(samples[0].helt.value < 1.0e-9);
    }
}
