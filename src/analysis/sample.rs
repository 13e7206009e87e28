//! The Sample record and the cartometric criterion battery.
//!
//! One sample is one (projection family, aspect, parameter) hypothesis with
//! every evaluated criterion. [`compute_one_sample`] runs the full pipeline
//! for a hypothesis: central-meridian reduction, singular-point removal,
//! forward projection, outlier rejection, the shape heuristic, and the
//! criterion battery with the optional one-shot rotation correction.

use tracing::debug;

use crate::align::{
    helmert_key, homothetic_key, irls_k_best, match_ratio_circle, match_ratio_tissot,
    remove_singular_points, residual_std_dev,
};
use crate::analysis::{AnalysisParams, MatchMethod};
use crate::error::{Error, Result};
use crate::geo::{mean_nn_distance, reduce_to_central_meridian, GeoPoint, PlanarPoint};
use crate::graticule::{correct_meridians_and_parallels, MeridianLine, ParallelLine};
use crate::projection::forward::project;
use crate::projection::tissot::{indicatrix, TissotIndicatrix};
use crate::projection::transform::to_aspect_frame;
use crate::projection::{Projection, ProjectionKind};
use crate::shape::{
    check_sample, polyline, turning_distance, CellShapeSource, RotationMode,
    MIN_BOUNDED_VORONOI_CELLS,
};

/// Two projected points closer than this (in paper units relative to the
/// set diameter) are duplicates and invalidate the sample.
const DUPLICATE_EPS: f64 = 1.0e-10;

/// Circle-match tolerance of the criterion battery, as a fraction of the
/// mean nearest-neighbour spacing.
const CRITERION_MATCH_FACTOR: f64 = 0.1;
/// Tissot-match ellipse scale of the criterion battery.
const TISSOT_MATCH_FACTOR: f64 = 0.5;

/// Ratio between the homothetic and the Helmert criterion above which the
/// rotation-correction pass fires.
pub const IMPROVE_RATIO_STD_DEV: f64 = 2.0;

/// One evaluated criterion: its value and its rank position after sorting
/// (−1 = not computed / not available).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criterion {
    pub value: f64,
    pub position: i32,
}

impl Default for Criterion {
    fn default() -> Self {
        Self {
            value: f64::MAX,
            position: -1,
        }
    }
}

impl Criterion {
    pub fn available(&self) -> bool {
        self.position >= 0
    }

    fn set(&mut self, value: f64) {
        self.value = value;
        self.position = 1;
    }

    fn unavailable(&mut self) {
        *self = Criterion::default();
    }
}

/// One (projection, aspect, parameter) hypothesis with all its criteria.
#[derive(Debug, Clone)]
pub struct Sample {
    pub kind: ProjectionKind,
    pub r: f64,
    pub latp: f64,
    pub lonp: f64,
    pub lat0: f64,
    pub lon0: f64,
    pub dx: f64,
    pub dy: f64,
    /// Rotation of the best similarity alignment, degrees.
    pub rotation: f64,
    /// Scale of the homothetic alignment.
    pub scale_homt: f64,
    /// Scale of the Helmert alignment.
    pub scale_helt: f64,

    /// Cross nearest-neighbour distance ratio.
    pub cross_nn: Criterion,
    /// Homothetic residual standard deviation.
    pub homt: Criterion,
    pub homt_percent_match: f64,
    pub homt_matched: Vec<usize>,
    /// Helmert residual standard deviation.
    pub helt: Criterion,
    pub helt_percent_match: f64,
    pub helt_matched: Vec<usize>,
    /// Graticule turning-function ratio.
    pub gntf: Criterion,
    /// Voronoi-cell turning-function ratio.
    pub vdtf: Criterion,

    /// Mean of the available criterion positions after ranking.
    pub aggregate_position: f64,

    /// Original indices of the points that survived singular removal.
    pub non_singular_indices: Vec<usize>,
    /// Indices (into the non-singular set) of the k-best points.
    pub k_best_indices: Vec<usize>,

    pub singular_points_found: bool,
    pub outliers_found: bool,
    pub rotated_sample: bool,
    pub is_target: bool,
}

impl Sample {
    pub fn new(proj: &Projection) -> Self {
        Self {
            kind: proj.kind,
            r: proj.r,
            latp: proj.latp,
            lonp: proj.lonp,
            lat0: proj.lat0,
            lon0: proj.lon0,
            dx: proj.dx,
            dy: proj.dy,
            rotation: 0.0,
            scale_homt: 1.0,
            scale_helt: 1.0,
            cross_nn: Criterion::default(),
            homt: Criterion::default(),
            homt_percent_match: 0.0,
            homt_matched: Vec::new(),
            helt: Criterion::default(),
            helt_percent_match: 0.0,
            helt_matched: Vec::new(),
            gntf: Criterion::default(),
            vdtf: Criterion::default(),
            aggregate_position: f64::MAX,
            non_singular_indices: Vec::new(),
            k_best_indices: Vec::new(),
            singular_points_found: false,
            outliers_found: false,
            rotated_sample: false,
            is_target: false,
        }
    }

    /// Sum of the enabled, available criterion values; `f64::MAX` when
    /// nothing was computable.
    pub fn cost(&self, criteria: &CriteriaSet) -> f64 {
        let mut sum = 0.0;
        let mut any = false;
        for (enabled, crit) in [
            (criteria.cnd, &self.cross_nn),
            (criteria.homt, &self.homt),
            (criteria.helt, &self.helt),
            (criteria.gntf, &self.gntf),
            (criteria.vdtf, &self.vdtf),
        ] {
            if enabled && crit.available() {
                sum += crit.value;
                any = true;
            }
        }
        if any {
            sum
        } else {
            f64::MAX
        }
    }
}

/// Which criteria the battery evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriteriaSet {
    /// Cross nearest-neighbour distance.
    pub cnd: bool,
    /// Homothetic transformation residual.
    pub homt: bool,
    /// Helmert transformation residual.
    pub helt: bool,
    /// Graticule turning function.
    pub gntf: bool,
    /// Voronoi-cell turning function.
    pub vdtf: bool,
}

impl Default for CriteriaSet {
    fn default() -> Self {
        Self {
            cnd: true,
            homt: true,
            helt: true,
            gntf: true,
            vdtf: true,
        }
    }
}

impl CriteriaSet {
    /// Only the Helmert criterion: the cheap similarity-only pass used to
    /// seed the radius estimate.
    pub fn helmert_only() -> Self {
        Self {
            cnd: false,
            homt: false,
            helt: true,
            gntf: false,
            vdtf: false,
        }
    }
}

// ── Criterion battery ───────────────────────────────────────────────────────

fn tissots_for(projected_aspect: &[(f64, f64)], proj: &Projection) -> Vec<TissotIndicatrix> {
    projected_aspect
        .iter()
        .map(|&(lat_t, lon_t)| indicatrix(lat_t, lon_t, proj))
        .collect()
}

/// Helmert criterion: residual standard deviation of the best similarity
/// plus the point-match percentage.
fn analyze_helmert(
    sample: &mut Sample,
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
    tissots: &[TissotIndicatrix],
    match_method: MatchMethod,
    mult_ratio: f64,
) {
    let weights = vec![1.0; test.len()];
    let result = (|| -> Result<()> {
        let key = helmert_key(test, projected, &weights)?;
        let transformed: Vec<PlanarPoint> = test.iter().map(|p| key.apply(p)).collect();
        let std_dev = residual_std_dev(projected, &transformed, &weights);

        let unit = mean_nn_distance(projected);
        let (percent, matched) = match match_method {
            MatchMethod::Circle => {
                match_ratio_circle(projected, &transformed, CRITERION_MATCH_FACTOR * unit)
            }
            MatchMethod::Tissot => {
                match_ratio_tissot(projected, &transformed, tissots, TISSOT_MATCH_FACTOR, unit)
            }
        };

        sample.helt.set(mult_ratio * std_dev);
        sample.helt_percent_match = percent;
        sample.helt_matched = matched;
        let scale = key.scale();
        sample.scale_helt = scale;
        sample.rotation = key.rotation_deg();
        if scale > 0.0 {
            sample.dx = key.x_mass_src - key.x_mass_dst / scale;
            sample.dy = key.y_mass_src - key.y_mass_dst / scale;
        }
        Ok(())
    })();
    if result.is_err() {
        sample.helt.unavailable();
        sample.helt_percent_match = 0.0;
    }
}

/// Homothetic criterion: as the Helmert one but with rotation pinned.
fn analyze_homothetic(
    sample: &mut Sample,
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
    tissots: &[TissotIndicatrix],
    match_method: MatchMethod,
    mult_ratio: f64,
) {
    let weights = vec![1.0; test.len()];
    let result = (|| -> Result<()> {
        let key = homothetic_key(test, projected, &weights)?;
        let transformed: Vec<PlanarPoint> = test.iter().map(|p| key.apply(p)).collect();
        let std_dev = residual_std_dev(projected, &transformed, &weights);

        let unit = mean_nn_distance(projected);
        let (percent, matched) = match match_method {
            MatchMethod::Circle => {
                match_ratio_circle(projected, &transformed, CRITERION_MATCH_FACTOR * unit)
            }
            MatchMethod::Tissot => {
                match_ratio_tissot(projected, &transformed, tissots, TISSOT_MATCH_FACTOR, unit)
            }
        };

        sample.homt.set(mult_ratio * std_dev);
        sample.homt_percent_match = percent;
        sample.homt_matched = matched;
        sample.scale_homt = key.c;
        Ok(())
    })();
    if result.is_err() {
        sample.homt.unavailable();
        sample.homt_percent_match = 0.0;
    }
}

/// Mean nearest-neighbour distance between two sets, taken both ways.
fn cross_nn_distance(a: &[PlanarPoint], b: &[PlanarPoint]) -> f64 {
    let one_way = |from: &[PlanarPoint], to: &[PlanarPoint]| -> f64 {
        from.iter()
            .map(|p| {
                to.iter()
                    .map(|q| p.dist(q))
                    .fold(f64::MAX, f64::min)
            })
            .sum::<f64>()
            / from.len() as f64
    };
    0.5 * (one_way(a, b) + one_way(b, a))
}

/// Cross nearest-neighbour criterion on the homothetically aligned sets.
fn analyze_cross_nn(
    sample: &mut Sample,
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
    mult_ratio: f64,
) {
    let weights = vec![1.0; test.len()];
    match homothetic_key(test, projected, &weights) {
        Ok(key) => {
            let transformed: Vec<PlanarPoint> = test.iter().map(|p| key.apply(p)).collect();
            sample
                .cross_nn
                .set(mult_ratio * cross_nn_distance(projected, &transformed));
        }
        Err(_) => sample.cross_nn.unavailable(),
    }
}

/// Graticule turning-function criterion: summed rotation-dependent
/// distances over every meridian and parallel.
fn analyze_graticule_tf(
    sample: &mut Sample,
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
    meridians: &[MeridianLine],
    parallels: &[ParallelLine],
    mult_ratio: f64,
) {
    if meridians.is_empty() && parallels.is_empty() {
        sample.gntf.unavailable();
        return;
    }
    let run = || -> Result<f64> {
        let mut sum = 0.0;
        for m in meridians {
            let a = polyline(test, &m.point_indices);
            let b = polyline(projected, &m.point_indices);
            sum += turning_distance(&a, &b, RotationMode::Dependent)?;
        }
        for p in parallels {
            let a = polyline(test, &p.point_indices);
            let b = polyline(projected, &p.point_indices);
            sum += turning_distance(&a, &b, RotationMode::Dependent)?;
        }
        Ok(sum)
    };
    match run() {
        Ok(sum) => sample.gntf.set(mult_ratio * sum),
        Err(_) => sample.gntf.unavailable(),
    }
}

/// Voronoi-cell turning-function criterion through the narrow cell-shape
/// interface; unavailable without a source or with too few bounded pairs.
fn analyze_voronoi_tf(
    sample: &mut Sample,
    test: &[PlanarPoint],
    projected: &[PlanarPoint],
    cells: Option<&dyn CellShapeSource>,
    mult_ratio: f64,
) {
    let Some(source) = cells else {
        sample.vdtf.unavailable();
        return;
    };
    let cells_test = source.merged_cells(test);
    let cells_proj = source.merged_cells(projected);

    let mut pairs = 0usize;
    let mut sum = 0.0;
    for (ct, cp) in cells_test.iter().zip(&cells_proj) {
        if let (Some(a), Some(b)) = (ct, cp) {
            if let Ok(d) = turning_distance(a, b, RotationMode::Dependent) {
                sum += d;
                pairs += 1;
            }
        }
    }

    if pairs < MIN_BOUNDED_VORONOI_CELLS {
        debug!(pairs, "too few bounded Voronoi cell pairs");
        sample.vdtf.unavailable();
        return;
    }
    sample.vdtf.set(mult_ratio * (sum / pairs as f64).sqrt());
}

// ── Full pipeline for one hypothesis ────────────────────────────────────────

/// Outcome of evaluating one hypothesis.
pub enum SampleOutcome {
    /// The sample passed the shape heuristic; its cost is attached.
    Accepted(Box<Sample>, f64),
    /// The shape heuristic pruned the hypothesis.
    Rejected,
}

/// Run the complete cartometric analysis for one projection hypothesis.
///
/// Errors are per-sample failures (§7): no usable points, duplicate
/// projected coordinates, singular alignment geometry.
pub fn compute_one_sample(
    test: &[PlanarPoint],
    reference: &[GeoPoint],
    meridians: &[MeridianLine],
    parallels: &[ParallelLine],
    proj: &Projection,
    params: &AnalysisParams,
    cells: Option<&dyn CellShapeSource>,
) -> Result<SampleOutcome> {
    if test.is_empty() || test.len() != reference.len() {
        return Err(Error::BadData(format!(
            "test/reference size mismatch: {} vs {}",
            test.len(),
            reference.len()
        )));
    }

    // Central-meridian reduction; projection then works with lon0 = 0.
    let (reference_red, mut work) = if proj.lon0 != 0.0 {
        let red = reduce_to_central_meridian(reference, proj.lon0);
        let mut w = *proj;
        w.lon0 = 0.0;
        (red, w)
    } else {
        (reference.to_vec(), *proj)
    };
    work.dx = 0.0;
    work.dy = 0.0;

    // Singular-point removal relative to the cartographic pole.
    let (test_ns, ref_ns, ns_pairs) =
        remove_singular_points(test, &reference_red, work.latp, work.lonp);
    let n_nsing = test_ns.len();
    if n_nsing < 3 {
        return Err(Error::BadData(
            "fewer than three non-singular points".into(),
        ));
    }
    let singular_points_found = n_nsing != test.len();

    let mut meridians_ns = meridians.to_vec();
    let mut parallels_ns = parallels.to_vec();
    if singular_points_found {
        correct_meridians_and_parallels(&mut meridians_ns, &mut parallels_ns, &ns_pairs);
    }

    let mut sample = Sample::new(proj);
    sample.singular_points_found = singular_points_found;
    sample.non_singular_indices = ns_pairs.iter().map(|&(old, _)| old).collect();

    // Forward-project the surviving reference points; keep the transformed
    // coordinates around for the Tissot indicatrices.
    let mut projected = Vec::with_capacity(n_nsing);
    let mut aspect_coords = Vec::with_capacity(n_nsing);
    for g in &ref_ns {
        let p = project(g, &work)?;
        projected.push(p);
        aspect_coords.push(to_aspect_frame(
            g.lat,
            g.lon,
            work.latp,
            work.lonp,
            work.kind.lon_direction(),
        ));
    }

    // Duplicate projected coordinates flatten the sample's geometry.
    let diameter = projected
        .iter()
        .flat_map(|p| projected.iter().map(move |q| p.dist(q)))
        .fold(0.0f64, f64::max);
    for i in 0..projected.len() {
        for j in (i + 1)..projected.len() {
            if projected[i].dist(&projected[j]) <= DUPLICATE_EPS * diameter.max(1.0) {
                return Err(Error::BadData(
                    "two reference points project to the same position".into(),
                ));
            }
        }
    }

    // Outlier rejection on the aligned pair lists.
    let mut test_best = test_ns.clone();
    let mut projected_best = projected.clone();
    let mut meridians_best = meridians_ns.clone();
    let mut parallels_best = parallels_ns.clone();
    let mut k_best: Vec<usize> = (0..n_nsing).collect();

    if params.remove_outliers {
        let (_, pairs) = irls_k_best(&test_ns, &projected)?;
        if pairs.len() != n_nsing {
            sample.outliers_found = true;
            test_best = pairs.iter().map(|&(old, _)| test_ns[old]).collect();
            projected_best = pairs.iter().map(|&(old, _)| projected[old]).collect();
            correct_meridians_and_parallels(&mut meridians_best, &mut parallels_best, &pairs);
            k_best = pairs.iter().map(|&(old, _)| old).collect();
        }
    }
    sample.k_best_indices = k_best;
    let n_best = test_best.len();

    // Shape heuristic: prune before the expensive battery.
    if params.perform_heuristic {
        let report = check_sample(
            &meridians_best,
            &parallels_best,
            &test_best,
            &projected_best,
            params.heuristic_sensitivity,
        )?;
        if !report.accepted() {
            debug!(?report, kind = %proj.kind, "sample pruned by shape heuristic");
            return Ok(SampleOutcome::Rejected);
        }
    }

    // Criterion weighting: samples that lost points must not win on the
    // easier residual.
    let mult_ratio = 2.0 - n_best as f64 / n_nsing as f64;

    // Indicatrices follow the k-best subset so that match indices line up.
    let tissots = if params.match_method == MatchMethod::Tissot {
        let best_coords: Vec<(f64, f64)> = sample
            .k_best_indices
            .iter()
            .map(|&i| aspect_coords[i])
            .collect();
        tissots_for(&best_coords, &work)
    } else {
        Vec::new()
    };

    if params.criteria.helt {
        analyze_helmert(
            &mut sample,
            &test_best,
            &projected_best,
            &tissots,
            params.match_method,
            mult_ratio,
        );
    }

    // The remaining criteria run once, plus once more on rotation-corrected
    // test points when the correction triggers.
    let mut current_test = test_best.clone();
    for pass in 0..2 {
        if params.criteria.homt {
            analyze_homothetic(
                &mut sample,
                &current_test,
                &projected_best,
                &tissots,
                params.match_method,
                mult_ratio,
            );
        }
        if params.criteria.cnd {
            analyze_cross_nn(&mut sample, &current_test, &projected_best, mult_ratio);
        }
        if params.criteria.gntf {
            analyze_graticule_tf(
                &mut sample,
                &current_test,
                &projected_best,
                &meridians_best,
                &parallels_best,
                mult_ratio,
            );
        }
        if params.criteria.vdtf {
            analyze_voronoi_tf(&mut sample, &current_test, &projected_best, cells, mult_ratio);
        }

        // Rotation correction: a near-quarter-turn alignment whose Helmert
        // fit beats the homothetic one by a wide margin gets one re-run on
        // back-rotated test points.
        let rot = sample.rotation;
        let near_right_angle = (rot.abs() + crate::shape::heuristic::REM_DIV_ROT_ANGLE)
            .rem_euclid(90.0)
            < 2.0 * crate::shape::heuristic::REM_DIV_ROT_ANGLE
            && rot.abs() > 90.0 - crate::shape::heuristic::REM_DIV_ROT_ANGLE;
        let improves = sample.helt.available()
            && sample.homt.available()
            && IMPROVE_RATIO_STD_DEV * sample.helt.value < sample.homt.value;

        if pass == 0
            && params.correct_rotation
            && near_right_angle
            && improves
            && !sample.rotated_sample
        {
            let (s, c) = (rot.to_radians().sin(), rot.to_radians().cos());
            current_test = test_best
                .iter()
                .map(|p| PlanarPoint::new(c * p.x - s * p.y, s * p.x + c * p.y))
                .collect();
            sample.rotated_sample = true;
            debug!(rotation = rot, "re-running criteria on rotation-corrected sample");
        } else {
            break;
        }
    }

    let cost = sample.cost(&params.criteria);
    Ok(SampleOutcome::Accepted(Box::new(sample), cost))
}
