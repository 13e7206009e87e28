//! Human-readable tabular report of an analysis.
//!
//! Four tables on a caller-provided sink: criterion values, criterion
//! positions, the analyzed and reference points, and the per-sample scale /
//! rotation / matched-point details. When target projections were
//! specified, only their rows are printed in the per-sample tables.

use std::io::{self, Write};

use super::sample::{Criterion, Sample};
use super::{AnalysisParams, MatchMethod};
use crate::geo::{GeoPoint, PlanarPoint};

fn fmt_criterion(c: &Criterion) -> String {
    if c.available() {
        format!("{:9.3}", c.value)
    } else {
        format!("{:>9}", "-")
    }
}

fn fmt_position(c: &Criterion) -> String {
    if c.available() {
        format!("{:6}", c.position)
    } else {
        format!("{:>6}", "-")
    }
}

fn rows_to_print(samples: &[Sample], params: &AnalysisParams) -> Vec<usize> {
    if params.analyzed_projections.is_empty() {
        (0..samples.len().min(params.printed_results)).collect()
    } else {
        (0..samples.len()).filter(|&i| samples[i].is_target).collect()
    }
}

/// Write the full report.
pub fn write_report(
    sink: &mut dyn Write,
    samples: &[Sample],
    test: &[PlanarPoint],
    reference: &[GeoPoint],
    params: &AnalysisParams,
) -> io::Result<()> {
    let match_label = match params.match_method {
        MatchMethod::Circle => "MC",
        MatchMethod::Tissot => "MT",
    };

    // Table 1: criterion values.
    writeln!(sink, "Results containing values of the criteria:")?;
    writeln!(sink)?;
    writeln!(
        sink,
        "{:>4} {:>8} {:>6} {:>7} {:>8} {:>7} {:>8} {:>10} {:>9} {:>9} {:>4} {:>9} {:>4} {:>9} {:>9}",
        "#", "Proj", "Categ", "latP", "lonP", "lat0", "lon0", "R", "CND",
        "HOMT", match_label, "HELT", match_label, "GNTF", "VDTF"
    )?;
    for (row, &i) in rows_to_print(samples, params).iter().enumerate() {
        let s = &samples[i];
        writeln!(
            sink,
            "{:>4} {:>8} {:>6} {:>7.2} {:>8.2} {:>7.2} {:>8.2} {:>10.3} {} {} {:>4.0} {} {:>4.0} {} {}{}",
            row + 1,
            s.kind.name(),
            s.kind.category().to_string(),
            s.latp,
            s.lonp,
            s.lat0,
            s.lon0,
            s.r,
            fmt_criterion(&s.cross_nn),
            fmt_criterion(&s.homt),
            s.homt_percent_match,
            fmt_criterion(&s.helt),
            s.helt_percent_match,
            fmt_criterion(&s.gntf),
            fmt_criterion(&s.vdtf),
            if s.rotated_sample { " *" } else { "" },
        )?;
    }

    // Table 2: criterion positions.
    writeln!(sink)?;
    writeln!(sink, "Results containing positions of the criteria:")?;
    writeln!(sink)?;
    writeln!(
        sink,
        "{:>4} {:>8} {:>6} {:>7} {:>8} {:>7} {:>8} {:>6} {:>6} {:>6} {:>6} {:>6} {:>7}",
        "#", "Proj", "Categ", "latP", "lonP", "lat0", "lon0", "CND", "HOMT", "HELT", "GNTF",
        "VDTF", "AGGR"
    )?;
    for (row, &i) in rows_to_print(samples, params).iter().enumerate() {
        let s = &samples[i];
        writeln!(
            sink,
            "{:>4} {:>8} {:>6} {:>7.2} {:>8.2} {:>7.2} {:>8.2} {} {} {} {} {} {:>7.2}",
            row + 1,
            s.kind.name(),
            s.kind.category().to_string(),
            s.latp,
            s.lonp,
            s.lat0,
            s.lon0,
            fmt_position(&s.cross_nn),
            fmt_position(&s.homt),
            fmt_position(&s.helt),
            fmt_position(&s.gntf),
            fmt_position(&s.vdtf),
            if s.aggregate_position < f64::MAX {
                s.aggregate_position
            } else {
                -1.0
            },
        )?;
    }
    writeln!(sink)?;
    writeln!(
        sink,
        "  ( * sample with additionally corrected rotation )"
    )?;

    // Table 3: the control points.
    writeln!(sink)?;
    writeln!(sink, "Analyzed and reference points:")?;
    writeln!(sink)?;
    writeln!(
        sink,
        "{:>3} {:>15} {:>15} {:>13} {:>13}",
        "#", "X_test", "Y_test", "Lat_ref", "Lon_ref"
    )?;
    for (i, (t, g)) in test.iter().zip(reference.iter()).enumerate() {
        writeln!(
            sink,
            "{:>3} {:>15.3} {:>15.3} {:>13.5} {:>13.5}",
            i, t.x, t.y, g.lat, g.lon
        )?;
    }

    // Table 4: scale, rotation and matched points per sample.
    writeln!(sink)?;
    writeln!(sink, "Scale, rotation and matched points for each sample:")?;
    writeln!(sink)?;
    for (row, &i) in rows_to_print(samples, params).iter().enumerate() {
        let s = &samples[i];
        writeln!(
            sink,
            "#{:<3} {:>8}  scale(helmert) = {:.6}  scale(homothetic) = {:.6}  rotation = {:.4}  dx = {:.3}  dy = {:.3}",
            row + 1,
            s.kind.name(),
            s.scale_helt,
            s.scale_homt,
            s.rotation,
            s.dx,
            s.dy
        )?;
        if s.singular_points_found {
            writeln!(sink, "     non-singular points: {:?}", s.non_singular_indices)?;
        }
        if s.outliers_found {
            writeln!(sink, "     k-best points: {:?}", s.k_best_indices)?;
        }
        if !s.helt_matched.is_empty() {
            writeln!(sink, "     matched (helmert): {:?}", s.helt_matched)?;
        }
        if !s.homt_matched.is_empty() {
            writeln!(sink, "     matched (homothetic): {:?}", s.homt_matched)?;
        }
    }
    writeln!(sink)?;
    Ok(())
}
