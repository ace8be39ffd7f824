use crate::error::Result;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;
use xrdpp::workflows::report::{RefinementOutcome, RefinementReport, ReflectionSummary};

#[derive(Serialize)]
struct ReflectionRow {
    two_theta: f64,
    intensity: f64,
    h: i32,
    k: i32,
    l: i32,
    multiplicity: usize,
}

impl From<&ReflectionSummary> for ReflectionRow {
    fn from(summary: &ReflectionSummary) -> Self {
        Self {
            two_theta: summary.two_theta,
            intensity: summary.intensity,
            h: summary.hkl.x.round() as i32,
            k: summary.hkl.y.round() as i32,
            l: summary.hkl.z.round() as i32,
            multiplicity: summary.multiplicity,
        }
    }
}

/// One point of a written profile. `measured` is empty for a calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRow {
    pub two_theta: f64,
    pub calculated: f64,
    pub measured: Option<f64>,
}

pub fn write_reflections(path: &Path, reflections: &[ReflectionSummary]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for summary in reflections {
        writer.serialize(ReflectionRow::from(summary))?;
    }
    writer.flush()?;
    info!(rows = reflections.len(), "Wrote reflections to {}", path.display());
    Ok(())
}

pub fn write_profile(path: &Path, rows: &[ProfileRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(rows = rows.len(), "Wrote profile to {}", path.display());
    Ok(())
}

pub fn format_reflections(reflections: &[ReflectionSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>10}  {:>12}  {:>12}  {:>4}", "2θ", "intensity", "hkl", "mult");
    for summary in reflections {
        let row = ReflectionRow::from(summary);
        let hkl = format!("({} {} {})", row.h, row.k, row.l);
        let _ = writeln!(
            out,
            "{:>10.4}  {:>12.3}  {:>12}  {:>4}",
            row.two_theta, row.intensity, hkl, row.multiplicity
        );
    }
    out
}

pub fn format_report(report: &RefinementReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Refinement stages:");
    for stage in &report.stages {
        let _ = writeln!(out, "  {:<24} R = {:.6}", stage.stage, stage.r_factor);
    }
    match report.outcome {
        RefinementOutcome::Completed => {
            let _ = writeln!(out, "Completed with R = {:.6}", report.r_factor);
        }
        RefinementOutcome::PoorMatch { r_factor } => {
            let _ = writeln!(
                out,
                "Stopped early: the structure does not match the reference (R = {r_factor:.6})"
            );
        }
    }

    let p = &report.parameters;
    let _ = writeln!(out, "\nParameters:");
    let _ = writeln!(out, "  scale       {:.6e}", p.scale);
    let _ = writeln!(
        out,
        "  lengths     {:.5} {:.5} {:.5}",
        p.lengths.x, p.lengths.y, p.lengths.z
    );
    let _ = writeln!(
        out,
        "  angles      {:.4} {:.4} {:.4}",
        p.angles.x, p.angles.y, p.angles.z
    );
    let _ = writeln!(out, "  U V W       {:.6} {:.6} {:.6}", p.u, p.v, p.w);
    let _ = writeln!(out, "  eta         {}", join(&p.eta));
    let _ = writeln!(out, "  shift       {}", join(&p.shift));
    let _ = writeln!(out, "  background  {}", join(&p.background));
    let _ = writeln!(out, "  B factors   {}", join(&p.b_factors));
    for (index, position) in p.positions.iter().enumerate() {
        let _ = writeln!(
            out,
            "  orbit {:<4}  {:.5} {:.5} {:.5}",
            index + 1,
            position.x,
            position.y,
            position.z
        );
    }

    let _ = writeln!(out, "\nReflections:");
    out.push_str(&format_reflections(&report.reflections));
    out
}

fn join(values: &[f64]) -> String {
    if values.is_empty() {
        return "-".to_string();
    }
    values
        .iter()
        .map(|v| format!("{v:.5}"))
        .collect::<Vec<_>>()
        .join(" ")
}
