use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::pattern::calculated::CalculatedPattern;
use crate::core::profile::peak_shape::SHIFT_TERMS;
use nalgebra::Vector3;
use tracing::info;

/// R factor reached at the end of one refinement stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: &'static str,
    pub r_factor: f64,
}

/// Logs a finished stage and appends it to `stages`.
pub(crate) fn record_stage(
    stages: &mut Vec<StageReport>,
    stage: &'static str,
    r_factor: f64,
    parameters: usize,
) {
    info!(stage, r_factor, parameters, "Stage finished.");
    stages.push(StageReport { stage, r_factor });
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefinementOutcome {
    Completed,
    /// Refinement stopped early because the fit was too poor to continue.
    PoorMatch { r_factor: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionSummary {
    pub two_theta: f64,
    /// Intensity including the pattern's optimal scale.
    pub intensity: f64,
    pub hkl: Vector3<f64>,
    pub multiplicity: usize,
}

/// Current value of every refinable parameter group.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    pub scale: f64,
    pub lengths: Vector3<f64>,
    pub angles: Vector3<f64>,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub eta: [f64; 3],
    pub shift: [f64; SHIFT_TERMS],
    pub background: Vec<f64>,
    pub b_factors: Vec<f64>,
    pub preferred_orientation: Vector3<f64>,
    /// Representative position of each orbit.
    pub positions: Vec<Vector3<f64>>,
}

impl ParameterSnapshot {
    pub fn capture(structure: &Structure, symmetry: &Symmetry, pattern: &CalculatedPattern) -> Self {
        let shape = pattern.shape();
        Self {
            scale: pattern.optimal_scale(),
            lengths: structure.lattice().lengths(),
            angles: structure.lattice().angles(),
            u: shape.u,
            v: shape.v,
            w: shape.w,
            eta: shape.eta,
            shift: shape.shift,
            background: pattern.background().coefficients().to_vec(),
            b_factors: pattern.b_factors().to_vec(),
            preferred_orientation: *pattern.preferred_orientation(),
            positions: symmetry
                .orbits()
                .iter()
                .filter_map(|orbit| structure.atom(orbit.representative()))
                .map(|atom| atom.fractional)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementReport {
    /// Final absolute R factor.
    pub r_factor: f64,
    pub stages: Vec<StageReport>,
    pub outcome: RefinementOutcome,
    pub reflections: Vec<ReflectionSummary>,
    pub parameters: ParameterSnapshot,
}

#[derive(Debug, Clone)]
pub struct RefinementResult {
    pub pattern: CalculatedPattern,
    pub report: RefinementReport,
}

impl RefinementResult {
    pub(crate) fn assemble(
        structure: &Structure,
        symmetry: &Symmetry,
        pattern: CalculatedPattern,
        r_factor: f64,
        stages: Vec<StageReport>,
        outcome: RefinementOutcome,
    ) -> Self {
        let report = RefinementReport {
            r_factor,
            stages,
            outcome,
            reflections: summarize_reflections(&pattern),
            parameters: ParameterSnapshot::capture(structure, symmetry, &pattern),
        };
        Self { pattern, report }
    }
}

pub fn summarize_reflections(pattern: &CalculatedPattern) -> Vec<ReflectionSummary> {
    let scale = pattern.optimal_scale();
    pattern
        .reflections()
        .iter()
        .map(|r| ReflectionSummary {
            two_theta: r.two_theta(),
            intensity: r.intensity() * scale,
            hkl: r.representative_hkl(),
            multiplicity: r.multiplicity(),
        })
        .collect()
}
