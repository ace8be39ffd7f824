use super::prepare_pattern;
use super::report::{RefinementOutcome, RefinementResult, StageReport, record_stage};
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::pattern::{Pattern, PatternError};
use crate::engine::config::{ConfigError, RefinementConfig, RefinementMode};
use crate::engine::error::EngineError;
use crate::engine::parameters::{self, RefinementParameter, RefiningSet};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::session::RefinementSession;
use tracing::{info, instrument};

/// Refines positions and thermal factors against the integrated peak list of
/// `reference`.
///
/// Peaks are matched once, before any parameter moves. Each stage minimizes
/// DR_SQUARED over the matched pairs; the reported R factor is DR_ABS.
#[instrument(skip_all, name = "peak_refinement_workflow")]
pub fn run(
    structure: &mut Structure,
    symmetry: &Symmetry,
    reference: &Pattern,
    config: &RefinementConfig,
    reporter: &ProgressReporter,
) -> Result<RefinementResult, EngineError> {
    if config.mode != RefinementMode::PeakBased {
        return Err(ConfigError::InvalidParameter {
            name: "mode",
            reason: "peak refinement requires the peak-based mode".to_string(),
        }
        .into());
    }

    let reference_peaks = reference.peaks();
    if reference_peaks.is_empty() {
        return Err(PatternError::NoPeaks.into());
    }

    // === Phase 0: Preparation and Matching ===
    reporter.report(Progress::PhaseStart {
        name: "Matching Peaks",
    });
    let mut pattern = prepare_pattern(structure, symmetry, reference, config)?;
    pattern.match_to_reference(&reference_peaks, config.match_tolerance);
    info!(
        reflections = pattern.reflections().len(),
        reference_peaks = reference_peaks.len(),
        "Matched calculated reflections to the reference."
    );
    reporter.report(Progress::PhaseFinish);

    let mut stages: Vec<StageReport> = Vec::new();
    let r_factor = {
        let mut session =
            RefinementSession::new(structure, symmetry, &mut pattern, reference, config)?;
        let initial = session.r_factor()?;
        record_stage(&mut stages, "matching", initial, 0);

        let plan = [
            (config.targets.positions, "positions", RefinementParameter::Positions),
            (config.targets.b_factors, "thermal-factors", RefinementParameter::ThermalFactors),
        ];
        let total_steps = plan.iter().filter(|(enabled, ..)| *enabled).count() as u64;

        // === Phase 1: Positions, then positions with thermal factors ===
        reporter.report(Progress::PhaseStart {
            name: "Peak Refinement",
        });
        reporter.report(Progress::TaskStart { total_steps });
        let mut cumulative = RefiningSet::new();
        for (enabled, stage, parameter) in plan {
            if !enabled {
                continue;
            }
            cumulative.insert(parameter);
            let r = session.refine(&cumulative)?;
            let width = parameters::dimension(&cumulative, session.symmetry(), session.pattern());
            record_stage(&mut stages, stage, r, width);
            reporter.report(Progress::TaskIncrement);
        }
        reporter.report(Progress::TaskFinish);
        reporter.report(Progress::PhaseFinish);

        session.r_factor()?
    };

    info!(r_factor, "Peak refinement complete.");
    Ok(RefinementResult::assemble(
        structure,
        symmetry,
        pattern,
        r_factor,
        stages,
        RefinementOutcome::Completed,
    ))
}
