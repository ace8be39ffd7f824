use super::prepare_pattern;
use super::report::{RefinementOutcome, RefinementResult, StageReport, record_stage};
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::pattern::{Pattern, PatternError};
use crate::engine::config::{ConfigError, RefinementConfig, RefinementMode};
use crate::engine::error::EngineError;
use crate::engine::parameters::{self, RefinementParameter as P, RefiningSet};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::session::RefinementSession;
use crate::engine::tasks::{background_guess, width_guess};
use tracing::{debug, info, instrument, warn};

/// Full-profile refinement against the continuous trace of `reference`.
///
/// Stages run in a fixed order and each one grows a cumulative refining set.
/// Stages that seed or isolate a group first refine that group alone, then
/// refine it together with everything before it. The run stops early with
/// [`RefinementOutcome::PoorMatch`] when the R factor after the peak-width
/// stage exceeds the configured threshold.
#[instrument(skip_all, name = "rietveld_workflow")]
pub fn run(
    structure: &mut Structure,
    symmetry: &Symmetry,
    reference: &Pattern,
    config: &RefinementConfig,
    reporter: &ProgressReporter,
) -> Result<RefinementResult, EngineError> {
    if config.mode != RefinementMode::Rietveld {
        return Err(ConfigError::InvalidParameter {
            name: "mode",
            reason: "Rietveld refinement requires the rietveld mode".to_string(),
        }
        .into());
    }
    if !reference.has_profile() {
        return Err(PatternError::NoContinuousTrace.into());
    }

    // === Phase 0: Preparation ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let mut pattern = prepare_pattern(structure, symmetry, reference, config)?;
    let angles = reference.measurement_angles();
    let measured = reference.measured_intensities();
    info!(
        points = angles.len(),
        reflections = pattern.reflections().len(),
        "Prepared calculated pattern on the reference grid."
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Staged refinement ===
    reporter.report(Progress::PhaseStart {
        name: "Rietveld Refinement",
    });
    reporter.report(Progress::TaskStart {
        total_steps: stage_count(config),
    });
    let mut stages = Vec::new();
    let (r_factor, outcome) = {
        let mut session =
            RefinementSession::new(structure, symmetry, &mut pattern, reference, config)?;
        let mut stager = Stager {
            session: &mut session,
            stages: &mut stages,
            reporter,
            cumulative: RefiningSet::new(),
        };
        let outcome = stager.run_all(config, &angles, &measured)?;
        (session.r_factor()?, outcome)
    };
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    info!(r_factor, ?outcome, "Rietveld refinement finished.");
    Ok(RefinementResult::assemble(
        structure, symmetry, pattern, r_factor, stages, outcome,
    ))
}

fn stage_count(config: &RefinementConfig) -> u64 {
    let optional = [
        config.refines_lattice(),
        config.targets.positions,
        config.targets.b_factors,
    ];
    7 + optional.iter().filter(|&&enabled| enabled).count() as u64
}

fn set_of<const N: usize>(parameters: [P; N]) -> RefiningSet {
    parameters.into_iter().collect()
}

fn maximum(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

struct Stager<'s, 'a, 'r, 'p> {
    session: &'s mut RefinementSession<'a>,
    stages: &'s mut Vec<StageReport>,
    reporter: &'r ProgressReporter<'p>,
    cumulative: RefiningSet,
}

impl Stager<'_, '_, '_, '_> {
    fn run_all(
        &mut self,
        config: &RefinementConfig,
        angles: &[f64],
        measured: &[f64],
    ) -> Result<RefinementOutcome, EngineError> {
        self.scale(angles, measured)?;
        self.specimen_displacement()?;
        self.background(angles, measured)?;
        if config.refines_lattice() {
            self.lattice()?;
        }

        let r = self.peak_width(angles, measured)?;
        if r > config.poor_match_threshold {
            warn!(
                r_factor = r,
                threshold = config.poor_match_threshold,
                "Very poor match after the peak-width stage; stopping refinement."
            );
            return Ok(RefinementOutcome::PoorMatch { r_factor: r });
        }

        let remaining = [
            (config.targets.positions, "positions", P::Positions),
            (true, "preferred-orientation", P::PreferredOrientation),
            (config.targets.b_factors, "thermal-factors", P::ThermalFactors),
            (true, "angle-dependent-shape", P::AngleDependentShape),
            (true, "zero-shift", P::ZeroShift),
        ];
        for (enabled, stage, parameter) in remaining {
            if enabled {
                self.cumulative.insert(parameter);
                let r = self.session.refine(&self.cumulative)?;
                self.finish(stage, r);
            }
        }
        Ok(RefinementOutcome::Completed)
    }

    fn finish(&mut self, stage: &'static str, r_factor: f64) {
        let width = parameters::dimension(
            &self.cumulative,
            self.session.symmetry(),
            self.session.pattern(),
        );
        record_stage(self.stages, stage, r_factor, width);
        self.reporter.report(Progress::TaskIncrement);
    }

    fn scale(&mut self, angles: &[f64], measured: &[f64]) -> Result<(), EngineError> {
        let r = refine_scale(self.session, angles, measured)?;
        self.cumulative.insert(P::Scale);
        self.finish("scale", r);
        Ok(())
    }

    fn specimen_displacement(&mut self) -> Result<(), EngineError> {
        self.session.refine(&set_of([P::SpecimenDisplacement]))?;
        self.cumulative.insert(P::SpecimenDisplacement);
        let r = self.session.refine(&self.cumulative)?;
        self.finish("specimen-displacement", r);
        Ok(())
    }

    fn background(&mut self, angles: &[f64], measured: &[f64]) -> Result<(), EngineError> {
        let seed = background_guess::run(self.session.pattern(), angles, measured);
        self.session
            .pattern_mut()
            .background_mut()
            .set_coefficients(&seed);
        self.session.refine(&set_of([P::Background, P::Scale]))?;
        self.cumulative.insert(P::Background);
        let r = self.session.refine(&self.cumulative)?;
        self.finish("background", r);
        Ok(())
    }

    /// The cell is refined with every other group held fixed; later stages
    /// refine it jointly.
    fn lattice(&mut self) -> Result<(), EngineError> {
        let r = self.session.refine(&set_of([P::Lattice]))?;
        self.cumulative.insert(P::Lattice);
        self.finish("lattice", r);
        Ok(())
    }

    fn peak_width(&mut self, angles: &[f64], measured: &[f64]) -> Result<f64, EngineError> {
        // With U = V = 0 the FWHM is H = sqrt(W).
        match width_guess::run(angles, measured) {
            Some(fwhm) => self.session.pattern_mut().shape_mut().w = fwhm * fwhm,
            None => debug!("No closed peak in the reference; keeping the current W"),
        }
        self.session.refine(&set_of([P::AngleIndependentShape]))?;
        self.cumulative.insert(P::AngleIndependentShape);
        let r = self.session.refine(&self.cumulative)?;
        self.finish("peak-width", r);
        Ok(r)
    }
}

/// Seeds the scale from the ratio of measured to calculated maxima, then
/// refines it alone.
fn refine_scale(
    session: &mut RefinementSession,
    angles: &[f64],
    measured: &[f64],
) -> Result<f64, EngineError> {
    let calculated = maximum(&session.pattern().diffracted_intensity(angles));
    if calculated <= 0.0 {
        return Err(EngineError::PhaseFailed {
            phase: "scale",
            reason: "calculated profile has no intensity on the measured grid".to_string(),
        });
    }
    let seed = maximum(measured) / calculated;
    session.pattern_mut().set_optimal_scale(seed);
    debug!(seed, "Seeded scale factor");
    session.refine(&set_of([P::Scale]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pattern::PatternSettings;
    use crate::core::pattern::calculated::CalculatedPattern;
    use crate::core::pattern::calculated::tests::simple_cubic;
    use crate::core::pattern::experimental::ExperimentalPattern;
    use crate::engine::config::RefinementConfigBuilder;
    use std::sync::Mutex;

    const TOLERANCE: f64 = 1e-5;

    fn settings() -> PatternSettings {
        PatternSettings {
            min_two_theta: 20.0,
            max_two_theta: 60.0,
            resolution: 0.05,
            ..PatternSettings::default()
        }
    }

    /// The unrefined profile of simple-cubic Cu with lattice constant `a`,
    /// multiplied by `k` and raised by a flat `offset`.
    fn scaled_reference(a: f64, k: f64, offset: f64) -> Pattern {
        let (structure, symmetry) = simple_cubic("Cu", a);
        let mut truth = CalculatedPattern::new(settings());
        truth.define_structure(&structure, &symmetry).unwrap();
        let angles = truth.measurement_angles();
        let intensities: Vec<f64> = truth
            .diffracted_intensity(&angles)
            .into_iter()
            .map(|i| i * k + offset)
            .collect();
        ExperimentalPattern::new(settings(), &angles, &intensities)
            .unwrap()
            .into()
    }

    fn config() -> RefinementConfigBuilder {
        RefinementConfigBuilder::new().mode(RefinementMode::Rietveld)
    }

    #[test]
    fn scale_refinement_recovers_a_known_factor() {
        let k = 3.7;
        let reference = scaled_reference(3.6, k, 0.0);
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let config = config().build().unwrap();
        let mut pattern = prepare_pattern(&structure, &symmetry, &reference, &config).unwrap();
        let mut session =
            RefinementSession::new(&mut structure, &symmetry, &mut pattern, &reference, &config)
                .unwrap();

        session.pattern_mut().set_optimal_scale(1.0);
        let r = session.refine(&set_of([P::Scale])).unwrap();
        let s = session.pattern().optimal_scale();
        assert!((s - k).abs() / k < TOLERANCE, "scale = {s}");
        assert!(r < TOLERANCE, "r = {r}");

        let angles = reference.measurement_angles();
        let measured = reference.measured_intensities();
        let r = refine_scale(&mut session, &angles, &measured).unwrap();
        assert!((session.pattern().optimal_scale() - k).abs() / k < TOLERANCE);
        assert!(r < TOLERANCE);
    }

    #[test]
    fn full_run_completes_every_stage_in_order() {
        let reference = scaled_reference(3.6, 2.0, 5.0);
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let config = config().build().unwrap();
        let events = Mutex::new(Vec::new());
        let reporter =
            ProgressReporter::with_callback(Box::new(|e: Progress| events.lock().unwrap().push(e)));

        let result = run(&mut structure, &symmetry, &reference, &config, &reporter).unwrap();
        drop(reporter);

        let names: Vec<_> = result.report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            names,
            vec![
                "scale",
                "specimen-displacement",
                "background",
                "lattice",
                "peak-width",
                "preferred-orientation",
                "angle-dependent-shape",
                "zero-shift",
            ]
        );
        assert_eq!(result.report.outcome, RefinementOutcome::Completed);
        assert!(result.report.r_factor < 0.1, "r = {}", result.report.r_factor);

        let events = events.into_inner().unwrap();
        assert!(events.contains(&Progress::TaskStart { total_steps: 8 }));
        let increments = events
            .iter()
            .filter(|e| **e == Progress::TaskIncrement)
            .count();
        assert_eq!(increments, 8);
    }

    #[test]
    fn poor_fit_stops_after_the_peak_width_stage() {
        let reference = scaled_reference(3.6, 1.0, 5.0);
        let (mut structure, symmetry) = simple_cubic("Cu", 3.75);
        let config = config()
            .max_lattice_change(0.0)
            .poor_match_threshold(0.0)
            .refine_positions(true)
            .build()
            .unwrap();

        let result = run(
            &mut structure,
            &symmetry,
            &reference,
            &config,
            &ProgressReporter::new(),
        )
        .unwrap();

        let RefinementOutcome::PoorMatch { r_factor } = result.report.outcome else {
            panic!("expected a poor match, got {:?}", result.report.outcome);
        };
        assert!(r_factor > 0.0);
        assert_eq!(result.report.stages.last().map(|s| s.stage), Some("peak-width"));
        assert!(result.report.stages.iter().all(|s| s.stage != "lattice"));
    }

    #[test]
    fn integrated_reference_is_rejected() {
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut calculated = CalculatedPattern::new(settings());
        calculated.define_structure(&structure, &symmetry).unwrap();
        let reference: Pattern =
            ExperimentalPattern::from_peaks(settings(), &calculated.peaks())
                .unwrap()
                .into();
        let result = run(
            &mut structure,
            &symmetry,
            &reference,
            &config().build().unwrap(),
            &ProgressReporter::new(),
        );
        assert!(matches!(
            result,
            Err(EngineError::Pattern(PatternError::NoContinuousTrace))
        ));
    }

    #[test]
    fn stage_count_follows_the_configuration() {
        assert_eq!(stage_count(&config().build().unwrap()), 8);
        let all = config()
            .refine_positions(true)
            .refine_b_factors(true)
            .build()
            .unwrap();
        assert_eq!(stage_count(&all), 10);
        let minimal = config().max_lattice_change(0.0).build().unwrap();
        assert_eq!(stage_count(&minimal), 7);
    }
}
