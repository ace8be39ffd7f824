use super::config::{RefinementConfig, RefinementMode};
use super::error::EngineError;
use super::optimizer::{BoundedMinimizer, Objective, ProjectedBfgs};
use super::parameters::{self, ParameterLimits, RefiningSet};
use crate::core::matching::residual::RMethod;
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::pattern::calculated::CalculatedPattern;
use crate::core::pattern::{Pattern, PatternError};
use tracing::debug;

/// The parts of the reference read on every objective evaluation, copied
/// out of it once.
struct ReferenceCache {
    peak_intensities: Vec<f64>,
    /// Measurement angles and measured intensities; `None` without a trace.
    trace: Option<(Vec<f64>, Vec<f64>)>,
}

impl ReferenceCache {
    fn new(reference: &Pattern) -> Self {
        Self {
            peak_intensities: reference.peaks().iter().map(|p| p.intensity()).collect(),
            trace: reference
                .has_profile()
                .then(|| (reference.measurement_angles(), reference.measured_intensities())),
        }
    }

    fn r_factor(
        &self,
        pattern: &mut CalculatedPattern,
        mode: RefinementMode,
        method: RMethod,
    ) -> Result<f64, PatternError> {
        match mode {
            RefinementMode::PeakBased => pattern.peak_r_factor_against(&self.peak_intensities, method),
            RefinementMode::Rietveld => {
                let (angles, measured) =
                    self.trace.as_ref().ok_or(PatternError::NoContinuousTrace)?;
                Ok(pattern.profile_r_factor_against(angles, measured, method))
            }
        }
    }
}

/// One refinement binding: a structure and its calculated pattern, the
/// reference they are refined against, and the limits fixed when the
/// session opened.
///
/// The structure is mutated in place; the session holds the only borrow for
/// its lifetime.
pub struct RefinementSession<'a> {
    structure: &'a mut Structure,
    symmetry: &'a Symmetry,
    pattern: &'a mut CalculatedPattern,
    reference: &'a Pattern,
    config: &'a RefinementConfig,
    cache: ReferenceCache,
    limits: ParameterLimits,
    minimizer: Box<dyn BoundedMinimizer + 'a>,
}

impl<'a> RefinementSession<'a> {
    pub fn new(
        structure: &'a mut Structure,
        symmetry: &'a Symmetry,
        pattern: &'a mut CalculatedPattern,
        reference: &'a Pattern,
        config: &'a RefinementConfig,
    ) -> Result<Self, EngineError> {
        if !pattern.is_structure_defined() {
            return Err(PatternError::StructureNotDefined.into());
        }
        symmetry.check_structure(structure)?;
        let limits = ParameterLimits {
            original_lengths: structure.lattice().lengths(),
            original_angles: structure.lattice().angles(),
            max_lattice_change: config.max_lattice_change,
            min_b_factor: config.min_b_factor,
            max_b_factor: config.max_b_factor,
        };
        Ok(Self {
            structure,
            symmetry,
            pattern,
            reference,
            config,
            cache: ReferenceCache::new(reference),
            limits,
            minimizer: Box::new(ProjectedBfgs::new(config.optimizer)),
        })
    }

    pub fn with_minimizer(mut self, minimizer: Box<dyn BoundedMinimizer + 'a>) -> Self {
        self.minimizer = minimizer;
        self
    }

    pub fn structure(&self) -> &Structure {
        &*self.structure
    }

    pub fn symmetry(&self) -> &Symmetry {
        self.symmetry
    }

    pub fn pattern(&self) -> &CalculatedPattern {
        &*self.pattern
    }

    pub fn pattern_mut(&mut self) -> &mut CalculatedPattern {
        &mut *self.pattern
    }

    pub fn reference(&self) -> &'a Pattern {
        self.reference
    }

    pub fn config(&self) -> &RefinementConfig {
        self.config
    }

    /// Reported agreement: the absolute R factor of the active mode.
    pub fn r_factor(&mut self) -> Result<f64, EngineError> {
        Ok(self
            .cache
            .r_factor(self.pattern, self.config.mode, RMethod::Abs)?)
    }

    /// Minimizes the objective over `set`, writes the optimum back and
    /// returns the reported R factor.
    pub fn refine(&mut self, set: &RefiningSet) -> Result<f64, EngineError> {
        let x0 = parameters::extract(set, self.structure, self.symmetry, self.pattern)?;
        let bounds = parameters::bounds(set, &self.limits, self.symmetry, self.pattern);
        let gradient_step = self.config.optimizer.gradient_step;

        let minimum = {
            let mut objective = StageObjective {
                structure: &mut *self.structure,
                symmetry: self.symmetry,
                pattern: &mut *self.pattern,
                cache: &self.cache,
                mode: self.config.mode,
                set,
                gradient_step,
            };
            self.minimizer.minimize(&mut objective, &x0, &bounds)?
        };

        parameters::apply(set, &minimum.x, self.structure, self.symmetry, self.pattern)?;
        let r = self.r_factor()?;
        debug!(
            parameters = minimum.x.len(),
            iterations = minimum.iterations,
            converged = minimum.converged,
            objective = minimum.value,
            r_factor = r,
            "Refinement step finished"
        );
        Ok(r)
    }
}

struct StageObjective<'s> {
    structure: &'s mut Structure,
    symmetry: &'s Symmetry,
    pattern: &'s mut CalculatedPattern,
    cache: &'s ReferenceCache,
    mode: RefinementMode,
    set: &'s RefiningSet,
    gradient_step: f64,
}

impl StageObjective<'_> {
    /// DR_SQUARED over matched peaks, or the unnormalized profile residual.
    fn evaluate(&mut self, x: &[f64]) -> Result<f64, EngineError> {
        parameters::apply(self.set, x, self.structure, self.symmetry, self.pattern)?;
        let method = match self.mode {
            RefinementMode::PeakBased => RMethod::Squared,
            RefinementMode::Rietveld => RMethod::Rietveld,
        };
        Ok(self.cache.r_factor(self.pattern, self.mode, method)?)
    }
}

impl Objective for StageObjective<'_> {
    fn value(&mut self, x: &[f64]) -> f64 {
        self.evaluate(x).unwrap_or(f64::INFINITY)
    }

    fn gradient_step(&self) -> f64 {
        self.gradient_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matching::matcher::DEFAULT_MATCH_TOLERANCE;
    use crate::core::pattern::PatternSettings;
    use crate::core::pattern::calculated::tests::simple_cubic;
    use crate::engine::config::RefinementConfigBuilder;
    use crate::core::models::symmetry::{Orbit, SpecialPosition, SymmetryError, SymmetryOperation};
    use crate::engine::optimizer::{Bounds, Minimum, OptimizerError};
    use crate::engine::parameters::RefinementParameter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Evaluates the starting point once and keeps it.
    struct StartingPoint<'c> {
        calls: &'c AtomicUsize,
    }

    impl BoundedMinimizer for StartingPoint<'_> {
        fn minimize(
            &self,
            objective: &mut dyn Objective,
            x0: &[f64],
            _bounds: &Bounds,
        ) -> Result<Minimum, OptimizerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Minimum {
                x: x0.to_vec(),
                value: objective.value(x0),
                iterations: 0,
                converged: true,
            })
        }
    }

    fn config(mode: RefinementMode) -> RefinementConfig {
        RefinementConfigBuilder::new().mode(mode).build().unwrap()
    }

    #[test]
    fn undefined_pattern_cannot_open_a_session() {
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        let reference = Pattern::Calculated(pattern.clone());
        let config = config(RefinementMode::PeakBased);
        let result =
            RefinementSession::new(&mut structure, &symmetry, &mut pattern, &reference, &config);
        assert!(matches!(
            result,
            Err(EngineError::Pattern(PatternError::StructureNotDefined))
        ));
    }

    #[test]
    fn peak_refinement_without_matching_fails() {
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        pattern.define_structure(&structure, &symmetry).unwrap();
        let reference = Pattern::Calculated(pattern.clone());
        let config = config(RefinementMode::PeakBased);
        let mut session =
            RefinementSession::new(&mut structure, &symmetry, &mut pattern, &reference, &config)
                .unwrap();
        assert!(matches!(
            session.r_factor(),
            Err(EngineError::Pattern(PatternError::MatchingNotRun))
        ));
    }

    #[test]
    fn thermal_factor_refinement_recovers_the_reference() {
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let settings = PatternSettings {
            max_two_theta: 70.0,
            ..PatternSettings::default()
        };
        let mut truth = CalculatedPattern::new(settings.clone());
        truth.define_structure(&structure, &symmetry).unwrap();
        truth.set_b_factors(&[1.2]).unwrap();
        truth.update_intensities(&structure, &symmetry).unwrap();
        let reference = Pattern::Calculated(truth);

        let mut pattern = CalculatedPattern::new(settings);
        pattern.define_structure(&structure, &symmetry).unwrap();
        pattern.match_to_reference(&reference.peaks(), DEFAULT_MATCH_TOLERANCE);

        let config = config(RefinementMode::PeakBased);
        let mut session =
            RefinementSession::new(&mut structure, &symmetry, &mut pattern, &reference, &config)
                .unwrap();
        let set: RefiningSet = [RefinementParameter::ThermalFactors].into_iter().collect();
        let r = session.refine(&set).unwrap();
        assert!(r < 1e-4, "r = {r}");
        assert!((session.pattern().b_factors()[0] - 1.2).abs() < 1e-2);
    }

    #[test]
    fn orbit_pointing_past_the_structure_is_rejected() {
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        pattern.define_structure(&structure, &symmetry).unwrap();
        let reference = Pattern::Calculated(pattern.clone());
        let dangling = Symmetry::new(
            symmetry.operations().to_vec(),
            vec![
                Orbit::new(
                    vec![5],
                    vec![SymmetryOperation::identity()],
                    SpecialPosition::general(),
                )
                .unwrap(),
            ],
            symmetry.lattice_system(),
        );
        let config = config(RefinementMode::Rietveld);
        let result =
            RefinementSession::new(&mut structure, &dangling, &mut pattern, &reference, &config);
        assert!(matches!(
            result,
            Err(EngineError::Symmetry(SymmetryError::MissingOrbitAtom { atom: 5, .. }))
        ));
    }

    #[test]
    fn custom_minimizer_drives_the_stage() {
        let (mut structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        pattern.define_structure(&structure, &symmetry).unwrap();
        let reference = Pattern::Calculated(pattern.clone());
        let config = config(RefinementMode::Rietveld);
        let calls = AtomicUsize::new(0);

        let mut session =
            RefinementSession::new(&mut structure, &symmetry, &mut pattern, &reference, &config)
                .unwrap()
                .with_minimizer(Box::new(StartingPoint { calls: &calls }));
        let set: RefiningSet = [RefinementParameter::Scale].into_iter().collect();
        let r = session.refine(&set).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(r.abs() < 1e-9, "r = {r}");
        assert_eq!(session.pattern().optimal_scale(), 1.0);
    }
}
