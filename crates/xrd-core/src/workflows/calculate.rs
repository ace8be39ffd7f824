use super::report::{ReflectionSummary, summarize_reflections};
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::pattern::PatternSettings;
use crate::core::pattern::calculated::CalculatedPattern;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument, warn};

/// Height of the tallest reflection after scaling.
const DISPLAY_MAXIMUM: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct Calculation {
    pub pattern: CalculatedPattern,
    pub reflections: Vec<ReflectionSummary>,
}

/// Calculates the pattern of `structure` with no reference, scaled so the
/// tallest reflection has intensity 1000.
#[instrument(skip_all, name = "calculate_workflow")]
pub fn run(
    structure: &Structure,
    symmetry: &Symmetry,
    settings: PatternSettings,
    reporter: &ProgressReporter,
) -> Result<Calculation, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Calculating Pattern",
    });
    info!(
        atoms = structure.atoms().len(),
        orbits = symmetry.orbits().len(),
        wavelength = settings.wavelength,
        "Calculating diffraction pattern."
    );

    let mut pattern = CalculatedPattern::new(settings);
    pattern.define_structure(structure, symmetry)?;

    let maximum = pattern
        .reflections()
        .iter()
        .map(|r| r.intensity())
        .fold(0.0, f64::max);
    if maximum > 0.0 {
        pattern.set_optimal_scale(DISPLAY_MAXIMUM / maximum);
    } else {
        warn!("No reflection has positive intensity; leaving the scale at 1.");
    }

    let reflections = summarize_reflections(&pattern);
    info!(reflections = reflections.len(), "Pattern calculated.");
    reporter.report(Progress::PhaseFinish);
    Ok(Calculation {
        pattern,
        reflections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pattern::calculated::tests::simple_cubic;

    fn calculate() -> Calculation {
        let (structure, symmetry) = simple_cubic("Cu", 3.6);
        run(
            &structure,
            &symmetry,
            PatternSettings::default(),
            &ProgressReporter::new(),
        )
        .unwrap()
    }

    fn family<'a>(calculation: &'a Calculation, sorted_hkl: [f64; 3]) -> Vec<&'a ReflectionSummary> {
        calculation
            .reflections
            .iter()
            .filter(|r| {
                let mut hkl: Vec<f64> = r.hkl.iter().map(|c| c.abs()).collect();
                hkl.sort_by(f64::total_cmp);
                hkl == sorted_hkl
            })
            .collect()
    }

    #[test]
    fn tallest_reflection_is_scaled_to_one_thousand() {
        let calculation = calculate();
        let maximum = calculation
            .reflections
            .iter()
            .map(|r| r.intensity)
            .fold(0.0, f64::max);
        assert!((maximum - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn simple_cubic_families_have_expected_multiplicity_and_bragg_angles() {
        let calculation = calculate();
        let wavelength = 1.5418;
        let a = 3.6;
        for (hkl, multiplicity) in [([0.0, 0.0, 1.0], 6), ([0.0, 1.0, 1.0], 12), ([1.0, 1.0, 1.0], 8)] {
            let members = family(&calculation, hkl);
            assert_eq!(members.len(), 1, "{hkl:?} should appear once");
            assert_eq!(members[0].multiplicity, multiplicity, "{hkl:?}");

            let inverse_d = hkl.iter().map(|c| c * c).sum::<f64>().sqrt() / a;
            let theta = (inverse_d * wavelength / 2.0).asin();
            let observed = members[0].two_theta.to_radians() / 2.0;
            assert!((observed - theta).abs() < 1e-6, "{hkl:?}");
        }
    }

    #[test]
    fn reflections_are_reported_in_ascending_angle() {
        let calculation = calculate();
        assert!(calculation
            .reflections
            .windows(2)
            .all(|w| w[0].two_theta <= w[1].two_theta));
    }

    #[test]
    fn progress_brackets_the_calculation() {
        let (structure, symmetry) = simple_cubic("Cu", 3.6);
        let events = std::sync::Mutex::new(Vec::new());
        let reporter =
            ProgressReporter::with_callback(Box::new(|e: Progress| events.lock().unwrap().push(e)));
        run(&structure, &symmetry, PatternSettings::default(), &reporter).unwrap();
        drop(reporter);
        let events = events.into_inner().unwrap();
        assert_eq!(events.first(), Some(&Progress::PhaseStart { name: "Calculating Pattern" }));
        assert_eq!(events.last(), Some(&Progress::PhaseFinish));
    }
}
