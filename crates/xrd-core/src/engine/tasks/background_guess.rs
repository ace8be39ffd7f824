use crate::core::pattern::calculated::CalculatedPattern;
use tracing::{info, instrument, warn};

/// Fraction of the reflection span excluded on each side of every reflection.
const PEAK_EXCLUSION_FRACTION: f64 = 0.01;
/// Fit points required per background term.
const POINTS_PER_TERM: usize = 100;

/// Least-squares background coefficients fitted to the parts of the
/// reference profile away from any reflection of `pattern`.
///
/// The coefficients are expressed in unscaled units (divided by the current
/// optimal scale). Returns all zeros when too few points survive the peak
/// exclusion or the fit is degenerate.
#[instrument(skip_all, name = "background_guess_task")]
pub fn run(pattern: &CalculatedPattern, angles: &[f64], intensities: &[f64]) -> Vec<f64> {
    let background = pattern.background();
    let terms = background.coefficients().len();
    let zeros = vec![0.0; terms];

    let (fit_angles, fit_intensities) = select_background_points(pattern, angles, intensities);
    if fit_angles.len() < terms * POINTS_PER_TERM {
        warn!(
            points = fit_angles.len(),
            required = terms * POINTS_PER_TERM,
            "Too few peak-free points to seed the background; starting from zero"
        );
        return zeros;
    }

    let Some(coefficients) = background.fit(&fit_angles, &fit_intensities) else {
        return zeros;
    };
    let scale = pattern.optimal_scale();
    let coefficients: Vec<f64> = if scale > 0.0 {
        coefficients.into_iter().map(|c| c / scale).collect()
    } else {
        coefficients
    };
    info!(
        points = fit_angles.len(),
        terms,
        "Seeded background from peak-free regions"
    );
    coefficients
}

fn select_background_points(
    pattern: &CalculatedPattern,
    angles: &[f64],
    intensities: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let reflections = pattern.reflections();
    let span = match (reflections.first(), reflections.last()) {
        (Some(first), Some(last)) => last.two_theta() - first.two_theta(),
        _ => 0.0,
    };
    let window = span * PEAK_EXCLUSION_FRACTION;

    let mut excluded = reflections
        .iter()
        .map(|r| (r.two_theta() - window, r.two_theta() + window))
        .peekable();
    let mut fit_angles = Vec::with_capacity(angles.len());
    let mut fit_intensities = Vec::with_capacity(angles.len());
    for (&angle, &intensity) in angles.iter().zip(intensities) {
        while excluded.next_if(|&(_, upper)| upper <= angle).is_some() {}
        let inside_peak = excluded
            .peek()
            .is_some_and(|&(lower, upper)| angle >= lower && angle < upper);
        if !inside_peak {
            fit_angles.push(angle);
            fit_intensities.push(intensity);
        }
    }
    (fit_angles, fit_intensities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pattern::PatternSettings;
    use crate::core::pattern::calculated::tests::simple_cubic;
    use crate::core::profile::background::BackgroundKind;

    const TOLERANCE: f64 = 1e-9;

    fn grid() -> Vec<f64> {
        (0..=4500).map(|i| 10.0 + i as f64 * 0.02).collect()
    }

    #[test]
    fn flat_reference_without_peaks_recovers_the_level() {
        let pattern = CalculatedPattern::new(PatternSettings::default())
            .with_background(BackgroundKind::Chebyshev, 1);
        let angles = grid();
        let flat = vec![250.0; angles.len()];
        let coefficients = run(&pattern, &angles, &flat);
        assert_eq!(coefficients.len(), 1);
        assert!((coefficients[0] - 250.0).abs() < TOLERANCE);

        let mut fitted = pattern.clone();
        fitted.background_mut().set_coefficients(&coefficients);
        let residual: f64 = fitted
            .diffracted_intensity(&angles)
            .iter()
            .zip(&flat)
            .map(|(c, r)| (c - r).abs())
            .sum();
        assert!(residual < 1e-6);
    }

    #[test]
    fn coefficients_are_divided_by_the_scale() {
        let mut pattern = CalculatedPattern::new(PatternSettings::default())
            .with_background(BackgroundKind::Chebyshev, 1);
        pattern.set_optimal_scale(5.0);
        let angles = grid();
        let coefficients = run(&pattern, &angles, &vec![250.0; angles.len()]);
        assert!((coefficients[0] - 50.0).abs() < TOLERANCE);
    }

    #[test]
    fn points_near_reflections_are_excluded() {
        let (structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        pattern.define_structure(&structure, &symmetry).unwrap();
        let angles = grid();
        let intensities = vec![1.0; angles.len()];
        let (kept, _) = select_background_points(&pattern, &angles, &intensities);
        assert!(kept.len() < angles.len());
        let reflections = pattern.reflections();
        let span = reflections.last().unwrap().two_theta() - reflections[0].two_theta();
        for r in reflections {
            assert!(
                kept.iter()
                    .all(|a| (a - r.two_theta()).abs() >= span * PEAK_EXCLUSION_FRACTION - 1e-12)
            );
        }
    }

    #[test]
    fn too_few_points_leave_the_background_at_zero() {
        let pattern = CalculatedPattern::new(PatternSettings::default());
        let angles: Vec<f64> = (0..50).map(|i| 10.0 + i as f64).collect();
        let coefficients = run(&pattern, &angles, &vec![10.0; angles.len()]);
        assert_eq!(coefficients, vec![0.0; 5]);
    }
}
