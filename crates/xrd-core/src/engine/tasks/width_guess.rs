use tracing::{debug, instrument};

/// Upper limit on the seeded full width at half maximum, in degrees.
const MAX_WIDTH: f64 = 1.0;

/// Mean full width at half maximum of the peaks in a measured profile.
///
/// Leading points above half of the global maximum are skipped, then every
/// upward crossing of the half-maximum line opens a peak that the next
/// downward crossing closes. Returns `None` when no peak closes.
#[instrument(skip_all, name = "width_guess_task")]
pub fn run(angles: &[f64], intensities: &[f64]) -> Option<f64> {
    let maximum = intensities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !maximum.is_finite() {
        return None;
    }
    let half = maximum / 2.0;

    let start = intensities.iter().position(|&i| i <= half)?;
    let mut widths = Vec::new();
    let mut opened: Option<f64> = None;
    for (&angle, &intensity) in angles.iter().zip(intensities).skip(start) {
        match opened {
            Some(from) if intensity < half => {
                widths.push(angle - from);
                opened = None;
            }
            None if intensity > half => opened = Some(angle),
            _ => {}
        }
    }
    if widths.is_empty() {
        return None;
    }
    let mean = widths.iter().sum::<f64>() / widths.len() as f64;
    debug!(peaks = widths.len(), mean_width = mean, "Estimated peak width");
    Some(mean.min(MAX_WIDTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::peak_shape::pseudo_voigt;

    fn grid() -> Vec<f64> {
        (0..=4500).map(|i| 10.0 + i as f64 * 0.02).collect()
    }

    #[test]
    fn gaussian_peaks_report_their_width() {
        let angles = grid();
        let intensities: Vec<f64> = angles
            .iter()
            .map(|&a| 100.0 * (pseudo_voigt(a - 30.0, 0.4, 1.0) + pseudo_voigt(a - 60.0, 0.4, 1.0)))
            .collect();
        let width = run(&angles, &intensities).unwrap();
        assert!((width - 0.4).abs() <= 0.04, "width = {width}");
    }

    #[test]
    fn broad_peaks_are_clamped() {
        let angles = grid();
        let intensities: Vec<f64> = angles
            .iter()
            .map(|&a| pseudo_voigt(a - 50.0, 3.0, 1.0))
            .collect();
        assert_eq!(run(&angles, &intensities), Some(MAX_WIDTH));
    }

    #[test]
    fn flat_profile_has_no_width() {
        let angles = grid();
        assert_eq!(run(&angles, &vec![5.0; angles.len()]), None);
        assert_eq!(run(&[], &[]), None);
    }
}
