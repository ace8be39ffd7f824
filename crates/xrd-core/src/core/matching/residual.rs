use super::matcher::PeakMatching;
use crate::core::pattern::PatternError;
use serde::Deserialize;
use std::fmt;

/// Residual definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RMethod {
    /// `Σ|I_ref − s·I_calc| / Σ I_ref`.
    Abs,
    /// `sqrt(Σw(I_ref − s·I_calc)² / Σw·I_ref²)`.
    Squared,
    /// Weighted profile sum of squares, not normalized. Only meaningful as an
    /// optimizer objective.
    Rietveld,
}

impl fmt::Display for RMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Abs => "abs",
            Self::Squared => "squared",
            Self::Rietveld => "rietveld",
        };
        f.write_str(name)
    }
}

/// An R factor together with the scale factor it was evaluated at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub r_factor: f64,
    pub scale: f64,
}

/// Integrated-intensity R factor between matched peak groups.
///
/// `calculated[j]` is the intensity of peak `j`, `reference[i]` that of
/// reference peak `i`. Calculated peaks matched to the same reference peak
/// are summed; unmatched calculated peaks count fully against the fit. The
/// scale factor minimizing the chosen residual is found along the way.
pub fn peak_residual(
    calculated: &[f64],
    reference: &[f64],
    matching: &PeakMatching,
    method: RMethod,
) -> Result<Residual, PatternError> {
    let matched: Vec<f64> = matching
        .matches()
        .iter()
        .map(|group| group.iter().filter_map(|&j| calculated.get(j)).sum())
        .collect();
    let unmatched: Vec<f64> = matching
        .unmatched()
        .iter()
        .filter_map(|&j| calculated.get(j).copied())
        .collect();

    match method {
        RMethod::Squared => {
            let norm: f64 = reference.iter().map(|r| r * r).sum();
            let cross: f64 = matched.iter().zip(reference).map(|(m, r)| m * r).sum();
            let power: f64 = matched.iter().chain(&unmatched).map(|m| m * m).sum();
            let scale = if power > 0.0 { cross / power } else { 1.0 };
            if norm <= 0.0 {
                return Ok(Residual { r_factor: 1.0, scale });
            }
            let error: f64 = matched
                .iter()
                .zip(reference)
                .map(|(m, r)| (r - scale * m).powi(2))
                .chain(unmatched.iter().map(|u| (scale * u).powi(2)))
                .sum();
            Ok(Residual {
                r_factor: (error / norm).sqrt(),
                scale,
            })
        }
        RMethod::Abs => {
            let norm: f64 = reference.iter().sum();
            let absolute_error = |scale: f64| -> f64 {
                matched
                    .iter()
                    .zip(reference)
                    .map(|(m, r)| (r - scale * m).abs())
                    .chain(unmatched.iter().map(|u| (scale * u).abs()))
                    .sum()
            };
            // The L1 optimum sits where one matched pair agrees exactly.
            let scale = matched
                .iter()
                .zip(reference)
                .filter(|(m, _)| **m != 0.0)
                .map(|(m, r)| r / m)
                .map(|candidate| (candidate, absolute_error(candidate)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(1.0, |(candidate, _)| candidate);
            if norm <= 0.0 {
                return Ok(Residual { r_factor: 1.0, scale });
            }
            Ok(Residual {
                r_factor: absolute_error(scale) / norm,
                scale,
            })
        }
        RMethod::Rietveld => Err(PatternError::UnsupportedResidual(method.to_string())),
    }
}

/// Profile R factor at `scale` between a measured trace and a synthesized
/// peak signal plus background, all sampled at the same angles.
///
/// For [`RMethod::Abs`] and [`RMethod::Squared`] the background is first
/// subtracted from the reference, and points where nothing is left are
/// ignored by the absolute form. Weights are `1/I_ref` (raw reference), zero
/// where `I_ref ≤ 0`.
pub fn profile_residual(
    reference: &[f64],
    peak_signal: &[f64],
    background: &[f64],
    scale: f64,
    method: RMethod,
) -> f64 {
    let weight = |raw: f64| if raw > 0.0 { 1.0 / raw } else { 0.0 };
    let points = reference.iter().zip(peak_signal).zip(background);
    match method {
        RMethod::Abs => {
            let (error, norm) = points
                .map(|((&raw, &peak), &bg)| (raw - scale * bg, peak))
                .filter(|(net, _)| *net > 0.0)
                .fold((0.0, 0.0), |(e, n), (net, peak)| {
                    (e + (net - scale * peak).abs(), n + net)
                });
            if norm > 0.0 { error / norm } else { 1.0 }
        }
        RMethod::Squared => {
            let (error, norm) = points.fold((0.0, 0.0), |(e, n), ((&raw, &peak), &bg)| {
                let net = raw - scale * bg;
                let w = weight(raw);
                (e + w * (net - scale * peak).powi(2), n + w * net * net)
            });
            if norm > 0.0 { (error / norm).sqrt() } else { 1.0 }
        }
        RMethod::Rietveld => points
            .map(|((&raw, &peak), &bg)| weight(raw) * (raw - scale * (peak + bg)).powi(2))
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matching::matcher::match_peaks;
    use crate::core::peaks::diffraction_peak::DiffractionPeak;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn self_matched(intensities: &[f64]) -> PeakMatching {
        let peaks: Vec<DiffractionPeak> = intensities
            .iter()
            .enumerate()
            .map(|(i, &v)| DiffractionPeak::new(20.0 + 10.0 * i as f64, v))
            .collect();
        let angles: Vec<f64> = peaks.iter().map(|p| p.two_theta()).collect();
        match_peaks(&angles, &peaks, 0.15)
    }

    #[test]
    fn identical_peaks_give_zero_residual_at_unit_scale() {
        let intensities = [1000.0, 420.0, 36.5, 210.0];
        let matching = self_matched(&intensities);
        for method in [RMethod::Abs, RMethod::Squared] {
            let residual = peak_residual(&intensities, &intensities, &matching, method).unwrap();
            assert!(f64_approx_equal(residual.r_factor, 0.0), "{method}");
            assert!(f64_approx_equal(residual.scale, 1.0), "{method}");
        }
    }

    #[test]
    fn scaled_peaks_recover_the_scale_factor() {
        let reference = [1000.0, 420.0, 36.5];
        let calculated: Vec<f64> = reference.iter().map(|r| r / 4.0).collect();
        let matching = self_matched(&reference);
        let squared = peak_residual(&calculated, &reference, &matching, RMethod::Squared).unwrap();
        assert!(f64_approx_equal(squared.scale, 4.0));
        let abs = peak_residual(&calculated, &reference, &matching, RMethod::Abs).unwrap();
        assert!(f64_approx_equal(abs.scale, 4.0));
        assert!(f64_approx_equal(abs.r_factor, 0.0));
    }

    #[test]
    fn unmatched_peaks_count_against_the_fit() {
        let reference = [DiffractionPeak::new(30.0, 100.0)];
        let matching = match_peaks(&[30.0, 60.0], &reference, 0.15);
        let residual = peak_residual(&[100.0, 50.0], &[100.0], &matching, RMethod::Abs).unwrap();
        assert!(f64_approx_equal(residual.scale, 1.0));
        assert!(f64_approx_equal(residual.r_factor, 0.5));
    }

    #[test]
    fn zero_normalization_falls_back_to_unit_residual() {
        let matching = self_matched(&[0.0, 0.0]);
        let residual = peak_residual(&[1.0, 2.0], &[0.0, 0.0], &matching, RMethod::Squared).unwrap();
        assert_eq!(residual.r_factor, 1.0);
        assert_eq!(profile_residual(&[0.0; 3], &[1.0; 3], &[0.0; 3], 1.0, RMethod::Abs), 1.0);
    }

    #[test]
    fn rietveld_residual_is_rejected_for_peaks() {
        let matching = self_matched(&[1.0]);
        assert!(matches!(
            peak_residual(&[1.0], &[1.0], &matching, RMethod::Rietveld),
            Err(PatternError::UnsupportedResidual(_))
        ));
    }

    #[test]
    fn profile_residuals_vanish_for_an_exact_fit() {
        let peak = [0.0, 5.0, 20.0, 5.0, 0.0];
        let background = [10.0; 5];
        let scale = 3.0;
        let reference: Vec<f64> = peak
            .iter()
            .zip(&background)
            .map(|(p, b)| scale * (p + b))
            .collect();
        for method in [RMethod::Abs, RMethod::Squared, RMethod::Rietveld] {
            let r = profile_residual(&reference, &peak, &background, scale, method);
            assert!(f64_approx_equal(r, 0.0), "{method}");
        }
    }

    #[test]
    fn rietveld_residual_weights_by_inverse_intensity() {
        let r = profile_residual(&[4.0, 0.0], &[2.0, 7.0], &[0.0, 0.0], 1.0, RMethod::Rietveld);
        assert!(f64_approx_equal(r, (4.0 - 2.0f64).powi(2) / 4.0));
    }
}
