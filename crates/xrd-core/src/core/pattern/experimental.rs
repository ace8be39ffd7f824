use super::{PatternError, PatternSettings};
use crate::core::peaks::diffraction_peak::DiffractionPeak;
use thiserror::Error;
use tracing::{debug, info};

/// Patterns with fewer points than this and irregular spacing are read as
/// lists of integrated peaks rather than as a continuous trace.
const MAX_INTEGRATED_POINTS: usize = 500;
const IRREGULAR_SPACING_RATIO: f64 = 1.1;

/// Failure of a peak-extraction pipeline. Recoverable: the pattern keeps the
/// peaks it had before the failed extraction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Extracted peak at {two_theta} has negative integrated intensity {intensity}")]
    NegativeIntensity { two_theta: f64, intensity: f64 },
    #[error("Extracted peak at {two_theta} lies outside the measured range [{min}, {max}]")]
    PeakOutsideRange { two_theta: f64, min: f64, max: f64 },
    #[error("Peak extraction failed: {0}")]
    Provider(String),
}

/// Turns a continuous trace into integrated peaks (smoothing, background
/// removal, segmentation and peak fitting live behind this seam).
pub trait PeakExtractor {
    fn extract(
        &self,
        angles: &[f64],
        intensities: &[f64],
    ) -> Result<Vec<DiffractionPeak>, ExtractionError>;
}

/// A measured pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentalPattern {
    settings: PatternSettings,
    angles: Vec<f64>,
    intensities: Vec<f64>,
    peaks: Vec<DiffractionPeak>,
    continuous: bool,
}

impl ExperimentalPattern {
    /// Builds a pattern from paired measurements, sorted by angle.
    ///
    /// Irregularly spaced data with fewer than 500 points is interpreted as a
    /// list of integrated peaks; anything else is a continuous trace. The
    /// angular range of `settings` is replaced by the range of the data.
    pub fn new(
        settings: PatternSettings,
        angles: &[f64],
        intensities: &[f64],
    ) -> Result<Self, PatternError> {
        if angles.len() != intensities.len() {
            return Err(PatternError::LengthMismatch {
                angles: angles.len(),
                intensities: intensities.len(),
            });
        }
        if angles.is_empty() {
            return Err(PatternError::EmptyPattern);
        }

        let mut pairs: Vec<(f64, f64)> = angles.iter().copied().zip(intensities.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (angles, intensities): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();

        let (min_spacing, max_spacing) = angles
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold((f64::INFINITY, 0.0f64), |(lo, hi), d| (lo.min(d), hi.max(d)));
        let irregular = max_spacing == 0.0 || max_spacing > IRREGULAR_SPACING_RATIO * min_spacing;
        let continuous = !(irregular && angles.len() < MAX_INTEGRATED_POINTS);

        let mut settings = settings;
        let first = angles[0];
        let last = angles[angles.len() - 1];
        let peaks = if continuous {
            settings.min_two_theta = first;
            settings.max_two_theta = last;
            settings.resolution = (last - first) / (angles.len() - 1) as f64;
            info!(points = angles.len(), "Stored a continuous pattern");
            Vec::new()
        } else {
            settings.min_two_theta = first - settings.resolution;
            settings.max_two_theta = last + settings.resolution / 2.0;
            info!(peaks = angles.len(), "Stored a pattern of integrated peaks");
            angles
                .iter()
                .zip(&intensities)
                .map(|(&t, &i)| DiffractionPeak::new(t, i))
                .collect()
        };

        Ok(Self {
            settings,
            angles,
            intensities,
            peaks,
            continuous,
        })
    }

    /// Builds an integrated-peak pattern directly.
    pub fn from_peaks(settings: PatternSettings, peaks: &[DiffractionPeak]) -> Result<Self, PatternError> {
        if peaks.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        let mut peaks = peaks.to_vec();
        peaks.sort_by(|a, b| a.two_theta().total_cmp(&b.two_theta()));
        let mut settings = settings;
        settings.min_two_theta = peaks[0].two_theta() - settings.resolution;
        settings.max_two_theta = peaks[peaks.len() - 1].two_theta() + settings.resolution / 2.0;
        Ok(Self {
            settings,
            angles: peaks.iter().map(|p| p.two_theta()).collect(),
            intensities: peaks.iter().map(|p| p.intensity()).collect(),
            peaks,
            continuous: false,
        })
    }

    pub fn settings(&self) -> &PatternSettings {
        &self.settings
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn peaks(&self) -> &[DiffractionPeak] {
        &self.peaks
    }

    pub fn measurement_angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn measured_intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// Linearly interpolated intensity of the continuous trace.
    pub fn intensity_at(&self, two_theta: f64) -> Result<f64, PatternError> {
        if !self.continuous {
            return Err(PatternError::NoContinuousTrace);
        }
        let (min, max) = (self.angles[0], self.angles[self.angles.len() - 1]);
        if !(min..=max).contains(&two_theta) {
            return Err(PatternError::OutOfMeasuredRange { two_theta, min, max });
        }
        let upper = self.angles.partition_point(|&a| a < two_theta);
        if upper == 0 {
            return Ok(self.intensities[0]);
        }
        let (x0, x1) = (self.angles[upper - 1], self.angles[upper]);
        let (y0, y1) = (self.intensities[upper - 1], self.intensities[upper]);
        if x1 == x0 {
            return Ok(y1);
        }
        Ok(y0 + (y1 - y0) * (two_theta - x0) / (x1 - x0))
    }

    /// Replaces the peak list with the output of `extractor` run on the
    /// continuous trace. On failure the previous peaks are kept.
    pub fn extract_peaks(&mut self, extractor: &dyn PeakExtractor) -> Result<usize, ExtractionError> {
        let mut peaks = extractor.extract(&self.angles, &self.intensities)?;
        let (min, max) = (self.settings.min_two_theta, self.settings.max_two_theta);
        for peak in &peaks {
            if peak.intensity() < 0.0 {
                return Err(ExtractionError::NegativeIntensity {
                    two_theta: peak.two_theta(),
                    intensity: peak.intensity(),
                });
            }
            if peak.two_theta() < min || peak.two_theta() > max {
                return Err(ExtractionError::PeakOutsideRange {
                    two_theta: peak.two_theta(),
                    min,
                    max,
                });
            }
        }
        peaks.sort_by(|a, b| a.two_theta().total_cmp(&b.two_theta()));
        debug!(count = peaks.len(), "Attached extracted peaks");
        self.peaks = peaks;
        Ok(self.peaks.len())
    }
}
