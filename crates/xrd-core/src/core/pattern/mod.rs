//! # Pattern Module
//!
//! Diffraction patterns in their two concrete kinds.
//!
//! ## Overview
//!
//! - [`experimental::ExperimentalPattern`] holds measured data: either a
//!   continuous angle/intensity trace or a list of already-integrated peaks.
//! - [`calculated::CalculatedPattern`] holds reflections computed from a
//!   structure together with every refinable profile parameter.
//!
//! [`Pattern`] is the closed union of the two. It exposes the capabilities a
//! reference pattern must offer during matching and refinement: its peaks,
//! the angles it was measured at, the intensities at those angles and the
//! intensity at an arbitrary angle.

use crate::core::peaks::diffraction_peak::DiffractionPeak;
use crate::core::scattering::{Method, ScatteringError};
use thiserror::Error;

pub mod calculated;
pub mod experimental;

use calculated::CalculatedPattern;
use experimental::ExperimentalPattern;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatternError {
    #[error("No structure has been defined for the calculated pattern")]
    StructureNotDefined,
    #[error("Peaks must be matched to the reference pattern before computing a peak R factor")]
    MatchingNotRun,
    #[error("Pattern contains no peaks")]
    NoPeaks,
    #[error("Pattern has no continuous intensity trace")]
    NoContinuousTrace,
    #[error("Angle {two_theta} lies outside the measured range [{min}, {max}]")]
    OutOfMeasuredRange { two_theta: f64, min: f64, max: f64 },
    #[error("R factor method '{0}' cannot be used here")]
    UnsupportedResidual(String),
    #[error("Expected {expected} thermal factors (one per orbit), found {found}")]
    OrbitMismatch { expected: usize, found: usize },
    #[error("Got {angles} angles but {intensities} intensities")]
    LengthMismatch { angles: usize, intensities: usize },
    #[error("Pattern contains no measurements")]
    EmptyPattern,
    #[error("Scattering error: {0}")]
    Scattering(#[from] ScatteringError),
}

/// Acquisition settings shared by every pattern kind. Angles are 2θ in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSettings {
    pub method: Method,
    /// Wavelength of the incident radiation in Angstroms.
    pub wavelength: f64,
    pub min_two_theta: f64,
    pub max_two_theta: f64,
    /// Angular step used when synthesizing a profile without measured angles.
    pub resolution: f64,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            method: Method::XRay,
            wavelength: 1.5418,
            min_two_theta: 10.0,
            max_two_theta: 100.0,
            resolution: 0.02,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Experimental(ExperimentalPattern),
    Calculated(CalculatedPattern),
}

impl Pattern {
    pub fn settings(&self) -> &PatternSettings {
        match self {
            Self::Experimental(p) => p.settings(),
            Self::Calculated(p) => p.settings(),
        }
    }

    /// Peaks as they would be observed; calculated intensities include the
    /// pattern's optimal scale factor.
    pub fn peaks(&self) -> Vec<DiffractionPeak> {
        match self {
            Self::Experimental(p) => p.peaks().to_vec(),
            Self::Calculated(p) => p.scaled_peaks(),
        }
    }

    /// Whether the pattern can provide intensities on a continuous angle grid.
    pub fn has_profile(&self) -> bool {
        match self {
            Self::Experimental(p) => p.is_continuous(),
            Self::Calculated(_) => true,
        }
    }

    pub fn measurement_angles(&self) -> Vec<f64> {
        match self {
            Self::Experimental(p) => p.measurement_angles().to_vec(),
            Self::Calculated(p) => p.measurement_angles(),
        }
    }

    pub fn measured_intensities(&self) -> Vec<f64> {
        match self {
            Self::Experimental(p) => p.measured_intensities().to_vec(),
            Self::Calculated(p) => p.scaled_intensities(&p.measurement_angles()),
        }
    }

    pub fn intensity_at(&self, two_theta: f64) -> Result<f64, PatternError> {
        match self {
            Self::Experimental(p) => p.intensity_at(two_theta),
            Self::Calculated(p) => Ok(p.scaled_intensities(&[two_theta])[0]),
        }
    }
}

impl From<ExperimentalPattern> for Pattern {
    fn from(pattern: ExperimentalPattern) -> Self {
        Self::Experimental(pattern)
    }
}

impl From<CalculatedPattern> for Pattern {
    fn from(pattern: CalculatedPattern) -> Self {
        Self::Calculated(pattern)
    }
}
