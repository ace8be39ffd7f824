//! # Scattering Module
//!
//! Physical factors entering the integrated intensity of a reflection: the
//! tabulated atomic scattering factor, thermal damping, the Lorentz-polarization
//! correction and March-Dollase preferred orientation.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod factors;
pub mod table;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScatteringError {
    #[error("No scattering-factor coefficients for atomic number {atomic_number}")]
    UnsupportedElement { atomic_number: u8 },
    #[error("Unknown diffraction method: '{0}'")]
    UnknownMethod(String),
}

/// Radiation model used when computing intensities.
///
/// Neutron patterns currently share the X-ray form-factor model.
/// [`Method::Simple`] drops the thermal factor entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    #[default]
    XRay,
    Neutron,
    Simple,
}

impl Method {
    pub fn uses_thermal_factor(&self) -> bool {
        !matches!(self, Self::Simple)
    }
}

impl FromStr for Method {
    type Err = ScatteringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x-ray" | "xray" => Ok(Self::XRay),
            "neutron" => Ok(Self::Neutron),
            "simple" => Ok(Self::Simple),
            other => Err(ScatteringError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::XRay => "x-ray",
            Self::Neutron => "neutron",
            Self::Simple => "simple",
        };
        f.write_str(name)
    }
}
