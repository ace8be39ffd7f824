//! # Peaks Module
//!
//! Discrete diffraction peaks. [`reflection::Reflection`] is a calculated
//! plane family carrying its geometry and intensity model;
//! [`diffraction_peak::DiffractionPeak`] is the reduced angle/intensity pair
//! shared by measured and calculated patterns. [`generator`] enumerates the
//! symmetry-distinct reflections of a structure within an angular window.

pub mod diffraction_peak;
pub mod generator;
pub mod reflection;
