//! # Profile Module
//!
//! Continuous signals synthesized from discrete peaks: pseudo-Voigt peak
//! profiles with Caglioti broadening and angle-dependent shifts
//! ([`peak_shape`]), and the polynomial background ([`background`]).

pub mod background;
pub mod peak_shape;
