//! # Core Module
//!
//! Stateless data models and the physics of powder diffraction.
//!
//! ## Architecture
//!
//! - **Crystal Representation** ([`models`]) - Lattices, atoms, structures and symmetry orbits
//! - **Scattering Physics** ([`scattering`]) - Form factors, thermal damping, Lorentz-polarization and texture
//! - **Discrete Peaks** ([`peaks`]) - Reflection generation and the reflection/peak types
//! - **Continuous Signals** ([`profile`]) - Pseudo-Voigt peak profiles and polynomial backgrounds
//! - **Patterns** ([`pattern`]) - Experimental and calculated patterns behind one closed type
//! - **Comparison** ([`matching`]) - Peak matching and R-factor residuals
//!
//! Nothing in this layer holds refinement state. Structures are owned by the
//! caller and only borrowed by patterns; the refinement machinery lives in
//! [`crate::engine`].

pub mod matching;
pub mod models;
pub mod pattern;
pub mod peaks;
pub mod profile;
pub mod scattering;
