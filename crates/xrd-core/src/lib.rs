//! # XRD++ Core Library
//!
//! A library for calculating powder diffraction patterns of crystal structures
//! and refining those structures against measured patterns.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that the physics,
//! the refinement machinery and the user-facing procedures can be tested in
//! isolation.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Lattice`, `Structure`,
//!   `Symmetry`) and pure physics: scattering factors, reflection generation,
//!   peak profiles, backgrounds, pattern variants, peak matching and R factors.
//!
//! - **[`engine`]: The Refinement Core.** Maps refinable parameter groups onto a
//!   bounded parameter vector, minimizes residuals through a pluggable bounded
//!   minimizer, and seeds hard-to-start groups such as the background and the
//!   peak width.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into
//!   complete procedures: calculating a pattern, peak-based refinement and
//!   staged Rietveld refinement. Each returns the refined pattern with a report
//!   of every refinable parameter.

pub mod core;
pub mod engine;
pub mod workflows;
