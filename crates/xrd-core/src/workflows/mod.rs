//! # Workflows Module
//!
//! High-level procedures that combine the core models and the refinement
//! engine into complete runs.
//!
//! ## Overview
//!
//! A workflow takes a structure, its symmetry and (for refinement) a reference
//! pattern, and returns a calculated pattern together with a report that a
//! formatting layer can print without reaching back into the engine.
//!
//! ## Available Workflows
//!
//! - **Calculation** ([`calculate`]) - The pattern of a structure with no reference
//! - **Peak-Based Refinement** ([`peak_refinement`]) - Positions and thermal factors against integrated peaks
//! - **Rietveld Refinement** ([`rietveld`]) - Staged full-profile refinement against a measured trace
//! - **Reporting** ([`report`]) - Per-stage R factors, reflections and parameter snapshots
//!
//! [`refine`] picks the refinement workflow from the configured mode.

pub mod calculate;
pub mod peak_refinement;
pub mod report;
pub mod rietveld;

use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::pattern::Pattern;
use crate::core::pattern::calculated::CalculatedPattern;
use crate::engine::config::{RefinementConfig, RefinementMode};
use crate::engine::error::EngineError;
use crate::engine::progress::ProgressReporter;
use report::RefinementResult;

/// Runs the refinement workflow selected by `config.mode`.
pub fn refine(
    structure: &mut Structure,
    symmetry: &Symmetry,
    reference: &Pattern,
    config: &RefinementConfig,
    reporter: &ProgressReporter,
) -> Result<RefinementResult, EngineError> {
    match config.mode {
        RefinementMode::PeakBased => {
            peak_refinement::run(structure, symmetry, reference, config, reporter)
        }
        RefinementMode::Rietveld => rietveld::run(structure, symmetry, reference, config, reporter),
    }
}

/// A calculated pattern bound to `structure` and adopted onto the method,
/// wavelength, range and grid of `reference`.
fn prepare_pattern(
    structure: &Structure,
    symmetry: &Symmetry,
    reference: &Pattern,
    config: &RefinementConfig,
) -> Result<CalculatedPattern, EngineError> {
    let mut pattern = CalculatedPattern::new(reference.settings().clone())
        .with_background(config.background.kind, config.background.terms);
    pattern.define_structure(structure, symmetry)?;
    pattern.adopt_reference(reference, structure, symmetry)?;
    Ok(pattern)
}
