use super::config::ConfigError;
use super::optimizer::OptimizerError;
use crate::core::models::lattice::LatticeError;
use crate::core::models::symmetry::SymmetryError;
use crate::core::pattern::PatternError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lattice error: {0}")]
    Lattice(#[from] LatticeError),

    #[error("Symmetry error: {0}")]
    Symmetry(#[from] SymmetryError),

    #[error("Parameter vector has {found} values but the refining set needs {expected}")]
    ParameterCount { expected: usize, found: usize },

    #[error("Refinement stage '{phase}' failed: {reason}")]
    PhaseFailed { phase: &'static str, reason: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
