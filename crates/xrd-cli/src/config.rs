//! Layered configuration for the CLI.
//!
//! Values are resolved with the precedence CLI flag > `-S key=value` >
//! configuration file > built-in default.

pub mod builder;
pub mod defaults;
pub mod file;
pub mod models;

pub use builder::{build_calculate_config, build_refine_config};
pub use models::{CalculateConfig, RefineConfig};
