//! # Engine Module
//!
//! The refinement machinery that drives a calculated pattern toward a
//! reference pattern.
//!
//! ## Overview
//!
//! Refinement is a sequence of bounded minimizations, each over a *refining
//! set*: a subset of the parameter groups of the structure and pattern. The
//! engine turns a refining set into a flat parameter vector with bounds, hands
//! it to a minimizer, and writes the optimum back. No refinement state lives
//! outside the values passed into each call.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Refinement mode, targets, limits and optimizer settings
//! - **Error Handling** ([`error`]) - Engine-level error type wrapping the lower layers
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Parameter Mapping** ([`parameters`]) - Refining sets and their extract/apply/bounds steps
//! - **Minimization** ([`optimizer`]) - The bounded minimizer seam and its quasi-Newton implementation
//! - **Sessions** ([`session`]) - One structure + pattern bound to one reference
//! - **Seeding** ([`tasks`]) - Starting-value heuristics for background and peak width

pub mod config;
pub mod error;
pub mod optimizer;
pub mod parameters;
pub mod progress;
pub mod session;
pub mod tasks;
