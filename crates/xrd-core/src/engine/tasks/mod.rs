//! Seeding heuristics run between refinement stages.
//!
//! Each task inspects the reference profile (and, where relevant, the current
//! reflection list) and produces a starting value for a parameter group that
//! the minimizer would otherwise start far from its optimum.

pub mod background_guess;
pub mod width_guess;
