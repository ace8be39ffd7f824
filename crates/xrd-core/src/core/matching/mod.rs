//! # Matching Module
//!
//! Alignment of calculated peaks to a reference pattern ([`matcher`]) and the
//! R-factor residuals scoring the agreement ([`residual`]).

pub mod matcher;
pub mod residual;
