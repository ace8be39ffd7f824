//! # Core Models Module
//!
//! Data structures describing a crystal: its unit cell, the atoms it contains
//! and the space-group symmetry relating them.
//!
//! ## Key Components
//!
//! - [`element`] - Chemical elements addressed by symbol or atomic number
//! - [`lattice`] - Unit cell basis, its inverse and a Lagrange-reduced companion
//! - [`structure`] - Atoms in fractional coordinates plus the owning lattice
//! - [`symmetry`] - Symmetry operations, orbits of equivalent atoms and
//!   lattice-system constraints used during refinement
//!
//! ## Usage
//!
//! ```ignore
//! use xrdpp::core::models::{lattice::Lattice, structure::Atom, symmetry::{Symmetry, LatticeSystem}};
//!
//! let lattice = Lattice::from_parameters(&Vector3::from_element(3.615), &Vector3::from_element(90.0))?;
//! let copper = Atom::new("Cu".parse()?, Vector3::zeros());
//! let (structure, symmetry) = Symmetry::expand(lattice, vec![copper], &operations, LatticeSystem::Cubic)?;
//! ```

pub mod element;
pub mod lattice;
pub mod structure;
pub mod symmetry;
