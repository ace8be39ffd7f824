//! Crystal descriptions in TOML: a cell, the symmetry operations of the space
//! group and the atoms of the asymmetric unit.
//!
//! ```toml
//! [lattice]
//! lengths = [3.61, 3.61, 3.61]
//! angles = [90.0, 90.0, 90.0]
//! system = "cubic"
//!
//! [[operations]]
//! rotation = [[0, 1, 0], [-1, 0, 0], [0, 0, 1]]
//! translation = [0.0, 0.0, 0.5]
//!
//! [[atoms]]
//! element = "Cu"
//! position = [0.0, 0.0, 0.0]
//! ```
//!
//! Operations are closed into a group on load, so generators are enough. With
//! no operations the structure is P1.

use crate::error::{CliError, Result};
use anyhow::Context;
use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use xrdpp::core::models::element::Element;
use xrdpp::core::models::lattice::Lattice;
use xrdpp::core::models::structure::{Atom, Structure};
use xrdpp::core::models::symmetry::{LatticeSystem, Symmetry, SymmetryOperation};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct LatticeSection {
    lengths: [f64; 3],
    angles: [f64; 3],
    #[serde(default)]
    system: LatticeSystem,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct OperationSection {
    rotation: [[f64; 3]; 3],
    #[serde(default)]
    translation: [f64; 3],
}

fn full_occupancy() -> f64 {
    1.0
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct AtomSection {
    element: String,
    position: [f64; 3],
    #[serde(default = "full_occupancy")]
    occupancy: f64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct CrystalFile {
    lattice: LatticeSection,
    #[serde(default)]
    operations: Vec<OperationSection>,
    atoms: Vec<AtomSection>,
}

#[derive(Debug, Clone)]
pub struct Crystal {
    pub structure: Structure,
    pub symmetry: Symmetry,
}

pub fn load(path: &Path) -> Result<Crystal> {
    let content = std::fs::read_to_string(path)?;
    let crystal = parse(&content).map_err(|source| CliError::CrystalFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        atoms = crystal.structure.atoms().len(),
        orbits = crystal.symmetry.orbits().len(),
        operations = crystal.symmetry.operations().len(),
        "Loaded crystal from {}",
        path.display()
    );
    Ok(crystal)
}

pub fn parse(content: &str) -> anyhow::Result<Crystal> {
    let file: CrystalFile = toml::from_str(content)?;

    let lattice = Lattice::from_parameters(
        &Vector3::from(file.lattice.lengths),
        &Vector3::from(file.lattice.angles),
    )?;

    let mut operations = Vec::with_capacity(file.operations.len());
    for (index, op) in file.operations.iter().enumerate() {
        let r = op.rotation;
        let rotation = Matrix3::new(
            r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
        );
        let operation = SymmetryOperation::new(rotation, Vector3::from(op.translation))
            .with_context(|| format!("operation {} is not a crystallographic operation", index + 1))?;
        operations.push(operation);
    }

    let mut atoms = Vec::with_capacity(file.atoms.len());
    for atom in &file.atoms {
        let element: Element = atom
            .element
            .parse()
            .with_context(|| format!("atom '{}'", atom.element))?;
        atoms.push(Atom::new(element, Vector3::from(atom.position)).with_occupancy(atom.occupancy));
    }

    let (structure, symmetry) =
        Symmetry::expand(lattice, atoms, &operations, file.lattice.system)?;
    Ok(Crystal {
        structure,
        symmetry,
    })
}
