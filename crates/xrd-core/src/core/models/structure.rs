use super::element::Element;
use super::lattice::Lattice;
use nalgebra::Vector3;

const CELL_EDGE_TOLERANCE: f64 = 1e-12;

/// An atom of a crystal structure, located by fractional coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Chemical identity of the atom, used to look up scattering coefficients.
    pub element: Element,
    /// Position in fractional coordinates of the unit cell.
    pub fractional: Vector3<f64>,
    /// Site occupancy between 0 and 1.
    pub occupancy: f64,
}

impl Atom {
    pub fn new(element: Element, fractional: Vector3<f64>) -> Self {
        Self {
            element,
            fractional,
            occupancy: 1.0,
        }
    }

    pub fn with_occupancy(mut self, occupancy: f64) -> Self {
        self.occupancy = occupancy;
        self
    }
}

/// A crystal structure: a lattice plus the full list of atoms in the cell.
///
/// Refinement mutates the lattice and the atomic positions in place; the
/// structure itself is always owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    lattice: Lattice,
    atoms: Vec<Atom>,
}

impl Structure {
    pub fn new(lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Self { lattice, atoms }
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn set_lattice(&mut self, lattice: Lattice) {
        self.lattice = lattice;
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    /// Moves atom `index` to `fractional`, wrapped into the unit cell.
    /// Returns `false` when the index does not exist.
    pub fn set_fractional(&mut self, index: usize, fractional: &Vector3<f64>) -> bool {
        match self.atoms.get_mut(index) {
            Some(atom) => {
                atom.fractional = move_into_cell(fractional);
                true
            }
            None => false,
        }
    }
}

/// Wraps fractional coordinates into `[0, 1)`.
pub fn move_into_cell(position: &Vector3<f64>) -> Vector3<f64> {
    position.map(|c| {
        let wrapped = c - c.floor();
        if wrapped >= 1.0 - CELL_EDGE_TOLERANCE {
            0.0
        } else {
            wrapped
        }
    })
}

/// Distance between two fractional positions under periodic boundary conditions,
/// measured in fractional units.
pub fn periodic_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let d = a - b;
    d.map(|c| c - c.round()).norm()
}
