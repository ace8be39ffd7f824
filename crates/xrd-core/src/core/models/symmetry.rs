use super::lattice::{Lattice, LatticeError};
use super::structure::{Atom, Structure, move_into_cell, periodic_distance};
use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;
use thiserror::Error;

const MATRIX_TOLERANCE: f64 = 1e-6;
const POSITION_TOLERANCE: f64 = 1e-3;
const MAX_OPERATION_ORDER: usize = 12;
const MAX_GROUP_SIZE: usize = 192;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SymmetryError {
    #[error("Lattice error: {0}")]
    Lattice(#[from] LatticeError),

    #[error("Rotation matrix is not an integer matrix with determinant ±1: {0:?}")]
    InvalidRotation(Matrix3<f64>),

    #[error("Operation has no finite order below {MAX_OPERATION_ORDER}")]
    InfiniteOrder,

    #[error("Group generated from the supplied operations exceeds {MAX_GROUP_SIZE} elements")]
    GroupTooLarge,

    #[error("The asymmetric unit contains no atoms")]
    EmptyAsymmetricUnit,

    #[error("Orbit needs one generator per atom and at least one atom; got {atoms} atoms and {generators} generators")]
    MalformedOrbit { atoms: usize, generators: usize },

    #[error("Orbit {orbit} refers to atom {atom}, but the structure has {count} atoms")]
    MissingOrbitAtom { orbit: usize, atom: usize, count: usize },
}

/// A space-group operation acting on fractional coordinates as `x' = W·x + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOperation {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl SymmetryOperation {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Result<Self, SymmetryError> {
        let is_integral = rotation
            .iter()
            .all(|v| (v - v.round()).abs() < MATRIX_TOLERANCE);
        let det = rotation.determinant();
        if !is_integral || (det.abs() - 1.0).abs() > MATRIX_TOLERANCE {
            return Err(SymmetryError::InvalidRotation(rotation));
        }
        Ok(Self {
            rotation: rotation.map(f64::round),
            translation,
        })
    }

    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn has_identity_rotation(&self) -> bool {
        (self.rotation - Matrix3::identity()).abs().max() < MATRIX_TOLERANCE
    }

    pub fn apply(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * position + self.translation
    }

    /// `self ∘ other`, with the translation reduced into the unit cell.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: move_into_cell(&(self.rotation * other.translation + self.translation)),
        }
    }

    /// Image of a plane index under this operation's point part (`Wᵀ·hkl`).
    pub fn transform_plane(&self, hkl: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.transpose() * hkl
    }

    pub fn order(&self) -> Result<usize, SymmetryError> {
        let mut power = self.rotation;
        for n in 1..=MAX_OPERATION_ORDER {
            if (power - Matrix3::identity()).abs().max() < MATRIX_TOLERANCE {
                return Ok(n);
            }
            power *= self.rotation;
        }
        Err(SymmetryError::InfiniteOrder)
    }

    /// The screw/glide component `(1/n)·Σ Wᵏ·t` of the translation.
    pub fn intrinsic_translation(&self) -> Result<Vector3<f64>, SymmetryError> {
        let order = self.order()?;
        let mut sum = Vector3::zeros();
        let mut power = Matrix3::identity();
        for _ in 0..order {
            sum += power * self.translation;
            power *= self.rotation;
        }
        Ok(sum / order as f64)
    }

    fn is_equivalent(&self, other: &Self) -> bool {
        (self.rotation - other.rotation).abs().max() < MATRIX_TOLERANCE
            && periodic_distance(&self.translation, &other.translation) < MATRIX_TOLERANCE
    }
}

/// Closes a set of operations under composition, modulo lattice translations.
pub fn close_group(generators: &[SymmetryOperation]) -> Result<Vec<SymmetryOperation>, SymmetryError> {
    let mut group = vec![SymmetryOperation::identity()];
    for op in generators {
        let normalized = SymmetryOperation {
            rotation: op.rotation,
            translation: move_into_cell(&op.translation),
        };
        if !group.iter().any(|g| g.is_equivalent(&normalized)) {
            group.push(normalized);
        }
    }

    let mut start = 0;
    while start < group.len() {
        let end = group.len();
        for i in 0..end {
            // Pairs of two already-closed operations were composed in an earlier round.
            let first_j = if i < start { start } else { 0 };
            for j in first_j..end {
                let candidate = group[i].compose(&group[j]);
                if !group.iter().any(|g| g.is_equivalent(&candidate)) {
                    group.push(candidate);
                    if group.len() > MAX_GROUP_SIZE {
                        return Err(SymmetryError::GroupTooLarge);
                    }
                }
            }
        }
        start = end;
    }
    Ok(group)
}

/// Affine projection `x' = P·(x − x₀) + x₀` onto the subspace of positions
/// allowed for an atom on a special position.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialPosition {
    projection: Matrix3<f64>,
    anchor: Vector3<f64>,
}

impl SpecialPosition {
    pub fn new(projection: Matrix3<f64>, anchor: Vector3<f64>) -> Self {
        Self { projection, anchor }
    }

    pub fn general() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    pub fn projection(&self) -> &Matrix3<f64> {
        &self.projection
    }

    pub fn anchor(&self) -> &Vector3<f64> {
        &self.anchor
    }

    pub fn project(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.projection * (position - self.anchor) + self.anchor
    }
}

/// A set of symmetry-equivalent atoms.
///
/// `atoms[0]` is the representative; `generators[i]` maps the representative
/// onto `atoms[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Orbit {
    atoms: Vec<usize>,
    generators: Vec<SymmetryOperation>,
    special_position: SpecialPosition,
}

impl Orbit {
    pub fn new(
        atoms: Vec<usize>,
        generators: Vec<SymmetryOperation>,
        special_position: SpecialPosition,
    ) -> Result<Self, SymmetryError> {
        if atoms.is_empty() || atoms.len() != generators.len() {
            return Err(SymmetryError::MalformedOrbit {
                atoms: atoms.len(),
                generators: generators.len(),
            });
        }
        Ok(Self {
            atoms,
            generators,
            special_position,
        })
    }

    pub fn representative(&self) -> usize {
        self.atoms[0]
    }

    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn generators(&self) -> &[SymmetryOperation] {
        &self.generators
    }

    pub fn special_position(&self) -> &SpecialPosition {
        &self.special_position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LatticeSystem {
    #[default]
    Triclinic,
    Monoclinic,
    Orthorhombic,
    Tetragonal,
    /// Rhombohedral axes: a = b = c, α = β = γ.
    Trigonal,
    Hexagonal,
    Cubic,
}

impl LatticeSystem {
    /// Snaps cell lengths and angles onto the constraints of this system.
    pub fn constrain(&self, lengths: &Vector3<f64>, angles: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let mean_ab = (lengths.x + lengths.y) / 2.0;
        let mean_abc = lengths.sum() / 3.0;
        let right = Vector3::new(90.0, 90.0, 90.0);
        match self {
            Self::Triclinic => (*lengths, *angles),
            Self::Monoclinic => (*lengths, Vector3::new(90.0, angles.y, 90.0)),
            Self::Orthorhombic => (*lengths, right),
            Self::Tetragonal => (Vector3::new(mean_ab, mean_ab, lengths.z), right),
            Self::Trigonal => {
                let mean_angle = angles.sum() / 3.0;
                (
                    Vector3::from_element(mean_abc),
                    Vector3::from_element(mean_angle),
                )
            }
            Self::Hexagonal => (
                Vector3::new(mean_ab, mean_ab, lengths.z),
                Vector3::new(90.0, 90.0, 120.0),
            ),
            Self::Cubic => (Vector3::from_element(mean_abc), right),
        }
    }
}

/// Space-group description of a structure: its operations and the orbits
/// they partition the atoms into.
#[derive(Debug, Clone, PartialEq)]
pub struct Symmetry {
    operations: Vec<SymmetryOperation>,
    orbits: Vec<Orbit>,
    lattice_system: LatticeSystem,
}

impl Symmetry {
    pub fn new(
        operations: Vec<SymmetryOperation>,
        orbits: Vec<Orbit>,
        lattice_system: LatticeSystem,
    ) -> Self {
        Self {
            operations,
            orbits,
            lattice_system,
        }
    }

    pub fn operations(&self) -> &[SymmetryOperation] {
        &self.operations
    }

    pub fn orbits(&self) -> &[Orbit] {
        &self.orbits
    }

    pub fn lattice_system(&self) -> LatticeSystem {
        self.lattice_system
    }

    /// Checks that every orbit member is an atom of `structure`.
    pub fn check_structure(&self, structure: &Structure) -> Result<(), SymmetryError> {
        let count = structure.atoms().len();
        for (orbit, members) in self.orbits.iter().enumerate() {
            if let Some(&atom) = members.atoms().iter().find(|&&atom| atom >= count) {
                return Err(SymmetryError::MissingOrbitAtom { orbit, atom, count });
            }
        }
        Ok(())
    }

    /// Builds a lattice from proposed lengths and angles after snapping them
    /// onto the lattice-system constraints.
    pub fn refine_basis(
        &self,
        lengths: &Vector3<f64>,
        angles: &Vector3<f64>,
    ) -> Result<Lattice, LatticeError> {
        let (lengths, angles) = self.lattice_system.constrain(lengths, angles);
        Lattice::from_parameters(&lengths, &angles)
    }

    /// Generates the full structure and its orbits from an asymmetric unit.
    ///
    /// The operation list is closed into a group first. Each asymmetric-unit atom
    /// becomes the representative of one orbit; its special-position projector
    /// is the average of the point parts of its site-stabilizer operations.
    pub fn expand(
        lattice: Lattice,
        asymmetric_unit: Vec<Atom>,
        operations: &[SymmetryOperation],
        lattice_system: LatticeSystem,
    ) -> Result<(Structure, Symmetry), SymmetryError> {
        if asymmetric_unit.is_empty() {
            return Err(SymmetryError::EmptyAsymmetricUnit);
        }
        let group = close_group(operations)?;

        let mut atoms = Vec::new();
        let mut orbits = Vec::with_capacity(asymmetric_unit.len());
        for representative in asymmetric_unit {
            let origin = move_into_cell(&representative.fractional);
            let mut images: Vec<Vector3<f64>> = Vec::new();
            let mut generators = Vec::new();
            let mut stabilizer: Vec<Matrix3<f64>> = Vec::new();

            for op in &group {
                let image = move_into_cell(&op.apply(&origin));
                if periodic_distance(&image, &origin) < POSITION_TOLERANCE
                    && !stabilizer
                        .iter()
                        .any(|r| (r - op.rotation).abs().max() < MATRIX_TOLERANCE)
                {
                    stabilizer.push(op.rotation);
                }
                if !images
                    .iter()
                    .any(|p| periodic_distance(p, &image) < POSITION_TOLERANCE)
                {
                    images.push(image);
                    generators.push(op.clone());
                }
            }

            let projection =
                stabilizer.iter().fold(Matrix3::zeros(), |acc, r| acc + r) / stabilizer.len() as f64;
            let first_index = atoms.len();
            for image in &images {
                atoms.push(Atom {
                    element: representative.element,
                    fractional: *image,
                    occupancy: representative.occupancy,
                });
            }
            orbits.push(Orbit::new(
                (first_index..atoms.len()).collect(),
                generators,
                SpecialPosition::new(projection, origin),
            )?);
        }

        Ok((
            Structure::new(lattice, atoms),
            Symmetry::new(group, orbits, lattice_system),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use itertools::Itertools;

    const TOLERANCE: f64 = 1e-9;

    pub(crate) fn cubic_point_group() -> Vec<SymmetryOperation> {
        let mut ops = Vec::with_capacity(48);
        for perm in (0..3).permutations(3) {
            for signs in 0..8 {
                let mut rotation = Matrix3::zeros();
                for (row, &col) in perm.iter().enumerate() {
                    let sign = if signs & (1 << row) == 0 { 1.0 } else { -1.0 };
                    rotation[(row, col)] = sign;
                }
                ops.push(SymmetryOperation::new(rotation, Vector3::zeros()).unwrap());
            }
        }
        ops
    }

    pub(crate) fn face_centering() -> Vec<SymmetryOperation> {
        [
            Vector3::new(0.0, 0.5, 0.5),
            Vector3::new(0.5, 0.0, 0.5),
            Vector3::new(0.5, 0.5, 0.0),
        ]
        .into_iter()
        .map(|t| SymmetryOperation::new(Matrix3::identity(), t).unwrap())
        .collect()
    }

    fn cubic_lattice(a: f64) -> Lattice {
        Lattice::from_parameters(&Vector3::from_element(a), &Vector3::from_element(90.0)).unwrap()
    }

    #[test]
    fn rejects_non_integral_rotation() {
        let rotation = Matrix3::from_diagonal_element(0.5);
        assert!(matches!(
            SymmetryOperation::new(rotation, Vector3::zeros()),
            Err(SymmetryError::InvalidRotation(_))
        ));
    }

    #[test]
    fn order_of_threefold_axis_is_three() {
        let rotation = Matrix3::new(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        let op = SymmetryOperation::new(rotation, Vector3::zeros()).unwrap();
        assert_eq!(op.order().unwrap(), 3);
    }

    #[test]
    fn intrinsic_translation_of_screw_axis_is_half_along_axis() {
        // 2_1 along z: (-x, -y, z + 1/2)
        let rotation = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
        let op = SymmetryOperation::new(rotation, Vector3::new(0.3, 0.1, 0.5)).unwrap();
        let intrinsic = op.intrinsic_translation().unwrap();
        assert!((intrinsic - Vector3::new(0.0, 0.0, 0.5)).norm() < TOLERANCE);
    }

    #[test]
    fn closing_generators_of_cubic_group_yields_48_operations() {
        let fourfold = SymmetryOperation::new(
            Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0),
            Vector3::zeros(),
        )
        .unwrap();
        let threefold = SymmetryOperation::new(
            Matrix3::new(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0),
            Vector3::zeros(),
        )
        .unwrap();
        let inversion =
            SymmetryOperation::new(-Matrix3::identity(), Vector3::zeros()).unwrap();
        let group = close_group(&[fourfold, threefold, inversion]).unwrap();
        assert_eq!(group.len(), 48);
    }

    #[test]
    fn face_centered_copper_expands_to_four_atoms_in_one_orbit() {
        let mut ops = cubic_point_group();
        ops.extend(face_centering());
        let copper = Element::from_atomic_number(29).unwrap();
        let (structure, symmetry) = Symmetry::expand(
            cubic_lattice(3.615),
            vec![Atom::new(copper, Vector3::zeros())],
            &ops,
            LatticeSystem::Cubic,
        )
        .unwrap();

        assert_eq!(symmetry.operations().len(), 192);
        assert_eq!(structure.atoms().len(), 4);
        assert_eq!(symmetry.orbits().len(), 1);
        let orbit = &symmetry.orbits()[0];
        assert_eq!(orbit.atoms(), &[0, 1, 2, 3]);
        assert!(orbit.special_position().projection().norm() < TOLERANCE);
    }

    #[test]
    fn general_position_keeps_full_freedom() {
        let copper = Element::from_atomic_number(29).unwrap();
        let (structure, symmetry) = Symmetry::expand(
            cubic_lattice(5.0),
            vec![Atom::new(copper, Vector3::new(0.1, 0.2, 0.3))],
            &cubic_point_group(),
            LatticeSystem::Cubic,
        )
        .unwrap();
        assert_eq!(structure.atoms().len(), 48);
        let special = symmetry.orbits()[0].special_position();
        assert!((special.projection() - Matrix3::identity()).norm() < TOLERANCE);
    }

    #[test]
    fn special_position_on_body_diagonal_projects_onto_the_diagonal() {
        let copper = Element::from_atomic_number(29).unwrap();
        let (_, symmetry) = Symmetry::expand(
            cubic_lattice(5.0),
            vec![Atom::new(copper, Vector3::new(0.2, 0.2, 0.2))],
            &cubic_point_group(),
            LatticeSystem::Cubic,
        )
        .unwrap();
        let special = symmetry.orbits()[0].special_position();
        let projected = special.project(&Vector3::new(0.26, 0.2, 0.2));
        assert!((projected - Vector3::from_element(0.22)).norm() < TOLERANCE);
    }

    #[test]
    fn generators_map_representative_onto_each_orbit_member() {
        let copper = Element::from_atomic_number(29).unwrap();
        let (structure, symmetry) = Symmetry::expand(
            cubic_lattice(5.0),
            vec![Atom::new(copper, Vector3::new(0.1, 0.0, 0.0))],
            &cubic_point_group(),
            LatticeSystem::Cubic,
        )
        .unwrap();
        let orbit = &symmetry.orbits()[0];
        assert_eq!(orbit.atoms().len(), 6);
        let origin = structure.atoms()[orbit.representative()].fractional;
        for (&atom, generator) in orbit.atoms().iter().zip(orbit.generators()) {
            let image = move_into_cell(&generator.apply(&origin));
            assert!(periodic_distance(&image, &structure.atoms()[atom].fractional) < TOLERANCE);
        }
    }

    #[test]
    fn refine_basis_snaps_cubic_cell() {
        let symmetry = Symmetry::new(vec![], vec![], LatticeSystem::Cubic);
        let lattice = symmetry
            .refine_basis(&Vector3::new(4.0, 4.1, 4.2), &Vector3::new(89.0, 91.0, 90.5))
            .unwrap();
        assert!((lattice.lengths() - Vector3::from_element(4.1)).norm() < TOLERANCE);
        assert!((lattice.angles() - Vector3::from_element(90.0)).norm() < 1e-9);
    }

    #[test]
    fn hexagonal_constraint_fixes_gamma_at_120() {
        let (lengths, angles) = LatticeSystem::Hexagonal
            .constrain(&Vector3::new(3.0, 3.2, 5.0), &Vector3::new(91.0, 89.0, 118.0));
        assert!((lengths - Vector3::new(3.1, 3.1, 5.0)).norm() < TOLERANCE);
        assert_eq!(angles, Vector3::new(90.0, 90.0, 120.0));
    }

    #[test]
    fn empty_asymmetric_unit_is_rejected() {
        assert_eq!(
            Symmetry::expand(cubic_lattice(4.0), vec![], &[], LatticeSystem::Cubic),
            Err(SymmetryError::EmptyAsymmetricUnit)
        );
    }

    #[test]
    fn orbits_need_one_generator_per_atom() {
        let identity = SymmetryOperation::identity;
        assert_eq!(
            Orbit::new(vec![], vec![], SpecialPosition::general()),
            Err(SymmetryError::MalformedOrbit {
                atoms: 0,
                generators: 0
            })
        );
        assert!(Orbit::new(vec![0, 1], vec![identity()], SpecialPosition::general()).is_err());
        let orbit = Orbit::new(vec![3], vec![identity()], SpecialPosition::general()).unwrap();
        assert_eq!(orbit.representative(), 3);
    }

    #[test]
    fn orbit_members_must_exist_in_the_structure() {
        let copper = Element::from_atomic_number(29).unwrap();
        let structure = Structure::new(
            cubic_lattice(3.6),
            vec![Atom::new(copper, Vector3::zeros())],
        );
        let dangling = Symmetry::new(
            vec![SymmetryOperation::identity()],
            vec![Orbit::new(vec![2], vec![SymmetryOperation::identity()], SpecialPosition::general()).unwrap()],
            LatticeSystem::Cubic,
        );
        assert_eq!(
            dangling.check_structure(&structure),
            Err(SymmetryError::MissingOrbitAtom {
                orbit: 0,
                atom: 2,
                count: 1
            })
        );

        let (structure, symmetry) = Symmetry::expand(
            cubic_lattice(3.6),
            vec![Atom::new(copper, Vector3::zeros())],
            &face_centering(),
            LatticeSystem::Cubic,
        )
        .unwrap();
        assert_eq!(symmetry.check_structure(&structure), Ok(()));
    }
}
