//! Mapping between the refinable state of a structure + pattern and the flat
//! parameter vector seen by the minimizer.
//!
//! The vector always lists active groups in the declaration order of
//! [`RefinementParameter`], which is also the iteration order of a
//! [`RefiningSet`].

use super::error::EngineError;
use super::optimizer::Bounds;
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::pattern::calculated::CalculatedPattern;
use crate::core::profile::peak_shape::{SPECIMEN_DISPLACEMENT, ZERO_SHIFT};
use nalgebra::Vector3;
use std::collections::BTreeSet;
use std::fmt;

const SHIFT_LIMIT: f64 = 0.1;
const MAX_W: f64 = 20.0;
const POSITION_LIMITS: (f64, f64) = (-1.0, 2.0);
const TEXTURE_LIMIT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefinementParameter {
    Scale,
    SpecimenDisplacement,
    Background,
    /// Three lengths then three angles.
    Lattice,
    /// U, V, η1, η2.
    AngleDependentShape,
    /// W, η0.
    AngleIndependentShape,
    /// Representative position of every orbit.
    Positions,
    /// One isotropic B factor per orbit.
    ThermalFactors,
    PreferredOrientation,
    ZeroShift,
}

impl RefinementParameter {
    /// Number of vector entries this group occupies.
    pub fn width(&self, symmetry: &Symmetry, pattern: &CalculatedPattern) -> usize {
        match self {
            Self::Scale | Self::SpecimenDisplacement | Self::ZeroShift => 1,
            Self::Background => pattern.background().coefficients().len(),
            Self::Lattice => 6,
            Self::AngleDependentShape => 4,
            Self::AngleIndependentShape => 2,
            Self::Positions => 3 * symmetry.orbits().len(),
            Self::ThermalFactors => symmetry.orbits().len(),
            Self::PreferredOrientation => 3,
        }
    }

    /// Whether a change to this group alters integrated intensities.
    pub fn affects_intensities(&self) -> bool {
        matches!(
            self,
            Self::Lattice | Self::Positions | Self::ThermalFactors | Self::PreferredOrientation
        )
    }
}

impl fmt::Display for RefinementParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scale => "scale",
            Self::SpecimenDisplacement => "specimen-displacement",
            Self::Background => "background",
            Self::Lattice => "lattice",
            Self::AngleDependentShape => "angle-dependent-shape",
            Self::AngleIndependentShape => "angle-independent-shape",
            Self::Positions => "positions",
            Self::ThermalFactors => "thermal-factors",
            Self::PreferredOrientation => "preferred-orientation",
            Self::ZeroShift => "zero-shift",
        };
        f.write_str(name)
    }
}

pub type RefiningSet = BTreeSet<RefinementParameter>;

/// Limits that depend on the refinement rather than on the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLimits {
    pub original_lengths: Vector3<f64>,
    pub original_angles: Vector3<f64>,
    pub max_lattice_change: f64,
    pub min_b_factor: f64,
    pub max_b_factor: f64,
}

pub fn dimension(set: &RefiningSet, symmetry: &Symmetry, pattern: &CalculatedPattern) -> usize {
    set.iter().map(|p| p.width(symmetry, pattern)).sum()
}

pub fn extract(
    set: &RefiningSet,
    structure: &Structure,
    symmetry: &Symmetry,
    pattern: &CalculatedPattern,
) -> Result<Vec<f64>, EngineError> {
    let mut values = Vec::with_capacity(dimension(set, symmetry, pattern));
    let shape = pattern.shape();
    for parameter in set {
        match parameter {
            RefinementParameter::Scale => values.push(pattern.optimal_scale()),
            RefinementParameter::SpecimenDisplacement => {
                values.push(shape.shift[SPECIMEN_DISPLACEMENT])
            }
            RefinementParameter::Background => {
                values.extend_from_slice(pattern.background().coefficients())
            }
            RefinementParameter::Lattice => {
                values.extend(structure.lattice().lengths().iter());
                values.extend(structure.lattice().angles().iter());
            }
            RefinementParameter::AngleDependentShape => {
                values.extend([shape.u, shape.v, shape.eta[1], shape.eta[2]])
            }
            RefinementParameter::AngleIndependentShape => values.extend([shape.w, shape.eta[0]]),
            RefinementParameter::Positions => {
                for orbit in symmetry.orbits() {
                    let atom = orbit.representative();
                    let Some(representative) = structure.atom(atom) else {
                        return Err(EngineError::Internal(format!(
                            "orbit refers to missing atom {atom}"
                        )));
                    };
                    values.extend(representative.fractional.iter());
                }
            }
            RefinementParameter::ThermalFactors => values.extend_from_slice(pattern.b_factors()),
            RefinementParameter::PreferredOrientation => {
                values.extend(pattern.preferred_orientation().iter())
            }
            RefinementParameter::ZeroShift => values.push(shape.shift[ZERO_SHIFT]),
        }
    }
    Ok(values)
}

pub fn bounds(
    set: &RefiningSet,
    limits: &ParameterLimits,
    symmetry: &Symmetry,
    pattern: &CalculatedPattern,
) -> Bounds {
    let mut bounds = Bounds::default();
    let f = limits.max_lattice_change;
    for parameter in set {
        match parameter {
            RefinementParameter::Scale => bounds.push(0.0, f64::INFINITY),
            RefinementParameter::SpecimenDisplacement | RefinementParameter::ZeroShift => {
                bounds.push(-SHIFT_LIMIT, SHIFT_LIMIT)
            }
            RefinementParameter::Background | RefinementParameter::AngleDependentShape => bounds
                .push_repeated(
                    parameter.width(symmetry, pattern),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                ),
            RefinementParameter::Lattice => {
                for original in limits
                    .original_lengths
                    .iter()
                    .chain(limits.original_angles.iter())
                {
                    bounds.push(original * (1.0 - f), original * (1.0 + f));
                }
            }
            RefinementParameter::AngleIndependentShape => {
                bounds.push(0.0, MAX_W);
                bounds.push(0.0, 1.0);
            }
            RefinementParameter::Positions => bounds.push_repeated(
                parameter.width(symmetry, pattern),
                POSITION_LIMITS.0,
                POSITION_LIMITS.1,
            ),
            RefinementParameter::ThermalFactors => bounds.push_repeated(
                parameter.width(symmetry, pattern),
                limits.min_b_factor,
                limits.max_b_factor,
            ),
            RefinementParameter::PreferredOrientation => {
                bounds.push_repeated(3, -TEXTURE_LIMIT, TEXTURE_LIMIT)
            }
        }
    }
    bounds
}

/// Writes `values` back into the structure and pattern, then brings the
/// reflection geometry and intensities up to date with whatever changed.
///
/// Lattice parameters are snapped onto the lattice-system constraints, and
/// each orbit position is projected onto its special position before being
/// propagated to every atom of the orbit.
pub fn apply(
    set: &RefiningSet,
    values: &[f64],
    structure: &mut Structure,
    symmetry: &Symmetry,
    pattern: &mut CalculatedPattern,
) -> Result<(), EngineError> {
    let expected = dimension(set, symmetry, pattern);
    if values.len() != expected {
        return Err(EngineError::ParameterCount {
            expected,
            found: values.len(),
        });
    }

    let mut cursor = values;
    for parameter in set {
        let (chunk, rest) = cursor.split_at(parameter.width(symmetry, pattern));
        cursor = rest;
        match parameter {
            RefinementParameter::Scale => pattern.set_optimal_scale(chunk[0]),
            RefinementParameter::SpecimenDisplacement => {
                pattern.shape_mut().shift[SPECIMEN_DISPLACEMENT] = chunk[0]
            }
            RefinementParameter::Background => pattern.background_mut().set_coefficients(chunk),
            RefinementParameter::Lattice => {
                let lengths = Vector3::new(chunk[0], chunk[1], chunk[2]);
                let angles = Vector3::new(chunk[3], chunk[4], chunk[5]);
                structure.set_lattice(symmetry.refine_basis(&lengths, &angles)?);
                pattern.update_geometry(structure);
            }
            RefinementParameter::AngleDependentShape => {
                let shape = pattern.shape_mut();
                shape.u = chunk[0];
                shape.v = chunk[1];
                shape.eta[1] = chunk[2];
                shape.eta[2] = chunk[3];
            }
            RefinementParameter::AngleIndependentShape => {
                let shape = pattern.shape_mut();
                shape.w = chunk[0];
                shape.eta[0] = chunk[1];
            }
            RefinementParameter::Positions => {
                for (orbit, proposed) in symmetry.orbits().iter().zip(chunk.chunks_exact(3)) {
                    let proposed = Vector3::new(proposed[0], proposed[1], proposed[2]);
                    let constrained = orbit.special_position().project(&proposed);
                    for (&atom, generator) in orbit.atoms().iter().zip(orbit.generators()) {
                        if !structure.set_fractional(atom, &generator.apply(&constrained)) {
                            return Err(EngineError::Internal(format!(
                                "orbit refers to missing atom {atom}"
                            )));
                        }
                    }
                }
            }
            RefinementParameter::ThermalFactors => pattern.set_b_factors(chunk)?,
            RefinementParameter::PreferredOrientation => {
                pattern.set_preferred_orientation(Vector3::new(chunk[0], chunk[1], chunk[2]))
            }
            RefinementParameter::ZeroShift => pattern.shape_mut().shift[ZERO_SHIFT] = chunk[0],
        }
    }

    if set.iter().any(RefinementParameter::affects_intensities) {
        pattern.update_intensities(structure, symmetry)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::lattice::Lattice;
    use crate::core::models::structure::Atom;
    use crate::core::models::symmetry::{LatticeSystem, Orbit, SpecialPosition, SymmetryOperation};
    use crate::core::pattern::PatternSettings;
    use crate::core::pattern::calculated::tests::simple_cubic;
    use nalgebra::Matrix3;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn limits(structure: &Structure) -> ParameterLimits {
        ParameterLimits {
            original_lengths: structure.lattice().lengths(),
            original_angles: structure.lattice().angles(),
            max_lattice_change: 0.05,
            min_b_factor: 0.1,
            max_b_factor: 4.0,
        }
    }

    fn cubic_pattern() -> (Structure, Symmetry, CalculatedPattern) {
        let (structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        pattern.define_structure(&structure, &symmetry).unwrap();
        (structure, symmetry, pattern)
    }

    /// Two atoms related by a two-fold screw along z, the representative on a
    /// general position.
    fn screw_structure() -> (Structure, Symmetry) {
        let lattice = Lattice::from_parameters(
            &Vector3::new(4.0, 5.0, 6.0),
            &Vector3::from_element(90.0),
        )
        .unwrap();
        let screw = SymmetryOperation::new(
            Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0)),
            Vector3::new(0.0, 0.0, 0.5),
        )
        .unwrap();
        Symmetry::expand(
            lattice,
            vec![Atom::new("Si".parse().unwrap(), Vector3::new(0.1, 0.2, 0.3))],
            &[screw],
            LatticeSystem::Orthorhombic,
        )
        .unwrap()
    }

    #[test]
    fn vector_follows_declaration_order() {
        let (structure, symmetry, pattern) = cubic_pattern();
        let set: RefiningSet = [
            RefinementParameter::ZeroShift,
            RefinementParameter::Scale,
            RefinementParameter::AngleIndependentShape,
        ]
        .into_iter()
        .collect();
        let values = extract(&set, &structure, &symmetry, &pattern).unwrap();
        assert_eq!(values, vec![1.0, 0.3, 0.5, 0.0]);
        let bounds = bounds(&set, &limits(&structure), &symmetry, &pattern);
        assert_eq!(bounds.lower(), &[0.0, 0.0, 0.0, -0.1]);
        assert_eq!(bounds.upper(), &[f64::INFINITY, 20.0, 1.0, 0.1]);
    }

    #[test]
    fn widths_track_orbits_and_background_terms() {
        let (structure, symmetry, pattern) = cubic_pattern();
        let set: RefiningSet = [
            RefinementParameter::Background,
            RefinementParameter::Lattice,
            RefinementParameter::Positions,
            RefinementParameter::ThermalFactors,
            RefinementParameter::PreferredOrientation,
        ]
        .into_iter()
        .collect();
        assert_eq!(dimension(&set, &symmetry, &pattern), 5 + 6 + 3 + 1 + 3);
        assert_eq!(extract(&set, &structure, &symmetry, &pattern).unwrap().len(), 18);
    }

    #[test]
    fn lattice_bounds_are_fractional_around_the_original_cell() {
        let (structure, symmetry, pattern) = cubic_pattern();
        let set: RefiningSet = [RefinementParameter::Lattice].into_iter().collect();
        let bounds = bounds(&set, &limits(&structure), &symmetry, &pattern);
        assert!(f64_approx_equal(bounds.lower()[0], 3.6 * 0.95));
        assert!(f64_approx_equal(bounds.upper()[5], 90.0 * 1.05));
    }

    #[test]
    fn apply_rejects_a_vector_of_the_wrong_length() {
        let (mut structure, symmetry, mut pattern) = cubic_pattern();
        let set: RefiningSet = [RefinementParameter::Scale].into_iter().collect();
        assert!(matches!(
            apply(&set, &[1.0, 2.0], &mut structure, &symmetry, &mut pattern),
            Err(EngineError::ParameterCount { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn extract_then_apply_leaves_state_unchanged() {
        let (mut structure, symmetry, mut pattern) = cubic_pattern();
        let set: RefiningSet = [
            RefinementParameter::Scale,
            RefinementParameter::Lattice,
            RefinementParameter::ThermalFactors,
        ]
        .into_iter()
        .collect();
        let before: Vec<f64> = pattern.reflections().iter().map(|r| r.intensity()).collect();
        let values = extract(&set, &structure, &symmetry, &pattern).unwrap();
        apply(&set, &values, &mut structure, &symmetry, &mut pattern).unwrap();
        let after: Vec<f64> = pattern.reflections().iter().map(|r| r.intensity()).collect();
        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(&after).all(|(a, b)| (a - b).abs() < 1e-9 * a.max(1.0)));
    }

    #[test]
    fn cubic_lattice_change_is_snapped_and_moves_reflections() {
        let (mut structure, symmetry, mut pattern) = cubic_pattern();
        let set: RefiningSet = [RefinementParameter::Lattice].into_iter().collect();
        let first = pattern.reflections()[0].two_theta();
        apply(
            &set,
            &[3.5, 3.6, 3.7, 90.0, 91.0, 89.0],
            &mut structure,
            &symmetry,
            &mut pattern,
        )
        .unwrap();
        let lengths = structure.lattice().lengths();
        let angles = structure.lattice().angles();
        assert!(lengths.iter().all(|&l| f64_approx_equal(l, 3.6)));
        assert!(angles.iter().all(|&a| f64_approx_equal(a, 90.0)));
        assert!(f64_approx_equal(pattern.reflections()[0].two_theta(), first));

        apply(
            &set,
            &[3.7, 3.7, 3.7, 90.0, 90.0, 90.0],
            &mut structure,
            &symmetry,
            &mut pattern,
        )
        .unwrap();
        assert!(pattern.reflections()[0].two_theta() < first);
    }

    #[test]
    fn positions_propagate_through_orbit_generators() {
        let (mut structure, symmetry) = screw_structure();
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        pattern.define_structure(&structure, &symmetry).unwrap();
        assert_eq!(structure.atoms().len(), 2);

        let set: RefiningSet = [RefinementParameter::Positions].into_iter().collect();
        apply(&set, &[0.15, 0.25, 0.35], &mut structure, &symmetry, &mut pattern).unwrap();

        let representative = structure.atoms()[0].fractional;
        let image = structure.atoms()[1].fractional;
        assert!((representative - Vector3::new(0.15, 0.25, 0.35)).norm() < TOLERANCE);
        assert!((image - Vector3::new(0.85, 0.75, 0.85)).norm() < TOLERANCE);
    }

    #[test]
    fn special_position_pins_constrained_coordinates() {
        let (mut structure, symmetry, mut pattern) = cubic_pattern();
        let set: RefiningSet = [RefinementParameter::Positions].into_iter().collect();
        apply(&set, &[0.02, -0.01, 0.03], &mut structure, &symmetry, &mut pattern).unwrap();
        assert!(structure.atoms()[0].fractional.norm() < TOLERANCE);
    }

    #[test]
    fn profile_groups_do_not_touch_intensities() {
        let (mut structure, symmetry, mut pattern) = cubic_pattern();
        let set: RefiningSet = [
            RefinementParameter::SpecimenDisplacement,
            RefinementParameter::AngleDependentShape,
            RefinementParameter::ZeroShift,
        ]
        .into_iter()
        .collect();
        let before = pattern.reflections()[0].intensity();
        apply(
            &set,
            &[0.05, 0.01, -0.02, 0.001, 0.0, -0.03],
            &mut structure,
            &symmetry,
            &mut pattern,
        )
        .unwrap();
        assert_eq!(pattern.reflections()[0].intensity(), before);
        assert_eq!(pattern.shape().shift[SPECIMEN_DISPLACEMENT], 0.05);
        assert_eq!(pattern.shape().shift[ZERO_SHIFT], -0.03);
        assert_eq!(pattern.shape().u, 0.01);
        assert_eq!(pattern.shape().eta[2], 0.0);
    }

    #[test]
    fn positions_of_a_missing_atom_are_an_error() {
        let (structure, _, pattern) = cubic_pattern();
        let dangling = Symmetry::new(
            vec![SymmetryOperation::identity()],
            vec![
                Orbit::new(
                    vec![7],
                    vec![SymmetryOperation::identity()],
                    SpecialPosition::general(),
                )
                .unwrap(),
            ],
            LatticeSystem::Cubic,
        );
        let set: RefiningSet = [RefinementParameter::Positions].into_iter().collect();
        assert!(matches!(
            extract(&set, &structure, &dangling, &pattern),
            Err(EngineError::Internal(_))
        ));
    }
}
