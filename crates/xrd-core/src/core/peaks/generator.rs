use super::reflection::{Reflection, diffraction_angle};
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use itertools::iproduct;
use nalgebra::{Matrix3, Vector3};
use std::cmp::Ordering;
use tracing::{debug, instrument, warn};

const INDEX_TOLERANCE: f64 = 1e-4;
/// Largest |index| searched along any reduced axis.
const MAX_SEARCH_INDEX: i32 = 50;

/// Enumerates the symmetry-distinct reflections of `structure` whose 2θ
/// (degrees) lies in `[min_two_theta, max_two_theta]`, sorted by angle.
///
/// Plane indices are searched in the reduced cell, where the search box is
/// tight, and converted back to the conventional cell. Every orbit of
/// equivalent planes is emitted once, by its lexicographically smallest
/// member. Systematically absent reflections are kept and flagged.
#[instrument(skip_all, name = "reflection_generation")]
pub fn generate_reflections(
    structure: &Structure,
    symmetry: &Symmetry,
    wavelength: f64,
    min_two_theta: f64,
    max_two_theta: f64,
) -> Vec<Reflection> {
    if wavelength.is_nan() || wavelength <= 0.0 || wavelength.is_infinite() {
        warn!(wavelength, "Wavelength is not positive; no reflections generated.");
        return Vec::new();
    }
    let lattice = structure.lattice();
    let reduction = *lattice.reduction();
    let Some(to_conventional) = reduction.try_inverse() else {
        return Vec::new();
    };

    let max_magnitude = 2.0 * (max_two_theta.to_radians() / 2.0).sin() / wavelength;
    let Some(range) = search_range(&lattice.reduced_vectors(), max_magnitude) else {
        return Vec::new();
    };

    let operations = reduced_plane_operations(symmetry, &reduction, &to_conventional);

    let mut reflections = Vec::new();
    for (h, k, l) in iproduct!(
        -range[0]..=range[0],
        -range[1]..=range[1],
        -range[2]..=range[2]
    ) {
        if h == 0 && k == 0 && l == 0 {
            continue;
        }
        let reduced_hkl = Vector3::new(h as f64, k as f64, l as f64);
        let Some(orbit) = plane_orbit(&reduced_hkl, &operations) else {
            continue;
        };

        let hkl = (to_conventional * reduced_hkl).map(f64::round);
        let two_theta = 2.0 * diffraction_angle(lattice, &hkl, wavelength).to_degrees();
        if two_theta < min_two_theta || two_theta > max_two_theta {
            continue;
        }

        let equivalents = orbit
            .iter()
            .map(|p| (to_conventional * p).map(f64::round))
            .collect();
        let absent = is_systematically_absent(symmetry, &hkl);
        reflections.push(Reflection::new(hkl, equivalents, absent, lattice, wavelength));
    }

    reflections.sort_by(|a, b| a.two_theta().total_cmp(&b.two_theta()));
    debug!(
        count = reflections.len(),
        min_two_theta, max_two_theta, "Generated reflections"
    );
    reflections
}

/// Per-axis index bound of the reduced-cell search box for reciprocal vectors
/// up to `max_magnitude`, or `None` when the box is empty or undefined.
fn search_range(reduced: &Matrix3<f64>, max_magnitude: f64) -> Option<[i32; 3]> {
    if !max_magnitude.is_finite() || max_magnitude <= 0.0 {
        return None;
    }
    let mut range = [0; 3];
    for (i, bound) in range.iter_mut().enumerate() {
        let wanted = (max_magnitude * reduced.row(i).norm()).ceil();
        if !wanted.is_finite() {
            return None;
        }
        if wanted > MAX_SEARCH_INDEX as f64 {
            warn!(axis = i, wanted, "Index search clamped to {MAX_SEARCH_INDEX}.");
        }
        *bound = wanted.min(MAX_SEARCH_INDEX as f64) as i32;
    }
    Some(range)
}

/// Distinct non-identity point-group operations acting on reduced-cell plane
/// indices: `T·Wᵀ·T⁻¹`.
fn reduced_plane_operations(
    symmetry: &Symmetry,
    reduction: &Matrix3<f64>,
    to_conventional: &Matrix3<f64>,
) -> Vec<Matrix3<f64>> {
    let mut operations: Vec<Matrix3<f64>> = Vec::new();
    for op in symmetry.operations() {
        if op.has_identity_rotation() {
            continue;
        }
        let matrix = (reduction * op.rotation().transpose() * to_conventional).map(f64::round);
        if !operations
            .iter()
            .any(|m| (m - matrix).abs().max() < INDEX_TOLERANCE)
        {
            operations.push(matrix);
        }
    }
    operations
}

/// Returns the full orbit of `hkl`, or `None` if a lexicographically smaller
/// member exists (the orbit is emitted from that member instead).
fn plane_orbit(hkl: &Vector3<f64>, operations: &[Matrix3<f64>]) -> Option<Vec<Vector3<f64>>> {
    let mut orbit = vec![*hkl];
    for op in operations {
        let image = (op * hkl).map(f64::round);
        if lexicographic_cmp(&image, hkl) == Ordering::Less {
            return None;
        }
        if !orbit.iter().any(|p| same_index(p, &image)) {
            orbit.push(image);
        }
    }
    Some(orbit)
}

fn lexicographic_cmp(a: &Vector3<f64>, b: &Vector3<f64>) -> Ordering {
    for i in 0..3 {
        if a[i] < b[i] - INDEX_TOLERANCE {
            return Ordering::Less;
        }
        if a[i] > b[i] + INDEX_TOLERANCE {
            return Ordering::Greater;
        }
    }
    Ordering::Equal
}

fn same_index(a: &Vector3<f64>, b: &Vector3<f64>) -> bool {
    (a - b).abs().max() < INDEX_TOLERANCE
}

/// A reflection is absent when some operation fixing the plane carries an
/// intrinsic translation `t` with non-integral `t·hkl`.
fn is_systematically_absent(symmetry: &Symmetry, hkl: &Vector3<f64>) -> bool {
    symmetry.operations().iter().any(|op| {
        if !same_index(&op.transform_plane(hkl), hkl) {
            return false;
        }
        match op.intrinsic_translation() {
            Ok(t) => {
                let product = t.dot(hkl);
                (product - product.round()).abs() > INDEX_TOLERANCE
            }
            Err(_) => false,
        }
    })
}
