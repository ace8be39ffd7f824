use nalgebra::{Matrix3, RowVector3, Vector3};
use thiserror::Error;

const MAX_REDUCTION_PASSES: usize = 64;
const SINGULAR_VOLUME: f64 = 1e-8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LatticeError {
    #[error("Invalid lattice parameters: {0}")]
    InvalidParameters(String),
    #[error("Lattice vectors are linearly dependent")]
    Singular,
}

/// The unit cell of a crystal.
///
/// The rows of the basis matrix are the lattice vectors `a`, `b` and `c` in
/// Angstroms, so fractional coordinates `x` map to Cartesian positions as
/// `xᵀ·M`. The columns of the inverse matrix are the reciprocal lattice
/// vectors (without the 2π factor), which makes `M⁻¹·hkl` the reciprocal
/// vector of the plane family `hkl` with magnitude `1/d`.
///
/// A Lagrange-reduced cell is computed alongside the basis. The integer matrix
/// `T` returned by [`Lattice::reduction`] expresses the reduced vectors in
/// terms of the conventional ones (`reduced = T·M`).
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    vectors: Matrix3<f64>,
    inverse: Matrix3<f64>,
    reduction: Matrix3<f64>,
}

impl Lattice {
    pub fn from_vectors(vectors: Matrix3<f64>) -> Result<Self, LatticeError> {
        if vectors.determinant().abs() < SINGULAR_VOLUME {
            return Err(LatticeError::Singular);
        }
        let inverse = vectors.try_inverse().ok_or(LatticeError::Singular)?;
        let reduction = lagrange_reduction(&vectors);
        Ok(Self {
            vectors,
            inverse,
            reduction,
        })
    }

    /// Builds a cell from lengths (Angstroms) and angles α, β, γ (degrees),
    /// with `a` along x and `b` in the xy plane.
    pub fn from_parameters(
        lengths: &Vector3<f64>,
        angles: &Vector3<f64>,
    ) -> Result<Self, LatticeError> {
        if lengths.iter().any(|&l| l <= 0.0 || !l.is_finite()) {
            return Err(LatticeError::InvalidParameters(format!(
                "lengths must be positive, got [{}, {}, {}]",
                lengths.x, lengths.y, lengths.z
            )));
        }
        if angles.iter().any(|&a| !(a > 0.0 && a < 180.0)) {
            return Err(LatticeError::InvalidParameters(format!(
                "angles must lie strictly between 0 and 180 degrees, got [{}, {}, {}]",
                angles.x, angles.y, angles.z
            )));
        }

        let (cos_a, cos_b, cos_g) = (
            angles.x.to_radians().cos(),
            angles.y.to_radians().cos(),
            angles.z.to_radians().cos(),
        );
        let sin_g = angles.z.to_radians().sin();

        let cx = lengths.z * cos_b;
        let cy = lengths.z * (cos_a - cos_b * cos_g) / sin_g;
        let cz_squared = lengths.z * lengths.z - cx * cx - cy * cy;
        if cz_squared <= 0.0 {
            return Err(LatticeError::InvalidParameters(format!(
                "angles [{}, {}, {}] do not describe a cell with positive volume",
                angles.x, angles.y, angles.z
            )));
        }

        let vectors = Matrix3::from_rows(&[
            RowVector3::new(lengths.x, 0.0, 0.0),
            RowVector3::new(lengths.y * cos_g, lengths.y * sin_g, 0.0),
            RowVector3::new(cx, cy, cz_squared.sqrt()),
        ]);
        Self::from_vectors(vectors)
    }

    pub fn vectors(&self) -> &Matrix3<f64> {
        &self.vectors
    }

    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    pub fn reduction(&self) -> &Matrix3<f64> {
        &self.reduction
    }

    pub fn reduced_vectors(&self) -> Matrix3<f64> {
        self.reduction * self.vectors
    }

    pub fn lengths(&self) -> Vector3<f64> {
        Vector3::new(
            self.vectors.row(0).norm(),
            self.vectors.row(1).norm(),
            self.vectors.row(2).norm(),
        )
    }

    /// Cell angles α (b∧c), β (a∧c) and γ (a∧b) in degrees.
    pub fn angles(&self) -> Vector3<f64> {
        let a = self.vectors.row(0).transpose();
        let b = self.vectors.row(1).transpose();
        let c = self.vectors.row(2).transpose();
        Vector3::new(
            angle_between(&b, &c),
            angle_between(&a, &c),
            angle_between(&a, &b),
        )
    }

    pub fn volume(&self) -> f64 {
        self.vectors.determinant().abs()
    }

    pub fn reciprocal_vector(&self, hkl: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * hkl
    }
}

fn angle_between(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    (u.dot(v) / (u.norm() * v.norm()))
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees()
}

// Pairwise shortening until no vector can be made shorter by subtracting an
// integer multiple of another.
fn lagrange_reduction(vectors: &Matrix3<f64>) -> Matrix3<f64> {
    let mut transform = Matrix3::<f64>::identity();
    let mut reduced = *vectors;

    for _ in 0..MAX_REDUCTION_PASSES {
        let mut changed = false;
        for i in 0..3 {
            for j in 0..3 {
                if i == j {
                    continue;
                }
                let rj = reduced.row(j).clone_owned();
                let ri = reduced.row(i).clone_owned();
                let k = (ri.dot(&rj) / rj.norm_squared()).round();
                if k == 0.0 {
                    continue;
                }
                let candidate = ri - rj * k;
                if candidate.norm_squared() < ri.norm_squared() - 1e-10 {
                    let tj = transform.row(j).clone_owned();
                    let ti = transform.row(i).clone_owned();
                    reduced.set_row(i, &candidate);
                    transform.set_row(i, &(ti - tj * k));
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    transform
}
