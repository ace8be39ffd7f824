use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use tracing::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const RANK_TOLERANCE: f64 = 1e-12;

/// Functional form of the background polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundKind {
    #[default]
    /// Chebyshev polynomials of the first kind, with 2θ mapped onto `[−1, 1]`.
    Chebyshev,
    /// `Σ cₚ·(2θ)^(start_exponent + p)`.
    PowerSeries { start_exponent: i32 },
}

/// A smooth background signal over a fixed angular range.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    kind: BackgroundKind,
    coefficients: Vec<f64>,
    min_two_theta: f64,
    max_two_theta: f64,
}

impl Background {
    pub fn new(kind: BackgroundKind, terms: usize, min_two_theta: f64, max_two_theta: f64) -> Self {
        Self {
            kind,
            coefficients: vec![0.0; terms],
            min_two_theta,
            max_two_theta,
        }
    }

    pub fn kind(&self) -> BackgroundKind {
        self.kind
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Replaces the coefficients; the number of terms follows the new slice.
    pub fn set_coefficients(&mut self, coefficients: &[f64]) {
        self.coefficients = coefficients.to_vec();
    }

    pub fn set_range(&mut self, min_two_theta: f64, max_two_theta: f64) {
        self.min_two_theta = min_two_theta;
        self.max_two_theta = max_two_theta;
    }

    /// Values of each basis function at `two_theta`, one per coefficient.
    pub fn basis(&self, two_theta: f64) -> Vec<f64> {
        let terms = self.coefficients.len();
        let mut row = Vec::with_capacity(terms);
        match self.kind {
            BackgroundKind::Chebyshev => {
                let span = self.max_two_theta - self.min_two_theta;
                let x = if span > 0.0 {
                    2.0 * (two_theta - self.min_two_theta) / span - 1.0
                } else {
                    0.0
                };
                for t in 0..terms {
                    let value = match t {
                        0 => 1.0,
                        1 => x,
                        _ => 2.0 * x * row[t - 1] - row[t - 2],
                    };
                    row.push(value);
                }
            }
            BackgroundKind::PowerSeries { start_exponent } => {
                let mut value = two_theta.powi(start_exponent);
                for _ in 0..terms {
                    row.push(value);
                    value *= two_theta;
                }
            }
        }
        row
    }

    pub fn evaluate(&self, two_theta: f64) -> f64 {
        if self.coefficients.is_empty() {
            return 0.0;
        }
        self.basis(two_theta)
            .iter()
            .zip(&self.coefficients)
            .map(|(b, c)| b * c)
            .sum()
    }

    pub fn evaluate_all(&self, angles: &[f64]) -> Vec<f64> {
        #[cfg(feature = "parallel")]
        {
            angles.par_iter().map(|&t| self.evaluate(t)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            angles.iter().map(|&t| self.evaluate(t)).collect()
        }
    }

    /// Linear least-squares coefficients (same number of terms as `self`)
    /// reproducing `intensities` at `angles`, solved by QR decomposition.
    /// Returns `None` when the system is underdetermined or rank deficient.
    pub fn fit(&self, angles: &[f64], intensities: &[f64]) -> Option<Vec<f64>> {
        let terms = self.coefficients.len();
        if terms == 0 || angles.len() < terms || angles.len() != intensities.len() {
            return None;
        }
        let mut design = DMatrix::zeros(angles.len(), terms);
        for (i, &angle) in angles.iter().enumerate() {
            for (j, value) in self.basis(angle).into_iter().enumerate() {
                design[(i, j)] = value;
            }
        }
        let target = DVector::from_column_slice(intensities);

        let qr = design.qr();
        let r = qr.r();
        let scale = r.diagonal().abs().max();
        let rank_deficient = r
            .diagonal()
            .iter()
            .any(|d| d.abs() <= RANK_TOLERANCE * scale);
        if scale <= 0.0 || !scale.is_finite() || rank_deficient {
            warn!(
                terms,
                points = angles.len(),
                "Background least-squares system is rank deficient"
            );
            return None;
        }
        let projected = qr.q().transpose() * target;
        r.solve_upper_triangular(&projected)
            .map(|solution| solution.iter().copied().collect())
    }
}
