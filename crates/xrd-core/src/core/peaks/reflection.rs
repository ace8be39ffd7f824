use super::diffraction_peak::DiffractionPeak;
use crate::core::models::lattice::Lattice;
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::scattering::factors::{
    atomic_scattering_factor, lorentz_polarization, march_dollase, thermal_factor,
};
use crate::core::scattering::{Method, ScatteringError};
use nalgebra::Vector3;
use std::cmp::Ordering;
use std::f64::consts::PI;

/// Bragg angle θ (radians, not 2θ) of the plane family `hkl`.
///
/// `sinθ = |M⁻¹·hkl|·λ/2` is clamped to `[−1, 1]`, so planes beyond the
/// reachable sphere come out at exactly 90°.
pub fn diffraction_angle(lattice: &Lattice, hkl: &Vector3<f64>, wavelength: f64) -> f64 {
    bragg_angle(lattice.reciprocal_vector(hkl).norm(), wavelength)
}

pub fn bragg_angle(inverse_d_spacing: f64, wavelength: f64) -> f64 {
    (inverse_d_spacing * wavelength / 2.0).clamp(-1.0, 1.0).asin()
}

/// One family of symmetry-equivalent lattice planes and its calculated peak.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    hkl: Vector3<f64>,
    equivalents: Vec<Vector3<f64>>,
    reciprocal_vectors: Vec<Vector3<f64>>,
    theta: f64,
    two_theta: f64,
    lp_factor: f64,
    intensity: f64,
    matched_reference: Option<usize>,
    systematically_absent: bool,
}

impl Reflection {
    /// `equivalents` must contain `hkl` itself; its length is the multiplicity.
    pub fn new(
        hkl: Vector3<f64>,
        equivalents: Vec<Vector3<f64>>,
        systematically_absent: bool,
        lattice: &Lattice,
        wavelength: f64,
    ) -> Self {
        let mut reflection = Self {
            hkl,
            equivalents,
            reciprocal_vectors: Vec::new(),
            theta: 0.0,
            two_theta: 0.0,
            lp_factor: 0.0,
            intensity: 0.0,
            matched_reference: None,
            systematically_absent,
        };
        reflection.update_geometry(lattice, wavelength);
        reflection
    }

    /// Recomputes the Bragg angle, reciprocal vectors and Lorentz-polarization
    /// factor after the lattice changed.
    pub fn update_geometry(&mut self, lattice: &Lattice, wavelength: f64) {
        self.reciprocal_vectors = self
            .equivalents
            .iter()
            .map(|h| lattice.reciprocal_vector(h))
            .collect();
        self.theta = diffraction_angle(lattice, &self.hkl, wavelength);
        self.two_theta = 2.0 * self.theta.to_degrees();
        self.lp_factor = lorentz_polarization(self.theta);
    }

    /// Recomputes the integrated intensity `|F|²·LP·multiplicity·texture`.
    ///
    /// `b_factors` holds one thermal factor per orbit of `symmetry`.
    pub fn update_intensity(
        &mut self,
        structure: &Structure,
        symmetry: &Symmetry,
        b_factors: &[f64],
        method: Method,
        wavelength: f64,
        preferred_orientation: &Vector3<f64>,
    ) -> Result<(), ScatteringError> {
        let f_squared =
            self.structure_factor_squared(structure, symmetry, b_factors, method, wavelength)?;
        let texture = march_dollase(preferred_orientation, &self.reciprocal_vectors);
        self.intensity = f_squared * self.lp_factor * self.multiplicity() as f64 * texture;
        Ok(())
    }

    pub fn structure_factor_squared(
        &self,
        structure: &Structure,
        symmetry: &Symmetry,
        b_factors: &[f64],
        method: Method,
        wavelength: f64,
    ) -> Result<f64, ScatteringError> {
        let mut real = 0.0;
        let mut imag = 0.0;
        for (orbit, &b_factor) in symmetry.orbits().iter().zip(b_factors) {
            let Some(representative) = structure.atom(orbit.representative()) else {
                continue;
            };
            let scattering = atomic_scattering_factor(representative.element, self.theta, wavelength)?;
            let thermal = if method.uses_thermal_factor() {
                thermal_factor(self.theta, wavelength, b_factor)
            } else {
                1.0
            };
            for atom in orbit.atoms().iter().filter_map(|&i| structure.atom(i)) {
                let phase = 2.0 * PI * self.hkl.dot(&atom.fractional);
                let prefactor = scattering * thermal * atom.occupancy;
                real += prefactor * phase.cos();
                imag += prefactor * phase.sin();
            }
        }
        Ok(real * real + imag * imag)
    }

    pub fn hkl(&self) -> &Vector3<f64> {
        &self.hkl
    }

    pub fn equivalents(&self) -> &[Vector3<f64>] {
        &self.equivalents
    }

    pub fn reciprocal_vectors(&self) -> &[Vector3<f64>] {
        &self.reciprocal_vectors
    }

    pub fn multiplicity(&self) -> usize {
        self.equivalents.len()
    }

    /// Bragg angle θ in radians.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Diffraction angle 2θ in degrees.
    pub fn two_theta(&self) -> f64 {
        self.two_theta
    }

    pub fn two_theta_radians(&self) -> f64 {
        2.0 * self.theta
    }

    pub fn lp_factor(&self) -> f64 {
        self.lp_factor
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn is_systematically_absent(&self) -> bool {
        self.systematically_absent
    }

    pub fn matched_reference(&self) -> Option<usize> {
        self.matched_reference
    }

    pub fn set_matched_reference(&mut self, reference: Option<usize>) {
        self.matched_reference = reference;
    }

    /// The equivalent plane index best suited for reporting: all components
    /// non-negative if possible, then the smallest components in order.
    pub fn representative_hkl(&self) -> Vector3<f64> {
        self.equivalents
            .iter()
            .min_by(|a, b| display_order(a, b))
            .copied()
            .unwrap_or(self.hkl)
    }

    pub fn to_peak(&self) -> DiffractionPeak {
        DiffractionPeak::new(self.two_theta, self.intensity).with_matched_reference(self.matched_reference)
    }
}

fn display_order(a: &Vector3<f64>, b: &Vector3<f64>) -> Ordering {
    let negatives = |v: &Vector3<f64>| v.iter().filter(|c| **c < 0.0).count();
    negatives(a).cmp(&negatives(b)).then_with(|| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| x.abs().total_cmp(&y.abs()).then(y.total_cmp(x)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}
