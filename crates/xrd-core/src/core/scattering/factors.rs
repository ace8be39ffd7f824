use super::ScatteringError;
use super::table;
use crate::core::models::element::Element;
use nalgebra::Vector3;
use tracing::warn;

/// Upper end of the `sinθ/λ` range the Cromer-Mann fit was made over.
const MAX_TABULATED_S: f64 = 2.0;

/// Atomic scattering factor of `element` for Bragg angle `theta` (radians).
pub fn atomic_scattering_factor(
    element: Element,
    theta: f64,
    wavelength: f64,
) -> Result<f64, ScatteringError> {
    let s = theta.sin() / wavelength;
    if s > MAX_TABULATED_S {
        warn!(
            element = %element,
            s,
            "Atomic scattering factor is not fitted for sin(theta)/lambda above 2"
        );
    }
    Ok(table::coefficients(element.atomic_number())?.evaluate(s))
}

/// Debye-Waller damping `exp(−B·(sinθ/λ)²)`.
pub fn thermal_factor(theta: f64, wavelength: f64, b_factor: f64) -> f64 {
    let s = theta.sin() / wavelength;
    (-b_factor * s * s).exp()
}

/// Lorentz-polarization factor `(1 + cos²2θ) / (cosθ·sin²θ)` for Bragg angle `theta`.
pub fn lorentz_polarization(theta: f64) -> f64 {
    let cos_two_theta = (2.0 * theta).cos();
    let sin_theta = theta.sin();
    (1.0 + cos_two_theta * cos_two_theta) / (theta.cos() * sin_theta * sin_theta)
}

/// March-Dollase texture correction averaged over the reciprocal vectors of
/// every equivalent plane.
///
/// The magnitude `τ` of `preferred` is the March parameter; `τ = 1` leaves
/// intensities unchanged. Returns 1 when there are no planes or when the
/// preferred direction is degenerate.
pub fn march_dollase(preferred: &Vector3<f64>, reciprocal_vectors: &[Vector3<f64>]) -> f64 {
    let tau = preferred.norm();
    if reciprocal_vectors.is_empty() || tau <= f64::EPSILON {
        return 1.0;
    }
    let tau_squared = tau * tau;
    let total: f64 = reciprocal_vectors
        .iter()
        .map(|g| {
            let g_norm = g.norm();
            let cos_squared = if g_norm > 0.0 {
                let cos_phi = preferred.dot(g) / (tau * g_norm);
                cos_phi * cos_phi
            } else {
                0.0
            };
            (tau_squared * cos_squared + (1.0 - cos_squared) / tau).powf(-1.5)
        })
        .sum();
    total / reciprocal_vectors.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn scattering_factor_decreases_with_angle() {
        let copper: Element = "Cu".parse().unwrap();
        let low = atomic_scattering_factor(copper, 10f64.to_radians(), 1.5418).unwrap();
        let high = atomic_scattering_factor(copper, 50f64.to_radians(), 1.5418).unwrap();
        assert!(low > high);
        assert!(low < 29.0);
    }

    #[test]
    fn thermal_factor_is_one_for_zero_b() {
        assert!(f64_approx_equal(thermal_factor(0.7, 1.5418, 0.0), 1.0));
        let theta = 0.5f64;
        let s = theta.sin() / 1.5418;
        assert!(f64_approx_equal(
            thermal_factor(theta, 1.5418, 2.0),
            (-2.0 * s * s).exp()
        ));
    }

    #[test]
    fn lorentz_polarization_matches_closed_form_at_45_degrees() {
        // 2θ = 90°: cos2θ = 0, cosθ·sin²θ = (√2/2)³
        let theta = 45f64.to_radians();
        let expected = 1.0 / (0.5f64.sqrt()).powi(3);
        assert!(f64_approx_equal(lorentz_polarization(theta), expected));
    }

    #[test]
    fn unit_preferred_orientation_has_no_texture_effect() {
        let planes = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 1.0),
            Vector3::new(0.3, -0.2, 0.9),
        ];
        assert!(f64_approx_equal(
            march_dollase(&Vector3::new(1.0, 0.0, 0.0), &planes),
            1.0
        ));
    }

    #[test]
    fn texture_enhances_planes_parallel_to_a_platy_direction() {
        let preferred = Vector3::new(0.0, 0.0, 0.8);
        let parallel = march_dollase(&preferred, &[Vector3::new(0.0, 0.0, 1.0)]);
        let perpendicular = march_dollase(&preferred, &[Vector3::new(1.0, 0.0, 0.0)]);
        assert!(f64_approx_equal(parallel, 0.64f64.powf(-1.5)));
        assert!(f64_approx_equal(perpendicular, 1.25f64.powf(-1.5)));
        assert!(parallel > perpendicular);
    }
}
