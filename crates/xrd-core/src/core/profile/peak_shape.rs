use std::f64::consts::PI;

/// Ratio of the pseudo-Voigt truncation window half-width to the peak half-width.
pub const WINDOW_HALF_WIDTHS: f64 = 6.0;

const GAUSSIAN_CONSTANT: f64 = 4.0 * std::f64::consts::LN_2;

pub const SHIFT_TERMS: usize = 6;
/// Index of the specimen-displacement term (`cos2θ`) in [`PeakShape::shift`].
pub const SPECIMEN_DISPLACEMENT: usize = 4;
/// Index of the constant zero-shift term in [`PeakShape::shift`].
pub const ZERO_SHIFT: usize = 5;

/// Instrumental broadening, mixing and peak-shift parameters.
///
/// Widths are in degrees of 2θ: `H = sqrt(W + tanθ·(V + U·tanθ))`. The
/// pseudo-Voigt mixing fraction is `η = η0 + η1·2θ + η2·(2θ)²` with 2θ in
/// degrees. The shift moves a calculated position onto the observed one:
///
/// `s0/tan2θ + s1/sin2θ + s2/tanθ + s3·sin2θ + s4·cos2θ + s5`
#[derive(Debug, Clone, PartialEq)]
pub struct PeakShape {
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub eta: [f64; 3],
    pub shift: [f64; SHIFT_TERMS],
}

impl Default for PeakShape {
    fn default() -> Self {
        Self {
            u: 0.0,
            v: 0.0,
            w: 0.3,
            eta: [0.5, 0.0, 0.0],
            shift: [0.0; SHIFT_TERMS],
        }
    }
}

impl PeakShape {
    /// Caglioti half-width at `two_theta` (degrees), or `None` when the
    /// broadening terms give a non-positive or non-finite `H²`.
    pub fn half_width(&self, two_theta: f64) -> Option<f64> {
        let tan_theta = (two_theta.to_radians() / 2.0).tan();
        let h_squared = self.w + tan_theta * (self.v + self.u * tan_theta);
        (h_squared.is_finite() && h_squared > 0.0).then(|| h_squared.sqrt())
    }

    pub fn mixing(&self, two_theta: f64) -> f64 {
        self.eta[0] + two_theta * (self.eta[1] + two_theta * self.eta[2])
    }

    /// Displacement in degrees from the calculated to the observed position.
    pub fn peak_shift(&self, two_theta: f64) -> f64 {
        let angle = two_theta.to_radians();
        let s = &self.shift;
        s[0] / angle.tan()
            + s[1] / angle.sin()
            + s[2] / (angle / 2.0).tan()
            + s[3] * angle.sin()
            + s[4] * angle.cos()
            + s[5]
    }

    /// Sums the pseudo-Voigt contribution of every `(2θ, intensity)` peak at
    /// the ascending `angles`. Peaks whose window starts beyond
    /// `max_two_theta` are skipped.
    pub fn peak_signal<I>(&self, peaks: I, angles: &[f64], max_two_theta: f64) -> Vec<f64>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut output = vec![0.0; angles.len()];
        for (two_theta, intensity) in peaks {
            let Some(h) = self.half_width(two_theta) else {
                continue;
            };
            let eta = self.mixing(two_theta);
            let center = two_theta + self.peak_shift(two_theta);
            let min_angle = center - WINDOW_HALF_WIDTHS * h;
            let max_angle = center + WINDOW_HALF_WIDTHS * h;
            if !center.is_finite() || min_angle >= max_two_theta {
                continue;
            }

            let start = angles.partition_point(|&a| a < min_angle);
            for (angle, out) in angles[start..]
                .iter()
                .zip(&mut output[start..])
                .take_while(|(a, _)| **a < max_angle)
            {
                *out += intensity * pseudo_voigt(*angle - center, h, eta);
            }
        }
        output
    }
}

/// Unit-area pseudo-Voigt `η·G + (1 − η)·L` evaluated at offset `delta` from
/// the peak center, for half-width `h`.
pub fn pseudo_voigt(delta: f64, h: f64, eta: f64) -> f64 {
    let x = (delta / h).powi(2);
    let gaussian = GAUSSIAN_CONSTANT.sqrt() / PI.sqrt() / h * (-GAUSSIAN_CONSTANT * x).exp();
    let lorentzian = 2.0 / PI / h / (1.0 + 4.0 * x);
    eta * gaussian + (1.0 - eta) * lorentzian
}
