/// A single diffraction peak: position in 2θ (degrees) and integrated intensity.
///
/// Peaks are either measured (extracted from an experimental pattern) or
/// obtained by reducing a set of calculated reflections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffractionPeak {
    two_theta: f64,
    intensity: f64,
    matched_reference: Option<usize>,
}

impl DiffractionPeak {
    pub fn new(two_theta: f64, intensity: f64) -> Self {
        Self {
            two_theta,
            intensity,
            matched_reference: None,
        }
    }

    pub fn two_theta(&self) -> f64 {
        self.two_theta
    }

    pub fn two_theta_radians(&self) -> f64 {
        self.two_theta.to_radians()
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// Index of the reference peak this peak was matched to, if any.
    pub fn matched_reference(&self) -> Option<usize> {
        self.matched_reference
    }

    pub fn with_matched_reference(mut self, reference: Option<usize>) -> Self {
        self.matched_reference = reference;
        self
    }

    pub fn set_matched_reference(&mut self, reference: Option<usize>) {
        self.matched_reference = reference;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_peak_is_unmatched() {
        let peak = DiffractionPeak::new(43.3, 1000.0);
        assert_eq!(peak.matched_reference(), None);
        assert!((peak.two_theta_radians() - 43.3f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn matched_reference_can_be_set_and_cleared() {
        let mut peak = DiffractionPeak::new(50.0, 10.0).with_matched_reference(Some(3));
        assert_eq!(peak.matched_reference(), Some(3));
        peak.set_matched_reference(None);
        assert_eq!(peak.matched_reference(), None);
    }
}
