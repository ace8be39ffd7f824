use super::{Pattern, PatternError, PatternSettings};
use crate::core::matching::matcher::{DEFAULT_MATCH_TOLERANCE, PeakMatching, match_peaks};
use crate::core::matching::residual::{RMethod, peak_residual, profile_residual};
use crate::core::models::structure::Structure;
use crate::core::models::symmetry::Symmetry;
use crate::core::peaks::diffraction_peak::DiffractionPeak;
use crate::core::peaks::generator::generate_reflections;
use crate::core::peaks::reflection::Reflection;
use crate::core::profile::background::{Background, BackgroundKind};
use crate::core::profile::peak_shape::PeakShape;
use nalgebra::Vector3;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const DEFAULT_B_FACTOR: f64 = 0.5;
pub const DEFAULT_BACKGROUND_TERMS: usize = 5;
/// Maximum of the combined peak list after matching.
const COMBINED_PEAK_MAXIMUM: f64 = 1000.0;

/// A pattern calculated from a crystal structure.
///
/// The structure and symmetry are never owned; every operation that needs
/// them borrows them from the caller. The reflection list is kept sorted by
/// angle, and the matching table is dropped whenever the reflection set or
/// its order changes.
#[derive(Debug, Clone)]
pub struct CalculatedPattern {
    settings: PatternSettings,
    reflections: Vec<Reflection>,
    b_factors: Vec<f64>,
    shape: PeakShape,
    background: Background,
    preferred_orientation: Vector3<f64>,
    optimal_scale: f64,
    matching: Option<PeakMatching>,
    measurement_angles: Option<Vec<f64>>,
    structure_defined: bool,
}

impl CalculatedPattern {
    pub fn new(settings: PatternSettings) -> Self {
        let background = Background::new(
            BackgroundKind::default(),
            DEFAULT_BACKGROUND_TERMS,
            settings.min_two_theta,
            settings.max_two_theta,
        );
        Self {
            settings,
            reflections: Vec::new(),
            b_factors: Vec::new(),
            shape: PeakShape::default(),
            background,
            preferred_orientation: Vector3::x(),
            optimal_scale: 1.0,
            matching: None,
            measurement_angles: None,
            structure_defined: false,
        }
    }

    pub fn with_background(mut self, kind: BackgroundKind, terms: usize) -> Self {
        self.background = Background::new(
            kind,
            terms,
            self.settings.min_two_theta,
            self.settings.max_two_theta,
        );
        self
    }

    /// Binds the pattern to a structure: resets thermal factors if the orbit
    /// count changed, then generates reflections and intensities.
    pub fn define_structure(
        &mut self,
        structure: &Structure,
        symmetry: &Symmetry,
    ) -> Result<(), PatternError> {
        let orbits = symmetry.orbits().len();
        if self.b_factors.len() != orbits {
            self.b_factors = vec![DEFAULT_B_FACTOR; orbits];
        }
        self.structure_defined = true;
        self.regenerate_reflections(structure, symmetry)
    }

    pub fn is_structure_defined(&self) -> bool {
        self.structure_defined
    }

    /// Takes method, wavelength and angular range (and the measurement grid,
    /// if it has one) from `reference`, then regenerates the reflections.
    pub fn adopt_reference(
        &mut self,
        reference: &Pattern,
        structure: &Structure,
        symmetry: &Symmetry,
    ) -> Result<(), PatternError> {
        if !self.structure_defined {
            return Err(PatternError::StructureNotDefined);
        }
        let source = reference.settings();
        self.settings.method = source.method;
        self.settings.wavelength = source.wavelength;
        self.settings.min_two_theta = source.min_two_theta;
        self.settings.max_two_theta = source.max_two_theta;
        self.background
            .set_range(source.min_two_theta, source.max_two_theta);
        self.measurement_angles = reference
            .has_profile()
            .then(|| reference.measurement_angles());
        self.regenerate_reflections(structure, symmetry)
    }

    pub fn regenerate_reflections(
        &mut self,
        structure: &Structure,
        symmetry: &Symmetry,
    ) -> Result<(), PatternError> {
        if !self.structure_defined {
            return Err(PatternError::StructureNotDefined);
        }
        self.reflections = generate_reflections(
            structure,
            symmetry,
            self.settings.wavelength,
            self.settings.min_two_theta,
            self.settings.max_two_theta,
        );
        self.matching = None;
        self.update_intensities(structure, symmetry)
    }

    /// Recomputes angles after a lattice change, keeping the list sorted.
    pub fn update_geometry(&mut self, structure: &Structure) {
        let wavelength = self.settings.wavelength;
        for reflection in &mut self.reflections {
            reflection.update_geometry(structure.lattice(), wavelength);
        }
        let sorted = self
            .reflections
            .windows(2)
            .all(|w| w[0].two_theta() <= w[1].two_theta());
        if !sorted {
            self.reflections
                .sort_by(|a, b| a.two_theta().total_cmp(&b.two_theta()));
            self.matching = None;
        }
    }

    pub fn update_intensities(
        &mut self,
        structure: &Structure,
        symmetry: &Symmetry,
    ) -> Result<(), PatternError> {
        let expected = symmetry.orbits().len();
        if self.b_factors.len() != expected {
            return Err(PatternError::OrbitMismatch {
                expected,
                found: self.b_factors.len(),
            });
        }
        let (b_factors, method, wavelength, preferred) = (
            &self.b_factors,
            self.settings.method,
            self.settings.wavelength,
            &self.preferred_orientation,
        );
        let update = |r: &mut Reflection| {
            r.update_intensity(structure, symmetry, b_factors, method, wavelength, preferred)
        };
        #[cfg(feature = "parallel")]
        self.reflections.par_iter_mut().try_for_each(update)?;
        #[cfg(not(feature = "parallel"))]
        self.reflections.iter_mut().try_for_each(update)?;
        Ok(())
    }

    /// Matches every reflection to the nearest reference peak and stores the
    /// resulting table.
    pub fn match_to_reference(&mut self, reference: &[DiffractionPeak], tolerance: f64) {
        let angles: Vec<f64> = self.reflections.iter().map(|r| r.two_theta()).collect();
        let matching = match_peaks(&angles, reference, tolerance);
        for (reflection, assignment) in self
            .reflections
            .iter_mut()
            .zip(matching.assignments(angles.len()))
        {
            reflection.set_matched_reference(assignment);
        }
        debug!(
            matched = angles.len() - matching.unmatched().len(),
            unmatched = matching.unmatched().len(),
            "Matched reflections to reference peaks"
        );
        self.matching = Some(matching);
    }

    /// Peak R factor against `reference`; stores the optimal scale it finds.
    pub fn peak_r_factor(&mut self, reference: &Pattern, method: RMethod) -> Result<f64, PatternError> {
        let reference: Vec<f64> = reference.peaks().iter().map(|p| p.intensity()).collect();
        self.peak_r_factor_against(&reference, method)
    }

    /// [`Self::peak_r_factor`] against reference peak intensities already
    /// read out of the reference pattern.
    pub fn peak_r_factor_against(
        &mut self,
        reference_intensities: &[f64],
        method: RMethod,
    ) -> Result<f64, PatternError> {
        let matching = self.matching.as_ref().ok_or(PatternError::MatchingNotRun)?;
        let calculated: Vec<f64> = self.reflections.iter().map(|r| r.intensity()).collect();
        let residual = peak_residual(&calculated, reference_intensities, matching, method)?;
        self.optimal_scale = residual.scale;
        Ok(residual.r_factor)
    }

    /// Profile R factor against the measured trace of `reference` at the
    /// current scale factor.
    pub fn profile_r_factor(&self, reference: &Pattern, method: RMethod) -> Result<f64, PatternError> {
        if !reference.has_profile() {
            return Err(PatternError::NoContinuousTrace);
        }
        let angles = reference.measurement_angles();
        let measured = reference.measured_intensities();
        Ok(self.profile_r_factor_against(&angles, &measured, method))
    }

    /// [`Self::profile_r_factor`] against a measured trace sampled at `angles`.
    pub fn profile_r_factor_against(&self, angles: &[f64], measured: &[f64], method: RMethod) -> f64 {
        let peaks = self.peak_signal(angles);
        let background = self.background_signal(angles);
        profile_residual(measured, &peaks, &background, self.optimal_scale, method)
    }

    pub fn peak_signal(&self, angles: &[f64]) -> Vec<f64> {
        self.shape.peak_signal(
            self.reflections
                .iter()
                .map(|r| (r.two_theta(), r.intensity())),
            angles,
            self.settings.max_two_theta,
        )
    }

    pub fn background_signal(&self, angles: &[f64]) -> Vec<f64> {
        self.background.evaluate_all(angles)
    }

    /// Unscaled background plus peak signal.
    pub fn diffracted_intensity(&self, angles: &[f64]) -> Vec<f64> {
        self.background_signal(angles)
            .into_iter()
            .zip(self.peak_signal(angles))
            .map(|(b, p)| b + p)
            .collect()
    }

    pub fn scaled_intensities(&self, angles: &[f64]) -> Vec<f64> {
        self.diffracted_intensity(angles)
            .into_iter()
            .map(|i| i * self.optimal_scale)
            .collect()
    }

    /// The adopted measurement grid, or the angular range stepped by the
    /// resolution.
    pub fn measurement_angles(&self) -> Vec<f64> {
        if let Some(angles) = &self.measurement_angles {
            return angles.clone();
        }
        let PatternSettings {
            min_two_theta: min,
            max_two_theta: max,
            resolution,
            ..
        } = self.settings;
        if resolution <= 0.0 || max < min {
            return vec![min];
        }
        let steps = ((max - min) / resolution + 1e-9).floor() as usize;
        (0..=steps).map(|i| min + i as f64 * resolution).collect()
    }

    pub fn peaks(&self) -> Vec<DiffractionPeak> {
        self.reflections.iter().map(Reflection::to_peak).collect()
    }

    pub fn scaled_peaks(&self) -> Vec<DiffractionPeak> {
        self.reflections
            .iter()
            .map(|r| {
                DiffractionPeak::new(r.two_theta(), r.intensity() * self.optimal_scale)
                    .with_matched_reference(r.matched_reference())
            })
            .collect()
    }

    /// Reflections merged into observable peaks.
    ///
    /// After matching, consecutive reflections matched to the same reference
    /// peak are summed and the list is scaled to a maximum of 1000. Otherwise
    /// reflections within 0.15° of a group's first member are summed and the
    /// optimal scale is applied.
    pub fn combined_peaks(&self) -> Vec<DiffractionPeak> {
        let Some(first) = self.reflections.first() else {
            return Vec::new();
        };
        let mut groups: Vec<(f64, f64, Option<usize>)> =
            vec![(first.two_theta(), first.intensity(), first.matched_reference())];

        let scale = if self.matching.is_some() {
            for r in &self.reflections[1..] {
                match groups.last_mut() {
                    Some(last) if r.matched_reference().is_some() && r.matched_reference() == last.2 => {
                        last.1 += r.intensity();
                    }
                    _ => groups.push((r.two_theta(), r.intensity(), r.matched_reference())),
                }
            }
            let maximum = groups.iter().map(|g| g.1).fold(0.0, f64::max);
            if maximum > 0.0 { COMBINED_PEAK_MAXIMUM / maximum } else { 1.0 }
        } else {
            for r in &self.reflections[1..] {
                match groups.last_mut() {
                    Some(last) if r.two_theta() - last.0 <= DEFAULT_MATCH_TOLERANCE => {
                        last.1 += r.intensity();
                    }
                    _ => groups.push((r.two_theta(), r.intensity(), None)),
                }
            }
            self.optimal_scale
        };

        groups
            .into_iter()
            .map(|(t, i, m)| DiffractionPeak::new(t, i * scale).with_matched_reference(m))
            .collect()
    }

    pub fn settings(&self) -> &PatternSettings {
        &self.settings
    }

    pub fn reflections(&self) -> &[Reflection] {
        &self.reflections
    }

    pub fn matching(&self) -> Option<&PeakMatching> {
        self.matching.as_ref()
    }

    pub fn b_factors(&self) -> &[f64] {
        &self.b_factors
    }

    pub fn set_b_factors(&mut self, b_factors: &[f64]) -> Result<(), PatternError> {
        if b_factors.len() != self.b_factors.len() {
            return Err(PatternError::OrbitMismatch {
                expected: self.b_factors.len(),
                found: b_factors.len(),
            });
        }
        self.b_factors.copy_from_slice(b_factors);
        Ok(())
    }

    pub fn shape(&self) -> &PeakShape {
        &self.shape
    }

    pub fn shape_mut(&mut self) -> &mut PeakShape {
        &mut self.shape
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut Background {
        &mut self.background
    }

    pub fn preferred_orientation(&self) -> &Vector3<f64> {
        &self.preferred_orientation
    }

    pub fn set_preferred_orientation(&mut self, orientation: Vector3<f64>) {
        self.preferred_orientation = orientation;
    }

    pub fn optimal_scale(&self) -> f64 {
        self.optimal_scale
    }

    pub fn set_optimal_scale(&mut self, scale: f64) {
        self.optimal_scale = scale;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::lattice::Lattice;
    use crate::core::models::structure::Atom;
    use crate::core::models::symmetry::LatticeSystem;
    use crate::core::models::symmetry::tests::cubic_point_group;
    use crate::core::pattern::experimental::ExperimentalPattern;

    const TOLERANCE: f64 = 1e-9;

    pub(crate) fn simple_cubic(element: &str, a: f64) -> (Structure, Symmetry) {
        let lattice =
            Lattice::from_parameters(&Vector3::from_element(a), &Vector3::from_element(90.0))
                .unwrap();
        Symmetry::expand(
            lattice,
            vec![Atom::new(element.parse().unwrap(), Vector3::zeros())],
            &cubic_point_group(),
            LatticeSystem::Cubic,
        )
        .unwrap()
    }

    fn defined_pattern() -> (Structure, Symmetry, CalculatedPattern) {
        // Below 70° no two cubic plane families share an angle.
        let (structure, symmetry) = simple_cubic("Cu", 3.6);
        let settings = PatternSettings {
            max_two_theta: 70.0,
            ..PatternSettings::default()
        };
        let mut pattern = CalculatedPattern::new(settings);
        pattern.define_structure(&structure, &symmetry).unwrap();
        (structure, symmetry, pattern)
    }

    #[test]
    fn undefined_structure_is_reported() {
        let (structure, symmetry) = simple_cubic("Cu", 3.6);
        let mut pattern = CalculatedPattern::new(PatternSettings::default());
        assert_eq!(
            pattern.regenerate_reflections(&structure, &symmetry),
            Err(PatternError::StructureNotDefined)
        );
        assert!(!pattern.is_structure_defined());
    }

    #[test]
    fn defining_structure_generates_sorted_positive_reflections() {
        let (_, symmetry, pattern) = defined_pattern();
        assert_eq!(pattern.b_factors(), &[DEFAULT_B_FACTOR]);
        assert_eq!(symmetry.orbits().len(), 1);
        assert!(!pattern.reflections().is_empty());
        assert!(pattern
            .reflections()
            .windows(2)
            .all(|w| w[0].two_theta() <= w[1].two_theta()));
        assert!(pattern.reflections().iter().all(|r| r.intensity() > 0.0));
    }

    #[test]
    fn peak_r_factor_requires_matching() {
        let (_, _, mut pattern) = defined_pattern();
        let reference = Pattern::Calculated(pattern.clone());
        assert_eq!(
            pattern.peak_r_factor(&reference, RMethod::Abs),
            Err(PatternError::MatchingNotRun)
        );
    }

    #[test]
    fn matching_a_pattern_to_itself_gives_zero_residual() {
        let (_, _, mut pattern) = defined_pattern();
        let reference = Pattern::Calculated(pattern.clone());
        pattern.match_to_reference(&reference.peaks(), DEFAULT_MATCH_TOLERANCE);
        for method in [RMethod::Abs, RMethod::Squared] {
            let r = pattern.peak_r_factor(&reference, method).unwrap();
            assert!(r.abs() < TOLERANCE);
            assert!((pattern.optimal_scale() - 1.0).abs() < TOLERANCE);
        }
    }

    #[test]
    fn thermal_factors_must_match_orbit_count() {
        let (_, _, mut pattern) = defined_pattern();
        assert_eq!(
            pattern.set_b_factors(&[0.1, 0.2]),
            Err(PatternError::OrbitMismatch { expected: 1, found: 2 })
        );
        assert!(pattern.set_b_factors(&[1.5]).is_ok());
    }

    #[test]
    fn default_measurement_grid_spans_range_at_resolution() {
        let pattern = CalculatedPattern::new(PatternSettings::default());
        let angles = pattern.measurement_angles();
        assert_eq!(angles.len(), 4501);
        assert!((angles[0] - 10.0).abs() < TOLERANCE);
        assert!((angles[4500] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn adopting_a_reference_takes_its_range_and_grid() {
        let (structure, symmetry, mut pattern) = defined_pattern();
        let angles: Vec<f64> = (0..1500).map(|i| 30.0 + i as f64 * 0.02).collect();
        let reference = Pattern::Experimental(
            ExperimentalPattern::new(PatternSettings::default(), &angles, &vec![1.0; 1500]).unwrap(),
        );
        pattern.adopt_reference(&reference, &structure, &symmetry).unwrap();
        assert!((pattern.settings().min_two_theta - 30.0).abs() < TOLERANCE);
        assert_eq!(pattern.measurement_angles().len(), 1500);
        assert!(pattern
            .reflections()
            .iter()
            .all(|r| r.two_theta() >= 30.0 && r.two_theta() <= pattern.settings().max_two_theta));
    }

    #[test]
    fn combined_peaks_after_matching_scale_to_one_thousand() {
        let (_, _, mut pattern) = defined_pattern();
        let reference = pattern.peaks();
        pattern.match_to_reference(&reference, DEFAULT_MATCH_TOLERANCE);
        let combined = pattern.combined_peaks();
        assert_eq!(combined.len(), pattern.reflections().len());
        let maximum = combined.iter().map(|p| p.intensity()).fold(0.0, f64::max);
        assert!((maximum - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn combined_peaks_merge_close_reflections_without_matching() {
        let (_, _, pattern) = defined_pattern();
        let combined = pattern.combined_peaks();
        let total: f64 = combined.iter().map(|p| p.intensity()).sum();
        let expected: f64 = pattern.reflections().iter().map(|r| r.intensity()).sum();
        assert!((total - expected).abs() < 1e-6 * expected);
        assert!(combined.len() <= pattern.reflections().len());
    }

    #[test]
    fn profile_r_factor_needs_a_trace() {
        let (_, _, pattern) = defined_pattern();
        let reference = Pattern::Experimental(
            ExperimentalPattern::from_peaks(
                PatternSettings::default(),
                &[DiffractionPeak::new(43.0, 100.0)],
            )
            .unwrap(),
        );
        assert_eq!(
            pattern.profile_r_factor(&reference, RMethod::Rietveld),
            Err(PatternError::NoContinuousTrace)
        );
    }
}
