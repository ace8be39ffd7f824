use crate::core::peaks::diffraction_peak::DiffractionPeak;

/// Largest 2θ gap (degrees) at which two peaks are considered the same.
pub const DEFAULT_MATCH_TOLERANCE: f64 = 0.15;

/// Result of aligning the peaks of one pattern against a reference.
///
/// `matches[i]` lists the indices of peaks matched to reference peak `i`;
/// `unmatched` lists peaks with no reference peak within tolerance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeakMatching {
    matches: Vec<Vec<usize>>,
    unmatched: Vec<usize>,
}

impl PeakMatching {
    pub fn matches(&self) -> &[Vec<usize>] {
        &self.matches
    }

    pub fn unmatched(&self) -> &[usize] {
        &self.unmatched
    }

    pub fn reference_count(&self) -> usize {
        self.matches.len()
    }

    /// Reference index assigned to each of the `peak_count` matched peaks.
    pub fn assignments(&self, peak_count: usize) -> Vec<Option<usize>> {
        let mut assignments = vec![None; peak_count];
        for (reference, peaks) in self.matches.iter().enumerate() {
            for &peak in peaks {
                if let Some(slot) = assignments.get_mut(peak) {
                    *slot = Some(reference);
                }
            }
        }
        assignments
    }
}

/// Assigns each angle in `angles` to the nearest peak of the ascending
/// `reference` list. Ties resolve to the lower reference index.
pub fn match_peaks(angles: &[f64], reference: &[DiffractionPeak], tolerance: f64) -> PeakMatching {
    let mut matching = PeakMatching {
        matches: vec![Vec::new(); reference.len()],
        unmatched: Vec::new(),
    };
    for (index, &angle) in angles.iter().enumerate() {
        match nearest(angle, reference) {
            Some((nearest, gap)) if gap <= tolerance => matching.matches[nearest].push(index),
            _ => matching.unmatched.push(index),
        }
    }
    matching
}

fn nearest(angle: f64, reference: &[DiffractionPeak]) -> Option<(usize, f64)> {
    let upper = reference.partition_point(|p| p.two_theta() < angle);
    let below = upper
        .checked_sub(1)
        .map(|i| (i, (angle - reference[i].two_theta()).abs()));
    let above = reference
        .get(upper)
        .map(|p| (upper, (p.two_theta() - angle).abs()));
    match (below, above) {
        (Some(b), Some(a)) => Some(if a.1 < b.1 { a } else { b }),
        (b, a) => b.or(a),
    }
}
