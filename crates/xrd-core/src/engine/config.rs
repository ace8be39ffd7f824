pub use crate::core::profile::background::BackgroundKind;
use crate::core::matching::matcher::DEFAULT_MATCH_TOLERANCE;
use crate::core::pattern::calculated::DEFAULT_BACKGROUND_TERMS;
use serde::Deserialize;
use thiserror::Error;

/// Most background terms a refinement will fit.
pub const MAX_BACKGROUND_TERMS: usize = 20;
/// First exponent of a power-series background when none is given.
pub const DEFAULT_POWER_SERIES_START: i32 = -1;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefinementMode {
    /// Integrated peak intensities only.
    PeakBased,
    /// Full-profile refinement against a continuous trace.
    Rietveld,
}

/// Structural parameter groups the user asked to refine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefinementTargets {
    pub positions: bool,
    pub b_factors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSettings {
    pub gradient_step: f64,
    pub objective_delta: f64,
    pub iterations_per_parameter: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            gradient_step: 1e-6,
            objective_delta: 1e-12,
            iterations_per_parameter: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundConfig {
    pub kind: BackgroundKind,
    pub terms: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementConfig {
    pub mode: RefinementMode,
    pub targets: RefinementTargets,
    pub min_b_factor: f64,
    pub max_b_factor: f64,
    /// Largest fractional change of any lattice length or angle. Zero or
    /// negative disables lattice refinement.
    pub max_lattice_change: f64,
    pub background: BackgroundConfig,
    pub match_tolerance: f64,
    pub poor_match_threshold: f64,
    pub optimizer: OptimizerSettings,
}

impl RefinementConfig {
    pub fn refines_lattice(&self) -> bool {
        self.max_lattice_change > 0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefinementConfigBuilder {
    mode: Option<RefinementMode>,
    targets: Option<RefinementTargets>,
    min_b_factor: Option<f64>,
    max_b_factor: Option<f64>,
    max_lattice_change: Option<f64>,
    background_kind: Option<BackgroundKind>,
    background_terms: Option<usize>,
    match_tolerance: Option<f64>,
    poor_match_threshold: Option<f64>,
    optimizer: Option<OptimizerSettings>,
}

impl RefinementConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: RefinementMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn targets(mut self, targets: RefinementTargets) -> Self {
        self.targets = Some(targets);
        self
    }
    pub fn refine_positions(mut self, refine: bool) -> Self {
        self.targets.get_or_insert_with(Default::default).positions = refine;
        self
    }
    pub fn refine_b_factors(mut self, refine: bool) -> Self {
        self.targets.get_or_insert_with(Default::default).b_factors = refine;
        self
    }
    pub fn min_b_factor(mut self, value: f64) -> Self {
        self.min_b_factor = Some(value);
        self
    }
    pub fn max_b_factor(mut self, value: f64) -> Self {
        self.max_b_factor = Some(value);
        self
    }
    pub fn max_lattice_change(mut self, fraction: f64) -> Self {
        self.max_lattice_change = Some(fraction);
        self
    }
    pub fn background_kind(mut self, kind: BackgroundKind) -> Self {
        self.background_kind = Some(kind);
        self
    }
    pub fn background_terms(mut self, terms: usize) -> Self {
        self.background_terms = Some(terms);
        self
    }
    pub fn match_tolerance(mut self, degrees: f64) -> Self {
        self.match_tolerance = Some(degrees);
        self
    }
    pub fn poor_match_threshold(mut self, r_factor: f64) -> Self {
        self.poor_match_threshold = Some(r_factor);
        self
    }
    pub fn optimizer(mut self, settings: OptimizerSettings) -> Self {
        self.optimizer = Some(settings);
        self
    }

    pub fn build(self) -> Result<RefinementConfig, ConfigError> {
        let config = RefinementConfig {
            mode: self.mode.ok_or(ConfigError::MissingParameter("mode"))?,
            targets: self.targets.unwrap_or_default(),
            min_b_factor: self.min_b_factor.unwrap_or(0.1),
            max_b_factor: self.max_b_factor.unwrap_or(4.0),
            max_lattice_change: self.max_lattice_change.unwrap_or(0.05),
            background: BackgroundConfig {
                kind: self.background_kind.unwrap_or_default(),
                terms: self.background_terms.unwrap_or(DEFAULT_BACKGROUND_TERMS),
            },
            match_tolerance: self.match_tolerance.unwrap_or(DEFAULT_MATCH_TOLERANCE),
            poor_match_threshold: self.poor_match_threshold.unwrap_or(0.9),
            optimizer: self.optimizer.unwrap_or_default(),
        };
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &RefinementConfig) -> Result<(), ConfigError> {
    if config.min_b_factor > config.max_b_factor {
        return Err(ConfigError::InvalidParameter {
            name: "min_b_factor",
            reason: format!(
                "{} exceeds the maximum of {}",
                config.min_b_factor, config.max_b_factor
            ),
        });
    }
    let positive = [
        ("match_tolerance", config.match_tolerance),
        ("gradient_step", config.optimizer.gradient_step),
        ("objective_delta", config.optimizer.objective_delta),
    ];
    for (name, value) in positive {
        if value.is_nan() || value <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name,
                reason: format!("must be positive, got {value}"),
            });
        }
    }
    if config.optimizer.iterations_per_parameter == 0 {
        return Err(ConfigError::InvalidParameter {
            name: "iterations_per_parameter",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.background.terms > MAX_BACKGROUND_TERMS {
        return Err(ConfigError::InvalidParameter {
            name: "background_terms",
            reason: format!(
                "{} exceeds the limit of {MAX_BACKGROUND_TERMS}",
                config.background.terms
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_required() {
        assert_eq!(
            RefinementConfigBuilder::new().build(),
            Err(ConfigError::MissingParameter("mode"))
        );
    }

    #[test]
    fn defaults_fill_every_optional_field() {
        let config = RefinementConfigBuilder::new()
            .mode(RefinementMode::Rietveld)
            .build()
            .unwrap();
        assert_eq!(config.targets, RefinementTargets::default());
        assert_eq!(config.min_b_factor, 0.1);
        assert_eq!(config.max_b_factor, 4.0);
        assert_eq!(config.max_lattice_change, 0.05);
        assert_eq!(config.background.kind, BackgroundKind::Chebyshev);
        assert_eq!(config.background.terms, 5);
        assert_eq!(config.match_tolerance, 0.15);
        assert_eq!(config.poor_match_threshold, 0.9);
        assert_eq!(config.optimizer, OptimizerSettings::default());
        assert!(config.refines_lattice());
    }

    #[test]
    fn target_setters_accumulate() {
        let config = RefinementConfigBuilder::new()
            .mode(RefinementMode::PeakBased)
            .refine_positions(true)
            .refine_b_factors(true)
            .max_lattice_change(0.0)
            .build()
            .unwrap();
        assert!(config.targets.positions && config.targets.b_factors);
        assert!(!config.refines_lattice());
    }

    #[test]
    fn inverted_b_factor_bounds_are_rejected() {
        let result = RefinementConfigBuilder::new()
            .mode(RefinementMode::PeakBased)
            .min_b_factor(3.0)
            .max_b_factor(1.0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { name: "min_b_factor", .. })
        ));
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        let result = RefinementConfigBuilder::new()
            .mode(RefinementMode::PeakBased)
            .match_tolerance(0.0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { name: "match_tolerance", .. })
        ));
    }

    #[test]
    fn too_many_background_terms_are_rejected() {
        let result = RefinementConfigBuilder::new()
            .mode(RefinementMode::Rietveld)
            .background_terms(MAX_BACKGROUND_TERMS + 1)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { name: "background_terms", .. })
        ));
    }
}
