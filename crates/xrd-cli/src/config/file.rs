use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;
use xrdpp::core::scattering::Method;
use xrdpp::engine::config::RefinementMode;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilePatternConfig {
    pub method: Option<Method>,
    pub wavelength: Option<f64>,
    pub min_two_theta: Option<f64>,
    pub max_two_theta: Option<f64>,
    pub resolution: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileBackgroundKind {
    Chebyshev,
    PowerSeries,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileBackgroundConfig {
    pub kind: Option<FileBackgroundKind>,
    pub terms: Option<usize>,
    /// Only meaningful for the power-series kind.
    pub start_exponent: Option<i32>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileOptimizerConfig {
    pub gradient_step: Option<f64>,
    pub objective_delta: Option<f64>,
    pub iterations_per_parameter: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRefinementConfig {
    pub mode: Option<RefinementMode>,
    pub refine_positions: Option<bool>,
    pub refine_b_factors: Option<bool>,
    pub min_b_factor: Option<f64>,
    pub max_b_factor: Option<f64>,
    pub max_lattice_change: Option<f64>,
    pub match_tolerance: Option<f64>,
    pub poor_match_threshold: Option<f64>,
    pub background: Option<FileBackgroundConfig>,
    pub optimizer: Option<FileOptimizerConfig>,
}

/// The on-disk configuration file. Every key is optional.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub pattern: Option<FilePatternConfig>,
    pub refinement: Option<FileRefinementConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|source| CliError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads `path` if given, otherwise starts from an empty configuration.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn full_file_parses_into_nested_sections() {
        let config = FileConfig::from_toml(
            r#"
            [pattern]
            method = "neutron"
            wavelength = 1.2
            min-two-theta = 5.0

            [refinement]
            mode = "peak-based"
            refine-b-factors = true
            max-lattice-change = 0.02

            [refinement.background]
            kind = "power-series"
            terms = 4
            start-exponent = -2

            [refinement.optimizer]
            iterations-per-parameter = 10
            "#,
        )
        .unwrap();

        let pattern = config.pattern.unwrap();
        assert_eq!(pattern.method, Some(Method::Neutron));
        assert_eq!(pattern.wavelength, Some(1.2));
        assert_eq!(pattern.max_two_theta, None);

        let refinement = config.refinement.unwrap();
        assert_eq!(refinement.mode, Some(RefinementMode::PeakBased));
        assert_eq!(refinement.refine_b_factors, Some(true));
        let background = refinement.background.unwrap();
        assert_eq!(background.kind, Some(FileBackgroundKind::PowerSeries));
        assert_eq!(background.start_exponent, Some(-2));
        assert_eq!(refinement.optimizer.unwrap().iterations_per_parameter, Some(10));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::from_toml("[pattern]\nwavelenght = 1.5").is_err());
        assert!(FileConfig::from_toml("[placement]\n").is_err());
    }

    #[test]
    fn empty_file_is_the_default() {
        assert_eq!(FileConfig::from_toml("").unwrap(), FileConfig::default());
        assert_eq!(FileConfig::load_optional(None).unwrap(), FileConfig::default());
    }

    #[test]
    fn unreadable_and_malformed_files_are_reported() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(FileConfig::from_file(&missing), Err(CliError::Io(_))));

        let malformed = dir.path().join("bad.toml");
        fs::write(&malformed, "[pattern\nwavelength = ").unwrap();
        assert!(matches!(
            FileConfig::from_file(&malformed),
            Err(CliError::ConfigFile { path, .. }) if path == malformed
        ));
    }
}
