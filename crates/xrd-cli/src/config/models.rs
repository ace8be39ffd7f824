use std::path::PathBuf;
use xrdpp::core::pattern::PatternSettings;
use xrdpp::engine::config::{RefinementConfigBuilder, RefinementMode};

pub struct CalculateConfig {
    pub crystal_path: PathBuf,
    pub settings: PatternSettings,
    pub reflections_output: Option<PathBuf>,
    pub profile_output: Option<PathBuf>,
}

pub struct RefineConfig {
    pub crystal_path: PathBuf,
    pub reference_path: PathBuf,
    /// Settings applied to the reference when it is read; its data replaces the range.
    pub settings: PatternSettings,
    /// `None` selects the mode from the kind of reference pattern.
    pub mode: Option<RefinementMode>,
    pub refinement: RefinementConfigBuilder,
    pub reflections_output: Option<PathBuf>,
    pub profile_output: Option<PathBuf>,
}
