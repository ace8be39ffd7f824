use xrdpp::core::pattern::PatternSettings;
use xrdpp::engine::config::DEFAULT_POWER_SERIES_START;

/// Values used when neither the command line nor the configuration file sets
/// a key. Refinement defaults live in the library's config builder.
pub struct DefaultsConfig {
    pub pattern: PatternSettings,
    pub power_series_start: i32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            pattern: PatternSettings::default(),
            power_series_start: DEFAULT_POWER_SERIES_START,
        }
    }
}
