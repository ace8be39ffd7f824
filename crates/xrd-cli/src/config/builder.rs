use super::defaults::DefaultsConfig;
use super::file::{
    FileBackgroundConfig, FileBackgroundKind, FileConfig, FileOptimizerConfig, FilePatternConfig,
    FileRefinementConfig,
};
use super::models::{CalculateConfig, RefineConfig};
use crate::cli::{CalculateArgs, PatternArgs, RefineArgs, RefinementArgs};
use crate::error::{CliError, Result};
use crate::utils::parser;
use tracing::debug;
use xrdpp::core::pattern::PatternSettings;
use xrdpp::engine::config::{
    BackgroundKind, OptimizerSettings, RefinementConfigBuilder, RefinementMode,
};

pub fn build_calculate_config(args: &CalculateArgs) -> Result<CalculateConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = FileConfig::load_optional(args.config.as_deref())?;
    let file_config = apply_set_values(file_config, &args.set_values)?;

    let settings = merge_pattern(
        &args.pattern,
        file_config.pattern.unwrap_or_default(),
        &defaults,
    )?;
    debug!(?settings, "Resolved pattern settings");

    Ok(CalculateConfig {
        crystal_path: args.crystal.clone(),
        settings,
        reflections_output: args.reflections.clone(),
        profile_output: args.profile.clone(),
    })
}

pub fn build_refine_config(args: &RefineArgs) -> Result<RefineConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = FileConfig::load_optional(args.config.as_deref())?;
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let settings = merge_pattern(
        &args.pattern,
        file_config.pattern.take().unwrap_or_default(),
        &defaults,
    )?;
    let refinement_file = file_config.refinement.take().unwrap_or_default();
    let mode = args
        .refinement
        .mode
        .map(RefinementMode::from)
        .or(refinement_file.mode);
    let refinement = merge_refinement(&args.refinement, refinement_file, &defaults)?;
    debug!(?settings, ?mode, ?refinement, "Resolved refinement settings");

    Ok(RefineConfig {
        crystal_path: args.crystal.clone(),
        reference_path: args.reference.clone(),
        settings,
        mode,
        refinement,
        reflections_output: args.reflections.clone(),
        profile_output: args.profile.clone(),
    })
}

fn merge_pattern(
    args: &PatternArgs,
    file: FilePatternConfig,
    defaults: &DefaultsConfig,
) -> Result<PatternSettings> {
    let base = &defaults.pattern;
    let settings = PatternSettings {
        method: args.method.or(file.method).unwrap_or(base.method),
        wavelength: args
            .wavelength
            .or(file.wavelength)
            .unwrap_or(base.wavelength),
        min_two_theta: args
            .min_two_theta
            .or(file.min_two_theta)
            .unwrap_or(base.min_two_theta),
        max_two_theta: args
            .max_two_theta
            .or(file.max_two_theta)
            .unwrap_or(base.max_two_theta),
        resolution: args
            .resolution
            .or(file.resolution)
            .unwrap_or(base.resolution),
    };
    if settings.wavelength.is_nan() || settings.wavelength <= 0.0 {
        return Err(CliError::Config(format!(
            "wavelength must be positive, got {}",
            settings.wavelength
        )));
    }
    if settings.min_two_theta.is_nan() || settings.min_two_theta >= settings.max_two_theta {
        return Err(CliError::Config(format!(
            "two-theta range [{}, {}] is empty",
            settings.min_two_theta, settings.max_two_theta
        )));
    }
    if settings.resolution.is_nan() || settings.resolution <= 0.0 {
        return Err(CliError::Config(format!(
            "resolution must be positive, got {}",
            settings.resolution
        )));
    }
    Ok(settings)
}

fn merge_refinement(
    args: &RefinementArgs,
    file: FileRefinementConfig,
    defaults: &DefaultsConfig,
) -> Result<RefinementConfigBuilder> {
    let mut builder = RefinementConfigBuilder::new()
        .refine_positions(args.refine_positions || file.refine_positions.unwrap_or(false))
        .refine_b_factors(args.refine_b_factors || file.refine_b_factors.unwrap_or(false));

    if let Some(value) = args.min_b_factor.or(file.min_b_factor) {
        builder = builder.min_b_factor(value);
    }
    if let Some(value) = args.max_b_factor.or(file.max_b_factor) {
        builder = builder.max_b_factor(value);
    }
    if let Some(fraction) = args.max_lattice_change.or(file.max_lattice_change) {
        builder = builder.max_lattice_change(fraction);
    }
    if let Some(degrees) = file.match_tolerance {
        builder = builder.match_tolerance(degrees);
    }
    if let Some(r_factor) = file.poor_match_threshold {
        builder = builder.poor_match_threshold(r_factor);
    }
    if let Some(background) = file.background {
        builder = merge_background(builder, background, defaults)?;
    }
    if let Some(optimizer) = file.optimizer {
        builder = builder.optimizer(merge_optimizer(optimizer));
    }
    Ok(builder)
}

fn merge_background(
    builder: RefinementConfigBuilder,
    file: FileBackgroundConfig,
    defaults: &DefaultsConfig,
) -> Result<RefinementConfigBuilder> {
    let kind = match (file.kind, file.start_exponent) {
        (Some(FileBackgroundKind::PowerSeries), start) => Some(BackgroundKind::PowerSeries {
            start_exponent: start.unwrap_or(defaults.power_series_start),
        }),
        (Some(FileBackgroundKind::Chebyshev), Some(_)) => {
            return Err(CliError::Config(
                "`start-exponent` only applies to the power-series background".to_string(),
            ));
        }
        (Some(FileBackgroundKind::Chebyshev), None) => Some(BackgroundKind::Chebyshev),
        (None, Some(start)) => Some(BackgroundKind::PowerSeries {
            start_exponent: start,
        }),
        (None, None) => None,
    };

    let mut builder = builder;
    if let Some(kind) = kind {
        builder = builder.background_kind(kind);
    }
    if let Some(terms) = file.terms {
        builder = builder.background_terms(terms);
    }
    Ok(builder)
}

fn merge_optimizer(file: FileOptimizerConfig) -> OptimizerSettings {
    let defaults = OptimizerSettings::default();
    OptimizerSettings {
        gradient_step: file.gradient_step.unwrap_or(defaults.gradient_step),
        objective_delta: file.objective_delta.unwrap_or(defaults.objective_delta),
        iterations_per_parameter: file
            .iterations_per_parameter
            .unwrap_or(defaults.iterations_per_parameter),
    }
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for pair in set_values {
        let (key, value) = parser::split_key_value(pair).map_err(CliError::Config)?;
        set_value(&mut config, key, value).map_err(CliError::Config)?;
    }
    Ok(config)
}

fn set_value(config: &mut FileConfig, key: &str, value: &str) -> std::result::Result<(), String> {
    match key {
        "pattern.method" => {
            config.pattern.get_or_insert_with(Default::default).method =
                Some(parser::parse_value(key, value)?);
        }
        "pattern.wavelength" => {
            config.pattern.get_or_insert_with(Default::default).wavelength =
                Some(parser::parse_value(key, value)?);
        }
        "pattern.min-two-theta" => {
            config.pattern.get_or_insert_with(Default::default).min_two_theta =
                Some(parser::parse_value(key, value)?);
        }
        "pattern.max-two-theta" => {
            config.pattern.get_or_insert_with(Default::default).max_two_theta =
                Some(parser::parse_value(key, value)?);
        }
        "pattern.resolution" => {
            config.pattern.get_or_insert_with(Default::default).resolution =
                Some(parser::parse_value(key, value)?);
        }
        _ => {
            let Some(rest) = key.strip_prefix("refinement.") else {
                return Err(format!("Unsupported configuration key for --set: '{key}'"));
            };
            let refinement = config.refinement.get_or_insert_with(Default::default);
            set_refinement_value(refinement, rest, key, value)?;
        }
    }
    Ok(())
}

fn set_refinement_value(
    refinement: &mut FileRefinementConfig,
    field: &str,
    key: &str,
    value: &str,
) -> std::result::Result<(), String> {
    match field {
        "mode" => refinement.mode = Some(parser::parse_variant(key, value)?),
        "refine-positions" => refinement.refine_positions = Some(parser::parse_value(key, value)?),
        "refine-b-factors" => refinement.refine_b_factors = Some(parser::parse_value(key, value)?),
        "min-b-factor" => refinement.min_b_factor = Some(parser::parse_value(key, value)?),
        "max-b-factor" => refinement.max_b_factor = Some(parser::parse_value(key, value)?),
        "max-lattice-change" => {
            refinement.max_lattice_change = Some(parser::parse_value(key, value)?)
        }
        "match-tolerance" => refinement.match_tolerance = Some(parser::parse_value(key, value)?),
        "poor-match-threshold" => {
            refinement.poor_match_threshold = Some(parser::parse_value(key, value)?)
        }
        "background.kind" => {
            refinement.background.get_or_insert_with(Default::default).kind =
                Some(parser::parse_variant(key, value)?)
        }
        "background.terms" => {
            refinement.background.get_or_insert_with(Default::default).terms =
                Some(parser::parse_value(key, value)?)
        }
        "background.start-exponent" => {
            refinement
                .background
                .get_or_insert_with(Default::default)
                .start_exponent = Some(parser::parse_value(key, value)?)
        }
        "optimizer.gradient-step" => {
            refinement
                .optimizer
                .get_or_insert_with(Default::default)
                .gradient_step = Some(parser::parse_value(key, value)?)
        }
        "optimizer.objective-delta" => {
            refinement
                .optimizer
                .get_or_insert_with(Default::default)
                .objective_delta = Some(parser::parse_value(key, value)?)
        }
        "optimizer.iterations-per-parameter" => {
            refinement
                .optimizer
                .get_or_insert_with(Default::default)
                .iterations_per_parameter = Some(parser::parse_value(key, value)?)
        }
        _ => return Err(format!("Unsupported configuration key for --set: '{key}'")),
    }
    Ok(())
}
