use crate::cli::RefineArgs;
use crate::config::build_refine_config;
use crate::error::{CliError, Result};
use crate::output::{self, ProfileRow};
use crate::utils::progress::CliProgressHandler;
use crate::{crystal, pattern_file};
use tracing::{info, warn};
use xrdpp::core::pattern::Pattern;
use xrdpp::engine::config::RefinementMode;
use xrdpp::engine::progress::ProgressReporter;
use xrdpp::workflows;
use xrdpp::workflows::report::RefinementOutcome;

/// Rietveld when the reference is a continuous trace, peak-based otherwise.
fn select_mode(requested: Option<RefinementMode>, reference: &Pattern) -> RefinementMode {
    requested.unwrap_or(if reference.has_profile() {
        RefinementMode::Rietveld
    } else {
        RefinementMode::PeakBased
    })
}

pub fn run(args: RefineArgs) -> Result<()> {
    let config = build_refine_config(&args)?;
    let mut crystal = crystal::load(&config.crystal_path)?;
    let reference = pattern_file::load(&config.reference_path, &config.settings)?;

    let mode = select_mode(config.mode, &reference);
    info!(?mode, "Selected refinement mode.");
    let refinement = config
        .refinement
        .mode(mode)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting refinement...");
    let result = workflows::refine(
        &mut crystal.structure,
        &crystal.symmetry,
        &reference,
        &refinement,
        &reporter,
    )?;

    print!("{}", output::format_report(&result.report));
    if let RefinementOutcome::PoorMatch { r_factor } = result.report.outcome {
        warn!(r_factor, "Refinement stopped before all stages ran.");
    }

    if let Some(path) = &config.reflections_output {
        output::write_reflections(path, &result.report.reflections)?;
        println!("Reflections written to: {}", path.display());
    }
    if let Some(path) = &config.profile_output {
        let angles = reference.measurement_angles();
        let calculated = result.pattern.scaled_intensities(&angles);
        let measured = reference.measured_intensities();
        let rows: Vec<ProfileRow> = angles
            .into_iter()
            .zip(calculated)
            .zip(measured)
            .map(|((two_theta, calculated), measured)| ProfileRow {
                two_theta,
                calculated,
                measured: Some(measured),
            })
            .collect();
        output::write_profile(path, &rows)?;
        println!("Profile written to: {}", path.display());
    }
    Ok(())
}
