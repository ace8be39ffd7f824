use crate::cli::CalculateArgs;
use crate::config::build_calculate_config;
use crate::crystal;
use crate::error::Result;
use crate::output::{self, ProfileRow};
use crate::utils::progress::CliProgressHandler;
use tracing::info;
use xrdpp::engine::progress::ProgressReporter;
use xrdpp::workflows;

pub fn run(args: CalculateArgs) -> Result<()> {
    let config = build_calculate_config(&args)?;
    let crystal = crystal::load(&config.crystal_path)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the calculation workflow...");
    let calculation = workflows::calculate::run(
        &crystal.structure,
        &crystal.symmetry,
        config.settings,
        &reporter,
    )?;

    print!("{}", output::format_reflections(&calculation.reflections));

    if let Some(path) = &config.reflections_output {
        output::write_reflections(path, &calculation.reflections)?;
        println!("Reflections written to: {}", path.display());
    }
    if let Some(path) = &config.profile_output {
        let angles = calculation.pattern.measurement_angles();
        let intensities = calculation.pattern.scaled_intensities(&angles);
        let rows: Vec<ProfileRow> = angles
            .into_iter()
            .zip(intensities)
            .map(|(two_theta, calculated)| ProfileRow {
                two_theta,
                calculated,
                measured: None,
            })
            .collect();
        output::write_profile(path, &rows)?;
        println!("Profile written to: {}", path.display());
    }
    Ok(())
}
