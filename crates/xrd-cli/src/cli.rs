use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use xrdpp::core::scattering::Method;
use xrdpp::engine::config::RefinementMode;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "XRD++ CLI - Calculate powder diffraction patterns of crystal structures and refine them against measured patterns.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel intensity and background evaluation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Calculate the diffraction pattern of a crystal structure.
    Calculate(CalculateArgs),
    /// Refine a crystal structure against a reference pattern.
    Refine(RefineArgs),
}

/// Pattern settings shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct PatternArgs {
    /// Diffraction method: x-ray, neutron or simple.
    #[arg(long, value_name = "METHOD")]
    pub method: Option<Method>,

    /// Wavelength of the incident radiation in Angstroms.
    #[arg(short = 'w', long, value_name = "FLOAT")]
    pub wavelength: Option<f64>,

    /// Lower end of the two-theta range in degrees.
    #[arg(long, value_name = "DEGREES")]
    pub min_two_theta: Option<f64>,

    /// Upper end of the two-theta range in degrees.
    #[arg(long, value_name = "DEGREES")]
    pub max_two_theta: Option<f64>,

    /// Step between synthesized profile points in degrees.
    #[arg(long, value_name = "DEGREES")]
    pub resolution: Option<f64>,
}

/// Arguments for the `calculate` subcommand.
#[derive(Args, Debug)]
pub struct CalculateArgs {
    /// Path to the crystal description in TOML format.
    #[arg(short = 'x', long, required = true, value_name = "PATH")]
    pub crystal: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub pattern: PatternArgs,

    /// Write the reflection list to a CSV file.
    #[arg(long, value_name = "PATH")]
    pub reflections: Option<PathBuf>,

    /// Write the synthesized profile to a CSV file.
    #[arg(long, value_name = "PATH")]
    pub profile: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S pattern.wavelength=0.7107
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Refine against integrated peak intensities.
    PeakBased,
    /// Refine against the full measured profile.
    Rietveld,
}

impl From<ModeArg> for RefinementMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PeakBased => RefinementMode::PeakBased,
            ModeArg::Rietveld => RefinementMode::Rietveld,
        }
    }
}

/// Refinement overrides for the `refine` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RefinementArgs {
    /// Refinement mode. Selected from the reference pattern when omitted.
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Refine atomic positions.
    #[arg(long)]
    pub refine_positions: bool,

    /// Refine isotropic thermal factors.
    #[arg(long)]
    pub refine_b_factors: bool,

    /// Maximum fractional change of each lattice parameter; 0 disables lattice refinement.
    #[arg(long, value_name = "FRACTION")]
    pub max_lattice_change: Option<f64>,

    /// Lower bound for thermal factors.
    #[arg(long, value_name = "FLOAT")]
    pub min_b_factor: Option<f64>,

    /// Upper bound for thermal factors.
    #[arg(long, value_name = "FLOAT")]
    pub max_b_factor: Option<f64>,
}

/// Arguments for the `refine` subcommand.
#[derive(Args, Debug)]
pub struct RefineArgs {
    /// Path to the crystal description in TOML format.
    #[arg(short = 'x', long, required = true, value_name = "PATH")]
    pub crystal: PathBuf,

    /// Path to the reference pattern (two columns: two-theta and intensity).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub reference: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub pattern: PatternArgs,

    #[command(flatten)]
    pub refinement: RefinementArgs,

    /// Write the refined reflection list to a CSV file.
    #[arg(long, value_name = "PATH")]
    pub reflections: Option<PathBuf>,

    /// Write the refined and measured profiles to a CSV file.
    #[arg(long, value_name = "PATH")]
    pub profile: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S refinement.max-b-factor=3.0
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
