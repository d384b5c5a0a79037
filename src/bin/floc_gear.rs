use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use floc_gear::analysis::{AnalysisCommand, DEFAULT_ANALYSIS_BINARY, DEFAULT_ANALYSIS_LIBRARY};
use floc_gear::app::Gear;
use floc_gear::config::{ConfigLoader, DEFAULT_CONFIG_PATH, DEFAULT_OUTPUT_DIR};
use floc_gear::error::GearError;
use floc_gear::flywheel::{FlywheelHttpClient, SKIP_VERSION_CHECK_ENV, version_check_enabled};
use floc_gear::store::OutputLayout;

#[derive(Parser)]
#[command(name = "floc-gear")]
#[command(about = "Gather fLoc session data from Flywheel and run the fLoc analysis")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, help = "Full path to the input json config file")]
    config_file: Utf8PathBuf,

    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, help = "Directory in which to save the results")]
    output_dir: Utf8PathBuf,

    #[arg(long, default_value = DEFAULT_ANALYSIS_BINARY)]
    analysis_binary: Utf8PathBuf,

    #[arg(long, default_value = DEFAULT_ANALYSIS_LIBRARY)]
    analysis_library: Utf8PathBuf,

    #[arg(long, help = "Stop after the input manifest is written")]
    skip_analysis: bool,
}

fn main() -> ExitCode {
    // SAFETY: no other threads exist yet.
    unsafe { std::env::set_var(SKIP_VERSION_CHECK_ENV, "1") };

    match run() {
        Ok(code) => code,
        Err(report) => match report.downcast_ref::<GearError>() {
            Some(GearError::NoInputFilesFound) => {
                error!("errors finding input files");
                ExitCode::from(GearError::NoInputFilesFound.exit_code())
            }
            Some(gear) => {
                eprintln!("{report:?}");
                ExitCode::from(gear.exit_code())
            }
            None => {
                eprintln!("{report:?}");
                ExitCode::from(1)
            }
        },
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ConfigLoader::load(cli.config_file.as_std_path())?;

    info!("creating Flywheel client");
    let client = FlywheelHttpClient::new(&config.api_key, version_check_enabled())?;
    let gear = Gear::new(client);

    info!(output_dir = %cli.output_dir, "gathering fLoc data");
    let layout = OutputLayout::new(cli.output_dir.clone());
    let outcome = gear.fetch(&config, &layout)?;

    if cli.skip_analysis {
        return Ok(ExitCode::SUCCESS);
    }

    let command = AnalysisCommand {
        binary: cli.analysis_binary,
        library: cli.analysis_library,
        data_dir: outcome.data_dir,
        config_path: cli.config_file,
    };
    let result = command.run()?;
    Ok(ExitCode::from(result.exit_code()))
}
