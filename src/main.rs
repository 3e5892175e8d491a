mod app_process;
mod cli;
mod config;
mod database;
mod error;
mod readiness;
mod runner;
mod seed;
mod utils;

use cli::Cli;
use config::{Config, CONFIG};
use directories::ProjectDirs;
use flexi_logger::{
    detailed_format, Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming,
};
use log::{debug, error};

const LOG_FILE_SIZE: u64 = 1_000_000;
const LOG_FILES_KEPT: usize = 10;

fn main() {
    let project_dirs = match ProjectDirs::from("", "", "seedprep") {
        Some(project_dirs) => project_dirs,
        None => {
            eprintln!("Could not determine the seedprep data directory");
            std::process::exit(1);
        }
    };

    let config = Config::load_config(&project_dirs);

    // File logging stops when the handle is dropped
    let _logger = setup_logging(&project_dirs, &config);
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());
    debug!("Config: {:?}", config);

    if CONFIG.set(config).is_err() {
        eprintln!("Configuration was already initialized");
        std::process::exit(1);
    }

    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

/// Logs go to rotating files under the data directory.
/// Failure to set up logging is reported but does not stop the tool.
fn setup_logging(project_dirs: &ProjectDirs, config: &Config) -> Option<LoggerHandle> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    let log_spec = format!("seedprep={}", config.logging.seedprep);

    let result = Logger::try_with_str(&log_spec).and_then(|logger| {
        logger
            .log_to_file(FileSpec::default().directory(&log_dir).basename("seedprep"))
            .rotate(
                Criterion::Size(LOG_FILE_SIZE),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(LOG_FILES_KEPT),
            )
            .format_for_files(detailed_format)
            .start()
    });

    match result {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!(
                "Failed to start logging to {}: {}",
                log_dir.display(),
                e
            );
            None
        }
    }
}
