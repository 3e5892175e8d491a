use clap::{Args, Parser, Subcommand};
use log::info;
use std::io;

use crate::config::Config;
use crate::error::SeedPrepError;
use crate::runner::{FixtureRunner, RunOptions, SUCCESS_MESSAGE};
use crate::utils::Utils;

#[derive(Parser)]
#[command(
    name = "seedprep",
    version,
    about = "seedprep: Reset the Verwaltungssoftware dev database and seed it with test fixtures"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Database file (default: the app's company.db in its config directory)
    #[arg(long = "db-path", short = 'd', global = true)]
    pub db_path: Option<String>,

    /// TOML file with seed rows replacing the built-in fixtures
    #[arg(long = "fixtures", short = 'f', global = true)]
    pub fixtures: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Delete the database, start the app, wait for the database and seed it (default)
    Run {
        #[command(flatten)]
        launch: LaunchArgs,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Seed an existing database without restarting the app
    Seed,

    /// Delete the database file
    Clean,

    /// Wait for the database file to appear
    Wait {
        #[command(flatten)]
        wait: WaitArgs,
    },
}

#[derive(Args, Default, Debug, Clone)]
pub struct LaunchArgs {
    /// Shell command that starts the app (default: "pnpm tauri dev")
    #[arg(long = "command", short = 'c')]
    pub command: Option<String>,

    /// Directory to start the app in (default: current directory)
    #[arg(long = "app-dir", short = 'a')]
    pub app_dir: Option<String>,
}

#[derive(Args, Default, Debug, Clone)]
pub struct WaitArgs {
    /// Give up after this many seconds (0 waits forever)
    #[arg(long = "timeout", short = 't')]
    pub timeout: Option<u64>,

    /// Time between checks for the database file, in milliseconds
    #[arg(long = "interval-ms", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: Option<u64>,
}

impl WaitArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(timeout) = self.timeout {
            config.readiness.timeout_secs = timeout;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.readiness.interval_ms = interval_ms;
        }
    }
}

impl LaunchArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(command) = &self.command {
            config.target.command = command.clone();
        }
        if let Some(app_dir) = &self.app_dir {
            config.target.app_dir = Some(app_dir.clone());
        }
    }
}

impl Cli {
    pub fn handle_command_line() -> Result<(), SeedPrepError> {
        let args = Cli::parse();
        let config = Config::get()?;

        let command = args.command.unwrap_or_else(Command::default_run);
        let config = Self::effective_config(config, args.db_path, args.fixtures, &command);

        match command {
            Command::Run { .. } => Self::run(&config),
            Command::Seed => Self::seed(&config),
            Command::Clean => Self::clean(&config),
            Command::Wait { .. } => Self::wait(&config),
        }
    }

    /// The loaded config with command line flags applied on top.
    fn effective_config(
        base: &Config,
        db_path: Option<String>,
        fixtures: Option<String>,
        command: &Command,
    ) -> Config {
        let mut config = base.clone();

        if let Some(db_path) = db_path {
            config.target.db_path = db_path;
        }
        if let Some(fixtures) = fixtures {
            config.seed.fixtures = Some(fixtures);
        }

        match command {
            Command::Run { launch, wait } => {
                launch.apply(&mut config);
                wait.apply(&mut config);
            }
            Command::Wait { wait } => wait.apply(&mut config),
            Command::Seed | Command::Clean => {}
        }

        config
    }

    fn runner(config: &Config) -> Result<FixtureRunner, SeedPrepError> {
        Ok(FixtureRunner::new(RunOptions::from_config(config)?))
    }

    fn run(config: &Config) -> Result<(), SeedPrepError> {
        info!(
            "Running '{}' against '{}'",
            config.target.command, config.target.db_path
        );
        let summary = Self::runner(config)?.run()?;
        info!(
            "Run finished: waited {}, {} row(s) seeded, app exited with {}",
            Utils::format_elapsed(summary.waited),
            summary.seed.rows_inserted,
            summary.app_status
        );
        Ok(())
    }

    fn seed(config: &Config) -> Result<(), SeedPrepError> {
        let report = Self::runner(config)?.seed()?;
        println!("{}", SUCCESS_MESSAGE);
        println!(
            "company_data: {} row(s), mandanten: {} row(s)",
            report.company_rows, report.mandanten_rows
        );
        Ok(())
    }

    fn clean(config: &Config) -> Result<(), SeedPrepError> {
        let runner = Self::runner(config)?;
        let path = runner.database().path().display().to_string();
        if runner.clean()? {
            println!("Deleted '{}'", path);
        } else {
            println!("Nothing to delete at '{}'", path);
        }
        Ok(())
    }

    fn wait(config: &Config) -> Result<(), SeedPrepError> {
        let runner = Self::runner(config)?;
        let waited = runner.wait_for_database(&mut io::stdout(), None)?;
        println!(
            "Database '{}' is ready (waited {})",
            runner.database().path().display(),
            Utils::format_elapsed(waited)
        );
        Ok(())
    }
}

impl Command {
    fn default_run() -> Command {
        Command::Run {
            launch: LaunchArgs::default(),
            wait: WaitArgs::default(),
        }
    }
}
