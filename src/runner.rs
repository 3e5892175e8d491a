use log::{debug, info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use crate::app_process::{AppProcess, LaunchSettings};
use crate::config::Config;
use crate::database::Database;
use crate::error::SeedPrepError;
use crate::readiness::{self, PollSettings};
use crate::seed::{SeedData, SeedReport, Seeder, SEED_TABLES};
use crate::utils::Utils;

pub const WAITING_MESSAGE: &str = "waiting for db to be created by software";
pub const SUCCESS_MESSAGE: &str = "Successfully Seeded DB";

/// Everything one fixture run needs. Built from [`Config`] plus command line overrides.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub db_path: PathBuf,
    pub launch: LaunchSettings,
    pub poll: PollSettings,
    pub seed_data: SeedData,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Result<Self, SeedPrepError> {
        let seed_data = match &config.seed.fixtures {
            Some(path) => SeedData::load(Path::new(path))?,
            None => SeedData::default(),
        };

        Ok(RunOptions {
            db_path: PathBuf::from(&config.target.db_path),
            launch: LaunchSettings {
                command: config.target.command.clone(),
                working_dir: config.target.app_dir.as_ref().map(PathBuf::from),
            },
            poll: PollSettings::from(&config.readiness),
            seed_data,
        })
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub waited: Duration,
    pub seed: SeedReport,
    pub app_status: ExitStatus,
}

/// Resets the app database, starts the app, waits for it to recreate the
/// database and seeds it.
pub struct FixtureRunner {
    options: RunOptions,
    database: Database,
}

impl FixtureRunner {
    pub fn new(options: RunOptions) -> Self {
        let database = Database::new(&options.db_path);
        Self { options, database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn run(&self) -> Result<RunSummary, SeedPrepError> {
        self.run_with_output(&mut io::stdout())
    }

    /// The full procedure. Progress and success lines go to `out`.
    ///
    /// The app keeps running after seeding; this returns once it exits.
    pub fn run_with_output<W: Write>(&self, out: &mut W) -> Result<RunSummary, SeedPrepError> {
        self.reset();

        let mut app = AppProcess::spawn(&self.options.launch)?;

        let waited = self.wait_for_database(out, Some(&mut app))?;
        info!(
            "Database '{}' ready after {}",
            self.database.path().display(),
            Utils::format_elapsed(waited)
        );

        let seed = self.seed()?;
        writeln!(out, "{}", SUCCESS_MESSAGE)?;
        out.flush()?;

        if let Some(pid) = app.id() {
            info!("Waiting for '{}' (pid {}) to exit", app.command(), pid);
        }
        let app_status = app.wait()?;
        if !app_status.success() {
            warn!("'{}' exited with {}", self.options.launch.command, app_status);
        }

        Ok(RunSummary {
            waited,
            seed,
            app_status,
        })
    }

    /// Deletes the database file. A missing file is fine.
    pub fn clean(&self) -> Result<bool, SeedPrepError> {
        self.database.remove()
    }

    /// Like `clean`, but a failed delete only gets logged. If the stale file
    /// survives, the wait that follows will see it immediately.
    fn reset(&self) {
        if let Err(e) = self.clean() {
            warn!(
                "Could not delete '{}': {}",
                self.database.path().display(),
                e
            );
        }
    }

    /// Polls until the database file exists and holds the tables to seed,
    /// writing a progress line for every miss. Both phases share one deadline.
    ///
    /// The app creates the file before it applies its schema, so the file
    /// alone is not enough to start seeding.
    ///
    /// With `app` given, the wait ends early if the app exits before the
    /// database is ready.
    pub fn wait_for_database<W: Write>(
        &self,
        out: &mut W,
        mut app: Option<&mut AppProcess>,
    ) -> Result<Duration, SeedPrepError> {
        let path = self.database.path();
        let poll = self.options.poll;

        let mut on_miss = |_: u32, _: Duration| -> Result<(), SeedPrepError> {
            writeln!(out, "{}", WAITING_MESSAGE)?;
            out.flush()?;

            if let Some(app) = app.as_deref_mut() {
                if let Some(status) = app.try_exited()? {
                    // It may have finished the database on its way out
                    if self.schema_ready() {
                        return Ok(());
                    }
                    return Err(SeedPrepError::AppExited {
                        path: path.to_path_buf(),
                        status,
                    });
                }
            }
            Ok(())
        };

        let file_waited = readiness::wait_for_file(path, &poll, &mut on_miss)?;

        let remaining = PollSettings {
            timeout: poll.timeout.map(|timeout| timeout.saturating_sub(file_waited)),
            ..poll
        };
        let schema_waited =
            readiness::wait_until(path, &remaining, || self.schema_ready(), &mut on_miss)?;

        Ok(file_waited + schema_waited)
    }

    /// The file exists and has every table the seed writes to.
    fn schema_ready(&self) -> bool {
        if !self.database.exists() {
            return false;
        }

        match self.database.missing_tables(&SEED_TABLES) {
            Ok(missing) if missing.is_empty() => true,
            Ok(missing) => {
                debug!(
                    "'{}' exists but lacks table(s) {}",
                    self.database.path().display(),
                    missing.join(", ")
                );
                false
            }
            Err(e) => {
                // Typically a lock held while the app migrates
                debug!(
                    "Schema check on '{}' failed: {}",
                    self.database.path().display(),
                    e
                );
                false
            }
        }
    }

    pub fn seed(&self) -> Result<SeedReport, SeedPrepError> {
        info!("Seeding '{}'", self.database.path().display());
        Seeder::seed_file(&self.database, &self.options.seed_data)
    }
}
