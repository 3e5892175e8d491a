use rusqlite::Error as RusqliteError;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedPrepError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into SeedPrepError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Configuration error: {0}")]
    ConfigError(#[from] Box<figment::Error>),

    #[error("Fixture error: {0}")]
    FixtureError(String),

    #[error("Failed to launch '{command}': {source}")]
    LaunchError {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {waited:?} waiting for '{}' to be ready", .path.display())]
    ReadinessTimeout { path: PathBuf, waited: Duration },

    #[error("Application exited ({status}) before '{}' was ready", .path.display())]
    AppExited { path: PathBuf, status: ExitStatus },

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}

impl From<toml::de::Error> for SeedPrepError {
    fn from(err: toml::de::Error) -> Self {
        SeedPrepError::FixtureError(err.to_string())
    }
}

impl From<figment::Error> for SeedPrepError {
    fn from(err: figment::Error) -> Self {
        SeedPrepError::ConfigError(Box::new(err))
    }
}
