use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::SeedPrepError;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

pub const ENV_PREFIX: &str = "SEEDPREP_";

/// Tauri identifier of the desktop app. Its config dir holds the database.
pub const APP_IDENTIFIER: &str = "com.verwaltungssoftware.app";
pub const DB_FILENAME: &str = "company.db";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub seedprep: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const SEEDPREP_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            seedprep: Self::SEEDPREP_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.seedprep.clone();
        self.seedprep = self.seedprep.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.seedprep.as_str()) {
            eprintln!(
                "Config error: seedprep log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::SEEDPREP_LEVEL
            );
            self.seedprep = Self::SEEDPREP_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub db_path: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_dir: Option<String>,
}

impl TargetConfig {
    const DEFAULT_COMMAND: &str = "pnpm tauri dev";

    fn default() -> Self {
        TargetConfig {
            db_path: Self::default_db_path().to_string_lossy().into_owned(),
            command: Self::DEFAULT_COMMAND.to_owned(),
            app_dir: None,
        }
    }

    /// `<config dir>/com.verwaltungssoftware.app/company.db`, which is where the
    /// app's SQL plugin creates the database. Falls back to a relative path when
    /// no home directory can be determined.
    pub fn default_db_path() -> PathBuf {
        match BaseDirs::new() {
            Some(base_dirs) => base_dirs
                .config_dir()
                .join(APP_IDENTIFIER)
                .join(DB_FILENAME),
            None => PathBuf::from(DB_FILENAME),
        }
    }

    fn ensure_valid(&mut self) {
        if self.command.trim().is_empty() {
            eprintln!(
                "Config error: target command is empty - using default of '{}'",
                Self::DEFAULT_COMMAND
            );
            self.command = Self::DEFAULT_COMMAND.to_owned();
        }

        if self.db_path.trim().is_empty() {
            let default_path = Self::default_db_path();
            eprintln!(
                "Config error: target db_path is empty - using default of '{}'",
                default_path.display()
            );
            self.db_path = default_path.to_string_lossy().into_owned();
        }

        if self.app_dir.as_deref().is_some_and(|dir| dir.trim().is_empty()) {
            self.app_dir = None;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadinessConfig {
    pub interval_ms: u64,
    /// Upper bound on the wait. 0 means wait forever.
    pub timeout_secs: u64,
}

impl ReadinessConfig {
    const INTERVAL_MS: u64 = 1000;
    const TIMEOUT_SECS: u64 = 300;

    fn default() -> Self {
        ReadinessConfig {
            interval_ms: Self::INTERVAL_MS,
            timeout_secs: Self::TIMEOUT_SECS,
        }
    }

    fn ensure_valid(&mut self) {
        if self.interval_ms == 0 {
            eprintln!(
                "Config error: readiness interval_ms of 0 is invalid - using default of '{}'",
                Self::INTERVAL_MS
            );
            self.interval_ms = Self::INTERVAL_MS;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SeedConfig {
    /// Optional TOML fixture file replacing the built-in seed rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub target: TargetConfig,
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

impl Config {
    pub fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            target: TargetConfig::default(),
            readiness: ReadinessConfig::default(),
            seed: SeedConfig::default(),
        }
    }

    pub fn get_config_path(project_dirs: &ProjectDirs) -> PathBuf {
        project_dirs.data_local_dir().join("config.toml")
    }

    /// Loads the configuration from a TOML file located in the tool's data directory.
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        Self::load_from_path(&Self::get_config_path(project_dirs))
    }

    pub fn load_from_path(config_path: &Path) -> Self {
        let default_config = Config::default();

        if !config_path.exists() {
            Self::write_default(config_path, &default_config);
        }

        let mut config = Self::extract(config_path, &default_config).unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    /// Defaults, then the TOML file (if it exists), then `SEEDPREP_` environment variables.
    /// Environment keys use `__` between section and key: `SEEDPREP_READINESS__TIMEOUT_SECS`.
    fn extract(config_path: &Path, default_config: &Config) -> Result<Config, SeedPrepError> {
        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment.extract()?)
    }

    fn write_default(config_path: &Path, default_config: &Config) {
        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        match toml::to_string_pretty(default_config) {
            Ok(toml_string) => {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            }
            Err(_) => eprintln!("Failed to serialize default config."),
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.target.ensure_valid();
        self.readiness.ensure_valid();
    }

    pub fn get() -> Result<&'static Config, SeedPrepError> {
        CONFIG
            .get()
            .ok_or_else(|| SeedPrepError::Error("Configuration not initialized".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_db_path_ends_with_app_database() {
        let path = TargetConfig::default_db_path();
        assert!(path.ends_with(Path::new(APP_IDENTIFIER).join(DB_FILENAME)));
    }

    #[test]
    fn test_missing_config_file_writes_defaults() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested").join("config.toml");
            let config = Config::load_from_path(&path);

            assert!(path.exists(), "Default config should have been written");
            assert_eq!(config.target.command, "pnpm tauri dev");
            assert_eq!(config.readiness.interval_ms, 1000);
            assert_eq!(config.readiness.timeout_secs, 300);
            assert_eq!(config.logging.seedprep, "info");
            assert!(config.seed.fixtures.is_none());

            // The written file must load back to the same values
            let reloaded = Config::load_from_path(&path);
            assert_eq!(config, reloaded);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [target]
                db_path = "/tmp/seedprep/company.db"
                command = "npm run tauri dev"

                [readiness]
                timeout_secs = 30
                "#,
            )?;

            let config = Config::load_from_path(Path::new("config.toml"));
            assert_eq!(config.target.db_path, "/tmp/seedprep/company.db");
            assert_eq!(config.target.command, "npm run tauri dev");
            assert_eq!(config.readiness.timeout_secs, 30);
            // Untouched keys keep their defaults
            assert_eq!(config.readiness.interval_ms, 1000);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [readiness]
                timeout_secs = 30
                "#,
            )?;
            jail.set_env("SEEDPREP_READINESS__TIMEOUT_SECS", "5");
            jail.set_env("SEEDPREP_SEED__FIXTURES", "fixtures.toml");

            let config = Config::load_from_path(Path::new("config.toml"));
            assert_eq!(config.readiness.timeout_secs, 5);
            assert_eq!(config.seed.fixtures.as_deref(), Some("fixtures.toml"));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [logging]
                seedprep = "  LOUD "

                [target]
                command = "   "

                [readiness]
                interval_ms = 0
                "#,
            )?;

            let config = Config::load_from_path(Path::new("config.toml"));
            assert_eq!(config.logging.seedprep, "info");
            assert_eq!(config.target.command, "pnpm tauri dev");
            assert_eq!(config.readiness.interval_ms, 1000);
            Ok(())
        });
    }

    #[test]
    fn test_log_level_is_normalized() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [logging]
                seedprep = " DEBUG "
                "#,
            )?;

            let config = Config::load_from_path(Path::new("config.toml"));
            assert_eq!(config.logging.seedprep, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_unparseable_file_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "this is = = not toml")?;

            let config = Config::load_from_path(Path::new("config.toml"));
            assert_eq!(config.readiness.timeout_secs, 300);
            Ok(())
        });
    }
}
