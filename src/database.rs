use log::{debug, info};
use rusqlite::Connection;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SeedPrepError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle on the desktop app's SQLite database file.
///
/// The schema belongs to the app. This type never creates or migrates tables,
/// it only removes the file, opens connections and inspects what exists.
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Deletes the database file. Returns `Ok(false)` if there was nothing to delete.
    pub fn remove(&self) -> Result<bool, SeedPrepError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Deleted database file '{}'", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Database file '{}' not present", self.path.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Opens a connection to an existing database file.
    ///
    /// Opening never creates the file: a missing file means the app has not
    /// initialized yet, and an empty database would only fail later.
    pub fn connect(&self) -> Result<Connection, SeedPrepError> {
        if !self.exists() {
            return Err(SeedPrepError::Error(format!(
                "Database file '{}' does not exist",
                self.path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            &self.path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        debug!("Database opened at: {}", self.path.display());

        Ok(conn)
    }

    pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, SeedPrepError> {
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Which of `tables` the database file does not (yet) contain.
    pub fn missing_tables(&self, tables: &[&str]) -> Result<Vec<String>, SeedPrepError> {
        let conn = self.connect()?;
        let mut missing = Vec::new();
        for table in tables {
            if !Self::table_exists(&conn, table)? {
                missing.push((*table).to_owned());
            }
        }
        Ok(missing)
    }

    /// Row count of `table`. The name is quoted as an identifier, it cannot be bound.
    pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, SeedPrepError> {
        let sql = format!("SELECT count(*) FROM \"{}\"", table.replace('"', "\"\""));
        let count = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}
