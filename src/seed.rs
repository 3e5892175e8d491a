use chrono::NaiveDate;
use log::{debug, info, warn, Level};
use logging_timer::timer;
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::database::Database;
use crate::error::SeedPrepError;
use crate::utils::Utils;

pub const COMPANY_TABLE: &str = "company_data";
pub const MANDANTEN_TABLE: &str = "mandanten";
pub const SEED_TABLES: [&str; 2] = [COMPANY_TABLE, MANDANTEN_TABLE];

const INSERT_COMPANY_SQL: &str = "INSERT INTO company_data (unternehmensname, zusatz, adresszeile1, plz, ort, direktorTitel, direktorName, bearbeitet)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const INSERT_MANDANT_SQL: &str = "INSERT INTO mandanten (id, mandantName, adresszeile1, plz, ort, verwaltungsart, wirtschaftsjahrBeginn, wirtschaftsjahrEnde, aktuellesWirtschaftsjahr, summeOffenerPosten, bearbeitet)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

// ============================================================================
// Seed rows
// ============================================================================

/// Profile of the company operating the software (one row in `company_data`).
///
/// Field names in fixture files match the app's column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyData {
    pub unternehmensname: String,
    pub zusatz: String,
    pub adresszeile1: String,
    pub plz: String,
    pub ort: String,
    #[serde(rename = "direktorTitel")]
    pub direktor_titel: String,
    #[serde(rename = "direktorName")]
    pub direktor_name: String,
}

impl Default for CompanyData {
    fn default() -> Self {
        CompanyData {
            unternehmensname: "Zeiser + Sohn".to_owned(),
            zusatz: "UG (haftungsbeschr.)".to_owned(),
            adresszeile1: "Dürerstr. 109".to_owned(),
            plz: "68163".to_owned(),
            ort: "Mannheim".to_owned(),
            direktor_titel: "Geschäftsführer".to_owned(),
            direktor_name: "Arthur Zeiser".to_owned(),
        }
    }
}

/// How a client's property is managed. Stored as text in `mandanten.verwaltungsart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verwaltungsart {
    #[serde(rename = "WEG")]
    Weg,
    Mietverwaltung,
    Sondereigentum,
}

impl Verwaltungsart {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verwaltungsart::Weg => "WEG",
            Verwaltungsart::Mietverwaltung => "Mietverwaltung",
            Verwaltungsart::Sondereigentum => "Sondereigentum",
        }
    }
}

impl fmt::Display for Verwaltungsart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client record (one row in `mandanten`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mandant {
    pub id: String,
    #[serde(rename = "mandantName")]
    pub mandant_name: String,
    pub adresszeile1: String,
    pub plz: String,
    pub ort: String,
    pub verwaltungsart: Verwaltungsart,
    /// `DD.MM`
    #[serde(rename = "wirtschaftsjahrBeginn")]
    pub wirtschaftsjahr_beginn: String,
    /// `DD.MM`
    #[serde(rename = "wirtschaftsjahrEnde")]
    pub wirtschaftsjahr_ende: String,
    #[serde(rename = "aktuellesWirtschaftsjahr")]
    pub aktuelles_wirtschaftsjahr: String,
    #[serde(rename = "summeOffenerPosten")]
    pub summe_offener_posten: f64,
}

impl Default for Mandant {
    fn default() -> Self {
        Mandant {
            id: "1".to_owned(),
            mandant_name: "Schafweide 73".to_owned(),
            adresszeile1: "Schafweide 73".to_owned(),
            plz: "68167".to_owned(),
            ort: "Mannheim".to_owned(),
            verwaltungsart: Verwaltungsart::Weg,
            wirtschaftsjahr_beginn: "01.01".to_owned(),
            wirtschaftsjahr_ende: "31.12".to_owned(),
            aktuelles_wirtschaftsjahr: "2025".to_owned(),
            summe_offener_posten: 1234.56,
        }
    }
}

impl Mandant {
    fn validate(&self) -> Result<(), SeedPrepError> {
        for (field, value) in [
            ("wirtschaftsjahrBeginn", &self.wirtschaftsjahr_beginn),
            ("wirtschaftsjahrEnde", &self.wirtschaftsjahr_ende),
        ] {
            // Checked against a leap year so 29.02 is accepted
            if value.len() != 5 || NaiveDate::parse_from_str(&format!("{}.2000", value), "%d.%m.%Y").is_err() {
                return Err(SeedPrepError::FixtureError(format!(
                    "{} of mandant '{}' must be a DD.MM day, got '{}'",
                    field, self.id, value
                )));
            }
        }

        if self.id.trim().is_empty() {
            return Err(SeedPrepError::FixtureError(
                "mandant id must not be empty".to_string(),
            ));
        }

        if !self.summe_offener_posten.is_finite() {
            return Err(SeedPrepError::FixtureError(format!(
                "summeOffenerPosten of mandant '{}' must be a finite number",
                self.id
            )));
        }

        Ok(())
    }
}

// ============================================================================
// SeedData - the full payload for one seed run
// ============================================================================

/// The rows inserted by one seed run.
///
/// The default is the standard development fixture. A fixture file can
/// replace any subset of fields:
///
/// ```toml
/// [company]
/// unternehmensname = "Muster GmbH"
///
/// [mandant]
/// verwaltungsart = "Mietverwaltung"
/// summeOffenerPosten = 0.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeedData {
    pub company: CompanyData,
    pub mandant: Mandant,
}

impl SeedData {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, SeedPrepError> {
        let data: SeedData = toml::from_str(toml_str)?;
        data.mandant.validate()?;
        Ok(data)
    }

    pub fn load(path: &Path) -> Result<Self, SeedPrepError> {
        let toml_str = fs::read_to_string(path).map_err(|e| {
            SeedPrepError::FixtureError(format!(
                "Failed to read fixture file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let data = Self::from_toml_str(&toml_str)?;
        info!("Loaded fixtures from '{}'", path.display());
        Ok(data)
    }
}

// ============================================================================
// Seeder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub rows_inserted: usize,
    pub company_rows: i64,
    pub mandanten_rows: i64,
}

pub struct Seeder;

impl Seeder {
    /// Inserts one `company_data` row and one `mandanten` row in a single
    /// transaction. No existence check: every call adds two rows.
    ///
    /// Each row gets its own `bearbeitet` timestamp taken right before its insert.
    pub fn seed(conn: &mut Connection, data: &SeedData) -> Result<SeedReport, SeedPrepError> {
        let _tmr = timer!(Level::Debug; "Seeder::seed");

        let tx = conn.transaction()?;
        let mut rows_inserted = Self::insert_company(&tx, &data.company)?;
        rows_inserted += Self::insert_mandant(&tx, &data.mandant)?;
        tx.commit()?;

        let report = SeedReport {
            rows_inserted,
            company_rows: Database::count_rows(conn, COMPANY_TABLE)?,
            mandanten_rows: Database::count_rows(conn, MANDANTEN_TABLE)?,
        };

        debug!(
            "Seeded {} row(s); {} now holds {} row(s), {} holds {} row(s)",
            report.rows_inserted,
            COMPANY_TABLE,
            report.company_rows,
            MANDANTEN_TABLE,
            report.mandanten_rows
        );

        Ok(report)
    }

    /// Opens the database file, seeds it and closes the connection again.
    pub fn seed_file(database: &Database, data: &SeedData) -> Result<SeedReport, SeedPrepError> {
        let missing = database.missing_tables(&SEED_TABLES)?;
        if !missing.is_empty() {
            warn!(
                "'{}' lacks table(s) {}; the app may not have finished creating its schema",
                database.path().display(),
                missing.join(", ")
            );
        }

        let mut conn = database.connect()?;
        debug!(
            "Seeding mandant '{}' ({})",
            data.mandant.id, data.mandant.verwaltungsart
        );
        let report = Self::seed(&mut conn, data)?;
        conn.close().map_err(|(_, e)| SeedPrepError::DatabaseError(e))?;
        Ok(report)
    }

    fn insert_company(tx: &Transaction, company: &CompanyData) -> Result<usize, SeedPrepError> {
        let rows = tx.execute(
            INSERT_COMPANY_SQL,
            params![
                company.unternehmensname,
                company.zusatz,
                company.adresszeile1,
                company.plz,
                company.ort,
                company.direktor_titel,
                company.direktor_name,
                Utils::iso_timestamp_now(),
            ],
        )?;
        Ok(rows)
    }

    fn insert_mandant(tx: &Transaction, mandant: &Mandant) -> Result<usize, SeedPrepError> {
        let rows = tx.execute(
            INSERT_MANDANT_SQL,
            params![
                mandant.id,
                mandant.mandant_name,
                mandant.adresszeile1,
                mandant.plz,
                mandant.ort,
                mandant.verwaltungsart.as_str(),
                mandant.wirtschaftsjahr_beginn,
                mandant.wirtschaftsjahr_ende,
                mandant.aktuelles_wirtschaftsjahr,
                mandant.summe_offener_posten,
                Utils::iso_timestamp_now(),
            ],
        )?;
        Ok(rows)
    }
}

/// A stand-in for the two tables the desktop app creates on first start.
#[cfg(test)]
pub(crate) const APP_TEST_SCHEMA: &str = r#"
CREATE TABLE company_data (
    unternehmensname TEXT NOT NULL,
    zusatz TEXT,
    adresszeile1 TEXT NOT NULL,
    adresszeile2 TEXT,
    plz TEXT NOT NULL,
    ort TEXT NOT NULL,
    steuernummer TEXT,
    umsatzsteuerId TEXT,
    direktorTitel TEXT,
    direktorName TEXT,
    bearbeitet TEXT NOT NULL
);

CREATE TABLE mandanten (
    id TEXT NOT NULL,
    mandantName TEXT NOT NULL,
    zusatz TEXT,
    adresszeile1 TEXT,
    adresszeile2 TEXT,
    plz TEXT NOT NULL,
    ort TEXT NOT NULL,
    verwaltungsart TEXT NOT NULL,
    wirtschaftsjahrBeginn TEXT NOT NULL,
    wirtschaftsjahrEnde TEXT NOT NULL,
    aktuellesWirtschaftsjahr TEXT,
    summeOffenerPosten REAL,
    bearbeitet TEXT NOT NULL
);
"#;
