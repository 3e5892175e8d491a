use chrono::{DateTime, Local};
#[cfg(test)]
use chrono::NaiveDateTime;
use std::time::Duration;

/// Local time with microsecond precision and no offset, e.g. `2025-03-14T09:26:53.589793`.
/// This is the format the desktop app writes into `bearbeitet` columns.
pub const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub struct Utils {}

impl Utils {
    pub fn iso_timestamp(date_time: &DateTime<Local>) -> String {
        date_time.format(ISO_TIMESTAMP_FORMAT).to_string()
    }

    pub fn iso_timestamp_now() -> String {
        Self::iso_timestamp(&Local::now())
    }

    #[cfg(test)]
    pub fn parse_iso_timestamp(value: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value, ISO_TIMESTAMP_FORMAT).ok()
    }

    /// Formats a duration as a compact human readable string ("42s", "3m 07s", "1h 02m 09s").
    pub fn format_elapsed(elapsed: Duration) -> String {
        let total_secs = elapsed.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {:02}m {:02}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {:02}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}
