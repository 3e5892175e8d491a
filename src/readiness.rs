use log::{debug, Level};
use logging_timer::timer;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ReadinessConfig;
use crate::error::SeedPrepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }
}

impl From<&ReadinessConfig> for PollSettings {
    fn from(config: &ReadinessConfig) -> Self {
        let timeout = match config.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        PollSettings::new(Duration::from_millis(config.interval_ms), timeout)
    }
}

/// Blocks until `path` exists as a file, checking once per interval.
///
/// `on_miss` runs after every unsuccessful check with the attempt number and
/// the time waited so far. Returning an error from it ends the wait with that
/// error. Success returns the total time waited.
pub fn wait_for_file<F>(
    path: &Path,
    settings: &PollSettings,
    on_miss: F,
) -> Result<Duration, SeedPrepError>
where
    F: FnMut(u32, Duration) -> Result<(), SeedPrepError>,
{
    wait_until(path, settings, || path.is_file(), on_miss)
}

/// Blocks until `is_ready` holds, checking once per interval. `path` names
/// what is being waited for in logs and in the timeout error.
///
/// Every unsuccessful check is reported to `on_miss`, including the one that
/// hits the deadline.
pub fn wait_until<R, F>(
    path: &Path,
    settings: &PollSettings,
    mut is_ready: R,
    mut on_miss: F,
) -> Result<Duration, SeedPrepError>
where
    R: FnMut() -> bool,
    F: FnMut(u32, Duration) -> Result<(), SeedPrepError>,
{
    let _tmr = timer!(Level::Debug; "wait_until", "{}", path.display());
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if is_ready() {
            let waited = start.elapsed();
            debug!(
                "'{}' ready after {} check(s), {:?}",
                path.display(),
                attempt + 1,
                waited
            );
            return Ok(waited);
        }

        attempt += 1;
        let waited = start.elapsed();

        on_miss(attempt, waited)?;

        let mut sleep_for = settings.interval;
        if let Some(timeout) = settings.timeout {
            if waited >= timeout {
                return Err(SeedPrepError::ReadinessTimeout {
                    path: path.to_path_buf(),
                    waited,
                });
            }
            // Make the last check land on the deadline rather than past it
            sleep_for = sleep_for.min(timeout - waited);
        }

        thread::sleep(sleep_for);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const INTERVAL: Duration = Duration::from_millis(50);

    #[test]
    fn test_existing_file_returns_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("company.db");
        fs::write(&path, b"").unwrap();

        let mut misses = 0;
        let waited = wait_for_file(&path, &PollSettings::new(INTERVAL, None), |_, _| {
            misses += 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(misses, 0);
        assert!(waited < INTERVAL);
    }

    #[test]
    fn test_waits_until_file_appears() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("company.db");
        let delay = Duration::from_millis(300);

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(delay);
            fs::write(&writer_path, b"").unwrap();
        });

        let mut misses = 0;
        let settings = PollSettings::new(INTERVAL, Some(Duration::from_secs(10)));
        let waited = wait_for_file(&path, &settings, |attempt, _| {
            misses = attempt;
            Ok(())
        })
        .unwrap();
        writer.join().unwrap();

        assert!(path.exists());
        assert!(waited >= delay, "returned before the file existed: {:?}", waited);
        // One interval of slack, plus scheduling noise
        assert!(
            waited < delay + INTERVAL + Duration::from_millis(250),
            "took too long: {:?}",
            waited
        );
        assert!(misses >= 1);
    }

    #[test]
    fn test_times_out_when_file_never_appears() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("company.db");
        let timeout = Duration::from_millis(200);

        let start = Instant::now();
        let result = wait_for_file(&path, &PollSettings::new(INTERVAL, Some(timeout)), |_, _| Ok(()));
        let elapsed = start.elapsed();

        match result {
            Err(SeedPrepError::ReadinessTimeout { path: p, waited }) => {
                assert_eq!(p, path);
                assert!(waited >= timeout);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(elapsed < timeout + Duration::from_secs(1));
    }

    #[test]
    fn test_deadline_miss_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("company.db");
        let timeout = Duration::from_millis(120);

        let mut last_miss = None;
        let result = wait_for_file(&path, &PollSettings::new(INTERVAL, Some(timeout)), |attempt, waited| {
            last_miss = Some((attempt, waited));
            Ok(())
        });

        let waited = match result {
            Err(SeedPrepError::ReadinessTimeout { waited, .. }) => waited,
            other => panic!("expected timeout, got {:?}", other),
        };
        let (_, last_waited) = last_miss.expect("no miss was reported");
        // The check that ran into the deadline was reported too
        assert_eq!(last_waited, waited);
        assert!(last_waited >= timeout);
    }

    #[test]
    fn test_wait_until_custom_condition() {
        let dir = TempDir::new().unwrap();
        let mut checks = 0;

        let waited = wait_until(
            dir.path(),
            &PollSettings::new(Duration::from_millis(10), Some(Duration::from_secs(5))),
            || {
                checks += 1;
                checks == 3
            },
            |_, _| Ok(()),
        )
        .unwrap();

        assert_eq!(checks, 3);
        assert!(waited >= Duration::from_millis(20));
    }

    #[test]
    fn test_observer_error_aborts_wait() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("company.db");

        let result = wait_for_file(&path, &PollSettings::new(INTERVAL, None), |attempt, _| {
            if attempt == 3 {
                Err(SeedPrepError::Error("gave up".into()))
            } else {
                Ok(())
            }
        });

        assert!(matches!(result, Err(SeedPrepError::Error(msg)) if msg == "gave up"));
    }

    #[test]
    fn test_directory_does_not_count_as_ready() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("company.db");
        fs::create_dir(&path).unwrap();

        let result = wait_for_file(
            &path,
            &PollSettings::new(INTERVAL, Some(Duration::from_millis(120))),
            |_, _| Ok(()),
        );
        assert!(matches!(result, Err(SeedPrepError::ReadinessTimeout { .. })));
    }

    #[test]
    fn test_poll_settings_from_config() {
        let config = ReadinessConfig {
            interval_ms: 250,
            timeout_secs: 0,
        };
        let settings = PollSettings::from(&config);
        assert_eq!(settings.interval, Duration::from_millis(250));
        assert_eq!(settings.timeout, None);

        let config = ReadinessConfig {
            interval_ms: 1000,
            timeout_secs: 30,
        };
        assert_eq!(
            PollSettings::from(&config).timeout,
            Some(Duration::from_secs(30))
        );
    }
}
