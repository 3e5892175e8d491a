use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::error::SeedPrepError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Shell command line, run through `sh -c` (or `cmd /C` on Windows)
    pub command: String,
    pub working_dir: Option<PathBuf>,
}

/// The desktop app's development process.
///
/// Stdio is inherited, so the app's output goes straight to the terminal.
/// Call [`AppProcess::wait`] to block until it exits. A handle dropped without
/// waiting (e.g. on an error path) kills and reaps the child. On Linux the
/// processes the shell started (`pnpm`, `cargo`, the dev server) are sent
/// SIGTERM first.
///
/// The child stays in our process group so Ctrl-C in the terminal reaches the
/// whole tree and the dev server can keep reading from the terminal.
pub struct AppProcess {
    command: String,
    child: Option<Child>,
}

impl AppProcess {
    pub fn spawn(settings: &LaunchSettings) -> Result<Self, SeedPrepError> {
        let mut cmd = Self::shell_command(&settings.command);

        if let Some(dir) = &settings.working_dir {
            // De-UNC so the app's tooling doesn't see \\?\ prefixes on Windows
            let dir = dunce::canonicalize(dir).map_err(|source| SeedPrepError::LaunchError {
                command: format!("{} (in '{}')", settings.command, dir.display()),
                source,
            })?;
            debug!("Launching in '{}'", dir.display());
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|source| SeedPrepError::LaunchError {
            command: settings.command.clone(),
            source,
        })?;

        info!("Started '{}' (pid {})", settings.command, child.id());

        Ok(AppProcess {
            command: settings.command.clone(),
            child: Some(child),
        })
    }

    #[cfg(windows)]
    fn shell_command(command_line: &str) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    }

    #[cfg(not(windows))]
    fn shell_command(command_line: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Exit status if the process has already exited, without blocking.
    pub fn try_exited(&mut self) -> Result<Option<ExitStatus>, SeedPrepError> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    /// Blocks until the process exits.
    pub fn wait(mut self) -> Result<ExitStatus, SeedPrepError> {
        let mut child = self.child.take().ok_or_else(|| {
            SeedPrepError::Error(format!("'{}' was already reaped", self.command))
        })?;

        let status = child.wait()?;
        info!("'{}' exited with {}", self.command, status);
        Ok(status)
    }
}

impl Drop for AppProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                warn!("Stopping '{}' (pid {})", self.command, child.id());
                terminate_descendants(child.id());
                if let Err(e) = child.kill() {
                    warn!("Failed to stop '{}': {}", self.command, e);
                }
            }
            let _ = child.wait();
        }
    }
}

#[cfg(target_os = "linux")]
fn terminate_descendants(root: u32) {
    for pid in descendants(root) {
        // SAFETY: kill(2) takes plain integers and touches no memory of ours
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            debug!("Sent SIGTERM to pid {}", pid);
        } else {
            debug!("SIGTERM to pid {} failed: {}", pid, std::io::Error::last_os_error());
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn terminate_descendants(_root: u32) {}

/// Every live process below `root`, parents before children.
#[cfg(target_os = "linux")]
fn descendants(root: u32) -> Vec<u32> {
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list /proc: {}", e);
            return Vec::new();
        }
    };

    let mut parent_of = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
            continue;
        };
        // Processes can vanish between listing and reading
        if let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) {
            if let Some(ppid) = parent_pid(&stat) {
                parent_of.push((pid, ppid));
            }
        }
    }

    let mut found = Vec::new();
    let mut next = 0;
    let mut parent = root;
    loop {
        for &(pid, ppid) in &parent_of {
            if ppid == parent && pid != root && !found.contains(&pid) {
                found.push(pid);
            }
        }
        match found.get(next) {
            Some(&pid) => parent = pid,
            None => break,
        }
        next += 1;
    }
    found
}

/// Parent pid from a `/proc/<pid>/stat` line. The command name sits in
/// parentheses and may itself contain spaces or parentheses.
#[cfg(target_os = "linux")]
fn parent_pid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn settings(command: &str) -> LaunchSettings {
        LaunchSettings {
            command: command.to_owned(),
            working_dir: None,
        }
    }

    #[test]
    #[serial]
    fn test_wait_returns_exit_status() {
        let process = AppProcess::spawn(&settings("exit 3")).unwrap();
        assert!(process.id().is_some());

        let status = process.wait().unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    #[serial]
    fn test_try_exited_sees_finished_process() {
        let mut process = AppProcess::spawn(&settings("exit 0")).unwrap();

        let start = Instant::now();
        let status = loop {
            if let Some(status) = process.try_exited().unwrap() {
                break status;
            }
            assert!(start.elapsed() < Duration::from_secs(10), "process never exited");
            std::thread::sleep(Duration::from_millis(20));
        };
        assert!(status.success());
    }

    #[test]
    #[serial]
    fn test_missing_working_dir_is_launch_error() {
        let dir = TempDir::new().unwrap();
        let launch = LaunchSettings {
            command: "exit 0".to_owned(),
            working_dir: Some(dir.path().join("missing")),
        };

        let result = AppProcess::spawn(&launch);
        assert!(matches!(result, Err(SeedPrepError::LaunchError { .. })));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_runs_in_working_dir() {
        let dir = TempDir::new().unwrap();
        let launch = LaunchSettings {
            command: "touch marker".to_owned(),
            working_dir: Some(dir.path().to_path_buf()),
        };

        let status = AppProcess::spawn(&launch).unwrap().wait().unwrap();
        assert!(status.success());
        assert!(dir.path().join("marker").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn test_drop_kills_running_process() {
        let process = AppProcess::spawn(&settings("sleep 30")).unwrap();
        let pid = process.id().unwrap();
        let proc_entry = PathBuf::from(format!("/proc/{}", pid));
        assert!(proc_entry.exists());

        let start = Instant::now();
        drop(process);

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!proc_entry.exists(), "pid {} still present after drop", pid);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parent_pid_from_stat() {
        assert_eq!(parent_pid("42 (sh) S 7 42 42 0 -1"), Some(7));
        assert_eq!(parent_pid("43 (node (vite) x) R 42 42 42 0 -1"), Some(42));
        assert_eq!(parent_pid("garbage"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn test_drop_stops_processes_started_by_the_shell() {
        let dir = TempDir::new().unwrap();
        let launch = LaunchSettings {
            command: "sleep 30 & echo $! > bg.pid; wait".to_owned(),
            working_dir: Some(dir.path().to_path_buf()),
        };
        let process = AppProcess::spawn(&launch).unwrap();

        let pid_file = dir.path().join("bg.pid");
        let start = Instant::now();
        let background: u32 = loop {
            let parsed = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|text| text.trim().parse().ok());
            if let Some(pid) = parsed {
                break pid;
            }
            assert!(start.elapsed() < Duration::from_secs(10), "shell never started sleep");
            std::thread::sleep(Duration::from_millis(20));
        };
        assert!(descendants(process.id().unwrap()).contains(&background));

        drop(process);

        // Gone, or a zombie waiting for its new parent to reap it
        let stat_path = PathBuf::from(format!("/proc/{}/stat", background));
        let start = Instant::now();
        loop {
            let state = std::fs::read_to_string(&stat_path)
                .ok()
                .and_then(|stat| {
                    let rest = &stat[stat.rfind(')')? + 1..];
                    rest.split_whitespace().next().map(str::to_owned)
                });
            match state.as_deref() {
                None | Some("Z") | Some("X") => break,
                Some(_) => {
                    assert!(
                        start.elapsed() < Duration::from_secs(5),
                        "background pid {} survived the drop",
                        background
                    );
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        }
    }
}
