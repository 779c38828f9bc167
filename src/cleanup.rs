#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Detached helper that deletes the grown file after a delay.
//!
//! The helper is this same executable re-invoked with [`CLEANUP_FILE_ARG`]
//! and [`CLEANUP_DELAY_ARG`]. It does not depend on the parent staying
//! alive, so the file goes away even if the main process is killed.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::lib_file::remove_path;

pub const CLEANUP_FILE_ARG: &str = "--cleanup-file";
pub const CLEANUP_DELAY_ARG: &str = "--cleanup-delay";

pub fn helper_command(exe: &Path, path: &Path, delay: Duration) -> Command {
    let mut cmd = Command::new(exe);
    cmd.arg(CLEANUP_FILE_ARG)
        .arg(path)
        .arg(CLEANUP_DELAY_ARG)
        .arg(humantime::format_duration(delay).to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        // out of the terminal's process group so ^C does not reach it
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// Launches the helper and returns its pid. The child is never waited on.
pub fn spawn_detached(path: &Path, delay: Duration) -> Result<u32> {
    let exe = std::env::current_exe().map_err(Error::Helper)?;
    let child = helper_command(&exe, path, delay)
        .spawn()
        .map_err(Error::Helper)?;
    let pid = child.id();
    info!(
        pid,
        path = %path.display(),
        delay = %humantime::format_duration(delay),
        "cleanup helper launched"
    );
    Ok(pid)
}

/// Body of the helper process.
pub async fn run_helper(path: &Path, delay: Duration) {
    tokio::time::sleep(delay).await;
    match remove_path(path) {
        Ok(true) => info!(path = %path.display(), "cleanup helper removed file"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "cleanup helper failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn command_carries_path_and_delay() {
        let cmd = helper_command(
            Path::new("/usr/bin/outage-mock"),
            Path::new("/tmp/grow"),
            Duration::from_secs(35),
        );
        assert_eq!(cmd.get_program(), OsStr::new("/usr/bin/outage-mock"));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            [
                OsStr::new(CLEANUP_FILE_ARG),
                OsStr::new("/tmp/grow"),
                OsStr::new(CLEANUP_DELAY_ARG),
                OsStr::new("35s"),
            ]
        );
    }

    #[tokio::test]
    async fn helper_removes_file_after_delay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grow");
        std::fs::write(&path, b"data").expect("write");
        run_helper(&path, Duration::from_millis(10)).await;
        assert!(!path.exists());
        // second run finds nothing and stays quiet
        run_helper(&path, Duration::ZERO).await;
    }
}
