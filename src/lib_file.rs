#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Disk pressure: one file grown toward the ramp target with synced writes.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cleanup;
use crate::domain::{ResourceKind, Tuning, MIB};
use crate::error::{Error, Result};
use crate::ramp::RampSchedule;
use crate::service::WorkerSet;
use crate::status::{report, EventSender, StatusEvent};

/// How the file's storage gets back to the filesystem if we never reach
/// [`crate::service::Controller::cleanup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reclaim {
    /// The directory entry was removed right after creation; the open handle
    /// is the only reference left.
    Unlinked,
    /// A detached helper process removes the path after a delay.
    Helper { pid: u32 },
}

#[derive(Debug)]
pub struct GrowthFile {
    file: File,
    path: PathBuf,
    reclaim: Reclaim,
}

impl GrowthFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reclaim(&self) -> Reclaim {
        self.reclaim
    }
}

/// Creates the file and arranges for its storage to be reclaimed.
///
/// On Unix the path is unlinked immediately unless `visible` is set. Otherwise
/// a detached helper is scheduled to delete it after `helper_delay`.
pub fn create_file(path: &Path, visible: bool, helper_delay: Duration) -> Result<GrowthFile> {
    let file = File::create(path).map_err(|source| Error::FileCreate {
        path: path.to_path_buf(),
        source,
    })?;
    let reclaim = if cfg!(unix) && !visible {
        remove_path(path)?;
        Reclaim::Unlinked
    } else {
        match cleanup::spawn_detached(path, helper_delay) {
            Ok(pid) => Reclaim::Helper { pid },
            Err(e) => {
                drop(file);
                if let Err(rm) = remove_path(path) {
                    warn!(error = %rm, "could not remove file after helper failure");
                }
                return Err(e);
            }
        }
    };
    info!(path = %path.display(), ?reclaim, "created growth file");
    Ok(GrowthFile {
        file,
        path: path.to_path_buf(),
        reclaim,
    })
}

/// Removes `path`. A path that is already gone counts as success; the return
/// value tells whether anything was actually removed.
pub fn remove_path(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::FileRemove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[allow(clippy::cast_possible_truncation)]
pub fn pattern_buffer(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

pub fn spawn_file(
    set: &mut WorkerSet,
    target: GrowthFile,
    configured_mb: u64,
    ramp: RampSchedule,
    token: &CancellationToken,
    tuning: &Tuning,
    events: &EventSender,
) {
    let token = token.clone();
    let events = events.clone();
    let tuning = tuning.clone();
    set.spawn(async move {
        report(&events, StatusEvent::WorkerStarted(ResourceKind::File));
        let GrowthFile { file, path, .. } = target;
        let mut file = tokio::fs::File::from_std(file);
        let result = grow_file(
            &mut file,
            &path,
            configured_mb,
            ramp,
            &token,
            &tuning,
            &events,
        )
        .await;
        drop(file);
        let result = match result {
            Ok(written) => {
                info!(written_mb = written / MIB, "file actuator stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "file actuator failed");
                report(&events, StatusEvent::ActuatorFailed(ResourceKind::File));
                Err(e)
            }
        };
        report(&events, StatusEvent::WorkerExited(ResourceKind::File));
        (ResourceKind::File, result)
    });
    info!(target_mb = configured_mb, "file actuator started");
}

/// Appends to `file` until cancelled, never past the ramp target and never
/// more than `file_chunk_cap` bytes per tick. Each batch is flushed and
/// synced. Returns the number of bytes written.
#[allow(clippy::too_many_arguments)]
pub async fn grow_file(
    file: &mut tokio::fs::File,
    path: &Path,
    configured_mb: u64,
    ramp: RampSchedule,
    token: &CancellationToken,
    tuning: &Tuning,
    events: &EventSender,
) -> Result<u64> {
    let buffer = pattern_buffer(tuning.write_buffer.max(1));
    let write_err = |source| Error::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut written = 0u64;
    let mut announced = None;
    let mut ticker = interval(tuning.file_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let target_mb = ramp.target_mb(configured_mb);
        if announced != Some(target_mb) {
            announced = Some(target_mb);
            report(events, StatusEvent::FileTarget(target_mb));
        }
        let goal = target_mb.saturating_mul(MIB);
        if written >= goal {
            continue;
        }
        let mut budget = (goal - written).min(tuning.file_chunk_cap.max(1));
        while budget > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let n = budget.min(buffer.len() as u64) as usize;
            file.write_all(&buffer[..n]).await.map_err(write_err)?;
            written += n as u64;
            budget -= n as u64;
        }
        file.flush().await.map_err(write_err)?;
        file.sync_data().await.map_err(|source| Error::FileSync {
            path: path.to_path_buf(),
            source,
        })?;
        report(events, StatusEvent::FileWritten { bytes: written });
    }
    Ok(written)
}
