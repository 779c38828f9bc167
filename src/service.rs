#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{Config, ResourceKind, ResourceStatus, Tuning};
use crate::error::{Error, Result};
use crate::lib_cpu::spawn_cpu;
use crate::lib_file::{create_file, remove_path, spawn_file, Reclaim};
use crate::lib_mem::spawn_memory;
use crate::metrics::Metrics;
use crate::ramp::RampSchedule;
use crate::status::{self, report, StatusEvent};

/// Every spawned worker, tagged with the resource it drives.
pub type WorkerSet = JoinSet<(ResourceKind, Result<()>)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Stopping,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Expired,
    Requested,
}

struct Inner {
    phase: Phase,
    started_at: Option<DateTime<Utc>>,
    launched: Vec<ResourceKind>,
    workers: WorkerSet,
    publish: Option<watch::Sender<ResourceStatus>>,
    aggregator: Option<JoinHandle<()>>,
    expiry: Option<JoinHandle<()>>,
    visible_file: Option<PathBuf>,
}

/// Owns the run: starts the actuators, carries the shared cancellation token
/// and releases everything exactly once.
///
/// [`Controller::start`] spawns onto the ambient tokio runtime and must be
/// called from within it.
pub struct Controller {
    config: Arc<Config>,
    tuning: Tuning,
    metrics: Metrics,
    token: CancellationToken,
    stop_requested: AtomicBool,
    status: watch::Receiver<ResourceStatus>,
    inner: Mutex<Inner>,
    cleaned: OnceCell<()>,
}

impl Controller {
    pub fn new(config: Config, tuning: Tuning, metrics: Metrics) -> Self {
        let (publish, status) = watch::channel(ResourceStatus::default());
        Self {
            config: Arc::new(config),
            tuning,
            metrics,
            token: CancellationToken::new(),
            stop_requested: AtomicBool::new(false),
            status,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                started_at: None,
                launched: Vec::new(),
                workers: JoinSet::new(),
                publish: Some(publish),
                aggregator: None,
                expiry: None,
                visible_file: None,
            }),
            cleaned: OnceCell::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Launches every actuator with a non-zero target and arms the duration
    /// timer. Returns the resources that were actually started.
    ///
    /// A file that cannot be created only disables the file actuator; it is
    /// fatal only when nothing else was started.
    pub fn start(&self) -> Result<Vec<ResourceKind>> {
        let mut inner = self.inner.lock();
        if inner.phase != Phase::Idle {
            return Err(Error::AlreadyStarted);
        }
        let cfg = Arc::clone(&self.config);
        let ramp = RampSchedule::new(Instant::now(), cfg.rampup);
        let (events, rx) = mpsc::unbounded_channel();
        if let Some(publish) = inner.publish.take() {
            inner.aggregator = Some(tokio::spawn(status::aggregate(
                rx,
                publish,
                ramp,
                self.tuning.status_interval,
                self.metrics.clone(),
            )));
        }

        let mut launched = Vec::new();
        if cfg.enabled(ResourceKind::Cpu) {
            spawn_cpu(
                &mut inner.workers,
                cfg.cpu_percent,
                ramp,
                &self.token,
                &self.tuning,
                &events,
            );
            launched.push(ResourceKind::Cpu);
        }
        if cfg.enabled(ResourceKind::Memory) {
            spawn_memory(
                &mut inner.workers,
                cfg.memory_mb,
                ramp,
                &self.token,
                &self.tuning,
                &events,
            );
            launched.push(ResourceKind::Memory);
        }
        let mut file_failed = false;
        if cfg.enabled(ResourceKind::File) {
            let helper_delay = cfg.duration.saturating_add(self.tuning.helper_margin);
            match create_file(&cfg.file_path, cfg.visible_file, helper_delay) {
                Ok(target) => {
                    if matches!(target.reclaim(), Reclaim::Helper { .. }) {
                        inner.visible_file = Some(target.path().to_path_buf());
                    }
                    spawn_file(
                        &mut inner.workers,
                        target,
                        cfg.file_size_mb,
                        ramp,
                        &self.token,
                        &self.tuning,
                        &events,
                    );
                    launched.push(ResourceKind::File);
                }
                Err(e) => {
                    error!(error = %e, "file actuator not started");
                    report(&events, StatusEvent::ActuatorFailed(ResourceKind::File));
                    file_failed = true;
                }
            }
        }
        drop(events);

        let token = self.token.clone();
        let duration = cfg.duration;
        inner.expiry = Some(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(duration) => {
                    info!(duration = %humantime::format_duration(duration), "duration elapsed");
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        }));

        inner.phase = Phase::Running;
        inner.started_at = Some(Utc::now());
        inner.launched.clone_from(&launched);
        self.metrics.running.set(1);
        info!(?launched, "controller running");

        if file_failed && launched.is_empty() {
            return Err(Error::NothingToRun);
        }
        Ok(launched)
    }

    /// Requests shutdown. Safe to call any number of times, before or after
    /// the duration elapses.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            self.stop_requested.store(true, Ordering::SeqCst);
            info!("stop requested");
        }
        self.token.cancel();
    }

    /// Resolves once the run is over, whichever way it ended.
    pub async fn wait(&self) -> StopReason {
        self.token.cancelled().await;
        self.stop_reason()
    }

    pub fn stop_reason(&self) -> StopReason {
        if self.stop_requested.load(Ordering::SeqCst) {
            StopReason::Requested
        } else {
            StopReason::Expired
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn phase(&self) -> Phase {
        let phase = self.inner.lock().phase;
        if phase == Phase::Running && self.token.is_cancelled() {
            Phase::Stopping
        } else {
            phase
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().started_at
    }

    pub fn launched(&self) -> Vec<ResourceKind> {
        self.inner.lock().launched.clone()
    }

    /// Latest published snapshot.
    pub fn status(&self) -> ResourceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceStatus> {
        self.status.clone()
    }

    /// Cancels, waits for every worker to exit, then releases the file.
    /// Only the first call does anything; later calls wait for it.
    pub async fn cleanup(&self) {
        self.cleaned.get_or_init(|| self.release()).await;
    }

    async fn release(&self) {
        self.token.cancel();
        let (mut workers, aggregator, expiry, visible_file) = {
            let mut inner = self.inner.lock();
            (
                std::mem::take(&mut inner.workers),
                inner.aggregator.take(),
                inner.expiry.take(),
                inner.visible_file.take(),
            )
        };

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((kind, Ok(()))) => debug!(resource = %kind, "worker joined"),
                Ok((kind, Err(e))) => warn!(resource = %kind, error = %e, "worker ended with error"),
                Err(e) => error!(error = %e, "worker did not finish cleanly"),
            }
        }
        if let Some(expiry) = expiry {
            if let Err(e) = expiry.await {
                debug!(error = %e, "expiry timer");
            }
        }
        if let Some(aggregator) = aggregator {
            if let Err(e) = aggregator.await {
                warn!(error = %e, "status aggregator did not finish cleanly");
            }
        }
        if let Some(path) = visible_file {
            match remove_path(&path) {
                Ok(true) => info!(path = %path.display(), "removed growth file"),
                Ok(false) => debug!(path = %path.display(), "growth file already gone"),
                Err(e) => warn!(error = %e, "could not remove growth file"),
            }
        }

        self.metrics.running.set(0);
        self.inner.lock().phase = Phase::Terminated;
        info!(reason = ?self.stop_reason(), "cleanup complete");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        // blocking cpu workers only exit on cancellation
        self.token.cancel();
    }
}
