#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Fan-in of worker progress into periodic [`ResourceStatus`] snapshots.
//!
//! Workers never share counters. They push [`StatusEvent`]s into one
//! unbounded channel and a single aggregator task folds them, so the hot
//! paths never contend on a lock.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::domain::{ResourceKind, ResourceStatus, MIB};
use crate::metrics::Metrics;
use crate::ramp::RampSchedule;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StatusEvent {
    WorkerStarted(ResourceKind),
    WorkerExited(ResourceKind),
    CpuDuty { core: usize, percent: f64 },
    MemoryAssigned(u64),
    MemoryGrown { mb: u64 },
    MemoryReleased { mb: u64 },
    FileTarget(u64),
    FileWritten { bytes: u64 },
    ActuatorFailed(ResourceKind),
}

pub type EventSender = mpsc::UnboundedSender<StatusEvent>;

/// Sends an event, ignoring a closed aggregator. Reporting never blocks or
/// fails a worker.
pub fn report(tx: &EventSender, event: StatusEvent) {
    if tx.send(event).is_err() {
        debug!(?event, "status aggregator gone");
    }
}

#[derive(Debug, Default)]
struct Tally {
    cpu: HashMap<usize, f64>,
    memory_target_mb: u64,
    memory_actual_mb: u64,
    file_target_mb: u64,
    file_bytes: u64,
    workers: u64,
}

impl Tally {
    fn apply(&mut self, event: StatusEvent, metrics: &Metrics) {
        match event {
            StatusEvent::WorkerStarted(_) => self.workers += 1,
            StatusEvent::WorkerExited(kind) => {
                self.workers = self.workers.saturating_sub(1);
                if kind == ResourceKind::Cpu {
                    // the exited core no longer contributes
                    self.cpu.clear();
                }
            }
            StatusEvent::CpuDuty { core, percent } => {
                self.cpu.insert(core, percent);
            }
            StatusEvent::MemoryAssigned(mb) => self.memory_target_mb = mb,
            StatusEvent::MemoryGrown { mb } => self.memory_actual_mb += mb,
            StatusEvent::MemoryReleased { mb } => {
                self.memory_actual_mb = self.memory_actual_mb.saturating_sub(mb);
            }
            StatusEvent::FileTarget(mb) => self.file_target_mb = mb,
            StatusEvent::FileWritten { bytes } => self.file_bytes = self.file_bytes.max(bytes),
            StatusEvent::ActuatorFailed(kind) => {
                warn!(resource = %kind, "actuator reported failure");
                metrics.actuator_failures_total.inc();
            }
        }
    }

    fn snapshot(&self, ramp: &RampSchedule) -> ResourceStatus {
        #[allow(clippy::cast_precision_loss)]
        let cpu_percent_actual = if self.cpu.is_empty() {
            0.0
        } else {
            self.cpu.values().sum::<f64>() / self.cpu.len() as f64
        };
        ResourceStatus {
            cpu_percent_actual,
            memory_target_mb: self.memory_target_mb,
            memory_actual_mb: self.memory_actual_mb,
            file_target_mb: self.file_target_mb,
            file_actual_mb: self.file_bytes / MIB,
            workers: self.workers,
            elapsed: ramp.elapsed(),
            progress: ramp.progress(),
        }
    }
}

/// Runs until every [`EventSender`] is dropped, publishing a snapshot on each
/// tick of `every` and a final one once the channel drains.
pub async fn aggregate(
    mut rx: mpsc::UnboundedReceiver<StatusEvent>,
    publish: watch::Sender<ResourceStatus>,
    ramp: RampSchedule,
    every: Duration,
    metrics: Metrics,
) {
    let mut tally = Tally::default();
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => tally.apply(event, &metrics),
                None => break,
            },
            _ = ticker.tick() => {
                let status = tally.snapshot(&ramp);
                metrics.observe(&status);
                publish.send_replace(status);
            }
        }
    }
    let status = tally.snapshot(&ramp);
    metrics.observe(&status);
    publish.send_replace(status);
    debug!("status aggregator finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn folds_events_into_final_snapshot() {
        let metrics = Metrics::new().expect("metrics");
        let (tx, rx) = mpsc::unbounded_channel();
        let (publish, watch_rx) = watch::channel(ResourceStatus::default());
        let ramp = RampSchedule::new(Instant::now(), Duration::ZERO);
        let task = tokio::spawn(aggregate(
            rx,
            publish,
            ramp,
            Duration::from_secs(60),
            metrics.clone(),
        ));

        report(&tx, StatusEvent::WorkerStarted(ResourceKind::Memory));
        report(&tx, StatusEvent::MemoryAssigned(3));
        for _ in 0..3 {
            report(&tx, StatusEvent::MemoryGrown { mb: 1 });
        }
        report(&tx, StatusEvent::CpuDuty { core: 0, percent: 20.0 });
        report(&tx, StatusEvent::CpuDuty { core: 1, percent: 40.0 });
        report(&tx, StatusEvent::FileTarget(2));
        report(&tx, StatusEvent::FileWritten { bytes: 2 * MIB });
        report(&tx, StatusEvent::ActuatorFailed(ResourceKind::File));
        drop(tx);
        task.await.expect("aggregator");

        let status = watch_rx.borrow().clone();
        assert_eq!(status.memory_target_mb, 3);
        assert_eq!(status.memory_actual_mb, 3);
        assert_eq!(status.file_target_mb, 2);
        assert_eq!(status.file_actual_mb, 2);
        assert_eq!(status.workers, 1);
        assert!((status.cpu_percent_actual - 30.0).abs() < 1e-9);
        assert_eq!(metrics.actuator_failures_total.get(), 1);
        assert_eq!(metrics.memory_actual_mb.get(), 3);
    }
}
