#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{ResourceKind, Tuning};
use crate::ramp::RampSchedule;
use crate::service::WorkerSet;
use crate::status::{report, EventSender, StatusEvent};

const BURN_ROUNDS: u64 = 10_000;

/// Busy and idle parts of one duty cycle for `percent`.
///
/// With a 20ms cycle, 30% is 6ms of work and 14ms of sleep. At 100% the
/// sleep is zero.
pub fn duty_split(percent: f64, cycle: Duration) -> (Duration, Duration) {
    let share = percent.clamp(0.0, 100.0) / 100.0;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let work = Duration::from_nanos((cycle.as_nanos() as f64 * share).round() as u64);
    (work, cycle.saturating_sub(work))
}

/// Spawns one blocking worker per core.
pub fn spawn_cpu(
    set: &mut WorkerSet,
    configured: f64,
    ramp: RampSchedule,
    token: &CancellationToken,
    tuning: &Tuning,
    events: &EventSender,
) {
    let cores = tuning.cores.max(1);
    for core in 0..cores {
        let token = token.clone();
        let events = events.clone();
        let (cycle, refresh) = (tuning.cpu_cycle, tuning.cpu_refresh);
        set.spawn_blocking(move || {
            let spent = cpu_worker(core, configured, ramp, &token, cycle, refresh, &events);
            debug!(core, spent, "cpu worker stopped");
            (ResourceKind::Cpu, Ok(()))
        });
    }
    info!(cores, target_percent = configured, "cpu actuator started");
}

#[allow(clippy::too_many_arguments)]
fn cpu_worker(
    core: usize,
    configured: f64,
    ramp: RampSchedule,
    token: &CancellationToken,
    cycle: Duration,
    refresh: Duration,
    events: &EventSender,
) -> u64 {
    report(events, StatusEvent::WorkerStarted(ResourceKind::Cpu));
    let mut percent = ramp.target_percent(configured);
    report(events, StatusEvent::CpuDuty { core, percent });
    let mut refreshed = Instant::now();
    let mut acc = 0u64;
    while !token.is_cancelled() {
        if refreshed.elapsed() >= refresh {
            refreshed = Instant::now();
            let next = ramp.target_percent(configured);
            if (next - percent).abs() > f64::EPSILON {
                percent = next;
                report(events, StatusEvent::CpuDuty { core, percent });
                if core == 0 {
                    debug!(percent, "cpu duty updated");
                }
            }
        }
        let (work, rest) = duty_split(percent, cycle);
        let started = Instant::now();
        while started.elapsed() < work {
            acc = burn(acc);
        }
        if !rest.is_zero() {
            std::thread::sleep(rest);
        }
    }
    report(events, StatusEvent::WorkerExited(ResourceKind::Cpu));
    acc
}

fn burn(mut acc: u64) -> u64 {
    for i in 0..BURN_ROUNDS {
        acc = acc.wrapping_mul(31).wrapping_add(i ^ acc.rotate_left(7));
    }
    std::hint::black_box(acc)
}
