#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::time::Duration;

use outage_mock::domain::Tuning;
use outage_mock::lib_cpu::spawn_cpu;
use outage_mock::lib_mem::spawn_memory;
use outage_mock::service::WorkerSet;
use outage_mock::status::StatusEvent;
use outage_mock::RampSchedule;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

fn tuning() -> Tuning {
    Tuning {
        cores: 2,
        memory_workers_per_core: 2,
        memory_tick: Duration::from_millis(1),
        distribute_interval: Duration::from_millis(10),
        cpu_cycle: Duration::from_millis(5),
        cpu_refresh: Duration::from_millis(10),
        ..Tuning::default()
    }
}

async fn join_all(set: &mut WorkerSet, within: Duration) {
    timeout(within, async {
        while let Some(joined) = set.join_next().await {
            let (_, result) = joined.expect("join");
            result.expect("worker ok");
        }
    })
    .await
    .expect("workers exit after cancellation");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn memory_reaches_target_and_releases() {
    let tuning = tuning();
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut set = WorkerSet::new();
    let ramp = RampSchedule::new(Instant::now(), Duration::ZERO);
    spawn_memory(&mut set, 9, ramp, &token, &tuning, &tx);
    drop(tx);

    let mut grown = 0;
    let mut assigned = None;
    timeout(Duration::from_secs(5), async {
        while grown < 9 {
            match rx.recv().await.expect("event") {
                StatusEvent::MemoryGrown { mb } => grown += mb,
                StatusEvent::MemoryAssigned(mb) => assigned = Some(mb),
                _ => {}
            }
        }
    })
    .await
    .expect("arenas grow to target");
    assert_eq!(assigned, Some(9));

    // held at target, never beyond
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, StatusEvent::MemoryGrown { .. }));
    }

    token.cancel();
    join_all(&mut set, Duration::from_millis(500)).await;
    let mut released = 0;
    while let Some(event) = rx.recv().await {
        if let StatusEvent::MemoryReleased { mb } = event {
            released += mb;
        }
    }
    assert_eq!(released, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cpu_workers_apply_duty_and_stop_within_a_cycle() {
    let tuning = tuning();
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut set = WorkerSet::new();
    let ramp = RampSchedule::new(Instant::now(), Duration::ZERO);
    spawn_cpu(&mut set, 50.0, ramp, &token, &tuning, &tx);
    drop(tx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled_at = std::time::Instant::now();
    token.cancel();
    join_all(&mut set, Duration::from_millis(500)).await;
    assert!(cancelled_at.elapsed() < Duration::from_millis(500));

    let mut cores = Vec::new();
    while let Some(event) = rx.recv().await {
        if let StatusEvent::CpuDuty { core, percent } = event {
            assert!((percent - 50.0).abs() < f64::EPSILON);
            cores.push(core);
        }
    }
    cores.sort_unstable();
    assert_eq!(cores, vec![0, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cpu_ramp_is_reread() {
    let tuning = tuning();
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut set = WorkerSet::new();
    let ramp = RampSchedule::new(Instant::now(), Duration::from_millis(100));
    spawn_cpu(&mut set, 40.0, ramp, &token, &tuning, &tx);
    drop(tx);

    tokio::time::sleep(Duration::from_millis(200)).await;
    token.cancel();
    join_all(&mut set, Duration::from_millis(500)).await;

    let mut last = 0.0_f64;
    let mut updates = 0;
    while let Some(event) = rx.recv().await {
        if let StatusEvent::CpuDuty { core: 0, percent } = event {
            assert!(percent >= last);
            last = percent;
            updates += 1;
        }
    }
    assert!(updates > 1);
    assert!((last - 40.0).abs() < f64::EPSILON);
}
