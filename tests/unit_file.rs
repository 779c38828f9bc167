#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::path::PathBuf;
use std::time::Duration;

use outage_mock::domain::{Tuning, MIB};
use outage_mock::error::Error;
use outage_mock::lib_file::grow_file;
use outage_mock::status::StatusEvent;
use outage_mock::RampSchedule;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn tuning() -> Tuning {
    Tuning {
        file_tick: Duration::from_millis(5),
        file_chunk_cap: MIB,
        write_buffer: 256 * 1024,
        ..Tuning::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn grows_to_exact_target_in_capped_steps() {
    let file = tokio::fs::File::from_std(tempfile::tempfile().expect("tempfile"));
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ramp = RampSchedule::new(Instant::now(), Duration::ZERO);
    let worker_token = token.clone();
    let handle = tokio::spawn(async move {
        let mut file = file;
        let written = grow_file(
            &mut file,
            &PathBuf::from("unnamed"),
            3,
            ramp,
            &worker_token,
            &tuning(),
            &tx,
        )
        .await;
        (written, file)
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();
    let (written, file) = handle.await.expect("join");
    assert_eq!(written.expect("ok"), 3 * MIB);
    assert_eq!(file.metadata().await.expect("metadata").len(), 3 * MIB);

    let mut previous = 0;
    let mut targets = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            StatusEvent::FileWritten { bytes } => {
                assert!(bytes - previous <= MIB);
                previous = bytes;
            }
            StatusEvent::FileTarget(mb) => targets.push(mb),
            _ => {}
        }
    }
    assert_eq!(previous, 3 * MIB);
    assert_eq!(targets, vec![3]);
}

#[tokio::test]
async fn write_failure_is_surfaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readonly");
    std::fs::write(&path, b"").expect("create");
    let mut file = tokio::fs::File::open(&path).await.expect("open read-only");
    let token = CancellationToken::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let ramp = RampSchedule::new(Instant::now(), Duration::ZERO);
    let err = grow_file(&mut file, &path, 1, ramp, &token, &tuning(), &tx)
        .await
        .expect_err("write must fail");
    assert!(matches!(err, Error::FileWrite { .. }), "{err}");
}

#[tokio::test]
async fn cancelled_before_first_tick_writes_nothing() {
    let mut file = tokio::fs::File::from_std(tempfile::tempfile().expect("tempfile"));
    let token = CancellationToken::new();
    token.cancel();
    let (tx, _rx) = mpsc::unbounded_channel();
    let ramp = RampSchedule::new(Instant::now(), Duration::ZERO);
    let written = grow_file(&mut file, &PathBuf::from("unnamed"), 4, ramp, &token, &tuning(), &tx)
        .await
        .expect("ok");
    assert_eq!(written, 0);
}
