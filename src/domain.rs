#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const MIB: u64 = 1024 * 1024;

pub const DEFAULT_FILE_PATH: &str = "outagemock_temp_file";

/// Validated run parameters, shared read-only by every actuator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Config {
    pub cpu_percent: f64,
    pub memory_mb: u64,
    pub file_size_mb: u64,
    pub file_path: PathBuf,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(with = "humantime_serde")]
    pub rampup: Duration,
    /// Keep the grown file reachable by path instead of unlinking it right
    /// after creation. Reclaim then relies on the detached helper.
    pub visible_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cpu_percent: 0.0,
            memory_mb: 0,
            file_size_mb: 0,
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
            duration: Duration::from_secs(30),
            rampup: Duration::from_secs(10),
            visible_file: false,
        }
    }
}

impl Config {
    pub fn enabled(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Cpu => self.cpu_percent > 0.0,
            ResourceKind::Memory => self.memory_mb > 0,
            ResourceKind::File => self.file_size_mb > 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Cpu,
    Memory,
    File,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Cpu => f.write_str("CPU"),
            ResourceKind::Memory => f.write_str("MEMORY"),
            ResourceKind::File => f.write_str("FILE"),
        }
    }
}

/// Point-in-time view of what the actuators are doing. Presentation only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub cpu_percent_actual: f64,
    pub memory_target_mb: u64,
    pub memory_actual_mb: u64,
    pub file_target_mb: u64,
    pub file_actual_mb: u64,
    pub workers: u64,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub progress: f64,
}

/// Timing and sizing knobs of the actuators.
///
/// The defaults are what the binary runs with; tests shrink the periods so
/// that scenarios finish in milliseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuning {
    pub cores: usize,
    pub memory_workers_per_core: usize,
    pub memory_tick: Duration,
    pub distribute_interval: Duration,
    pub file_tick: Duration,
    pub file_chunk_cap: u64,
    pub write_buffer: usize,
    pub cpu_cycle: Duration,
    pub cpu_refresh: Duration,
    pub status_interval: Duration,
    pub helper_margin: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            cores: available_cores(),
            memory_workers_per_core: 10,
            memory_tick: Duration::from_millis(10),
            distribute_interval: Duration::from_secs(2),
            file_tick: Duration::from_millis(100),
            file_chunk_cap: 10 * MIB,
            write_buffer: 1024 * 1024,
            cpu_cycle: Duration::from_millis(20),
            cpu_refresh: Duration::from_secs(2),
            status_interval: Duration::from_secs(2),
            helper_margin: Duration::from_secs(5),
        }
    }
}

impl Tuning {
    pub fn memory_workers(&self) -> usize {
        (self.cores * self.memory_workers_per_core).max(1)
    }
}

pub fn available_cores() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Parses a size such as `100M`, `1.5G` or `500K` into whole MiB.
///
/// A bare number is a byte count. Units are binary (`K` = 1024 bytes) and
/// case-insensitive; the result is truncated toward zero.
pub fn parse_file_size_mb(input: &str) -> Result<u64> {
    let upper = input.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Ok(0);
    }
    let re = Regex::new(r"^(\d+(?:\.\d+)?)\s*([A-Z]?)$")
        .map_err(|e| Error::config(format!("size pattern: {e}")))?;
    let caps = re.captures(&upper).ok_or_else(|| {
        Error::config(format!(
            "invalid file size format: {input} (expected number + unit, e.g. 100M, 1.5G)"
        ))
    })?;
    let multiplier: u64 = match &caps[2] {
        "" | "B" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        other => {
            return Err(Error::config(format!(
                "unsupported unit: {other} (supported: B, K, M, G, T)"
            )))
        }
    };
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| Error::config(format!("invalid number in file size: {}", &caps[1])))?;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let bytes = (value * multiplier as f64) as u64;
    Ok(bytes / MIB)
}

/// Parses `30s`, `1m30s`, `250ms` and friends. A lone `0` means zero.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(trimmed)
        .map_err(|e| Error::config(format!("invalid duration {input:?}: {e}")))
}
