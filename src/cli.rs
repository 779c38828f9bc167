#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::domain::{parse_duration, parse_file_size_mb, Config, DEFAULT_FILE_PATH};
use crate::error::Result;
use crate::validation::validate_config;

/// Generate controlled CPU, memory and disk pressure for a fixed duration
///
/// All targets ramp up linearly from zero over the rampup window, are held
/// until the duration elapses (or the process is interrupted) and are then
/// released. The grown file never outlives the run.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub struct Cli {
    /// CPU usage percentage across all cores (0-100, 0 disables)
    #[clap(long = "cpu", default_value_t = 0.0)]
    pub cpu_percent: f64,

    /// Resident memory to hold, in MB (0 disables)
    #[clap(long = "memory", default_value_t = 0)]
    pub memory_mb: u64,

    /// File size with unit, e.g. 100M, 1.5G, 500K, 2T (0 disables)
    #[clap(long = "fsize", default_value = "0")]
    pub file_size: String,

    /// Path of the grown file
    #[clap(long = "fpath", default_value = DEFAULT_FILE_PATH)]
    pub file_path: PathBuf,

    /// Total running time, e.g. 30s, 5m
    #[clap(long, default_value = "30s", value_parser = parse_duration_arg)]
    pub duration: Duration,

    /// Time to reach the targets linearly (0 = immediately)
    #[clap(long, default_value = "10s", value_parser = parse_duration_arg)]
    pub rampup: Duration,

    /// Keep the file visible at its path and delete it with a detached helper
    /// instead of unlinking it right after creation
    #[clap(long)]
    pub visible_file: bool,

    /// Serve /healthz, /status, /metrics and POST /stop on this address
    #[clap(long)]
    pub listen: Option<String>,

    /// Log output format (logs go to stderr)
    #[clap(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    #[clap(long = "cleanup-file", hide = true)]
    pub cleanup_file: Option<PathBuf>,

    #[clap(long = "cleanup-delay", hide = true, value_parser = parse_duration_arg)]
    pub cleanup_delay: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

fn parse_duration_arg(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Builds and validates the run configuration.
    pub fn to_config(&self) -> Result<Config> {
        let config = Config {
            cpu_percent: self.cpu_percent,
            memory_mb: self.memory_mb,
            file_size_mb: parse_file_size_mb(&self.file_size)?,
            file_path: self.file_path.clone(),
            duration: self.duration,
            rampup: self.rampup,
            visible_file: self.visible_file,
        };
        validate_config(&config)?;
        Ok(config)
    }

    /// Present when this process is the detached cleanup helper. A missing
    /// delay means remove right away.
    pub fn helper_job(&self) -> Option<(PathBuf, Duration)> {
        let path = self.cleanup_file.clone()?;
        Some((path, self.cleanup_delay.unwrap_or_default()))
    }
}
