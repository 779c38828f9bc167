#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use crate::domain::Config;
use crate::error::{Error, Result};

pub fn validate_config(cfg: &Config) -> Result<()> {
    if !cfg.cpu_percent.is_finite() || !(0.0..=100.0).contains(&cfg.cpu_percent) {
        return Err(Error::config("cpu percentage must be between 0 and 100"));
    }
    if cfg.duration.is_zero() {
        return Err(Error::config("duration must be positive"));
    }
    if cfg.file_size_mb > 0 && cfg.file_path.as_os_str().is_empty() {
        return Err(Error::config("file path is empty"));
    }
    Ok(())
}
