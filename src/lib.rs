#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod cleanup;
pub mod cli;
pub mod display;
pub mod domain;
pub mod error;
pub mod http;
pub mod lib_cpu;
pub mod lib_file;
pub mod lib_mem;
pub mod metrics;
pub mod ramp;
pub mod service;
pub mod status;
pub mod validation;

pub use domain::{Config, ResourceKind, ResourceStatus, Tuning};
pub use error::{Error, Result};
pub use http::serve;
pub use http::{healthz, resource_status, scrape_metrics, stop, AppState};
pub use metrics::Metrics;
pub use ramp::RampSchedule;
pub use service::{Controller, Phase, StopReason};
pub use validation::validate_config;
