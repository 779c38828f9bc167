#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use prometheus::core::Collector;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::ResourceStatus;

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub running: IntGauge,
    pub workers_active: IntGauge,
    pub cpu_duty_percent: Gauge,
    pub memory_target_mb: IntGauge,
    pub memory_actual_mb: IntGauge,
    pub file_target_mb: IntGauge,
    pub file_actual_mb: IntGauge,
    pub actuator_failures_total: IntCounter,
}

fn register<C>(registry: &Registry, collector: C, name: &str) -> AnyResult<C>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .with_context(|| format!("register {name}"))?;
    Ok(collector)
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> AnyResult<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))
        .with_context(|| format!("create {name}"))?;
    register(registry, gauge, name)
}

impl Metrics {
    pub fn new() -> AnyResult<Self> {
        let registry = Registry::new();
        let running = int_gauge(&registry, "outage_running", "1 while actuators are running")?;
        let workers_active = int_gauge(
            &registry,
            "outage_workers_active",
            "spawned actuator workers still running",
        )?;
        let cpu_duty_percent = Gauge::with_opts(Opts::new(
            "outage_cpu_duty_percent",
            "mean duty cycle applied by cpu workers",
        ))
        .context("create outage_cpu_duty_percent")?;
        let cpu_duty_percent = register(&registry, cpu_duty_percent, "outage_cpu_duty_percent")?;
        let memory_target_mb = int_gauge(
            &registry,
            "outage_memory_target_mb",
            "memory assigned to workers (MB)",
        )?;
        let memory_actual_mb = int_gauge(
            &registry,
            "outage_memory_actual_mb",
            "memory held in worker arenas (MB)",
        )?;
        let file_target_mb =
            int_gauge(&registry, "outage_file_target_mb", "current file size target (MB)")?;
        let file_actual_mb =
            int_gauge(&registry, "outage_file_actual_mb", "bytes written to the file (MB)")?;
        let actuator_failures_total = IntCounter::with_opts(Opts::new(
            "outage_actuator_failures_total",
            "actuators stopped by an error",
        ))
        .context("create outage_actuator_failures_total")?;
        let actuator_failures_total = register(
            &registry,
            actuator_failures_total,
            "outage_actuator_failures_total",
        )?;
        Ok(Self {
            registry,
            running,
            workers_active,
            cpu_duty_percent,
            memory_target_mb,
            memory_actual_mb,
            file_target_mb,
            file_actual_mb,
            actuator_failures_total,
        })
    }

    pub fn observe(&self, status: &ResourceStatus) {
        let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        self.cpu_duty_percent.set(status.cpu_percent_actual);
        self.memory_target_mb.set(clamp(status.memory_target_mb));
        self.memory_actual_mb.set(clamp(status.memory_actual_mb));
        self.file_target_mb.set(clamp(status.file_target_mb));
        self.file_actual_mb.set(clamp(status.file_actual_mb));
        self.workers_active.set(clamp(status.workers));
    }

    pub fn encode_text(&self) -> AnyResult<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf).context("encode metrics")?;
        Ok(buf)
    }
}
