#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Console rendering of the run: a banner with the targets, a column header,
//! then one row per status snapshot.

use std::io::{self, Write};
use std::path::Path;

use crate::domain::{Config, ResourceKind, ResourceStatus};

const INNER_WIDTH: usize = 76;
const MAX_PATH_WIDTH: usize = 30;

pub struct Display {
    config: Config,
    cores: usize,
}

impl Display {
    pub fn new(config: &Config, cores: usize) -> Self {
        Self {
            config: config.clone(),
            cores,
        }
    }

    pub fn banner(&self, out: &mut impl Write) -> io::Result<()> {
        let cfg = &self.config;
        let rule = "═".repeat(INNER_WIDTH + 2);
        writeln!(out, "╔{rule}╗")?;
        banner_line(out, "OUTAGE MOCK - RESOURCE MONITOR")?;
        writeln!(out, "╠{rule}╣")?;
        let cpu = if cfg.enabled(ResourceKind::Cpu) {
            format!("CPU Target: {:.1}% (across {} cores)", cfg.cpu_percent, self.cores)
        } else {
            "CPU Target: Disabled".to_owned()
        };
        banner_line(out, &cpu)?;
        let memory = if cfg.enabled(ResourceKind::Memory) {
            format!("Memory Target: {} MB", cfg.memory_mb)
        } else {
            "Memory Target: Disabled".to_owned()
        };
        banner_line(out, &memory)?;
        let file = if cfg.enabled(ResourceKind::File) {
            format!(
                "File Target: {} MB (path: {})",
                cfg.file_size_mb,
                shorten_path(&cfg.file_path)
            )
        } else {
            "File Target: Disabled".to_owned()
        };
        banner_line(out, &file)?;
        banner_line(
            out,
            &format!(
                "Duration: {}, Rampup: {}",
                humantime::format_duration(cfg.duration),
                humantime::format_duration(cfg.rampup)
            ),
        )?;
        writeln!(out, "╚{rule}╝")?;
        writeln!(out)
    }

    pub fn header(&self, out: &mut impl Write) -> io::Result<()> {
        let rule = "─".repeat(69);
        writeln!(out, "┌{rule}┐")?;
        writeln!(
            out,
            "│ {:<7} │ {:<5} │ {:<14} │ {:<14} │ {:<8} │",
            "Time", "CPU %", "Memory (MB)", "File (MB)", "Progress"
        )?;
        writeln!(
            out,
            "│ {:<7} │ {:<5} │ {:<14} │ {:<14} │ {:<8} │",
            "", "", "Target/Actual", "Target/Actual", ""
        )?;
        writeln!(out, "├{rule}┤")
    }

    pub fn row(&self, status: &ResourceStatus) -> String {
        let cfg = &self.config;
        let secs = status.elapsed.as_secs();
        let elapsed = format!("{:02}:{:02}", secs / 60, secs % 60);
        let cpu = if cfg.enabled(ResourceKind::Cpu) {
            format!("{:.1}", status.cpu_percent_actual)
        } else {
            "N/A".to_owned()
        };
        let memory = if cfg.enabled(ResourceKind::Memory) {
            format!("{}/{}", status.memory_target_mb, status.memory_actual_mb)
        } else {
            "N/A".to_owned()
        };
        let file = if cfg.enabled(ResourceKind::File) {
            format!("{}/{}", status.file_target_mb, status.file_actual_mb)
        } else {
            "N/A".to_owned()
        };
        let progress = format!("{:.1}%", status.progress * 100.0);
        format!("│ {elapsed:<7} │ {cpu:<5} │ {memory:<14} │ {file:<14} │ {progress:<8} │")
    }

    pub fn print_row(&self, out: &mut impl Write, status: &ResourceStatus) -> io::Result<()> {
        writeln!(out, "{}", self.row(status))
    }
}

fn banner_line(out: &mut impl Write, text: &str) -> io::Result<()> {
    writeln!(out, "║ {text:<INNER_WIDTH$} ║")
}

/// Long paths are cut down to `...` plus the file name.
pub fn shorten_path(path: &Path) -> String {
    let full = path.display().to_string();
    if full.chars().count() <= MAX_PATH_WIDTH {
        return full;
    }
    match path.file_name() {
        Some(name) => format!("...{}", name.to_string_lossy()),
        None => full,
    }
}
