//! Monthly crontab for the three job binaries.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::config::{ScheduleConfig, CONFIG_ENV};
use crate::error::{PipelineError, Result};

pub const SCRAPE_BIN: &str = "taxi-scrape";
pub const LOAD_BIN: &str = "taxi-load";
pub const REPORT_BIN: &str = "taxi-report";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronEntry {
    pub schedule: String,
    pub command: String,
}

impl CronEntry {
    pub fn line(&self) -> String {
        format!("{} {}", self.schedule, self.command)
    }
}

fn check_schedule(expr: &str) -> Result<&str> {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        Ok(expr)
    } else {
        Err(PipelineError::Configuration(format!(
            "cron schedule {:?} has {} fields, expected 5",
            expr, fields
        )))
    }
}

fn command_for(bin_dir: &Path, bin: &str, config_path: Option<&Path>) -> String {
    let exe = bin_dir.join(bin);
    match config_path {
        Some(cfg) => format!("{}={} {}", CONFIG_ENV, cfg.display(), exe.display()),
        None => exe.display().to_string(),
    }
}

/// Scrape, load, report: in that order.
pub fn entries(cfg: &ScheduleConfig) -> Result<Vec<CronEntry>> {
    [
        (&cfg.scrape, SCRAPE_BIN),
        (&cfg.load, LOAD_BIN),
        (&cfg.report, REPORT_BIN),
    ]
    .into_iter()
    .map(|(schedule, bin)| -> Result<CronEntry> {
        Ok(CronEntry {
            schedule: check_schedule(schedule)?.to_string(),
            command: command_for(&cfg.bin_dir, bin, cfg.config_path.as_deref()),
        })
    })
    .collect()
}

pub fn render(cfg: &ScheduleConfig) -> Result<String> {
    let mut out = String::new();
    for entry in entries(cfg)? {
        out.push_str(&entry.line());
        out.push('\n');
    }
    Ok(out)
}

fn rejected(status: impl fmt::Display, stderr: &[u8]) -> PipelineError {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        PipelineError::Configuration(format!("crontab exited with {}", status))
    } else {
        PipelineError::Configuration(format!("crontab exited with {}: {}", status, stderr))
    }
}

/// Replace the invoking user's crontab with `content`.
pub fn install(content: &str) -> Result<()> {
    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(content.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let err = rejected(output.status, &output.stderr);
        warn!(error = %err, "crontab rejected the schedule");
        return Err(err);
    }
    info!("Crontab successfully updated!");
    Ok(())
}
