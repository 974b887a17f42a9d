use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Liveness record written after every cycle tick; consumed by process
/// supervisors (container healthchecks).
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub last_execution: SystemTime,
    pub last_scenario: String,
    pub last_refresh: Option<SystemTime>,
}

/// Writable text target for [`HealthRecord`]s. Write failures are the
/// caller's to log; they are never fatal.
#[derive(Debug, Clone)]
pub struct HealthSink {
    path: PathBuf,
}

impl HealthSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, record: &HealthRecord) -> std::io::Result<()> {
        std::fs::write(&self.path, render(record))
    }
}

fn render(record: &HealthRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "last_execution_time: {}\n",
        humantime::format_rfc3339_seconds(record.last_execution)
    ));
    out.push_str(&format!("last_scenario: {}\n", record.last_scenario));
    match record.last_refresh {
        Some(at) => out.push_str(&format!(
            "last_refresh_time: {}\n",
            humantime::format_rfc3339_seconds(at)
        )),
        None => out.push_str("last_refresh_time: never\n"),
    }
    out
}
