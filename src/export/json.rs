use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::conntrack::protocol_name;
use crate::state::{ConnectionTracker, DownTarget};

/// Point-in-time view of the down window
#[derive(Debug, Clone, Serialize)]
pub struct DownReport {
    pub taken_at: DateTime<Utc>,
    pub targets: Vec<ReportTarget>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTarget {
    pub ip: String,
    pub up: bool,
    pub ports: Vec<ReportPort>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPort {
    pub proto: String,
    pub port: u16,
    pub failing: bool,
}

impl From<DownTarget> for ReportTarget {
    fn from(target: DownTarget) -> Self {
        Self {
            ip: target.address.to_string(),
            up: target.up,
            ports: target
                .ports
                .into_iter()
                .map(|p| ReportPort {
                    proto: protocol_name(p.protocol),
                    port: p.port,
                    failing: p.failing,
                })
                .collect(),
        }
    }
}

impl DownReport {
    pub fn capture(tracker: &ConnectionTracker) -> Self {
        Self {
            taken_at: Utc::now(),
            targets: tracker.snapshot().into_iter().map(Into::into).collect(),
        }
    }
}

/// Export the down window to JSON
pub fn export_json<W: Write>(tracker: &ConnectionTracker, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, &DownReport::capture(tracker))?;
    Ok(())
}

/// Export the down window to a JSON string
pub fn export_json_string(tracker: &ConnectionTracker) -> Result<String> {
    Ok(serde_json::to_string_pretty(&DownReport::capture(tracker))?)
}
