//! Report envelope for JSON output.
//!
//! Every document written by the CLI is wrapped as
//! `{ "data": T, "meta": { generated_at, version, generator } }` so
//! downstream tooling sees one shape regardless of the command.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

/// Metadata attached to every written report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    /// RFC 3339 generation time
    pub generated_at: String,
    pub version: &'static str,
    pub generator: &'static str,
}

impl Default for ReportMeta {
    fn default() -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            generator: env!("CARGO_PKG_NAME"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEnvelope<T: Serialize> {
    pub data: T,
    pub meta: ReportMeta,
}

impl<T: Serialize> ReportEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: ReportMeta::default(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write as pretty JSON to `path`, or stdout for `None` or `-`.
    pub fn write(&self, path: Option<&Path>) -> std::io::Result<()> {
        let json = self.to_json_pretty().map_err(std::io::Error::other)?;
        match path {
            Some(p) if p != Path::new("-") => {
                if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(p, json + "\n")
            }
            _ => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{json}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionAggregator;
    use crate::types::{AnalysisReport, VideoInfo};

    #[test]
    fn test_envelope_shape() {
        let envelope = ReportEnvelope::new(serde_json::json!({"reps": 3}));
        let v = serde_json::to_value(&envelope).unwrap();
        assert_eq!(v["data"]["reps"], 3);
        assert_eq!(v["meta"]["version"], env!("CARGO_PKG_VERSION"));
        assert!(chrono::DateTime::parse_from_rfc3339(v["meta"]["generated_at"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/session.json");
        let report = AnalysisReport {
            video: VideoInfo::default(),
            duration_seconds: 0.0,
            summary: SessionAggregator::new().summary(),
            reps: Vec::new(),
            transitions: Vec::new(),
            source_error: None,
        };
        ReportEnvelope::new(report).write(Some(&path)).unwrap();

        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["data"]["summary"]["total_reps"], 0);
        assert!(v["data"].get("source_error").is_none());
    }
}
