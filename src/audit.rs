//! Per-run CSV audit log.
//!
//! One file per run, `audit_<run_id>.csv`, created with create-new semantics
//! so an earlier run's log is never overwritten. Rows are appended under a
//! mutex and flushed after every append group; nothing is ever rewritten.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};

use crate::models::AuditRow;

pub const AUDIT_HEADER: [&str; 9] = [
    "run_id",
    "source_filename",
    "chunk_index",
    "chunk_identity",
    "word_count",
    "outcome",
    "batch_id",
    "timestamp",
    "detail",
];

/// A fresh run id: UTC time down to milliseconds, safe for filenames.
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// RFC 3339 timestamp for audit rows.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl AuditLog {
    pub fn create(dir: &Path, run_id: &str) -> Result<AuditLog> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create audit dir {}", dir.display()))?;
        let path = dir.join(format!("audit_{}.csv", run_id));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("failed to create audit log {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(AUDIT_HEADER)?;
        writer.flush()?;

        Ok(AuditLog {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `rows` as one group.
    pub fn append(&self, rows: &[AuditRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;

    fn row(index: Option<usize>, outcome: Outcome, detail: &str) -> AuditRow {
        AuditRow {
            run_id: "r1".into(),
            source_filename: "Episode 1.docx".into(),
            chunk_index: index,
            chunk_identity: index.map(|i| format!("id{}", i)),
            word_count: 10,
            outcome,
            batch_id: index.map(|_| "b00001".into()),
            timestamp: "2025-01-01T00:00:00.000Z".into(),
            detail: detail.into(),
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = AuditLog::create(tmp.path(), "r1").unwrap();
        log.append(&[row(Some(0), Outcome::Success, "")]).unwrap();
        log.append(&[row(None, Outcome::Failure, "corrupt, really")]).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], AUDIT_HEADER.join(","));
        assert_eq!(
            lines[1],
            "r1,Episode 1.docx,0,id0,10,success,b00001,2025-01-01T00:00:00.000Z,"
        );
        assert_eq!(
            lines[2],
            "r1,Episode 1.docx,,,10,failure,,2025-01-01T00:00:00.000Z,\"corrupt, really\""
        );
    }

    #[test]
    fn never_overwrites_existing_log() {
        let tmp = tempfile::TempDir::new().unwrap();
        let first = AuditLog::create(tmp.path(), "same").unwrap();
        first.append(&[row(Some(0), Outcome::Success, "")]).unwrap();
        assert!(AuditLog::create(tmp.path(), "same").is_err());
        let content = std::fs::read_to_string(first.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn empty_run_still_has_header() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = AuditLog::create(&tmp.path().join("nested"), "r").unwrap();
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.trim_end(), AUDIT_HEADER.join(","));
    }
}
