//! SQLite-backed alert journal. Keeps alert records across restarts; the
//! in-memory history in [`crate::alert::AlertSink`] only covers the current run.

use crate::alert::{AlertRecord, Severity};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Start of the retention window ending at `now`. `None` when retention is
/// off (`days == 0`) or the window reaches past the representable range.
pub fn retention_cutoff(now: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    if days == 0 {
        return None;
    }
    let window = chrono::Duration::try_days(i64::try_from(days).ok()?)?;
    now.checked_sub_signed(window)
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("alert journal: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt journal row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

pub struct AlertJournal {
    conn: Mutex<Connection>,
}

impl AlertJournal {
    /// Open or create the journal at `path`
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                batch_index INTEGER NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                artifact_path TEXT NOT NULL,
                artifact_sha256 TEXT NOT NULL,
                reconstruction_error REAL NOT NULL,
                packets INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_ts ON alerts(ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_alert(&self, record: &AlertRecord) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO alerts (id, ts, batch_index, severity, message, artifact_path, artifact_sha256, reconstruction_error, packets) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                record.timestamp.timestamp_millis(),
                record.batch_index as i64,
                record.severity.as_str(),
                record.message,
                record.artifact_path.to_string_lossy().into_owned(),
                record.artifact_sha256,
                record.reconstruction_error,
                record.packets as i64,
            ],
        )?;
        Ok(())
    }

    /// Newest `limit` alerts, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>, JournalError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT id, ts, batch_index, severity, message, artifact_path, artifact_sha256, reconstruction_error, packets \
             FROM alerts ORDER BY ts DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, ts, batch_index, severity, message, artifact_path, artifact_sha256, error, packets) = row?;
            let corrupt = |reason: String| JournalError::Corrupt {
                id: id.clone(),
                reason,
            };
            let parsed_id = id.parse().map_err(|e: uuid::Error| corrupt(e.to_string()))?;
            let timestamp = Utc
                .timestamp_millis_opt(ts)
                .single()
                .ok_or_else(|| corrupt(format!("bad timestamp {}", ts)))?;
            let severity = match severity.as_str() {
                "high" => Severity::High,
                "medium" => Severity::Medium,
                other => return Err(corrupt(format!("unknown severity {}", other))),
            };
            out.push(AlertRecord {
                id: parsed_id,
                timestamp,
                batch_index: batch_index as u64,
                artifact_path: PathBuf::from(artifact_path),
                artifact_sha256,
                severity,
                message,
                reconstruction_error: error,
                packets: packets as usize,
            });
        }
        Ok(out)
    }

    /// Retention: delete alerts older than `ts_millis`
    pub fn prune_before(&self, ts_millis: i64) -> Result<u64, JournalError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let n = conn.execute("DELETE FROM alerts WHERE ts < ?1", params![ts_millis])?;
        Ok(n as u64)
    }

    /// Drop alerts older than `days`. `None` when no cutoff applies, in which
    /// case nothing is deleted.
    pub fn prune_retention(&self, days: u64) -> Result<Option<u64>, JournalError> {
        match retention_cutoff(Utc::now(), days) {
            Some(cutoff) => self.prune_before(cutoff.timestamp_millis()).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn record(index: u64, age_secs: i64) -> AlertRecord {
        AlertRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now() - Duration::seconds(age_secs),
            batch_index: index,
            artifact_path: PathBuf::from(format!("alerts/alert_{}.pcap", index)),
            artifact_sha256: "ab".repeat(32),
            severity: Severity::High,
            message: format!("batch {}", index),
            reconstruction_error: 0.42,
            packets: 5000,
        }
    }

    #[test]
    fn roundtrip_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AlertJournal::open(&dir.path().join("alerts.db")).unwrap();
        journal.insert_alert(&record(1, 20)).unwrap();
        journal.insert_alert(&record(2, 10)).unwrap();

        let recent = journal.recent(5).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].batch_index, 2);
        assert_eq!(recent[0].severity, Severity::High);
        assert_eq!(recent[1].packets, 5000);
    }

    #[test]
    fn prune_removes_old_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AlertJournal::open(&dir.path().join("alerts.db")).unwrap();
        journal.insert_alert(&record(1, 3600)).unwrap();
        journal.insert_alert(&record(2, 0)).unwrap();

        let cutoff = (Utc::now() - Duration::seconds(60)).timestamp_millis();
        assert_eq!(journal.prune_before(cutoff).unwrap(), 1);
        assert_eq!(journal.recent(10).unwrap()[0].batch_index, 2);
    }

    #[test]
    fn retention_cutoff_window() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, 30), Some(now - Duration::days(30)));
        assert_eq!(retention_cutoff(now, 0), None);
    }

    #[test]
    fn oversized_retention_has_no_cutoff() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, 100_000_000), None);
        assert_eq!(retention_cutoff(now, i64::MAX as u64 + 1), None);
        assert_eq!(retention_cutoff(now, u64::MAX), None);
    }

    #[test]
    fn prune_retention_keeps_everything_without_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AlertJournal::open(&dir.path().join("alerts.db")).unwrap();
        journal.insert_alert(&record(1, 90 * 86_400)).unwrap();
        journal.insert_alert(&record(2, 0)).unwrap();

        assert_eq!(journal.prune_retention(u64::MAX).unwrap(), None);
        assert_eq!(journal.prune_retention(0).unwrap(), None);
        assert_eq!(journal.recent(10).unwrap().len(), 2);

        assert_eq!(journal.prune_retention(30).unwrap(), Some(1));
        assert_eq!(journal.recent(10).unwrap()[0].batch_index, 2);
    }
}
