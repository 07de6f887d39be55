//! External store contracts and the bundled SQLite implementation.
//!
//! The scheduler core only depends on the `ConfigSource` and
//! `CommitmentStore` traits; `PledgerDb` is the SQLite implementation that
//! ships with the binary so the system runs end-to-end. Swapping in a
//! different persistence engine means implementing the two traits.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};

use pledger_core::error::{PledgerError, Result};

use crate::prefs::RecipientNotificationConfig;

/// Read contract for recipient notification configurations.
/// Configuration data is read-only for the duration of a tick.
pub trait ConfigSource: Send + Sync {
    fn load_all(&self) -> Result<Vec<RecipientNotificationConfig>>;
}

/// Commitment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitmentStatus {
    Open,
    PendingVerification,
    Closed,
    Missed,
}

impl CommitmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Open => "open",
            CommitmentStatus::PendingVerification => "pending_verification",
            CommitmentStatus::Closed => "closed",
            CommitmentStatus::Missed => "missed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(CommitmentStatus::Open),
            "pending_verification" => Some(CommitmentStatus::PendingVerification),
            "closed" => Some(CommitmentStatus::Closed),
            "missed" => Some(CommitmentStatus::Missed),
            _ => None,
        }
    }
}

/// A promise/commitment row, as the reconciler sees it. External entity —
/// referenced, never owned, by the scheduler.
#[derive(Debug, Clone)]
pub struct Commitment {
    pub id: String,
    pub owner_id: String,
    pub org_id: Option<String>,
    pub title: String,
    pub status: CommitmentStatus,
    pub due_date: NaiveDate,
    /// Organization zone joined in by the store; None means the sweep
    /// falls back to its configured default.
    pub org_time_zone: Option<String>,
}

/// Read/write contract the missed-commitment sweep needs.
pub trait CommitmentStore: Send + Sync {
    /// All commitments currently in Open status.
    fn list_open(&self) -> Result<Vec<Commitment>>;

    /// Transition Open → Missed. Returns false if the row was no longer
    /// Open (already swept, or closed meanwhile) — the status guard is
    /// what makes the sweep idempotent.
    fn mark_missed(&self, id: &str) -> Result<bool>;
}

/// Bundled SQLite store for recipients, organizations, and commitments.
pub struct PledgerDb {
    conn: Mutex<Connection>,
}

impl PledgerDb {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).map_err(|e| PledgerError::Storage(format!("DB open: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PledgerError::Storage(format!("DB open: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS recipients (
                recipient_id TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                org_id TEXT,
                time_zone TEXT NOT NULL,
                kinds TEXT NOT NULL DEFAULT '{}'   -- JSON: kind -> prefs
            );

            CREATE TABLE IF NOT EXISTS organizations (
                org_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                time_zone TEXT
            );

            CREATE TABLE IF NOT EXISTS commitments (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                org_id TEXT,
                title TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'open',
                due_date TEXT NOT NULL              -- YYYY-MM-DD
            );
            ",
        )
        .map_err(|e| PledgerError::Storage(format!("Migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PledgerError::Storage(format!("DB lock: {e}")))
    }

    // ─── Recipients ──────────────────────────────────────

    /// Insert or replace a recipient's notification configuration.
    /// Called by the settings surface, never by the scheduler.
    pub fn upsert_recipient(&self, config: &RecipientNotificationConfig) -> Result<()> {
        let kinds = serde_json::to_string(&config.kinds)
            .map_err(|e| PledgerError::Storage(format!("Serialize prefs: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO recipients (recipient_id, address, org_id, time_zone, kinds)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                config.recipient_id,
                config.address,
                config.org_id,
                config.time_zone,
                kinds,
            ],
        )
        .map_err(|e| PledgerError::Storage(format!("Save recipient: {e}")))?;
        Ok(())
    }

    // ─── Organizations ──────────────────────────────────────

    pub fn upsert_org(&self, org_id: &str, name: &str, time_zone: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO organizations (org_id, name, time_zone) VALUES (?1, ?2, ?3)",
            params![org_id, name, time_zone],
        )
        .map_err(|e| PledgerError::Storage(format!("Save org: {e}")))?;
        Ok(())
    }

    // ─── Commitments ──────────────────────────────────────

    pub fn insert_commitment(
        &self,
        id: &str,
        owner_id: &str,
        org_id: Option<&str>,
        title: &str,
        due_date: NaiveDate,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO commitments (id, owner_id, org_id, title, status, due_date)
             VALUES (?1, ?2, ?3, ?4, 'open', ?5)",
            params![id, owner_id, org_id, title, due_date.format("%Y-%m-%d").to_string()],
        )
        .map_err(|e| PledgerError::Storage(format!("Save commitment: {e}")))?;
        Ok(())
    }

    pub fn commitment_status(&self, id: &str) -> Result<Option<CommitmentStatus>> {
        let conn = self.lock()?;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM commitments WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| PledgerError::Storage(format!("Query commitment: {e}")))?;
        Ok(status.and_then(|s| CommitmentStatus::parse(&s)))
    }
}

impl ConfigSource for PledgerDb {
    fn load_all(&self) -> Result<Vec<RecipientNotificationConfig>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT recipient_id, address, org_id, time_zone, kinds FROM recipients")
            .map_err(|e| PledgerError::Storage(format!("Load configs: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| PledgerError::Storage(format!("Load configs: {e}")))?;

        let mut configs = Vec::new();
        for row in rows {
            let (recipient_id, address, org_id, time_zone, kinds_json) =
                row.map_err(|e| PledgerError::Storage(format!("Config row: {e}")))?;
            // A malformed prefs blob is fatal for the tick: silently
            // skipping a recipient is exactly the failure mode this
            // system exists to prevent.
            let kinds = serde_json::from_str(&kinds_json).map_err(|e| {
                PledgerError::Storage(format!("Corrupt prefs for '{recipient_id}': {e}"))
            })?;
            configs.push(RecipientNotificationConfig {
                recipient_id,
                address,
                org_id,
                time_zone,
                kinds,
            });
        }
        Ok(configs)
    }
}

impl CommitmentStore for PledgerDb {
    fn list_open(&self) -> Result<Vec<Commitment>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.owner_id, c.org_id, c.title, c.status, c.due_date, o.time_zone
                 FROM commitments c
                 LEFT JOIN organizations o ON o.org_id = c.org_id
                 WHERE c.status = 'open'",
            )
            .map_err(|e| PledgerError::Storage(format!("List open: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .map_err(|e| PledgerError::Storage(format!("List open: {e}")))?;

        let mut commitments = Vec::new();
        for row in rows {
            let (id, owner_id, org_id, title, status_str, due_str, org_time_zone) =
                row.map_err(|e| PledgerError::Storage(format!("Commitment row: {e}")))?;
            let status = CommitmentStatus::parse(&status_str)
                .ok_or_else(|| PledgerError::Storage(format!("Bad status '{status_str}'")))?;
            let due_date = NaiveDate::parse_from_str(&due_str, "%Y-%m-%d")
                .map_err(|e| PledgerError::Storage(format!("Bad due_date '{due_str}': {e}")))?;
            commitments.push(Commitment {
                id,
                owner_id,
                org_id,
                title,
                status,
                due_date,
                org_time_zone,
            });
        }
        Ok(commitments)
    }

    fn mark_missed(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE commitments SET status = 'missed' WHERE id = ?1 AND status = 'open'",
                [id],
            )
            .map_err(|e| PledgerError::Storage(format!("Mark missed: {e}")))?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::NotificationKind;
    use crate::prefs::{KindPrefs, WeekdaySet};
    use chrono::Weekday;

    #[test]
    fn test_recipient_round_trip() {
        let db = PledgerDb::open_in_memory().unwrap();
        let config = RecipientNotificationConfig::new("u1", "u1@example.com", "Asia/Kolkata")
            .with_kind(
                NotificationKind::DailyBrief,
                KindPrefs::at(8, WeekdaySet::from_days(&[Weekday::Tue])),
            );
        db.upsert_recipient(&config).unwrap();

        let loaded = db.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].time_zone, "Asia/Kolkata");
        assert!(loaded[0].prefs_for(NotificationKind::DailyBrief).is_some());
    }

    #[test]
    fn test_mark_missed_only_touches_open_rows() {
        let db = PledgerDb::open_in_memory().unwrap();
        let due = NaiveDate::from_ymd_opt(2023, 10, 1).unwrap();
        db.insert_commitment("c1", "u1", None, "ship the report", due)
            .unwrap();

        assert!(db.mark_missed("c1").unwrap());
        assert_eq!(
            db.commitment_status("c1").unwrap(),
            Some(CommitmentStatus::Missed)
        );
        // second sweep over the same row is a no-op
        assert!(!db.mark_missed("c1").unwrap());
        assert!(db.list_open().unwrap().is_empty());
    }

    #[test]
    fn test_list_open_joins_org_zone() {
        let db = PledgerDb::open_in_memory().unwrap();
        db.upsert_org("acme", "Acme Inc", Some("Asia/Kolkata")).unwrap();
        let due = NaiveDate::from_ymd_opt(2023, 10, 1).unwrap();
        db.insert_commitment("c1", "u1", Some("acme"), "t", due).unwrap();
        db.insert_commitment("c2", "u2", None, "t", due).unwrap();

        let open = db.list_open().unwrap();
        let c1 = open.iter().find(|c| c.id == "c1").unwrap();
        assert_eq!(c1.org_time_zone.as_deref(), Some("Asia/Kolkata"));
        let c2 = open.iter().find(|c| c.id == "c2").unwrap();
        assert!(c2.org_time_zone.is_none());
    }
}
