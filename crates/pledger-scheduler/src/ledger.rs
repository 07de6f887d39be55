//! Delivery Log / Idempotency Store — SQLite-backed, write-once.
//!
//! The UNIQUE constraint on (recipient_id, kind, period_key) is the sole
//! source of truth for "already sent". If two tick runners race, exactly
//! one insert succeeds; the loser sees a duplicate-key failure and treats
//! it as "someone else already sent it" — an expected outcome, never an
//! error to surface.
//!
//! Also hosts the pending-event queue that lifecycle transitions (e.g. the
//! missed-commitment sweep) feed and the dispatch coordinator drains.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, params};

use pledger_core::error::{PledgerError, Result};

use crate::kinds::NotificationKind;

/// Outcome of a delivery attempt, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Failed(String),
}

/// Result of writing a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This writer claimed the (recipient, kind, period) tuple.
    Recorded,
    /// The tuple already existed — a concurrent runner or an earlier tick
    /// got there first. Treated as a successful no-op.
    Duplicate,
}

/// A row from the delivery log, for audit views.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeliveryRecord {
    pub recipient_id: String,
    pub kind: String,
    pub period_key: String,
    pub delivered_at: String,
    pub outcome: String,
    pub error: Option<String>,
}

/// An event-driven notification waiting for the next tick.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub id: i64,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub period_key: String,
}

/// SQLite-backed delivery log and event queue.
pub struct DeliveryLedger {
    conn: Mutex<Connection>,
}

impl DeliveryLedger {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| PledgerError::Storage(format!("Ledger open: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// In-memory ledger for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PledgerError::Storage(format!("Ledger open: {e}")))?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            -- Immutable record of every delivery attempt. The unique
            -- constraint IS the at-most-once guarantee.
            CREATE TABLE IF NOT EXISTS deliveries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                period_key TEXT NOT NULL,
                delivered_at TEXT NOT NULL,
                outcome TEXT NOT NULL,           -- 'sent' or 'failed'
                error TEXT,
                UNIQUE (recipient_id, kind, period_key)
            );

            -- Event-driven notifications enqueued by lifecycle transitions,
            -- drained by the next tick. Insert is idempotent on the same
            -- triple so re-running a transition never duplicates an event.
            CREATE TABLE IF NOT EXISTS pending_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                period_key TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                UNIQUE (recipient_id, kind, period_key)
            );
            ",
        )
        .map_err(|e| PledgerError::Storage(format!("Ledger migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PledgerError::Storage(format!("Ledger lock: {e}")))
    }

    // ─── Delivery log ──────────────────────────────────────

    /// Fast-path check before calling the transport. The authoritative
    /// claim is still the insert in `record_attempt`.
    pub fn has_sent(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        period_key: &str,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM deliveries
                 WHERE recipient_id = ?1 AND kind = ?2 AND period_key = ?3",
                params![recipient_id, kind.as_str(), period_key],
                |row| row.get(0),
            )
            .map_err(|e| PledgerError::Storage(format!("Ledger query: {e}")))?;
        Ok(count > 0)
    }

    /// Write the delivery record for one attempt. A duplicate-key failure
    /// is mapped to `RecordOutcome::Duplicate`, not an error.
    pub fn record_attempt(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        period_key: &str,
        at: DateTime<Utc>,
        outcome: &Outcome,
    ) -> Result<RecordOutcome> {
        let (outcome_str, error) = match outcome {
            Outcome::Sent => ("sent", None),
            Outcome::Failed(reason) => ("failed", Some(reason.as_str())),
        };
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO deliveries (recipient_id, kind, period_key, delivered_at, outcome, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                recipient_id,
                kind.as_str(),
                period_key,
                at.to_rfc3339(),
                outcome_str,
                error,
            ],
        );
        match result {
            Ok(_) => Ok(RecordOutcome::Recorded),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Ok(RecordOutcome::Duplicate)
            }
            Err(e) => Err(PledgerError::Storage(format!("Ledger insert: {e}"))),
        }
    }

    /// Most recent delivery records, newest first. Audit view.
    pub fn recent(&self, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT recipient_id, kind, period_key, delivered_at, outcome, error
                 FROM deliveries ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| PledgerError::Storage(format!("Ledger query: {e}")))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(DeliveryRecord {
                    recipient_id: row.get(0)?,
                    kind: row.get(1)?,
                    period_key: row.get(2)?,
                    delivered_at: row.get(3)?,
                    outcome: row.get(4)?,
                    error: row.get(5)?,
                })
            })
            .map_err(|e| PledgerError::Storage(format!("Ledger query: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PledgerError::Storage(format!("Ledger row: {e}")))
    }

    // ─── Pending events ──────────────────────────────────────

    /// Enqueue an event-driven notification. Idempotent: re-enqueueing the
    /// same triple is a no-op. Returns true if a new event was queued.
    pub fn enqueue_event(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        period_key: &str,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO pending_events
                 (recipient_id, kind, period_key, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    recipient_id,
                    kind.as_str(),
                    period_key,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| PledgerError::Storage(format!("Event enqueue: {e}")))?;
        Ok(inserted > 0)
    }

    /// All events waiting for delivery, oldest first.
    pub fn pending_events(&self) -> Result<Vec<PendingEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, recipient_id, kind, period_key FROM pending_events ORDER BY id")
            .map_err(|e| PledgerError::Storage(format!("Event query: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| PledgerError::Storage(format!("Event query: {e}")))?;

        let mut events = Vec::new();
        for row in rows {
            let (id, recipient_id, kind_str, period_key) =
                row.map_err(|e| PledgerError::Storage(format!("Event row: {e}")))?;
            match NotificationKind::parse(&kind_str) {
                Some(kind) => events.push(PendingEvent {
                    id,
                    recipient_id,
                    kind,
                    period_key,
                }),
                None => {
                    tracing::warn!("⚠️ Dropping pending event {id} with unknown kind '{kind_str}'");
                }
            }
        }
        Ok(events)
    }

    /// Remove a drained event once a ledger row exists for it.
    pub fn remove_event(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM pending_events WHERE id = ?1", [id])
            .map_err(|e| PledgerError::Storage(format!("Event delete: {e}")))?;
        Ok(())
    }
}
