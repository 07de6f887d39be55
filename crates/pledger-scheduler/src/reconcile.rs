//! Status-Transition Reconciler — the missed-commitment sweep.
//!
//! Runs on the same hourly trigger as the dispatcher. "Today" is evaluated
//! in the commitment's organization zone (falling back to the configured
//! default, normally UTC); a commitment is overdue once its due date is
//! strictly before that local today. The sweep sends nothing itself — it
//! enqueues one `promise_missed` event per transition and lets the
//! dispatch coordinator deliver it under the at-most-once ledger.
//!
//! Idempotent by construction: only Open rows are selected, and the
//! status update is guarded on Open, so re-running the sweep over an
//! already-Missed commitment is a no-op.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use pledger_core::error::Result;

use crate::kinds::NotificationKind;
use crate::ledger::DeliveryLedger;
use crate::store::CommitmentStore;
use crate::timezone;

pub struct MissedSweep {
    commitments: Arc<dyn CommitmentStore>,
    ledger: Arc<DeliveryLedger>,
    default_zone: String,
}

impl MissedSweep {
    pub fn new(
        commitments: Arc<dyn CommitmentStore>,
        ledger: Arc<DeliveryLedger>,
        default_zone: &str,
    ) -> Self {
        Self {
            commitments,
            ledger,
            default_zone: default_zone.to_string(),
        }
    }

    /// Transition every overdue Open commitment to Missed. Returns the ids
    /// that were transitioned by THIS run.
    pub fn sweep_missed(&self, now_utc: DateTime<Utc>) -> Result<Vec<String>> {
        let open = self.commitments.list_open()?;
        let mut transitioned = Vec::new();

        for commitment in open {
            let zone = commitment
                .org_time_zone
                .as_deref()
                .unwrap_or(&self.default_zone);
            let today = self.local_today(zone, now_utc);
            if commitment.due_date >= today {
                continue;
            }
            if !self.commitments.mark_missed(&commitment.id)? {
                // Another runner got there between list and update.
                continue;
            }
            tracing::info!(
                "📌 Commitment '{}' ({}) marked missed (due {}, today {} in {zone})",
                commitment.title,
                commitment.id,
                commitment.due_date,
                today
            );
            // The notification is a separate idempotent event; the ledger
            // keyed on the commitment id guarantees it goes out once.
            self.ledger.enqueue_event(
                &commitment.owner_id,
                NotificationKind::PromiseMissed,
                &commitment.id,
            )?;
            transitioned.push(commitment.id);
        }

        if !transitioned.is_empty() {
            tracing::info!("🧹 Sweep transitioned {} commitment(s)", transitioned.len());
        }
        Ok(transitioned)
    }

    /// Civil "today" in the given zone. Unknown zones fall back to the
    /// configured default, then UTC — a bad org zone must not stall the
    /// whole sweep.
    fn local_today(&self, zone: &str, now_utc: DateTime<Utc>) -> NaiveDate {
        if let Some(tz) = timezone::resolve_zone(zone) {
            return timezone::local_at(tz, now_utc).date_naive();
        }
        if zone != self.default_zone {
            if let Some(tz) = timezone::resolve_zone(&self.default_zone) {
                return timezone::local_at(tz, now_utc).date_naive();
            }
        }
        now_utc.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CommitmentStatus, PledgerDb};
    use chrono::TimeZone;

    fn setup() -> (Arc<PledgerDb>, Arc<DeliveryLedger>, MissedSweep) {
        let db = Arc::new(PledgerDb::open_in_memory().unwrap());
        let ledger = Arc::new(DeliveryLedger::open_in_memory().unwrap());
        let sweep = MissedSweep::new(db.clone(), ledger.clone(), "UTC");
        (db, ledger, sweep)
    }

    #[test]
    fn test_overdue_open_commitment_transitions_once() {
        let (db, ledger, sweep) = setup();
        db.insert_commitment(
            "c1",
            "u1",
            None,
            "ship it",
            NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
        )
        .unwrap();

        let now = Utc.with_ymd_and_hms(2023, 10, 10, 12, 0, 0).unwrap();
        let first = sweep.sweep_missed(now).unwrap();
        assert_eq!(first, vec!["c1".to_string()]);
        assert_eq!(
            db.commitment_status("c1").unwrap(),
            Some(CommitmentStatus::Missed)
        );

        // Second run: zero transitions for that commitment.
        let second = sweep.sweep_missed(now).unwrap();
        assert!(second.is_empty());

        // Exactly one promise_missed event was enqueued.
        let events = ledger.pending_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NotificationKind::PromiseMissed);
        assert_eq!(events[0].period_key, "c1");
    }

    #[test]
    fn test_due_today_is_not_overdue() {
        let (db, _ledger, sweep) = setup();
        db.insert_commitment(
            "c1",
            "u1",
            None,
            "due today",
            NaiveDate::from_ymd_opt(2023, 10, 10).unwrap(),
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 23, 0, 0).unwrap();
        assert!(sweep.sweep_missed(now).unwrap().is_empty());
    }

    #[test]
    fn test_org_zone_decides_today() {
        let (db, _ledger, sweep) = setup();
        db.upsert_org("acme", "Acme", Some("Asia/Kolkata")).unwrap();
        // Due Oct 9. At 20:00 UTC on Oct 9 it is already Oct 10 in
        // Kolkata (+05:30) — overdue there, not yet in UTC.
        db.insert_commitment(
            "c1",
            "u1",
            Some("acme"),
            "tz-sensitive",
            NaiveDate::from_ymd_opt(2023, 10, 9).unwrap(),
        )
        .unwrap();
        db.insert_commitment(
            "c2",
            "u2",
            None,
            "utc org",
            NaiveDate::from_ymd_opt(2023, 10, 9).unwrap(),
        )
        .unwrap();

        let now = Utc.with_ymd_and_hms(2023, 10, 9, 20, 0, 0).unwrap();
        let transitioned = sweep.sweep_missed(now).unwrap();
        assert_eq!(transitioned, vec!["c1".to_string()]);
        assert_eq!(
            db.commitment_status("c2").unwrap(),
            Some(CommitmentStatus::Open)
        );
    }

    #[test]
    fn test_bad_org_zone_falls_back_to_default() {
        let (db, _ledger, sweep) = setup();
        db.upsert_org("weird", "Weird", Some("Not/A_Zone")).unwrap();
        db.insert_commitment(
            "c1",
            "u1",
            Some("weird"),
            "bad zone",
            NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 0, 30, 0).unwrap();
        // Still swept, evaluated in the UTC default.
        assert_eq!(sweep.sweep_missed(now).unwrap().len(), 1);
    }

    #[test]
    fn test_non_open_statuses_untouched() {
        let (db, ledger, sweep) = setup();
        db.insert_commitment(
            "c1",
            "u1",
            None,
            "already missed",
            NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
        )
        .unwrap();
        // Pre-transition it out of Open.
        assert!(db.mark_missed("c1").unwrap());

        let now = Utc.with_ymd_and_hms(2023, 10, 10, 12, 0, 0).unwrap();
        assert!(sweep.sweep_missed(now).unwrap().is_empty());
        assert!(ledger.pending_events().unwrap().is_empty());
    }
}
