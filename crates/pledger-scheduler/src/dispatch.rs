//! Dispatch Coordinator — one tick: evaluate, fan out, record.
//!
//! Ordering per delivery is check → send → record: the in-process
//! `has_sent` check is only a fast path to avoid pointless transport
//! calls; the authoritative at-most-once claim is the ledger insert, whose
//! unique constraint turns a lost race into `RecordOutcome::Duplicate`.
//!
//! A transport failure for one recipient never aborts the tick — it is
//! recorded as a failed delivery row and the tick continues. There is no
//! in-tick retry: a failed daily brief is not resent later the same day.
//! The only fatal condition is failing to load configuration data.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;

use pledger_core::error::Result;

use crate::eligibility::{self, DueItem};
use crate::ledger::{DeliveryLedger, Outcome, RecordOutcome};
use crate::prefs::RecipientNotificationConfig;
use crate::store::ConfigSource;
use crate::transport::{DeliveryTransport, Payload};

/// What one tick did.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TickReport {
    /// Transport calls actually made (sent + failed).
    pub attempted: usize,
    pub sent: usize,
    /// Items already present in the delivery log for this period.
    pub skipped_duplicate: usize,
    pub failed: usize,
}

impl TickReport {
    /// Everything the tick evaluated to a terminal state.
    pub fn processed(&self) -> usize {
        self.sent + self.skipped_duplicate + self.failed
    }

    pub fn summary(&self) -> String {
        format!(
            "{} sent, {} duplicate-skipped, {} failed",
            self.sent, self.skipped_duplicate, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryStatus {
    Sent,
    SkippedDuplicate,
    Failed,
    /// Event suppressed by recipient preference — nothing attempted,
    /// nothing recorded.
    Suppressed,
}

/// A due item plus, for event-driven notifications, the queue row to
/// remove once a ledger row exists.
struct Deliverable {
    item: DueItem,
    event_id: Option<i64>,
}

/// Fans out one tick's eligible notifications across all tenants.
pub struct DispatchCoordinator {
    configs: Arc<dyn ConfigSource>,
    ledger: Arc<DeliveryLedger>,
    transport: Arc<dyn DeliveryTransport>,
    max_concurrent: usize,
}

impl DispatchCoordinator {
    pub fn new(
        configs: Arc<dyn ConfigSource>,
        ledger: Arc<DeliveryLedger>,
        transport: Arc<dyn DeliveryTransport>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            configs,
            ledger,
            transport,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run one tick for the given UTC instant.
    ///
    /// Safe to invoke twice for the same instant (or overlapping windows):
    /// the ledger guarantees no recipient receives a duplicate for the
    /// same period.
    pub async fn run_tick(&self, now_utc: DateTime<Utc>) -> Result<TickReport> {
        let configs = self.configs.load_all()?; // fatal for the tick
        tracing::info!(
            "⏰ Tick {} — {} recipient config(s)",
            now_utc.to_rfc3339(),
            configs.len()
        );

        let mut deliverables: Vec<Deliverable> =
            eligibility::due_notifications(&configs, now_utc)
                .into_iter()
                .map(|item| Deliverable {
                    item,
                    event_id: None,
                })
                .collect();

        // Drain event-driven notifications queued by lifecycle transitions.
        for event in self.ledger.pending_events()? {
            let config = configs
                .iter()
                .find(|c| c.recipient_id == event.recipient_id);
            let address = match config {
                Some(c) => c.address.clone(),
                None => String::new(), // recorded as failed below
            };
            deliverables.push(Deliverable {
                item: DueItem {
                    recipient_id: event.recipient_id,
                    address,
                    kind: event.kind,
                    period_key: event.period_key,
                },
                event_id: Some(event.id),
            });
        }

        let suppressed: Vec<bool> = deliverables
            .iter()
            .map(|d| self.is_suppressed(&configs, d))
            .collect();

        let results: Vec<DeliveryStatus> = futures::stream::iter(
            deliverables
                .into_iter()
                .zip(suppressed)
                .map(|(d, suppress)| self.deliver(d, suppress, now_utc)),
        )
        .buffer_unordered(self.max_concurrent)
        .collect()
        .await;

        let mut report = TickReport::default();
        for status in results {
            match status {
                DeliveryStatus::Sent => {
                    report.sent += 1;
                    report.attempted += 1;
                }
                DeliveryStatus::Failed => {
                    report.failed += 1;
                    report.attempted += 1;
                }
                DeliveryStatus::SkippedDuplicate => report.skipped_duplicate += 1,
                DeliveryStatus::Suppressed => {}
            }
        }
        tracing::info!("🏁 Tick done: {}", report.summary());
        Ok(report)
    }

    /// Event kinds default to enabled; an explicit disabled preference
    /// for the kind suppresses the event without a ledger row.
    fn is_suppressed(
        &self,
        configs: &[RecipientNotificationConfig],
        deliverable: &Deliverable,
    ) -> bool {
        if deliverable.event_id.is_none() || deliverable.item.kind.is_clock_driven() {
            return false;
        }
        configs
            .iter()
            .find(|c| c.recipient_id == deliverable.item.recipient_id)
            .and_then(|c| c.prefs_for(deliverable.item.kind))
            .is_some_and(|prefs| !prefs.enabled)
    }

    async fn deliver(
        &self,
        deliverable: Deliverable,
        suppress: bool,
        now_utc: DateTime<Utc>,
    ) -> DeliveryStatus {
        let Deliverable { item, event_id } = deliverable;

        if suppress {
            tracing::debug!(
                "🔕 [{}] suppressed for {} (disabled by preference)",
                item.kind,
                item.recipient_id
            );
            self.remove_event(event_id);
            return DeliveryStatus::Suppressed;
        }

        // Fast path — avoids a transport call, but is not the guarantee.
        match self
            .ledger
            .has_sent(&item.recipient_id, item.kind, &item.period_key)
        {
            Ok(true) => {
                tracing::debug!(
                    "⏭️ [{}] {} already delivered for {}",
                    item.kind,
                    item.recipient_id,
                    item.period_key
                );
                self.remove_event(event_id);
                return DeliveryStatus::SkippedDuplicate;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!("⚠️ Ledger check failed for {}: {e}", item.recipient_id);
                return DeliveryStatus::Failed;
            }
        }

        let send_result = if item.address.is_empty() {
            Err("unknown recipient (no configuration)".to_string())
        } else {
            let payload = Payload::for_kind(item.kind, &item.period_key);
            self.transport
                .send(&item.address, item.kind, &payload)
                .await
        };

        let outcome = match &send_result {
            Ok(()) => Outcome::Sent,
            Err(reason) => {
                tracing::warn!(
                    "⚠️ [{}] delivery to {} failed: {reason}",
                    item.kind,
                    item.recipient_id
                );
                Outcome::Failed(reason.clone())
            }
        };

        let status = match self.ledger.record_attempt(
            &item.recipient_id,
            item.kind,
            &item.period_key,
            now_utc,
            &outcome,
        ) {
            // Lost the race: a concurrent runner already claimed this
            // period. Someone sent it — not a duplicate delivery.
            Ok(RecordOutcome::Duplicate) => DeliveryStatus::SkippedDuplicate,
            Ok(RecordOutcome::Recorded) => match outcome {
                Outcome::Sent => DeliveryStatus::Sent,
                Outcome::Failed(_) => DeliveryStatus::Failed,
            },
            Err(e) => {
                tracing::error!("⚠️ Ledger write failed for {}: {e}", item.recipient_id);
                return DeliveryStatus::Failed; // keep the event queued
            }
        };

        self.remove_event(event_id);
        status
    }

    fn remove_event(&self, event_id: Option<i64>) {
        if let Some(id) = event_id {
            if let Err(e) = self.ledger.remove_event(id) {
                tracing::warn!("⚠️ Failed to remove drained event {id}: {e}");
            }
        }
    }
}
