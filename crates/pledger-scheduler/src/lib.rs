//! # Pledger Scheduler
//!
//! The recurring notification core: decides, for every hourly tick, which
//! recipients get which notifications given their own IANA time zone,
//! preferred local send hour, and preferred weekdays — and never sends the
//! same (recipient, kind, period) twice.
//!
//! ## Design Principles
//! - One authoritative time-zone conversion (real IANA rules via chrono-tz,
//!   never fixed offsets)
//! - SQLite delivery log with a unique constraint as the sole source of
//!   truth for "already sent"
//! - Per-recipient failure isolation — one bad mailbox never aborts a tick
//! - Pure eligibility evaluation — testable without a database or transport
//!
//! ## Architecture
//! ```text
//! hourly trigger → DispatchCoordinator::run_tick(now_utc)
//!   ├── ConfigSource: load all recipient notification configs
//!   ├── eligibility::due_notifications → [(recipient, kind, period_key)]
//!   │     └── timezone::is_due_now (civil time in recipient zone)
//!   ├── DeliveryLedger: has_sent fast-path, then send, then
//!   │     record_attempt (duplicate-key = someone else already sent)
//!   └── DeliveryTransport: email / webhook / log
//!
//! same trigger → MissedSweep::sweep_missed(now_utc)
//!   ├── CommitmentStore: Open rows overdue in the org's zone → Missed
//!   └── enqueues one promise_missed event per transition
//! ```

pub mod dispatch;
pub mod eligibility;
pub mod kinds;
pub mod ledger;
pub mod prefs;
pub mod reconcile;
pub mod store;
pub mod timezone;
pub mod transport;

pub use dispatch::{DispatchCoordinator, TickReport};
pub use eligibility::{DueItem, due_notifications, period_key};
pub use kinds::{Cadence, Frequency, NotificationKind};
pub use ledger::{DeliveryLedger, DeliveryRecord, Outcome, RecordOutcome};
pub use prefs::{KindPrefs, RecipientNotificationConfig, WeekdaySet};
pub use reconcile::MissedSweep;
pub use store::{Commitment, CommitmentStatus, CommitmentStore, ConfigSource, PledgerDb};
pub use transport::{DeliveryTransport, EmailTransport, LogTransport, Payload, WebhookTransport};
