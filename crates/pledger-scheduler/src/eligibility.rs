//! Eligibility Evaluator — pure function from (configs, now) to due items.
//!
//! No side effects and no I/O here: the dispatch coordinator owns the
//! delivery log and the transport. Keeping this pure is what makes the
//! calendar math independently testable.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::kinds::{Cadence, Frequency, NotificationKind};
use crate::prefs::{KindPrefs, RecipientNotificationConfig};
use crate::timezone;

/// One notification that must fire this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueItem {
    pub recipient_id: String,
    pub address: String,
    pub kind: NotificationKind,
    /// Canonical identifier of this occurrence — the de-duplication key
    /// component. Local date for daily cadence, ISO week for weekly,
    /// year-month for monthly.
    pub period_key: String,
}

/// Evaluate every enabled clock-driven kind of every recipient against the
/// current tick. Recipients with unknown zones are skipped (fail closed).
pub fn due_notifications(
    configs: &[RecipientNotificationConfig],
    now_utc: DateTime<Utc>,
) -> Vec<DueItem> {
    let mut due = Vec::new();
    for config in configs {
        let Some(tz) = timezone::resolve_zone(&config.time_zone) else {
            continue;
        };
        let local_date = timezone::local_at(tz, now_utc).date_naive();

        for (&kind, prefs) in &config.kinds {
            if !kind.is_clock_driven() || !prefs.enabled {
                continue;
            }
            if !timezone::is_due_now(prefs, &config.time_zone, now_utc) {
                continue;
            }
            if !frequency_due(kind, prefs, local_date) {
                continue;
            }
            due.push(DueItem {
                recipient_id: config.recipient_id.clone(),
                address: config.address.clone(),
                kind,
                period_key: period_key(kind, prefs.frequency, local_date),
            });
        }
    }
    due
}

/// Does the frequency stride allow this occurrence?
///
/// Daily-cadence kinds have no stride. Weekly-cadence kinds default to
/// every week; biweekly fires on whole-ISO-week strides from the stored
/// anchor; monthly fires on the first matching weekday of the month.
fn frequency_due(kind: NotificationKind, prefs: &KindPrefs, local_date: NaiveDate) -> bool {
    match kind.cadence() {
        Some(Cadence::Daily) | None => true,
        Some(Cadence::Weekly) => match prefs.frequency.unwrap_or(Frequency::Weekly) {
            Frequency::Weekly => true,
            Frequency::Biweekly => {
                let anchor = prefs.anchor.unwrap_or(EPOCH_MONDAY);
                (week_index(local_date) - week_index(anchor)).rem_euclid(2) == 0
            }
            Frequency::Monthly => local_date.day() <= 7,
        },
    }
}

/// 1970-01-05, the first Monday of the Unix epoch — stride origin when a
/// biweekly preference has no stored anchor.
const EPOCH_MONDAY: NaiveDate = match NaiveDate::from_ymd_opt(1970, 1, 5) {
    Some(d) => d,
    None => panic!("epoch monday"),
};

/// Whole weeks elapsed since the epoch Monday for the week containing `d`.
fn week_index(d: NaiveDate) -> i64 {
    (d - EPOCH_MONDAY).num_days().div_euclid(7)
}

/// Compute the canonical period key for an occurrence.
///
/// Stable: the same (kind, frequency, local date) always yields the same
/// key. Distinct real-world occurrences always yield distinct keys because
/// the local calendar period is part of the key.
pub fn period_key(
    kind: NotificationKind,
    frequency: Option<Frequency>,
    local_date: NaiveDate,
) -> String {
    match kind.cadence() {
        // Event kinds key on the triggering entity id, not the calendar —
        // falling back to the date here keeps the function total.
        Some(Cadence::Daily) | None => local_date.format("%Y-%m-%d").to_string(),
        Some(Cadence::Weekly) => match frequency.unwrap_or(Frequency::Weekly) {
            Frequency::Weekly | Frequency::Biweekly => {
                let week = local_date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Frequency::Monthly => local_date.format("%Y-%m").to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::WeekdaySet;
    use chrono::{TimeZone, Weekday};

    fn base_config() -> RecipientNotificationConfig {
        RecipientNotificationConfig::new("u1", "u1@example.com", "Asia/Kolkata")
    }

    #[test]
    fn test_due_item_for_matching_tick() {
        let config = base_config().with_kind(
            NotificationKind::DailyBrief,
            KindPrefs::at(8, WeekdaySet::from_days(&[Weekday::Tue])),
        );
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        let due = due_notifications(&[config], now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, NotificationKind::DailyBrief);
        // period key is the LOCAL date, not the UTC date
        assert_eq!(due[0].period_key, "2023-10-10");
    }

    #[test]
    fn test_disabled_kind_not_due() {
        let mut prefs = KindPrefs::at(8, WeekdaySet::from_days(&[Weekday::Tue]));
        prefs.enabled = false;
        let config = base_config().with_kind(NotificationKind::DailyBrief, prefs);
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        assert!(due_notifications(&[config], now).is_empty());
    }

    #[test]
    fn test_event_kind_ignored_by_clock() {
        let config = base_config().with_kind(
            NotificationKind::PromiseMissed,
            KindPrefs::at(8, WeekdaySet::all()),
        );
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        assert!(due_notifications(&[config], now).is_empty());
    }

    #[test]
    fn test_biweekly_skips_alternate_weeks() {
        // Anchor on Monday 2023-10-02; the week of Oct 10 is stride 1 (off),
        // the week of Oct 17 is stride 2 (on).
        let anchor = NaiveDate::from_ymd_opt(2023, 10, 2).unwrap();
        let prefs = KindPrefs::at(8, WeekdaySet::from_days(&[Weekday::Tue]))
            .with_frequency(Frequency::Biweekly, anchor);
        let config = base_config().with_kind(NotificationKind::WeeklyReminder, prefs);

        let off_week = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        assert!(due_notifications(std::slice::from_ref(&config), off_week).is_empty());

        let on_week = Utc.with_ymd_and_hms(2023, 10, 17, 2, 30, 0).unwrap();
        let due = due_notifications(&[config], on_week);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].period_key, "2023-W42");
    }

    #[test]
    fn test_monthly_fires_first_matching_weekday_only() {
        let prefs = KindPrefs::at(8, WeekdaySet::from_days(&[Weekday::Tue])).with_frequency(
            Frequency::Monthly,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        );
        let config = base_config().with_kind(NotificationKind::WeeklyReminder, prefs);

        // First Tuesday of October 2023 is the 3rd
        let first = Utc.with_ymd_and_hms(2023, 10, 3, 2, 30, 0).unwrap();
        let due = due_notifications(std::slice::from_ref(&config), first);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].period_key, "2023-10");

        // Second Tuesday (the 10th) must not fire
        let second = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        assert!(due_notifications(&[config], second).is_empty());
    }

    #[test]
    fn test_period_key_stable_and_distinct() {
        let d1 = NaiveDate::from_ymd_opt(2023, 10, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2023, 10, 17).unwrap();
        let k1a = period_key(NotificationKind::DailyBrief, None, d1);
        let k1b = period_key(NotificationKind::DailyBrief, None, d1);
        assert_eq!(k1a, k1b);
        assert_ne!(k1a, period_key(NotificationKind::DailyBrief, None, d2));
        // two different Tuesdays land in different ISO weeks
        assert_ne!(
            period_key(NotificationKind::WeeklyReminder, None, d1),
            period_key(NotificationKind::WeeklyReminder, None, d2)
        );
    }

    #[test]
    fn test_iso_week_key_across_year_boundary() {
        // 2024-12-30 (Monday) belongs to ISO week 2025-W01
        let d = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(period_key(NotificationKind::WeeklyReminder, None, d), "2025-W01");
    }

    #[test]
    fn test_unknown_zone_recipient_skipped() {
        let mut config = base_config().with_kind(
            NotificationKind::DailyBrief,
            KindPrefs::at(8, WeekdaySet::all()),
        );
        config.time_zone = "Not/A_Zone".into();
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        assert!(due_notifications(&[config], now).is_empty());
    }
}
