//! Time-Zone Resolver — the single authoritative local-time conversion.
//!
//! Every due-now decision in the system goes through this module. It uses
//! the real IANA zone database (chrono-tz), so daylight-saving transitions
//! are handled exactly as the zone rules say; a fixed numeric offset cached
//! at configuration time is the defect class this module exists to prevent.
//!
//! A tick is hourly, so the contract compares hour-of-day only: the tick is
//! due iff its UTC hour, observed in the recipient's zone, lands on the
//! configured local hour on a configured weekday.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::prefs::KindPrefs;

/// Parse an IANA zone name. Unknown zones log a configuration warning and
/// return None — callers must fail closed (treat as not due), never crash.
pub fn resolve_zone(name: &str) -> Option<Tz> {
    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            tracing::warn!("🌐 Unknown IANA zone '{name}' — recipient treated as never due");
            None
        }
    }
}

/// Observe a UTC instant as civil wall-clock time in the given zone.
pub fn local_at(zone: Tz, now_utc: DateTime<Utc>) -> DateTime<Tz> {
    now_utc.with_timezone(&zone)
}

/// Is this tick inside the recipient's due window for these preferences?
///
/// Empty preferred-day sets never fire. Unknown zones never fire.
pub fn is_due_now(prefs: &KindPrefs, zone_name: &str, now_utc: DateTime<Utc>) -> bool {
    if prefs.days.is_empty() {
        return false;
    }
    let Some(tz) = resolve_zone(zone_name) else {
        return false;
    };
    let local = local_at(tz, now_utc);
    prefs.days.contains(local.weekday()) && local.hour() == prefs.send_at.hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::WeekdaySet;
    use chrono::{TimeZone, Weekday};

    fn tuesday_8am() -> KindPrefs {
        KindPrefs::at(8, WeekdaySet::from_days(&[Weekday::Tue]))
    }

    #[test]
    fn test_kolkata_due_at_local_8am() {
        // 02:30 UTC = 08:00 IST (+05:30), Tuesday 2023-10-10
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        assert!(is_due_now(&tuesday_8am(), "Asia/Kolkata", now));
    }

    #[test]
    fn test_kolkata_wrong_hour() {
        // 03:30 UTC = 09:00 IST — one hour late
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 3, 30, 0).unwrap();
        assert!(!is_due_now(&tuesday_8am(), "Asia/Kolkata", now));
    }

    #[test]
    fn test_kolkata_wrong_day() {
        // 2023-10-13 is a Friday, not in the preferred set
        let now = Utc.with_ymd_and_hms(2023, 10, 13, 2, 30, 0).unwrap();
        assert!(!is_due_now(&tuesday_8am(), "Asia/Kolkata", now));
    }

    #[test]
    fn test_empty_days_never_due() {
        let prefs = KindPrefs::at(8, WeekdaySet::empty());
        // scan a full week of hourly ticks
        let start = Utc.with_ymd_and_hms(2023, 10, 9, 0, 0, 0).unwrap();
        for h in 0..(24 * 7) {
            let now = start + chrono::Duration::hours(h);
            assert!(!is_due_now(&prefs, "Asia/Kolkata", now));
        }
    }

    #[test]
    fn test_unknown_zone_fails_closed() {
        let prefs = KindPrefs::at(8, WeekdaySet::all());
        let now = Utc.with_ymd_and_hms(2023, 10, 10, 2, 30, 0).unwrap();
        assert!(!is_due_now(&prefs, "Mars/Olympus_Mons", now));
    }

    #[test]
    fn test_spring_forward_uses_zone_rules() {
        // America/New_York, 2024-03-10: 02:00 EST jumps to 03:00 EDT.
        let tz: Tz = "America/New_York".parse().unwrap();
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 6, 30, 0).unwrap();
        assert_eq!(local_at(tz, before).hour(), 1); // 01:30 EST (-5)
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap();
        // A fixed -5 offset would say 02:30; the zone says 03:30 EDT.
        assert_eq!(local_at(tz, after).hour(), 3);
    }

    #[test]
    fn test_fall_back_repeats_local_hour() {
        // America/New_York, 2024-11-03: 02:00 EDT falls back to 01:00 EST,
        // so two distinct UTC instants observe local hour 1. Both are "due"
        // for an 01:00 preference; the delivery log's period key is what
        // prevents a double send.
        let tz: Tz = "America/New_York".parse().unwrap();
        let first = Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap(); // 01:30 EDT
        let second = Utc.with_ymd_and_hms(2024, 11, 3, 6, 30, 0).unwrap(); // 01:30 EST
        assert_eq!(local_at(tz, first).hour(), 1);
        assert_eq!(local_at(tz, second).hour(), 1);
        assert_eq!(
            local_at(tz, first).date_naive(),
            local_at(tz, second).date_naive()
        );
    }

    #[test]
    fn test_local_weekday_not_utc_weekday() {
        // 18:30 UTC Monday = 00:00 Tuesday in Kolkata. The preference is
        // for local Tuesday; comparing against the UTC weekday would skip it.
        let prefs = KindPrefs::at(0, WeekdaySet::from_days(&[Weekday::Tue]));
        let now = Utc.with_ymd_and_hms(2023, 10, 9, 18, 30, 0).unwrap();
        assert_eq!(now.weekday(), Weekday::Mon);
        assert!(is_due_now(&prefs, "Asia/Kolkata", now));
    }
}
