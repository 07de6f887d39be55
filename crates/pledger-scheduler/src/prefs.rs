//! Recipient notification preferences — the per-user configuration the
//! scheduler reads. Owned by the user's profile; the scheduler never
//! mutates it.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::kinds::{Frequency, NotificationKind};

/// A set of preferred weekdays, stored as one bit per day (Mon = bit 0).
///
/// Semantics: an EMPTY set means "no days selected, never fires" — not
/// "all days". Serialized as a list of lowercase weekday names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const fn empty() -> Self {
        WeekdaySet(0)
    }

    pub fn all() -> Self {
        WeekdaySet(0b0111_1111)
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        let mut set = Self::empty();
        for d in days {
            set.insert(*d);
        }
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        const ORDER: [Weekday; 7] = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        ORDER.into_iter().filter(|d| self.contains(*d))
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

impl From<WeekdaySet> for Vec<String> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().map(|d| weekday_name(d).to_string()).collect()
    }
}

impl TryFrom<Vec<String>> for WeekdaySet {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let mut set = WeekdaySet::empty();
        for name in &names {
            let day = parse_weekday(name).ok_or_else(|| format!("Unknown weekday: '{name}'"))?;
            set.insert(day);
        }
        Ok(set)
    }
}

/// Per-kind preferences: whether the kind fires, at what local time, on
/// which days, and (for weekly-cadence kinds) at what frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindPrefs {
    #[serde(default)]
    pub enabled: bool,
    /// Preferred local send time, always interpreted in the recipient's
    /// zone — never in server/UTC time. Only the hour is compared at the
    /// tick's resolution.
    pub send_at: NaiveTime,
    /// Days of week the kind may fire. Empty = never.
    #[serde(default)]
    pub days: WeekdaySet,
    /// Only meaningful for weekly-cadence kinds. Defaults to weekly.
    #[serde(default)]
    pub frequency: Option<Frequency>,
    /// Stride anchor for biweekly — the date the preference was set.
    #[serde(default)]
    pub anchor: Option<NaiveDate>,
}

impl KindPrefs {
    /// Enabled prefs firing at the given local hour on the given days.
    pub fn at(hour: u32, days: WeekdaySet) -> Self {
        Self {
            enabled: true,
            send_at: NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default(),
            days,
            frequency: None,
            anchor: None,
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency, anchor: NaiveDate) -> Self {
        self.frequency = Some(frequency);
        self.anchor = Some(anchor);
        self
    }
}

/// One recipient's full notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientNotificationConfig {
    pub recipient_id: String,
    /// Delivery address (email or webhook routing key — opaque to the core).
    pub address: String,
    #[serde(default)]
    pub org_id: Option<String>,
    /// IANA zone identifier, e.g. "Asia/Kolkata". Validated lazily;
    /// unknown zones fail closed at evaluation time.
    pub time_zone: String,
    #[serde(default)]
    pub kinds: HashMap<NotificationKind, KindPrefs>,
}

impl RecipientNotificationConfig {
    pub fn new(recipient_id: &str, address: &str, time_zone: &str) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            address: address.to_string(),
            org_id: None,
            time_zone: time_zone.to_string(),
            kinds: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: NotificationKind, prefs: KindPrefs) -> Self {
        self.kinds.insert(kind, prefs);
        self
    }

    pub fn prefs_for(&self, kind: NotificationKind) -> Option<&KindPrefs> {
        self.kinds.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_set_basics() {
        let mut set = WeekdaySet::empty();
        assert!(set.is_empty());
        set.insert(Weekday::Tue);
        set.insert(Weekday::Fri);
        assert!(set.contains(Weekday::Tue));
        assert!(!set.contains(Weekday::Mon));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_weekday_set_serde_names() {
        let set = WeekdaySet::from_days(&[Weekday::Mon, Weekday::Sun]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["monday","sunday"]"#);
        let back: WeekdaySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_weekday_set_rejects_unknown_name() {
        let result: Result<WeekdaySet, _> = serde_json::from_str(r#"["funday"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let config = RecipientNotificationConfig::new("u1", "u1@example.com", "Asia/Kolkata")
            .with_kind(
                NotificationKind::DailyBrief,
                KindPrefs::at(8, WeekdaySet::from_days(&[Weekday::Tue])),
            );
        let json = serde_json::to_string(&config).unwrap();
        let back: RecipientNotificationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.recipient_id, "u1");
        let prefs = back.prefs_for(NotificationKind::DailyBrief).unwrap();
        assert!(prefs.enabled);
        assert!(prefs.days.contains(Weekday::Tue));
    }
}
