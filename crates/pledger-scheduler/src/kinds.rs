//! Notification kinds — the closed enumeration of everything Pledger sends.

use serde::{Deserialize, Serialize};

/// Every notification Pledger can deliver.
///
/// The first four are clock-driven: the scheduler fires them when a
/// recipient's configured local time matches the tick. The rest are
/// event-driven — fired by promise lifecycle transitions elsewhere — and
/// are listed here because they share the delivery log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DailyBrief,
    WeeklyReminder,
    LeaderDailyRadar,
    LeaderWeeklyReport,
    PromiseCreated,
    PromiseClosed,
    PromiseMissed,
    ReviewNeeded,
    PromiseVerified,
    CompletionRejected,
}

/// Intrinsic cadence of a clock-driven kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
}

/// How often a weekly-cadence kind actually fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl NotificationKind {
    /// The kinds the clock tick evaluates. Event kinds never appear here.
    pub const CLOCK_DRIVEN: [NotificationKind; 4] = [
        NotificationKind::DailyBrief,
        NotificationKind::WeeklyReminder,
        NotificationKind::LeaderDailyRadar,
        NotificationKind::LeaderWeeklyReport,
    ];

    pub fn is_clock_driven(&self) -> bool {
        Self::CLOCK_DRIVEN.contains(self)
    }

    /// Cadence for clock-driven kinds; event kinds have none.
    pub fn cadence(&self) -> Option<Cadence> {
        match self {
            NotificationKind::DailyBrief | NotificationKind::LeaderDailyRadar => {
                Some(Cadence::Daily)
            }
            NotificationKind::WeeklyReminder | NotificationKind::LeaderWeeklyReport => {
                Some(Cadence::Weekly)
            }
            _ => None,
        }
    }

    /// Stable snake_case name used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DailyBrief => "daily_brief",
            NotificationKind::WeeklyReminder => "weekly_reminder",
            NotificationKind::LeaderDailyRadar => "leader_daily_radar",
            NotificationKind::LeaderWeeklyReport => "leader_weekly_report",
            NotificationKind::PromiseCreated => "promise_created",
            NotificationKind::PromiseClosed => "promise_closed",
            NotificationKind::PromiseMissed => "promise_missed",
            NotificationKind::ReviewNeeded => "review_needed",
            NotificationKind::PromiseVerified => "promise_verified",
            NotificationKind::CompletionRejected => "completion_rejected",
        }
    }

    /// Parse a database/wire name back into a kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily_brief" => Some(NotificationKind::DailyBrief),
            "weekly_reminder" => Some(NotificationKind::WeeklyReminder),
            "leader_daily_radar" => Some(NotificationKind::LeaderDailyRadar),
            "leader_weekly_report" => Some(NotificationKind::LeaderWeeklyReport),
            "promise_created" => Some(NotificationKind::PromiseCreated),
            "promise_closed" => Some(NotificationKind::PromiseClosed),
            "promise_missed" => Some(NotificationKind::PromiseMissed),
            "review_needed" => Some(NotificationKind::ReviewNeeded),
            "promise_verified" => Some(NotificationKind::PromiseVerified),
            "completion_rejected" => Some(NotificationKind::CompletionRejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_driven_split() {
        assert!(NotificationKind::DailyBrief.is_clock_driven());
        assert!(NotificationKind::LeaderWeeklyReport.is_clock_driven());
        assert!(!NotificationKind::PromiseMissed.is_clock_driven());
        assert!(NotificationKind::PromiseMissed.cadence().is_none());
    }

    #[test]
    fn test_name_round_trip() {
        for kind in [
            NotificationKind::DailyBrief,
            NotificationKind::WeeklyReminder,
            NotificationKind::LeaderDailyRadar,
            NotificationKind::LeaderWeeklyReport,
            NotificationKind::PromiseCreated,
            NotificationKind::PromiseClosed,
            NotificationKind::PromiseMissed,
            NotificationKind::ReviewNeeded,
            NotificationKind::PromiseVerified,
            NotificationKind::CompletionRejected,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::parse("bogus"), None);
    }
}
