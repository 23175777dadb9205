//! Drain domain models and derived schedule status.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::schedule::{self, APPROACHING_THRESHOLD_DAYS, NEVER_CLEANED_DAYS};

/// Ordinal priority of a drain. `Large` is the highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DrainCategory {
    Large,
    Medium,
    Small,
}

/// One logged maintenance event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningRecord {
    pub id: String,
    #[serde(with = "wire_date")]
    pub date: NaiveDate,
    pub notes: String,
    pub performer: String,
}

/// A tracked stormwater channel with its cleaning history.
///
/// `history` is kept newest first: every append prepends, so index 0 is the
/// latest cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drain {
    pub id: String,
    pub name: String,
    pub location: String,
    pub category: DrainCategory,
    #[serde(default)]
    pub history: Vec<CleaningRecord>,
    pub frequency_days: u32,
}

/// Replaceable fields of a drain: everything except id and history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainFields {
    pub name: String,
    pub location: String,
    pub category: DrainCategory,
    pub frequency_days: u32,
}

/// Derived schedule status. Computed at read time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainStatus {
    pub days_since_last_cleaning: i64,
    pub days_remaining: i64,
    pub overdue: bool,
    pub approaching: bool,
    pub health_percentage: f64,
}

/// Per-category drain counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub large: usize,
    pub medium: usize,
    pub small: usize,
}

/// Aggregate registry counts for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainStats {
    pub total: usize,
    pub by_category: CategoryCounts,
    pub overdue: usize,
    /// Share of drains that are not overdue, rounded to a whole percent.
    pub system_health_percentage: u32,
}

impl Drain {
    /// Latest cleaning, if any.
    pub fn last_cleaning(&self) -> Option<&CleaningRecord> {
        self.history.first()
    }

    /// Schedule status relative to an explicit `today`.
    ///
    /// A drain with no history counts as elapsed days = 999 and is always
    /// overdue regardless of its frequency.
    pub fn status_on(&self, today: NaiveDate) -> DrainStatus {
        let days_since_last_cleaning = match self.last_cleaning() {
            Some(record) => schedule::days_since(record.date, today),
            None => NEVER_CLEANED_DAYS,
        };
        let days_remaining = i64::from(self.frequency_days) - days_since_last_cleaning;
        let overdue = match self.last_cleaning() {
            Some(record) => schedule::is_overdue(record.date, self.frequency_days, today),
            None => true,
        };
        let approaching = match self.last_cleaning() {
            Some(record) => schedule::is_approaching(
                record.date,
                self.frequency_days,
                APPROACHING_THRESHOLD_DAYS,
                today,
            ),
            None => false,
        };
        let progress =
            (days_since_last_cleaning as f64 / f64::from(self.frequency_days) * 100.0).min(100.0);
        let health_percentage = (100.0 - progress).max(0.0);

        DrainStatus {
            days_since_last_cleaning,
            days_remaining,
            overdue,
            approaching,
            health_percentage,
        }
    }

    /// Schedule status relative to the local calendar date.
    pub fn status(&self) -> DrainStatus {
        self.status_on(schedule::today())
    }
}

mod wire_date {
    //! Day-granularity date format for the wire: serialized as `YYYY-MM-DD`,
    //! deserialized leniently so timestamps from older payloads are truncated
    //! to their date part.

    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        crate::schedule::parse_day(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid calendar date: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn drain_with_last_cleaning(last: Option<NaiveDate>, frequency_days: u32) -> Drain {
        let history = last
            .map(|date| {
                vec![CleaningRecord {
                    id: "r1".to_string(),
                    date,
                    notes: String::new(),
                    performer: "crew".to_string(),
                }]
            })
            .unwrap_or_default();
        Drain {
            id: "d1".to_string(),
            name: "Main St".to_string(),
            location: "North side".to_string(),
            category: DrainCategory::Large,
            history,
            frequency_days,
        }
    }

    #[test]
    fn never_cleaned_is_always_overdue_with_zero_health() {
        let today = day(2026, 8, 21);
        let drain = drain_with_last_cleaning(None, 30);
        let status = drain.status_on(today);
        assert_eq!(status.days_since_last_cleaning, 999);
        assert!(status.overdue);
        assert!(!status.approaching);
        assert_eq!(status.health_percentage, 0.0);
    }

    #[test]
    fn never_cleaned_is_overdue_even_for_huge_frequencies() {
        let today = day(2026, 8, 21);
        let drain = drain_with_last_cleaning(None, 2000);
        assert!(drain.status_on(today).overdue);
        assert!(!drain.status_on(today).approaching);
    }

    #[test]
    fn cleaned_today_is_fully_healthy() {
        let today = day(2026, 8, 21);
        let drain = drain_with_last_cleaning(Some(today), 30);
        let status = drain.status_on(today);
        assert_eq!(status.days_since_last_cleaning, 0);
        assert!(!status.overdue);
        assert!(!status.approaching);
        assert_eq!(status.health_percentage, 100.0);
    }

    #[test]
    fn health_degrades_linearly_and_floors_at_zero() {
        let today = day(2026, 8, 21);
        let half_way = drain_with_last_cleaning(Some(today - Duration::days(15)), 30);
        assert_eq!(half_way.status_on(today).health_percentage, 50.0);

        let way_past = drain_with_last_cleaning(Some(today - Duration::days(90)), 30);
        assert_eq!(way_past.status_on(today).health_percentage, 0.0);
    }

    #[test]
    fn approaching_window_sits_between_healthy_and_overdue() {
        let today = day(2026, 8, 21);
        let frequency = 30;

        let approaching = drain_with_last_cleaning(Some(today - Duration::days(27)), frequency);
        let status = approaching.status_on(today);
        assert_eq!(status.days_remaining, 3);
        assert!(status.approaching);
        assert!(!status.overdue);

        let at_limit = drain_with_last_cleaning(Some(today - Duration::days(30)), frequency);
        let status = at_limit.status_on(today);
        assert_eq!(status.days_remaining, 0);
        assert!(status.approaching);
        assert!(!status.overdue);

        let past_limit = drain_with_last_cleaning(Some(today - Duration::days(31)), frequency);
        let status = past_limit.status_on(today);
        assert!(status.overdue);
        assert!(!status.approaching);
    }

    #[test]
    fn wire_format_uses_camel_case_and_plain_dates() {
        let drain = drain_with_last_cleaning(Some(day(2026, 8, 1)), 14);
        let json = serde_json::to_value(&drain).expect("serialize drain");
        assert_eq!(json["frequencyDays"], 14);
        assert_eq!(json["category"], "LARGE");
        assert_eq!(json["history"][0]["date"], "2026-08-01");
        assert_eq!(json["history"][0]["performer"], "crew");
    }

    #[test]
    fn deserialization_truncates_timestamps_to_calendar_days() {
        let raw = r#"{
            "id": "d9",
            "name": "Elm corner",
            "location": "South",
            "category": "SMALL",
            "history": [
                {"id": "r9", "date": "2026-08-01T22:15:00.000Z", "notes": "", "performer": "crew"}
            ],
            "frequencyDays": 7
        }"#;
        let drain: Drain = serde_json::from_str(raw).expect("deserialize drain");
        assert_eq!(drain.history[0].date, day(2026, 8, 1));
    }

    #[test]
    fn missing_history_defaults_to_empty() {
        let raw = r#"{
            "id": "d2",
            "name": "Oak",
            "location": "East",
            "category": "MEDIUM",
            "frequencyDays": 30
        }"#;
        let drain: Drain = serde_json::from_str(raw).expect("deserialize drain");
        assert!(drain.history.is_empty());
    }
}
