//! User preferences relevant to planning.
//!
//! The stored document is free-form JSON owned by the frontend; we only model
//! the working-hours block and keep everything else untouched.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::warn;

use crate::source::PreferenceSource;
use crate::time::{local_date, weekday_index};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    /// Local hour the working day starts (0-23).
    pub start: u32,
    /// Local hour the working day ends (exclusive, 1-24).
    pub end: u32,
    /// Weekdays, 0 = Sunday.
    pub work_days: BTreeSet<u32>,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: 9,
            end: 18,
            work_days: [1, 2, 3, 4, 5].into_iter().collect(),
        }
    }
}

impl WorkingHours {
    pub fn validate(&self) -> Result<(), String> {
        if self.end > 24 {
            return Err(format!("end hour {} is past midnight", self.end));
        }
        if self.start >= self.end {
            return Err(format!("start hour {} is not before end hour {}", self.start, self.end));
        }
        if let Some(d) = self.work_days.iter().find(|d| **d > 6) {
            return Err(format!("weekday {d} is out of range 0..=6"));
        }
        Ok(())
    }

    /// Length of the working window in minutes.
    pub fn window_minutes(&self) -> u32 {
        self.end.saturating_sub(self.start) * 60
    }

    pub fn is_work_day(&self, weekday: u32) -> bool {
        self.work_days.contains(&weekday)
    }
}

/// Preferences document: defaults merged under whatever the user stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub working_hours: WorkingHours,

    /// Fields the engine does not interpret (theme, layout, notifications...).
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl UserPreferences {
    /// Parse a stored document. Malformed JSON or an invalid working-hours
    /// block falls back to defaults.
    pub fn from_stored(raw: &str) -> Self {
        let mut prefs: UserPreferences = match serde_json::from_str(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "preferences: stored JSON is malformed, using defaults");
                return Self::default();
            }
        };
        if let Err(e) = prefs.working_hours.validate() {
            warn!(error = %e, "preferences: invalid working hours, using defaults");
            prefs.working_hours = WorkingHours::default();
        }
        prefs
    }

    pub fn working_hours(&self) -> &WorkingHours {
        &self.working_hours
    }

    /// Whether `now` falls on a work day within the working window, in `tz`.
    pub fn is_within_working_hours(&self, now: DateTime<Utc>, tz: Tz) -> bool {
        let wh = &self.working_hours;
        if !wh.is_work_day(weekday_index(local_date(now, tz))) {
            return false;
        }
        let hour = now.with_timezone(&tz).hour();
        hour >= wh.start && hour < wh.end
    }
}

/// Load a user's preferences; any source failure degrades to defaults.
pub async fn load_preferences(source: &dyn PreferenceSource, user_id: &str) -> UserPreferences {
    match source.raw_preferences(user_id).await {
        Ok(Some(raw)) => UserPreferences::from_stored(&raw),
        Ok(None) => UserPreferences::default(),
        Err(e) => {
            warn!(user_id, error = %e, "preferences: load failed, using defaults");
            UserPreferences::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_is_nine_to_six_weekdays() {
        let wh = WorkingHours::default();
        assert_eq!(wh.window_minutes(), 540);
        assert!(wh.is_work_day(1));
        assert!(!wh.is_work_day(0));
        assert!(!wh.is_work_day(6));
    }

    #[test]
    fn test_stored_working_hours_are_used() {
        let raw = r#"{"theme":"dark","workingHours":{"start":8,"end":12,"workDays":[0,6]}}"#;
        let prefs = UserPreferences::from_stored(raw);
        assert_eq!(prefs.working_hours.start, 8);
        assert_eq!(prefs.working_hours.window_minutes(), 240);
        assert!(prefs.working_hours.is_work_day(0));
        assert_eq!(prefs.other.get("theme"), Some(&Value::String("dark".into())));
    }

    #[test]
    fn test_malformed_json_falls_back_to_default() {
        let prefs = UserPreferences::from_stored("{not json");
        assert_eq!(prefs.working_hours, WorkingHours::default());
    }

    #[test]
    fn test_missing_block_falls_back_to_default() {
        let prefs = UserPreferences::from_stored(r#"{"layout":"kanban"}"#);
        assert_eq!(prefs.working_hours, WorkingHours::default());
    }

    #[test]
    fn test_inverted_window_falls_back_to_default() {
        let raw = r#"{"workingHours":{"start":18,"end":9,"workDays":[1]}}"#;
        let prefs = UserPreferences::from_stored(raw);
        assert_eq!(prefs.working_hours, WorkingHours::default());
    }

    #[test]
    fn test_within_working_hours_respects_day_and_hour() {
        let prefs = UserPreferences::default();
        let tz = chrono_tz::UTC;
        // Monday 2026-02-23
        let inside = Utc.with_ymd_and_hms(2026, 2, 23, 10, 30, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 23, 18, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        assert!(prefs.is_within_working_hours(inside, tz));
        assert!(!prefs.is_within_working_hours(after, tz));
        assert!(!prefs.is_within_working_hours(sunday, tz));
    }
}
