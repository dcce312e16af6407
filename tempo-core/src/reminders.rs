//! Due-date reminders.
//!
//! An open task earns a reminder when its due time is within
//! [`WINDOW_MINUTES`] of one of the lead times (24h, 2h, 30min). Reminders
//! falling in the user's quiet hours are held back unless the task is HIGH
//! priority.

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::source::TaskSource;
use crate::task::{Priority, Task};
use crate::time::minutes_between;

/// Minutes before the due time at which a reminder fires, with its headline.
pub const LEAD_TIMES: [(i64, &str); 3] = [
    (24 * 60, "You have a task due tomorrow"),
    (2 * 60, "You have a task due soon"),
    (30, "Your task is due within 30 minutes"),
];

/// A lead time matches while `|minutes_to_due - lead| < WINDOW_MINUTES`.
pub const WINDOW_MINUTES: i64 = 5;

/// Local hours during which only HIGH-priority reminders go out.
///
/// `start > end` wraps midnight (the default 22-8 covers 22:00 to 07:59).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self { start: 22, end: 8 }
    }
}

impl QuietHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// `due_<task id>_<lead minutes>`, stable across checks.
    pub id: String,
    pub task_id: String,
    pub title: String,
    pub body: String,
    pub lead_minutes: i64,
    pub minutes_to_due: i64,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
}

fn until(minutes: i64) -> String {
    match minutes {
        m if m >= 120 => format!("about {} hours", (m + 30) / 60),
        m if m >= 60 => "about an hour".to_string(),
        m => format!("{m} minutes"),
    }
}

/// Reminders due at `now` for `tasks`, earliest due date first.
///
/// DONE, undated and already-due tasks are ignored.
pub fn due_reminders(tasks: &[Task], now: DateTime<Utc>) -> Vec<Reminder> {
    let mut upcoming: Vec<(&Task, DateTime<Utc>)> = tasks
        .iter()
        .filter(|t| !t.is_done())
        .filter_map(|t| t.due_date.map(|d| (t, d)))
        .filter(|(_, due)| *due > now)
        .collect();
    upcoming.sort_by_key(|(_, due)| *due);

    let mut out = Vec::new();
    for (task, due) in upcoming {
        let minutes_to_due = minutes_between(now, due);
        for (lead, headline) in LEAD_TIMES {
            if (minutes_to_due - lead).abs() < WINDOW_MINUTES {
                out.push(Reminder {
                    id: format!("due_{}_{lead}", task.id),
                    task_id: task.id.clone(),
                    title: headline.to_string(),
                    body: format!("Task \"{}\" is due in {}", task.title, until(minutes_to_due)),
                    lead_minutes: lead,
                    minutes_to_due,
                    due_date: due,
                    priority: task.priority,
                });
            }
        }
    }
    out
}

/// Whether `reminder` may be delivered at `now` given the quiet hours in `tz`.
pub fn should_notify(reminder: &Reminder, now: DateTime<Utc>, quiet: QuietHours, tz: Tz) -> bool {
    if quiet.contains(now.with_timezone(&tz).hour()) {
        return reminder.priority == Priority::High;
    }
    true
}

/// Checks a user's open tasks for reminders against a clock.
pub struct ReminderScheduler {
    source: Arc<dyn TaskSource>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    quiet: QuietHours,
}

impl ReminderScheduler {
    pub fn new(source: Arc<dyn TaskSource>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self {
            source,
            clock,
            tz,
            quiet: QuietHours::default(),
        }
    }

    pub fn with_quiet_hours(mut self, quiet: QuietHours) -> Self {
        self.quiet = quiet;
        self
    }

    /// Every reminder due now, quiet hours ignored.
    pub async fn check_due_tasks(&self, user_id: &str) -> Result<Vec<Reminder>> {
        let tasks = self
            .source
            .open_tasks(user_id)
            .await
            .with_context(|| format!("load open tasks for {user_id}"))?;
        let reminders = due_reminders(&tasks, self.clock.now());
        debug!(user_id, tasks = tasks.len(), reminders = reminders.len(), "reminders: checked");
        Ok(reminders)
    }

    pub fn should_notify(&self, reminder: &Reminder) -> bool {
        should_notify(reminder, self.clock.now(), self.quiet, self.tz)
    }
}
