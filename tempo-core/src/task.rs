//! Task model shared by the predictor, the planner and the plugins.
//!
//! Tasks are owned by the persistence layer. The engine only reads them and
//! proposes schedule changes that a caller may persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

/// Task priority. `Ord` follows scheduling rank: `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// Duration assumed for an already-scheduled task that carries no estimate.
pub const DEFAULT_SCHEDULED_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,

    pub status: TaskStatus,
    pub priority: Priority,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Minutes. Only consulted when the task is an existing calendar item.
    #[serde(default)]
    pub estimated_duration: Option<u32>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            due_date: None,
            created_at: now,
            updated_at: now,
            estimated_duration: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    pub fn with_estimated_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration = Some(minutes);
        self
    }

    /// Description text, treating an empty string as absent.
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.is_empty())
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_orders_high_first() {
        let mut ps = vec![Priority::Low, Priority::High, Priority::Medium];
        ps.sort();
        assert_eq!(ps, vec![Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn test_task_json_uses_upper_case_enums() {
        let t = Task::new("t1", "Write report").with_priority(Priority::High);
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"priority\":\"HIGH\""));
        assert!(json.contains("\"status\":\"TODO\""));
        assert!(json.contains("\"dueDate\":null"));
    }

    #[test]
    fn test_empty_description_counts_as_absent() {
        let t = Task::new("t1", "x").with_description("");
        assert_eq!(t.description_text(), None);
    }
}
