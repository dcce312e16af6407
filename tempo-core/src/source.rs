//! Data-source seams consumed by the engine.
//!
//! Real adapters (SQL, HTTP) live outside this crate. `MemorySource` backs the
//! CLI's JSON store and the tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::task::Task;

#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Most recently completed tasks first, at most `limit`.
    async fn completed_tasks(&self, user_id: &str, limit: usize) -> Result<Vec<Task>>;

    /// Every task that is not DONE. Order is unspecified; the planner re-sorts.
    async fn open_tasks(&self, user_id: &str) -> Result<Vec<Task>>;

    /// Completion instants (`updated_at`) of every DONE task.
    async fn completion_times(&self, user_id: &str) -> Result<Vec<DateTime<Utc>>>;

    /// Open tasks whose due date falls in `[from, to]`, earliest first.
    async fn scheduled_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>>;

    async fn all_tasks(&self, user_id: &str) -> Result<Vec<Task>>;
}

#[async_trait]
pub trait PreferenceSource: Send + Sync {
    /// Stored preferences document as raw JSON, if the user has one.
    async fn raw_preferences(&self, user_id: &str) -> Result<Option<String>>;
}

/// In-memory task and preference store keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tasks: HashMap<String, Vec<Task>>,
    preferences: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(mut self, user_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        self.tasks.entry(user_id.into()).or_default().extend(tasks);
        self
    }

    pub fn with_preferences(mut self, user_id: impl Into<String>, raw: impl Into<String>) -> Self {
        self.preferences.insert(user_id.into(), raw.into());
        self
    }

    pub fn insert(&mut self, user_id: &str, task: Task) {
        self.tasks.entry(user_id.to_string()).or_default().push(task);
    }

    fn user_tasks(&self, user_id: &str) -> &[Task] {
        self.tasks.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[async_trait]
impl TaskSource for MemorySource {
    async fn completed_tasks(&self, user_id: &str, limit: usize) -> Result<Vec<Task>> {
        let mut done: Vec<Task> = self
            .user_tasks(user_id)
            .iter()
            .filter(|t| t.is_done())
            .cloned()
            .collect();
        done.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        done.truncate(limit);
        Ok(done)
    }

    async fn open_tasks(&self, user_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .user_tasks(user_id)
            .iter()
            .filter(|t| !t.is_done())
            .cloned()
            .collect())
    }

    async fn completion_times(&self, user_id: &str) -> Result<Vec<DateTime<Utc>>> {
        Ok(self
            .user_tasks(user_id)
            .iter()
            .filter(|t| t.is_done())
            .map(|t| t.updated_at)
            .collect())
    }

    async fn scheduled_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let mut out: Vec<Task> = self
            .user_tasks(user_id)
            .iter()
            .filter(|t| !t.is_done())
            .filter(|t| t.due_date.is_some_and(|d| d >= from && d <= to))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.due_date);
        Ok(out)
    }

    async fn all_tasks(&self, user_id: &str) -> Result<Vec<Task>> {
        Ok(self.user_tasks(user_id).to_vec())
    }
}

#[async_trait]
impl PreferenceSource for MemorySource {
    async fn raw_preferences(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.preferences.get(user_id).cloned())
    }
}
