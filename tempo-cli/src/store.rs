//! JSON-file task store under `~/.tempo`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tempo_core::{MemorySource, Task, TaskStatus};
use tempo_plugins::builtin::{CalendarEvent, EventSource};
use tracing::debug;

use crate::state::{events_path, preferences_path, read_json, read_raw, tasks_path, write_json};

pub struct TaskStore {
    path: PathBuf,
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn load() -> Result<Self> {
        let path = tasks_path()?;
        let tasks: Vec<Task> = read_json(&path)?.unwrap_or_default();
        debug!(path = %path.display(), tasks = tasks.len(), "store: loaded");
        Ok(Self { path, tasks })
    }

    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.tasks)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Next free `t<n>` id.
    pub fn next_id(&self) -> String {
        let max = self
            .tasks
            .iter()
            .filter_map(|t| t.id.strip_prefix('t').and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0);
        format!("t{}", max + 1)
    }

    pub fn add(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Mark `id` DONE at `now`.
    pub fn complete(&mut self, id: &str, now: DateTime<Utc>) -> Result<&Task> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            bail!("no task with id {id}");
        };
        task.status = TaskStatus::Done;
        task.updated_at = now;
        Ok(&*task)
    }

    /// In-memory source holding every task and the stored preferences for `user_id`.
    pub fn source(&self, user_id: &str) -> Result<MemorySource> {
        let mut src = MemorySource::new().with_tasks(user_id, self.tasks.clone());
        if let Some(raw) = read_raw(&preferences_path()?)? {
            src = src.with_preferences(user_id, raw);
        }
        Ok(src)
    }
}

/// Events read from `~/.tempo/events.json`.
pub struct JsonEventSource {
    events: Vec<CalendarEvent>,
}

impl JsonEventSource {
    /// `None` when no events file exists.
    pub fn load() -> Result<Option<Self>> {
        let events: Option<Vec<CalendarEvent>> = read_json(&events_path()?)?;
        Ok(events.map(|events| Self { events }))
    }
}

#[async_trait]
impl EventSource for JsonEventSource {
    async fn events_between(
        &self,
        _calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let mut out: Vec<CalendarEvent> = self
            .events
            .iter()
            .filter(|e| e.end > from && e.start < to)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.start);
        Ok(out)
    }
}
