//! `task-analysis`: completion statistics over a user's tasks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use std::sync::Arc;
use tempo_core::time::{local_date, weekday_index};
use tempo_core::{Clock, Priority, Task, TaskSource, TaskStatus};
use tracing::warn;

use crate::plugin::{HookInput, HookKind, Plugin, PluginManifest};

pub const ID: &str = "task-analysis";

/// Tasks listed under `recentActivity`.
const RECENT_LIMIT: usize = 5;

pub struct TaskAnalysisPlugin {
    manifest: PluginManifest,
    source: Arc<dyn TaskSource>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl TaskAnalysisPlugin {
    pub fn new(source: Arc<dyn TaskSource>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        let manifest = PluginManifest::new(ID, "Task analysis")
            .with_description("Analyses task completion rates and patterns")
            .with_author("tempo")
            .with_hooks(&[HookKind::DataProvider, HookKind::BeforePrompt]);
        Self {
            manifest,
            source,
            clock,
            tz,
        }
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let tasks = self
            .source
            .all_tasks(user_id)
            .await
            .with_context(|| format!("load tasks for {user_id}"))?;
        Ok(analyze_tasks(&tasks, self.clock.now(), self.tz))
    }
}

#[async_trait]
impl Plugin for TaskAnalysisPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn call(&self, hook: HookKind, input: &HookInput) -> Result<Value> {
        match hook {
            HookKind::BeforePrompt => Ok(json!({
                "additionalContext": "Prompt enhanced with recent task analysis"
            })),
            _ => {
                let user_id = input
                    .context_str("userId")
                    .context("task analysis needs a userId in the context")?;
                match self.analyze(user_id).await {
                    Ok(v) => Ok(v),
                    Err(e) => {
                        warn!(user_id, error = %format!("{e:#}"), "task-analysis: analysis failed");
                        Ok(json!({
                            "error": "Unable to analyse task data",
                            "details": format!("{e:#}"),
                        }))
                    }
                }
            }
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Statistics block served as this plugin's data.
pub fn analyze_tasks(tasks: &[Task], now: DateTime<Utc>, tz: Tz) -> Value {
    let total = tasks.len();
    let count_status = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
    let count_priority = |p: Priority| tasks.iter().filter(|t| t.priority == p).count();

    let done = count_status(TaskStatus::Done);
    let rate = percent(done, total);

    let today = local_date(now, tz);
    let week_start = today - Duration::days(i64::from(weekday_index(today)));
    let week_end = week_start + Duration::days(6);
    let (this_week, this_month) = tasks.iter().fold((0usize, 0usize), |(w, m), t| {
        let created = local_date(t.created_at, tz);
        let in_week = created >= week_start && created <= week_end;
        let in_month = created.year() == today.year() && created.month() == today.month();
        (w + usize::from(in_week), m + usize::from(in_month))
    });

    let mut recent: Vec<&Task> = tasks.iter().collect();
    recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    let recent_activity: Vec<Value> = recent
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|t| {
            json!({
                "id": t.id,
                "title": t.title,
                "status": t.status,
                "updatedAt": t.updated_at,
                "timeAgo": time_ago(t.updated_at, now),
            })
        })
        .collect();

    json!({
        "overview": {
            "totalTasks": total,
            "completedTasks": done,
            "completionRate": format!("{rate:.1}%"),
            "inProgress": count_status(TaskStatus::InProgress),
            "pending": count_status(TaskStatus::Todo),
        },
        "byPriority": {
            "HIGH": count_priority(Priority::High),
            "MEDIUM": count_priority(Priority::Medium),
            "LOW": count_priority(Priority::Low),
        },
        "byStatus": {
            "TODO": count_status(TaskStatus::Todo),
            "IN_PROGRESS": count_status(TaskStatus::InProgress),
            "DONE": done,
        },
        "timePeriods": {
            "thisWeek": this_week,
            "thisMonth": this_month,
        },
        "recentActivity": recent_activity,
        "insights": insights(tasks, rate),
    })
}

fn insights(tasks: &[Task], completion_rate: f64) -> Vec<String> {
    let mut out = Vec::new();
    if tasks.is_empty() {
        return out;
    }

    if completion_rate < 30.0 {
        out.push("Completion rate is low; a lighter plan or fewer open tasks may help".to_string());
    } else if completion_rate > 80.0 {
        out.push("Completion rate is high; there is room to take on more".to_string());
    }

    let high: Vec<&Task> = tasks.iter().filter(|t| t.priority == Priority::High).collect();
    let high_done = high.iter().filter(|t| t.is_done()).count();
    if !high.is_empty() && percent(high_done, high.len()) < 50.0 {
        out.push("Fewer than half of high-priority tasks are done; focus on those first".to_string());
    }

    out
}

/// Coarse relative time, e.g. "3 hours ago".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    if elapsed < Duration::zero() {
        return "in the future".to_string();
    }

    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();
    if minutes < 1 {
        "less than a minute ago".to_string()
    } else if minutes == 1 {
        "1 minute ago".to_string()
    } else if minutes < 60 {
        format!("{minutes} minutes ago")
    } else if hours == 1 {
        "about 1 hour ago".to_string()
    } else if hours < 24 {
        format!("about {hours} hours ago")
    } else if days == 1 {
        "1 day ago".to_string()
    } else {
        format!("{days} days ago")
    }
}
