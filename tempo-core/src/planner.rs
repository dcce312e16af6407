//! Day and week planner.
//!
//! A day plan is built by estimating every open task with the
//! [`WorkloadPredictor`], ordering by priority then due date, and time-boxing
//! the ordered list from the start of the user's working window until the
//! day's minute budget runs out.
//!
//! Non-work days only get "critical" tasks (HIGH priority, or due on or before
//! the day) inside a two-hour budget.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::preferences::{load_preferences, WorkingHours};
use crate::source::{PreferenceSource, TaskSource};
use crate::task::{Priority, Task, TaskStatus};
use crate::time::{local_date, local_hour_to_utc, weekday_index, weekday_name};
use crate::workload::WorkloadPredictor;

/// Minutes available on a day outside the user's work days.
pub const NON_WORK_DAY_BUDGET_MINUTES: u32 = 120;

/// Days covered by a week plan, starting today.
pub const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub task_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub priority: Priority,
    pub status: TaskStatus,
}

/// Result of planning one day. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub plan: Vec<PlanEntry>,
    pub is_work_day: bool,
}

impl DayPlan {
    fn scheduled(plan: Vec<PlanEntry>, is_work_day: bool, message: Option<&str>) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
            error: None,
            plan,
            is_work_day,
        }
    }

    fn empty(is_work_day: bool, message: &str) -> Self {
        Self::scheduled(Vec::new(), is_work_day, Some(message))
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error),
            plan: Vec::new(),
            is_work_day: false,
        }
    }

    pub fn total_minutes(&self) -> u32 {
        self.plan.iter().map(|e| e.duration_minutes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlanDay {
    pub date: NaiveDate,
    pub day_of_week: String,
    #[serde(flatten)]
    pub day: DayPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlan {
    pub success: bool,
    pub week_plans: Vec<WeekPlanDay>,
}

/// Plan order: priority (HIGH first), then due date ascending with undated
/// tasks last. Equal keys compare equal so a stable sort keeps input order.
pub fn compare_for_plan(a: &Task, b: &Task) -> Ordering {
    a.priority.cmp(&b.priority).then_with(|| match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Time-box already-ordered `(task, estimate)` pairs from `day_start`.
///
/// Each task takes `min(estimate, remaining)` minutes; scheduling stops when
/// the budget is spent. Whatever does not fit is left out.
pub fn time_box(ordered: &[(Task, u32)], day_start: DateTime<Utc>, budget_minutes: u32) -> Vec<PlanEntry> {
    let mut plan = Vec::new();
    let mut cursor = day_start;
    let mut remaining = budget_minutes;

    for (task, estimate) in ordered {
        if remaining == 0 {
            break;
        }
        let duration = (*estimate).min(remaining);
        let end = cursor + Duration::minutes(i64::from(duration));

        plan.push(PlanEntry {
            task_id: task.id.clone(),
            title: task.title.clone(),
            start_time: cursor,
            end_time: end,
            duration_minutes: duration,
            priority: task.priority,
            status: task.status,
        });

        remaining -= duration;
        cursor = end;
    }

    plan
}

/// HIGH priority, or due on or before `date` in `tz`.
fn is_critical(task: &Task, date: NaiveDate, tz: Tz) -> bool {
    task.priority == Priority::High || task.due_date.is_some_and(|d| local_date(d, tz) <= date)
}

pub struct TaskPlanner {
    predictor: WorkloadPredictor,
    tasks: Arc<dyn TaskSource>,
    preferences: Arc<dyn PreferenceSource>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl TaskPlanner {
    pub fn new(
        tasks: Arc<dyn TaskSource>,
        preferences: Arc<dyn PreferenceSource>,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        let predictor = WorkloadPredictor::new(tasks.clone(), clock.clone(), tz);
        Self::with_predictor(predictor, tasks, preferences, clock)
    }

    pub fn with_predictor(
        predictor: WorkloadPredictor,
        tasks: Arc<dyn TaskSource>,
        preferences: Arc<dyn PreferenceSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tz = predictor.timezone();
        Self {
            predictor,
            tasks,
            preferences,
            clock,
            tz,
        }
    }

    pub async fn initialize(&mut self, user_id: &str) {
        self.predictor.initialize(user_id).await;
    }

    pub fn predictor(&self) -> &WorkloadPredictor {
        &self.predictor
    }

    /// Today's date in the planner's timezone.
    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.tz)
    }

    pub async fn plan_day(&self, user_id: &str, date: NaiveDate) -> DayPlan {
        match self.try_plan_day(user_id, date).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(user_id, %date, error = %format!("{e:#}"), "planner: day plan failed");
                DayPlan::failed(format!("{e:#}"))
            }
        }
    }

    async fn try_plan_day(&self, user_id: &str, date: NaiveDate) -> Result<DayPlan> {
        let tasks = self
            .tasks
            .open_tasks(user_id)
            .await
            .with_context(|| format!("load open tasks for {user_id}"))?;

        let prefs = load_preferences(self.preferences.as_ref(), user_id).await;
        let hours = prefs.working_hours();
        let is_work_day = hours.is_work_day(weekday_index(date));

        if tasks.is_empty() {
            return Ok(DayPlan::empty(is_work_day, "No open tasks"));
        }

        if !is_work_day {
            let critical: Vec<Task> = tasks
                .into_iter()
                .filter(|t| is_critical(t, date, self.tz))
                .collect();

            if critical.is_empty() {
                return Ok(DayPlan::empty(false, "Not a work day and nothing critical is pending"));
            }

            let plan = self.build_plan(critical, date, hours, NON_WORK_DAY_BUDGET_MINUTES)?;
            debug!(user_id, %date, entries = plan.len(), "planner: non-work day plan");
            return Ok(DayPlan::scheduled(
                plan,
                false,
                Some("Not a work day, but some critical tasks need attention"),
            ));
        }

        let plan = self.build_plan(tasks, date, hours, hours.window_minutes())?;
        debug!(user_id, %date, entries = plan.len(), "planner: work day plan");
        Ok(DayPlan::scheduled(plan, true, None))
    }

    fn build_plan(
        &self,
        tasks: Vec<Task>,
        date: NaiveDate,
        hours: &WorkingHours,
        budget_minutes: u32,
    ) -> Result<Vec<PlanEntry>> {
        let mut estimated: Vec<(Task, u32)> = tasks
            .into_iter()
            .map(|t| {
                let minutes = self.predictor.predict_task_completion_time(&t);
                (t, minutes)
            })
            .collect();
        estimated.sort_by(|a, b| compare_for_plan(&a.0, &b.0));

        let day_start = local_hour_to_utc(date, hours.start, self.tz)
            .with_context(|| format!("no local {}:00 on {date}", hours.start))?;

        Ok(time_box(&estimated, day_start, budget_minutes))
    }

    /// Plans for today and the following six days.
    pub async fn generate_week_plan(&self, user_id: &str) -> WeekPlan {
        let today = self.today();
        let dates: Vec<NaiveDate> = (0..WEEK_DAYS).map(|i| today + Duration::days(i)).collect();

        // Each day only reads predictor state, so the days can run together.
        let days = join_all(dates.iter().map(|d| self.plan_day(user_id, *d))).await;

        let week_plans: Vec<WeekPlanDay> = dates
            .into_iter()
            .zip(days)
            .map(|(date, day)| WeekPlanDay {
                date,
                day_of_week: weekday_name(date),
                day,
            })
            .collect();

        info!(
            user_id,
            start = %today,
            scheduled = week_plans.iter().map(|d| d.day.plan.len()).sum::<usize>(),
            "planner: week plan generated"
        );

        WeekPlan {
            success: true,
            week_plans,
        }
    }
}
