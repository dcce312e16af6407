//! Week rebalancing: spot overloaded work days and propose moving their
//! non-urgent entries to the lightest work days.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::planner::{PlanEntry, TaskPlanner, WeekPlan};
use crate::task::Priority;

/// A work day is heavy above `mean * HEAVY_FACTOR` scheduled minutes.
pub const HEAVY_FACTOR: f64 = 1.3;
/// A work day is light below `mean * LIGHT_FACTOR` scheduled minutes.
pub const LIGHT_FACTOR: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyWorkload {
    pub date: NaiveDate,
    pub day_of_week: String,
    pub task_count: usize,
    pub total_minutes: u32,
    pub is_work_day: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReallocationSuggestion {
    pub task_id: String,
    pub task_title: String,
    pub priority: Priority,
    pub duration_minutes: u32,
    pub source_date: NaiveDate,
    pub target_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReallocationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub suggestions: Vec<ReallocationSuggestion>,
    pub workload_analysis: Vec<DailyWorkload>,
}

/// Scheduled load per day, in week order.
///
/// Days whose plan failed report zero load and count as non-work days.
pub fn workload_analysis(week: &WeekPlan) -> Vec<DailyWorkload> {
    week.week_plans
        .iter()
        .map(|d| DailyWorkload {
            date: d.date,
            day_of_week: d.day_of_week.clone(),
            task_count: d.day.plan.len(),
            total_minutes: d.day.total_minutes(),
            is_work_day: d.day.success && d.day.is_work_day,
        })
        .collect()
}

/// Propose moves from heavy to light work days.
///
/// Heavy days are visited in date order. Their MEDIUM entries go before LOW
/// ones; HIGH entries never move. Each entry goes to whichever light day has
/// the smallest running total (earliest date on ties), and that total grows by
/// the entry's duration so later moves spread out.
pub fn suggest_reallocations(week: &WeekPlan) -> ReallocationResult {
    let analysis = workload_analysis(week);
    let work: Vec<&DailyWorkload> = analysis.iter().filter(|d| d.is_work_day).collect();

    if work.is_empty() {
        return ReallocationResult {
            success: true,
            message: Some("No work days in the coming week".to_string()),
            error: None,
            suggestions: Vec::new(),
            workload_analysis: analysis,
        };
    }

    let mean = work.iter().map(|d| f64::from(d.total_minutes)).sum::<f64>() / work.len() as f64;
    let heavy: Vec<&DailyWorkload> = work
        .iter()
        .copied()
        .filter(|d| f64::from(d.total_minutes) > mean * HEAVY_FACTOR)
        .collect();
    let mut light: Vec<(NaiveDate, u32)> = work
        .iter()
        .filter(|d| f64::from(d.total_minutes) < mean * LIGHT_FACTOR)
        .map(|d| (d.date, d.total_minutes))
        .collect();

    if heavy.is_empty() || light.is_empty() {
        return ReallocationResult {
            success: true,
            message: Some("Workload is already balanced".to_string()),
            error: None,
            suggestions: Vec::new(),
            workload_analysis: analysis,
        };
    }

    let mut suggestions = Vec::new();
    for day in heavy {
        let Some(plan) = week.week_plans.iter().find(|p| p.date == day.date) else {
            continue;
        };

        let mut movable: Vec<&PlanEntry> = plan
            .day
            .plan
            .iter()
            .filter(|e| e.priority != Priority::High)
            .collect();
        movable.sort_by_key(|e| e.priority);

        for entry in movable {
            let Some(target) = light.iter_mut().min_by_key(|(_, total)| *total) else {
                break;
            };
            suggestions.push(ReallocationSuggestion {
                task_id: entry.task_id.clone(),
                task_title: entry.title.clone(),
                priority: entry.priority,
                duration_minutes: entry.duration_minutes,
                source_date: day.date,
                target_date: target.0,
                reason: format!(
                    "{} has {} min scheduled against a {:.0} min average; {} has {} min",
                    day.date, day.total_minutes, mean, target.0, target.1
                ),
            });
            target.1 += entry.duration_minutes;
        }
    }

    let message = suggestions
        .is_empty()
        .then(|| "Overloaded days only hold high-priority work".to_string());

    ReallocationResult {
        success: true,
        message,
        error: None,
        suggestions,
        workload_analysis: analysis,
    }
}

impl TaskPlanner {
    /// Plan the coming week and propose moves that even out work-day load.
    pub async fn suggest_task_reallocation(&self, user_id: &str) -> ReallocationResult {
        let week = self.generate_week_plan(user_id).await;
        let result = suggest_reallocations(&week);
        info!(user_id, suggestions = result.suggestions.len(), "rebalance: analysis complete");
        result
    }
}
