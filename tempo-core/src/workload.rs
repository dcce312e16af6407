//! Workload predictor: learns completion-time estimates and productive time
//! windows from a user's finished tasks.
//!
//! History is bucketed by [`TaskFeature`]. A single finished task contributes
//! to every bucket its features map to. Prediction is a weighted mean over the
//! buckets a new task shares with history, with a fixed three-tier rule when
//! nothing matches.
//!
//! The maps are filled once by [`WorkloadPredictor::initialize`] and only read
//! afterwards, so prediction needs `&self` only.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::source::TaskSource;
use crate::task::{Priority, Task, DEFAULT_SCHEDULED_MINUTES};
use crate::time::{local_date, local_hour_to_utc, minutes_between, weekday_index};

/// Most recent finished tasks loaded into history.
pub const HISTORY_LIMIT: usize = 100;

/// Keywords that mark a task as a recognisable kind of work.
pub const KEYWORDS: [&str; 8] = [
    "meeting", "report", "document", "research", "develop", "bug", "test", "review",
];

const PRIORITY_WEIGHT: f64 = 2.0;
const KEYWORD_WEIGHT: f64 = 1.5;
const BASE_WEIGHT: f64 = 1.0;

/// Initial best score while searching slots; anything above it wins.
const SCORE_SENTINEL: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptionBucket {
    Missing,
    Short,
    Long,
}

/// One derived aspect of a task, used as a history lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskFeature {
    Title(LengthBucket),
    Description(DescriptionBucket),
    Priority(Priority),
    Keyword(&'static str),
}

impl TaskFeature {
    pub fn weight(&self) -> f64 {
        match self {
            TaskFeature::Priority(_) => PRIORITY_WEIGHT,
            TaskFeature::Keyword(_) => KEYWORD_WEIGHT,
            _ => BASE_WEIGHT,
        }
    }
}

impl fmt::Display for TaskFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFeature::Title(LengthBucket::Short) => f.write_str("short_title"),
            TaskFeature::Title(LengthBucket::Medium) => f.write_str("medium_title"),
            TaskFeature::Title(LengthBucket::Long) => f.write_str("long_title"),
            TaskFeature::Description(DescriptionBucket::Missing) => f.write_str("no_description"),
            TaskFeature::Description(DescriptionBucket::Short) => f.write_str("short_description"),
            TaskFeature::Description(DescriptionBucket::Long) => f.write_str("long_description"),
            TaskFeature::Priority(p) => write!(f, "priority_{}", p.as_str()),
            TaskFeature::Keyword(k) => write!(f, "keyword_{k}"),
        }
    }
}

/// Derive the feature set of a task. Pure and deterministic.
pub fn extract_features(task: &Task) -> Vec<TaskFeature> {
    let mut features = Vec::with_capacity(4);

    let title_len = task.title.chars().count();
    features.push(TaskFeature::Title(match title_len {
        n if n < 20 => LengthBucket::Short,
        n if n < 50 => LengthBucket::Medium,
        _ => LengthBucket::Long,
    }));

    features.push(TaskFeature::Description(match task.description_text() {
        None => DescriptionBucket::Missing,
        Some(d) if d.chars().count() < 100 => DescriptionBucket::Short,
        Some(_) => DescriptionBucket::Long,
    }));

    features.push(TaskFeature::Priority(task.priority));

    let haystack = format!("{} {}", task.title, task.description_text().unwrap_or("")).to_lowercase();
    for kw in KEYWORDS {
        if haystack.contains(kw) {
            features.push(TaskFeature::Keyword(kw));
        }
    }

    features
}

/// Estimate used when no feature of a task has history.
pub fn rule_based_estimate(task: &Task) -> u32 {
    let title_len = task.title.chars().count();
    let desc_len = task.description_text().map(|d| d.chars().count());

    if title_len < 20 && desc_len.is_none_or(|n| n < 50) {
        30
    } else if title_len < 50 && desc_len.is_none_or(|n| n < 200) {
        60
    } else {
        120
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionHistoryEntry {
    pub task_id: String,
    pub title: String,
    /// `completed_at - created_at`, whole minutes.
    pub completion_minutes: i64,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CompletionHistoryEntry {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            completion_minutes: minutes_between(task.created_at, task.updated_at),
            priority: task.priority,
            created_at: task.created_at,
            completed_at: task.updated_at,
        }
    }
}

/// Hours of day and weekdays in which a user finishes the most work,
/// best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPattern {
    pub productive_hours: Vec<u32>,
    pub productive_days: Vec<u32>,
}

impl UserPattern {
    /// Top 30% of hours and top 50% of weekdays by completion count.
    /// Ties keep the lower index first. `None` when there is no history.
    pub fn from_completions(times: &[DateTime<Utc>], tz: Tz) -> Option<Self> {
        if times.is_empty() {
            return None;
        }

        let mut hour_counts = [0usize; 24];
        let mut day_counts = [0usize; 7];
        for t in times {
            hour_counts[t.with_timezone(&tz).hour() as usize] += 1;
            day_counts[weekday_index(local_date(*t, tz)) as usize] += 1;
        }

        Some(Self {
            productive_hours: top_share(&hour_counts, 0.3),
            productive_days: top_share(&day_counts, 0.5),
        })
    }
}

fn top_share(counts: &[usize], share: f64) -> Vec<u32> {
    let mut idx: Vec<u32> = (0..counts.len() as u32).collect();
    // stable: equal counts stay in index order
    idx.sort_by(|a, b| counts[*b as usize].cmp(&counts[*a as usize]));
    let keep = (counts.len() as f64 * share).ceil() as usize;
    idx.truncate(keep);
    idx
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSuggestion {
    pub suggested_time: Option<DateTime<Utc>>,
    pub estimated_duration: u32,
    pub score: f64,
}

/// Score a proposed start time against the user's already-scheduled tasks.
///
/// Base 100. Slots under 2 hours away lose 30; slots beyond 72 hours lose 10
/// per extra day, at most 50. Each scheduled task then adjusts the score by
/// how close its due time is to the proposal: overlapping -40, adjacent -15,
/// comfortably spaced +10.
pub fn score_time_slot(
    proposed: DateTime<Utc>,
    duration_minutes: u32,
    scheduled: &[Task],
    now: DateTime<Utc>,
) -> f64 {
    let mut score = 100.0;

    let hours_from_now = minutes_between(now, proposed) as f64 / 60.0;
    if hours_from_now < 2.0 {
        score -= 30.0;
    } else if hours_from_now > 72.0 {
        score -= ((hours_from_now - 72.0) / 24.0 * 10.0).min(50.0);
    }

    for task in scheduled {
        let Some(due) = task.due_date else { continue };
        let gap = minutes_between(proposed, due).abs() as f64;
        let task_minutes = task.estimated_duration.unwrap_or(DEFAULT_SCHEDULED_MINUTES);
        let sum = f64::from(duration_minutes.saturating_add(task_minutes));

        if gap < sum / 2.0 {
            score -= 40.0;
        } else if gap < sum {
            score -= 15.0;
        } else if gap < sum * 2.0 {
            score += 10.0;
        }
    }

    score
}

pub struct WorkloadPredictor {
    source: Arc<dyn TaskSource>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    history_limit: usize,
    history: HashMap<TaskFeature, Vec<CompletionHistoryEntry>>,
    patterns: HashMap<String, UserPattern>,
}

impl WorkloadPredictor {
    pub fn new(source: Arc<dyn TaskSource>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self {
            source,
            clock,
            tz,
            history_limit: HISTORY_LIMIT,
            history: HashMap::new(),
            patterns: HashMap::new(),
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Load history and productivity patterns for `user_id`.
    ///
    /// Data-source failures are logged and leave the predictor with empty
    /// history (rule-based estimates) and no pattern for the user.
    pub async fn initialize(&mut self, user_id: &str) {
        self.history.clear();

        match self.source.completed_tasks(user_id, self.history_limit).await {
            Ok(tasks) => {
                for task in &tasks {
                    let entry = CompletionHistoryEntry::from_task(task);
                    for feature in extract_features(task) {
                        self.history.entry(feature).or_default().push(entry.clone());
                    }
                }
                info!(user_id, tasks = tasks.len(), buckets = self.history.len(), "predictor: history loaded");
            }
            Err(e) => {
                warn!(user_id, error = %e, "predictor: history load failed, using rule-based estimates");
            }
        }

        self.patterns.remove(user_id);
        match self.source.completion_times(user_id).await {
            Ok(times) => match UserPattern::from_completions(&times, self.tz) {
                Some(pattern) => {
                    debug!(user_id, ?pattern, "predictor: user pattern computed");
                    self.patterns.insert(user_id.to_string(), pattern);
                }
                None => debug!(user_id, "predictor: no completions, no user pattern"),
            },
            Err(e) => {
                warn!(user_id, error = %e, "predictor: pattern analysis failed");
            }
        }
    }

    pub fn history_for(&self, feature: &TaskFeature) -> &[CompletionHistoryEntry] {
        self.history.get(feature).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn user_pattern(&self, user_id: &str) -> Option<&UserPattern> {
        self.patterns.get(user_id)
    }

    /// Estimated minutes to finish `task`. Always at least 1.
    pub fn predict_task_completion_time(&self, task: &Task) -> u32 {
        let mut total = 0.0;
        let mut weight_sum = 0.0;

        for feature in extract_features(task) {
            let Some(similar) = self.history.get(&feature) else { continue };
            if similar.is_empty() {
                continue;
            }
            let mean = similar.iter().map(|e| e.completion_minutes as f64).sum::<f64>() / similar.len() as f64;
            let w = feature.weight();
            total += mean * w;
            weight_sum += w;
        }

        if weight_sum == 0.0 {
            return rule_based_estimate(task);
        }

        ((total / weight_sum).round() as i64).max(1) as u32
    }

    /// Best productive slot in the next 7 days for `task`, or `None` when
    /// nothing is known about the user's working pattern.
    pub async fn suggest_optimal_time(&self, user_id: &str, task: &Task) -> Option<TimeSuggestion> {
        let estimated_duration = self.predict_task_completion_time(task);
        let pattern = self.patterns.get(user_id)?;

        let now = self.clock.now();
        let today = local_date(now, self.tz);
        let horizon: Vec<_> = (0..7).map(|i| today + Duration::days(i)).collect();

        let mut dates: Vec<_> = horizon
            .iter()
            .copied()
            .filter(|d| pattern.productive_days.contains(&weekday_index(*d)))
            .collect();
        if dates.is_empty() {
            dates = horizon;
        }

        let (first, last) = (dates[0], dates[dates.len() - 1]);
        let window = local_hour_to_utc(first, 0, self.tz)
            .zip(local_hour_to_utc(last + Duration::days(1), 0, self.tz));
        let scheduled = match window {
            Some((from, to)) => match self.source.scheduled_between(user_id, from, to).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(user_id, error = %e, "predictor: scheduled tasks unavailable, scoring without them");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut best_score = SCORE_SENTINEL;
        let mut best_time = None;

        for date in &dates {
            for hour in &pattern.productive_hours {
                let Some(proposed) = local_hour_to_utc(*date, *hour, self.tz) else { continue };
                if proposed < now {
                    continue;
                }
                let score = score_time_slot(proposed, estimated_duration, &scheduled, now);
                if score > best_score {
                    best_score = score;
                    best_time = Some(proposed);
                }
            }
        }

        debug!(user_id, task_id = %task.id, ?best_time, best_score, "predictor: optimal time search done");

        Some(TimeSuggestion {
            suggested_time: best_time,
            estimated_duration,
            score: best_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::source::MemorySource;
    use crate::task::TaskStatus;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn done(id: &str, title: &str, priority: Priority, minutes: i64) -> Task {
        let created = at(2026, 2, 2, 9, 0);
        Task::new(id, title)
            .with_priority(priority)
            .with_status(TaskStatus::Done)
            .with_timestamps(created, created + Duration::minutes(minutes))
    }

    fn predictor(src: MemorySource, now: DateTime<Utc>) -> WorkloadPredictor {
        WorkloadPredictor::new(Arc::new(src), Arc::new(FixedClock::new(now)), chrono_tz::UTC)
    }

    struct BrokenSource;

    #[async_trait]
    impl TaskSource for BrokenSource {
        async fn completed_tasks(&self, _: &str, _: usize) -> anyhow::Result<Vec<Task>> {
            bail!("db down")
        }
        async fn open_tasks(&self, _: &str) -> anyhow::Result<Vec<Task>> {
            bail!("db down")
        }
        async fn completion_times(&self, _: &str) -> anyhow::Result<Vec<DateTime<Utc>>> {
            bail!("db down")
        }
        async fn scheduled_between(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> anyhow::Result<Vec<Task>> {
            bail!("db down")
        }
        async fn all_tasks(&self, _: &str) -> anyhow::Result<Vec<Task>> {
            bail!("db down")
        }
    }

    #[test]
    fn test_features_short_untitled_high() {
        let t = Task::new("t", "Fix login").with_priority(Priority::High);
        let names: Vec<String> = extract_features(&t).iter().map(|f| f.to_string()).collect();
        assert_eq!(names, vec!["short_title", "no_description", "priority_high"]);
    }

    #[test]
    fn test_features_keywords_case_insensitive() {
        let t = Task::new("t", "Review the quarterly REPORT draft before the meeting")
            .with_description("x".repeat(150));
        let names: Vec<String> = extract_features(&t).iter().map(|f| f.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "long_title",
                "long_description",
                "priority_medium",
                "keyword_meeting",
                "keyword_report",
                "keyword_review",
            ]
        );
    }

    #[test]
    fn test_features_are_deterministic() {
        let t = Task::new("t", "Write test plan").with_description("cover bug 12");
        assert_eq!(extract_features(&t), extract_features(&t));
    }

    #[test]
    fn test_cold_start_tiers() {
        let p = predictor(MemorySource::new(), at(2026, 2, 23, 8, 0));

        let short = Task::new("a", "x".repeat(19)).with_description("y".repeat(49));
        let title_20 = Task::new("b", "x".repeat(20));
        let desc_50 = Task::new("c", "short").with_description("y".repeat(50));
        let medium_edge = Task::new("d", "x".repeat(49)).with_description("y".repeat(199));
        let long_title = Task::new("e", "x".repeat(50));
        let long_desc = Task::new("f", "short").with_description("y".repeat(200));

        assert_eq!(p.predict_task_completion_time(&short), 30);
        assert_eq!(p.predict_task_completion_time(&title_20), 60);
        assert_eq!(p.predict_task_completion_time(&desc_50), 60);
        assert_eq!(p.predict_task_completion_time(&medium_edge), 60);
        assert_eq!(p.predict_task_completion_time(&long_title), 120);
        assert_eq!(p.predict_task_completion_time(&long_desc), 120);
    }

    #[tokio::test]
    async fn test_single_short_title_history_predicts_its_mean() {
        let src = MemorySource::new().with_tasks("u1", vec![done("h1", "Fix", Priority::High, 45)]);
        let mut p = predictor(src, at(2026, 2, 23, 8, 0));
        p.initialize("u1").await;

        // Shares only `short_title` with the history entry.
        let t = Task::new("n1", "Call")
            .with_priority(Priority::Low)
            .with_description("z".repeat(120));
        assert_eq!(p.predict_task_completion_time(&t), 45);
    }

    #[tokio::test]
    async fn test_priority_feature_weighs_double() {
        let src = MemorySource::new().with_tasks(
            "u1",
            vec![
                done("h1", "Fix", Priority::Low, 60),
                done("h2", "Call", Priority::High, 30),
            ],
        );
        let mut p = predictor(src, at(2026, 2, 23, 8, 0));
        p.initialize("u1").await;

        // short_title 45 (w1) + no_description 45 (w1) + priority_high 30 (w2)
        let t = Task::new("n1", "Ship").with_priority(Priority::High);
        assert_eq!(p.predict_task_completion_time(&t), 38);
    }

    #[tokio::test]
    async fn test_keyword_feature_weighs_one_and_a_half() {
        let src = MemorySource::new().with_tasks(
            "u1",
            vec![
                done("h1", "fix bug", Priority::Low, 100),
                done("h2", "call", Priority::High, 20),
            ],
        );
        let mut p = predictor(src, at(2026, 2, 23, 8, 0));
        p.initialize("u1").await;

        // short_title 60 (w1) + no_description 60 (w1) + keyword_bug 100 (w1.5)
        let t = Task::new("n1", "bug").with_priority(Priority::Medium);
        assert_eq!(p.predict_task_completion_time(&t), 77);
    }

    #[tokio::test]
    async fn test_history_is_bounded_by_limit() {
        let tasks: Vec<Task> = (0..5)
            .map(|i| done(&format!("h{i}"), "Fix", Priority::Low, 10))
            .collect();
        let src = MemorySource::new().with_tasks("u1", tasks);
        let mut p = predictor(src, at(2026, 2, 23, 8, 0)).with_history_limit(3);
        p.initialize("u1").await;

        let bucket = p.history_for(&TaskFeature::Title(LengthBucket::Short));
        assert_eq!(bucket.len(), 3);
    }

    #[tokio::test]
    async fn test_initialize_fails_soft() {
        let mut p = WorkloadPredictor::new(
            Arc::new(BrokenSource),
            Arc::new(FixedClock::new(at(2026, 2, 23, 8, 0))),
            chrono_tz::UTC,
        );
        p.initialize("u1").await;

        assert!(p.user_pattern("u1").is_none());
        assert_eq!(p.predict_task_completion_time(&Task::new("t", "short")), 30);
        assert!(p.suggest_optimal_time("u1", &Task::new("t", "short")).await.is_none());
    }

    #[test]
    fn test_pattern_ranks_busiest_hours_and_days() {
        // Monday 2026-02-23 10:xx three times, Tuesday 14:xx twice.
        let times = vec![
            at(2026, 2, 23, 10, 5),
            at(2026, 2, 23, 10, 40),
            at(2026, 2, 23, 10, 50),
            at(2026, 2, 24, 14, 0),
            at(2026, 2, 24, 14, 30),
        ];
        let p = UserPattern::from_completions(&times, chrono_tz::UTC).unwrap();
        assert_eq!(p.productive_hours.len(), 8);
        assert_eq!(p.productive_hours[..3], [10, 14, 0]);
        assert_eq!(p.productive_days, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_no_completions_no_pattern() {
        assert!(UserPattern::from_completions(&[], chrono_tz::UTC).is_none());
    }

    #[test]
    fn test_score_time_distance_penalties() {
        let now = at(2026, 2, 23, 8, 0);
        assert_eq!(score_time_slot(now + Duration::hours(1), 30, &[], now), 70.0);
        assert_eq!(score_time_slot(now + Duration::hours(24), 30, &[], now), 100.0);
        assert_eq!(score_time_slot(now + Duration::hours(96), 30, &[], now), 90.0);
        assert_eq!(score_time_slot(now + Duration::hours(400), 30, &[], now), 50.0);
    }

    #[test]
    fn test_score_conflict_adjustments() {
        let now = at(2026, 2, 23, 8, 0);
        let slot = now + Duration::hours(24);
        let near = |mins: i64| Task::new("s", "busy").with_due_date(slot + Duration::minutes(mins));

        // sum = 30 + 60 = 90
        assert_eq!(score_time_slot(slot, 30, &[near(30)], now), 60.0);
        assert_eq!(score_time_slot(slot, 30, &[near(60)], now), 85.0);
        assert_eq!(score_time_slot(slot, 30, &[near(120)], now), 110.0);
        assert_eq!(score_time_slot(slot, 30, &[near(300)], now), 100.0);
        // each task applies independently
        assert_eq!(score_time_slot(slot, 30, &[near(30), near(-120)], now), 70.0);
    }

    #[test]
    fn test_score_tolerates_huge_estimates() {
        let now = at(2026, 2, 23, 8, 0);
        let slot = now + Duration::hours(24);
        let busy = Task::new("s", "busy")
            .with_due_date(slot + Duration::minutes(30))
            .with_estimated_duration(u32::MAX);
        assert_eq!(score_time_slot(slot, 30, &[busy], now), 60.0);
    }

    #[tokio::test]
    async fn test_suggest_optimal_time_avoids_conflict() {
        // now: Monday 2026-02-23 08:00 UTC
        let now = at(2026, 2, 23, 8, 0);
        let mut history = Vec::new();
        for (i, ts) in [
            at(2026, 2, 16, 10, 0),
            at(2026, 2, 9, 10, 0),
            at(2026, 2, 2, 10, 0),
            at(2026, 2, 17, 10, 0),
            at(2026, 2, 10, 10, 0),
        ]
        .into_iter()
        .enumerate()
        {
            history.push(
                Task::new(format!("h{i}"), "A much longer finished task title here")
                    .with_description("notes")
                    .with_priority(Priority::Low)
                    .with_status(TaskStatus::Done)
                    .with_timestamps(ts - Duration::minutes(90), ts),
            );
        }
        history.push(
            Task::new("busy", "Standup")
                .with_due_date(at(2026, 2, 23, 10, 30))
                .with_estimated_duration(60),
        );

        let mut p = predictor(MemorySource::new().with_tasks("u1", history), now);
        p.initialize("u1").await;

        let task = Task::new("new", "Plan");
        let s = p.suggest_optimal_time("u1", &task).await.unwrap();

        assert_eq!(s.estimated_duration, 30);
        // Monday 10:00 collides with the standup; Tuesday 10:00 is clear.
        assert_eq!(s.suggested_time, Some(at(2026, 2, 24, 10, 0)));
        assert_eq!(s.score, 100.0);
    }

    #[tokio::test]
    async fn test_suggest_without_pattern_is_none() {
        let p = predictor(MemorySource::new(), at(2026, 2, 23, 8, 0));
        assert!(p.suggest_optimal_time("u1", &Task::new("t", "x")).await.is_none());
    }
}
