//! tempo-core: workload prediction, day/week planning and due-date reminders for tempo

pub mod clock;
pub mod planner;
pub mod preferences;
pub mod rebalance;
pub mod reminders;
pub mod source;
pub mod task;
pub mod time;
pub mod workload;

pub use clock::{Clock, FixedClock, SystemClock};
pub use planner::{DayPlan, PlanEntry, TaskPlanner, WeekPlan, WeekPlanDay};
pub use preferences::{load_preferences, UserPreferences, WorkingHours};
pub use rebalance::{suggest_reallocations, DailyWorkload, ReallocationResult, ReallocationSuggestion};
pub use reminders::{due_reminders, should_notify, QuietHours, Reminder, ReminderScheduler};
pub use source::{MemorySource, PreferenceSource, TaskSource};
pub use task::{Priority, Task, TaskStatus};
pub use workload::{
    extract_features, rule_based_estimate, score_time_slot, TaskFeature, TimeSuggestion, UserPattern,
    WorkloadPredictor,
};
