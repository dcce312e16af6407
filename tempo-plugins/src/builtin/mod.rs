//! Plugins shipped with tempo.

pub mod calendar;
pub mod task_analysis;
pub mod weather;

pub use calendar::{CalendarEvent, CalendarPlugin, EventSource};
pub use task_analysis::TaskAnalysisPlugin;
pub use weather::WeatherPlugin;
