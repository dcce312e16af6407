//! `calendar-plugin`: upcoming events from an external calendar.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tempo_core::Clock;
use tracing::warn;

use crate::error::PluginError;
use crate::plugin::{ConfigField, FieldType, HookInput, HookKind, Plugin, PluginManifest};

pub const ID: &str = "calendar-plugin";
pub const DEFAULT_CALENDAR_ID: &str = "primary";
/// Days of events served, starting now.
pub const LOOKAHEAD_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events overlapping `[from, to)` on `calendar_id`, earliest first.
    async fn events_between(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;
}

pub struct CalendarPlugin {
    manifest: PluginManifest,
    source: Option<Arc<dyn EventSource>>,
    clock: Arc<dyn Clock>,
}

impl CalendarPlugin {
    pub fn new(source: Option<Arc<dyn EventSource>>, clock: Arc<dyn Clock>) -> Self {
        let manifest = PluginManifest::new(ID, "Calendar")
            .with_description("Upcoming calendar events for schedule-aware prompts")
            .with_author("tempo")
            .with_hooks(&[HookKind::DataProvider])
            .with_field(
                "calendarId",
                ConfigField::new(FieldType::String, "Calendar id").with_default(json!(DEFAULT_CALENDAR_ID)),
            );
        Self {
            manifest,
            source,
            clock,
        }
    }
}

#[async_trait]
impl Plugin for CalendarPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn init(&mut self) -> std::result::Result<(), PluginError> {
        if self.source.is_none() {
            return Err(PluginError::InitFailed {
                id: ID.to_string(),
                reason: "no event source configured".to_string(),
            });
        }
        Ok(())
    }

    async fn call(&self, _hook: HookKind, input: &HookInput) -> Result<Value> {
        let Some(source) = &self.source else {
            return Ok(json!({ "error": "Calendar plugin is not initialized" }));
        };

        let calendar_id = input.config_str("calendarId").unwrap_or(DEFAULT_CALENDAR_ID);
        let now = self.clock.now();
        let until = now + Duration::days(LOOKAHEAD_DAYS);

        match source.events_between(calendar_id, now, until).await {
            Ok(mut events) => {
                events.sort_by_key(|e| e.start);
                Ok(json!({
                    "summary": format!("{} upcoming calendar events", events.len()),
                    "events": events,
                }))
            }
            Err(e) => {
                warn!(calendar_id, error = %format!("{e:#}"), "calendar-plugin: event fetch failed");
                Ok(json!({
                    "error": "Unable to fetch calendar events",
                    "details": format!("{e:#}"),
                }))
            }
        }
    }
}
