//! Loads the built-in plugins into a registry.

use chrono_tz::Tz;
use std::sync::Arc;
use tempo_core::{Clock, TaskSource};
use tracing::{error, info, warn};

use crate::builtin::{CalendarPlugin, EventSource, TaskAnalysisPlugin, WeatherPlugin};
use crate::error::PluginError;
use crate::plugin::Plugin;
use crate::registry::PluginRegistry;

/// Collaborators the built-in plugins need.
#[derive(Clone)]
pub struct BuiltinDeps {
    pub tasks: Arc<dyn TaskSource>,
    pub events: Option<Arc<dyn EventSource>>,
    pub clock: Arc<dyn Clock>,
    pub tz: Tz,
    pub weather_api_key: Option<String>,
}

pub fn builtin_plugins(deps: BuiltinDeps) -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(WeatherPlugin::new(deps.weather_api_key)),
        Box::new(CalendarPlugin::new(deps.events, deps.clock.clone())),
        Box::new(TaskAnalysisPlugin::new(deps.tasks, deps.clock, deps.tz)),
    ]
}

#[derive(Debug, Default)]
pub struct PluginLoader {
    loaded: bool,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Initialise and register `plugins`. Only the first call does anything.
    ///
    /// A plugin whose `init` fails, or whose registration is rejected, is
    /// logged and skipped. Returns how many plugins were registered.
    pub fn load(&mut self, registry: &PluginRegistry, plugins: Vec<Box<dyn Plugin>>) -> usize {
        if self.loaded {
            return 0;
        }

        let mut registered = 0;
        for mut plugin in plugins {
            let id = plugin.manifest().id.clone();
            if let Err(e) = plugin.init() {
                warn!(plugin = %id, error = %e, "Plugin init failed, skipping registration");
                continue;
            }
            match registry.register(Arc::from(plugin)) {
                Ok(()) => registered += 1,
                Err(e @ PluginError::DuplicateId(_)) => warn!(plugin = %id, error = %e, "Plugin skipped"),
                Err(e) => error!(plugin = %id, error = %e, "Plugin load failed"),
            }
        }

        self.loaded = true;
        info!(registered, total = registry.len(), "Plugins loaded");
        registered
    }
}
