//! Plugin registry: holds registered plugins and dispatches hooks.
//!
//! The registry is an ordinary value shared behind an `Arc`; callers that need
//! isolation (tests, multiple users) build their own instance.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

use crate::error::{PluginError, Result};
use crate::plugin::{validate_config, ConfigSchema, HookInput, HookKind, Plugin};

/// Snapshot of a registered plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub enabled: bool,
    pub hooks: Vec<HookKind>,
    pub config_schema: ConfigSchema,
    pub config: Map<String, Value>,
}

struct Record {
    plugin: Arc<dyn Plugin>,
    enabled: bool,
    config: Map<String, Value>,
}

impl Record {
    fn descriptor(&self) -> PluginDescriptor {
        let m = self.plugin.manifest();
        PluginDescriptor {
            id: m.id.clone(),
            name: m.name.clone(),
            description: m.description.clone(),
            version: m.version.clone(),
            author: m.author.clone(),
            enabled: self.enabled,
            hooks: m.hooks.clone(),
            config_schema: m.config_schema.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Ids in registration order.
    order: Vec<String>,
    records: HashMap<String, Record>,
    hook_index: HashMap<HookKind, Vec<String>>,
}

#[derive(Default)]
pub struct PluginRegistry {
    inner: RwLock<Inner>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a plugin and index its declared hooks.
    ///
    /// Fails without touching the registry if the id or name is empty or the
    /// id is taken.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let manifest = plugin.manifest();
        if manifest.id.is_empty() || manifest.name.is_empty() {
            return Err(PluginError::MissingIdentity);
        }

        let id = manifest.id.clone();
        let enabled = manifest.enabled;
        let mut inner = self.write();
        if inner.records.contains_key(&id) {
            return Err(PluginError::DuplicateId(id));
        }

        for hook in &manifest.hooks {
            let ids = inner.hook_index.entry(*hook).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }

        info!(
            plugin_id = %id,
            plugin_name = %manifest.name,
            hooks = manifest.hooks.len(),
            enabled,
            "Plugin registered"
        );

        let record = Record {
            enabled,
            config: plugin.initial_config(),
            plugin,
        };
        inner.order.push(id.clone());
        inner.records.insert(id, record);
        Ok(())
    }

    pub fn get_all_plugins(&self) -> Vec<PluginDescriptor> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .map(Record::descriptor)
            .collect()
    }

    pub fn get_plugin(&self, id: &str) -> Option<PluginDescriptor> {
        self.read().records.get(id).map(Record::descriptor)
    }

    pub fn get_enabled_plugins(&self) -> Vec<PluginDescriptor> {
        self.get_all_plugins().into_iter().filter(|p| p.enabled).collect()
    }

    /// Returns `false` if `id` is unknown.
    pub fn enable_plugin(&self, id: &str) -> bool {
        self.set_enabled(id, true)
    }

    /// Returns `false` if `id` is unknown.
    pub fn disable_plugin(&self, id: &str) -> bool {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.write().records.get_mut(id) {
            Some(record) => {
                record.enabled = enabled;
                debug!(plugin_id = id, enabled, "Plugin toggled");
                true
            }
            None => false,
        }
    }

    /// Shallow-merge `patch` into the plugin's config after validating the
    /// merged result. Returns the new config.
    pub fn update_plugin_config(&self, id: &str, patch: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut inner = self.write();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        let mut merged = record.config.clone();
        merged.extend(patch);
        validate_config(id, &record.plugin.manifest().config_schema, &merged)?;

        record.config = merged.clone();
        info!(plugin_id = id, "Plugin config updated");
        Ok(merged)
    }

    /// Run `hook` on every enabled plugin that declares it, in registration
    /// order. Results are keyed by plugin id; a failing plugin contributes
    /// `{"error": message}` and the pass continues.
    pub async fn execute_hook(&self, hook: HookKind, context: &Value) -> Map<String, Value> {
        // Clone handles out so the lock is not held across plugin calls.
        let targets: Vec<(String, Arc<dyn Plugin>, HookInput)> = {
            let inner = self.read();
            inner
                .hook_index
                .get(&hook)
                .into_iter()
                .flatten()
                .filter_map(|id| inner.records.get(id).map(|r| (id, r)))
                .filter(|(_, r)| r.enabled)
                .map(|(id, r)| {
                    let input = HookInput {
                        context: context.clone(),
                        config: r.config.clone(),
                    };
                    (id.clone(), r.plugin.clone(), input)
                })
                .collect()
        };

        let mut results = Map::new();
        for (id, plugin, input) in targets {
            match plugin.call(hook, &input).await {
                Ok(value) => {
                    results.insert(id, value);
                }
                Err(e) => {
                    error!(plugin = %id, hook = %hook, error = %e, "Plugin hook execution failed");
                    results.insert(id, json!({ "error": e.to_string() }));
                }
            }
        }
        results
    }

    /// Gather data from every enabled data provider.
    pub async fn collect_data(&self, context: &Value) -> Map<String, Value> {
        self.execute_hook(HookKind::DataProvider, context).await
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
