//! Prompt enhancement with plugin data.
//!
//! `{{pluginId:path}}` markers in a prompt are replaced with values from the
//! data providers' output. `path` is dot-separated and may index arrays, so
//! `{{weather:temperature}}` and `{{calendar-plugin:events.0.title}}` both work.

use chrono::Duration;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock};
use tempo_core::Clock;
use tracing::debug;

use crate::cache::{canonical_key, TtlCache};
use crate::plugin::HookKind;
use crate::registry::PluginRegistry;

/// How long collected plugin data is reused for an identical context.
pub const PLUGIN_DATA_TTL_MINUTES: i64 = 5;

fn marker_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{\{([a-zA-Z0-9_-]+):([\w.]+)\}\}").expect("Invalid regex"))
}

pub struct PromptEnhancer {
    registry: Arc<PluginRegistry>,
    cache: TtlCache<String, Map<String, Value>>,
}

impl PromptEnhancer {
    pub fn new(registry: Arc<PluginRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(registry, clock, Duration::minutes(PLUGIN_DATA_TTL_MINUTES))
    }

    pub fn with_ttl(registry: Arc<PluginRegistry>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            registry,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Substitute plugin data into `base_prompt`.
    ///
    /// Runs `beforePrompt` hooks, collects data providers' output (cached per
    /// context), substitutes markers, then runs `afterPrompt` hooks with the
    /// context extended by `basePrompt`, `enhancedPrompt` and `pluginData`.
    /// Hook results are not used to alter the prompt.
    pub async fn enhance_prompt(&self, base_prompt: &str, context: &Value) -> String {
        self.registry.execute_hook(HookKind::BeforePrompt, context).await;

        let plugin_data = self.plugin_data(context).await;
        let enhanced = replace_markers(base_prompt, &plugin_data);

        let mut after = match context {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        after.insert("basePrompt".into(), json!(base_prompt));
        after.insert("enhancedPrompt".into(), json!(enhanced));
        after.insert("pluginData".into(), Value::Object(plugin_data));
        self.registry
            .execute_hook(HookKind::AfterPrompt, &Value::Object(after))
            .await;

        enhanced
    }

    async fn plugin_data(&self, context: &Value) -> Map<String, Value> {
        let key = canonical_key(context);
        if let Some(hit) = self.cache.get(&key) {
            debug!(providers = hit.len(), "enhancer: plugin data cache hit");
            return hit;
        }

        let data = self.registry.collect_data(context).await;
        debug!(providers = data.len(), "enhancer: plugin data collected");
        self.cache.insert(key, data.clone());
        data
    }

    /// Forget cached plugin data.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Replace every `{{pluginId:path}}` marker in `prompt`.
pub fn replace_markers(prompt: &str, plugin_data: &Map<String, Value>) -> String {
    marker_regex()
        .replace_all(prompt, |caps: &Captures| {
            let plugin_id = &caps[1];
            let path = &caps[2];

            let data = match plugin_data.get(plugin_id) {
                Some(v) if !v.is_null() => v,
                _ => return format!("[plugin data unavailable: {plugin_id}]"),
            };

            match lookup_path(data, path) {
                Some(value) => render(value),
                None => format!("[path not found in {plugin_id}: {path}]"),
            }
        })
        .into_owned()
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{HookInput, Plugin, PluginManifest};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempo_core::FixedClock;

    struct Weather {
        manifest: PluginManifest,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for Weather {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        async fn call(&self, _hook: HookKind, _input: &HookInput) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"temperature": 21, "condition": "Clear", "hourly": [{"t": 20}, {"t": 22}]}))
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(HookKind, Value)>>,
    }

    struct Spy {
        manifest: PluginManifest,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl Plugin for Spy {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        async fn call(&self, hook: HookKind, input: &HookInput) -> anyhow::Result<Value> {
            self.recorder.seen.lock().unwrap().push((hook, input.context.clone()));
            Ok(json!({"note": "ignored"}))
        }
    }

    fn setup() -> (Arc<PluginRegistry>, Arc<Weather>, Arc<FixedClock>, PromptEnhancer) {
        let registry = Arc::new(PluginRegistry::new());
        let weather = Arc::new(Weather {
            manifest: PluginManifest::new("weather", "Weather").with_hooks(&[HookKind::DataProvider]),
            calls: AtomicUsize::new(0),
        });
        registry.register(weather.clone()).unwrap();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 2, 23, 9, 0, 0).unwrap()));
        let enhancer = PromptEnhancer::new(registry.clone(), clock.clone());
        (registry, weather, clock, enhancer)
    }

    #[tokio::test]
    async fn test_substitutes_scalar_markers() {
        let (_, _, _, enhancer) = setup();
        let out = enhancer
            .enhance_prompt("It is {{weather:temperature}}C and {{weather:condition}}.", &json!({}))
            .await;
        assert_eq!(out, "It is 21C and Clear.");
    }

    #[tokio::test]
    async fn test_missing_plugin_and_path_get_markers() {
        let (_, _, _, enhancer) = setup();
        let out = enhancer
            .enhance_prompt("{{news:headline}} / {{weather:wind.speed}}", &json!({}))
            .await;
        assert_eq!(
            out,
            "[plugin data unavailable: news] / [path not found in weather: wind.speed]"
        );
    }

    #[tokio::test]
    async fn test_disabled_provider_is_unavailable() {
        let (registry, _, _, enhancer) = setup();
        registry.disable_plugin("weather");
        let out = enhancer.enhance_prompt("{{weather:temperature}}", &json!({})).await;
        assert_eq!(out, "[plugin data unavailable: weather]");
    }

    #[tokio::test]
    async fn test_objects_and_array_indices_render() {
        let (_, _, _, enhancer) = setup();
        let out = enhancer
            .enhance_prompt("{{weather:hourly.1.t}} {{weather:hourly.0}}", &json!({}))
            .await;
        assert_eq!(out, r#"22 {"t":20}"#);
    }

    #[tokio::test]
    async fn test_plugin_data_is_cached_per_context_until_expiry() {
        let (_, weather, clock, enhancer) = setup();
        let ctx_a = json!({"user": "u1", "location": "Paris"});
        let ctx_a_reordered = json!({"location": "Paris", "user": "u1"});

        enhancer.enhance_prompt("{{weather:temperature}}", &ctx_a).await;
        enhancer.enhance_prompt("{{weather:temperature}}", &ctx_a_reordered).await;
        assert_eq!(weather.calls.load(Ordering::SeqCst), 1);

        enhancer.enhance_prompt("{{weather:temperature}}", &json!({"user": "u2"})).await;
        assert_eq!(weather.calls.load(Ordering::SeqCst), 2);

        clock.advance(Duration::minutes(PLUGIN_DATA_TTL_MINUTES));
        enhancer.enhance_prompt("{{weather:temperature}}", &ctx_a).await;
        assert_eq!(weather.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stale_contexts_do_not_accumulate() {
        let (_, weather, clock, enhancer) = setup();
        for i in 0..1000 {
            enhancer
                .enhance_prompt("{{weather:temperature}}", &json!({"userId": format!("u{i}")}))
                .await;
        }
        assert_eq!(enhancer.cache.len(), 1000);

        clock.advance(Duration::hours(24));
        enhancer.enhance_prompt("{{weather:temperature}}", &json!({"userId": "late"})).await;
        assert_eq!(enhancer.cache.len(), 1);
        assert_eq!(weather.calls.load(Ordering::SeqCst), 1001);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_a_fresh_collect() {
        let (_, weather, _, enhancer) = setup();
        enhancer.enhance_prompt("{{weather:temperature}}", &json!({})).await;
        enhancer.clear_cache();
        assert!(enhancer.cache.is_empty());
        enhancer.enhance_prompt("{{weather:temperature}}", &json!({})).await;
        assert_eq!(weather.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_prompt_hooks_see_context_and_results() {
        let (registry, _, _, enhancer) = setup();
        let recorder = Arc::new(Recorder::default());
        registry
            .register(Arc::new(Spy {
                manifest: PluginManifest::new("spy", "Spy")
                    .with_hooks(&[HookKind::BeforePrompt, HookKind::AfterPrompt]),
                recorder: recorder.clone(),
            }))
            .unwrap();

        let out = enhancer
            .enhance_prompt("Temp {{weather:temperature}}", &json!({"user": "u1"}))
            .await;
        assert_eq!(out, "Temp 21");

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (HookKind::BeforePrompt, json!({"user": "u1"})));
        let (hook, after) = &seen[1];
        assert_eq!(*hook, HookKind::AfterPrompt);
        assert_eq!(after["user"], json!("u1"));
        assert_eq!(after["basePrompt"], json!("Temp {{weather:temperature}}"));
        assert_eq!(after["enhancedPrompt"], json!("Temp 21"));
        assert_eq!(after["pluginData"]["weather"]["temperature"], json!(21));
    }

    #[test]
    fn test_text_without_markers_is_unchanged() {
        let data = Map::new();
        assert_eq!(replace_markers("plain {text} {{bad marker}}", &data), "plain {text} {{bad marker}}");
    }
}
