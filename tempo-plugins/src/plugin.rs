//! Plugin trait, manifest and config schema.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PluginError, Result};

/// Points in prompt preparation where plugins can hook in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    /// Before plugin data is gathered for a prompt
    BeforePrompt,
    /// After the prompt has been enhanced
    AfterPrompt,
    /// Supplies data referenced by `{{pluginId:path}}` markers
    DataProvider,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforePrompt => write!(f, "beforePrompt"),
            Self::AfterPrompt => write!(f, "afterPrompt"),
            Self::DataProvider => write!(f, "dataProvider"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Object => write!(f, "object"),
        }
    }
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ConfigField {
    pub fn new(field_type: FieldType, description: impl Into<String>) -> Self {
        Self {
            field_type,
            description: description.into(),
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

pub type ConfigSchema = BTreeMap<String, ConfigField>;

/// Check `config` against `schema`.
///
/// Required fields must be present and non-null. Present non-null fields must
/// match their declared type. Keys the schema does not mention are allowed.
pub fn validate_config(id: &str, schema: &ConfigSchema, config: &Map<String, Value>) -> Result<()> {
    for (key, field) in schema {
        match config.get(key) {
            None | Some(Value::Null) if field.required => {
                return Err(PluginError::InvalidConfig {
                    id: id.to_string(),
                    reason: format!("missing required field '{key}'"),
                });
            }
            Some(v) if !v.is_null() && !field.field_type.accepts(v) => {
                return Err(PluginError::InvalidConfig {
                    id: id.to_string(),
                    reason: format!("field '{key}' must be a {}", field.field_type),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Static description of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    /// Whether the plugin starts enabled once registered.
    pub enabled: bool,
    pub hooks: Vec<HookKind>,
    #[serde(default)]
    pub config_schema: ConfigSchema,
}

impl PluginManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            author: String::new(),
            enabled: true,
            hooks: Vec::new(),
            config_schema: ConfigSchema::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_hooks(mut self, hooks: &[HookKind]) -> Self {
        self.hooks = hooks.to_vec();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, field: ConfigField) -> Self {
        self.config_schema.insert(key.into(), field);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Config built from schema defaults.
    pub fn default_config(&self) -> Map<String, Value> {
        self.config_schema
            .iter()
            .filter_map(|(k, f)| f.default.clone().map(|d| (k.clone(), d)))
            .collect()
    }
}

/// What a hook invocation sees: the caller's context plus the plugin's
/// current config.
#[derive(Debug, Clone, Default)]
pub struct HookInput {
    pub context: Value,
    pub config: Map<String, Value>,
}

impl HookInput {
    /// String config value, if set and non-empty.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// String context value, if set and non-empty.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> &PluginManifest;

    /// Config the plugin starts with. Defaults to the schema defaults.
    fn initial_config(&self) -> Map<String, Value> {
        self.manifest().default_config()
    }

    /// Runs once before registration; an error keeps the plugin out of the registry.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run `hook`. Only called for hooks listed in the manifest.
    async fn call(&self, hook: HookKind, input: &HookInput) -> anyhow::Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ConfigSchema {
        PluginManifest::new("w", "Weather")
            .with_field("apiKey", ConfigField::new(FieldType::String, "API key").required())
            .with_field(
                "location",
                ConfigField::new(FieldType::String, "Default location").with_default(json!("Beijing,CN")),
            )
            .config_schema
    }

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_config_takes_schema_defaults() {
        let m = PluginManifest::new("w", "Weather").with_field(
            "location",
            ConfigField::new(FieldType::String, "Default location").with_default(json!("Beijing,CN")),
        );
        assert_eq!(m.default_config(), map(json!({"location": "Beijing,CN"})));
    }

    #[test]
    fn test_required_field_must_be_present() {
        let err = validate_config("w", &schema(), &map(json!({"location": "Paris"}))).unwrap_err();
        assert!(err.to_string().contains("apiKey"));

        let err = validate_config("w", &schema(), &map(json!({"apiKey": null}))).unwrap_err();
        assert!(matches!(err, PluginError::InvalidConfig { .. }));
    }

    #[test]
    fn test_field_types_are_checked() {
        let err = validate_config("w", &schema(), &map(json!({"apiKey": 42}))).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
        assert!(validate_config("w", &schema(), &map(json!({"apiKey": "k", "extra": 1}))).is_ok());
    }

    #[test]
    fn test_hook_kind_wire_names() {
        assert_eq!(HookKind::DataProvider.to_string(), "dataProvider");
        assert_eq!(serde_json::to_value(HookKind::BeforePrompt).unwrap(), json!("beforePrompt"));
    }
}
