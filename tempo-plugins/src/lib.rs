//! tempo-plugins: plugin registry, built-in data providers and prompt enhancement

pub mod builtin;
pub mod cache;
pub mod enhancer;
pub mod error;
pub mod loader;
pub mod plugin;
pub mod registry;

pub use cache::{canonical_key, TtlCache};
pub use enhancer::{replace_markers, PromptEnhancer, PLUGIN_DATA_TTL_MINUTES};
pub use error::{PluginError, Result};
pub use loader::{builtin_plugins, BuiltinDeps, PluginLoader};
pub use plugin::{validate_config, ConfigField, ConfigSchema, FieldType, HookInput, HookKind, Plugin, PluginManifest};
pub use registry::{PluginDescriptor, PluginRegistry};
