//! Error types for plugin registration and configuration
//!
//! Hook execution failures are not represented here: a plugin that fails while
//! running a hook is isolated by the registry and reported as an `{"error": ...}`
//! entry in the hook results, so one bad plugin never aborts a pass.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    /// Plugin manifest lacks an id or a name
    #[error("Plugin must have a non-empty id and name")]
    MissingIdentity,

    /// A plugin with this id is already registered
    #[error("Plugin id '{0}' is already registered")]
    DuplicateId(String),

    /// No plugin with this id
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// `Plugin::init` refused to start
    ///
    /// The loader logs this and skips registration.
    #[error("Plugin '{id}' failed to initialize: {reason}")]
    InitFailed { id: String, reason: String },

    /// Config does not satisfy the plugin's schema
    #[error("Invalid config for plugin '{id}': {reason}")]
    InvalidConfig { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PluginError>;
