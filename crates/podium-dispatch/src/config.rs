//! Dispatch configuration.
//!
//! A [`DispatchConfig`] is built once, wrapped in an `Arc` by the dispatcher and
//! handed to every request as a read-only snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings consulted while dispatching a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Engine used when an exposition names a template but no engine.
    pub default_renderer: String,
    /// Content type suggested for actions that expose no template at all.
    pub default_content_type: String,
    /// Request parameters dropped before validation ever sees them.
    pub ignore_parameters: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_renderer: "jinja".into(),
            default_content_type: "text/html".into(),
            ignore_parameters: Vec::new(),
        }
    }
}

/// Error raised while loading a [`DispatchConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid dispatch configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl DispatchConfig {
    /// Parses a configuration document. JSON input is accepted as well, being
    /// valid YAML.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }
}
