use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::AgentResult;

/// How tool-dispatch failures (unknown tool, invalid arguments) are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Abort the conversation with the error
    #[default]
    Strict,
    /// Report the error to the model as the tool result and keep going
    Graceful,
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMode::Strict => f.write_str("strict"),
            ErrorMode::Graceful => f.write_str("graceful"),
        }
    }
}

/// Settings fixed when an agent is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub error_mode: ErrorMode,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            error_mode: ErrorMode::default(),
        }
    }
}

impl AgentSettings {
    /// Load settings from `AGENTLOOP_*` environment variables over the defaults.
    ///
    /// `AGENTLOOP_MODEL` selects the model, `AGENTLOOP_ERROR_MODE` is `strict` or `graceful`.
    pub fn from_env() -> AgentResult<Self> {
        let config = Self::defaults()?.add_source(environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load settings from a file (any format the `config` crate detects from the
    /// extension), with environment variables taking precedence.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AgentResult<Self> {
        let config = Self::defaults()?
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn defaults() -> AgentResult<ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("model", default_model())?
            .set_default("error_mode", ErrorMode::default().to_string())?)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("AGENTLOOP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
