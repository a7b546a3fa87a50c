//! Runtime configuration.
//!
//! A [`Config`] is handed to [`Runtime::with_config`](crate::Runtime::with_config).
//! Every field has a default, so partial JSON documents and empty environments
//! are fine.

use serde::{Deserialize, Serialize};

/// Environment variable enabling creation traces.
pub const KEEP_TRACES_ENV: &str = "DATAVERSE_KEEP_TRACES";

/// Environment variable overriding the evaluation depth limit.
pub const MAX_EVALUATION_DEPTH_ENV: &str = "DATAVERSE_MAX_EVALUATION_DEPTH";

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture a backtrace when each derivation is created.
    ///
    /// Expensive; meant for tracking down where a misbehaving derivation
    /// came from.
    pub keep_traces: bool,

    /// How many derivations may be evaluating inside one another before
    /// evaluation fails with [`Error::EvaluationTooDeep`](crate::Error::EvaluationTooDeep).
    pub max_evaluation_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keep_traces: false,
            max_evaluation_depth: 512,
        }
    }
}

impl Config {
    /// Build a configuration from the process environment, falling back to
    /// the defaults for unset or unparseable variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup(KEEP_TRACES_ENV) {
            config.keep_traces = matches!(value.trim(), "1" | "true" | "yes" | "on");
        }

        if let Some(depth) = lookup(MAX_EVALUATION_DEPTH_ENV)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|depth| *depth > 0)
        {
            config.max_evaluation_depth = depth;
        }

        config
    }
}
