//! Driver configuration.
//!
//! Composed from the library configs and loaded via the `config` crate from
//! an optional file plus `VIKI`-prefixed environment variables, with `__`
//! between path segments (`VIKI__STORE__TTL_SECONDS=600`). Environment
//! variables win over the file.

use serde::Deserialize;
use std::path::Path;
use viki_dialogue::PolicyConfig;
use viki_memory::StoreConfig;
use viki_orchestrator::OrchestratorConfig;

/// Driver configuration composed from library configs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurndConfig {
    /// Context store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Dialogue policy configuration.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Turn orchestrator configuration.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Turns processed at once.
    #[serde(default = "default_max_concurrent_turns")]
    pub max_concurrent_turns: usize,
}

fn default_max_concurrent_turns() -> usize {
    32
}

impl TurndConfig {
    /// Loads configuration from `file` (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::from_sources(file, environment())
    }

    fn from_sources(
        file: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder.add_source(env).build()?.try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("VIKI")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("policy.terminate_intents")
        .with_list_parse_key("policy.affirm_intents")
        .with_list_parse_key("policy.deny_intents")
}
