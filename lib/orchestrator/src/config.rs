//! Turn orchestrator configuration.

use serde::Deserialize;
use std::time::Duration;

/// Turn orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Time budget for each collaborator call, in milliseconds.
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,

    /// Extra attempts for an action call that timed out.
    #[serde(default = "default_action_timeout_retries")]
    pub action_timeout_retries: u32,
}

fn default_collaborator_timeout_ms() -> u64 {
    5000
}

fn default_action_timeout_retries() -> u32 {
    1
}

impl OrchestratorConfig {
    /// Returns the collaborator timeout as a duration.
    #[must_use]
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
            action_timeout_retries: default_action_timeout_retries(),
        }
    }
}
