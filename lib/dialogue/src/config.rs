//! Dialogue policy configuration.

use crate::catalog::GoalCatalog;
use serde::Deserialize;

/// Dialogue policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Number of recent turns kept in a context.
    #[serde(default = "default_recent_turns_cap")]
    pub recent_turns_cap: usize,

    /// How much more confident a new intent must be than the active goal to
    /// switch topics.
    #[serde(default = "default_intent_switch_confidence_margin")]
    pub intent_switch_confidence_margin: f64,

    /// Understanding below this confidence is answered with a clarification.
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,

    /// Intents that end the conversation.
    #[serde(default = "default_terminate_intents")]
    pub terminate_intents: Vec<String>,

    /// Intents that accept a proposed action.
    #[serde(default = "default_affirm_intents")]
    pub affirm_intents: Vec<String>,

    /// Intents that decline a proposed action.
    #[serde(default = "default_deny_intents")]
    pub deny_intents: Vec<String>,

    /// Intent answered with a greeting.
    #[serde(default = "default_greet_intent")]
    pub greet_intent: String,

    /// Long-term memory key looked up when greeting.
    #[serde(default = "default_greet_knowledge_key")]
    pub greet_knowledge_key: String,

    /// Goals the assistant can complete.
    #[serde(default)]
    pub catalog: GoalCatalog,
}

fn default_recent_turns_cap() -> usize {
    5
}

fn default_intent_switch_confidence_margin() -> f64 {
    0.15
}

fn default_low_confidence_threshold() -> f64 {
    0.5
}

fn default_terminate_intents() -> Vec<String> {
    ["farewell", "goodbye", "end_conversation"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_affirm_intents() -> Vec<String> {
    vec!["affirm".to_string(), "yes".to_string()]
}

fn default_deny_intents() -> Vec<String> {
    vec!["deny".to_string(), "no".to_string()]
}

fn default_greet_intent() -> String {
    "greet".to_string()
}

fn default_greet_knowledge_key() -> String {
    "user_name".to_string()
}

impl PolicyConfig {
    /// Returns true if `intent` ends the conversation.
    #[must_use]
    pub fn is_terminate(&self, intent: &str) -> bool {
        self.terminate_intents.iter().any(|i| i == intent)
    }

    /// Returns true if `intent` accepts a proposed action.
    #[must_use]
    pub fn is_affirm(&self, intent: &str) -> bool {
        self.affirm_intents.iter().any(|i| i == intent)
    }

    /// Returns true if `intent` declines a proposed action.
    #[must_use]
    pub fn is_deny(&self, intent: &str) -> bool {
        self.deny_intents.iter().any(|i| i == intent)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            recent_turns_cap: default_recent_turns_cap(),
            intent_switch_confidence_margin: default_intent_switch_confidence_margin(),
            low_confidence_threshold: default_low_confidence_threshold(),
            terminate_intents: default_terminate_intents(),
            affirm_intents: default_affirm_intents(),
            deny_intents: default_deny_intents(),
            greet_intent: default_greet_intent(),
            greet_knowledge_key: default_greet_knowledge_key(),
            catalog: GoalCatalog::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PolicyConfig::default();
        assert_eq!(config.recent_turns_cap, 5);
        assert!((config.intent_switch_confidence_margin - 0.15).abs() < f64::EPSILON);
        assert!((config.low_confidence_threshold - 0.5).abs() < f64::EPSILON);
        assert!(config.is_terminate("goodbye"));
        assert!(config.is_affirm("yes"));
        assert!(config.is_deny("deny"));
        assert!(!config.is_deny("affirm"));
        assert_eq!(config.catalog.len(), 5);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"recent_turns_cap": 3, "terminate_intents": ["bye"]}"#)
                .unwrap();

        assert_eq!(config.recent_turns_cap, 3);
        assert!(config.is_terminate("bye"));
        assert!(!config.is_terminate("farewell"));
        assert_eq!(config.greet_intent, "greet");
        assert!(config.catalog.contains("book_flight"));
    }
}
