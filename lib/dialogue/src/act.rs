//! Decision types produced by the dialogue policy.

use crate::state::DialogueState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use viki_core::{ActionRequest, ConversationContext, KnowledgeQuery};

/// Symbolic name of what the assistant intends to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActKind {
    /// Greet the user.
    Greet,
    /// Say goodbye; the conversation is over.
    Farewell,
    /// Ask for the value of a missing slot.
    AskQuestion,
    /// Ask the user to rephrase or clarify.
    AskClarification,
    /// Propose an action and wait for yes/no.
    ConfirmAction,
    /// Tell the user the action is being carried out.
    ExecuteAction,
    /// Report a successful action's result.
    InformResult,
    /// Report that the action could not be carried out.
    ActionFailed,
    /// Acknowledge that the user declined the proposed action.
    ActionCancelled,
    /// An action result arrived that no goal was waiting for.
    StaleActionResult,
}

impl ActKind {
    /// Returns the wire name of this act.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greet => "greet",
            Self::Farewell => "farewell",
            Self::AskQuestion => "ask_question",
            Self::AskClarification => "ask_clarification",
            Self::ConfirmAction => "confirm_action",
            Self::ExecuteAction => "execute_action",
            Self::InformResult => "inform_result",
            Self::ActionFailed => "action_failed",
            Self::ActionCancelled => "action_cancelled",
            Self::StaleActionResult => "stale_action_result",
        }
    }
}

impl std::fmt::Display for ActKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dialogue act plus the parameters response generation needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueAct {
    /// What to say.
    #[serde(rename = "name")]
    pub kind: ActKind,
    /// Content for response generation.
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
}

impl DialogueAct {
    /// Creates an act with no parameters.
    #[must_use]
    pub fn new(kind: ActKind) -> Self {
        Self {
            kind,
            parameters: Map::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Sets a parameter in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Reads a string parameter.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(JsonValue::as_str)
    }
}

/// Conversation status reported with every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// The conversation continues.
    Active,
    /// A proposed action waits for the user's yes/no.
    AwaitingConfirmation,
    /// The conversation is over.
    Ended,
}

impl ConversationStatus {
    /// Returns true if the conversation is over.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

/// The policy's decision for one turn.
///
/// Action and knowledge requests are described here, not executed; the
/// orchestrator dispatches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDecision {
    /// What the assistant says next.
    pub next_dialogue_act: DialogueAct,
    /// Action to dispatch to the executor, if any.
    pub action_request: Option<ActionRequest>,
    /// Fact to look up in long-term memory, if any.
    pub knowledge_query: Option<KnowledgeQuery>,
    /// The context to persist.
    pub updated_context: ConversationContext,
    /// Conversation status after this turn.
    pub conversation_status: ConversationStatus,
}

impl TurnDecision {
    /// Creates a decision with no collaborator requests.
    #[must_use]
    pub fn new(
        act: DialogueAct,
        updated_context: ConversationContext,
        conversation_status: ConversationStatus,
    ) -> Self {
        Self {
            next_dialogue_act: act,
            action_request: None,
            knowledge_query: None,
            updated_context,
            conversation_status,
        }
    }

    /// Attaches an action request.
    #[must_use]
    pub fn with_action_request(mut self, request: ActionRequest) -> Self {
        self.action_request = Some(request);
        self
    }

    /// Attaches a knowledge query.
    #[must_use]
    pub fn with_knowledge_query(mut self, query: Option<KnowledgeQuery>) -> Self {
        self.knowledge_query = query;
        self
    }

    /// Returns the dialogue state the decision leaves the conversation in.
    #[must_use]
    pub fn state(&self) -> DialogueState {
        if self.conversation_status.is_ended() {
            DialogueState::Ended
        } else {
            DialogueState::of(&self.updated_context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn act_serializes_kind_as_name() {
        let act = DialogueAct::new(ActKind::AskQuestion).with("slot", "departure_date");
        let json = serde_json::to_value(&act).expect("serialize");

        assert_eq!(json["name"], "ask_question");
        assert_eq!(json["parameters"]["slot"], "departure_date");
        assert_eq!(act.param_str("slot"), Some("departure_date"));
    }

    #[test]
    fn act_kind_wire_names_match_serde() {
        for kind in [
            ActKind::Greet,
            ActKind::ActionFailed,
            ActKind::StaleActionResult,
        ] {
            let json = serde_json::to_value(kind).expect("serialize");
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(ConversationStatus::AwaitingConfirmation).unwrap();
        assert_eq!(json, "awaiting_confirmation");
        assert!(ConversationStatus::Ended.is_ended());
    }
}
