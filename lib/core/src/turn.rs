//! Turn input and the request/response shapes exchanged with collaborators.

use crate::id::{ConversationId, TurnId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// An entity extracted by language understanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name (e.g., "destination").
    pub name: String,
    /// Extracted value (e.g., "London").
    pub value: String,
    /// Entity type (e.g., "city").
    #[serde(rename = "type", default)]
    pub entity_type: String,
}

impl Entity {
    /// Creates an entity whose type equals its name.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            entity_type: name.clone(),
            name,
            value: value.into(),
        }
    }

    /// Sets the entity type.
    #[must_use]
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }
}

/// Structured understanding of an utterance, as produced by the NLU collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Understanding {
    /// Recognized intent.
    pub intent_name: String,
    /// Intent confidence in `[0, 1]`.
    pub confidence: f64,
    /// Extracted entities, in extraction order.
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Understanding {
    /// Creates an understanding with no entities.
    #[must_use]
    pub fn new(intent_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            intent_name: intent_name.into(),
            confidence,
            entities: Vec::new(),
        }
    }

    /// Adds an entity.
    #[must_use]
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }
}

/// A request for the action-executor collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action to run.
    pub action_name: String,
    /// Parameters: the filled slots of the goal.
    pub parameters: BTreeMap<String, String>,
}

/// Error details reported by the action executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionErrorInfo {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Response of the action-executor collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the action succeeded.
    pub success: bool,
    /// Result payload.
    #[serde(default)]
    pub result_data: Map<String, JsonValue>,
    /// Error details when `success` is false.
    #[serde(default)]
    pub error: Option<ActionErrorInfo>,
}

impl ActionResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn success(result_data: Map<String, JsonValue>) -> Self {
        Self {
            success: true,
            result_data,
            error: None,
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result_data: Map::new(),
            error: Some(ActionErrorInfo {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// The outcome of an executed action, folded back into the dialogue as a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// The action that ran.
    pub action_name: String,
    /// What the executor returned.
    pub response: ActionResponse,
}

/// A lookup for the long-term-memory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnowledgeQuery {
    /// User the fact belongs to.
    pub user_id: UserId,
    /// Fact key (e.g., "home_city").
    pub query_key: String,
}

/// One turn handed to the orchestrator.
///
/// Identifier fields default to blank when absent from serialized input;
/// validation rejects blank conversation and turn identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    /// Conversation this turn belongs to.
    #[serde(default)]
    pub conversation_id: ConversationId,
    /// User who produced the turn.
    #[serde(default)]
    pub user_id: UserId,
    /// Identifier of this turn.
    #[serde(default)]
    pub turn_id: TurnId,
    /// Normalized utterance text.
    #[serde(default)]
    pub processed_text: String,
    /// Language understanding of the utterance.
    #[serde(default)]
    pub understanding: Understanding,
    /// Present when this turn carries an executed action's outcome.
    #[serde(default)]
    pub action_result: Option<ActionOutcome>,
}

impl TurnInput {
    /// Creates an utterance turn with a freshly generated turn id.
    #[must_use]
    pub fn utterance(
        conversation_id: ConversationId,
        user_id: UserId,
        processed_text: impl Into<String>,
        understanding: Understanding,
    ) -> Self {
        Self {
            conversation_id,
            user_id,
            turn_id: TurnId::generate(),
            processed_text: processed_text.into(),
            understanding,
            action_result: None,
        }
    }

    /// Creates a turn carrying an action outcome.
    #[must_use]
    pub fn action_result(
        conversation_id: ConversationId,
        user_id: UserId,
        turn_id: TurnId,
        outcome: ActionOutcome,
    ) -> Self {
        Self {
            conversation_id,
            user_id,
            turn_id,
            processed_text: String::new(),
            understanding: Understanding::default(),
            action_result: Some(outcome),
        }
    }

    /// Returns true if this turn carries an action outcome.
    #[must_use]
    pub fn is_action_result(&self) -> bool {
        self.action_result.is_some()
    }
}
