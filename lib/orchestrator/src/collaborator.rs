//! External collaborators the orchestrator calls during a turn.
//!
//! The action executor and long-term memory live outside this system. The
//! traits let them be swapped for local implementations in tests and in the
//! development driver.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use viki_core::{
    ActionRequest, ActionResponse, ConversationContext, ConversationId, KnowledgeQuery, Result,
    UserId,
};

/// Executes the actions dialogue goals resolve to.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Executes an action.
    ///
    /// A domain failure is a successful call returning an unsuccessful
    /// `ActionResponse`; `Err` means the executor itself failed.
    async fn execute(
        &self,
        request: &ActionRequest,
    ) -> Result<ActionResponse, CollaboratorError>;
}

/// Answer to a knowledge query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeAnswer {
    /// Whether the fact is known.
    pub found: bool,
    /// The fact's value when found.
    #[serde(default)]
    pub value: Option<String>,
}

impl KnowledgeAnswer {
    /// A known fact.
    #[must_use]
    pub fn found(value: impl Into<String>) -> Self {
        Self {
            found: true,
            value: Some(value.into()),
        }
    }

    /// An unknown fact.
    #[must_use]
    pub fn missing() -> Self {
        Self {
            found: false,
            value: None,
        }
    }

    /// Returns the value if the fact is known.
    #[must_use]
    pub fn into_value(self) -> Option<String> {
        if self.found { self.value } else { None }
    }
}

/// A finished conversation handed to long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalRecord {
    /// The conversation that ended.
    pub conversation_id: ConversationId,
    /// Its final context.
    pub context: ConversationContext,
}

/// Long-term memory: user facts and archived conversations.
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// Looks up a fact about a user.
    async fn lookup(
        &self,
        query: &KnowledgeQuery,
    ) -> Result<KnowledgeAnswer, CollaboratorError>;

    /// Archives a finished conversation.
    async fn archive(&self, record: ArchivalRecord) -> Result<(), CollaboratorError>;
}

/// Executor that succeeds with its parameters echoed back as result data.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoActionExecutor;

#[async_trait]
impl ActionExecutor for EchoActionExecutor {
    async fn execute(
        &self,
        request: &ActionRequest,
    ) -> Result<ActionResponse, CollaboratorError> {
        let mut data: serde_json::Map<String, JsonValue> = request
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect();
        data.insert(
            "action".to_string(),
            JsonValue::String(request.action_name.clone()),
        );
        Ok(ActionResponse::success(data))
    }
}

/// Process-local long-term memory.
#[derive(Debug, Default)]
pub struct InMemoryLongTermMemory {
    facts: RwLock<HashMap<(UserId, String), String>>,
    archive: Mutex<Vec<ArchivalRecord>>,
}

impl InMemoryLongTermMemory {
    /// Creates an empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fact about a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the fact table lock is poisoned.
    pub fn remember(
        &self,
        user_id: UserId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CollaboratorError> {
        self.facts
            .write()
            .map_err(|_| CollaboratorError::failure("fact table lock poisoned"))?
            .insert((user_id, key.into()), value.into());
        Ok(())
    }

    /// Returns every archived conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive lock is poisoned.
    pub fn archived(&self) -> Result<Vec<ArchivalRecord>, CollaboratorError> {
        Ok(self
            .archive
            .lock()
            .map_err(|_| CollaboratorError::failure("archive lock poisoned"))?
            .clone())
    }
}

#[async_trait]
impl LongTermMemory for InMemoryLongTermMemory {
    async fn lookup(
        &self,
        query: &KnowledgeQuery,
    ) -> Result<KnowledgeAnswer, CollaboratorError> {
        let facts = self
            .facts
            .read()
            .map_err(|_| CollaboratorError::failure("fact table lock poisoned"))?;
        let answer = facts
            .get(&(query.user_id.clone(), query.query_key.clone()))
            .map_or_else(KnowledgeAnswer::missing, KnowledgeAnswer::found);
        Ok(answer)
    }

    async fn archive(&self, record: ArchivalRecord) -> Result<(), CollaboratorError> {
        self.archive
            .lock()
            .map_err(|_| CollaboratorError::failure("archive lock poisoned"))?
            .push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn echo_executor_echoes_parameters() {
        let mut parameters = BTreeMap::new();
        parameters.insert("location".to_string(), "Lima".to_string());
        let request = ActionRequest {
            action_name: "get_time".to_string(),
            parameters,
        };

        let response = EchoActionExecutor.execute(&request).await.unwrap();

        assert!(response.success);
        assert_eq!(response.result_data["location"], "Lima");
        assert_eq!(response.result_data["action"], "get_time");
    }

    #[tokio::test]
    async fn in_memory_lookup_finds_remembered_facts() {
        let memory = InMemoryLongTermMemory::new();
        let user = UserId::new("user-1");
        memory.remember(user.clone(), "home_city", "Lisbon").unwrap();

        let hit = memory
            .lookup(&KnowledgeQuery {
                user_id: user.clone(),
                query_key: "home_city".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(hit.into_value().as_deref(), Some("Lisbon"));

        let miss = memory
            .lookup(&KnowledgeQuery {
                user_id: user,
                query_key: "user_name".to_string(),
            })
            .await
            .unwrap();
        assert!(!miss.found);
        assert_eq!(miss.into_value(), None);
    }

    #[tokio::test]
    async fn in_memory_archive_keeps_records() {
        let memory = InMemoryLongTermMemory::new();
        let id = ConversationId::new("conv-1");
        let context = ConversationContext::new(id.clone(), UserId::new("user-1"), Utc::now());

        memory
            .archive(ArchivalRecord {
                conversation_id: id.clone(),
                context,
            })
            .await
            .unwrap();

        let archived = memory.archived().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].conversation_id, id);
    }
}
