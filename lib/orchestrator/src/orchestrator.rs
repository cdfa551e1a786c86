//! The turn orchestrator.
//!
//! One call to `process_turn` runs a whole turn:
//! 1. Take the conversation's turn lock
//! 2. Load its context (a missing context starts a new conversation)
//! 3. Ask the dialogue policy for a decision
//! 4. Execute a requested action and fold its outcome back through the policy
//! 5. Look up a requested fact and attach it to the dialogue act
//! 6. Commit: store the context, or archive and evict an ended conversation
//!
//! Collaborator failures degrade the dialogue act; store and archival
//! failures abort the turn with nothing committed.

use crate::collaborator::{ActionExecutor, ArchivalRecord, LongTermMemory};
use crate::config::OrchestratorConfig;
use crate::error::{CollaboratorError, OrchestrationError};
use crate::locks::TurnLocks;
use chrono::Utc;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use viki_core::{
    ActionOutcome, ActionRequest, ActionResponse, ConversationContext, ConversationId,
    KnowledgeQuery, Result, TurnId, TurnInput,
};
use viki_dialogue::{ConversationStatus, DialogueAct, DialoguePolicy, TurnDecision};
use viki_memory::ContextStore;

/// What a turn produced, ready for response generation and logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// The conversation.
    pub conversation_id: ConversationId,
    /// The turn that was processed.
    pub turn_id: TurnId,
    /// What the assistant says next.
    pub dialogue_act: DialogueAct,
    /// Conversation status after the turn.
    pub conversation_status: ConversationStatus,
    /// The context as committed (or archived, for an ended conversation).
    pub context_snapshot: ConversationContext,
}

/// Runs dialogue turns against the context store and collaborators.
pub struct TurnOrchestrator {
    store: Arc<dyn ContextStore>,
    policy: DialoguePolicy,
    executor: Arc<dyn ActionExecutor>,
    memory: Arc<dyn LongTermMemory>,
    locks: TurnLocks,
    config: OrchestratorConfig,
}

impl TurnOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<dyn ContextStore>,
        policy: DialoguePolicy,
        executor: Arc<dyn ActionExecutor>,
        memory: Arc<dyn LongTermMemory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            policy,
            executor,
            memory,
            locks: TurnLocks::new(),
            config,
        }
    }

    /// Returns the context store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Processes one turn.
    ///
    /// # Errors
    ///
    /// See [`Self::process_turn_cancellable`]; this variant is never
    /// cancelled.
    pub async fn process_turn(
        &self,
        input: TurnInput,
    ) -> Result<TurnResult, OrchestrationError> {
        self.process_turn_cancellable(input, CancellationToken::new())
            .await
    }

    /// Processes one turn, giving up if `cancel` fires before commit.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a blank conversation or turn id; nothing is read
    ///   or written
    /// - `ContextLoad` if the store fails for a reason other than a missing
    ///   context
    /// - `ArchivalFailed` if an ended conversation could not be archived; the
    ///   stored context is left as it was
    /// - `ContextCommit` if the updated context could not be stored or
    ///   evicted, including when the store is full
    /// - `Cancelled` if `cancel` fired before commit; nothing is written
    #[instrument(
        skip(self, input, cancel),
        fields(conversation_id = %input.conversation_id, turn_id = %input.turn_id)
    )]
    pub async fn process_turn_cancellable(
        &self,
        input: TurnInput,
        cancel: CancellationToken,
    ) -> Result<TurnResult, OrchestrationError> {
        if input.conversation_id.is_blank() || input.turn_id.is_blank() {
            return Err(OrchestrationError::InvalidInput {
                reason: "conversation_id and turn_id must not be blank".to_string(),
            }
            .into());
        }
        let conversation_id = input.conversation_id.clone();

        let _turn = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(&conversation_id)),
            guard = self.locks.acquire(&conversation_id) => guard,
        };

        let prior = self.load(&conversation_id).await?;
        let mut decision = self.decide(&input, prior.as_ref())?;

        if let Some(request) = decision.action_request.clone() {
            let response = self.execute_action(&request, &conversation_id, &cancel).await?;
            let followup = TurnInput::action_result(
                conversation_id.clone(),
                input.user_id.clone(),
                input.turn_id.clone(),
                ActionOutcome {
                    action_name: request.action_name,
                    response,
                },
            );
            decision = self.decide(&followup, Some(&decision.updated_context))?;
        }

        if let Some(query) = decision.knowledge_query.clone() {
            match self.lookup(&query, &cancel).await {
                Some(Some(value)) => decision.next_dialogue_act.set(query.query_key, value),
                Some(None) => {}
                None => return Err(cancelled(&conversation_id)),
            }
        }

        if cancel.is_cancelled() {
            return Err(cancelled(&conversation_id));
        }
        self.commit(&decision).await?;

        info!(
            act = %decision.next_dialogue_act.kind,
            status = ?decision.conversation_status,
            "turn processed"
        );

        Ok(TurnResult {
            conversation_id,
            turn_id: input.turn_id,
            dialogue_act: decision.next_dialogue_act,
            conversation_status: decision.conversation_status,
            context_snapshot: decision.updated_context,
        })
    }

    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationContext>, OrchestrationError> {
        match self.store.get(conversation_id).await {
            Ok(context) => Ok(Some(context)),
            Err(report) if report.current_context().is_not_found() => {
                debug!("no stored context; starting conversation");
                Ok(None)
            }
            Err(report) => Err(report.context(OrchestrationError::ContextLoad {
                conversation_id: conversation_id.clone(),
            })),
        }
    }

    fn decide(
        &self,
        input: &TurnInput,
        context: Option<&ConversationContext>,
    ) -> Result<TurnDecision, OrchestrationError> {
        self.policy
            .decide(input, context, Utc::now())
            .map_err(|report| {
                let reason = report.current_context().to_string();
                report.context(OrchestrationError::InvalidInput { reason })
            })
    }

    /// Runs the action, retrying timeouts. Executor failures become a failed
    /// response; only cancellation is an error.
    async fn execute_action(
        &self,
        request: &ActionRequest,
        conversation_id: &ConversationId,
        cancel: &CancellationToken,
    ) -> Result<ActionResponse, OrchestrationError> {
        let attempts = self.config.action_timeout_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            let Some(result) = self
                .bounded("execute_action", cancel, self.executor.execute(request))
                .await
            else {
                return Err(cancelled(conversation_id));
            };

            match result {
                Ok(response) => return Ok(response),
                Err(report) if report.current_context().is_timeout() && attempt < attempts => {
                    warn!(action = %request.action_name, attempt, "action timed out; retrying");
                    attempt += 1;
                }
                Err(report) => {
                    warn!(action = %request.action_name, error = %report, "action failed");
                    let code = if report.current_context().is_timeout() {
                        "timeout"
                    } else {
                        "executor_error"
                    };
                    return Ok(ActionResponse::failure(
                        code,
                        report.current_context().to_string(),
                    ));
                }
            }
        }
    }

    /// Looks up a fact. `None` means cancelled; `Some(None)` means the fact is
    /// unavailable for any reason.
    async fn lookup(
        &self,
        query: &KnowledgeQuery,
        cancel: &CancellationToken,
    ) -> Option<Option<String>> {
        let result = self
            .bounded("knowledge_lookup", cancel, self.memory.lookup(query))
            .await?;
        match result {
            Ok(answer) => {
                let value = answer.into_value();
                if value.is_none() {
                    debug!(key = %query.query_key, "knowledge lookup missed");
                }
                Some(value)
            }
            Err(report) => {
                warn!(key = %query.query_key, error = %report, "knowledge lookup failed");
                Some(None)
            }
        }
    }

    async fn commit(&self, decision: &TurnDecision) -> Result<(), OrchestrationError> {
        let context = &decision.updated_context;
        let conversation_id = &context.conversation_id;

        if !decision.conversation_status.is_ended() {
            return self
                .store
                .put(conversation_id, context.clone())
                .await
                .map_err(|report| {
                    report.context(OrchestrationError::ContextCommit {
                        conversation_id: conversation_id.clone(),
                    })
                });
        }

        let record = ArchivalRecord {
            conversation_id: conversation_id.clone(),
            context: context.clone(),
        };
        let archived = match tokio::time::timeout(self.timeout(), self.memory.archive(record)).await
        {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error("archive").into()),
        };
        archived.map_err(|report| {
            report.context(OrchestrationError::ArchivalFailed {
                conversation_id: conversation_id.clone(),
            })
        })?;

        self.store.evict(conversation_id).await.map_err(|report| {
            report.context(OrchestrationError::ContextCommit {
                conversation_id: conversation_id.clone(),
            })
        })?;
        info!("conversation ended and archived");
        Ok(())
    }

    /// Runs a collaborator call under the timeout. Returns `None` if `cancel`
    /// fires first.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Option<Result<T, CollaboratorError>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = tokio::time::timeout(self.timeout(), call) => Some(match result {
                Ok(result) => result,
                Err(_) => Err(self.timeout_error(operation).into()),
            }),
        }
    }

    fn timeout(&self) -> Duration {
        self.config.collaborator_timeout()
    }

    fn timeout_error(&self, operation: &'static str) -> CollaboratorError {
        CollaboratorError::Timeout {
            operation,
            timeout_ms: self.config.collaborator_timeout_ms,
        }
    }
}

fn cancelled(conversation_id: &ConversationId) -> Report<OrchestrationError> {
    OrchestrationError::Cancelled {
        conversation_id: conversation_id.clone(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{EchoActionExecutor, InMemoryLongTermMemory, KnowledgeAnswer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use viki_core::{Entity, GoalStatus, Understanding, UserId};
    use viki_dialogue::{ActKind, PolicyConfig};
    use viki_memory::{ContextStoreError, ShardedContextStore};

    /// Executor that never answers within the timeout.
    struct StalledExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActionExecutor for StalledExecutor {
        async fn execute(
            &self,
            _request: &ActionRequest,
        ) -> Result<ActionResponse, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ActionResponse::success(serde_json::Map::new()))
        }
    }

    /// Executor that errors.
    struct BrokenExecutor;

    #[async_trait]
    impl ActionExecutor for BrokenExecutor {
        async fn execute(
            &self,
            _request: &ActionRequest,
        ) -> Result<ActionResponse, CollaboratorError> {
            Err(CollaboratorError::failure("connection refused").into())
        }
    }

    /// Long-term memory whose archive always fails.
    struct FailingArchive;

    #[async_trait]
    impl LongTermMemory for FailingArchive {
        async fn lookup(
            &self,
            _query: &KnowledgeQuery,
        ) -> Result<KnowledgeAnswer, CollaboratorError> {
            Err(CollaboratorError::failure("lookup unavailable").into())
        }

        async fn archive(&self, _record: ArchivalRecord) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::failure("archive unavailable").into())
        }
    }

    /// Store whose every operation fails.
    struct PoisonedStore;

    #[async_trait]
    impl ContextStore for PoisonedStore {
        async fn get(
            &self,
            _conversation_id: &ConversationId,
        ) -> Result<ConversationContext, ContextStoreError> {
            Err(ContextStoreError::Poisoned { shard: 0 }.into())
        }

        async fn put(
            &self,
            _conversation_id: &ConversationId,
            _context: ConversationContext,
        ) -> Result<(), ContextStoreError> {
            Err(ContextStoreError::Poisoned { shard: 0 }.into())
        }

        async fn evict(
            &self,
            _conversation_id: &ConversationId,
        ) -> Result<bool, ContextStoreError> {
            Err(ContextStoreError::Poisoned { shard: 0 }.into())
        }

        async fn sweep(&self) -> Result<usize, ContextStoreError> {
            Err(ContextStoreError::Poisoned { shard: 0 }.into())
        }
    }

    struct Harness {
        store: Arc<ShardedContextStore>,
        memory: Arc<InMemoryLongTermMemory>,
        orchestrator: TurnOrchestrator,
    }

    fn harness_with(
        store: ShardedContextStore,
        executor: Arc<dyn ActionExecutor>,
        timeout_ms: u64,
    ) -> Harness {
        let store = Arc::new(store);
        let memory = Arc::new(InMemoryLongTermMemory::new());
        let config = OrchestratorConfig {
            collaborator_timeout_ms: timeout_ms,
            ..OrchestratorConfig::default()
        };
        let orchestrator = TurnOrchestrator::new(
            store.clone(),
            DialoguePolicy::new(PolicyConfig::default()),
            executor,
            memory.clone(),
            config,
        );
        Harness {
            store,
            memory,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(
            ShardedContextStore::default(),
            Arc::new(EchoActionExecutor),
            1000,
        )
    }

    fn turn(conversation: &str, intent: &str, confidence: f64, entities: &[(&str, &str)]) -> TurnInput {
        let mut understanding = Understanding::new(intent, confidence);
        for (name, value) in entities {
            understanding = understanding.with_entity(Entity::new(*name, *value));
        }
        TurnInput::utterance(
            ConversationId::new(conversation),
            UserId::new("user-1"),
            intent.to_string(),
            understanding,
        )
    }

    #[tokio::test]
    async fn first_turn_creates_context() {
        let h = harness();
        let result = h
            .orchestrator
            .process_turn(turn("c1", "book_flight", 0.9, &[("destination", "London")]))
            .await
            .unwrap();

        assert_eq!(result.dialogue_act.kind, ActKind::AskQuestion);
        assert_eq!(result.conversation_status, ConversationStatus::Active);

        let stored = h.store.get(&ConversationId::new("c1")).await.unwrap();
        assert_eq!(stored, result.context_snapshot);
        assert_eq!(stored.slots.get("destination").map(String::as_str), Some("London"));
        assert_eq!(stored.pending_questions[0].slot.as_deref(), Some("departure_date"));
    }

    #[tokio::test]
    async fn executed_action_returns_context_to_idle() {
        let h = harness();
        h.orchestrator
            .process_turn(turn(
                "c1",
                "book_flight",
                0.9,
                &[("destination", "London"), ("departure_date", "2026-11-02")],
            ))
            .await
            .unwrap();

        let result = h
            .orchestrator
            .process_turn(turn("c1", "affirm", 0.9, &[]))
            .await
            .unwrap();

        assert_eq!(result.dialogue_act.kind, ActKind::InformResult);
        assert_eq!(result.dialogue_act.param_str("destination"), Some("London"));
        assert_eq!(result.dialogue_act.param_str("action"), Some("book_flight"));

        let stored = h.store.get(&ConversationId::new("c1")).await.unwrap();
        assert!(stored.active_goal.is_none());
        assert!(stored.slots.is_empty());
    }

    #[tokio::test]
    async fn action_timeout_is_retried_once_then_reported() {
        let executor = Arc::new(StalledExecutor {
            calls: AtomicUsize::new(0),
        });
        let h = harness_with(ShardedContextStore::default(), executor.clone(), 20);

        let result = h
            .orchestrator
            .process_turn(turn("c1", "get_time", 0.9, &[("location", "Lima")]))
            .await
            .unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.dialogue_act.kind, ActKind::ActionFailed);
        assert_eq!(result.dialogue_act.param_str("code"), Some("timeout"));
        let stored = h.store.get(&ConversationId::new("c1")).await.unwrap();
        assert!(stored.active_goal.is_none());
    }

    #[tokio::test]
    async fn executor_error_is_reported_not_raised() {
        let h = harness_with(ShardedContextStore::default(), Arc::new(BrokenExecutor), 1000);

        let result = h
            .orchestrator
            .process_turn(turn("c1", "tell_joke", 0.9, &[]))
            .await
            .unwrap();

        assert_eq!(result.dialogue_act.kind, ActKind::ActionFailed);
        assert_eq!(result.dialogue_act.param_str("code"), Some("executor_error"));
    }

    #[tokio::test]
    async fn knowledge_hit_is_attached_to_act() {
        let h = harness();
        h.memory
            .remember(UserId::new("user-1"), "home_city", "Lisbon")
            .unwrap();

        let result = h
            .orchestrator
            .process_turn(turn("c1", "check_weather", 0.9, &[]))
            .await
            .unwrap();

        assert_eq!(result.dialogue_act.kind, ActKind::AskQuestion);
        assert_eq!(result.dialogue_act.param_str("home_city"), Some("Lisbon"));
    }

    #[tokio::test]
    async fn knowledge_miss_is_omitted() {
        let h = harness();

        let result = h
            .orchestrator
            .process_turn(turn("c1", "greet", 0.9, &[]))
            .await
            .unwrap();

        assert_eq!(result.dialogue_act.kind, ActKind::Greet);
        assert!(!result.dialogue_act.parameters.contains_key("user_name"));
    }

    #[tokio::test]
    async fn ended_conversation_is_archived_once_and_evicted() {
        let h = harness();
        h.orchestrator
            .process_turn(turn("c1", "book_flight", 0.9, &[("destination", "London")]))
            .await
            .unwrap();

        let result = h
            .orchestrator
            .process_turn(turn("c1", "goodbye", 0.9, &[]))
            .await
            .unwrap();

        assert_eq!(result.conversation_status, ConversationStatus::Ended);
        assert_eq!(result.dialogue_act.kind, ActKind::Farewell);

        let err = h.store.get(&ConversationId::new("c1")).await.unwrap_err();
        assert!(err.current_context().is_not_found());

        let archived = h.memory.archived().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].conversation_id, ConversationId::new("c1"));
        assert_eq!(archived[0].context.turn_count, 2);
    }

    #[tokio::test]
    async fn archival_failure_keeps_stored_context() {
        let store = Arc::new(ShardedContextStore::default());
        let orchestrator = TurnOrchestrator::new(
            store.clone(),
            DialoguePolicy::default(),
            Arc::new(EchoActionExecutor),
            Arc::new(FailingArchive),
            OrchestratorConfig::default(),
        );
        let first = orchestrator
            .process_turn(turn("c1", "book_flight", 0.9, &[]))
            .await
            .unwrap();

        let err = orchestrator
            .process_turn(turn("c1", "goodbye", 0.9, &[]))
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            OrchestrationError::ArchivalFailed { .. }
        ));
        let stored = store.get(&ConversationId::new("c1")).await.unwrap();
        assert_eq!(stored, first.context_snapshot);
    }

    #[tokio::test]
    async fn store_failure_is_fatal() {
        let memory = Arc::new(InMemoryLongTermMemory::new());
        let orchestrator = TurnOrchestrator::new(
            Arc::new(PoisonedStore),
            DialoguePolicy::default(),
            Arc::new(EchoActionExecutor),
            memory,
            OrchestratorConfig::default(),
        );

        let err = orchestrator
            .process_turn(turn("c1", "book_flight", 0.9, &[]))
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            OrchestrationError::ContextLoad { .. }
        ));
    }

    #[tokio::test]
    async fn capacity_exceeded_is_surfaced() {
        let h = harness_with(
            ShardedContextStore::default().with_max_entries(Some(1)),
            Arc::new(EchoActionExecutor),
            1000,
        );
        h.orchestrator
            .process_turn(turn("c1", "book_flight", 0.9, &[]))
            .await
            .unwrap();

        let err = h
            .orchestrator
            .process_turn(turn("c2", "book_flight", 0.9, &[]))
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            OrchestrationError::ContextCommit { .. }
        ));
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn blank_ids_touch_nothing() {
        let h = harness();
        let mut input = turn("c1", "book_flight", 0.9, &[]);
        input.turn_id = TurnId::default();

        let err = h.orchestrator.process_turn(input).await.unwrap_err();

        assert!(matches!(
            err.current_context(),
            OrchestrationError::InvalidInput { .. }
        ));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn cancelled_turn_commits_nothing() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .orchestrator
            .process_turn_cancellable(turn("c1", "book_flight", 0.9, &[]), cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            OrchestrationError::Cancelled { .. }
        ));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_action_commits_nothing() {
        let executor = Arc::new(StalledExecutor {
            calls: AtomicUsize::new(0),
        });
        let h = harness_with(ShardedContextStore::default(), executor, 5000);
        let first = h
            .orchestrator
            .process_turn(turn("c1", "get_time", 0.5, &[]))
            .await
            .unwrap();
        assert_eq!(first.context_snapshot.active_goal.as_ref().unwrap().status, GoalStatus::SlotFilling);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = h
            .orchestrator
            .process_turn_cancellable(turn("c1", "get_time", 0.9, &[("location", "Lima")]), cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            OrchestrationError::Cancelled { .. }
        ));
        let stored = h.store.get(&ConversationId::new("c1")).await.unwrap();
        assert_eq!(stored, first.context_snapshot);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_turns_for_one_conversation_serialize() {
        let h = Arc::new(harness());
        let turns: Vec<_> = (0..10)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move {
                    h.orchestrator
                        .process_turn(turn("c1", "inform", 0.9, &[]))
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(turns).await {
            result.unwrap().unwrap();
        }

        let stored = h.store.get(&ConversationId::new("c1")).await.unwrap();
        assert_eq!(stored.turn_count, 10);
    }
}
