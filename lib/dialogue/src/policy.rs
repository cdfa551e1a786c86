//! The dialogue policy state machine.
//!
//! `DialoguePolicy::decide` maps a turn and the conversation's prior context
//! to the next dialogue act, optional collaborator requests, and the context
//! to persist. It performs no I/O and is deterministic for a given `now`.
//!
//! Utterance turns are evaluated in this order:
//!
//! 1. A confident terminate intent ends the conversation.
//! 2. Low confidence asks for clarification without touching slots.
//! 3. A greeting is answered and may look up the user's name.
//! 4. A pending confirmation is accepted, declined, or re-asked.
//! 5. A filling goal is switched away from only by a clearly more confident
//!    catalog intent; anything else is an attempt to fill its slots.
//! 6. An idle conversation adopts the goal its intent names.

use crate::act::{ActKind, ConversationStatus, DialogueAct, TurnDecision};
use crate::catalog::GoalSpec;
use crate::config::PolicyConfig;
use crate::error::PolicyError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use viki_core::{
    AWAITING_CONFIRMATION_FLAG, ActionOutcome, ActionRequest, ActiveGoal, ConversationContext,
    Entity, GoalStatus, KnowledgeQuery, PendingQuestion, RecentTurn, Result, TurnInput,
};

/// Prompt key queued when the assistant owes the user a clarification.
pub const CLARIFICATION_PROMPT: &str = "ask_clarification";

/// Deterministic dialogue policy.
#[derive(Debug, Clone, Default)]
pub struct DialoguePolicy {
    config: PolicyConfig,
}

impl DialoguePolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Returns the policy configuration.
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Decides the next dialogue act for `input`.
    ///
    /// `context` is the conversation's stored context, or `None` for a new
    /// conversation. The returned decision's `updated_context` is what the
    /// caller should persist.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidInput` when the conversation or turn id is
    /// blank, or when `context` belongs to a different conversation.
    pub fn decide(
        &self,
        input: &TurnInput,
        context: Option<&ConversationContext>,
        now: DateTime<Utc>,
    ) -> Result<TurnDecision, PolicyError> {
        validate(input, context)?;

        let mut ctx = context.cloned().unwrap_or_else(|| {
            ConversationContext::new(input.conversation_id.clone(), input.user_id.clone(), now)
        });
        ctx.last_active_at = now;

        let decision = match &input.action_result {
            Some(outcome) => self.decide_action_result(ctx, outcome),
            None => self.decide_utterance(ctx, input),
        };

        debug!(
            conversation_id = %input.conversation_id,
            turn_id = %input.turn_id,
            act = %decision.next_dialogue_act.kind,
            state = ?decision.state(),
            "dialogue decision"
        );

        Ok(decision)
    }

    fn decide_utterance(&self, mut ctx: ConversationContext, input: &TurnInput) -> TurnDecision {
        let understanding = &input.understanding;
        let intent = understanding.intent_name.as_str();
        let confidence = understanding.confidence;

        ctx.push_recent_turn(
            RecentTurn::user(input.processed_text.clone(), ctx.last_active_at),
            self.config.recent_turns_cap,
        );
        ctx.turn_count += 1;
        ctx.last_turn_id = Some(input.turn_id.clone());

        // The result for this goal never arrived; the user has moved on.
        if ctx
            .active_goal
            .as_ref()
            .is_some_and(|g| g.status == GoalStatus::ActionPending)
        {
            ctx.clear_goal();
        }

        // NaN counts as low confidence.
        let confident = confidence >= self.config.low_confidence_threshold;

        if confident && self.config.is_terminate(intent) {
            let act = DialogueAct::new(ActKind::Farewell);
            return TurnDecision::new(act, ctx, ConversationStatus::Ended);
        }

        if !confident {
            return self.clarify(ctx, "low_confidence");
        }

        // Clarifications are owed only until the user answers confidently.
        ctx.pending_questions.retain(|q| !q.is_clarification());

        if intent == self.config.greet_intent {
            return self.greet(ctx);
        }

        let Some(goal) = ctx.active_goal.clone() else {
            return self.adopt_goal(ctx, intent, confidence, &understanding.entities);
        };

        if self.should_switch(&goal, intent, confidence) {
            debug!(from = %goal.name, to = %intent, confidence, "topic switch");
            return self.adopt_goal(ctx, intent, confidence, &understanding.entities);
        }

        let Some(spec) = self.config.catalog.get(&goal.name) else {
            // The goal left the catalog since it was adopted.
            ctx.clear_goal();
            return self.clarify(ctx, "unsupported_intent");
        };

        match goal.status {
            GoalStatus::AwaitingConfirmation => self.confirm_step(ctx, spec, intent),
            _ => {
                let matched = fill_slots(&mut ctx, spec, &understanding.entities);
                let slots_remain = spec.missing_slots(&ctx.slots).next().is_some();
                if intent != goal.name && matched == 0 && slots_remain {
                    return self.clarify(ctx, "unmatched_input");
                }
                self.advance(ctx, spec)
            }
        }
    }

    fn decide_action_result(
        &self,
        mut ctx: ConversationContext,
        outcome: &ActionOutcome,
    ) -> TurnDecision {
        let pending = ctx.active_goal.as_ref().is_some_and(|g| {
            g.status == GoalStatus::ActionPending && self.action_name_of(&g.name) == outcome.action_name
        });

        if !pending {
            debug!(action = %outcome.action_name, "action result with no pending goal");
            let act =
                DialogueAct::new(ActKind::StaleActionResult).with("action", outcome.action_name.clone());
            let status = status_of(&ctx);
            return TurnDecision::new(act, ctx, status);
        }

        let response = &outcome.response;
        let act = if response.success {
            DialogueAct {
                kind: ActKind::InformResult,
                parameters: response.result_data.clone(),
            }
        } else {
            let (code, message) = response.error.as_ref().map_or(
                ("action_failed", "the action did not succeed"),
                |e| (e.code.as_str(), e.message.as_str()),
            );
            DialogueAct::new(ActKind::ActionFailed)
                .with("action", outcome.action_name.clone())
                .with("code", code)
                .with("message", message)
        };

        ctx.clear_goal();
        TurnDecision::new(act, ctx, ConversationStatus::Active)
    }

    fn greet(&self, ctx: ConversationContext) -> TurnDecision {
        let mut act = DialogueAct::new(ActKind::Greet);
        if let Some(front) = ctx.pending_questions.front() {
            act.set("resume_prompt", front.prompt.clone());
        }
        let query = KnowledgeQuery {
            user_id: ctx.user_id.clone(),
            query_key: self.config.greet_knowledge_key.clone(),
        };
        let status = status_of(&ctx);
        TurnDecision::new(act, ctx, status).with_knowledge_query(Some(query))
    }

    fn clarify(&self, mut ctx: ConversationContext, reason: &str) -> TurnDecision {
        let mut act = DialogueAct::new(ActKind::AskClarification).with("reason", reason);

        if let Some(goal) = &ctx.active_goal {
            act.set("goal", goal.name.clone());
            if !ctx.pending_questions.iter().any(PendingQuestion::is_clarification) {
                ctx.pending_questions
                    .push_back(PendingQuestion::clarification(CLARIFICATION_PROMPT));
            }
        }

        let status = status_of(&ctx);
        TurnDecision::new(act, ctx, status)
    }

    fn should_switch(&self, goal: &ActiveGoal, intent: &str, confidence: f64) -> bool {
        intent != goal.name
            && self.config.catalog.contains(intent)
            && confidence > goal.confidence + self.config.intent_switch_confidence_margin
    }

    fn adopt_goal(
        &self,
        mut ctx: ConversationContext,
        intent: &str,
        confidence: f64,
        entities: &[Entity],
    ) -> TurnDecision {
        let Some(spec) = self.config.catalog.get(intent) else {
            ctx.clear_goal();
            return self.clarify(ctx, "unsupported_intent");
        };

        ctx.clear_goal();
        ctx.active_goal = Some(ActiveGoal::new(spec.name.clone(), confidence));
        ctx.current_topic = Some(spec.name.clone());

        fill_slots(&mut ctx, spec, entities);
        self.advance(ctx, spec)
    }

    fn confirm_step(&self, mut ctx: ConversationContext, spec: &GoalSpec, intent: &str) -> TurnDecision {
        if self.config.is_affirm(intent) {
            return self.execute(ctx, spec);
        }

        if self.config.is_deny(intent) {
            ctx.clear_goal();
            let act = DialogueAct::new(ActKind::ActionCancelled).with("goal", spec.name.clone());
            return TurnDecision::new(act, ctx, ConversationStatus::Active);
        }

        let act = confirm_act(&ctx, spec);
        TurnDecision::new(act, ctx, ConversationStatus::AwaitingConfirmation)
    }

    /// Asks for the next missing slot, or moves to the action once all are
    /// filled.
    fn advance(&self, mut ctx: ConversationContext, spec: &GoalSpec) -> TurnDecision {
        let next = spec.missing_slots(&ctx.slots).next();
        let Some(next) = next else {
            ctx.pending_questions.clear();
            if spec.requires_confirmation {
                set_goal_status(&mut ctx, GoalStatus::AwaitingConfirmation);
                ctx.set_flag(AWAITING_CONFIRMATION_FLAG, true);
                let act = confirm_act(&ctx, spec);
                return TurnDecision::new(act, ctx, ConversationStatus::AwaitingConfirmation);
            }
            return self.execute(ctx, spec);
        };

        if !ctx.has_question_for(&next.name) {
            ctx.pending_questions
                .push_back(PendingQuestion::for_slot(next.name.clone(), next.prompt()));
        }
        set_goal_status(&mut ctx, GoalStatus::SlotFilling);

        let query = next.knowledge_key.as_ref().map(|key| KnowledgeQuery {
            user_id: ctx.user_id.clone(),
            query_key: key.clone(),
        });

        let act = match ctx.pending_questions.front() {
            Some(front) if front.is_clarification() => DialogueAct::new(ActKind::AskClarification)
                .with("reason", "unmatched_input")
                .with("goal", spec.name.clone()),
            Some(front) => {
                let mut act = DialogueAct::new(ActKind::AskQuestion)
                    .with("goal", spec.name.clone())
                    .with("prompt", front.prompt.clone());
                if let Some(slot) = &front.slot {
                    act.set("slot", slot.clone());
                }
                act
            }
            None => DialogueAct::new(ActKind::AskQuestion).with("goal", spec.name.clone()),
        };

        TurnDecision::new(act, ctx, ConversationStatus::Active).with_knowledge_query(query)
    }

    fn execute(&self, mut ctx: ConversationContext, spec: &GoalSpec) -> TurnDecision {
        let request = ActionRequest {
            action_name: spec.action_name().to_string(),
            parameters: ctx.slots.clone(),
        };
        ctx.pending_questions.clear();
        ctx.set_flag(AWAITING_CONFIRMATION_FLAG, false);
        set_goal_status(&mut ctx, GoalStatus::ActionPending);

        let act = DialogueAct::new(ActKind::ExecuteAction)
            .with("goal", spec.name.clone())
            .with("action", request.action_name.clone());
        TurnDecision::new(act, ctx, ConversationStatus::Active).with_action_request(request)
    }

    fn action_name_of<'a>(&'a self, goal_name: &'a str) -> &'a str {
        self.config
            .catalog
            .get(goal_name)
            .map_or(goal_name, GoalSpec::action_name)
    }
}

fn validate(input: &TurnInput, context: Option<&ConversationContext>) -> Result<(), PolicyError> {
    if input.conversation_id.is_blank() {
        return Err(PolicyError::InvalidInput {
            field: "conversation_id",
            reason: "must not be blank".to_string(),
        }
        .into());
    }
    if input.turn_id.is_blank() {
        return Err(PolicyError::InvalidInput {
            field: "turn_id",
            reason: "must not be blank".to_string(),
        }
        .into());
    }
    match context {
        Some(ctx) if ctx.conversation_id != input.conversation_id => {
            Err(PolicyError::InvalidInput {
                field: "conversation_id",
                reason: format!("context belongs to conversation {}", ctx.conversation_id),
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// Applies entities to the goal's slots in order; returns how many matched.
fn fill_slots(ctx: &mut ConversationContext, spec: &GoalSpec, entities: &[Entity]) -> usize {
    let mut matched = 0;
    for entity in entities {
        if let Some(slot) = spec.slot_for_entity(entity) {
            ctx.slots.insert(slot.name.clone(), entity.value.clone());
            matched += 1;
        }
    }

    let slots = &ctx.slots;
    ctx.pending_questions
        .retain(|q| q.slot.as_ref().is_none_or(|s| !slots.contains_key(s)));
    matched
}

fn set_goal_status(ctx: &mut ConversationContext, status: GoalStatus) {
    if let Some(goal) = ctx.active_goal.as_mut() {
        goal.status = status;
    }
}

fn confirm_act(ctx: &ConversationContext, spec: &GoalSpec) -> DialogueAct {
    let slots: Map<String, JsonValue> = ctx
        .slots
        .iter()
        .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
        .collect();
    DialogueAct::new(ActKind::ConfirmAction)
        .with("goal", spec.name.clone())
        .with("action", spec.action_name())
        .with("slots", slots)
}

fn status_of(ctx: &ConversationContext) -> ConversationStatus {
    match ctx.active_goal.as_ref().map(|g| g.status) {
        Some(GoalStatus::AwaitingConfirmation) => ConversationStatus::AwaitingConfirmation,
        _ => ConversationStatus::Active,
    }
}
