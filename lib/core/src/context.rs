//! Conversation context: the mutable dialogue state of one conversation.
//!
//! The context is owned by whoever holds it; the context store keeps whole
//! snapshots and never merges fields, so every mutation is a
//! read-modify-write of the complete structure.

use crate::id::{ConversationId, TurnId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Name of the system flag set while a proposed action awaits a yes/no.
pub const AWAITING_CONFIRMATION_FLAG: &str = "awaiting_confirmation";

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The human user.
    User,
    /// The assistant.
    Assistant,
}

/// A turn kept in the short rolling window of recent turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentTurn {
    /// Who spoke.
    pub speaker: Speaker,
    /// What was said (normalized text).
    pub text: String,
    /// When the turn happened.
    pub timestamp: DateTime<Utc>,
}

impl RecentTurn {
    /// Creates a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            timestamp,
        }
    }
}

/// Progress of the active goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Required slots are still missing.
    SlotFilling,
    /// All slots are filled; waiting for the user to confirm.
    AwaitingConfirmation,
    /// An action request has been emitted and its result is outstanding.
    ActionPending,
}

/// The in-progress task of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveGoal {
    /// Goal name (the intent that started it).
    pub name: String,
    /// Current progress.
    pub status: GoalStatus,
    /// NLU confidence the goal was adopted with.
    pub confidence: f64,
}

impl ActiveGoal {
    /// Creates a goal in the slot-filling status.
    #[must_use]
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            status: GoalStatus::SlotFilling,
            confidence,
        }
    }
}

/// A prompt still owed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuestion {
    /// The slot this question fills; `None` for a clarification.
    pub slot: Option<String>,
    /// Prompt key or text handed to response generation.
    pub prompt: String,
}

impl PendingQuestion {
    /// A question asking for a slot value.
    #[must_use]
    pub fn for_slot(slot: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            slot: Some(slot.into()),
            prompt: prompt.into(),
        }
    }

    /// A clarification question not tied to any slot.
    #[must_use]
    pub fn clarification(prompt: impl Into<String>) -> Self {
        Self {
            slot: None,
            prompt: prompt.into(),
        }
    }

    /// Returns true if this is a clarification question.
    #[must_use]
    pub fn is_clarification(&self) -> bool {
        self.slot.is_none()
    }
}

/// The full mutable dialogue state for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Conversation identifier; never changes after creation.
    pub conversation_id: ConversationId,
    /// Owning user.
    pub user_id: UserId,
    /// The in-progress task, absent when idle.
    pub active_goal: Option<ActiveGoal>,
    /// Filled slot values for the active goal.
    pub slots: BTreeMap<String, String>,
    /// Prompts still owed to the user, asked front first.
    pub pending_questions: VecDeque<PendingQuestion>,
    /// Most-recent-last window of turns.
    pub recent_turns: VecDeque<RecentTurn>,
    /// Free-text topic label.
    pub current_topic: Option<String>,
    /// Named boolean flags.
    pub system_flags: BTreeMap<String, bool>,
    /// Timestamp of the last mutation.
    pub last_active_at: DateTime<Utc>,
    /// Number of user turns processed.
    #[serde(default)]
    pub turn_count: u64,
    /// The last turn folded into this context.
    #[serde(default)]
    pub last_turn_id: Option<TurnId>,
}

impl ConversationContext {
    /// Creates an empty, idle context.
    #[must_use]
    pub fn new(conversation_id: ConversationId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            user_id,
            active_goal: None,
            slots: BTreeMap::new(),
            pending_questions: VecDeque::new(),
            recent_turns: VecDeque::new(),
            current_topic: None,
            system_flags: BTreeMap::new(),
            last_active_at: now,
            turn_count: 0,
            last_turn_id: None,
        }
    }

    /// Returns true if no goal is active.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active_goal.is_none()
    }

    /// Appends a turn, dropping the oldest turns beyond `cap`.
    pub fn push_recent_turn(&mut self, turn: RecentTurn, cap: usize) {
        self.recent_turns.push_back(turn);
        while self.recent_turns.len() > cap {
            self.recent_turns.pop_front();
        }
    }

    /// Reads a flag; unset flags are false.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.system_flags.get(name).copied().unwrap_or(false)
    }

    /// Sets a flag.
    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.system_flags.insert(name.into(), value);
    }

    /// Drops the active goal together with its slots and owed questions.
    pub fn clear_goal(&mut self) {
        self.active_goal = None;
        self.slots.clear();
        self.pending_questions.clear();
        self.set_flag(AWAITING_CONFIRMATION_FLAG, false);
    }

    /// Returns true if a question for `slot` is already queued.
    #[must_use]
    pub fn has_question_for(&self, slot: &str) -> bool {
        self.pending_questions
            .iter()
            .any(|q| q.slot.as_deref() == Some(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ConversationContext {
        ConversationContext::new(ConversationId::new("c1"), UserId::new("u1"), Utc::now())
    }

    #[test]
    fn new_context_is_idle() {
        let ctx = context();
        assert!(ctx.is_idle());
        assert!(ctx.slots.is_empty());
        assert!(ctx.pending_questions.is_empty());
        assert_eq!(ctx.turn_count, 0);
    }

    #[test]
    fn recent_turns_drop_oldest_first() {
        let mut ctx = context();
        let now = Utc::now();
        for i in 0..12 {
            ctx.push_recent_turn(RecentTurn::user(format!("turn {i}"), now), 5);
            assert!(ctx.recent_turns.len() <= 5);
        }

        let texts: Vec<_> = ctx.recent_turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 7", "turn 8", "turn 9", "turn 10", "turn 11"]);
    }

    #[test]
    fn clear_goal_resets_goal_state() {
        let mut ctx = context();
        ctx.active_goal = Some(ActiveGoal::new("book_flight", 0.9));
        ctx.slots.insert("destination".into(), "London".into());
        ctx.pending_questions
            .push_back(PendingQuestion::for_slot("departure_date", "ask_departure_date"));
        ctx.set_flag(AWAITING_CONFIRMATION_FLAG, true);

        ctx.clear_goal();

        assert!(ctx.is_idle());
        assert!(ctx.slots.is_empty());
        assert!(ctx.pending_questions.is_empty());
        assert!(!ctx.flag(AWAITING_CONFIRMATION_FLAG));
    }

    #[test]
    fn unset_flag_reads_false() {
        let ctx = context();
        assert!(!ctx.flag("anything"));
    }

    #[test]
    fn context_serde_roundtrip() {
        let mut ctx = context();
        ctx.active_goal = Some(ActiveGoal::new("check_weather", 0.8));
        ctx.push_recent_turn(RecentTurn::user("weather please", Utc::now()), 5);

        let json = serde_json::to_string(&ctx).expect("serialize");
        let parsed: ConversationContext = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(ctx, parsed);
    }
}
