//! Dialogue states.
//!
//! The state is not stored; it is read off the context, so it can never
//! disagree with the goal it describes.

use serde::{Deserialize, Serialize};
use viki_core::{ConversationContext, GoalStatus};

/// The state of a conversation's dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    /// No active goal.
    Idle,
    /// A goal is active and required slots are missing.
    SlotFilling,
    /// An action was proposed and waits for yes/no.
    AwaitingConfirmation,
    /// The conversation is over.
    Ended,
}

impl DialogueState {
    /// Derives the state of a stored context.
    ///
    /// A goal whose action request is out counts as idle: the goal is done
    /// from the user's point of view and only the result is outstanding.
    #[must_use]
    pub fn of(context: &ConversationContext) -> Self {
        match context.active_goal.as_ref().map(|g| g.status) {
            None | Some(GoalStatus::ActionPending) => Self::Idle,
            Some(GoalStatus::SlotFilling) => Self::SlotFilling,
            Some(GoalStatus::AwaitingConfirmation) => Self::AwaitingConfirmation,
        }
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}
