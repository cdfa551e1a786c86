//! Core domain types and utilities for the Viki dialogue turn orchestrator.
//!
//! This crate provides the identifiers, error handling foundation, and the
//! data model shared by the context store, the dialogue policy, and the
//! turn orchestrator.

pub mod context;
pub mod error;
pub mod id;
pub mod turn;

pub use context::{
    AWAITING_CONFIRMATION_FLAG, ActiveGoal, ConversationContext, GoalStatus, PendingQuestion,
    RecentTurn, Speaker,
};
pub use error::Result;
pub use id::{ConversationId, ParseIdError, TurnId, UserId};
pub use turn::{
    ActionErrorInfo, ActionOutcome, ActionRequest, ActionResponse, Entity, KnowledgeQuery,
    TurnInput, Understanding,
};
