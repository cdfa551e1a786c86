//! Dialogue policy for the Viki orchestrator.
//!
//! This crate provides:
//!
//! - **Goal Catalog**: the tasks the assistant can complete and their slots
//! - **Dialogue Policy**: a deterministic state machine deciding the next
//!   dialogue act for a turn
//! - **Decisions**: dialogue acts, action requests, and knowledge queries the
//!   orchestrator carries out

pub mod act;
pub mod catalog;
pub mod config;
pub mod error;
pub mod policy;
pub mod state;

pub use act::{ActKind, ConversationStatus, DialogueAct, TurnDecision};
pub use catalog::{GoalCatalog, GoalSpec, SlotSpec};
pub use config::PolicyConfig;
pub use error::PolicyError;
pub use policy::DialoguePolicy;
pub use state::DialogueState;
