//! Turn orchestration for the Viki assistant.
//!
//! A turn flows through:
//!
//! 1. Load the conversation's context from the context store
//! 2. Ask the dialogue policy for a decision
//! 3. Run the requested action and knowledge lookups, each bounded by a
//!    timeout
//! 4. Commit the updated context, or archive and evict an ended conversation
//!
//! Turns for one conversation are serialized; turns for different
//! conversations run concurrently.

pub mod collaborator;
pub mod config;
pub mod error;
pub mod locks;
pub mod orchestrator;

pub use collaborator::{
    ActionExecutor, ArchivalRecord, EchoActionExecutor, InMemoryLongTermMemory, KnowledgeAnswer,
    LongTermMemory,
};
pub use config::OrchestratorConfig;
pub use error::{CollaboratorError, OrchestrationError};
pub use locks::{TurnGuard, TurnLocks};
pub use orchestrator::{TurnOrchestrator, TurnResult};
