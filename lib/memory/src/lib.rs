//! Short-term memory for the Viki orchestrator.
//!
//! This crate provides:
//!
//! - **Context Store**: concurrent, TTL-expiring storage of conversation
//!   contexts keyed by conversation id
//! - **Sweeper**: a background task that purges expired contexts

pub mod config;
pub mod error;
pub mod store;
pub mod sweeper;

pub use config::StoreConfig;
pub use error::ContextStoreError;
pub use store::{ContextStore, ShardedContextStore};
pub use sweeper::spawn_sweeper;
