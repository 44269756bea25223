//! Agentry Agent — the turn loop and everything it drives.
//!
//! This crate contains:
//! - **capabilities**: Capability trait, registry, executor, built-ins, extension catalog
//! - **context**: message list assembly for each oracle call
//! - **memory**: similarity store contract, `MemoryBank`, and the recall/log gate
//! - **parser**: fenced action extraction from oracle text
//! - **agent_loop**: the per-turn retry / self-correction state machine

pub mod agent_loop;
pub mod capabilities;
pub mod context;
pub mod memory;
pub mod parser;

pub use agent_loop::{AgentLoop, AgentSettings, RetryState, TurnReport};
pub use capabilities::{
    builtin_registry, Capability, CapabilityExecutor, CapabilityOptions, CapabilityRegistry,
    CapabilityResult, FailureClassifier,
};
pub use context::ContextAssembler;
pub use memory::{MemoryBank, MemoryGate, SimilarityStore, StoreError};
pub use parser::{parse_response, ActionRequest, ParseOutcome};
