//! Agent Core: the orchestration layer.
//!
//! Submodules:
//! - `orchestrator`: Per-query decision and dispatch loop
//! - `capabilities`: Decision and completion seams, with the model-backed impls
//! - `verdict`: Parser for the decision model's JSON verdict
//! - `ledger`: Shared, append-only conversation record
//! - `database`: SQLite mirror of the ledger
//! - `types`: Turns, ledger entries, and routing types
//! - `errors`: Agent-level error taxonomy

pub mod capabilities;
pub mod database;
pub mod errors;
pub mod ledger;
pub mod orchestrator;
pub mod types;
pub mod verdict;

// Re-exports for convenience
pub use capabilities::{CompletionCapability, DecisionCapability};
pub use database::LedgerStore;
pub use errors::AgentError;
pub use ledger::ConversationLedger;
pub use orchestrator::{Orchestrator, DEFAULT_HISTORY_WINDOW};
pub use types::{Decision, LedgerEntry, Route, RunOutcome, Turn};
