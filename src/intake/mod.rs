//! Staged clinical intake interview.
//!
//! A session walks a fixed chain of stages. Each user message becomes one
//! turn: the collaborator replies under the current stage's instructions,
//! the reply is parsed into an `IntakeResult`, and the transition policy
//! decides whether to stay, advance, finish with a summary, or halt.

pub mod executor;
pub mod machine;
pub mod message;
pub mod parser;
pub mod policy;
pub mod prompts;
pub mod service;
pub mod stage;
pub mod state;
pub mod store;
pub mod summary;

pub use executor::{TokenUsage, TurnExecutor};
pub use machine::{IntakeDeps, SessionStateMachine, TurnOutcome};
pub use message::Message;
pub use parser::{IntakeResult, IntakeStatus, parse_reply};
pub use policy::Transition;
pub use prompts::{default_registry, load_registry_from_dir};
pub use service::{IntakeService, SessionStatus};
pub use stage::{StageId, StageRegistry};
pub use state::SessionState;
pub use store::{InMemoryStateStore, StateStore};
pub use summary::SummaryGenerator;
