//! Agent runtime for the aide personal assistant.
//!
//! The model proposes tool calls; the runtime executes them through a
//! [`gate::ReviewGate`], which parks consequential calls (sending email,
//! creating calendar events) until a person approves, edits or rejects them.
//!
//! # Key Types
//!
//! - `AgentRuntime` - per-session loop over model steps (see `runtime`)
//! - `LlmClient` - pluggable model backend returning the next `AgentStep`
//! - `ReviewGate` - the single path by which tools run
//! - `ToolRegistry` - mail and calendar tools over swappable services
//!
//! The model never executes a gated tool itself. Only the arguments a
//! reviewer approved or supplied reach the tool.

pub mod gate;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod tools;

pub use gate::{BlockReason, GateOutcome, ReviewGate};
pub use llm::{AgentStep, LlmClient, ToolCall, TranscriptEntry};
pub use runtime::{AgentRuntime, TurnOutcome};
