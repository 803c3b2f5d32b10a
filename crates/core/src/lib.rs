pub mod audit;
pub mod config;
pub mod errors;
pub mod review;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use review::{
    ActionId, ActionSummary, ArgValue, Arguments, GateRegistry, PendingAction, ReviewDecision,
    ReviewStore, SharedReviewStore,
};
