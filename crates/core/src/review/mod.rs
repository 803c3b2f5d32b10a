//! Human review gate for sensitive tool calls.
//!
//! A [`GateRegistry`] names the tools that need a human decision. When one of
//! them is called, the caller records a [`PendingAction`] in the
//! [`ReviewStore`], shows it to a reviewer, and runs the tool only with the
//! arguments returned by [`ReviewStore::final_arguments`].

pub mod action;
pub mod format;
pub mod registry;
pub mod shared;
pub mod store;

pub use action::{
    ActionId, ActionSummary, ArgValue, Arguments, ParseActionIdError, PendingAction,
    ReviewDecision,
};
pub use registry::{
    GateRegistry, RegisteredOperation, CREATE_CALENDAR_EVENT, DEFAULT_GATES,
    DELETE_CALENDAR_EVENT, SEND_EMAIL,
};
pub use shared::SharedReviewStore;
pub use store::{ReviewStore, UNKNOWN_CATEGORY};
