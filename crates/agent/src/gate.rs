//! The only path by which the agent executes tools.
//!
//! Ungated tools run immediately. Gated tools are parked in the
//! [`ReviewStore`] and only run from [`ReviewGate::resume`], with the
//! arguments the reviewer settled on.

use std::collections::BTreeSet;

use aide_core::errors::{ApplicationError, DomainError};
use aide_core::review::{ActionId, Arguments, PendingAction, ReviewDecision, ReviewStore};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::ToolCall;
use crate::tools::{Tool, ToolRegistry};

#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome {
    Executed { tool: String, output: Value },
    AwaitingReview(PendingAction),
    Blocked { action_id: ActionId, reason: BlockReason },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    Rejected { reason: String },
    StillPending,
    UnknownAction,
    AlreadyExecuted,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::StillPending => "still_pending",
            Self::UnknownAction => "unknown_action",
            Self::AlreadyExecuted => "already_executed",
        }
    }
}

pub struct ReviewGate {
    tools: ToolRegistry,
    executed: BTreeSet<ActionId>,
}

impl ReviewGate {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools, executed: BTreeSet::new() }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Runs `call` now, or records it for review when its tool is gated.
    pub async fn dispatch(
        &self,
        store: &mut ReviewStore,
        call: ToolCall,
        custom_description: Option<&str>,
    ) -> Result<GateOutcome, ApplicationError> {
        let tool = self.lookup(&call.name)?;

        if store.requires_review(&call.name) {
            let arguments = into_arguments(&call.name, call.arguments)?;
            let action = store.create(&call.name, arguments, custom_description);
            info!(
                event_name = "gate.review.requested",
                action_id = %action.id,
                tool = %call.name,
                "tool call parked for review"
            );
            return Ok(GateOutcome::AwaitingReview(action));
        }

        let output = run_tool(tool, call.arguments).await?;
        info!(event_name = "gate.tool.executed", tool = %call.name, gated = false, "tool executed");
        Ok(GateOutcome::Executed { tool: call.name, output })
    }

    /// Executes a reviewed action with its final arguments. Each approved or
    /// edited action runs at most once.
    pub async fn resume(
        &mut self,
        store: &ReviewStore,
        action_id: &ActionId,
    ) -> Result<GateOutcome, ApplicationError> {
        let Some(action) = store.get(action_id) else {
            return Ok(self.blocked(action_id, BlockReason::UnknownAction));
        };
        if self.executed.contains(action_id) {
            return Ok(self.blocked(action_id, BlockReason::AlreadyExecuted));
        }

        let arguments = match (action.decision, store.final_arguments(action_id)) {
            (ReviewDecision::Pending, _) => {
                return Ok(self.blocked(action_id, BlockReason::StillPending))
            }
            (_, None) => {
                let reason = action.rejection_reason.clone().unwrap_or_default();
                return Ok(self.blocked(action_id, BlockReason::Rejected { reason }));
            }
            (_, Some(arguments)) => arguments,
        };

        let tool = self.tools.get(&action.tool_name).ok_or_else(|| {
            ApplicationError::from(DomainError::UnknownTool(action.tool_name.clone()))
        })?;
        let input = serde_json::to_value(arguments).map_err(|error| {
            ApplicationError::from(DomainError::InvalidArguments {
                tool: action.tool_name.clone(),
                message: error.to_string(),
            })
        })?;

        self.executed.insert(*action_id);
        let output = run_tool(tool, input).await?;
        info!(
            event_name = "gate.tool.executed",
            action_id = %action_id,
            tool = %action.tool_name,
            gated = true,
            decision = action.decision.as_str(),
            "reviewed tool executed"
        );

        Ok(GateOutcome::Executed { tool: action.tool_name.clone(), output })
    }

    /// Drops execution bookkeeping for actions no longer in the store.
    pub fn forget_missing(&mut self, store: &ReviewStore) {
        self.executed.retain(|id| store.get(id).is_some());
    }

    fn lookup(&self, name: &str) -> Result<&dyn Tool, ApplicationError> {
        self.tools.get(name).ok_or_else(|| DomainError::UnknownTool(name.to_string()).into())
    }

    fn blocked(&self, action_id: &ActionId, reason: BlockReason) -> GateOutcome {
        warn!(
            event_name = "gate.resume.blocked",
            action_id = %action_id,
            reason = reason.as_str(),
            "reviewed action will not run"
        );
        GateOutcome::Blocked { action_id: *action_id, reason }
    }
}

/// Converts model-supplied JSON into reviewable arguments. `null` values mean
/// "not given" and are dropped.
fn into_arguments(tool: &str, value: Value) -> Result<Arguments, ApplicationError> {
    let value = match value {
        Value::Null => return Ok(Arguments::new()),
        Value::Object(mut fields) => {
            fields.retain(|_, field| !field.is_null());
            Value::Object(fields)
        }
        other => other,
    };

    serde_json::from_value(value).map_err(|error| {
        DomainError::InvalidArguments { tool: tool.to_string(), message: error.to_string() }.into()
    })
}

async fn run_tool(tool: &dyn Tool, input: Value) -> Result<Value, ApplicationError> {
    tool.execute(input)
        .await
        .map_err(|error| ApplicationError::Integration(format!("{}: {error:#}", tool.name())))
}
