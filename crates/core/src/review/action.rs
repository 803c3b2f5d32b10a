use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::review::format;

const ACTION_ID_PREFIX: &str = "action_";

/// Identifier of a pending action, rendered as `action_<n>`.
///
/// The sequence number is assigned by the owning store and is never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId(u64);

impl ActionId {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ACTION_ID_PREFIX}{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseActionIdError(String);

impl fmt::Display for ParseActionIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` is not an action identifier (expected `action_<n>`)", self.0)
    }
}

impl std::error::Error for ParseActionIdError {}

impl FromStr for ActionId {
    type Err = ParseActionIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .strip_prefix(ACTION_ID_PREFIX)
            .and_then(|digits| digits.parse::<u64>().ok())
            .map(Self)
            .ok_or_else(|| ParseActionIdError(value.to_string()))
    }
}

impl TryFrom<String> for ActionId {
    type Error = ParseActionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActionId> for String {
    fn from(value: ActionId) -> Self {
        value.to_string()
    }
}

/// A single tool argument value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::List(values) => f.write_str(&values.join(", ")),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(values: Vec<&str>) -> Self {
        Self::List(values.into_iter().map(str::to_string).collect())
    }
}

/// Argument mapping of a tool call, keyed by argument name.
pub type Arguments = BTreeMap<String, ArgValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Pending,
    Approved,
    Rejected,
    Edited,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Edited => "edited",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One intercepted call to a gated tool, waiting on (or carrying) a human decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ActionId,
    pub category: String,
    pub tool_name: String,
    pub arguments: Arguments,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub decision: ReviewDecision,
    pub edited_arguments: Option<Arguments>,
    pub rejection_reason: Option<String>,
}

impl PendingAction {
    pub fn is_pending(&self) -> bool {
        self.decision == ReviewDecision::Pending
    }

    /// Compact view used by JSON outputs.
    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            id: self.id.to_string(),
            category: self.category.clone(),
            tool: self.tool_name.clone(),
            arguments: self.arguments.clone(),
            description: self.description.clone(),
            created_at: self.created_at.to_rfc3339(),
            status: self.decision.as_str(),
        }
    }

    pub fn format_for_review(&self) -> String {
        format::render_review(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionSummary {
    pub id: String,
    pub category: String,
    pub tool: String,
    pub arguments: Arguments,
    pub description: String,
    pub created_at: String,
    pub status: &'static str,
}
