use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation proposed by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self { name: name.into(), arguments }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AgentStep {
    Reply(String),
    CallTool(ToolCall),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User { content: String },
    Assistant { content: String },
    ToolCall { call: ToolCall },
    ToolResult { tool: String, content: Value },
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Chooses the next step given the system prompt and the conversation so far.
    async fn next_step(&self, system_prompt: &str, transcript: &[TranscriptEntry])
        -> Result<AgentStep>;
}
