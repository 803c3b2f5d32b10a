use std::sync::Arc;

use aide_core::audit::AuditSink;
use aide_core::config::AppConfig;
use aide_core::errors::{ApplicationError, DomainError};
use aide_core::review::{ActionId, PendingAction, ReviewStore};
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::gate::{BlockReason, GateOutcome, ReviewGate};
use crate::llm::{AgentStep, LlmClient, TranscriptEntry};
use crate::prompts::{PromptContext, SystemPrompt};
use crate::tools::{CalendarService, MailService, ToolRegistry};

pub const DEFAULT_MAX_STEPS: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Reply(String),
    AwaitingReview(PendingAction),
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    gate: ReviewGate,
    store: ReviewStore,
    system_prompt: SystemPrompt,
    prompt_context: PromptContext,
    offset: FixedOffset,
    thread_id: String,
    transcript: Vec<TranscriptEntry>,
    purge_after_turn: bool,
    max_steps: usize,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gate: ReviewGate,
        store: ReviewStore,
        prompt_context: PromptContext,
        offset: FixedOffset,
    ) -> Result<Self, ApplicationError> {
        let mut runtime = Self {
            llm,
            gate,
            store,
            system_prompt: SystemPrompt::new()?,
            prompt_context,
            offset,
            thread_id: String::new(),
            transcript: Vec::new(),
            purge_after_turn: true,
            max_steps: DEFAULT_MAX_STEPS,
        };
        runtime.start_thread();
        Ok(runtime)
    }

    /// Wires the assistant tools, review gates and prompt identity from `config`.
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        mail: Arc<dyn MailService>,
        calendar: Arc<dyn CalendarService>,
    ) -> Result<Self, ApplicationError> {
        let offset = config.assistant.offset().ok_or_else(|| {
            ApplicationError::Configuration(format!(
                "invalid assistant.utc_offset `{}`",
                config.assistant.utc_offset
            ))
        })?;
        let gate = ReviewGate::new(ToolRegistry::with_assistant_tools(mail, calendar, offset));
        let store = ReviewStore::from_config(&config.review);

        Ok(Self::new(llm, gate, store, PromptContext::from_config(config), offset)?
            .with_purge_after_turn(config.review.purge_after_turn))
    }

    pub fn with_purge_after_turn(mut self, purge_after_turn: bool) -> Self {
        self.purge_after_turn = purge_after_turn;
        self
    }

    /// Records review decisions to `sink`, tagged with the session thread id.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.store = std::mem::take(&mut self.store).with_audit_sink(sink);
        self.store.set_thread_id(self.thread_id.clone());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn review_store(&self) -> &ReviewStore {
        &self.store
    }

    /// Reviewer decisions go through here.
    pub fn review_store_mut(&mut self) -> &mut ReviewStore {
        &mut self.store
    }

    pub async fn handle_message(&mut self, text: &str) -> Result<TurnOutcome, ApplicationError> {
        info!(
            event_name = "agent.turn.started",
            thread_id = %self.thread_id,
            chars = text.chars().count(),
            "user message received"
        );
        self.transcript.push(TranscriptEntry::User { content: text.to_string() });
        self.run_turn().await
    }

    /// Continues the conversation once the reviewer has decided on `action_id`.
    pub async fn resume_after_review(
        &mut self,
        action_id: &ActionId,
    ) -> Result<TurnOutcome, ApplicationError> {
        let outcome = match self.gate.resume(&self.store, action_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let tool = self.action_tool(action_id);
                self.report_tool_error(tool, &error);
                return self.run_turn().await;
            }
        };

        match outcome {
            GateOutcome::Executed { tool, output } => {
                self.transcript.push(TranscriptEntry::ToolResult { tool, content: output });
            }
            GateOutcome::Blocked { reason: BlockReason::Rejected { reason }, .. } => {
                let tool = self.action_tool(action_id);
                self.transcript.push(TranscriptEntry::ToolResult {
                    tool,
                    content: json!({
                        "status": "rejected",
                        "action_id": action_id.to_string(),
                        "reason": reason,
                    }),
                });
            }
            GateOutcome::Blocked { reason: BlockReason::StillPending, .. } => {
                let action = self
                    .store
                    .get(action_id)
                    .cloned()
                    .ok_or_else(|| DomainError::UnknownAction(action_id.to_string()))?;
                return Ok(TurnOutcome::AwaitingReview(action));
            }
            GateOutcome::Blocked { reason: BlockReason::UnknownAction, .. } => {
                return Err(DomainError::UnknownAction(action_id.to_string()).into());
            }
            GateOutcome::Blocked { reason: BlockReason::AlreadyExecuted, .. } => {
                return Err(DomainError::InvariantViolation(format!(
                    "{action_id} has already been executed"
                ))
                .into());
            }
            GateOutcome::AwaitingReview(action) => return Ok(TurnOutcome::AwaitingReview(action)),
        }

        self.run_turn().await
    }

    /// Starts a new thread. Pending actions survive; resolved ones are purged.
    pub fn reset_conversation(&mut self) {
        let previous = std::mem::take(&mut self.thread_id);
        self.transcript.clear();
        let purged = self.store.purge_resolved();
        self.gate.forget_missing(&self.store);
        self.start_thread();
        info!(
            event_name = "agent.conversation.reset",
            previous_thread_id = %previous,
            thread_id = %self.thread_id,
            purged,
            "conversation reset"
        );
    }

    async fn run_turn(&mut self) -> Result<TurnOutcome, ApplicationError> {
        for _ in 0..self.max_steps {
            let prompt = self.system_prompt.render(&self.prompt_context, self.now())?;
            let step = self
                .llm
                .next_step(&prompt, &self.transcript)
                .await
                .map_err(|error| ApplicationError::Integration(format!("llm: {error:#}")))?;

            let call = match step {
                AgentStep::Reply(text) => {
                    self.transcript.push(TranscriptEntry::Assistant { content: text.clone() });
                    self.finish_turn();
                    return Ok(TurnOutcome::Reply(text));
                }
                AgentStep::CallTool(call) => call,
            };

            self.transcript.push(TranscriptEntry::ToolCall { call: call.clone() });
            let tool = call.name.clone();
            match self.gate.dispatch(&mut self.store, call, None).await {
                Ok(GateOutcome::Executed { tool, output }) => {
                    self.transcript.push(TranscriptEntry::ToolResult { tool, content: output });
                }
                Ok(GateOutcome::AwaitingReview(action)) => {
                    self.finish_turn();
                    return Ok(TurnOutcome::AwaitingReview(action));
                }
                Ok(GateOutcome::Blocked { action_id, reason }) => {
                    return Err(DomainError::InvariantViolation(format!(
                        "dispatch blocked {action_id}: {}",
                        reason.as_str()
                    ))
                    .into());
                }
                Err(error) => self.report_tool_error(tool, &error),
            }
        }

        self.finish_turn();
        Err(ApplicationError::Integration(format!(
            "model did not reply within {} steps",
            self.max_steps
        )))
    }

    fn report_tool_error(&mut self, tool: String, error: &ApplicationError) {
        warn!(
            event_name = "agent.tool.failed",
            thread_id = %self.thread_id,
            tool = %tool,
            error = %error,
            "tool call failed, reporting back to the model"
        );
        let content = json!({ "error": error.to_string() });
        self.transcript.push(TranscriptEntry::ToolResult { tool, content });
    }

    fn action_tool(&self, action_id: &ActionId) -> String {
        self.store.get(action_id).map(|action| action.tool_name.clone()).unwrap_or_default()
    }

    fn finish_turn(&mut self) {
        if !self.purge_after_turn {
            return;
        }
        let purged = self.store.purge_resolved();
        self.gate.forget_missing(&self.store);
        if purged > 0 {
            info!(
                event_name = "agent.turn.purged",
                thread_id = %self.thread_id,
                purged,
                "resolved actions purged after turn"
            );
        }
    }

    fn start_thread(&mut self) {
        self.thread_id = format!("session_{}", self.now().format("%Y%m%d_%H%M%S"));
        self.store.set_thread_id(self.thread_id.clone());
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}
