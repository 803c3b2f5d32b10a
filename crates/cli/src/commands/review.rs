//! Interactive review of a single tool call against dry-run services.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use aide_agent::gate::{BlockReason, GateOutcome, ReviewGate};
use aide_agent::llm::ToolCall;
use aide_agent::tools::{InMemoryCalendar, Outbox, ToolRegistry};
use aide_core::config::{AppConfig, LoadOptions};
use aide_core::errors::{ApplicationError, DomainError};
use aide_core::review::{ActionId, Arguments, ReviewStore};
use serde_json::Value;

use crate::commands::CommandResult;

const COMMAND: &str = "review";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewRequest {
    pub tool: String,
    pub args: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
enum Decision {
    Approve,
    Edit(Arguments),
    Reject(String),
}

pub fn run(request: ReviewRequest) -> CommandResult {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };
    crate::init_logging(&config);

    run_with_io(&config, request, &mut stdin.lock(), &mut stdout)
}

pub fn run_with_io<R, W>(
    config: &AppConfig,
    request: ReviewRequest,
    input: &mut R,
    output: &mut W,
) -> CommandResult
where
    R: BufRead,
    W: Write,
{
    let arguments = match serde_json::from_str::<Value>(&request.args) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_arguments",
                "--args must be a JSON object",
                3,
            )
        }
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_arguments",
                format!("--args is not valid JSON: {error}"),
                3,
            )
        }
    };

    let Some(offset) = config.assistant.offset() else {
        return CommandResult::failure(
            COMMAND,
            "config_validation",
            format!("invalid assistant.utc_offset `{}`", config.assistant.utc_offset),
            2,
        );
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                5,
            )
        }
    };

    let mut gate = ReviewGate::new(ToolRegistry::with_assistant_tools(
        Arc::new(Outbox::default()),
        Arc::new(InMemoryCalendar::default()),
        offset,
    ));
    let mut store = ReviewStore::from_config(&config.review);
    let call = ToolCall::new(request.tool.clone(), arguments);

    let dispatched =
        runtime.block_on(gate.dispatch(&mut store, call, request.description.as_deref()));
    let action = match dispatched {
        Ok(GateOutcome::Executed { tool, output: result }) => {
            return CommandResult::success(
                COMMAND,
                format!("{tool} does not require review; executed (dry run): {result}"),
            );
        }
        Ok(GateOutcome::AwaitingReview(action)) => action,
        Ok(GateOutcome::Blocked { action_id, reason }) => {
            return CommandResult::failure(
                COMMAND,
                "blocked",
                format!("{action_id} blocked: {}", reason.as_str()),
                4,
            );
        }
        Err(error) => {
            return CommandResult::from_application_error(COMMAND, error, &request.tool, 4)
        }
    };

    let decision = match prompt_decision(&action.format_for_review(), input, output) {
        Ok(decision) => decision,
        Err(message) => return CommandResult::failure(COMMAND, "invalid_decision", message, 3),
    };
    let applied = match &decision {
        Decision::Approve => store.approve(&action.id),
        Decision::Edit(arguments) => store.edit(&action.id, arguments.clone()),
        Decision::Reject(reason) => store.reject(&action.id, reason),
    };
    if !applied {
        return CommandResult::from_application_error(
            COMMAND,
            DomainError::InvariantViolation(format!("{} was already decided", action.id)).into(),
            &action.id.to_string(),
            4,
        );
    }

    match runtime.block_on(gate.resume(&store, &action.id)) {
        Ok(GateOutcome::Executed { tool, output: result }) => CommandResult::success(
            COMMAND,
            format!(
                "{} {}; executed {tool} (dry run): {result}",
                decided_verb(&decision),
                action.id
            ),
        ),
        Ok(GateOutcome::Blocked { action_id, reason: BlockReason::Rejected { reason } }) => {
            let reason = if reason.is_empty() { "no reason given".to_string() } else { reason };
            CommandResult::success(
                COMMAND,
                format!("rejected {action_id} ({}): {reason}", action.tool_name),
            )
        }
        Ok(other) => resume_failure(&action.id, other),
        Err(error) => CommandResult::from_application_error(
            COMMAND,
            error,
            &action.id.to_string(),
            4,
        ),
    }
}

fn prompt_decision<R, W>(rendered: &str, input: &mut R, output: &mut W) -> Result<Decision, String>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "{rendered}").map_err(|error| error.to_string())?;
    let choice = ask(input, output, "Decision [approve/edit/reject]: ")?;

    match choice.to_ascii_lowercase().as_str() {
        "approve" | "a" | "y" | "yes" => Ok(Decision::Approve),
        "edit" | "e" => {
            let raw = ask(input, output, "Edited arguments (JSON object): ")?;
            serde_json::from_str::<Arguments>(&raw)
                .map(Decision::Edit)
                .map_err(|error| format!("edited arguments are not a flat JSON object: {error}"))
        }
        "reject" | "r" | "n" | "no" => {
            Ok(Decision::Reject(ask(input, output, "Reason (optional): ")?))
        }
        other => Err(format!("unknown decision `{other}`, expected approve, edit or reject")),
    }
}

fn ask<R, W>(input: &mut R, output: &mut W, prompt: &str) -> Result<String, String>
where
    R: BufRead,
    W: Write,
{
    write!(output, "{prompt}").and_then(|()| output.flush()).map_err(|error| error.to_string())?;

    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(|error| error.to_string())?;
    if read == 0 {
        return Err("input closed before a decision was made".to_string());
    }
    Ok(line.trim().to_string())
}

fn decided_verb(decision: &Decision) -> &'static str {
    match decision {
        Decision::Approve => "approved",
        Decision::Edit(_) => "edited",
        Decision::Reject(_) => "rejected",
    }
}

fn resume_failure(action_id: &ActionId, outcome: GateOutcome) -> CommandResult {
    let error = match outcome {
        GateOutcome::Blocked { reason, .. } => DomainError::InvariantViolation(format!(
            "{action_id} could not run: {}",
            reason.as_str()
        )),
        _ => DomainError::InvariantViolation(format!("{action_id} is still awaiting review")),
    };
    CommandResult::from_application_error(
        COMMAND,
        ApplicationError::from(error),
        &action_id.to_string(),
        4,
    )
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{prompt_decision, Decision};

    #[test]
    fn decisions_accept_short_forms() {
        let mut output = Vec::new();
        let decision = prompt_decision("card", &mut Cursor::new("A\n"), &mut output);
        assert_eq!(decision, Ok(Decision::Approve));

        let decision = prompt_decision("card", &mut Cursor::new("r\n\n"), &mut output);
        assert_eq!(decision, Ok(Decision::Reject(String::new())));
    }

    #[test]
    fn edit_requires_a_flat_object() {
        let mut output = Vec::new();
        let decision = prompt_decision(
            "card",
            &mut Cursor::new("edit\n{\"to\": {\"nested\": true}}\n"),
            &mut output,
        );
        assert!(decision.is_err_and(|message| message.contains("flat JSON object")));
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut output = Vec::new();
        let decision = prompt_decision("card", &mut Cursor::new(""), &mut output);
        assert!(decision.is_err());
        assert!(String::from_utf8_lossy(&output).starts_with("card\nDecision"));
    }
}
