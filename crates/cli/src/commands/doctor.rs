use std::path::Path;
use std::sync::Arc;

use aide_agent::tools::{InMemoryCalendar, Outbox, ToolRegistry};
use aide_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded and validated (llm: {} / {})",
                    config.llm.provider.as_str(),
                    config.llm.effective_model()
                ),
            });
            checks.push(check_google_credentials(&config.google.credentials_path));
            checks.push(check_google_token(&config.google.token_path));
            checks.push(check_review_gates(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["google_credentials", "google_token", "review_gates"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_google_credentials(path: &Path) -> DoctorCheck {
    if path.is_file() {
        DoctorCheck {
            name: "google_credentials",
            status: CheckStatus::Pass,
            details: format!("OAuth client credentials found at `{}`", path.display()),
        }
    } else {
        DoctorCheck {
            name: "google_credentials",
            status: CheckStatus::Fail,
            details: format!(
                "OAuth client credentials not found at `{}`. Download them from the Google Cloud \
                 console or set AIDE_GOOGLE_CREDENTIALS_PATH",
                path.display()
            ),
        }
    }
}

fn check_google_token(path: &Path) -> DoctorCheck {
    if path.is_file() {
        DoctorCheck {
            name: "google_token",
            status: CheckStatus::Pass,
            details: format!("OAuth token cached at `{}`", path.display()),
        }
    } else {
        DoctorCheck {
            name: "google_token",
            status: CheckStatus::Skipped,
            details: format!(
                "no OAuth token at `{}` yet; it is written on first sign-in",
                path.display()
            ),
        }
    }
}

fn check_review_gates(config: &AppConfig) -> DoctorCheck {
    if config.review.gates.is_empty() {
        return DoctorCheck {
            name: "review_gates",
            status: CheckStatus::Fail,
            details: "no review gates configured; every tool would run unreviewed".to_string(),
        };
    }

    let Some(offset) = config.assistant.offset() else {
        return DoctorCheck {
            name: "review_gates",
            status: CheckStatus::Fail,
            details: format!("invalid assistant.utc_offset `{}`", config.assistant.utc_offset),
        };
    };
    let tools = ToolRegistry::with_assistant_tools(
        Arc::new(Outbox::default()),
        Arc::new(InMemoryCalendar::default()),
        offset,
    );
    let unknown = config
        .review
        .gates
        .iter()
        .filter(|gate| tools.get(&gate.tool).is_none())
        .map(|gate| gate.tool.as_str())
        .collect::<Vec<_>>();

    if unknown.is_empty() {
        let gated = config.review.gates.iter().map(|gate| gate.tool.as_str()).collect::<Vec<_>>();
        DoctorCheck {
            name: "review_gates",
            status: CheckStatus::Pass,
            details: format!("{} gated tool(s): {}", gated.len(), gated.join(", ")),
        }
    } else {
        DoctorCheck {
            name: "review_gates",
            status: CheckStatus::Fail,
            details: format!("review gates name unknown tools: {}", unknown.join(", ")),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
