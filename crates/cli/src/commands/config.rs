use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use aide_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let sources = Sources::detect();
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(sources.line("assistant.name", &config.assistant.name, &["AIDE_ASSISTANT_NAME"]));
    lines.push(sources.line(
        "assistant.utc_offset",
        &config.assistant.utc_offset,
        &["AIDE_ASSISTANT_UTC_OFFSET"],
    ));

    lines.push(sources.line("user.name", &config.user.name, &["AIDE_USER_NAME", "USER_NAME"]));
    lines.push(sources.line("user.email", &config.user.email, &["AIDE_USER_EMAIL", "USER_EMAIL"]));

    lines.push(sources.line("llm.provider", config.llm.provider.as_str(), &["AIDE_LLM_PROVIDER"]));
    lines.push(sources.line("llm.model", config.llm.effective_model(), &["AIDE_LLM_MODEL"]));
    lines.push(sources.line(
        "llm.temperature",
        &config.llm.temperature.to_string(),
        &["AIDE_LLM_TEMPERATURE", "MODEL_TEMPERATURE"],
    ));
    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(sources.line(
        "llm.api_key",
        &llm_api_key,
        &["AIDE_LLM_API_KEY", config.llm.provider.api_key_env()],
    ));

    lines.push(sources.line(
        "google.credentials_path",
        &config.google.credentials_path.display().to_string(),
        &["AIDE_GOOGLE_CREDENTIALS_PATH"],
    ));
    lines.push(sources.line(
        "google.token_path",
        &config.google.token_path.display().to_string(),
        &["AIDE_GOOGLE_TOKEN_PATH"],
    ));
    lines.push(sources.line("google.scopes", &config.google.scopes.join(", "), &[]));

    let gated_tools =
        config.review.gates.iter().map(|gate| gate.tool.as_str()).collect::<Vec<_>>().join(", ");
    lines.push(sources.line("review.gates", &format!("[{gated_tools}]"), &[]));
    lines.push(sources.line(
        "review.purge_after_turn",
        &config.review.purge_after_turn.to_string(),
        &["AIDE_REVIEW_PURGE_AFTER_TURN"],
    ));

    lines.push(sources.line(
        "logging.level",
        &config.logging.level,
        &["AIDE_LOGGING_LEVEL", "AIDE_LOG_LEVEL"],
    ));
    lines.push(sources.line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        &["AIDE_LOGGING_FORMAT", "AIDE_LOG_FORMAT"],
    ));

    lines.join("\n")
}

struct Sources {
    file_path: Option<PathBuf>,
    file_doc: Option<Value>,
}

impl Sources {
    fn detect() -> Self {
        let file_path = resolve_config_path(None);
        let file_doc = load_config_file_doc(file_path.as_deref());
        Self { file_path, file_doc }
    }

    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        format!("- {key_path} = {value} (source: {})", self.field_source(key_path, env_keys))
    }

    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps a short vendor prefix such as `gsk_` and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.find(['_', '-']) {
        Some(index) if index <= 4 => format!("{}***", &trimmed[..=index]),
        _ => "<redacted>".to_string(),
    }
}
