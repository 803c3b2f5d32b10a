use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::review::DEFAULT_GATES;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub assistant: AssistantConfig,
    pub user: UserConfig,
    pub llm: LlmConfig,
    pub google: GoogleConfig,
    pub review: ReviewConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub name: String,
    /// Offset used for prompts and calendar times, e.g. `+05:30`.
    pub utc_offset: String,
}

#[derive(Clone, Debug)]
pub struct UserConfig {
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct GoogleConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub scopes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewConfig {
    pub gates: Vec<GateConfig>,
    pub purge_after_turn: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    pub tool: String,
    pub category: String,
    pub description: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Groq,
    Gemini,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Gemini => "gemini",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Groq => "llama-3.3-70b-versatile",
            Self::Gemini => "gemini-2.0-flash-exp",
        }
    }

    /// Provider-native variable consulted when no `AIDE_LLM_API_KEY` is set.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub user_email: Option<String>,
    pub google_credentials_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_GOOGLE_SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig {
                name: "Assistant".to_string(),
                utc_offset: "+05:30".to_string(),
            },
            user: UserConfig { name: "User".to_string(), email: "user@example.com".to_string() },
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                api_key: None,
                model: None,
                temperature: 0.7,
            },
            google: GoogleConfig {
                credentials_path: PathBuf::from("credentials.json"),
                token_path: PathBuf::from("token.json"),
                scopes: DEFAULT_GOOGLE_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            },
            review: ReviewConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            gates: DEFAULT_GATES
                .iter()
                .map(|(tool, category, description)| GateConfig {
                    tool: tool.to_string(),
                    category: category.to_string(),
                    description: description.to_string(),
                })
                .collect(),
            purge_after_turn: true,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected groq|gemini)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AssistantConfig {
    pub fn offset(&self) -> Option<FixedOffset> {
        parse_utc_offset(&self.utc_offset)
    }
}

impl LlmConfig {
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());
        let mut provider_pinned = options.overrides.llm_provider.is_some();

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            provider_pinned |=
                patch.llm.as_ref().and_then(|llm| llm.provider.as_ref()).is_some();
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("aide.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        provider_pinned |= config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.resolve_provider_api_key(provider_pinned);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(assistant) = patch.assistant {
            if let Some(name) = assistant.name {
                self.assistant.name = name;
            }
            if let Some(utc_offset) = assistant.utc_offset {
                self.assistant.utc_offset = utc_offset;
            }
        }

        if let Some(user) = patch.user {
            if let Some(name) = user.name {
                self.user.name = name;
            }
            if let Some(email) = user.email {
                self.user.email = email;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = Some(model);
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }

        if let Some(google) = patch.google {
            if let Some(credentials_path) = google.credentials_path {
                self.google.credentials_path = credentials_path;
            }
            if let Some(token_path) = google.token_path {
                self.google.token_path = token_path;
            }
            if let Some(scopes) = google.scopes {
                self.google.scopes = scopes;
            }
        }

        if let Some(review) = patch.review {
            if let Some(gates) = review.gates {
                self.review.gates = gates;
            }
            if let Some(purge_after_turn) = review.purge_after_turn {
                self.review.purge_after_turn = purge_after_turn;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    /// Returns whether the environment selected the llm provider explicitly.
    fn apply_env_overrides(&mut self) -> Result<bool, ConfigError> {
        if let Some(value) = read_env("AIDE_ASSISTANT_NAME") {
            self.assistant.name = value;
        }
        if let Some(value) = read_env("AIDE_ASSISTANT_UTC_OFFSET") {
            self.assistant.utc_offset = value;
        }

        let user_name = read_env("AIDE_USER_NAME").or_else(|| read_env("USER_NAME"));
        if let Some(value) = user_name {
            self.user.name = value;
        }
        let user_email = read_env("AIDE_USER_EMAIL").or_else(|| read_env("USER_EMAIL"));
        if let Some(value) = user_email {
            self.user.email = value;
        }

        let mut provider_pinned = false;
        if let Some(value) = read_env("AIDE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
            provider_pinned = true;
        }
        if let Some(value) = read_env("AIDE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AIDE_LLM_MODEL") {
            self.llm.model = Some(value);
        }
        let temperature =
            read_env("AIDE_LLM_TEMPERATURE").or_else(|| read_env("MODEL_TEMPERATURE"));
        if let Some(value) = temperature {
            self.llm.temperature = parse_f32("AIDE_LLM_TEMPERATURE", &value)?;
        }

        if let Some(value) = read_env("AIDE_GOOGLE_CREDENTIALS_PATH") {
            self.google.credentials_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("AIDE_GOOGLE_TOKEN_PATH") {
            self.google.token_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("AIDE_REVIEW_PURGE_AFTER_TURN") {
            self.review.purge_after_turn = parse_bool("AIDE_REVIEW_PURGE_AFTER_TURN", &value)?;
        }

        let log_level = read_env("AIDE_LOGGING_LEVEL").or_else(|| read_env("AIDE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("AIDE_LOGGING_FORMAT").or_else(|| read_env("AIDE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(provider_pinned)
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = Some(llm_model);
        }
        if let Some(user_email) = overrides.user_email {
            self.user.email = user_email;
        }
        if let Some(credentials_path) = overrides.google_credentials_path {
            self.google.credentials_path = credentials_path;
        }
    }

    /// Falls back to the provider-native key variables. A bare `GROQ_API_KEY`
    /// selects groq unless a provider was chosen explicitly.
    fn resolve_provider_api_key(&mut self, provider_pinned: bool) {
        if self.llm.api_key.is_some() {
            return;
        }

        if !provider_pinned && read_env(LlmProvider::Groq.api_key_env()).is_some() {
            self.llm.provider = LlmProvider::Groq;
        }
        self.llm.api_key = read_env(self.llm.provider.api_key_env()).map(secret_value);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_assistant(&self.assistant)?;
        validate_user(&self.user)?;
        validate_llm(&self.llm)?;
        validate_review(&self.review)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("aide.toml"), PathBuf::from("config/aide.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// Parses `+HH:MM`, `-HH:MM`, `+HHMM`, `Z` or `UTC`.
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    value.parse::<FixedOffset>().ok()
}

fn validate_assistant(assistant: &AssistantConfig) -> Result<(), ConfigError> {
    if assistant.name.trim().is_empty() {
        return Err(ConfigError::Validation("assistant.name must not be empty".to_string()));
    }

    if assistant.offset().is_none() {
        return Err(ConfigError::Validation(format!(
            "assistant.utc_offset `{}` must look like `+05:30`, `-08:00` or `Z`",
            assistant.utc_offset
        )));
    }

    Ok(())
}

fn validate_user(user: &UserConfig) -> Result<(), ConfigError> {
    let email = user.email.trim();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid {
        return Err(ConfigError::Validation(format!(
            "user.email `{email}` is not a valid email address"
        )));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    let missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation(format!(
            "llm.api_key is required for the `{}` provider. Set AIDE_LLM_API_KEY or {}",
            llm.provider.as_str(),
            llm.provider.api_key_env()
        )));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.model.as_ref().is_some_and(|model| model.trim().is_empty()) {
        return Err(ConfigError::Validation("llm.model must not be empty when set".to_string()));
    }

    Ok(())
}

fn validate_review(review: &ReviewConfig) -> Result<(), ConfigError> {
    if let Some(index) = review.gates.iter().position(|gate| gate.tool.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "review.gates[{index}].tool must not be empty"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    assistant: Option<AssistantPatch>,
    user: Option<UserPatch>,
    llm: Option<LlmPatch>,
    google: Option<GooglePatch>,
    review: Option<ReviewPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantPatch {
    name: Option<String>,
    utc_offset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserPatch {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct GooglePatch {
    credentials_path: Option<PathBuf>,
    token_path: Option<PathBuf>,
    scopes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewPatch {
    gates: Option<Vec<GateConfig>>,
    purge_after_turn: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        parse_utc_offset, AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: [&str; 8] = [
        "AIDE_LLM_API_KEY",
        "AIDE_LLM_PROVIDER",
        "AIDE_LOG_LEVEL",
        "AIDE_LOG_FORMAT",
        "AIDE_USER_EMAIL",
        "USER_EMAIL",
        "GROQ_API_KEY",
        "GOOGLE_API_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&MANAGED_VARS);

        env::set_var("TEST_AIDE_LLM_KEY", "gsk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("aide.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "groq"
api_key = "${TEST_AIDE_LLM_KEY}"

[user]
name = "Priya"
email = "priya@example.com"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("gsk-from-env".to_string()),
                "api key should be interpolated from the environment",
            )?;
            ensure(config.llm.provider == LlmProvider::Groq, "provider should come from file")?;
            ensure(
                config.llm.effective_model() == "llama-3.3-70b-versatile",
                "groq default model should apply",
            )?;
            ensure(config.user.name == "Priya", "user name should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_AIDE_LLM_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&MANAGED_VARS);

        env::set_var("AIDE_LLM_API_KEY", "key-test");
        env::set_var("AIDE_LOG_LEVEL", "warn");
        env::set_var("AIDE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&MANAGED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&MANAGED_VARS);

        env::set_var("AIDE_LLM_API_KEY", "key-from-env");
        env::set_var("AIDE_USER_EMAIL", "env@example.com");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("aide.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "key-from-file"
temperature = 0.2

[user]
email = "file@example.com"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("key-from-env".to_string()),
                "env api key should win over file",
            )?;
            ensure(config.user.email == "env@example.com", "env email should win over file")?;
            ensure(
                (config.llm.temperature - 0.2).abs() < f32::EPSILON,
                "file temperature should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&MANAGED_VARS);
        result
    }

    #[test]
    fn groq_key_alone_selects_groq_provider() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&MANAGED_VARS);

        env::set_var("GROQ_API_KEY", "gsk-native");
        env::set_var("GOOGLE_API_KEY", "google-native");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.llm.provider == LlmProvider::Groq, "groq should be preferred")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("gsk-native".to_string()),
                "groq key should be used",
            )?;

            env::set_var("AIDE_LLM_PROVIDER", "gemini");
            let pinned = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(pinned.llm.provider == LlmProvider::Gemini, "explicit provider should stick")?;
            ensure(
                pinned.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("google-native".to_string()),
                "google key should be used for gemini",
            )?;
            Ok(())
        })();

        clear_vars(&MANAGED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&MANAGED_VARS);

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("llm.api_key") && message.contains("GOOGLE_API_KEY")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&MANAGED_VARS);
        result
    }

    #[test]
    fn blank_gate_names_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&MANAGED_VARS);

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("aide.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "key"

[[review.gates]]
tool = " "
category = "email"
description = "nothing"
"#,
            )
            .map_err(|err| err.to_string())?;

            let error =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .err()
                    .ok_or_else(|| "blank gate should fail validation".to_string())?;
            let points_at_gate = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("review.gates[0]")
            );
            ensure(points_at_gate, "validation should point at the blank gate")
        })();

        clear_vars(&MANAGED_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&MANAGED_VARS);

        env::set_var("AIDE_LLM_API_KEY", "gsk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("gsk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.review.gates.len() == 3, "default gates should be configured")?;
            ensure(config.review.purge_after_turn, "purge after turn should default on")?;
            Ok(())
        })();

        clear_vars(&MANAGED_VARS);
        result
    }

    #[test]
    fn utc_offsets_parse_common_forms() {
        assert_eq!(parse_utc_offset("+05:30").map(|offset| offset.local_minus_utc()), Some(19_800));
        assert_eq!(parse_utc_offset("-0800").map(|offset| offset.local_minus_utc()), Some(-28_800));
        assert_eq!(parse_utc_offset("Z").map(|offset| offset.local_minus_utc()), Some(0));
        assert!(parse_utc_offset("05:30").is_none());
        assert!(parse_utc_offset("+5:30").is_none());
        assert!(parse_utc_offset("+25:00").is_none());
        assert_eq!(parse_utc_offset(" utc ").map(|offset| offset.local_minus_utc()), Some(0));
        assert_eq!(parse_utc_offset("-0330").map(|offset| offset.local_minus_utc()), Some(-12_600));
    }
}
