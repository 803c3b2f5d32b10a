use aide_core::config::AppConfig;
use aide_core::errors::ApplicationError;
use chrono::{DateTime, FixedOffset};
use tera::{Context, Tera};

const SYSTEM_TEMPLATE: &str = "system.txt";

/// Values substituted into the system prompt on every step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptContext {
    pub assistant_name: String,
    pub user_name: String,
    pub user_email: String,
    pub gated_tools: Vec<String>,
}

impl PromptContext {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            assistant_name: config.assistant.name.clone(),
            user_name: config.user.name.clone(),
            user_email: config.user.email.clone(),
            gated_tools: config.review.gates.iter().map(|gate| gate.tool.clone()).collect(),
        }
    }
}

pub struct SystemPrompt {
    tera: Tera,
}

impl SystemPrompt {
    pub fn new() -> Result<Self, ApplicationError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("email.txt", include_str!("../templates/email.txt")),
            ("calendar.txt", include_str!("../templates/calendar.txt")),
            (SYSTEM_TEMPLATE, include_str!("../templates/system.txt")),
        ])
        .map_err(|error| ApplicationError::Configuration(format!("prompt templates: {error}")))?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        prompt: &PromptContext,
        now: DateTime<FixedOffset>,
    ) -> Result<String, ApplicationError> {
        let mut context = Context::new();
        context.insert("assistant_name", &prompt.assistant_name);
        context.insert("user_name", &prompt.user_name);
        context.insert("user_email", &prompt.user_email);
        context.insert("gated_tools", &prompt.gated_tools);
        context.insert("current_datetime", &now.format("%A, %B %d, %Y at %I:%M %p").to_string());
        context.insert("current_date", &now.format("%Y-%m-%d").to_string());
        context.insert("utc_offset", &now.format("%:z").to_string());

        self.tera.render(SYSTEM_TEMPLATE, &context).map_err(|error| {
            ApplicationError::Configuration(format!("failed to render system prompt: {error}"))
        })
    }
}
