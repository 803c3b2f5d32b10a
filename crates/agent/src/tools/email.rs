use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::tools::Tool;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const SUBJECT_PREVIEW_CHARS: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub cc: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub bcc: Vec<String>,
}

impl OutgoingEmail {
    fn validate(&self) -> Result<()> {
        if self.to.iter().all(|recipient| recipient.trim().is_empty()) {
            bail!("at least one recipient is required");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub date: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
}

impl From<&EmailMessage> for EmailSummary {
    fn from(message: &EmailMessage) -> Self {
        Self {
            id: message.id.clone(),
            from: message.from.clone(),
            subject: preview_subject(&message.subject),
            date: message.date.clone(),
        }
    }
}

/// Mailbox backend. Gmail in production, [`Outbox`] for dry runs.
#[async_trait]
pub trait MailService: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;
    async fn create_draft(&self, email: &OutgoingEmail) -> Result<String>;
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EmailSummary>>;
    async fn fetch(&self, message_id: &str) -> Result<Option<EmailMessage>>;
}

#[derive(Debug, Default)]
struct OutboxState {
    sent: Vec<OutgoingEmail>,
    drafts: Vec<OutgoingEmail>,
    inbox: Vec<EmailMessage>,
}

/// In-memory mailbox. Records outgoing mail and serves a seeded inbox.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    state: Arc<Mutex<OutboxState>>,
}

impl Outbox {
    pub fn with_inbox(inbox: Vec<EmailMessage>) -> Self {
        let outbox = Self::default();
        outbox.lock().inbox = inbox;
        outbox
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.lock().sent.clone()
    }

    pub fn drafts(&self) -> Vec<OutgoingEmail> {
        self.lock().drafts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, OutboxState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl MailService for Outbox {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let mut state = self.lock();
        state.sent.push(email.clone());
        Ok(format!("msg_{}", state.sent.len()))
    }

    async fn create_draft(&self, email: &OutgoingEmail) -> Result<String> {
        let mut state = self.lock();
        state.drafts.push(email.clone());
        Ok(format!("draft_{}", state.drafts.len()))
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EmailSummary>> {
        let needle = query.trim().to_lowercase();
        let state = self.lock();
        Ok(state
            .inbox
            .iter()
            .filter(|message| {
                needle.is_empty()
                    || message.from.to_lowercase().contains(&needle)
                    || message.subject.to_lowercase().contains(&needle)
                    || message.body.to_lowercase().contains(&needle)
            })
            .take(max_results)
            .map(EmailSummary::from)
            .collect())
    }

    async fn fetch(&self, message_id: &str) -> Result<Option<EmailMessage>> {
        Ok(self.lock().inbox.iter().find(|message| message.id == message_id).cloned())
    }
}

pub struct SendEmailTool {
    mail: Arc<dyn MailService>,
}

impl SendEmailTool {
    pub fn new(mail: Arc<dyn MailService>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &'static str {
        "send_email"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let email: OutgoingEmail =
            serde_json::from_value(input).context("send_email expects to, subject and body")?;
        email.validate()?;

        let message_id = self.mail.send(&email).await.context("failed to send email")?;
        info!(
            event_name = "tool.email.sent",
            message_id = %message_id,
            recipients = email.to.len(),
            "email sent"
        );

        Ok(json!({
            "status": "sent",
            "message_id": message_id,
            "to": email.to,
            "cc": email.cc,
            "subject": email.subject,
        }))
    }
}

pub struct DraftEmailTool {
    mail: Arc<dyn MailService>,
}

impl DraftEmailTool {
    pub fn new(mail: Arc<dyn MailService>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for DraftEmailTool {
    fn name(&self) -> &'static str {
        "draft_email"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let mut email: OutgoingEmail =
            serde_json::from_value(input).context("draft_email expects to, subject and body")?;
        email.validate()?;
        // Drafts never carry blind copies.
        email.bcc.clear();

        let draft_id = self.mail.create_draft(&email).await.context("failed to create draft")?;
        info!(event_name = "tool.email.drafted", draft_id = %draft_id, "email draft created");

        Ok(json!({
            "status": "drafted",
            "draft_id": draft_id,
            "to": email.to,
            "subject": email.subject,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default = "default_search_limit")]
    max_results: usize,
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

pub struct SearchEmailsTool {
    mail: Arc<dyn MailService>,
}

impl SearchEmailsTool {
    pub fn new(mail: Arc<dyn MailService>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for SearchEmailsTool {
    fn name(&self) -> &'static str {
        "search_emails"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let search: SearchInput =
            serde_json::from_value(input).context("search_emails expects a query")?;
        let matches = self
            .mail
            .search(&search.query, search.max_results)
            .await
            .context("failed to search emails")?;

        Ok(json!({
            "query": search.query,
            "count": matches.len(),
            "messages": matches,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct FetchInput {
    message_id: String,
}

pub struct GetEmailContentTool {
    mail: Arc<dyn MailService>,
}

impl GetEmailContentTool {
    pub fn new(mail: Arc<dyn MailService>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for GetEmailContentTool {
    fn name(&self) -> &'static str {
        "get_email_content"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let fetch: FetchInput =
            serde_json::from_value(input).context("get_email_content expects a message_id")?;
        let Some(message) =
            self.mail.fetch(&fetch.message_id).await.context("failed to fetch email")?
        else {
            bail!("no email found with id `{}`", fetch.message_id);
        };

        Ok(serde_json::to_value(message)?)
    }
}

fn preview_subject(subject: &str) -> String {
    if subject.chars().count() > SUBJECT_PREVIEW_CHARS {
        let head = subject.chars().take(SUBJECT_PREVIEW_CHARS - 3).collect::<String>();
        format!("{head}...")
    } else {
        subject.to_string()
    }
}

/// Accepts a single address, a list of addresses, or `null` for none.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{
        DraftEmailTool, EmailMessage, GetEmailContentTool, Outbox, SearchEmailsTool,
        SendEmailTool,
    };
    use crate::tools::Tool;

    fn inbox() -> Vec<EmailMessage> {
        vec![
            EmailMessage {
                id: "m1".to_string(),
                from: "john@example.com".to_string(),
                to: vec!["user@example.com".to_string()],
                subject: "Project status for the quarterly planning review and roadmap sync"
                    .to_string(),
                date: "Mon, 5 Jan 2026 09:00:00 +0530".to_string(),
                body: "All green.".to_string(),
            },
            EmailMessage {
                id: "m2".to_string(),
                from: "design@example.com".to_string(),
                to: vec!["user@example.com".to_string()],
                subject: "Mockups".to_string(),
                date: "Tue, 6 Jan 2026 10:00:00 +0530".to_string(),
                body: "Attached.".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn send_accepts_a_single_recipient_string() {
        let outbox = Outbox::default();
        let tool = SendEmailTool::new(Arc::new(outbox.clone()));

        let output = tool
            .execute(json!({ "to": "bob@example.com", "subject": "Hi", "body": "Hello" }))
            .await
            .expect("send should succeed");

        assert_eq!(output["status"], "sent");
        assert_eq!(output["message_id"], "msg_1");
        assert_eq!(outbox.sent()[0].to, vec!["bob@example.com".to_string()]);
    }

    #[tokio::test]
    async fn send_requires_a_recipient() {
        let outbox = Outbox::default();
        let tool = SendEmailTool::new(Arc::new(outbox.clone()));

        let error = tool
            .execute(json!({ "to": [], "subject": "Hi", "body": "Hello" }))
            .await
            .expect_err("empty recipients should fail");

        assert!(error.to_string().contains("at least one recipient"));
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn drafts_are_recorded_without_sending() {
        let outbox = Outbox::default();
        let tool = DraftEmailTool::new(Arc::new(outbox.clone()));

        let output = tool
            .execute(json!({
                "to": ["team@example.com"],
                "subject": "Status",
                "body": "Draft body",
                "bcc": ["hidden@example.com"]
            }))
            .await
            .expect("draft should succeed");

        assert_eq!(output["draft_id"], "draft_1");
        assert!(outbox.sent().is_empty());
        assert!(outbox.drafts()[0].bcc.is_empty());
    }

    #[tokio::test]
    async fn null_copy_lists_count_as_empty() {
        let outbox = Outbox::default();
        let tool = DraftEmailTool::new(Arc::new(outbox.clone()));

        tool.execute(json!({
            "to": "team@example.com",
            "subject": "Status",
            "body": "Draft body",
            "cc": null,
            "bcc": null
        }))
        .await
        .expect("null cc and bcc should be accepted");

        let draft = &outbox.drafts()[0];
        assert!(draft.cc.is_empty());
        assert_eq!(draft.to, vec!["team@example.com".to_string()]);
    }

    #[tokio::test]
    async fn search_truncates_long_subjects_and_honours_limit() {
        let outbox = Outbox::with_inbox(inbox());
        let tool = SearchEmailsTool::new(Arc::new(outbox));

        let all = tool.execute(json!({ "query": "" })).await.expect("search should succeed");
        assert_eq!(all["count"], 2);
        let subject = all["messages"][0]["subject"].as_str().unwrap_or_default();
        assert_eq!(subject.chars().count(), 50);
        assert!(subject.ends_with("..."));

        let limited = tool
            .execute(json!({ "query": "example.com", "max_results": 1 }))
            .await
            .expect("search should succeed");
        assert_eq!(limited["count"], 1);
    }

    #[tokio::test]
    async fn get_email_content_reports_missing_messages() {
        let tool = GetEmailContentTool::new(Arc::new(Outbox::with_inbox(inbox())));

        let found = tool.execute(json!({ "message_id": "m2" })).await.expect("m2 exists");
        assert_eq!(found["subject"], "Mockups");

        let missing = tool.execute(json!({ "message_id": "nope" })).await;
        assert!(missing.is_err());
    }
}
