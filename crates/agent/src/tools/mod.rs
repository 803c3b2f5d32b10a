use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::FixedOffset;
use serde_json::Value;

pub mod calendar;
pub mod email;

pub use calendar::{
    parse_event_time, CalendarEvent, CalendarService, CreateCalendarEventTool,
    DeleteCalendarEventTool, GetAvailableTimeSlotsTool, InMemoryCalendar, ListUpcomingEventsTool,
    NewEvent, UpdateCalendarEventTool,
};
pub use email::{
    DraftEmailTool, EmailMessage, EmailSummary, GetEmailContentTool, MailService, Outbox,
    OutgoingEmail, SearchEmailsTool, SendEmailTool,
};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the mail and calendar tools wired to the given services.
    /// Naive calendar times are read at `offset`.
    pub fn with_assistant_tools(
        mail: Arc<dyn MailService>,
        calendar: Arc<dyn CalendarService>,
        offset: FixedOffset,
    ) -> Self {
        let mut registry = Self::default();
        registry.register(SendEmailTool::new(mail.clone()));
        registry.register(DraftEmailTool::new(mail.clone()));
        registry.register(SearchEmailsTool::new(mail.clone()));
        registry.register(GetEmailContentTool::new(mail));
        registry.register(CreateCalendarEventTool::new(calendar.clone(), offset));
        registry.register(ListUpcomingEventsTool::new(calendar.clone(), offset));
        registry.register(GetAvailableTimeSlotsTool::new(calendar.clone(), offset));
        registry.register(UpdateCalendarEventTool::new(calendar.clone(), offset));
        registry.register(DeleteCalendarEventTool::new(calendar));
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = self.tools.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
