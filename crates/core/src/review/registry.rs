use std::collections::HashMap;

use serde::Serialize;

pub const SEND_EMAIL: &str = "send_email";
pub const CREATE_CALENDAR_EVENT: &str = "create_calendar_event";
pub const DELETE_CALENDAR_EVENT: &str = "delete_calendar_event";

/// Tools gated by default: `(tool, category, description)`.
pub const DEFAULT_GATES: [(&str, &str, &str); 3] = [
    (SEND_EMAIL, "email", "Sending an email"),
    (CREATE_CALENDAR_EVENT, "calendar", "Creating a calendar event"),
    (DELETE_CALENDAR_EVENT, "calendar", "Deleting a calendar event"),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisteredOperation {
    pub tool_name: String,
    pub category: String,
    pub description_template: String,
}

/// Set of tool names whose calls must be reviewed by a human before running.
#[derive(Clone, Debug, Default)]
pub struct GateRegistry {
    operations: HashMap<String, RegisteredOperation>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_gates() -> Self {
        let mut registry = Self::new();
        for (tool_name, category, description) in DEFAULT_GATES {
            registry.register(tool_name, category, description);
        }
        registry
    }

    /// Inserts or replaces the declaration for `tool_name`. Blank names are ignored.
    pub fn register(
        &mut self,
        tool_name: impl Into<String>,
        category: impl Into<String>,
        description_template: impl Into<String>,
    ) -> bool {
        let tool_name = tool_name.into();
        if tool_name.trim().is_empty() {
            return false;
        }

        let operation = RegisteredOperation {
            tool_name: tool_name.clone(),
            category: category.into(),
            description_template: description_template.into(),
        };
        self.operations.insert(tool_name, operation);
        true
    }

    pub fn requires_review(&self, tool_name: &str) -> bool {
        self.operations.contains_key(tool_name)
    }

    pub fn get(&self, tool_name: &str) -> Option<&RegisteredOperation> {
        self.operations.get(tool_name)
    }

    /// Registered operations sorted by tool name.
    pub fn operations(&self) -> Vec<&RegisteredOperation> {
        let mut operations = self.operations.values().collect::<Vec<_>>();
        operations.sort_by(|left, right| left.tool_name.cmp(&right.tool_name));
        operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{GateRegistry, CREATE_CALENDAR_EVENT, DELETE_CALENDAR_EVENT, SEND_EMAIL};

    #[test]
    fn registered_names_require_review_and_others_do_not() {
        let mut registry = GateRegistry::new();
        assert!(registry.register("send_email", "email", "Sending an email"));
        assert!(registry.register("archive_thread", "email", "Archiving a thread"));

        assert!(registry.requires_review("send_email"));
        assert!(registry.requires_review("archive_thread"));
        assert!(!registry.requires_review("search_emails"));
        assert!(!registry.requires_review("Send_Email"));
        assert!(!registry.requires_review(""));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = GateRegistry::new();
        registry.register("send_email", "email", "Sending an email");
        registry.register("send_email", "outbound", "Dispatching mail");

        let operation = registry.get("send_email").expect("operation should be registered");
        assert_eq!(operation.category, "outbound");
        assert_eq!(operation.description_template, "Dispatching mail");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn blank_names_are_not_registered() {
        let mut registry = GateRegistry::new();
        assert!(!registry.register("", "email", "nothing"));
        assert!(!registry.register("   ", "email", "nothing"));
        assert!(registry.is_empty());
    }

    #[test]
    fn default_gates_cover_outgoing_email_and_calendar_changes() {
        let registry = GateRegistry::with_default_gates();
        let names = registry
            .operations()
            .into_iter()
            .map(|operation| operation.tool_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec![CREATE_CALENDAR_EVENT, DELETE_CALENDAR_EVENT, SEND_EMAIL]);
    }
}
