use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::config::ReviewConfig;
use crate::review::action::{ActionId, Arguments, PendingAction, ReviewDecision};
use crate::review::registry::{GateRegistry, RegisteredOperation};

pub const UNKNOWN_CATEGORY: &str = "unknown";

/// In-memory bookkeeping for actions that wait on a human decision.
///
/// Stale or unknown identifiers never raise: decision calls report `false`
/// and lookups report `None`, so review UIs can probe state freely.
pub struct ReviewStore {
    registry: GateRegistry,
    actions: BTreeMap<u64, PendingAction>,
    last_sequence: u64,
    audit_sink: Option<Arc<dyn AuditSink>>,
    thread_id: Option<String>,
}

impl Default for ReviewStore {
    fn default() -> Self {
        Self::new(GateRegistry::default())
    }
}

impl fmt::Debug for ReviewStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewStore")
            .field("registry", &self.registry)
            .field("actions", &self.actions.len())
            .field("last_sequence", &self.last_sequence)
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl ReviewStore {
    pub fn new(registry: GateRegistry) -> Self {
        Self {
            registry,
            actions: BTreeMap::new(),
            last_sequence: 0,
            audit_sink: None,
            thread_id: None,
        }
    }

    pub fn with_default_gates() -> Self {
        Self::new(GateRegistry::with_default_gates())
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        let mut registry = GateRegistry::new();
        for gate in &config.gates {
            registry.register(gate.tool.clone(), gate.category.clone(), gate.description.clone());
        }
        Self::new(registry)
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn set_thread_id(&mut self, thread_id: impl Into<String>) {
        self.thread_id = Some(thread_id.into());
    }

    pub fn registry(&self) -> &GateRegistry {
        &self.registry
    }

    pub fn register(
        &mut self,
        tool_name: impl Into<String>,
        category: impl Into<String>,
        description_template: impl Into<String>,
    ) -> bool {
        self.registry.register(tool_name, category, description_template)
    }

    pub fn requires_review(&self, tool_name: &str) -> bool {
        self.registry.requires_review(tool_name)
    }

    /// Records a new pending action. Unregistered tools fall back to the
    /// `unknown` category and a generic description instead of failing.
    pub fn create(
        &mut self,
        tool_name: &str,
        arguments: Arguments,
        custom_description: Option<&str>,
    ) -> PendingAction {
        self.last_sequence += 1;
        let id = ActionId::from_sequence(self.last_sequence);

        let registered = self.registry.get(tool_name);
        let category = registered
            .map(|operation| operation.category.clone())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let description = resolve_description(tool_name, registered, custom_description);

        let action = PendingAction {
            id,
            category,
            tool_name: tool_name.to_string(),
            arguments,
            description,
            created_at: Utc::now(),
            decision: ReviewDecision::Pending,
            edited_arguments: None,
            rejection_reason: None,
        };
        self.actions.insert(id.sequence(), action.clone());

        info!(
            event_name = "review.action.created",
            action_id = %id,
            tool = tool_name,
            category = %action.category,
            registered = registered.is_some(),
            thread_id = self.thread_id.as_deref().unwrap_or("unknown"),
            "pending action created"
        );
        self.emit(
            &action,
            "review.action.created",
            "agent",
            AuditOutcome::Success,
            &[("category", action.category.as_str())],
        );

        action
    }

    /// Actions still waiting on a decision, in creation order.
    pub fn list_pending(&self) -> Vec<&PendingAction> {
        self.actions.values().filter(|action| action.is_pending()).collect()
    }

    pub fn get(&self, id: &ActionId) -> Option<&PendingAction> {
        self.actions.get(&id.sequence())
    }

    pub fn approve(&mut self, id: &ActionId) -> bool {
        let Some(action) = self.pending_mut(id) else {
            return false;
        };
        action.decision = ReviewDecision::Approved;

        let action = action.clone();
        info!(
            event_name = "review.action.approved",
            action_id = %id,
            tool = %action.tool_name,
            "pending action approved"
        );
        self.emit(&action, "review.action.approved", "reviewer", AuditOutcome::Success, &[]);
        true
    }

    pub fn reject(&mut self, id: &ActionId, reason: &str) -> bool {
        let Some(action) = self.pending_mut(id) else {
            return false;
        };
        action.decision = ReviewDecision::Rejected;
        action.rejection_reason = Some(reason.to_string());

        let action = action.clone();
        info!(
            event_name = "review.action.rejected",
            action_id = %id,
            tool = %action.tool_name,
            reason,
            "pending action rejected"
        );
        self.emit(
            &action,
            "review.action.rejected",
            "reviewer",
            AuditOutcome::Rejected,
            &[("reason", reason)],
        );
        true
    }

    /// Replaces the action's arguments wholesale; nothing is merged from the original.
    pub fn edit(&mut self, id: &ActionId, edited_arguments: Arguments) -> bool {
        let Some(action) = self.pending_mut(id) else {
            return false;
        };
        action.decision = ReviewDecision::Edited;
        action.edited_arguments = Some(edited_arguments);

        let action = action.clone();
        let edited_keys = action
            .edited_arguments
            .as_ref()
            .map(|arguments| arguments.keys().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        info!(
            event_name = "review.action.edited",
            action_id = %id,
            tool = %action.tool_name,
            edited_keys = %edited_keys,
            "pending action edited"
        );
        self.emit(
            &action,
            "review.action.edited",
            "reviewer",
            AuditOutcome::Success,
            &[("edited_keys", edited_keys.as_str())],
        );
        true
    }

    /// The arguments the tool may run with, or `None` when it must not run.
    pub fn final_arguments(&self, id: &ActionId) -> Option<&Arguments> {
        let action = self.get(id)?;
        match action.decision {
            ReviewDecision::Rejected => None,
            ReviewDecision::Edited => match &action.edited_arguments {
                Some(edited) if !edited.is_empty() => Some(edited),
                _ => Some(&action.arguments),
            },
            ReviewDecision::Pending | ReviewDecision::Approved => Some(&action.arguments),
        }
    }

    /// Drops every decided action. Identifiers already issued are never reused.
    pub fn purge_resolved(&mut self) -> usize {
        let before = self.actions.len();
        self.actions.retain(|_, action| action.is_pending());
        let purged = before - self.actions.len();

        if purged > 0 {
            info!(
                event_name = "review.actions.purged",
                purged,
                remaining = self.actions.len(),
                "resolved actions purged"
            );
            if let Some(sink) = &self.audit_sink {
                sink.emit(
                    AuditEvent::new(
                        None,
                        self.thread_id.clone(),
                        "purge",
                        "review.actions.purged",
                        AuditCategory::System,
                        "system",
                        AuditOutcome::Success,
                    )
                    .with_metadata("purged", purged.to_string()),
                );
            }
        }

        purged
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn pending_mut(&mut self, id: &ActionId) -> Option<&mut PendingAction> {
        match self.actions.get_mut(&id.sequence()) {
            Some(action) if action.is_pending() => Some(action),
            Some(action) => {
                debug!(
                    event_name = "review.decision.ignored",
                    action_id = %id,
                    decision = action.decision.as_str(),
                    "action already decided"
                );
                None
            }
            None => {
                debug!(
                    event_name = "review.decision.ignored",
                    action_id = %id,
                    "unknown action identifier"
                );
                None
            }
        }
    }

    fn emit(
        &self,
        action: &PendingAction,
        event_type: &str,
        actor: &str,
        outcome: AuditOutcome,
        metadata: &[(&str, &str)],
    ) {
        let Some(sink) = &self.audit_sink else {
            return;
        };

        let mut event = AuditEvent::new(
            Some(action.id),
            self.thread_id.clone(),
            action.id.to_string(),
            event_type,
            AuditCategory::Review,
            actor,
            outcome,
        )
        .with_metadata("tool", action.tool_name.clone());
        for (key, value) in metadata {
            event = event.with_metadata(*key, *value);
        }
        sink.emit(event);
    }
}

fn resolve_description(
    tool_name: &str,
    registered: Option<&RegisteredOperation>,
    custom_description: Option<&str>,
) -> String {
    if let Some(custom) = custom_description.filter(|custom| !custom.is_empty()) {
        return custom.to_string();
    }

    registered
        .map(|operation| operation.description_template.clone())
        .unwrap_or_else(|| format!("Executing {tool_name}"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use crate::audit::{AuditOutcome, InMemoryAuditSink};
    use crate::config::{GateConfig, ReviewConfig};
    use crate::review::action::{ActionId, ArgValue, Arguments, ReviewDecision};
    use crate::review::registry::GateRegistry;

    use super::{ReviewStore, UNKNOWN_CATEGORY};

    fn args(pairs: &[(&str, ArgValue)]) -> Arguments {
        pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
    }

    fn email_args() -> Arguments {
        args(&[("to", ArgValue::from(vec!["a@x.com"])), ("subject", ArgValue::from("Hi"))])
    }

    fn store() -> ReviewStore {
        let mut store = ReviewStore::new(GateRegistry::new());
        store.register("send_email", "email", "Sending an email");
        store
    }

    #[test]
    fn registered_names_are_gated() {
        let store = store();
        assert!(store.requires_review("send_email"));
        assert!(!store.requires_review("search_emails"));
    }

    #[test]
    fn fresh_action_is_pending_with_original_arguments() {
        let mut store = store();
        let action = store.create("send_email", email_args(), None);

        assert_eq!(action.id.to_string(), "action_1");
        assert_eq!(action.decision, ReviewDecision::Pending);
        assert_eq!(action.category, "email");
        assert_eq!(action.description, "Sending an email");
        assert!(action.edited_arguments.is_none());
        assert!(action.rejection_reason.is_none());
        assert_eq!(store.final_arguments(&action.id), Some(&email_args()));
    }

    #[test]
    fn custom_description_overrides_template() {
        let mut store = store();
        let action = store.create("send_email", email_args(), Some("Email the launch notes"));
        assert_eq!(action.description, "Email the launch notes");
    }

    #[test]
    fn unregistered_tools_fall_back_to_unknown_category() {
        let mut store = store();
        let action = store.create("archive_thread", Arguments::new(), None);

        assert_eq!(action.category, UNKNOWN_CATEGORY);
        assert_eq!(action.description, "Executing archive_thread");
        assert!(action.is_pending());
    }

    #[test]
    fn approve_keeps_original_arguments_and_is_one_shot() {
        let mut store = store();
        let action = store.create("send_email", email_args(), None);

        assert!(store.approve(&action.id));
        assert_eq!(store.final_arguments(&action.id), Some(&email_args()));
        assert!(!store.approve(&action.id));
        assert_eq!(
            store.get(&action.id).map(|stored| stored.decision),
            Some(ReviewDecision::Approved)
        );
    }

    #[test]
    fn reject_blocks_execution_and_later_decisions() {
        let mut store = store();
        let action = store.create("send_email", email_args(), None);

        assert!(store.reject(&action.id, "bad recipient"));
        assert_eq!(store.final_arguments(&action.id), None);
        assert!(!store.approve(&action.id));
        assert!(!store.edit(&action.id, email_args()));

        let stored = store.get(&action.id).expect("rejected action stays stored until purge");
        assert_eq!(stored.decision, ReviewDecision::Rejected);
        assert_eq!(stored.rejection_reason.as_deref(), Some("bad recipient"));
    }

    #[test]
    fn reject_accepts_an_empty_reason() {
        let mut store = store();
        let action = store.create("send_email", email_args(), None);
        assert!(store.reject(&action.id, ""));
        assert_eq!(
            store.get(&action.id).and_then(|stored| stored.rejection_reason.clone()),
            Some(String::new())
        );
    }

    #[test]
    fn edit_replaces_arguments_instead_of_merging() {
        let mut store = store();
        let action = store.create("send_email", email_args(), None);
        let replacement = args(&[("to", ArgValue::from(vec!["b@x.com"]))]);

        assert!(store.edit(&action.id, replacement.clone()));
        assert_eq!(store.final_arguments(&action.id), Some(&replacement));
        let final_args = store.final_arguments(&action.id).expect("edited action may run");
        assert!(!final_args.contains_key("subject"));
        assert!(!store.reject(&action.id, "too late"));
    }

    #[test]
    fn empty_edit_falls_back_to_original_arguments() {
        let mut store = store();
        let action = store.create("send_email", email_args(), None);

        assert!(store.edit(&action.id, Arguments::new()));
        assert_eq!(store.final_arguments(&action.id), Some(&email_args()));
        assert_eq!(
            store.get(&action.id).map(|stored| stored.decision),
            Some(ReviewDecision::Edited)
        );
    }

    #[test]
    fn unknown_identifiers_fail_silently() {
        let mut store = store();
        let unknown: ActionId = "action_99".parse().expect("valid id");

        assert!(store.get(&unknown).is_none());
        assert!(!store.approve(&unknown));
        assert!(!store.reject(&unknown, "nope"));
        assert!(!store.edit(&unknown, email_args()));
        assert!(store.final_arguments(&unknown).is_none());
    }

    #[test]
    fn list_pending_excludes_decided_actions_and_keeps_creation_order() {
        let mut store = store();
        let first = store.create("send_email", email_args(), None);
        let second = store.create("send_email", email_args(), None);
        let third = store.create("send_email", email_args(), None);
        let fourth = store.create("send_email", email_args(), None);

        store.approve(&second.id);
        store.reject(&fourth.id, "");

        let pending = store.list_pending().into_iter().map(|action| action.id).collect::<Vec<_>>();
        assert_eq!(pending, vec![first.id, third.id]);
    }

    #[test]
    fn purge_removes_resolved_and_keeps_pending_and_counter() {
        let mut store = store();
        let approved = store.create("send_email", email_args(), None);
        let rejected = store.create("send_email", email_args(), None);
        let edited = store.create("send_email", email_args(), None);
        let pending = store.create("send_email", email_args(), None);

        store.approve(&approved.id);
        store.reject(&rejected.id, "no");
        store.edit(&edited.id, email_args());

        assert_eq!(store.purge_resolved(), 3);
        assert_eq!(store.len(), 1);
        assert!(store.get(&approved.id).is_none());
        assert!(store.final_arguments(&approved.id).is_none());
        assert!(store.get(&pending.id).is_some());

        let next = store.create("send_email", email_args(), None);
        assert_eq!(next.id.to_string(), "action_5");
        assert_eq!(store.purge_resolved(), 0);
    }

    #[test]
    fn identifiers_stay_unique_across_purges() {
        let mut store = store();
        let mut seen = BTreeSet::new();

        for round in 0..5 {
            for _ in 0..3 {
                let action = store.create("send_email", email_args(), None);
                assert!(seen.insert(action.id), "identifier reused in round {round}");
                store.approve(&action.id);
            }
            store.purge_resolved();
        }

        assert_eq!(seen.len(), 15);
        assert!(store.is_empty());
    }

    #[test]
    fn rejected_email_scenario() {
        let mut store = ReviewStore::new(GateRegistry::new());
        store.register("send_email", "email", "Sending an email");

        let action = store.create("send_email", email_args(), None);
        assert_eq!(action.category, "email");
        assert_eq!(action.decision, ReviewDecision::Pending);

        assert!(store.reject(&action.id, "wrong recipient"));
        assert!(store.final_arguments(&action.id).is_none());
    }

    #[test]
    fn repeated_calendar_requests_get_distinct_identifiers() {
        let mut store = ReviewStore::with_default_gates();
        let sync = args(&[("title", ArgValue::from("Sync"))]);

        let first = store.create("create_calendar_event", sync.clone(), None);
        let second = store.create("create_calendar_event", sync, None);

        assert_ne!(first.id, second.id);
        let pending = store.list_pending().into_iter().map(|action| action.id).collect::<Vec<_>>();
        assert!(pending.contains(&first.id));
        assert!(pending.contains(&second.id));
    }

    #[test]
    fn config_gates_are_registered() {
        let store = ReviewStore::from_config(&ReviewConfig {
            gates: vec![GateConfig {
                tool: "delete_calendar_event".to_string(),
                category: "calendar".to_string(),
                description: "Deleting a calendar event".to_string(),
            }],
            purge_after_turn: true,
        });

        assert!(store.requires_review("delete_calendar_event"));
        assert!(!store.requires_review("send_email"));
    }

    #[test]
    fn decisions_are_audited_and_ignored_attempts_are_not() {
        let sink = InMemoryAuditSink::default();
        let mut store = store().with_audit_sink(Arc::new(sink.clone()));
        store.set_thread_id("session_test");

        let first = store.create("send_email", email_args(), None);
        let second = store.create("send_email", email_args(), None);
        store.approve(&first.id);
        store.approve(&first.id);
        store.reject(&second.id, "wrong recipient");
        store.purge_resolved();

        assert_eq!(
            sink.event_types(),
            vec![
                "review.action.created",
                "review.action.created",
                "review.action.approved",
                "review.action.rejected",
                "review.actions.purged",
            ]
        );

        let events = sink.events();
        assert!(events.iter().all(|event| event.thread_id.as_deref() == Some("session_test")));
        assert_eq!(events[3].outcome, AuditOutcome::Rejected);
        assert_eq!(
            events[3].metadata.get("reason").map(String::as_str),
            Some("wrong recipient")
        );
    }
}
