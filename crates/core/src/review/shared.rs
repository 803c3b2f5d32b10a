use std::sync::{Arc, Mutex, MutexGuard};

use crate::review::action::{ActionId, Arguments, PendingAction};
use crate::review::store::ReviewStore;

/// A [`ReviewStore`] behind one mutex, for hosts that share a store between
/// threads. Every call takes the lock once, so identifiers stay unique.
#[derive(Clone, Debug, Default)]
pub struct SharedReviewStore {
    inner: Arc<Mutex<ReviewStore>>,
}

impl SharedReviewStore {
    pub fn new(store: ReviewStore) -> Self {
        Self { inner: Arc::new(Mutex::new(store)) }
    }

    pub fn register(
        &self,
        tool_name: impl Into<String>,
        category: impl Into<String>,
        description_template: impl Into<String>,
    ) -> bool {
        self.lock().register(tool_name, category, description_template)
    }

    pub fn requires_review(&self, tool_name: &str) -> bool {
        self.lock().requires_review(tool_name)
    }

    pub fn create(
        &self,
        tool_name: &str,
        arguments: Arguments,
        custom_description: Option<&str>,
    ) -> PendingAction {
        self.lock().create(tool_name, arguments, custom_description)
    }

    pub fn list_pending(&self) -> Vec<PendingAction> {
        self.lock().list_pending().into_iter().cloned().collect()
    }

    pub fn get(&self, id: &ActionId) -> Option<PendingAction> {
        self.lock().get(id).cloned()
    }

    pub fn approve(&self, id: &ActionId) -> bool {
        self.lock().approve(id)
    }

    pub fn reject(&self, id: &ActionId, reason: &str) -> bool {
        self.lock().reject(id, reason)
    }

    pub fn edit(&self, id: &ActionId, edited_arguments: Arguments) -> bool {
        self.lock().edit(id, edited_arguments)
    }

    pub fn final_arguments(&self, id: &ActionId) -> Option<Arguments> {
        self.lock().final_arguments(id).cloned()
    }

    pub fn purge_resolved(&self) -> usize {
        self.lock().purge_resolved()
    }

    fn lock(&self) -> MutexGuard<'_, ReviewStore> {
        match self.inner.lock() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::thread;

    use crate::review::action::{ArgValue, Arguments};
    use crate::review::store::ReviewStore;

    use super::SharedReviewStore;

    #[test]
    fn concurrent_creates_never_share_an_identifier() {
        let shared = SharedReviewStore::new(ReviewStore::with_default_gates());

        let handles = (0..4)
            .map(|worker| {
                let shared = shared.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|index| {
                            let mut arguments = Arguments::new();
                            arguments.insert(
                                "title".to_string(),
                                ArgValue::from(format!("worker {worker} event {index}")),
                            );
                            let action = shared.create("create_calendar_event", arguments, None);
                            if index % 2 == 0 {
                                shared.approve(&action.id);
                                shared.purge_resolved();
                            }
                            action.id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let mut seen = BTreeSet::new();
        for handle in handles {
            for id in handle.join().expect("worker thread should not panic") {
                assert!(seen.insert(id), "identifier {id} issued twice");
            }
        }

        assert_eq!(seen.len(), 100);
        assert_eq!(shared.list_pending().len(), 48);
    }

    #[test]
    fn shared_handles_observe_the_same_decisions() {
        let shared = SharedReviewStore::new(ReviewStore::with_default_gates());
        let reviewer = shared.clone();

        let action = shared.create("send_email", Arguments::new(), None);
        assert!(reviewer.reject(&action.id, "not now"));
        assert!(shared.final_arguments(&action.id).is_none());
        assert!(!shared.approve(&action.id));
        assert!(shared.get(&action.id).is_some_and(|stored| !stored.is_pending()));
    }
}
