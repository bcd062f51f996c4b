//! Per-collection change subscriptions.
//!
//! Callbacks run after commit, outside of any internal borrow, so they may
//! read from or write to the store again.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

/// Handle returned by `ObjectStore::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Listener {
    id: SubscriptionId,
    model: &'static str,
    callback: Rc<dyn Fn()>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Listener>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, model: &'static str, callback: Rc<dyn Fn()>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push(Listener {
            id,
            model,
            callback,
        });
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|listener| listener.id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Invokes every listener whose model is in `touched`, once each.
    pub(crate) fn notify(&self, touched: &BTreeSet<&'static str>) -> usize {
        if touched.is_empty() {
            return 0;
        }
        let callbacks: Vec<Rc<dyn Fn()>> = self
            .entries
            .borrow()
            .iter()
            .filter(|listener| touched.contains(listener.model))
            .map(|listener| Rc::clone(&listener.callback))
            .collect();
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ListenerRegistry;
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    #[test]
    fn notify_only_reaches_touched_models() {
        let registry = ListenerRegistry::default();
        let todo_calls = Rc::new(Cell::new(0));
        let tag_calls = Rc::new(Cell::new(0));

        let counter = Rc::clone(&todo_calls);
        let todo_id = registry.add("Todo", Rc::new(move || counter.set(counter.get() + 1)));
        let counter = Rc::clone(&tag_calls);
        registry.add("Tag", Rc::new(move || counter.set(counter.get() + 1)));

        let touched: BTreeSet<&'static str> = ["Todo"].into_iter().collect();
        assert_eq!(registry.notify(&touched), 1);
        assert_eq!(todo_calls.get(), 1);
        assert_eq!(tag_calls.get(), 0);

        assert!(registry.remove(todo_id));
        assert!(!registry.remove(todo_id));
        assert_eq!(registry.notify(&touched), 0);
        assert_eq!(registry.len(), 1);
    }
}
