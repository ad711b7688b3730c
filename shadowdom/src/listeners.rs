//! Fan-out of tree change events to any number of observers.

use crate::context::DocumentContext;
use crate::{Element, NodeId, trace};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives changes to the mirrored tree.
///
/// Every event is delivered on the document thread, in the order the
/// observer has to apply them.
pub trait UpdateListener: Send + Sync {
    fn on_attribute_modified(&self, _element: Element, _name: &str, _value: &str) {}

    fn on_attribute_removed(&self, _element: Element, _name: &str) {}

    fn on_inspect_requested(&self, _element: Element) {}

    fn on_child_node_removed(&self, _parent_id: NodeId, _node_id: NodeId) {}

    fn on_child_node_inserted(&self, _event: &ChildInserted<'_>) {}
}

/// A subtree that just appeared under `parent_id`.
pub struct ChildInserted<'a> {
    pub parent_id: NodeId,
    pub element: Element,
    /// Left sibling after the insert; `None` means first child.
    pub previous_id: Option<NodeId>,
    /// `element` and all of its descendants, in pre-order. Every one of them
    /// has a node id.
    pub subtree: &'a [Element],
    pub context: &'a DocumentContext<'a>,
}

type Snapshot = Arc<Vec<Arc<dyn UpdateListener>>>;

/// Copy-on-write listener registry.
///
/// Dispatch iterates an immutable snapshot without holding the lock. The
/// snapshot is rebuilt lazily after the registry changes, so a dispatch that
/// already started keeps using the list it saw.
#[derive(Default)]
pub struct UpdateListeners {
    listeners: Mutex<Vec<Arc<dyn UpdateListener>>>,
    snapshot: ArcSwapOption<Vec<Arc<dyn UpdateListener>>>,
}

impl UpdateListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn UpdateListener>) {
        let mut listeners = self.listeners.lock();
        listeners.push(listener);
        self.snapshot.store(None);
    }

    /// Remove `listener`, compared by identity. Returns whether it was registered.
    pub fn remove(&self, listener: &Arc<dyn UpdateListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(index) = listeners.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        listeners.remove(index);
        self.snapshot.store(None);
        true
    }

    pub fn clear(&self) {
        let mut listeners = self.listeners.lock();
        listeners.clear();
        self.snapshot.store(None);
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    fn snapshot(&self) -> Snapshot {
        if let Some(snapshot) = self.snapshot.load_full() {
            return snapshot;
        }
        let listeners = self.listeners.lock();
        // Somebody may have rebuilt it while we waited for the lock.
        if let Some(snapshot) = self.snapshot.load_full() {
            return snapshot;
        }
        trace!(count = listeners.len(), "rebuilding listener snapshot");
        let snapshot: Snapshot = Arc::new(listeners.clone());
        self.snapshot.store(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn on_attribute_modified(&self, element: Element, name: &str, value: &str) {
        for listener in self.snapshot().iter() {
            listener.on_attribute_modified(element, name, value);
        }
    }

    pub fn on_attribute_removed(&self, element: Element, name: &str) {
        for listener in self.snapshot().iter() {
            listener.on_attribute_removed(element, name);
        }
    }

    pub fn on_inspect_requested(&self, element: Element) {
        for listener in self.snapshot().iter() {
            listener.on_inspect_requested(element);
        }
    }

    pub fn on_child_node_removed(&self, parent_id: NodeId, node_id: NodeId) {
        for listener in self.snapshot().iter() {
            listener.on_child_node_removed(parent_id, node_id);
        }
    }

    pub fn on_child_node_inserted(&self, event: &ChildInserted<'_>) {
        for listener in self.snapshot().iter() {
            listener.on_child_node_inserted(event);
        }
    }
}
