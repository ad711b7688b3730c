//! The reference-counted controller that keeps the mirror in sync.
//!
//! While at least one reference is held, a document owns a dedicated thread
//! with the provider and the committed snapshot on it. Every tree operation
//! runs there; callers on other threads block until it is done.
//!
//! Listeners already run on that thread, in the middle of an update. The
//! blocking operations return [`DocumentError::Reentrant`] there; a listener
//! reads the tree through the [`DocumentContext`] it was given instead.

use crate::context::DocumentContext;
use crate::ids::ElementIds;
use crate::listeners::{ChildInserted, UpdateListener, UpdateListeners};
use crate::provider::{AttributeList, ElementProvider, ElementProviderFactory, NodeDescriptor, Style};
use crate::scratch::{Recycle, ScratchPool};
use crate::shadow::{DocumentView, ShadowDocument, Update, UpdateBuilder};
use crate::thread::{DocumentThread, ThreadHandle};
use crate::{DocumentError, Element, NodeId, debug, error, trace, warn};
use parking_lot::Mutex;
use phasmid::{ChildSink, reconcile_children};
use rapidhash::RapidHashSet as HashSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// How the document thread is started.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub thread_name: String,
    /// Stack size for the document thread; the platform default if `None`.
    pub stack_size: Option<usize>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            thread_name: "shadowdom-document".to_owned(),
            stack_size: None,
        }
    }
}

/// A mirrored document. Cloning yields another handle to the same document.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    factory: Arc<dyn ElementProviderFactory>,
    config: DocumentConfig,
    ids: ElementIds,
    listeners: Arc<UpdateListeners>,
    /// Count and running thread. Never held while waiting on the thread.
    lifecycle: Mutex<Lifecycle>,
    /// Serializes activation and deactivation.
    transition: Mutex<()>,
}

#[derive(Default)]
struct Lifecycle {
    ref_count: usize,
    thread: Option<DocumentThread<DocumentState>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.inner.lifecycle.lock();
        f.debug_struct("Document")
            .field("ref_count", &lifecycle.ref_count)
            .field("active", &lifecycle.thread.is_some())
            .field("mapped", &self.inner.ids.len())
            .finish()
    }
}

impl Document {
    pub fn new(factory: impl ElementProviderFactory) -> Self {
        Self::with_config(factory, DocumentConfig::default())
    }

    pub fn with_config(factory: impl ElementProviderFactory, config: DocumentConfig) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                factory: Arc::new(factory),
                config,
                ids: ElementIds::new(),
                listeners: Arc::new(UpdateListeners::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
                transition: Mutex::new(()),
            }),
        }
    }

    /// Take a reference. The first one activates the document: the thread
    /// starts, a provider is created and the first snapshot is recorded
    /// without emitting any events.
    ///
    /// If activation fails the count is left unchanged.
    pub fn add_ref(&self) -> Result<(), DocumentError> {
        if self.try_adjust_ref_count(|count| count > 0, 1) {
            return Ok(());
        }

        let _transition = self.inner.transition.lock();
        if self.try_adjust_ref_count(|count| count > 0, 1) {
            return Ok(());
        }
        let thread = self.activate()?;
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.thread = Some(thread);
        lifecycle.ref_count = 1;
        Ok(())
    }

    /// Drop a reference. The last one tears the document down: the provider
    /// is disposed, every element is unhooked and all update listeners are
    /// forgotten. Extra releases are ignored.
    pub fn release(&self) {
        if self.try_adjust_ref_count(|count| count > 1, -1) {
            return;
        }

        let _transition = self.inner.transition.lock();
        let thread = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match lifecycle.ref_count {
                0 => {
                    warn!("release() without a matching add_ref()");
                    return;
                }
                1 => {}
                _ => {
                    lifecycle.ref_count -= 1;
                    return;
                }
            }
            lifecycle.ref_count = 0;
            lifecycle.thread.take()
        };

        // The lock is free again, so a listener still running on the document
        // thread sees an inactive document instead of waiting on us.
        debug!("deactivating document");
        if let Some(thread) = thread {
            // Dropping the state on its own thread runs the teardown.
            thread.shutdown(drop);
        }
        self.inner.listeners.clear();
    }

    /// Apply `delta` to the count if `allowed` says the count may change
    /// without a transition.
    fn try_adjust_ref_count(&self, allowed: impl FnOnce(usize) -> bool, delta: isize) -> bool {
        let mut lifecycle = self.inner.lifecycle.lock();
        if !allowed(lifecycle.ref_count) {
            return false;
        }
        lifecycle.ref_count = lifecycle.ref_count.saturating_add_signed(delta);
        true
    }

    pub fn is_active(&self) -> bool {
        self.inner.lifecycle.lock().thread.is_some()
    }

    pub fn ref_count(&self) -> usize {
        self.inner.lifecycle.lock().ref_count
    }

    fn activate(&self) -> Result<DocumentThread<DocumentState>, DocumentError> {
        debug!(thread = %self.inner.config.thread_name, "activating document");
        let factory = Arc::clone(&self.inner.factory);
        let ids = self.inner.ids.clone();
        let listeners = Arc::clone(&self.inner.listeners);
        DocumentThread::spawn(
            &self.inner.config.thread_name,
            self.inner.config.stack_size,
            move |handle| DocumentState::activate(handle, factory.as_ref(), ids, listeners),
        )
    }

    fn run<R>(
        &self,
        task: impl FnOnce(&mut DocumentState) -> Result<R, DocumentError> + Send + 'static,
    ) -> Result<R, DocumentError>
    where
        R: Send + 'static,
    {
        let handle = {
            let lifecycle = self.inner.lifecycle.lock();
            match &lifecycle.thread {
                Some(thread) => thread.handle().clone(),
                None => return Err(DocumentError::Inactive),
            }
        };
        handle.post_and_wait(task)?
    }

    pub fn add_update_listener(&self, listener: Arc<dyn UpdateListener>) {
        self.inner.listeners.add(listener);
    }

    /// Unregister `listener`, compared by identity.
    pub fn remove_update_listener(&self, listener: &Arc<dyn UpdateListener>) -> bool {
        self.inner.listeners.remove(listener)
    }

    /// Node id of `element`. Does not go through the document thread, so the
    /// answer may be one update cycle stale.
    pub fn node_id_for_element(&self, element: Element) -> Option<NodeId> {
        self.inner.ids.node_id(element)
    }

    /// Element behind `id`. Same staleness caveat as [`Self::node_id_for_element`].
    pub fn element_for_node_id(&self, id: NodeId) -> Option<Element> {
        self.inner.ids.element(id)
    }

    /// A handle to the shared id map, for listeners that need lookups
    /// without holding on to the document.
    pub fn element_ids(&self) -> ElementIds {
        self.inner.ids.clone()
    }

    /// Run `f` against the committed snapshot on the document thread.
    pub fn with_context<R>(
        &self,
        f: impl FnOnce(&DocumentContext<'_>) -> R + Send + 'static,
    ) -> Result<R, DocumentError>
    where
        R: Send + 'static,
    {
        self.run(move |state| {
            let context = DocumentContext::new(&*state.shadow, &*state.provider, &state.ids);
            Ok(f(&context))
        })
    }

    /// Run `f` with `element`'s descriptor on the document thread.
    pub fn with_node_descriptor<R>(
        &self,
        element: Element,
        f: impl FnOnce(Option<&dyn NodeDescriptor>) -> R + Send + 'static,
    ) -> Result<R, DocumentError>
    where
        R: Send + 'static,
    {
        self.run(move |state| Ok(f(state.provider.node_descriptor(element))))
    }

    /// The committed snapshot.
    pub fn document_view(&self) -> Result<Arc<ShadowDocument>, DocumentError> {
        self.run(|state| Ok(Arc::clone(&state.shadow)))
    }

    /// The provider's root, which must still be the one the document was
    /// activated with.
    pub fn root_element(&self) -> Result<Element, DocumentError> {
        self.run(|state| state.checked_root())
    }

    pub fn highlight_element(&self, element: Element, color: u32) -> Result<(), DocumentError> {
        self.run(move |state| {
            state.provider.highlight_element(element, color);
            Ok(())
        })
    }

    pub fn hide_highlight(&self) -> Result<(), DocumentError> {
        self.run(|state| {
            state.provider.hide_highlight();
            Ok(())
        })
    }

    pub fn set_inspect_mode_enabled(&self, enabled: bool) -> Result<(), DocumentError> {
        self.run(move |state| {
            state.provider.set_inspect_mode_enabled(enabled);
            Ok(())
        })
    }

    pub fn set_attributes_as_text(&self, element: Element, text: &str) -> Result<(), DocumentError> {
        let text = text.to_owned();
        self.run(move |state| {
            state.provider.set_attributes_as_text(element, &text);
            Ok(())
        })
    }

    /// Computed styles of `element`.
    pub fn element_styles(&self, element: Element) -> Result<Vec<Style>, DocumentError> {
        self.run(move |state| {
            let descriptor = state
                .provider
                .node_descriptor(element)
                .ok_or(DocumentError::NoDescriptor { element })?;
            let mut styles = Vec::new();
            descriptor.styles(element, &mut styles);
            Ok(styles)
        })
    }

    /// Node ids of every non-root element whose name or any attribute value
    /// contains `query`, ignoring case. Results are in document order.
    pub fn find_matching_elements(&self, query: &str) -> Result<Vec<NodeId>, DocumentError> {
        let needle = query.to_lowercase();
        self.run(move |state| Ok(state.find_matching_elements(&needle)))
    }

    /// Re-walk the provider's tree now and emit whatever changed. Returns
    /// whether anything did.
    pub fn update_tree(&self) -> Result<bool, DocumentError> {
        self.run(|state| state.update_tree())
    }
}

/// Handed to the provider so it can report mutations.
///
/// Structural changes are only signalled; the update cycle itself is queued
/// on the document thread, so calling [`Self::possibly_changed`] from inside a
/// provider callback is fine. Attribute and inspect events reported from
/// another thread are queued the same way, so listeners see them in order
/// with the structural events.
#[derive(Clone)]
pub struct ProviderListener {
    thread: ThreadHandle<DocumentState>,
    listeners: Arc<UpdateListeners>,
}

impl ProviderListener {
    /// The tree may have changed; schedule an update cycle.
    pub fn possibly_changed(&self) {
        let posted = self.thread.post(|state| {
            if let Err(_err) = state.update_tree() {
                error!(error = %_err, "tree update failed");
            }
        });
        if !posted {
            debug!("document thread is gone, dropping change signal");
        }
    }

    pub fn attribute_modified(&self, element: Element, name: &str, value: &str) {
        if self.thread.is_current() {
            self.listeners.on_attribute_modified(element, name, value);
            return;
        }
        let (name, value) = (name.to_owned(), value.to_owned());
        self.deliver(move |listeners| listeners.on_attribute_modified(element, &name, &value));
    }

    pub fn attribute_removed(&self, element: Element, name: &str) {
        if self.thread.is_current() {
            self.listeners.on_attribute_removed(element, name);
            return;
        }
        let name = name.to_owned();
        self.deliver(move |listeners| listeners.on_attribute_removed(element, &name));
    }

    pub fn inspect_requested(&self, element: Element) {
        if self.thread.is_current() {
            self.listeners.on_inspect_requested(element);
            return;
        }
        self.deliver(move |listeners| listeners.on_inspect_requested(element));
    }

    fn deliver(&self, notify: impl FnOnce(&UpdateListeners) + Send + 'static) {
        if !self.thread.post(move |state| notify(&state.listeners)) {
            debug!("document thread is gone, dropping provider event");
        }
    }
}

/// Buffers used while turning one update into events.
#[derive(Default)]
struct ApplyScratch {
    /// Elements whose node the observer has been told to drop this cycle.
    removed: HashSet<Element>,
    /// Changed elements already sent in full as part of an inserted subtree.
    transmitted: HashSet<Element>,
    dom_children: Vec<Element>,
    subtree: Vec<Element>,
}

impl Recycle for ApplyScratch {
    fn recycle(&mut self) {
        self.removed.clear();
        self.transmitted.clear();
        self.dom_children.clear();
        self.subtree.clear();
    }
}

/// Everything that lives on the document thread.
struct DocumentState {
    provider: Box<dyn ElementProvider>,
    shadow: Arc<ShadowDocument>,
    ids: ElementIds,
    listeners: Arc<UpdateListeners>,
    queue_pool: ScratchPool<VecDeque<Element>>,
    children_pool: ScratchPool<Vec<Element>>,
    seen_pool: ScratchPool<HashSet<Element>>,
    attribute_pool: ScratchPool<AttributeList>,
    apply_pool: ScratchPool<ApplyScratch>,
}

impl DocumentState {
    fn activate(
        handle: &ThreadHandle<Self>,
        factory: &dyn ElementProviderFactory,
        ids: ElementIds,
        listeners: Arc<UpdateListeners>,
    ) -> Result<Self, DocumentError> {
        let mut provider = factory.create();
        let Some(root) = provider.root_element() else {
            provider.dispose();
            return Err(DocumentError::NoRootElement);
        };

        let mut state = DocumentState {
            provider,
            shadow: Arc::new(ShadowDocument::new(root)),
            ids,
            listeners,
            queue_pool: ScratchPool::new(),
            children_pool: ScratchPool::new(),
            seen_pool: ScratchPool::new(),
            attribute_pool: ScratchPool::new(),
            apply_pool: ScratchPool::new(),
        };

        // The first snapshot is committed silently; observers ask for the
        // whole document when they attach.
        let update = state.build_update()?;
        state.commit(update);

        let listener = ProviderListener {
            thread: handle.clone(),
            listeners: Arc::clone(&state.listeners),
        };
        state.provider.set_mutation_listener(Some(listener));
        debug!(%root, elements = state.shadow.len(), "document activated");
        Ok(state)
    }

    fn checked_root(&self) -> Result<Element, DocumentError> {
        let actual = self
            .provider
            .root_element()
            .ok_or(DocumentError::NoRootElement)?;
        let expected = self.shadow.root_element();
        if actual != expected {
            return Err(DocumentError::RootElementChanged { expected, actual });
        }
        Ok(actual)
    }

    fn build_update(&mut self) -> Result<Update, DocumentError> {
        let root = self.checked_root()?;
        let mut builder = ShadowDocument::begin_update(&self.shadow);

        let mut queue = self.queue_pool.acquire();
        let mut children = self.children_pool.acquire();
        let mut seen = self.seen_pool.acquire();
        let walked = walk(
            &*self.provider,
            &self.ids,
            root,
            &mut builder,
            &mut queue,
            &mut children,
            &mut seen,
        );
        if walked.is_err() {
            // Whatever this walk mapped is in no snapshot; forget it again.
            for &element in seen.iter() {
                if !self.shadow.contains(element) {
                    self.ids.remove(element, self.provider.node_descriptor(element));
                }
            }
        }
        self.queue_pool.release(queue);
        self.children_pool.release(children);
        self.seen_pool.release(seen);

        walked?;
        Ok(builder.build())
    }

    fn update_tree(&mut self) -> Result<bool, DocumentError> {
        let _started = Instant::now();
        let update = self.build_update()?;
        let changed = !update.is_empty();

        if changed {
            let mut scratch = self.apply_pool.acquire();
            let applied = emit_changes(&self.ids, &self.listeners, &*self.provider, &update, &mut scratch);
            self.apply_pool.release(scratch);
            match applied {
                Ok(()) => self.commit(update),
                Err(err) => {
                    update.abandon();
                    return Err(err);
                }
            }
        } else {
            update.abandon();
        }

        debug!(
            elapsed_ms = _started.elapsed().as_secs_f64() * 1000.0,
            changed,
            "tree update completed"
        );
        Ok(changed)
    }

    fn commit(&mut self, update: Update) {
        // Let go of the old snapshot first so the commit can write in place.
        self.shadow = Arc::new(ShadowDocument::new(self.shadow.root_element()));
        self.shadow = update.commit();
        trace!(
            "committed snapshot:\n{}",
            crate::dump::ShadowDump {
                view: &*self.shadow,
                ids: &self.ids,
            }
        );
    }

    fn find_matching_elements(&mut self, needle: &str) -> Vec<NodeId> {
        let mut matches = Vec::new();
        let mut attributes = self.attribute_pool.acquire();

        let root = self.shadow.root_element();
        let mut stack: Vec<Element> = self.shadow.children(root).iter().rev().copied().collect();
        while let Some(element) = stack.pop() {
            if self.element_matches(element, needle, &mut attributes) {
                if let Some(id) = self.ids.node_id(element) {
                    matches.push(id);
                }
            }
            stack.extend(self.shadow.children(element).iter().rev().copied());
        }

        self.attribute_pool.release(attributes);
        trace!(needle, found = matches.len(), "search finished");
        matches
    }

    fn element_matches(
        &self,
        element: Element,
        needle: &str,
        attributes: &mut AttributeList,
    ) -> bool {
        let Some(descriptor) = self.provider.node_descriptor(element) else {
            return false;
        };
        attributes.clear();
        descriptor.attributes(element, attributes);
        if attributes.values().any(|value| value.to_lowercase().contains(needle)) {
            return true;
        }
        descriptor.node_name(element).to_lowercase().contains(needle)
    }
}

impl Drop for DocumentState {
    fn drop(&mut self) {
        self.provider.set_mutation_listener(None);
        self.ids.clear(&*self.provider);
        self.provider.dispose();
        debug!("document state torn down");
    }
}

/// Breadth-first walk of the provider's tree, mapping every element and
/// recording its children.
fn walk(
    provider: &dyn ElementProvider,
    ids: &ElementIds,
    root: Element,
    builder: &mut UpdateBuilder,
    queue: &mut VecDeque<Element>,
    children: &mut Vec<Element>,
    seen: &mut HashSet<Element>,
) -> Result<(), DocumentError> {
    queue.push_back(root);
    seen.insert(root);

    while let Some(element) = queue.pop_front() {
        let descriptor = provider
            .node_descriptor(element)
            .ok_or(DocumentError::NoDescriptor { element })?;
        ids.put(element, descriptor);

        children.clear();
        descriptor.children(element, children);
        children.retain(|&child| {
            let first = seen.insert(child);
            if !first {
                warn!(%child, parent = %element, "element reported more than once, ignoring repeat");
            }
            first
        });

        builder.set_element_children(element, children);
        queue.extend(children.iter().copied());
    }
    children.clear();
    Ok(())
}

/// Turn `update` into observer events: removals for disconnected subtrees
/// first, then the child-list edits of each changed element.
fn emit_changes(
    ids: &ElementIds,
    listeners: &UpdateListeners,
    provider: &dyn ElementProvider,
    update: &Update,
    scratch: &mut ApplyScratch,
) -> Result<(), DocumentError> {
    for &element in update.garbage_elements() {
        let node_id = ids
            .node_id(element)
            .ok_or(DocumentError::GarbageNotMapped { element })?;

        // Only the top of a disconnected subtree is announced; the rest goes
        // with it.
        if update.is_detached_root(element) {
            let parent = update.old_element_info(element).and_then(|info| info.parent);
            match parent.and_then(|parent| ids.node_id(parent)) {
                Some(parent_id) => listeners.on_child_node_removed(parent_id, node_id),
                None => {
                    warn!(%element, "disconnected element had no mapped parent");
                }
            }
            scratch.removed.insert(element);
        }

        ids.remove(element, provider.node_descriptor(element));
    }

    let context = DocumentContext::new(update, provider, ids);
    for element in update.changed_elements() {
        if scratch.transmitted.contains(&element) {
            continue;
        }
        let (Some(parent_id), Some(info)) = (ids.node_id(element), update.element_info(element)) else {
            continue;
        };

        // What the observer currently shows under `element`.
        scratch.dom_children.clear();
        if let Some(old) = update.old_element_info(element) {
            scratch.dom_children.extend(
                old.children
                    .iter()
                    .copied()
                    .filter(|child| ids.contains(*child) && !scratch.removed.contains(child)),
            );
        }

        let mut sink = EventSink {
            parent: element,
            parent_id,
            update,
            context: &context,
            ids,
            listeners,
            removed: &mut scratch.removed,
            transmitted: &mut scratch.transmitted,
            subtree: &mut scratch.subtree,
        };
        reconcile_children(&mut scratch.dom_children, &info.children, &mut sink)?;
    }
    Ok(())
}

/// Forwards the edits of one child list to the listeners.
struct EventSink<'a, 'b> {
    parent: Element,
    parent_id: NodeId,
    update: &'a Update,
    context: &'a DocumentContext<'a>,
    ids: &'a ElementIds,
    listeners: &'a UpdateListeners,
    removed: &'b mut HashSet<Element>,
    transmitted: &'b mut HashSet<Element>,
    subtree: &'b mut Vec<Element>,
}

impl EventSink<'_, '_> {
    fn node_id(&self, element: Element) -> Result<NodeId, DocumentError> {
        self.ids
            .node_id(element)
            .ok_or(DocumentError::Unmapped { element })
    }

    /// Whether the observer still shows `element` where the old snapshot had it.
    fn still_shown(&self, element: Element) -> bool {
        let mut current = Some(element);
        while let Some(element) = current {
            if self.removed.contains(&element) {
                return false;
            }
            current = self.update.old_element_info(element).and_then(|info| info.parent);
        }
        true
    }

    /// Elements of the subtree about to be sent that the observer still shows
    /// under a different parent must leave that spot first, or it would end
    /// up with two nodes sharing an id.
    fn detach_moved(&mut self, inserted: Element) -> Result<(), DocumentError> {
        for i in 0..self.subtree.len() {
            let moved = self.subtree[i];
            let Some(old_parent) = self.update.old_element_info(moved).and_then(|info| info.parent) else {
                continue;
            };
            if moved == inserted && old_parent == self.parent {
                continue;
            }
            if !self.still_shown(moved) {
                continue;
            }
            let old_parent_id = self.node_id(old_parent)?;
            let node_id = self.node_id(moved)?;
            trace!(%moved, %old_parent, "detaching moved element before insert");
            self.listeners.on_child_node_removed(old_parent_id, node_id);
            self.removed.insert(moved);
        }
        Ok(())
    }
}

impl ChildSink<Element> for EventSink<'_, '_> {
    type Error = DocumentError;

    fn insert(&mut self, _index: usize, element: Element, previous: Option<Element>) -> Result<(), DocumentError> {
        self.subtree.clear();
        self.update.collect_subtree(element, self.subtree);
        self.detach_moved(element)?;

        for &sent in self.subtree.iter() {
            if self.update.is_element_changed(sent) {
                self.transmitted.insert(sent);
            }
        }

        let previous_id = previous.map(|previous| self.node_id(previous)).transpose()?;
        let event = ChildInserted {
            parent_id: self.parent_id,
            element,
            previous_id,
            subtree: self.subtree.as_slice(),
            context: self.context,
        };
        self.listeners.on_child_node_inserted(&event);
        Ok(())
    }

    fn remove(&mut self, _index: usize, element: Element) -> Result<(), DocumentError> {
        if self.removed.contains(&element) {
            trace!(%element, "already detached, no second remove");
            return Ok(());
        }
        let node_id = self.node_id(element)?;
        self.listeners.on_child_node_removed(self.parent_id, node_id);
        self.removed.insert(element);
        Ok(())
    }
}
