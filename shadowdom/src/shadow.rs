//! Immutable snapshots of the element tree and the staged updates between them.
//!
//! A [`ShadowDocument`] is what the remote observer believes the tree looks
//! like. Each update cycle records the provider's current structure into an
//! [`UpdateBuilder`], which only keeps entries that differ from the snapshot.
//! [`UpdateBuilder::build`] freezes that into an [`Update`] that knows which
//! elements fell out of the tree, and committing it produces the next
//! snapshot.

use crate::{Element, warn};
use indexmap::IndexMap;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;

/// Structural record of one element: who its parent is, and its children in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub element: Element,
    pub parent: Option<Element>,
    pub children: SmallVec<[Element; 8]>,
}

impl ElementInfo {
    fn detached(element: Element) -> Self {
        Self {
            element,
            parent: None,
            children: SmallVec::new(),
        }
    }
}

/// Read access to a tree's structure.
pub trait DocumentView {
    fn root_element(&self) -> Element;

    fn element_info(&self, element: Element) -> Option<&ElementInfo>;

    /// Children of `element`, empty if it isn't part of this view.
    fn children(&self, element: Element) -> &[Element] {
        self.element_info(element)
            .map(|info| info.children.as_slice())
            .unwrap_or(&[])
    }

    /// Append `element` and its descendants to `out`, in pre-order.
    fn collect_subtree(&self, element: Element, out: &mut Vec<Element>) {
        let mut stack = vec![element];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
    }
}

/// A committed snapshot of the tree as last reported to the observer.
///
/// Snapshots are shared behind an [`Arc`]; committing an update writes in
/// place when nobody else holds the previous snapshot.
#[derive(Debug, Clone)]
pub struct ShadowDocument {
    root: Element,
    elements: HashMap<Element, ElementInfo>,
}

impl ShadowDocument {
    /// An empty snapshot that only knows its root.
    pub fn new(root: Element) -> Self {
        Self {
            root,
            elements: HashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, element: Element) -> bool {
        self.elements.contains_key(&element)
    }

    /// All recorded elements, in no particular order.
    pub fn elements(&self) -> impl Iterator<Item = &ElementInfo> + '_ {
        self.elements.values()
    }

    /// Start staging changes on top of `this`.
    pub fn begin_update(this: &Arc<Self>) -> UpdateBuilder {
        UpdateBuilder::new(Arc::clone(this))
    }
}

impl DocumentView for ShadowDocument {
    fn root_element(&self) -> Element {
        self.root
    }

    fn element_info(&self, element: Element) -> Option<&ElementInfo> {
        self.elements.get(&element)
    }
}

/// Records the provider's current structure against a base snapshot.
///
/// Only differences are kept. Setting an element back to what the snapshot
/// already says drops its entry again.
pub struct UpdateBuilder {
    base: Arc<ShadowDocument>,
    changes: IndexMap<Element, ElementInfo>,
    walk_order: Vec<Element>,
}

impl UpdateBuilder {
    pub fn new(base: Arc<ShadowDocument>) -> Self {
        Self {
            base,
            changes: IndexMap::new(),
            walk_order: Vec::new(),
        }
    }

    pub fn base(&self) -> &ShadowDocument {
        &self.base
    }

    /// What the update currently says about `element`.
    fn current(&self, element: Element) -> Option<&ElementInfo> {
        self.changes
            .get(&element)
            .or_else(|| self.base.elements.get(&element))
    }

    /// Record that `element` has exactly `children`, in this order.
    ///
    /// Every child gets `element` as its parent. Children that used to belong
    /// to `element` and were not claimed by another element in the meantime
    /// lose their parent.
    pub fn set_element_children(&mut self, element: Element, children: &[Element]) {
        self.walk_order.push(element);

        let changed = self.changes.get(&element);
        let old = self.base.elements.get(&element);

        match (changed, old) {
            (Some(changed), _) if changed.children.as_slice() == children => return,
            (None, Some(old)) if old.children.as_slice() == children => return,
            _ => {}
        }

        // Children we are about to drop: from the pending entry and from the
        // snapshot, since either may still claim them.
        let mut dropped: SmallVec<[Element; 8]> = SmallVec::new();
        for info in [changed, old].into_iter().flatten() {
            for &child in &info.children {
                if !children.contains(&child) && !dropped.contains(&child) {
                    dropped.push(child);
                }
            }
        }

        let parent = changed.or(old).and_then(|info| info.parent);
        let reverts = old.is_some_and(|old| old.parent == parent && old.children.as_slice() == children);
        if reverts {
            self.changes.swap_remove(&element);
        } else {
            self.changes.insert(
                element,
                ElementInfo {
                    element,
                    parent,
                    children: SmallVec::from_slice(children),
                },
            );
        }

        for child in dropped {
            // Skip children that were already moved under somebody else.
            if self.current(child).and_then(|info| info.parent) == Some(element) {
                self.set_element_parent(child, None);
            }
        }
        for &child in children {
            self.set_element_parent(child, Some(element));
        }
    }

    fn set_element_parent(&mut self, element: Element, parent: Option<Element>) {
        let old = self.base.elements.get(&element);

        if let Some(changed) = self.changes.get_mut(&element) {
            if changed.parent == parent {
                return;
            }
            if old.is_some_and(|old| old.parent == parent && old.children == changed.children) {
                self.changes.swap_remove(&element);
                return;
            }
            changed.parent = parent;
            return;
        }

        match old {
            Some(old) if old.parent == parent => {}
            Some(old) => {
                let mut info = old.clone();
                info.parent = parent;
                self.changes.insert(element, info);
            }
            None => {
                let mut info = ElementInfo::detached(element);
                info.parent = parent;
                self.changes.insert(element, info);
            }
        }
    }

    /// Freeze the staged changes and work out which elements became unreachable.
    pub fn build(self) -> Update {
        let root = self.base.root;
        let mut garbage = Vec::new();
        let mut garbage_set = HashSet::default();
        let mut queue: VecDeque<Element> = self
            .changes
            .values()
            .filter(|info| info.parent.is_none() && info.element != root)
            .map(|info| info.element)
            .collect();

        while let Some(element) = queue.pop_front() {
            if !garbage_set.insert(element) {
                continue;
            }
            garbage.push(element);
            let Some(info) = self.current(element) else {
                continue;
            };
            for &child in &info.children {
                // Only descend into children that still point back here; the
                // rest were reattached elsewhere.
                if self.current(child).and_then(|c| c.parent) == Some(element) {
                    queue.push_back(child);
                }
            }
        }

        let mut changed = Vec::with_capacity(self.changes.len());
        let mut seen = HashSet::default();
        for &element in &self.walk_order {
            if self.changes.contains_key(&element) && seen.insert(element) {
                changed.push(element);
            }
        }
        // Entries the walk never visited directly, e.g. children that only
        // received a new parent.
        for &element in self.changes.keys() {
            if !garbage_set.contains(&element) && seen.insert(element) {
                changed.push(element);
            }
        }

        Update {
            base: Some(self.base),
            changes: self.changes,
            garbage,
            garbage_set,
            changed,
        }
    }
}

/// A staged set of changes, ready to be applied and then committed or abandoned.
///
/// Exactly one of [`Update::commit`] or [`Update::abandon`] must be called;
/// both consume the update.
pub struct Update {
    base: Option<Arc<ShadowDocument>>,
    changes: IndexMap<Element, ElementInfo>,
    garbage: Vec<Element>,
    garbage_set: HashSet<Element>,
    changed: Vec<Element>,
}

impl Update {
    fn base(&self) -> &ShadowDocument {
        match &self.base {
            Some(base) => base,
            None => unreachable!("update used after it was finished"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Elements that are no longer reachable from the root, breadth-first
    /// from each element that lost its parent.
    pub fn garbage_elements(&self) -> &[Element] {
        &self.garbage
    }

    pub fn is_garbage(&self, element: Element) -> bool {
        self.garbage_set.contains(&element)
    }

    /// Reachable elements whose record changed, in the order the walk visited them.
    pub fn changed_elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.changed
            .iter()
            .copied()
            .filter(|element| !self.garbage_set.contains(element))
    }

    pub fn is_element_changed(&self, element: Element) -> bool {
        self.changes.contains_key(&element)
    }

    /// Whether `element` lost its parent in this update, as opposed to being
    /// dragged along with an ancestor that did.
    pub fn is_detached_root(&self, element: Element) -> bool {
        element != self.base().root
            && self
                .changes
                .get(&element)
                .is_some_and(|info| info.parent.is_none())
    }

    /// `element`'s record before this update.
    pub fn old_element_info(&self, element: Element) -> Option<&ElementInfo> {
        self.base().elements.get(&element)
    }

    /// Apply the changes and drop the garbage, producing the next snapshot.
    pub fn commit(mut self) -> Arc<ShadowDocument> {
        let mut document = self.finish();
        let snapshot = Arc::make_mut(&mut document);
        for (element, info) in self.changes.drain(..) {
            snapshot.elements.insert(element, info);
        }
        for element in &self.garbage {
            snapshot.elements.remove(element);
        }
        document
    }

    /// Throw the changes away, returning the untouched base snapshot.
    pub fn abandon(mut self) -> Arc<ShadowDocument> {
        self.finish()
    }

    fn finish(&mut self) -> Arc<ShadowDocument> {
        match self.base.take() {
            Some(base) => base,
            None => unreachable!("update finished twice"),
        }
    }
}

impl DocumentView for Update {
    fn root_element(&self) -> Element {
        self.base().root
    }

    /// The merged view after this update. Garbage is not part of it.
    fn element_info(&self, element: Element) -> Option<&ElementInfo> {
        if self.garbage_set.contains(&element) {
            return None;
        }
        self.changes
            .get(&element)
            .or_else(|| self.base().elements.get(&element))
    }
}

impl Drop for Update {
    fn drop(&mut self) {
        if self.base.is_some() {
            warn!(
                changes = self.changes.len(),
                "update dropped without commit or abandon"
            );
        }
    }
}
