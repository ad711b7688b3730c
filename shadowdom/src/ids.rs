//! The element <-> node id mapping, shared between the document thread and
//! callers that only need a quick lookup.

use crate::provider::{ElementProvider, NodeDescriptor};
use crate::{Element, NodeId, debug};
use parking_lot::RwLock;
use phasmid::IdMap;
use std::sync::Arc;

/// Node ids for every element the observer knows about.
///
/// Only the document thread adds or removes entries; lookups are safe from
/// any thread. Descriptor hooks run after the lock is released.
#[derive(Clone, Default)]
pub struct ElementIds {
    map: Arc<RwLock<IdMap<Element>>>,
}

impl ElementIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_id(&self, element: Element) -> Option<NodeId> {
        self.map.read().id_for(element).map(NodeId)
    }

    pub fn element(&self, id: NodeId) -> Option<Element> {
        self.map.read().key_for(id.0)
    }

    pub fn contains(&self, element: Element) -> bool {
        self.map.read().contains(element)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Map `element`, hooking it through `descriptor` the first time.
    pub(crate) fn put(&self, element: Element, descriptor: &dyn NodeDescriptor) -> NodeId {
        let put = self.map.write().put(element);
        if put.is_inserted() {
            descriptor.hook(element);
        }
        NodeId(put.id())
    }

    /// Unmap `element`, unhooking it if a descriptor is still around.
    pub(crate) fn remove(
        &self,
        element: Element,
        descriptor: Option<&dyn NodeDescriptor>,
    ) -> Option<NodeId> {
        let id = self.map.write().remove(element)?;
        if let Some(descriptor) = descriptor {
            descriptor.unhook(element);
        }
        Some(NodeId(id))
    }

    /// Unmap everything and unhook each element the provider still describes.
    pub(crate) fn clear(&self, provider: &dyn ElementProvider) {
        let drained = self.map.write().drain();
        debug!(count = drained.len(), "unhooking all elements");
        for (element, _) in drained {
            if let Some(descriptor) = provider.node_descriptor(element) {
                descriptor.unhook(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AttributeList;
    use facet_testhelpers::test;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<String>>,
        ids: ElementIds,
    }

    impl NodeDescriptor for Recorder {
        fn hook(&self, element: Element) {
            // The lock must already be released here.
            assert!(self.ids.contains(element));
            self.log.borrow_mut().push(format!("hook {element}"));
        }

        fn unhook(&self, element: Element) {
            assert!(!self.ids.contains(element));
            self.log.borrow_mut().push(format!("unhook {element}"));
        }

        fn node_name(&self, _element: Element) -> String {
            "node".to_owned()
        }

        fn children(&self, _element: Element, _children: &mut Vec<Element>) {}

        fn attributes(&self, _element: Element, _attributes: &mut AttributeList) {}
    }

    #[test]
    fn test_put_hooks_once() {
        let recorder = Recorder::default();
        let ids = recorder.ids.clone();
        let a = Element::from_raw(7);

        let first = ids.put(a, &recorder);
        let second = ids.put(a, &recorder);
        assert_eq!(first, second);
        assert_eq!(first, NodeId(1));
        assert_eq!(ids.element(first), Some(a));
        assert_eq!(*recorder.log.borrow(), vec!["hook e7"]);
    }

    #[test]
    fn test_remove_unhooks_and_never_reuses() {
        let recorder = Recorder::default();
        let ids = recorder.ids.clone();
        let a = Element::from_raw(1);
        let b = Element::from_raw(2);

        let id_a = ids.put(a, &recorder);
        assert_eq!(ids.remove(a, Some(&recorder)), Some(id_a));
        assert_eq!(ids.remove(a, Some(&recorder)), None);
        let id_b = ids.put(b, &recorder);
        assert!(id_b > id_a);
        assert_eq!(ids.element(id_a), None);
        assert_eq!(
            *recorder.log.borrow(),
            vec!["hook e1", "unhook e1", "hook e2"]
        );
    }
}
