//! Read access to a document from code already running on its thread.
//!
//! Listeners get a [`DocumentContext`] with every inserted subtree, and
//! [`Document::with_context`](crate::Document::with_context) hands one to a
//! closure. It is the way to reach descriptors and ids from the document
//! thread, where the blocking `Document` methods refuse to run.

use crate::ids::ElementIds;
use crate::provider::{ElementProvider, NodeDescriptor};
use crate::shadow::{DocumentView, ElementInfo};
use crate::{Element, NodeId};

/// Everything needed to describe the tree the observer is about to see.
///
/// Only lives on the document thread, for the duration of one call.
pub struct DocumentContext<'a> {
    view: &'a dyn DocumentView,
    provider: &'a dyn ElementProvider,
    ids: &'a ElementIds,
}

impl<'a> DocumentContext<'a> {
    pub(crate) fn new(
        view: &'a dyn DocumentView,
        provider: &'a dyn ElementProvider,
        ids: &'a ElementIds,
    ) -> Self {
        Self {
            view,
            provider,
            ids,
        }
    }

    pub fn root_element(&self) -> Element {
        self.view.root_element()
    }

    pub fn element_info(&self, element: Element) -> Option<&'a ElementInfo> {
        self.view.element_info(element)
    }

    pub fn children(&self, element: Element) -> &'a [Element] {
        self.view.children(element)
    }

    pub fn node_descriptor(&self, element: Element) -> Option<&'a dyn NodeDescriptor> {
        self.provider.node_descriptor(element)
    }

    pub fn node_id(&self, element: Element) -> Option<NodeId> {
        self.ids.node_id(element)
    }

    pub fn element_for_node_id(&self, id: NodeId) -> Option<Element> {
        self.ids.element(id)
    }

    /// The structure being described, which may include uncommitted changes.
    pub fn view(&self) -> &'a dyn DocumentView {
        self.view
    }
}
