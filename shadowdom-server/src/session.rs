use crate::{DomError, DomEvent, Node, debug};
use indexmap::IndexMap;
use parking_lot::Mutex;
use shadowdom::{
    AttributeList, ChildInserted, Document, DocumentContext, DocumentError, Element, ElementIds,
    NodeId, UpdateListener,
};
use std::sync::Arc;

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Search result sets kept around at once. The oldest is dropped first.
    pub max_search_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_search_sessions: 16,
        }
    }
}

/// Identifies a stored search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHandle {
    pub search_id: String,
    pub result_count: usize,
}

/// One frontend's view of a document.
///
/// While enabled the session holds a reference on the document and queues a
/// [`DomEvent`] for every change. Callers deliver them with
/// [`DomSession::drain_events`].
pub struct DomSession {
    document: Document,
    config: SessionConfig,
    outbox: Arc<Outbox>,
    subscription: Mutex<Option<Arc<dyn UpdateListener>>>,
    searches: Mutex<Searches>,
}

#[derive(Default)]
struct Searches {
    results: IndexMap<String, Vec<NodeId>>,
    last_id: u64,
}

struct Outbox {
    ids: ElementIds,
    events: Mutex<Vec<DomEvent>>,
}

impl Outbox {
    fn push(&self, event: DomEvent) {
        self.events.lock().push(event);
    }
}

impl UpdateListener for Outbox {
    fn on_attribute_modified(&self, element: Element, name: &str, value: &str) {
        let Some(node_id) = self.ids.node_id(element) else {
            debug!(%element, "attribute change on unmapped element");
            return;
        };
        self.push(DomEvent::AttributeModified {
            node_id,
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    fn on_attribute_removed(&self, element: Element, name: &str) {
        let Some(node_id) = self.ids.node_id(element) else {
            debug!(%element, "attribute removal on unmapped element");
            return;
        };
        self.push(DomEvent::AttributeRemoved {
            node_id,
            name: name.to_owned(),
        });
    }

    fn on_inspect_requested(&self, element: Element) {
        match self.ids.node_id(element) {
            Some(node_id) => self.push(DomEvent::InspectNodeRequested { node_id }),
            None => {
                debug!(%element, "inspect requested for unmapped element");
            }
        }
    }

    fn on_child_node_removed(&self, parent_id: NodeId, node_id: NodeId) {
        self.push(DomEvent::ChildNodeRemoved {
            parent_node_id: parent_id,
            node_id,
        });
    }

    fn on_child_node_inserted(&self, event: &ChildInserted<'_>) {
        let mut attributes = AttributeList::new();
        let Some(node) = describe(event.context, event.element, &mut attributes) else {
            debug!(element = %event.element, "inserted element could not be described");
            return;
        };
        self.push(DomEvent::ChildNodeInserted {
            parent_node_id: event.parent_id,
            previous_node_id: event.previous_id,
            node,
        });
    }
}

/// Build the frontend view of `element` and its subtree.
fn describe(
    context: &DocumentContext<'_>,
    element: Element,
    attributes: &mut AttributeList,
) -> Option<Node> {
    let node_id = context.node_id(element)?;
    let descriptor = context.node_descriptor(element)?;

    attributes.clear();
    descriptor.attributes(element, attributes);
    let flat = attributes.to_flat();

    let children: Vec<Node> = context
        .children(element)
        .iter()
        .filter_map(|&child| describe(context, child, attributes))
        .collect();

    Some(Node {
        node_id,
        node_type: descriptor.node_type(element),
        node_name: descriptor.node_name(element),
        local_name: descriptor.local_name(element),
        node_value: descriptor.node_value(element).unwrap_or_default(),
        attributes: flat,
        child_node_count: u32::try_from(children.len()).unwrap_or(u32::MAX),
        children,
    })
}

impl DomSession {
    pub fn new(document: Document) -> Self {
        Self::with_config(document, SessionConfig::default())
    }

    pub fn with_config(document: Document, config: SessionConfig) -> Self {
        let outbox = Arc::new(Outbox {
            ids: document.element_ids(),
            events: Mutex::new(Vec::new()),
        });
        Self {
            document,
            config,
            outbox,
            subscription: Mutex::new(None),
            searches: Mutex::new(Searches::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Take a reference on the document and start queueing events.
    /// Enabling twice is a no-op.
    pub fn enable(&self) -> Result<(), DomError> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }
        self.document.add_ref()?;
        let listener: Arc<dyn UpdateListener> = self.outbox.clone();
        self.document.add_update_listener(Arc::clone(&listener));
        *subscription = Some(listener);
        debug!("DOM session enabled");
        Ok(())
    }

    /// Stop queueing events and drop the document reference. Stored searches
    /// and undelivered events are discarded. Returns whether the session was
    /// enabled.
    pub fn disable(&self) -> bool {
        let Some(listener) = self.subscription.lock().take() else {
            return false;
        };
        self.document.remove_update_listener(&listener);
        self.document.release();
        self.searches.lock().results.clear();
        self.outbox.events.lock().clear();
        debug!("DOM session disabled");
        true
    }

    fn ensure_enabled(&self) -> Result<(), DomError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(DomError::NotEnabled)
        }
    }

    /// Everything queued since the last call, oldest first.
    pub fn drain_events(&self) -> Vec<DomEvent> {
        std::mem::take(&mut *self.outbox.events.lock())
    }

    /// The whole document, rooted at the provider's root element.
    pub fn get_document(&self) -> Result<Node, DomError> {
        self.ensure_enabled()?;
        let root = self.document.root_element()?;
        let node = self.document.with_context(move |context| {
            let mut attributes = AttributeList::new();
            describe(context, root, &mut attributes)
        })?;
        node.ok_or(DomError::Document {
            error: DocumentError::Unmapped { element: root },
        })
    }

    pub fn resolve_node(&self, node_id: NodeId) -> Result<Element, DomError> {
        self.document
            .element_for_node_id(node_id)
            .ok_or(DomError::NodeNotFound { node_id })
    }

    /// Run a search and keep its results for [`Self::search_results`].
    pub fn perform_search(&self, query: &str) -> Result<SearchHandle, DomError> {
        self.ensure_enabled()?;
        let found = self.document.find_matching_elements(query)?;

        let mut searches = self.searches.lock();
        searches.last_id += 1;
        let search_id = searches.last_id.to_string();
        let result_count = found.len();
        searches.results.insert(search_id.clone(), found);
        while searches.results.len() > self.config.max_search_sessions.max(1) {
            searches.results.shift_remove_index(0);
        }
        debug!(%search_id, result_count, "search stored");

        Ok(SearchHandle {
            search_id,
            result_count,
        })
    }

    /// Results `from..to` of a stored search.
    pub fn search_results(
        &self,
        search_id: &str,
        from: usize,
        to: usize,
    ) -> Result<Vec<NodeId>, DomError> {
        let searches = self.searches.lock();
        let results = searches
            .results
            .get(search_id)
            .ok_or_else(|| DomError::SearchNotFound {
                search_id: search_id.to_owned(),
            })?;
        if from > to || to > results.len() {
            return Err(DomError::InvalidRange {
                from,
                to,
                len: results.len(),
            });
        }
        Ok(results[from..to].to_vec())
    }

    pub fn discard_search_results(&self, search_id: &str) -> Result<(), DomError> {
        match self.searches.lock().results.shift_remove(search_id) {
            Some(_) => Ok(()),
            None => Err(DomError::SearchNotFound {
                search_id: search_id.to_owned(),
            }),
        }
    }

    pub fn highlight_node(&self, node_id: NodeId, color: u32) -> Result<(), DomError> {
        self.ensure_enabled()?;
        let element = self.resolve_node(node_id)?;
        self.document.highlight_element(element, color)?;
        Ok(())
    }

    pub fn hide_highlight(&self) -> Result<(), DomError> {
        self.ensure_enabled()?;
        self.document.hide_highlight()?;
        Ok(())
    }

    pub fn set_inspect_mode_enabled(&self, enabled: bool) -> Result<(), DomError> {
        self.ensure_enabled()?;
        self.document.set_inspect_mode_enabled(enabled)?;
        Ok(())
    }

    pub fn set_attributes_as_text(&self, node_id: NodeId, text: &str) -> Result<(), DomError> {
        self.ensure_enabled()?;
        let element = self.resolve_node(node_id)?;
        self.document.set_attributes_as_text(element, text)?;
        Ok(())
    }
}

impl Drop for DomSession {
    fn drop(&mut self) {
        self.disable();
    }
}
