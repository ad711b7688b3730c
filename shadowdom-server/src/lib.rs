//! DevTools DOM domain on top of shadowdom.
//!
//! Turns the engine's change notifications into serializable `DomEvent`
//! messages and serves the node-id based commands a frontend sends back.
//! The core abstraction is `DomSession`, which holds a reference on a
//! `shadowdom::Document` while enabled and queues events for the caller to
//! deliver over any transport (WebSocket, stdio, etc.).

use facet::Facet;
use shadowdom::{DocumentError, NodeId, NodeType};

#[cfg(feature = "tracing")]
pub(crate) use tracing::debug;

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($tt:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use debug;

mod session;

pub use session::{DomSession, SearchHandle, SessionConfig};

/// Events produced by a DOM session.
///
/// These are serialized with postcard and sent to the frontend.
#[derive(Debug, Clone, PartialEq, Facet)]
#[repr(u8)]
pub enum DomEvent {
    /// A subtree was inserted. `previous_node_id` is `None` for a first child.
    ChildNodeInserted {
        parent_node_id: NodeId,
        previous_node_id: Option<NodeId>,
        node: Node,
    },
    /// A node and everything under it went away.
    ChildNodeRemoved {
        parent_node_id: NodeId,
        node_id: NodeId,
    },
    AttributeModified {
        node_id: NodeId,
        name: String,
        value: String,
    },
    AttributeRemoved { node_id: NodeId, name: String },
    /// The user picked a node in inspect mode.
    InspectNodeRequested { node_id: NodeId },
}

impl DomEvent {
    /// Serialize this event to postcard bytes.
    pub fn to_postcard(&self) -> Vec<u8> {
        facet_postcard::to_vec(self).expect("DomEvent serialization should not fail")
    }

    /// Deserialize a `DomEvent` from postcard bytes.
    pub fn from_postcard(
        bytes: &[u8],
    ) -> Result<Self, facet_postcard::DeserializeError> {
        facet_postcard::from_slice(bytes)
    }
}

/// A node as the frontend sees it, with its whole subtree.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Node {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub node_name: String,
    pub local_name: String,
    pub node_value: String,
    /// Flattened `[name0, value0, name1, value1, ...]`.
    pub attributes: Vec<String>,
    pub child_node_count: u32,
    #[facet(recursive_type)]
    pub children: Vec<Node>,
}

impl Node {
    /// Depth-first search for `node_id` in this subtree.
    pub fn find(&self, node_id: NodeId) -> Option<&Node> {
        if self.node_id == node_id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(node_id))
    }

    /// Value of attribute `name`, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .chunks_exact(2)
            .find(|pair| pair[0] == name)
            .map(|pair| pair[1].as_str())
    }
}

/// Errors returned by `DomSession` commands.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum DomError {
    /// no node with id {node_id}
    NodeNotFound { node_id: NodeId },

    /// no search results with id {search_id}
    SearchNotFound { search_id: String },

    /// range {from}..{to} is out of bounds for {len} results
    InvalidRange { from: usize, to: usize, len: usize },

    /// DOM domain is not enabled
    NotEnabled,

    /// document error: {error}
    Document { error: DocumentError },
}

impl From<DocumentError> for DomError {
    fn from(error: DocumentError) -> Self {
        DomError::Document { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    fn sample_node() -> Node {
        Node {
            node_id: NodeId(3),
            node_type: NodeType::Element,
            node_name: "DIV".to_owned(),
            local_name: "div".to_owned(),
            node_value: String::new(),
            attributes: vec!["id".to_owned(), "main".to_owned()],
            child_node_count: 1,
            children: vec![Node {
                node_id: NodeId(4),
                node_type: NodeType::Text,
                node_name: "#text".to_owned(),
                local_name: String::new(),
                node_value: "hello".to_owned(),
                attributes: Vec::new(),
                child_node_count: 0,
                children: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_node_lookup_helpers() {
        let node = sample_node();
        assert_eq!(node.attribute("id"), Some("main"));
        assert_eq!(node.attribute("class"), None);
        assert_eq!(node.find(NodeId(4)).map(|n| n.node_value.as_str()), Some("hello"));
        assert!(node.find(NodeId(99)).is_none());
    }

    #[test]
    fn test_event_postcard_roundtrip() {
        let event = DomEvent::ChildNodeInserted {
            parent_node_id: NodeId(1),
            previous_node_id: None,
            node: sample_node(),
        };
        let bytes = event.to_postcard();
        let decoded = DomEvent::from_postcard(&bytes).expect("should decode");
        assert_eq!(decoded, event);

        let removed = DomEvent::ChildNodeRemoved {
            parent_node_id: NodeId(1),
            node_id: NodeId(3),
        };
        let decoded = DomEvent::from_postcard(&removed.to_postcard()).expect("should decode");
        assert_eq!(decoded, removed);
    }

    #[test]
    fn test_event_serializes_to_json() {
        let event = DomEvent::AttributeModified {
            node_id: NodeId(7),
            name: "class".to_owned(),
            value: "big".to_owned(),
        };
        let json = facet_json::to_string(&event).expect("serialization should work");
        assert!(json.contains("AttributeModified"), "unexpected json: {json}");
        assert!(json.contains("\"big\""), "unexpected json: {json}");
    }

    #[test]
    fn test_document_errors_convert() {
        let error: DomError = DocumentError::Inactive.into();
        assert_eq!(
            error,
            DomError::Document {
                error: DocumentError::Inactive
            }
        );
    }
}
