//! Mirror a live element tree into a remote DOM view.
//!
//! shadowdom keeps an observer (typically a DevTools frontend) in sync with a
//! tree it cannot see directly:
//! - **Identity**: every element the observer knows about gets a stable [`NodeId`]
//! - **Snapshots**: the tree as last reported lives in an immutable [`ShadowDocument`]
//! - **Updates**: each cycle re-walks the provider's tree and turns the
//!   difference into child removed / child inserted events
//! - **Threading**: all tree work runs on one document thread owned by the [`Document`]
//!
//! # Example
//!
//! ```rust
//! use shadowdom::Document;
//! use shadowdom::memory::MemoryTree;
//!
//! let tree = MemoryTree::new();
//! let root = tree.create_element("root");
//! let child = tree.create_element("child");
//! tree.append_child(root, child);
//! tree.set_root(root);
//!
//! let document = Document::new(tree.factory());
//! document.add_ref().unwrap();
//! assert!(document.node_id_for_element(child).is_some());
//!
//! let other = tree.create_element("other");
//! tree.append_child(root, other);
//! assert_eq!(document.update_tree(), Ok(true));
//! assert_eq!(document.update_tree(), Ok(false));
//!
//! document.release();
//! assert!(!tree.is_hooked(child));
//! ```

mod tracing_macros;
pub(crate) use tracing_macros::{debug, error, trace, warn};

mod context;
pub mod document;
#[cfg(any(test, feature = "tracing"))]
mod dump;
mod element;
mod error;
pub mod ids;
pub mod listeners;
pub mod memory;
pub mod provider;
pub mod scratch;
pub mod shadow;
pub mod thread;

pub use context::DocumentContext;
pub use document::{Document, DocumentConfig, ProviderListener};
pub use element::{Element, NodeId, NodeType};
pub use error::DocumentError;
pub use ids::ElementIds;
pub use listeners::{ChildInserted, UpdateListener, UpdateListeners};
pub use provider::{
    AttributeList, ElementProvider, ElementProviderFactory, NodeDescriptor, Style, StyleAccumulator,
};
pub use shadow::{DocumentView, ElementInfo, ShadowDocument, Update, UpdateBuilder};
