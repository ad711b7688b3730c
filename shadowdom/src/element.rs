//! Handles for the elements being mirrored and the ids the observer sees.

use facet::Facet;
use std::fmt;

/// An opaque handle to an element owned by the provider.
///
/// The engine only copies and compares these; what the payload means is up to
/// the provider that minted it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[facet(transparent)]
pub struct Element(u64);

impl Element {
    /// Wrap a provider-chosen payload.
    pub const fn from_raw(raw: u64) -> Self {
        Element(raw)
    }

    /// The provider-chosen payload.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Stable id of a mapped element, as reported to the remote observer.
///
/// Ids are positive and never reused while a document stays active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[facet(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DOM node types, numbered the way the DevTools protocol numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    CdataSection = 4,
    EntityReference = 5,
    Entity = 6,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
    Notation = 12,
}

impl NodeType {
    /// Protocol code for this node type.
    pub fn code(self) -> u8 {
        self as u8
    }
}
