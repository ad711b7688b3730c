use crate::Element;
use facet::Facet;

/// Errors raised by a [`Document`](crate::Document) and its document thread.
///
/// Apart from `Inactive`, these mean a collaborator broke a precondition;
/// none of them is retried.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum DocumentError {
    /// document is not active
    Inactive,

    /// cannot block on the document thread from the document thread itself
    Reentrant,

    /// document thread terminated
    ThreadTerminated,

    /// failed to spawn the document thread
    SpawnFailed,

    /// provider reported no root element
    NoRootElement,

    /// root element changed from {expected} to {actual}
    RootElementChanged { expected: Element, actual: Element },

    /// no node descriptor for {element}
    NoDescriptor { element: Element },

    /// garbage element {element} is not mapped
    GarbageNotMapped { element: Element },

    /// {element} has no node id
    Unmapped { element: Element },
}
