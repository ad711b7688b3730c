//! The seams between the engine and the UI toolkit whose tree it mirrors.
//!
//! A provider is created on the document thread and never leaves it, so none
//! of these traits require `Send`. Only the factory crosses threads.

use crate::document::ProviderListener;
use crate::{Element, NodeType};
use facet::Facet;

/// Creates a fresh provider each time a document activates.
pub trait ElementProviderFactory: Send + Sync + 'static {
    /// Build the provider. Runs on the document thread.
    fn create(&self) -> Box<dyn ElementProvider>;
}

impl<F> ElementProviderFactory for F
where
    F: Fn() -> Box<dyn ElementProvider> + Send + Sync + 'static,
{
    fn create(&self) -> Box<dyn ElementProvider> {
        self()
    }
}

/// Source of truth for the element tree.
pub trait ElementProvider {
    /// The current root, or `None` if the toolkit has nothing to show.
    fn root_element(&self) -> Option<Element>;

    /// How to inspect `element`. `None` means the element is unknown.
    fn node_descriptor(&self, element: Element) -> Option<&dyn NodeDescriptor>;

    /// Install or clear the listener the provider reports mutations to.
    ///
    /// The document installs one after its first snapshot and clears it
    /// before tearing down.
    fn set_mutation_listener(&mut self, listener: Option<ProviderListener>);

    /// Release toolkit resources. Called once, on deactivation.
    fn dispose(&mut self) {}

    /// Draw an overlay on `element` using an ARGB `color`.
    fn highlight_element(&mut self, element: Element, color: u32);

    /// Remove any overlay.
    fn hide_highlight(&mut self);

    /// Toggle "tap an element to inspect it" mode.
    fn set_inspect_mode_enabled(&mut self, enabled: bool);

    /// Replace `element`'s attributes from their textual form.
    fn set_attributes_as_text(&mut self, element: Element, text: &str);
}

/// Per-element inspection hooks.
///
/// All methods take `&self`: descriptors are looked up for the duration of one
/// call and may be shared between many elements.
pub trait NodeDescriptor {
    /// `element` just received a node id.
    fn hook(&self, _element: Element) {}

    /// `element` just lost its node id.
    fn unhook(&self, _element: Element) {}

    fn node_type(&self, _element: Element) -> NodeType {
        NodeType::Element
    }

    fn node_name(&self, element: Element) -> String;

    fn local_name(&self, element: Element) -> String {
        self.node_name(element)
    }

    fn node_value(&self, _element: Element) -> Option<String> {
        None
    }

    /// Append `element`'s children, in order, to `children`.
    fn children(&self, element: Element, children: &mut Vec<Element>);

    /// Append `element`'s attributes to `attributes`.
    fn attributes(&self, element: Element, attributes: &mut AttributeList);

    /// Report computed styles for `element`.
    fn styles(&self, _element: Element, _styles: &mut dyn StyleAccumulator) {}
}

/// Ordered `(name, value)` attribute pairs, reused between calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList {
    pairs: Vec<(String, String)>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one attribute.
    pub fn store(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Value of the first attribute called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        self.pairs.iter().map(|(_, v)| v.as_str())
    }

    /// Flatten into `[name0, value0, name1, value1, ...]`.
    pub fn to_flat(&self) -> Vec<String> {
        let mut flat = Vec::with_capacity(self.pairs.len() * 2);
        for (name, value) in &self.pairs {
            flat.push(name.clone());
            flat.push(value.clone());
        }
        flat
    }
}

/// Receives computed style properties.
pub trait StyleAccumulator {
    fn store(&mut self, name: &str, value: &str, is_default: bool);
}

/// One computed style property.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Style {
    pub name: String,
    pub value: String,
    /// The property still has its default value.
    pub is_default: bool,
}

impl StyleAccumulator for Vec<Style> {
    fn store(&mut self, name: &str, value: &str, is_default: bool) {
        self.push(Style {
            name: name.to_owned(),
            value: value.to_owned(),
            is_default,
        });
    }
}
