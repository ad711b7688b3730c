//! An in-memory element tree that can be mirrored without a UI toolkit.
//!
//! Structural mutators only change the tree; call [`MemoryTree::notify_changed`]
//! to signal the document, or drive [`Document::update_tree`](crate::Document::update_tree)
//! directly. Attribute mutators queue their events on the document thread right
//! away.

use crate::document::ProviderListener;
use crate::provider::{
    AttributeList, ElementProvider, ElementProviderFactory, NodeDescriptor, StyleAccumulator,
};
use crate::{Element, NodeType, debug};
use parking_lot::Mutex;
use rapidhash::RapidHashMap as HashMap;
use std::sync::Arc;

/// A cloneable handle to a shared in-memory tree.
#[derive(Clone, Default)]
pub struct MemoryTree {
    state: Arc<Mutex<TreeState>>,
}

#[derive(Default)]
struct TreeState {
    nodes: HashMap<Element, MemoryNode>,
    root: Option<Element>,
    last_raw: u64,
    listener: Option<ProviderListener>,
    hooks: HashMap<Element, Hooks>,
    highlighted: Option<(Element, u32)>,
    inspect_mode: bool,
    disposed: usize,
}

#[derive(Default, Clone, Copy)]
struct Hooks {
    hooked: bool,
    times: usize,
}

struct MemoryNode {
    node_type: NodeType,
    name: String,
    value: Option<String>,
    attributes: Vec<(String, String)>,
    styles: Vec<(String, String)>,
    parent: Option<Element>,
    children: Vec<Element>,
}

impl TreeState {
    fn create(&mut self, node_type: NodeType, name: String, value: Option<String>) -> Element {
        self.last_raw += 1;
        let element = Element::from_raw(self.last_raw);
        self.nodes.insert(
            element,
            MemoryNode {
                node_type,
                name,
                value,
                attributes: Vec::new(),
                styles: Vec::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        element
    }

    fn detach(&mut self, child: Element) {
        let Some(parent) = self.nodes.get_mut(&child).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|&c| c != child);
        }
    }

    fn insert(&mut self, parent: Element, index: Option<usize>, child: Element) -> bool {
        if parent == child || !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            debug!(%parent, %child, "ignoring invalid insert");
            return false;
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            let index = index.map_or(node.children.len(), |i| i.min(node.children.len()));
            node.children.insert(index, child);
        }
        true
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that hands out providers over this tree.
    pub fn factory(&self) -> MemoryProviderFactory {
        MemoryProviderFactory { tree: self.clone() }
    }

    pub fn create_element(&self, name: &str) -> Element {
        self.state
            .lock()
            .create(NodeType::Element, name.to_owned(), None)
    }

    pub fn create_text(&self, text: &str) -> Element {
        self.state
            .lock()
            .create(NodeType::Text, "#text".to_owned(), Some(text.to_owned()))
    }

    pub fn set_root(&self, root: Element) {
        self.state.lock().root = Some(root);
    }

    pub fn root(&self) -> Option<Element> {
        self.state.lock().root
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append_child(&self, parent: Element, child: Element) -> bool {
        self.state.lock().insert(parent, None, child)
    }

    /// Move `child` to `index` among `parent`'s children.
    pub fn insert_child(&self, parent: Element, index: usize, child: Element) -> bool {
        self.state.lock().insert(parent, Some(index), child)
    }

    pub fn remove_child(&self, parent: Element, child: Element) -> bool {
        let mut state = self.state.lock();
        if state.nodes.get(&child).and_then(|node| node.parent) != Some(parent) {
            return false;
        }
        state.detach(child);
        true
    }

    /// Drop `element`'s record but leave it in its parent's child list, the
    /// way a provider loses a node between two callbacks. The document can no
    /// longer describe it.
    pub fn forget(&self, element: Element) {
        self.state.lock().nodes.remove(&element);
    }

    /// Replace `parent`'s children with `children`, taking them from wherever
    /// they were.
    pub fn set_children(&self, parent: Element, children: &[Element]) {
        let mut state = self.state.lock();
        let previous = state
            .nodes
            .get(&parent)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for child in previous {
            state.detach(child);
        }
        for &child in children {
            state.insert(parent, None, child);
        }
    }

    pub fn children(&self, element: Element) -> Vec<Element> {
        self.state
            .lock()
            .nodes
            .get(&element)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn set_text(&self, element: Element, text: &str) {
        if let Some(node) = self.state.lock().nodes.get_mut(&element) {
            node.value = Some(text.to_owned());
        }
    }

    pub fn set_style(&self, element: Element, name: &str, value: &str) {
        if let Some(node) = self.state.lock().nodes.get_mut(&element) {
            match node.styles.iter_mut().find(|(n, _)| n == name) {
                Some(style) => style.1 = value.to_owned(),
                None => node.styles.push((name.to_owned(), value.to_owned())),
            }
        }
    }

    /// Set an attribute and report it to the document.
    pub fn set_attribute(&self, element: Element, name: &str, value: &str) {
        let listener = {
            let mut state = self.state.lock();
            let Some(node) = state.nodes.get_mut(&element) else {
                return;
            };
            set_attribute(&mut node.attributes, name, value);
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.attribute_modified(element, name, value);
        }
    }

    /// Remove an attribute and report it to the document.
    pub fn remove_attribute(&self, element: Element, name: &str) -> bool {
        let listener = {
            let mut state = self.state.lock();
            let Some(node) = state.nodes.get_mut(&element) else {
                return false;
            };
            let before = node.attributes.len();
            node.attributes.retain(|(n, _)| n != name);
            if node.attributes.len() == before {
                return false;
            }
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.attribute_removed(element, name);
        }
        true
    }

    pub fn attribute(&self, element: Element, name: &str) -> Option<String> {
        let state = self.state.lock();
        let node = state.nodes.get(&element)?;
        node.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Tell the document the structure may have changed.
    pub fn notify_changed(&self) -> bool {
        let listener = self.state.lock().listener.clone();
        match listener {
            Some(listener) => {
                listener.possibly_changed();
                true
            }
            None => false,
        }
    }

    /// Simulate the user picking `element` in inspect mode.
    pub fn request_inspect(&self, element: Element) -> bool {
        let listener = self.state.lock().listener.clone();
        match listener {
            Some(listener) => {
                listener.inspect_requested(element);
                true
            }
            None => false,
        }
    }

    /// Whether `element` currently holds a node id.
    pub fn is_hooked(&self, element: Element) -> bool {
        self.state
            .lock()
            .hooks
            .get(&element)
            .is_some_and(|hooks| hooks.hooked)
    }

    /// How many times `element` has been hooked so far.
    pub fn hook_count(&self, element: Element) -> usize {
        self.state
            .lock()
            .hooks
            .get(&element)
            .map_or(0, |hooks| hooks.times)
    }

    pub fn hooked_count(&self) -> usize {
        self.state
            .lock()
            .hooks
            .values()
            .filter(|hooks| hooks.hooked)
            .count()
    }

    pub fn highlighted(&self) -> Option<(Element, u32)> {
        self.state.lock().highlighted
    }

    pub fn inspect_mode_enabled(&self) -> bool {
        self.state.lock().inspect_mode
    }

    pub fn has_listener(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    /// How many providers over this tree have been disposed.
    pub fn dispose_count(&self) -> usize {
        self.state.lock().disposed
    }
}

fn set_attribute(attributes: &mut Vec<(String, String)>, name: &str, value: &str) {
    match attributes.iter_mut().find(|(n, _)| n == name) {
        Some(attribute) => attribute.1 = value.to_owned(),
        None => attributes.push((name.to_owned(), value.to_owned())),
    }
}

/// Parse `name=value name="quoted value" flag` into pairs.
///
/// A bare name gets an empty value. An unterminated quote runs to the end.
pub fn parse_attributes_text(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = &rest[name_end..];

        let mut value = "";
        if let Some(after) = rest.strip_prefix('=') {
            if let Some(quoted) = after.strip_prefix('"') {
                let end = quoted.find('"').unwrap_or(quoted.len());
                value = &quoted[..end];
                rest = quoted.get(end + 1..).unwrap_or("");
            } else {
                let end = after.find(char::is_whitespace).unwrap_or(after.len());
                value = &after[..end];
                rest = &after[end..];
            }
        }

        if !name.is_empty() {
            pairs.push((name.to_owned(), value.to_owned()));
        }
        rest = rest.trim_start();
    }
    pairs
}

/// Hands out [`MemoryProvider`]s over one [`MemoryTree`].
pub struct MemoryProviderFactory {
    tree: MemoryTree,
}

impl ElementProviderFactory for MemoryProviderFactory {
    fn create(&self) -> Box<dyn ElementProvider> {
        Box::new(MemoryProvider {
            descriptor: MemoryDescriptor {
                tree: self.tree.clone(),
            },
        })
    }
}

/// [`ElementProvider`] backed by a [`MemoryTree`].
pub struct MemoryProvider {
    descriptor: MemoryDescriptor,
}

impl MemoryProvider {
    fn tree(&self) -> &MemoryTree {
        &self.descriptor.tree
    }
}

impl ElementProvider for MemoryProvider {
    fn root_element(&self) -> Option<Element> {
        self.tree().root()
    }

    fn node_descriptor(&self, element: Element) -> Option<&dyn NodeDescriptor> {
        if self.tree().state.lock().nodes.contains_key(&element) {
            Some(&self.descriptor)
        } else {
            None
        }
    }

    fn set_mutation_listener(&mut self, listener: Option<ProviderListener>) {
        self.tree().state.lock().listener = listener;
    }

    fn dispose(&mut self) {
        self.tree().state.lock().disposed += 1;
    }

    fn highlight_element(&mut self, element: Element, color: u32) {
        self.tree().state.lock().highlighted = Some((element, color));
    }

    fn hide_highlight(&mut self) {
        self.tree().state.lock().highlighted = None;
    }

    fn set_inspect_mode_enabled(&mut self, enabled: bool) {
        self.tree().state.lock().inspect_mode = enabled;
    }

    fn set_attributes_as_text(&mut self, element: Element, text: &str) {
        let pairs = parse_attributes_text(text);
        let listener = {
            let mut state = self.tree().state.lock();
            let Some(node) = state.nodes.get_mut(&element) else {
                return;
            };
            for (name, value) in &pairs {
                set_attribute(&mut node.attributes, name, value);
            }
            state.listener.clone()
        };
        if let Some(listener) = listener {
            for (name, value) in &pairs {
                listener.attribute_modified(element, name, value);
            }
        }
    }
}

struct MemoryDescriptor {
    tree: MemoryTree,
}

impl NodeDescriptor for MemoryDescriptor {
    fn hook(&self, element: Element) {
        let mut state = self.tree.state.lock();
        let hooks = state.hooks.entry(element).or_default();
        hooks.hooked = true;
        hooks.times += 1;
    }

    fn unhook(&self, element: Element) {
        if let Some(hooks) = self.tree.state.lock().hooks.get_mut(&element) {
            hooks.hooked = false;
        }
    }

    fn node_type(&self, element: Element) -> NodeType {
        self.tree
            .state
            .lock()
            .nodes
            .get(&element)
            .map_or(NodeType::Element, |node| node.node_type)
    }

    fn node_name(&self, element: Element) -> String {
        self.tree
            .state
            .lock()
            .nodes
            .get(&element)
            .map(|node| node.name.clone())
            .unwrap_or_default()
    }

    fn local_name(&self, element: Element) -> String {
        match self.node_type(element) {
            NodeType::Element => self.node_name(element).to_lowercase(),
            _ => String::new(),
        }
    }

    fn node_value(&self, element: Element) -> Option<String> {
        self.tree
            .state
            .lock()
            .nodes
            .get(&element)
            .and_then(|node| node.value.clone())
    }

    fn children(&self, element: Element, children: &mut Vec<Element>) {
        if let Some(node) = self.tree.state.lock().nodes.get(&element) {
            children.extend(node.children.iter().copied());
        }
    }

    fn attributes(&self, element: Element, attributes: &mut AttributeList) {
        if let Some(node) = self.tree.state.lock().nodes.get(&element) {
            for (name, value) in &node.attributes {
                attributes.store(name.as_str(), value.as_str());
            }
        }
    }

    fn styles(&self, element: Element, styles: &mut dyn StyleAccumulator) {
        if let Some(node) = self.tree.state.lock().nodes.get(&element) {
            for (name, value) in &node.styles {
                styles.store(name, value, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_parse_attributes_text() {
        let pairs = parse_attributes_text(r#"  id=main class="big red"  hidden title="unterminated"#);
        let expected = [
            ("id", "main"),
            ("class", "big red"),
            ("hidden", ""),
            ("title", "unterminated"),
        ];
        assert_eq!(pairs.len(), expected.len());
        for ((name, value), (want_name, want_value)) in pairs.iter().zip(expected) {
            assert_eq!(name, want_name);
            assert_eq!(value, want_value);
        }
        assert!(parse_attributes_text("   ").is_empty());
        assert_eq!(
            parse_attributes_text("=orphan a=1"),
            vec![("a".to_owned(), "1".to_owned())]
        );
    }

    #[test]
    fn test_moving_a_child_detaches_it_first() {
        let tree = MemoryTree::new();
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        let c = tree.create_element("c");
        tree.append_child(a, c);
        tree.append_child(b, c);
        assert!(tree.children(a).is_empty());
        assert_eq!(tree.children(b), vec![c]);

        assert!(!tree.append_child(c, c));
        assert!(!tree.remove_child(a, c));
        assert!(tree.remove_child(b, c));
        assert!(tree.children(b).is_empty());
    }

    #[test]
    fn test_set_children_reorders_and_steals() {
        let tree = MemoryTree::new();
        let root = tree.create_element("root");
        let other = tree.create_element("other");
        let [x, y, z] = ["x", "y", "z"].map(|n| tree.create_element(n));
        tree.set_children(root, &[x, y]);
        tree.append_child(other, z);

        tree.set_children(root, &[z, y, x]);
        assert_eq!(tree.children(root), vec![z, y, x]);
        assert!(tree.children(other).is_empty());
    }

    #[test]
    fn test_descriptor_reports_node_details() {
        let tree = MemoryTree::new();
        let div = tree.create_element("DIV");
        let text = tree.create_text("hello");
        tree.append_child(div, text);
        tree.set_attribute(div, "id", "main");
        tree.set_attribute(div, "id", "other");
        tree.set_style(div, "width", "10px");

        let provider = tree.factory().create();
        let descriptor = provider.node_descriptor(div).expect("div descriptor");
        assert_eq!(descriptor.node_name(div), "DIV");
        assert_eq!(descriptor.local_name(div), "div");
        assert_eq!(descriptor.node_type(text), NodeType::Text);
        assert_eq!(descriptor.node_value(text).as_deref(), Some("hello"));

        let mut attributes = AttributeList::new();
        descriptor.attributes(div, &mut attributes);
        assert_eq!(attributes.to_flat(), vec!["id", "other"]);

        let mut styles = Vec::new();
        descriptor.styles(div, &mut styles);
        assert_eq!(styles.len(), 1);
        assert_eq!(styles[0].value, "10px");

        assert!(provider.node_descriptor(Element::from_raw(999)).is_none());
    }
}
