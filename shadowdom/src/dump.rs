//! Snapshot pretty-printing for debugging.
//!
//! This module is only compiled when the `tracing` feature is enabled or during tests.

use crate::ids::ElementIds;
use crate::shadow::DocumentView;
use crate::Element;
use std::fmt;

/// Helper for pretty-printing a tree with its node ids.
pub(crate) struct ShadowDump<'a> {
    pub(crate) view: &'a dyn DocumentView,
    pub(crate) ids: &'a ElementIds,
}

impl fmt::Display for ShadowDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_element(f, self.view.root_element(), 0)
    }
}

impl ShadowDump<'_> {
    fn fmt_element(&self, f: &mut fmt::Formatter<'_>, element: Element, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self.ids.node_id(element) {
            Some(id) => writeln!(f, "{indent}{element} #{id}")?,
            None => writeln!(f, "{indent}{element} (unmapped)")?,
        }
        for &child in self.view.children(element) {
            self.fmt_element(f, child, depth + 1)?;
        }
        Ok(())
    }
}
