//! # Phasmid
//!
//! Building blocks for keeping a remote mirror of a tree in sync with the
//! real thing.
//!
//! Named after the stick insects, which survive by looking exactly like the
//! branch next to them.
//!
//! - [`IdMap`]: a bijection between externally owned objects and small,
//!   never-reused integer ids
//! - [`reconcile_children`]: a greedy insert/remove edit script that rewrites
//!   one ordered child list into another, in place
//!
//! ## Usage
//!
//! ```
//! use phasmid::{ChildEdit, IdMap, edit_script};
//!
//! let mut ids = IdMap::new();
//! let a = ids.put("a").id();
//! assert_eq!(ids.key_for(a), Some("a"));
//!
//! let ops = edit_script(&["a", "b", "c"], &["a", "c"]);
//! assert_eq!(ops, vec![ChildEdit::Remove { index: 1, element: "b" }]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

mod tracing_macros;
pub(crate) use tracing_macros::{debug, trace};

/// Greedy child-list edit scripts
pub mod children;
/// Bidirectional id maps
pub mod id_map;

pub use children::{ChildEdit, ChildSink, apply_edits, edit_script, reconcile_children};
pub use id_map::{IdMap, Put};
