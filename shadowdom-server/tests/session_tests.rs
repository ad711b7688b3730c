use facet_testhelpers::test;
use shadowdom::memory::MemoryTree;
use shadowdom::{Document, DocumentError, Element, NodeId, NodeType};
use shadowdom_server::{DomError, DomEvent, DomSession, SessionConfig};

struct Fixture {
    tree: MemoryTree,
    document: Document,
    root: Element,
}

impl Fixture {
    fn new(children: &[&str]) -> (Self, Vec<Element>) {
        let tree = MemoryTree::new();
        let root = tree.create_element("html");
        tree.set_root(root);
        let elements = children
            .iter()
            .map(|name| {
                let element = tree.create_element(name);
                tree.append_child(root, element);
                element
            })
            .collect();
        let document = Document::new(tree.factory());
        (
            Fixture {
                tree,
                document,
                root,
            },
            elements,
        )
    }

    fn session(&self) -> DomSession {
        let session = DomSession::new(self.document.clone());
        session.enable().expect("enable");
        session
    }

    fn id(&self, element: Element) -> NodeId {
        self.document
            .node_id_for_element(element)
            .unwrap_or_else(|| panic!("{element} is not mapped"))
    }
}

#[test]
fn test_get_document_describes_whole_tree() {
    let (fx, children) = Fixture::new(&["HEAD", "body"]);
    fx.tree.set_attribute(children[1], "class", "main");
    let text = fx.tree.create_text("hello");
    fx.tree.append_child(children[1], text);

    let session = fx.session();
    let document = session.get_document().expect("get_document");

    assert_eq!(document.node_id, fx.id(fx.root));
    assert_eq!(document.child_node_count, 2);
    assert_eq!(document.children[0].node_name, "HEAD");
    assert_eq!(document.children[0].local_name, "head");

    let body = document.find(fx.id(children[1])).expect("body node");
    assert_eq!(body.attribute("class"), Some("main"));
    assert_eq!(body.children.len(), 1);

    let text_node = &body.children[0];
    assert_eq!(text_node.node_type, NodeType::Text);
    assert_eq!(text_node.node_value, "hello");
    assert_eq!(text_node.local_name, "");
}

#[test]
fn test_commands_require_enable() {
    let (fx, children) = Fixture::new(&["a"]);
    let session = DomSession::new(fx.document.clone());

    assert!(!session.is_enabled());
    assert_eq!(session.get_document(), Err(DomError::NotEnabled));
    assert_eq!(
        session.perform_search("a").map(|handle| handle.result_count),
        Err(DomError::NotEnabled)
    );
    assert_eq!(session.hide_highlight(), Err(DomError::NotEnabled));
    assert!(!fx.document.is_active());

    session.enable().expect("enable");
    session.enable().expect("second enable is a no-op");
    assert_eq!(fx.document.ref_count(), 1);
    assert!(fx.tree.is_hooked(children[0]));

    assert!(session.disable());
    assert!(!session.disable());
    assert!(!fx.document.is_active());
    assert!(!fx.tree.is_hooked(children[0]));
}

#[test]
fn test_dropping_session_releases_document() {
    let (fx, _) = Fixture::new(&["a"]);
    let first = fx.session();
    let second = fx.session();
    assert_eq!(fx.document.ref_count(), 2);

    drop(first);
    assert!(fx.document.is_active());
    drop(second);
    assert!(!fx.document.is_active());
    assert_eq!(fx.tree.dispose_count(), 1);
}

#[test]
fn test_tree_changes_become_events() {
    let (fx, children) = Fixture::new(&["a", "b"]);
    let session = fx.session();
    assert!(session.drain_events().is_empty());

    let b_id = fx.id(children[1]);
    let root_id = fx.id(fx.root);

    let c = fx.tree.create_element("c");
    let leaf = fx.tree.create_element("leaf");
    fx.tree.append_child(c, leaf);
    fx.tree.append_child(fx.root, c);
    fx.tree.remove_child(fx.root, children[1]);
    assert_eq!(fx.document.update_tree(), Ok(true));

    let events = session.drain_events();
    assert_eq!(events.len(), 2, "unexpected events: {events:?}");
    assert_eq!(
        events[0],
        DomEvent::ChildNodeRemoved {
            parent_node_id: root_id,
            node_id: b_id,
        }
    );
    match &events[1] {
        DomEvent::ChildNodeInserted {
            parent_node_id,
            previous_node_id,
            node,
        } => {
            assert_eq!(*parent_node_id, root_id);
            assert_eq!(*previous_node_id, Some(fx.id(children[0])));
            assert_eq!(node.node_id, fx.id(c));
            assert_eq!(node.child_node_count, 1);
            assert_eq!(node.children[0].node_id, fx.id(leaf));
        }
        other => panic!("expected an insertion, got {other:?}"),
    }

    assert!(session.drain_events().is_empty());
}

#[test]
fn test_events_survive_postcard() {
    let (fx, _) = Fixture::new(&[]);
    let session = fx.session();

    let child = fx.tree.create_element("p");
    fx.tree.set_attribute(child, "id", "intro");
    fx.tree.append_child(fx.root, child);
    assert_eq!(fx.document.update_tree(), Ok(true));

    for event in session.drain_events() {
        let decoded = DomEvent::from_postcard(&event.to_postcard()).expect("decode");
        assert_eq!(decoded, event);
    }
}

#[test]
fn test_attribute_events_use_node_ids() {
    let (fx, children) = Fixture::new(&["a"]);
    let session = fx.session();
    let a_id = fx.id(children[0]);

    fx.tree.set_attribute(children[0], "title", "hi");
    fx.tree.remove_attribute(children[0], "title");
    fx.tree.request_inspect(children[0]);

    // Not part of the tree, so nothing to report.
    let stray = fx.tree.create_element("stray");
    fx.tree.request_inspect(stray);

    // Provider events are queued on the document thread; this call runs
    // after them.
    assert_eq!(fx.document.update_tree(), Ok(false));

    assert_eq!(
        session.drain_events(),
        vec![
            DomEvent::AttributeModified {
                node_id: a_id,
                name: "title".to_owned(),
                value: "hi".to_owned(),
            },
            DomEvent::AttributeRemoved {
                node_id: a_id,
                name: "title".to_owned(),
            },
            DomEvent::InspectNodeRequested { node_id: a_id },
        ]
    );
}

#[test]
fn test_search_results_are_paged_and_discarded() {
    let (fx, children) = Fixture::new(&["item", "other", "item"]);
    fx.tree.set_attribute(children[1], "data-kind", "Item-like");
    let session = fx.session();

    let handle = session.perform_search("ITEM").expect("search");
    assert_eq!(handle.result_count, 3);

    let all = session
        .search_results(&handle.search_id, 0, 3)
        .expect("results");
    assert_eq!(all, children.iter().map(|&e| fx.id(e)).collect::<Vec<_>>());
    assert_eq!(
        session.search_results(&handle.search_id, 1, 2),
        Ok(vec![fx.id(children[1])])
    );
    assert_eq!(
        session.search_results(&handle.search_id, 2, 5),
        Err(DomError::InvalidRange {
            from: 2,
            to: 5,
            len: 3
        })
    );

    session
        .discard_search_results(&handle.search_id)
        .expect("discard");
    assert_eq!(
        session.search_results(&handle.search_id, 0, 1),
        Err(DomError::SearchNotFound {
            search_id: handle.search_id.clone()
        })
    );
}

#[test]
fn test_oldest_search_is_evicted() {
    let (fx, _) = Fixture::new(&["a"]);
    let session = DomSession::with_config(
        fx.document.clone(),
        SessionConfig {
            max_search_sessions: 2,
        },
    );
    session.enable().expect("enable");

    let first = session.perform_search("a").expect("search");
    let second = session.perform_search("a").expect("search");
    let third = session.perform_search("a").expect("search");
    assert_ne!(first.search_id, second.search_id);

    assert!(matches!(
        session.search_results(&first.search_id, 0, 1),
        Err(DomError::SearchNotFound { .. })
    ));
    assert!(session.search_results(&second.search_id, 0, 1).is_ok());
    assert!(session.search_results(&third.search_id, 0, 1).is_ok());
}

#[test]
fn test_node_commands_reach_the_provider() {
    let (fx, children) = Fixture::new(&["a"]);
    let session = fx.session();
    let a_id = fx.id(children[0]);

    session.highlight_node(a_id, 0xff00_00ff).expect("highlight");
    assert_eq!(fx.tree.highlighted(), Some((children[0], 0xff00_00ff)));
    session.hide_highlight().expect("hide");
    assert_eq!(fx.tree.highlighted(), None);

    session.set_inspect_mode_enabled(true).expect("inspect mode");
    assert!(fx.tree.inspect_mode_enabled());

    session
        .set_attributes_as_text(a_id, r#"href="/x" hidden"#)
        .expect("set attributes");
    assert_eq!(fx.tree.attribute(children[0], "href").as_deref(), Some("/x"));
    assert_eq!(fx.tree.attribute(children[0], "hidden").as_deref(), Some(""));
    assert_eq!(session.drain_events().len(), 2);

    assert_eq!(session.resolve_node(a_id), Ok(children[0]));
    assert_eq!(
        session.highlight_node(NodeId(9999), 0),
        Err(DomError::NodeNotFound {
            node_id: NodeId(9999)
        })
    );
}

#[test]
fn test_document_errors_pass_through() {
    let tree = MemoryTree::new();
    let session = DomSession::new(Document::new(tree.factory()));
    assert_eq!(
        session.enable(),
        Err(DomError::Document {
            error: DocumentError::NoRootElement
        })
    );
    assert!(!session.is_enabled());
}
