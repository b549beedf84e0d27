// # Memory DOM
//
// In-memory implementation of DomSensor.
//
// ## Purpose
//
// Provides an arena-backed document with open shadow roots and mutation
// observers, so the bridge can run outside a browser: contract tests, the
// replay harness, and embedding demos all drive it directly.
//
// ## Observer Semantics
//
// - Records are delivered synchronously to every matching observer, in
//   registration order
// - Records never cross a shadow boundary: an observer on a host element
//   does not see mutations inside the host's shadow root
// - `attach_shadow` produces no record, exactly like the platform; this is
//   why the discovery engine needs timer-based retry
// - Setting an attribute always produces a record, even when the value is
//   unchanged

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::spec::NodeSpec;
use crate::Error;
use crate::traits::{DomSensor, MutationRecord, NodeId, ObserveOptions, Registration, Watcher};

/// In-memory DOM implementation
///
/// Cloning is cheap and every clone shares the same document.
///
/// # Example
///
/// ```rust
/// use optbridge_core::dom::MemoryDom;
/// use optbridge_core::traits::DomSensor;
///
/// let dom = MemoryDom::new();
/// let div = dom.create_element("div");
/// dom.append_child(dom.document(), div).unwrap();
/// dom.set_attribute(div, "part", "option selected").unwrap();
///
/// assert_eq!(dom.attribute(div, "part").as_deref(), Some("option selected"));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDom {
    inner: Arc<Mutex<Tree>>,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<NodeId, NodeData>,
    next_id: u64,
    observers: Vec<ObserverEntry>,
    next_observer: u64,
    document: NodeId,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow: Option<NodeId>,
}

#[derive(Debug)]
enum NodeKind {
    Document,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    ShadowRoot,
}

#[derive(Debug)]
struct ObserverEntry {
    id: u64,
    target: NodeId,
    options: ObserveOptions,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

impl Tree {
    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeData {
                kind,
                parent: None,
                children: Vec::new(),
                shadow: None,
            },
        );
        id
    }

    fn node(&self, id: NodeId) -> Result<&NodeData, Error> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::dom(format!("unknown node {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, Error> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::dom(format!("unknown node {id}")))
    }

    fn is_observed_by(&self, entry: &ObserverEntry, target: NodeId) -> bool {
        if entry.target == target {
            return true;
        }
        if !entry.options.subtree {
            return false;
        }
        let mut current = self.nodes.get(&target).and_then(|n| n.parent);
        while let Some(node) = current {
            if node == entry.target {
                return true;
            }
            current = self.nodes.get(&node).and_then(|n| n.parent);
        }
        false
    }

    fn deliver(&self, record: MutationRecord) {
        let target = record.target();
        for entry in &self.observers {
            let wanted = match &record {
                MutationRecord::Attributes { name, .. } => entry.options.wants_attribute(name),
                MutationRecord::ChildList { .. } => entry.options.child_list,
                MutationRecord::CharacterData { .. } => entry.options.character_data,
            };
            if wanted && self.is_observed_by(entry, target) {
                // A closed receiver means the watcher is being torn down
                let _ = entry.tx.send(record.clone());
            }
        }
    }

    fn detach(&mut self, child: NodeId) -> Result<(), Error> {
        let Some(old_parent) = self.node(child)?.parent else {
            return Ok(());
        };
        self.node_mut(old_parent)?.children.retain(|c| *c != child);
        self.node_mut(child)?.parent = None;
        self.deliver(MutationRecord::ChildList {
            target: old_parent,
            added: Vec::new(),
            removed: vec![child],
        });
        Ok(())
    }

    fn text_of(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            _ => {
                for child in &node.children {
                    self.text_of(*child, out);
                }
            }
        }
    }

    fn html_of(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value)));
                }
                out.push('>');
                for child in &node.children {
                    self.html_of(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            NodeKind::Document | NodeKind::ShadowRoot => {
                for child in &node.children {
                    self.html_of(*child, out);
                }
            }
        }
    }

    fn build(&mut self, spec: &NodeSpec) -> Result<NodeId, Error> {
        let Some(tag) = spec.tag.as_deref() else {
            let text = spec.text.clone().unwrap_or_default();
            return Ok(self.insert(NodeKind::Text(text)));
        };

        let attributes = spec
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let id = self.insert(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes,
        });

        let mut children = Vec::with_capacity(spec.children.len() + 1);
        if let Some(text) = &spec.text {
            children.push(self.insert(NodeKind::Text(text.clone())));
        }
        for child in &spec.children {
            children.push(self.build(child)?);
        }
        for child in &children {
            self.node_mut(*child)?.parent = Some(id);
        }
        self.node_mut(id)?.children = children;

        if let Some(shadow_children) = &spec.shadow {
            let root = self.insert(NodeKind::ShadowRoot);
            let mut built = Vec::with_capacity(shadow_children.len());
            for child in shadow_children {
                built.push(self.build(child)?);
            }
            for child in &built {
                self.node_mut(*child)?.parent = Some(root);
            }
            self.node_mut(root)?.children = built;
            self.node_mut(id)?.shadow = Some(root);
        }

        Ok(id)
    }
}

impl MemoryDom {
    /// Create an empty document
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: HashMap::new(),
            next_id: 1,
            observers: Vec::new(),
            next_observer: 1,
            document: NodeId::new(0),
        };
        tree.document = tree.insert(NodeKind::Document);
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    /// Create a document and mount `spec` as the document's only child
    ///
    /// # Returns
    ///
    /// The DOM and the node built for `spec`
    pub fn from_spec(spec: &NodeSpec) -> Result<(Self, NodeId), Error> {
        let dom = Self::new();
        let root = dom.mount(dom.document(), spec)?;
        Ok((dom, root))
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The document node
    pub fn document(&self) -> NodeId {
        self.lock().document
    }

    /// Create a detached element
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.lock().insert(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&self, text: &str) -> NodeId {
        self.lock().insert(NodeKind::Text(text.to_string()))
    }

    /// Build `spec` and append it to `parent` as a single insertion
    pub fn mount(&self, parent: NodeId, spec: &NodeSpec) -> Result<NodeId, Error> {
        let mut tree = self.lock();
        let id = tree.build(spec)?;
        drop(tree);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Append `child` to `parent`, moving it out of its previous parent
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        let mut tree = self.lock();
        if matches!(tree.node(parent)?.kind, NodeKind::Text(_)) {
            return Err(Error::dom(format!("text node {parent} cannot have children")));
        }
        tree.detach(child)?;
        tree.node_mut(parent)?.children.push(child);
        tree.node_mut(child)?.parent = Some(parent);
        tree.deliver(MutationRecord::ChildList {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
        Ok(())
    }

    /// Remove `child` from `parent`
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        let mut tree = self.lock();
        if tree.node(child)?.parent != Some(parent) {
            return Err(Error::dom(format!("{child} is not a child of {parent}")));
        }
        tree.detach(child)
    }

    /// Set an attribute, reporting the change to observers
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), Error> {
        let mut tree = self.lock();
        let NodeKind::Element { attributes, .. } = &mut tree.node_mut(node)?.kind else {
            return Err(Error::dom(format!("{node} is not an element")));
        };
        match attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
        tree.deliver(MutationRecord::Attributes {
            target: node,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Remove an attribute; absent attributes produce no record
    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), Error> {
        let mut tree = self.lock();
        let NodeKind::Element { attributes, .. } = &mut tree.node_mut(node)?.kind else {
            return Err(Error::dom(format!("{node} is not an element")));
        };
        let before = attributes.len();
        attributes.retain(|(k, _)| k != name);
        if attributes.len() != before {
            tree.deliver(MutationRecord::Attributes {
                target: node,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the data of a text node
    pub fn set_data(&self, text_node: NodeId, data: &str) -> Result<(), Error> {
        let mut tree = self.lock();
        let NodeKind::Text(text) = &mut tree.node_mut(text_node)?.kind else {
            return Err(Error::dom(format!("{text_node} is not a text node")));
        };
        *text = data.to_string();
        tree.deliver(MutationRecord::CharacterData { target: text_node });
        Ok(())
    }

    /// Update an element's text the way a re-rendering widget does
    ///
    /// Mutates the first text child in place when there is one, otherwise
    /// appends a new text node.
    pub fn update_text(&self, element: NodeId, data: &str) -> Result<(), Error> {
        let first_text = {
            let tree = self.lock();
            tree.node(element)?
                .children
                .iter()
                .copied()
                .find(|c| matches!(tree.nodes.get(c).map(|n| &n.kind), Some(NodeKind::Text(_))))
        };
        match first_text {
            Some(text_node) => self.set_data(text_node, data),
            None => {
                let text_node = self.create_text(data);
                self.append_child(element, text_node)
            }
        }
    }

    /// Attach an open shadow root to `host`
    ///
    /// Produces no mutation record.
    pub fn attach_shadow(&self, host: NodeId) -> Result<NodeId, Error> {
        let mut tree = self.lock();
        if !matches!(tree.node(host)?.kind, NodeKind::Element { .. }) {
            return Err(Error::dom(format!("{host} is not an element")));
        }
        if tree.node(host)?.shadow.is_some() {
            return Err(Error::dom(format!("{host} already has a shadow root")));
        }
        let root = tree.insert(NodeKind::ShadowRoot);
        tree.node_mut(host)?.shadow = Some(root);
        Ok(root)
    }

    /// First element (document or any shadow tree) whose `id` attribute is `id`
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        let tree = self.lock();
        let mut matches: Vec<NodeId> = tree
            .nodes
            .iter()
            .filter(|(_, node)| match &node.kind {
                NodeKind::Element { attributes, .. } => {
                    attributes.iter().any(|(k, v)| k == "id" && v == id)
                }
                _ => false,
            })
            .map(|(node_id, _)| *node_id)
            .collect();
        matches.sort();
        matches.first().copied()
    }

    /// Number of observers currently attached
    pub fn live_observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryRegistration {
    tree: Weak<Mutex<Tree>>,
    id: u64,
}

impl Registration for MemoryRegistration {
    fn disconnect(self: Box<Self>) {
        if let Some(tree) = self.tree.upgrade() {
            let mut tree = tree.lock().unwrap_or_else(PoisonError::into_inner);
            tree.observers.retain(|entry| entry.id != self.id);
        }
    }
}

impl DomSensor for MemoryDom {
    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock().nodes.get(&node).and_then(|n| n.parent)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        match &self.lock().nodes.get(&node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.lock().nodes.get(&node)?.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.lock().text_of(node, &mut out);
        out
    }

    fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.lock().html_of(node, &mut out);
        out
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.lock().nodes.get(&node).and_then(|n| n.shadow)
    }

    fn observe(&self, target: NodeId, options: ObserveOptions) -> Watcher {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tree = self.lock();
        let id = tree.next_observer;
        tree.next_observer += 1;
        tree.observers.push(ObserverEntry {
            id,
            target,
            options,
            tx,
        });
        drop(tree);

        Watcher::new(
            Box::pin(UnboundedReceiverStream::new(rx)),
            Box::new(MemoryRegistration {
                tree: Arc::downgrade(&self.inner),
                id,
            }),
        )
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn builds_tree_from_spec() {
        let spec = NodeSpec::element("section")
            .attr("id", "main")
            .child(NodeSpec::element("span").with_text("$10.00"));
        let (dom, root) = MemoryDom::from_spec(&spec).unwrap();

        assert_eq!(dom.find_by_id("main"), Some(root));
        assert_eq!(dom.text_content(root), "$10.00");
        assert_eq!(
            dom.outer_html(root),
            r#"<section id="main"><span>$10.00</span></section>"#
        );
    }

    #[test]
    fn shadow_content_is_not_a_child() {
        let spec = NodeSpec::element("purchase-options")
            .shadow(vec![NodeSpec::element("div").attr("id", "inner")]);
        let (dom, host) = MemoryDom::from_spec(&spec).unwrap();

        assert!(dom.children(host).is_empty());
        let root = dom.shadow_root(host).unwrap();
        let inner = dom.find_by_id("inner").unwrap();
        assert_eq!(dom.parent(inner), Some(root));
        assert_eq!(dom.parent(root), None);
    }

    #[tokio::test]
    async fn observers_do_not_cross_shadow_boundaries() {
        let spec = NodeSpec::element("purchase-options")
            .shadow(vec![NodeSpec::element("span").attr("id", "price").with_text("1")]);
        let (dom, host) = MemoryDom::from_spec(&spec).unwrap();
        let root = dom.shadow_root(host).unwrap();
        let price = dom.find_by_id("price").unwrap();

        let mut outer = dom.observe(host, ObserveOptions::character_data().subtree());
        let mut inner = dom.observe(root, ObserveOptions::character_data().subtree());

        dom.update_text(price, "2").unwrap();

        let record = inner.next().await.unwrap();
        assert!(matches!(record, MutationRecord::CharacterData { .. }));
        let nothing =
            tokio::time::timeout(std::time::Duration::from_millis(20), outer.next()).await;
        assert!(nothing.is_err(), "host observer must not see shadow mutations");
    }

    #[test]
    fn disconnect_removes_observer() {
        let dom = MemoryDom::new();
        let watcher = dom.observe(dom.document(), ObserveOptions::child_list());
        let dropped = dom.observe(dom.document(), ObserveOptions::child_list());
        assert_eq!(dom.live_observer_count(), 2);

        watcher.disconnect();
        drop(dropped);
        assert_eq!(dom.live_observer_count(), 0);
    }

    #[tokio::test]
    async fn attribute_filter_is_honoured() {
        let dom = MemoryDom::new();
        let div = dom.create_element("div");
        dom.append_child(dom.document(), div).unwrap();
        let mut watcher = dom.observe(div, ObserveOptions::attribute("part"));

        dom.set_attribute(div, "class", "x").unwrap();
        dom.set_attribute(div, "part", "selected").unwrap();

        let record = watcher.next().await.unwrap();
        assert_eq!(
            record,
            MutationRecord::Attributes {
                target: div,
                name: "part".into()
            }
        );
    }

    #[test]
    fn attach_shadow_twice_fails() {
        let dom = MemoryDom::new();
        let host = dom.create_element("purchase-options");
        dom.attach_shadow(host).unwrap();
        assert!(dom.attach_shadow(host).is_err());
    }

    #[test]
    fn outer_html_escapes_markup() {
        let spec = NodeSpec::element("span")
            .attr("title", "a \"b\"")
            .with_text("1 < 2 & 3");
        let (dom, root) = MemoryDom::from_spec(&spec).unwrap();
        assert_eq!(
            dom.outer_html(root),
            r#"<span title="a &quot;b&quot;">1 &lt; 2 &amp; 3</span>"#
        );
    }
}
