// # DOM Sensor Trait
//
// Defines the passive interface through which the bridge sees the host
// document and the third-party widget rendered inside it.
//
// ## Implementations
//
// - In-memory arena DOM: `crate::dom::MemoryDom`
// - Future: a `web-sys` backed sensor when compiled for `wasm32`
//
// ## Usage
//
// ```rust,ignore
// use optbridge_core::traits::{DomSensor, ObserveOptions};
// use tokio_stream::StreamExt;
//
// let mut watcher = sensor.observe(boundary, ObserveOptions::child_list().subtree());
// while let Some(record) = watcher.next().await {
//     println!("mutation: {:?}", record);
// }
// watcher.disconnect();
// ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::Stream;

/// Opaque identity of a node in the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a raw node identity
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identity value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Which mutations an observer subscribes to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Report children being added or removed
    pub child_list: bool,
    /// Report attribute changes
    pub attributes: bool,
    /// Restrict attribute reports to these names
    pub attribute_filter: Option<Vec<String>>,
    /// Report text node data changes
    pub character_data: bool,
    /// Extend observation to all descendants of the target
    pub subtree: bool,
}

impl ObserveOptions {
    /// Observe child-list changes
    pub fn child_list() -> Self {
        Self {
            child_list: true,
            ..Self::default()
        }
    }

    /// Observe changes to the named attribute only
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            attributes: true,
            attribute_filter: Some(vec![name.into()]),
            ..Self::default()
        }
    }

    /// Observe text node data changes
    pub fn character_data() -> Self {
        Self {
            character_data: true,
            ..Self::default()
        }
    }

    /// Extend to the whole subtree
    pub fn subtree(mut self) -> Self {
        self.subtree = true;
        self
    }

    /// Whether an attribute change with `name` is reported
    pub fn wants_attribute(&self, name: &str) -> bool {
        self.attributes
            && self
                .attribute_filter
                .as_ref()
                .is_none_or(|filter| filter.iter().any(|f| f == name))
    }
}

/// A single structural change delivered to an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// An attribute of `target` changed
    Attributes {
        /// Element whose attribute changed
        target: NodeId,
        /// Attribute name
        name: String,
    },
    /// Children of `target` were added or removed
    ChildList {
        /// Parent whose child list changed
        target: NodeId,
        /// Nodes inserted
        added: Vec<NodeId>,
        /// Nodes removed
        removed: Vec<NodeId>,
    },
    /// The data of a text node changed
    CharacterData {
        /// Text node whose data changed
        target: NodeId,
    },
}

impl MutationRecord {
    /// Node the mutation happened on
    pub fn target(&self) -> NodeId {
        match self {
            Self::Attributes { target, .. }
            | Self::ChildList { target, .. }
            | Self::CharacterData { target } => *target,
        }
    }
}

/// Live observer registration held by a [`Watcher`]
///
/// `disconnect` consumes the registration, so it can run at most once.
pub trait Registration: Send {
    /// Stop delivering records to this observer
    fn disconnect(self: Box<Self>);
}

/// A mutation observer attached to one target
///
/// Yields [`MutationRecord`]s in delivery order. Dropping a watcher
/// disconnects it; [`Watcher::disconnect`] does the same explicitly.
pub struct Watcher {
    records: Pin<Box<dyn Stream<Item = MutationRecord> + Send + 'static>>,
    registration: Option<Box<dyn Registration>>,
}

impl Watcher {
    /// Build a watcher from a record stream and its registration
    pub fn new(
        records: Pin<Box<dyn Stream<Item = MutationRecord> + Send + 'static>>,
        registration: Box<dyn Registration>,
    ) -> Self {
        Self {
            records,
            registration: Some(registration),
        }
    }

    /// Disconnect the underlying observer
    pub fn disconnect(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.disconnect();
        }
    }
}

impl Stream for Watcher {
    type Item = MutationRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.records.as_mut().poll_next(cx)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("connected", &self.registration.is_some())
            .finish()
    }
}

/// Passive view of the host document
///
/// The sensor only reads structure and subscribes to structural diffs. It
/// never invokes anything on the widget, which exposes no API.
///
/// Reads on unknown or detached nodes return empty values rather than
/// errors: a node that vanished between a mutation and the read is a
/// normal occurrence for a widget that re-renders itself.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Read attributes, text and markup
/// - ✅ Register observers and deliver records in order
///
/// ## Forbidden Capabilities
/// - ❌ Dispatch domain events (use `EventDispatcher`)
/// - ❌ Retry or schedule anything (owned by the session)
pub trait DomSensor: Send + Sync {
    /// Light-DOM children of a node (shadow roots are not children)
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Parent of a node; `None` for document and shadow roots
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Lowercase tag name; `None` for text nodes and shadow roots
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// Attribute value
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Concatenated text of the node and its light-DOM descendants
    fn text_content(&self, node: NodeId) -> String;

    /// Serialized markup of the node including itself
    fn outer_html(&self, node: NodeId) -> String;

    /// Open shadow root attached to an element
    fn shadow_root(&self, node: NodeId) -> Option<NodeId>;

    /// Attach an observer to `target`
    ///
    /// Records do not cross shadow boundaries: an observer on a host element
    /// with `subtree` does not see mutations inside its shadow root.
    fn observe(&self, target: NodeId, options: ObserveOptions) -> Watcher;
}

/// Whether the marker attribute of `node` contains `token`
pub fn has_token(sensor: &dyn DomSensor, node: NodeId, attribute: &str, token: &str) -> bool {
    sensor
        .attribute(node, attribute)
        .is_some_and(|value| value.split_whitespace().any(|t| t == token))
}

/// Depth-first light-DOM traversal below `root`, excluding `root` itself
pub fn descendants(sensor: &dyn DomSensor, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = sensor.children(root).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(sensor.children(node).into_iter().rev());
    }
    out
}

/// First descendant of `root` (document order) satisfying `predicate`
pub fn find_descendant(
    sensor: &dyn DomSensor,
    root: NodeId,
    mut predicate: impl FnMut(NodeId) -> bool,
) -> Option<NodeId> {
    descendants(sensor, root).into_iter().find(|node| predicate(*node))
}

/// Whether `ancestor` is `node` or one of its light-DOM ancestors
pub fn is_inclusive_ancestor(sensor: &dyn DomSensor, ancestor: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = sensor.parent(n);
    }
    false
}
