// # Node Specs
//
// Serializable description of a DOM subtree, used to seed a MemoryDom from
// JSON fixtures and to describe nodes inserted by replay scenarios.
//
// ## File Format
//
// ```json
// {
//   "tag": "section",
//   "attrs": { "data-section": "main" },
//   "children": [
//     { "tag": "purchase-options", "shadow": [
//       { "tag": "div", "attrs": { "part": "option one-time selected" }, "children": [
//         { "tag": "span", "attrs": { "part": "price" }, "text": "$10.00" }
//       ]}
//     ]}
//   ]
// }
// ```
//
// A spec without `tag` is a text node holding `text`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::Error;

/// Serializable DOM subtree description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Element tag; `None` makes this a text node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Text content (first child for elements)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Attributes, serialized in name order
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,

    /// Light-DOM children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,

    /// Children of an open shadow root attached to this element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Vec<NodeSpec>>,
}

impl NodeSpec {
    /// Element with the given tag
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    /// Text node
    pub fn text_node(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Add an attribute
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set the text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Attach an open shadow root holding `children`
    pub fn shadow(mut self, children: Vec<NodeSpec>) -> Self {
        self.shadow = Some(children);
        self
    }

    /// Load a spec from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::dom(format!("failed to read fixture {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}
