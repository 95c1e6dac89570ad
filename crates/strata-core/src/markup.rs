//! # Markup Module
//!
//! A serde model of an element tree that replays itself into a
//! [`DocumentBuilder`] as start/end element events.
//!
//! ```json
//! {
//!   "name": "svg",
//!   "attributes": { "width": 20, "height": 20 },
//!   "children": [
//!     { "name": "rect", "attributes": { "width": "50%", "height": 10, "fill": "red" } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::builder::DocumentBuilder;
use crate::document::{Document, RenderOptions};
use crate::errors::BuildError;
use crate::style::PropertyBag;

/// Attribute values may be written as JSON strings or numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn properties(&self) -> PropertyBag {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect()
    }

    /// Emits this element and its subtree, depth first.
    pub fn replay(&self, builder: &mut DocumentBuilder<'_>) -> Result<(), BuildError> {
        builder.start_element(&self.name, &self.properties())?;
        for child in &self.children {
            child.replay(builder)?;
        }
        builder.end_element(&self.name)
    }
}

/// Parses a JSON element tree and builds a document from it.
#[instrument(level = "debug", skip_all, fields(bytes = json.len()))]
pub fn load_document(json: &str, options: &RenderOptions) -> Result<Document, BuildError> {
    let tree = ElementNode::from_json(json)?;
    let styles = options.styles();
    let mut builder = DocumentBuilder::new(&styles);
    tree.replay(&mut builder)?;
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_strings_become_properties() {
        let node = ElementNode::from_json(
            r#"{ "name": "rect", "attributes": { "width": 12.5, "fill": "red" } }"#,
        )
        .expect("valid tree");
        let props = node.properties();
        assert_eq!(props.get("width"), Some("12.5"));
        assert_eq!(props.get("fill"), Some("red"));
        assert!(node.children.is_empty());
    }

    #[test]
    fn malformed_json_is_a_build_error() {
        assert!(matches!(
            ElementNode::from_json("{ \"name\": "),
            Err(BuildError::Json(_))
        ));
    }

    #[test]
    fn load_document_builds_root() {
        let doc = load_document(
            r#"{ "name": "svg", "children": [ { "name": "g" } ] }"#,
            &RenderOptions::default(),
        )
        .expect("document");
        assert_eq!(doc.scene.get_node(doc.root).map(|n| n.children.len()), Some(1));
    }
}
