//! XML element representation
//!
//! Uses NodeId (u32) for compact node references into the document arena.

use indexmap::IndexMap;

/// Compact node identifier (index into arena)
pub type NodeId = u32;

/// An element in the arena
///
/// The document node is stored the same way with an empty name and no parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Element name (local name when namespaces are processed)
    pub name: String,
    /// Attributes in source order
    pub attributes: IndexMap<String, String>,
    /// Accumulated character data; None when no characters were delivered
    pub value: Option<String>,
    /// Child elements in document order
    pub children: Vec<NodeId>,
    /// Parent node (None for the document node)
    pub parent: Option<NodeId>,
}

impl XmlElement {
    /// Create the document node
    pub fn document() -> Self {
        XmlElement::default()
    }

    /// Create an element attached to `parent`
    pub fn element(name: &str, attributes: IndexMap<String, String>, parent: NodeId) -> Self {
        XmlElement {
            name: name.to_string(),
            attributes,
            value: None,
            children: Vec::new(),
            parent: Some(parent),
        }
    }

    #[inline]
    pub fn is_document(&self) -> bool {
        self.parent.is_none()
    }

    /// Get an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
