//! XML Document - Arena-based element tree
//!
//! Efficient storage with:
//! - Arena allocation for elements
//! - NodeId indices for traversal
//! - A document node at index 0 that owns the root element

use super::node::{NodeId, XmlElement};
use super::options::{DocumentOptions, ParserSettings};
use crate::error::Result;
use indexmap::IndexMap;
use std::io::Read;
use std::path::Path;

/// Id of the document node
pub const DOCUMENT_NODE: NodeId = 0;

/// An XML document stored in arena format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    options: DocumentOptions,
    /// Arena of elements; index 0 is the document node
    nodes: Vec<XmlElement>,
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    /// Create an empty document with default options
    pub fn new() -> Self {
        Self::with_options(DocumentOptions::default())
    }

    /// Create an empty document
    pub fn with_options(options: DocumentOptions) -> Self {
        XmlDocument {
            options,
            nodes: vec![XmlElement::document()],
        }
    }

    /// Parse a buffer into a new document
    pub fn from_bytes(input: &[u8], options: DocumentOptions) -> Result<Self> {
        let mut doc = Self::with_options(options);
        doc.parse_bytes(input)?;
        Ok(doc)
    }

    /// Parse a file into a new document
    pub fn from_path(path: impl AsRef<Path>, options: DocumentOptions) -> Result<Self> {
        let mut doc = Self::with_options(options);
        doc.parse_path(path)?;
        Ok(doc)
    }

    /// Parse a byte stream into a new document
    pub fn from_reader<R: Read>(reader: R, options: DocumentOptions) -> Result<Self> {
        let mut doc = Self::with_options(options);
        doc.parse_stream(reader)?;
        Ok(doc)
    }

    /// Parse a buffer, appending to this document. On error the partial tree stays.
    pub fn parse_bytes(&mut self, input: &[u8]) -> Result<()> {
        crate::builder::parse_bytes(self, input)
    }

    /// Parse a file, appending to this document
    pub fn parse_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        crate::builder::parse_path(self, path)
    }

    /// Parse a byte stream, appending to this document
    pub fn parse_stream<R: Read>(&mut self, reader: R) -> Result<()> {
        crate::builder::parse_stream(self, reader)
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    #[inline]
    pub fn parser_settings(&self) -> ParserSettings {
        self.options.parser_settings
    }

    #[inline]
    pub fn document_id(&self) -> NodeId {
        DOCUMENT_NODE
    }

    /// First element child of the document node
    pub fn root(&self) -> Option<NodeId> {
        self.children(DOCUMENT_NODE).first().copied()
    }

    /// Get an element by ID
    #[inline]
    pub fn element(&self, id: NodeId) -> Option<&XmlElement> {
        self.nodes.get(id as usize)
    }

    /// Get element name (empty for the document node)
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// Get element value; None when absent or when the element has no text
    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.element(id)?.value.as_deref()
    }

    /// Get attribute value by name
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attribute(name)
    }

    /// Children of a node in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    /// Parent of a node; None for the document node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.element(id)?.parent
    }

    /// First child of `id` with the given name
    pub fn child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.name(child) == Some(name))
    }

    /// Append a new element under `parent` and return its ID
    ///
    /// An unknown parent falls back to the document node.
    pub fn add_child(&mut self, parent: NodeId, name: &str, attributes: IndexMap<String, String>) -> NodeId {
        let parent = if (parent as usize) < self.nodes.len() {
            parent
        } else {
            DOCUMENT_NODE
        };
        let id = self.nodes.len() as NodeId;
        self.nodes.push(XmlElement::element(name, attributes, parent));
        self.nodes[parent as usize].children.push(id);
        id
    }

    /// Replace an element's value
    pub fn set_value(&mut self, id: NodeId, value: Option<String>) {
        if let Some(element) = self.nodes.get_mut(id as usize) {
            element.value = value;
        }
    }

    /// Append text to an element's value. An empty fragment leaves it untouched,
    /// so the value only becomes `Some` once there is text.
    pub fn append_value(&mut self, id: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(element) = self.nodes.get_mut(id as usize) {
            element.value.get_or_insert_with(String::new).push_str(text);
        }
    }

    /// Number of nodes including the document node
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth-first iteration over `id` and everything below it
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let stack = if self.element(id).is_some() { vec![id] } else { Vec::new() };
        Descendants { doc: self, stack }
    }
}

/// Pre-order iterator over a subtree
pub struct Descendants<'a> {
    doc: &'a XmlDocument,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.doc.children(id).iter().rev());
        Some(id)
    }
}
