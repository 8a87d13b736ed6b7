//! DOM Module - Arena-based XML Document
//!
//! The tree the builder produces:
//! - Arena allocation for elements
//! - NodeId (u32) indices with parent back-edges stored as plain data
//! - Ordered attribute maps

pub mod document;
pub mod node;
pub mod options;

pub use document::{Descendants, XmlDocument, DOCUMENT_NODE};
pub use node::{NodeId, XmlElement};
pub use options::{DocumentOptions, ParserSettings};
