//! Core XML parsing primitives
//!
//! This module contains the building blocks of the event source:
//! - Scanner: memchr-accelerated delimiter detection and positions
//! - Entities: predefined and numeric character references
//! - DTD: general entity declarations from the internal subset
//! - Encoding: UTF-16 detection and conversion to UTF-8
//! - Namespace: scoped prefix resolution
//! - EventSource: the tokenizer that drives a `ParserDelegate`

pub mod dtd;
pub mod encoding;
pub mod entities;
pub mod event_source;
pub mod namespace;
pub mod scanner;

pub use event_source::{Attributes, EventSource, ParserDelegate, SourceOptions, XmlInput};
