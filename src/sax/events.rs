//! Parse Event Types
//!
//! Owned copies of the callbacks a `ParserDelegate` receives, in the order
//! the event source delivered them.

use crate::core::Attributes;
use crate::error::SourceError;

/// A recorded parsing event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// Start of an element
    StartElement {
        /// Local name with namespace processing on, otherwise the raw name
        name: String,
        namespace_uri: Option<String>,
        qualified_name: Option<String>,
        attributes: Attributes,
    },

    /// End of an element
    EndElement {
        name: String,
        namespace_uri: Option<String>,
        qualified_name: Option<String>,
    },

    /// One fragment of character data
    Characters(String),

    /// CDATA section content
    CData(String),

    /// Namespace prefix coming into scope
    StartPrefixMapping { prefix: String, uri: String },

    /// Namespace prefix going out of scope
    EndPrefixMapping { prefix: String },

    /// The error that stopped the run
    FatalError(SourceError),
}

impl ParseEvent {
    /// Check if this is a start element event
    #[inline]
    pub fn is_start_element(&self) -> bool {
        matches!(self, ParseEvent::StartElement { .. })
    }

    /// Check if this is an end element event
    #[inline]
    pub fn is_end_element(&self) -> bool {
        matches!(self, ParseEvent::EndElement { .. })
    }

    /// Check if this is a text event (characters or CDATA)
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, ParseEvent::Characters(_) | ParseEvent::CData(_))
    }

    /// Get the element name if this is a start or end element
    pub fn element_name(&self) -> Option<&str> {
        match self {
            ParseEvent::StartElement { name, .. } | ParseEvent::EndElement { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Get the text if this is a characters or CDATA event
    pub fn text(&self) -> Option<&str> {
        match self {
            ParseEvent::Characters(text) | ParseEvent::CData(text) => Some(text),
            _ => None,
        }
    }
}
