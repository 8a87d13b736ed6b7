//! Error types
//!
//! `SourceError` is what the event source hands to `ParserDelegate::fatal_error`.
//! `Error` is what the public parse entry points return.

use thiserror::Error;

/// Result alias for the parse entry points
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed parse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The event source failed without reporting a specific error
    /// (unreadable path or stream, or a failure before any callback)
    #[error("XML parsing failed")]
    ParsingFailed,

    /// First fatal error reported by the event source, passed through unchanged
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl Error {
    /// The captured source error, if this is not the generic failure
    pub fn source_error(&self) -> Option<&SourceError> {
        match self {
            Error::Source(err) => Some(err),
            Error::ParsingFailed => None,
        }
    }
}

/// Fatal well-formedness or input error, with its location in the document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    /// Byte offset into the (UTF-8 converted) input
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, offset: usize, line: u32, column: u32) -> Self {
        SourceError {
            kind,
            offset,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceErrorKind {
    #[error("tag mismatch: <{expected}> closed with </{found}>")]
    MismatchedTag { expected: String, found: String },

    #[error("unexpected end tag </{0}> without matching start tag")]
    UnexpectedEndTag(String),

    #[error("unclosed tag <{0}>")]
    UnclosedTag(String),

    #[error("document has no root element")]
    MissingRootElement,

    #[error("content not allowed after root element")]
    ContentAfterRoot,

    #[error("text content not allowed outside the root element")]
    TextOutsideRoot,

    #[error("duplicate attribute '{0}'")]
    DuplicateAttribute(String),

    #[error("malformed markup: {0}")]
    MalformedMarkup(&'static str),

    #[error("unterminated {0}")]
    Unterminated(&'static str),

    #[error("invalid character reference '&{0};'")]
    InvalidCharRef(String),

    #[error("undeclared entity '&{0};'")]
    UndeclaredEntity(String),

    #[error("entity '{0}' references itself")]
    RecursiveEntity(String),

    #[error("entity expansion exceeds the limit of {0} bytes")]
    EntityExpansionLimit(usize),

    #[error("external entity '{name}' could not be loaded: {reason}")]
    ExternalEntityUnreadable { name: String, reason: String },

    #[error("namespace prefix '{0}' is not bound")]
    UnboundPrefix(String),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

impl SourceErrorKind {
    /// Stable snake_case identifier, used as the Elixir atom for the kind
    pub fn code(&self) -> &'static str {
        match self {
            SourceErrorKind::MismatchedTag { .. } => "mismatched_tag",
            SourceErrorKind::UnexpectedEndTag(_) => "unexpected_end_tag",
            SourceErrorKind::UnclosedTag(_) => "unclosed_tag",
            SourceErrorKind::MissingRootElement => "missing_root_element",
            SourceErrorKind::ContentAfterRoot => "content_after_root",
            SourceErrorKind::TextOutsideRoot => "text_outside_root",
            SourceErrorKind::DuplicateAttribute(_) => "duplicate_attribute",
            SourceErrorKind::MalformedMarkup(_) => "malformed_markup",
            SourceErrorKind::Unterminated(_) => "unterminated",
            SourceErrorKind::InvalidCharRef(_) => "invalid_char_ref",
            SourceErrorKind::UndeclaredEntity(_) => "undeclared_entity",
            SourceErrorKind::RecursiveEntity(_) => "recursive_entity",
            SourceErrorKind::EntityExpansionLimit(_) => "entity_expansion_limit",
            SourceErrorKind::ExternalEntityUnreadable { .. } => "external_entity_unreadable",
            SourceErrorKind::UnboundPrefix(_) => "unbound_prefix",
            SourceErrorKind::InvalidEncoding(_) => "invalid_encoding",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::new(SourceErrorKind::UnclosedTag("root".into()), 6, 1, 7);
        assert_eq!(err.to_string(), "unclosed tag <root> at line 1, column 7");
    }

    #[test]
    fn test_error_is_transparent_over_source() {
        let source = SourceError::new(SourceErrorKind::MissingRootElement, 0, 1, 1);
        let err: Error = source.clone().into();
        assert_eq!(err.to_string(), source.to_string());
        assert_eq!(err.source_error(), Some(&source));
        assert_eq!(Error::ParsingFailed.source_error(), None);
    }
}
