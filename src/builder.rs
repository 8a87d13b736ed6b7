//! Tree Builder
//!
//! Turns event source callbacks into an element tree:
//!
//! ```text
//! EventSource ---> TreeBuilder ---> XmlDocument arena
//!                      |
//!                      v
//!               Result<()> (first fatal error wins)
//! ```
//!
//! Open elements are tracked on an explicit stack of `NodeId`s; the current
//! parent is the top of the stack, or the document node when it is empty.

use crate::core::{Attributes, EventSource, ParserDelegate, XmlInput};
use crate::dom::{NodeId, ParserSettings, XmlDocument};
use crate::error::{Error, Result, SourceError};
use std::io::Read;
use std::path::Path;

/// Characters removed from both ends of a value when trimming
const TRIM_CHARS: [char; 4] = [' ', '\t', '\n', '\r'];

/// `ParserDelegate` that appends elements into a document
///
/// Character data goes straight into the open element's value, which stays
/// `None` until a non-empty fragment arrives. CDATA sections count as
/// character data, so `<a><![CDATA[x]]></a>` gives `a` the value `x`; a
/// Foundation `XMLParser` delegate without a CDATA callback would drop it.
pub struct TreeBuilder<'d> {
    document: &'d mut XmlDocument,
    settings: ParserSettings,
    /// Elements opened and not yet closed, innermost last
    stack: Vec<NodeId>,
    /// Element that receives character data; None right after a close
    current_element: Option<NodeId>,
    parse_error: Option<SourceError>,
}

impl<'d> TreeBuilder<'d> {
    pub fn new(document: &'d mut XmlDocument) -> Self {
        let settings = document.parser_settings();
        TreeBuilder {
            document,
            settings,
            stack: Vec::with_capacity(32),
            current_element: None,
            parse_error: None,
        }
    }

    /// Node new elements are attached to
    #[inline]
    pub fn current_parent(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.document.document_id())
    }

    #[inline]
    pub fn current_element(&self) -> Option<NodeId> {
        self.current_element
    }

    pub fn parse_error(&self) -> Option<&SourceError> {
        self.parse_error.as_ref()
    }

    /// Collapse the outcome of a run into the public result
    pub fn finish(self, success: bool) -> Result<()> {
        match (success, self.parse_error) {
            (true, _) => Ok(()),
            (false, Some(err)) => Err(Error::Source(err)),
            (false, None) => Err(Error::ParsingFailed),
        }
    }

    fn run(mut self, input: XmlInput<'_>) -> Result<()> {
        let source = EventSource::new(input, self.settings.source_options());
        let success = source.parse(&mut self);
        self.finish(success)
    }
}

impl ParserDelegate for TreeBuilder<'_> {
    fn start_element(
        &mut self,
        name: &str,
        _namespace_uri: Option<&str>,
        _qualified_name: Option<&str>,
        attributes: &Attributes,
    ) {
        let parent = self.current_parent();
        let id = self.document.add_child(parent, name, attributes.clone());
        self.current_element = Some(id);
        self.stack.push(id);
    }

    fn end_element(&mut self, _name: &str, _namespace_uri: Option<&str>, _qualified_name: Option<&str>) {
        if self.settings.should_trim_whitespace {
            if let Some(id) = self.current_element {
                let trimmed = self
                    .document
                    .value(id)
                    .map(|v| v.trim_matches(TRIM_CHARS.as_slice()).to_string());
                self.document.set_value(id, trimmed);
            }
        }

        self.stack.pop();
        self.current_element = None;
    }

    fn characters(&mut self, text: &str) {
        if let Some(id) = self.current_element {
            self.document.append_value(id, text);
        }
    }

    fn start_prefix_mapping(&mut self, prefix: &str, _uri: &str) {
        log::trace!("ignoring prefix mapping '{}'", prefix);
    }

    fn fatal_error(&mut self, error: SourceError) {
        if self.parse_error.is_none() {
            log::warn!("XML parse error: {}", error);
            self.parse_error = Some(error);
        }
    }
}

/// Parse a buffer into `document`
pub fn parse_bytes(document: &mut XmlDocument, input: &[u8]) -> Result<()> {
    log::debug!("parsing {} bytes", input.len());
    let result = TreeBuilder::new(document).run(XmlInput::Bytes(input));
    log_outcome(document, &result);
    result
}

/// Parse the file at `path` into `document`
pub fn parse_path(document: &mut XmlDocument, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    log::debug!("parsing {}", path.display());
    let result = TreeBuilder::new(document).run(XmlInput::Path(path.to_path_buf()));
    log_outcome(document, &result);
    result
}

/// Parse everything `reader` yields into `document`
pub fn parse_stream<R: Read>(document: &mut XmlDocument, reader: R) -> Result<()> {
    log::debug!("parsing stream");
    let result = TreeBuilder::new(document).run(XmlInput::Stream(Box::new(reader)));
    log_outcome(document, &result);
    result
}

fn log_outcome(document: &XmlDocument, result: &Result<()>) {
    match result {
        Ok(()) => log::debug!("parse finished with {} nodes", document.node_count()),
        Err(Error::ParsingFailed) => log::warn!("XML parsing failed without a source error"),
        Err(err) => log::debug!("parse failed with {} nodes kept: {}", document.node_count(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::DocumentOptions;
    use crate::error::SourceErrorKind;
    use std::io::Cursor;

    fn parse(input: &str) -> (XmlDocument, Result<()>) {
        let mut doc = XmlDocument::new();
        let result = parse_bytes(&mut doc, input.as_bytes());
        (doc, result)
    }

    fn with_settings(settings: ParserSettings) -> XmlDocument {
        XmlDocument::with_options(DocumentOptions {
            parser_settings: settings,
        })
    }

    fn source_error(kind: SourceErrorKind) -> SourceError {
        SourceError::new(kind, 0, 1, 1)
    }

    #[test]
    fn test_element_without_text_has_no_value() {
        let (doc, result) = parse("<a></a>");
        assert!(result.is_ok());
        let root = doc.root().unwrap();
        assert_eq!(doc.name(root), Some("a"));
        assert_eq!(doc.value(root), None);
    }

    #[test]
    fn test_element_without_text_has_no_value_untrimmed() {
        let mut doc = with_settings(ParserSettings {
            should_trim_whitespace: false,
            ..Default::default()
        });
        parse_bytes(&mut doc, b"<a><b/></a>").unwrap();
        let a = doc.root().unwrap();
        assert_eq!(doc.value(a), None);
        assert_eq!(doc.value(doc.child_named(a, "b").unwrap()), None);
    }

    #[test]
    fn test_empty_fragment_keeps_value_absent() {
        let mut doc = XmlDocument::new();
        let mut builder = TreeBuilder::new(&mut doc);
        builder.start_element("a", None, None, &Attributes::new());
        builder.characters("");
        builder.end_element("a", None, None);
        assert!(builder.finish(true).is_ok());
        assert_eq!(doc.value(doc.root().unwrap()), None);
    }

    #[test]
    fn test_many_fragments_accumulate() {
        let count = 50_000;
        let input = format!("<a>{}</a>", "&amp;".repeat(count));
        let (doc, result) = parse(&input);
        assert!(result.is_ok());
        let value = doc.value(doc.root().unwrap()).unwrap();
        assert_eq!(value.len(), count);
        assert!(value.bytes().all(|b| b == b'&'));
    }

    #[test]
    fn test_entity_expansion_limit_surfaces() {
        let mut input = String::from("<!DOCTYPE a [<!ENTITY l0 \"lol\">");
        for level in 1..=9 {
            let body = format!("&l{};", level - 1).repeat(10);
            input.push_str(&format!("<!ENTITY l{level} \"{body}\">"));
        }
        input.push_str("]><a>&l9;</a>");

        let (doc, result) = parse(&input);
        assert!(matches!(
            result.unwrap_err().source_error().map(|e| &e.kind),
            Some(SourceErrorKind::EntityExpansionLimit(_))
        ));
        assert_eq!(doc.value(doc.root().unwrap()), None);
    }

    #[test]
    fn test_fragments_concatenated_then_trimmed() {
        let mut doc = XmlDocument::new();
        let mut builder = TreeBuilder::new(&mut doc);
        builder.start_element("a", None, None, &Attributes::new());
        builder.characters(" foo ");
        builder.characters(" bar ");
        builder.end_element("a", None, None);
        assert!(builder.finish(true).is_ok());

        let root = doc.root().unwrap();
        assert_eq!(doc.value(root), Some("foo  bar"));
    }

    #[test]
    fn test_whitespace_only_value_trims_to_empty() {
        let (doc, _) = parse("<a>  \n\t </a>");
        assert_eq!(doc.value(doc.root().unwrap()), Some(""));
    }

    #[test]
    fn test_no_trimming_when_disabled() {
        let mut doc = with_settings(ParserSettings {
            should_trim_whitespace: false,
            ..Default::default()
        });
        parse_bytes(&mut doc, b"<a> x </a>").unwrap();
        assert_eq!(doc.value(doc.root().unwrap()), Some(" x "));
    }

    #[test]
    fn test_nesting_and_stack_unwinding() {
        let mut doc = XmlDocument::new();
        let mut builder = TreeBuilder::new(&mut doc);
        let none = Attributes::new();

        builder.start_element("A", None, None, &none);
        let a = builder.current_element().unwrap();
        builder.start_element("B", None, None, &none);
        assert_eq!(builder.current_parent(), a + 1);
        builder.end_element("B", None, None);
        assert_eq!(builder.current_parent(), a);
        assert_eq!(builder.current_element(), None);
        builder.start_element("C", None, None, &none);
        builder.end_element("C", None, None);
        builder.end_element("A", None, None);
        assert_eq!(builder.current_parent(), 0);
        assert!(builder.finish(true).is_ok());

        let names: Vec<&str> = doc.children(a).iter().filter_map(|&id| doc.name(id)).collect();
        assert_eq!(names, vec!["B", "C"]);
        assert_eq!(doc.children(doc.document_id()), &[a]);
        for &child in doc.children(a) {
            assert_eq!(doc.parent(child), Some(a));
        }
    }

    #[test]
    fn test_close_on_empty_stack_stays_at_document() {
        let mut doc = XmlDocument::new();
        let mut builder = TreeBuilder::new(&mut doc);
        builder.end_element("x", None, None);
        assert_eq!(builder.current_parent(), 0);
    }

    #[test]
    fn test_text_after_child_goes_nowhere() {
        // After a close, characters have no target until the next start
        let (doc, result) = parse("<a>before<b>inner</b>after</a>");
        assert!(result.is_ok());
        let a = doc.root().unwrap();
        let b = doc.child_named(a, "b").unwrap();
        assert_eq!(doc.value(a), Some("before"));
        assert_eq!(doc.value(b), Some("inner"));
    }

    #[test]
    fn test_first_error_wins() {
        let mut doc = XmlDocument::new();
        let mut builder = TreeBuilder::new(&mut doc);
        builder.fatal_error(source_error(SourceErrorKind::MissingRootElement));
        builder.fatal_error(source_error(SourceErrorKind::ContentAfterRoot));
        assert_eq!(
            builder.parse_error().map(|e| &e.kind),
            Some(&SourceErrorKind::MissingRootElement)
        );

        let err = builder.finish(false).unwrap_err();
        assert_eq!(err, Error::Source(source_error(SourceErrorKind::MissingRootElement)));
    }

    #[test]
    fn test_success_flag_overrides_captured_error() {
        let mut doc = XmlDocument::new();
        let mut builder = TreeBuilder::new(&mut doc);
        builder.fatal_error(source_error(SourceErrorKind::MissingRootElement));
        assert!(builder.finish(true).is_ok());
    }

    #[test]
    fn test_failure_without_error_is_generic() {
        let mut doc = XmlDocument::new();
        assert_eq!(TreeBuilder::new(&mut doc).finish(false), Err(Error::ParsingFailed));
    }

    #[test]
    fn test_nonexistent_path() {
        let mut doc = XmlDocument::new();
        let result = parse_path(&mut doc, "/nonexistent/rustytree/input.xml");
        assert_eq!(result, Err(Error::ParsingFailed));
        assert_eq!(doc.node_count(), 1);
    }

    struct BrokenStream;

    impl Read for BrokenStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away"))
        }
    }

    #[test]
    fn test_unreadable_stream() {
        let mut doc = XmlDocument::new();
        assert_eq!(parse_stream(&mut doc, BrokenStream), Err(Error::ParsingFailed));
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn test_attributes_copied_verbatim() {
        let (doc, result) = parse("<item b=\"2\" a=\"1\" c=\"x &amp; y\"/>");
        assert!(result.is_ok());
        let item = doc.element(doc.root().unwrap()).unwrap();
        let attrs: Vec<(&str, &str)> = item.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(attrs, vec![("b", "2"), ("a", "1"), ("c", "x & y")]);
    }

    #[test]
    fn test_entity_fragments_joined() {
        let (doc, _) = parse("<p>Tom &amp; Jerry &#169; 1940</p>");
        assert_eq!(doc.value(doc.root().unwrap()), Some("Tom & Jerry © 1940"));
    }

    #[test]
    fn test_cdata_is_value() {
        let (doc, _) = parse("<code>  <![CDATA[if a < b { x }]]>  </code>");
        assert_eq!(doc.value(doc.root().unwrap()), Some("if a < b { x }"));
    }

    #[test]
    fn test_namespace_processing() {
        let mut doc = with_settings(ParserSettings {
            should_process_namespaces: true,
            should_report_namespace_prefixes: true,
            ..Default::default()
        });
        parse_bytes(&mut doc, b"<s:root xmlns:s=\"urn:s\" id=\"1\"><s:leaf/></s:root>").unwrap();
        let root = doc.root().unwrap();
        assert_eq!(doc.name(root), Some("root"));
        assert_eq!(doc.attribute(root, "id"), Some("1"));
        assert_eq!(doc.attribute(root, "xmlns:s"), None);
        assert!(doc.child_named(root, "leaf").is_some());
    }

    #[test]
    fn test_namespaces_kept_without_processing() {
        let (doc, _) = parse("<s:root xmlns:s=\"urn:s\"/>");
        let root = doc.root().unwrap();
        assert_eq!(doc.name(root), Some("s:root"));
        assert_eq!(doc.attribute(root, "xmlns:s"), Some("urn:s"));
    }

    #[test]
    fn test_specific_source_errors() {
        let (_, result) = parse("<a>&bogus;</a>");
        assert!(matches!(
            result.unwrap_err().source_error().map(|e| &e.kind),
            Some(SourceErrorKind::UndeclaredEntity(name)) if name == "bogus"
        ));

        let (_, result) = parse("<a><b></a>");
        assert!(matches!(
            result.unwrap_err().source_error().map(|e| &e.kind),
            Some(SourceErrorKind::MismatchedTag { .. })
        ));

        let (_, result) = parse("<a><b></b>");
        assert!(matches!(
            result.unwrap_err().source_error().map(|e| &e.kind),
            Some(SourceErrorKind::UnclosedTag(name)) if name == "a"
        ));
    }

    #[test]
    fn test_partial_tree_kept_after_failure() {
        let (doc, result) = parse("<a><b>one</b><c>two</d></a>");
        assert!(result.is_err());
        let a = doc.root().unwrap();
        assert_eq!(doc.value(doc.child_named(a, "b").unwrap()), Some("one"));
        let c = doc.child_named(a, "c").unwrap();
        assert_eq!(doc.value(c), Some("two"));
    }

    #[test]
    fn test_parse_stream() {
        let mut doc = XmlDocument::new();
        parse_stream(&mut doc, Cursor::new(b"<list><i>1</i><i>2</i></list>".to_vec())).unwrap();
        let list = doc.root().unwrap();
        let values: Vec<&str> = doc.children(list).iter().filter_map(|&i| doc.value(i)).collect();
        assert_eq!(values, vec!["1", "2"]);
    }

    #[test]
    fn test_parse_path_and_external_entity() {
        let dir = std::env::temp_dir().join(format!("rustytree-builder-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("greeting.txt"), "hello").unwrap();
        let path = dir.join("doc.xml");
        std::fs::write(
            &path,
            "<?xml version=\"1.0\"?>\n<!DOCTYPE msg [<!ENTITY g SYSTEM \"greeting.txt\">]>\n<msg>[&g;]</msg>\n",
        )
        .unwrap();

        let skipped = XmlDocument::from_path(&path, DocumentOptions::default()).unwrap();
        let resolved = XmlDocument::from_path(
            &path,
            DocumentOptions {
                parser_settings: ParserSettings {
                    should_resolve_external_entities: true,
                    ..Default::default()
                },
            },
        )
        .unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(skipped.value(skipped.root().unwrap()), Some("[]"));
        assert_eq!(resolved.value(resolved.root().unwrap()), Some("[hello]"));
    }

    #[test]
    fn test_document_constructors() {
        let doc = XmlDocument::from_bytes(b"<r a=\"1\"/>", DocumentOptions::default()).unwrap();
        assert_eq!(doc.attribute(doc.root().unwrap(), "a"), Some("1"));

        let doc = XmlDocument::from_reader(Cursor::new("<r>v</r>"), DocumentOptions::default()).unwrap();
        assert_eq!(doc.value(doc.root().unwrap()), Some("v"));

        assert!(XmlDocument::from_bytes(b"", DocumentOptions::default()).is_err());
    }
}
