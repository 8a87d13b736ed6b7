//! Streaming XML event source
//!
//! Tokenizes a whole document and pushes events into a `ParserDelegate`, in
//! document order, on the calling thread:
//!
//! ```text
//! bytes | path | Read ──> EventSource ──> ParserDelegate (TreeBuilder, EventCollector, ...)
//! ```
//!
//! The source owns the XML grammar: it checks that tags nest and match, expands
//! entity and character references, resolves namespaces when asked to, and
//! reports the first well-formedness violation through `fatal_error`, after
//! which it delivers nothing more. `EventSource::parse` returns whether the
//! whole input was consumed without a fatal error.

use super::dtd::{parse_internal_subset, EntityDecl, EntityTable};
use super::encoding::to_utf8;
use super::entities::{decode_char_ref, normalize_attribute_whitespace, predefined_entity, split_reference};
use super::namespace::{split_qname, NamespaceResolver};
use super::scanner::{is_name_start_char, is_whitespace, Scanner};
use crate::error::{SourceError, SourceErrorKind};
use crate::reader::BufferedReader;
use indexmap::IndexMap;
use std::borrow::Cow;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Minimum bytes declared entities may expand to, whatever the input size
const MIN_EXPANSION_BUDGET: usize = 1 << 20;

/// Allowed ratio of entity expansion output to input length
const MAX_AMPLIFICATION: usize = 10;

/// Flat charge for each declared-entity reference, so empty expansions still count
const REFERENCE_COST: usize = 20;

/// Attribute mapping delivered with each start tag, in source order
pub type Attributes = IndexMap<String, String>;

/// Receiver of parsing events
///
/// Implement this trait to consume a document. Element and text callbacks are
/// required; the rest have defaults.
pub trait ParserDelegate {
    /// Called when an element starts (also for the start half of `<a/>`)
    ///
    /// # Arguments
    /// * `name` - Local name with namespace processing on, otherwise the raw tag name
    /// * `namespace_uri` - Resolved namespace (namespace processing only)
    /// * `qualified_name` - Raw `prefix:local` name (namespace processing only)
    /// * `attributes` - Attribute values with references expanded
    fn start_element(
        &mut self,
        name: &str,
        namespace_uri: Option<&str>,
        qualified_name: Option<&str>,
        attributes: &Attributes,
    );

    /// Called when an element ends, with the same names as its start
    fn end_element(&mut self, name: &str, namespace_uri: Option<&str>, qualified_name: Option<&str>);

    /// Called for a fragment of character data. One text run may arrive as
    /// several consecutive calls (split at every reference).
    fn characters(&mut self, text: &str);

    /// Called for the content of a CDATA section. Treated as character data
    /// unless overridden.
    fn cdata(&mut self, text: &str) {
        self.characters(text);
    }

    /// Called before the start tag that declares `prefix` (empty for the default
    /// namespace), when prefix reporting is on
    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) {}

    /// Called after the end tag of the element that declared `prefix`
    fn end_prefix_mapping(&mut self, _prefix: &str) {}

    /// Called at most once per run, with the error that stopped it
    fn fatal_error(&mut self, error: SourceError);
}

/// Flags passed through from `ParserSettings`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceOptions {
    pub process_namespaces: bool,
    pub report_namespace_prefixes: bool,
    pub resolve_external_entities: bool,
}

/// Where the document bytes come from. Exactly one per run.
pub enum XmlInput<'a> {
    Bytes(&'a [u8]),
    Path(PathBuf),
    Stream(Box<dyn Read + 'a>),
}

impl XmlInput<'_> {
    fn describe(&self) -> &'static str {
        match self {
            XmlInput::Bytes(_) => "buffer",
            XmlInput::Path(_) => "path",
            XmlInput::Stream(_) => "stream",
        }
    }
}

/// A configured, single-use event source
///
/// Replacement text of internal entities is delivered as character data:
/// markup inside an entity value (`<!ENTITY e "<b>x</b>">`) becomes the text
/// `<b>x</b>`, not an element. Output from declared entities is capped at
/// ten times the input length (at least 1 MiB); exceeding it is the fatal
/// `EntityExpansionLimit`.
pub struct EventSource<'a> {
    input: XmlInput<'a>,
    options: SourceOptions,
}

impl<'a> EventSource<'a> {
    pub fn new(input: XmlInput<'a>, options: SourceOptions) -> Self {
        EventSource { input, options }
    }

    /// Run the source to completion, returning true if the whole document was
    /// consumed without a fatal error.
    ///
    /// Input that cannot be acquired (unreadable path or stream) fails without
    /// any delegate callback.
    pub fn parse<D: ParserDelegate>(self, delegate: &mut D) -> bool {
        let kind = self.input.describe();
        let (bytes, base_dir): (Cow<'a, [u8]>, Option<PathBuf>) = match self.input {
            XmlInput::Bytes(bytes) => (Cow::Borrowed(bytes), None),
            XmlInput::Path(path) => match std::fs::read(&path) {
                Ok(bytes) => {
                    let base = path.parent().map(Path::to_path_buf);
                    (Cow::Owned(bytes), base)
                }
                Err(e) => {
                    log::warn!("cannot read XML from {}: {}", path.display(), e);
                    return false;
                }
            },
            XmlInput::Stream(reader) => match BufferedReader::new(reader).drain() {
                Ok(bytes) => (Cow::Owned(bytes), None),
                Err(e) => {
                    log::warn!("cannot read XML stream: {}", e);
                    return false;
                }
            },
        };
        log::debug!("tokenizing {} bytes from {}", bytes.len(), kind);

        let utf8 = match to_utf8(&bytes) {
            Ok(utf8) => utf8,
            Err(msg) => {
                delegate.fatal_error(SourceError::new(SourceErrorKind::InvalidEncoding(msg), 0, 1, 1));
                return false;
            }
        };
        let text = match std::str::from_utf8(&utf8) {
            Ok(text) => text,
            Err(e) => {
                let scanner = Scanner::new(&utf8);
                let (line, column) = scanner.line_col(e.valid_up_to());
                delegate.fatal_error(SourceError::new(
                    SourceErrorKind::InvalidEncoding("input is not valid UTF-8".into()),
                    e.valid_up_to(),
                    line,
                    column,
                ));
                return false;
            }
        };

        let mut run = Run::new(text, self.options, base_dir, delegate);
        match run.scan() {
            Ok(()) => true,
            Err(err) => {
                log::debug!("event source stopped: {}", err);
                run.delegate.fatal_error(err);
                false
            }
        }
    }
}

/// Element opened and not yet closed, with what its end event must repeat
struct OpenElement {
    qname: String,
    local: Option<String>,
    namespace_uri: Option<String>,
    declared_prefixes: Vec<String>,
}

/// State of one tokenizing pass over a validated UTF-8 document
struct Run<'i, 'd, D: ParserDelegate> {
    text: &'i str,
    scanner: Scanner<'i>,
    options: SourceOptions,
    base_dir: Option<PathBuf>,
    delegate: &'d mut D,
    open: Vec<OpenElement>,
    namespaces: NamespaceResolver,
    entities: EntityTable,
    /// Entities currently being expanded, for recursion detection
    expanding: Vec<String>,
    /// Bytes charged to declared-entity expansion so far
    expanded_bytes: usize,
    expansion_budget: usize,
    seen_root: bool,
}

impl<'i, 'd, D: ParserDelegate> Run<'i, 'd, D> {
    fn new(text: &'i str, options: SourceOptions, base_dir: Option<PathBuf>, delegate: &'d mut D) -> Self {
        Run {
            text,
            scanner: Scanner::new(text.as_bytes()),
            options,
            base_dir,
            delegate,
            open: Vec::with_capacity(16),
            namespaces: NamespaceResolver::new(),
            entities: EntityTable::new(),
            expanding: Vec::new(),
            expanded_bytes: 0,
            expansion_budget: text.len().saturating_mul(MAX_AMPLIFICATION).max(MIN_EXPANSION_BUDGET),
            seen_root: false,
        }
    }

    fn error(&self, kind: SourceErrorKind, offset: usize) -> SourceError {
        let (line, column) = self.scanner.line_col(offset);
        SourceError::new(kind, offset, line, column)
    }

    fn str_at(&self, start: usize, end: usize) -> &'i str {
        // Delimiters are ASCII, so every cut lands on a char boundary
        &self.text[start..end]
    }

    /// Scan the entire document
    fn scan(&mut self) -> Result<(), SourceError> {
        while let Some(b) = self.scanner.peek() {
            if b == b'<' {
                self.scan_markup()?;
            } else {
                self.scan_text()?;
            }
        }

        if let Some(unclosed) = self.open.last() {
            let kind = SourceErrorKind::UnclosedTag(unclosed.qname.clone());
            return Err(self.error(kind, self.text.len()));
        }
        if !self.seen_root {
            return Err(self.error(SourceErrorKind::MissingRootElement, self.text.len()));
        }
        Ok(())
    }

    /// Scan markup starting with '<'
    fn scan_markup(&mut self) -> Result<(), SourceError> {
        let start = self.scanner.position();

        if self.scanner.starts_with(b"</") {
            self.scanner.advance(2);
            self.scan_end_tag(start)
        } else if self.scanner.starts_with(b"<!--") {
            self.scanner.advance(4);
            let end = self
                .scanner
                .find_seq(b"-->")
                .ok_or_else(|| self.error(SourceErrorKind::Unterminated("comment"), start))?;
            self.scanner.set_position(end + 3);
            Ok(())
        } else if self.scanner.starts_with(b"<![CDATA[") {
            self.scanner.advance(9);
            self.scan_cdata(start)
        } else if self.scanner.starts_with(b"<!DOCTYPE") {
            self.scanner.advance(9);
            self.scan_doctype(start)
        } else if self.scanner.starts_with(b"<?") {
            self.scanner.advance(2);
            self.scan_pi(start)
        } else if self.scanner.peek_at(1).is_some_and(is_name_start_char) {
            self.scanner.advance(1);
            self.scan_start_tag(start)
        } else {
            Err(self.error(SourceErrorKind::MalformedMarkup("invalid character after '<'"), start))
        }
    }

    /// Scan a start or empty-element tag; the scanner sits on the name
    fn scan_start_tag(&mut self, start: usize) -> Result<(), SourceError> {
        if self.open.is_empty() && self.seen_root {
            return Err(self.error(SourceErrorKind::ContentAfterRoot, start));
        }

        let name_start = self.scanner.position();
        self.scanner.read_name();
        let qname = self.str_at(name_start, self.scanner.position());

        let mut raw_attrs: Vec<(&'i str, String)> = Vec::new();
        let is_empty = loop {
            let had_space = self.scanner.skip_whitespace() > 0;
            match self.scanner.peek() {
                Some(b'>') => {
                    self.scanner.advance(1);
                    break false;
                }
                Some(b'/') if self.scanner.peek_at(1) == Some(b'>') => {
                    self.scanner.advance(2);
                    break true;
                }
                Some(c) if is_name_start_char(c) => {
                    if !had_space {
                        let pos = self.scanner.position();
                        return Err(self.error(
                            SourceErrorKind::MalformedMarkup("whitespace required between attributes"),
                            pos,
                        ));
                    }
                    let (name, value) = self.scan_attribute()?;
                    if raw_attrs.iter().any(|(n, _)| *n == name) {
                        return Err(self.error(SourceErrorKind::DuplicateAttribute(name.to_string()), start));
                    }
                    raw_attrs.push((name, value));
                }
                Some(_) => {
                    let pos = self.scanner.position();
                    return Err(self.error(SourceErrorKind::MalformedMarkup("unexpected character in start tag"), pos));
                }
                None => return Err(self.error(SourceErrorKind::Unterminated("start tag"), start)),
            }
        };

        self.seen_root = true;
        let element = self.open_element(qname, raw_attrs, start)?;
        if is_empty {
            self.close_element(element);
        } else {
            self.open.push(element);
        }
        Ok(())
    }

    /// Scan `name = "value"`, returning the raw name and the expanded value
    fn scan_attribute(&mut self) -> Result<(&'i str, String), SourceError> {
        let name_start = self.scanner.position();
        self.scanner.read_name();
        let name = self.str_at(name_start, self.scanner.position());

        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'=') {
            let pos = self.scanner.position();
            return Err(self.error(SourceErrorKind::MalformedMarkup("'=' expected after attribute name"), pos));
        }
        self.scanner.advance(1);
        self.scanner.skip_whitespace();

        let quote = match self.scanner.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => {
                let pos = self.scanner.position();
                return Err(self.error(SourceErrorKind::MalformedMarkup("attribute value must be quoted"), pos));
            }
        };
        self.scanner.advance(1);
        let value_start = self.scanner.position();
        let value_end = self
            .scanner
            .find_byte(quote)
            .ok_or_else(|| self.error(SourceErrorKind::Unterminated("attribute value"), value_start))?;
        self.scanner.set_position(value_end + 1);

        let raw = self.str_at(value_start, value_end);
        if let Some(lt) = memchr::memchr(b'<', raw.as_bytes()) {
            return Err(self.error(
                SourceErrorKind::MalformedMarkup("'<' not allowed in attribute value"),
                value_start + lt,
            ));
        }

        let mut fragments = Vec::new();
        self.expand(raw, value_start, true, &mut fragments)?;
        Ok((name, fragments.concat()))
    }

    /// Apply namespace processing and deliver the start event
    fn open_element(
        &mut self,
        qname: &'i str,
        raw_attrs: Vec<(&'i str, String)>,
        start: usize,
    ) -> Result<OpenElement, SourceError> {
        if !self.options.process_namespaces {
            let attributes: Attributes = raw_attrs.into_iter().map(|(n, v)| (n.to_string(), v)).collect();
            self.delegate.start_element(qname, None, None, &attributes);
            return Ok(OpenElement {
                qname: qname.to_string(),
                local: None,
                namespace_uri: None,
                declared_prefixes: Vec::new(),
            });
        }

        self.namespaces.push_scope();
        let mut declared_prefixes = Vec::new();
        let mut attributes = Attributes::with_capacity(raw_attrs.len());
        for (name, value) in raw_attrs {
            let prefix = match split_qname(name) {
                (None, "xmlns") => Some(""),
                (Some("xmlns"), local) => Some(local),
                _ => None,
            };
            match prefix {
                Some(prefix) => {
                    self.namespaces.declare(prefix, &value);
                    if self.options.report_namespace_prefixes {
                        self.delegate.start_prefix_mapping(prefix, &value);
                    }
                    declared_prefixes.push(prefix.to_string());
                }
                None => {
                    attributes.insert(name.to_string(), value);
                }
            }
        }

        // Attribute prefixes must be bound too; unprefixed attributes have no namespace
        for name in attributes.keys() {
            if let (Some(prefix), _) = split_qname(name) {
                if self.namespaces.resolve(prefix).is_none() {
                    return Err(self.error(SourceErrorKind::UnboundPrefix(prefix.to_string()), start));
                }
            }
        }

        let (prefix, local) = split_qname(qname);
        let namespace_uri = match prefix {
            Some(prefix) => Some(
                self.namespaces
                    .resolve(prefix)
                    .ok_or_else(|| self.error(SourceErrorKind::UnboundPrefix(prefix.to_string()), start))?
                    .to_string(),
            ),
            None => self.namespaces.resolve("").map(str::to_string),
        };

        self.delegate
            .start_element(local, namespace_uri.as_deref(), Some(qname), &attributes);
        Ok(OpenElement {
            qname: qname.to_string(),
            local: Some(local.to_string()),
            namespace_uri,
            declared_prefixes,
        })
    }

    /// Deliver the end event for an element and leave its namespace scope
    fn close_element(&mut self, element: OpenElement) {
        match &element.local {
            Some(local) => {
                self.delegate
                    .end_element(local, element.namespace_uri.as_deref(), Some(&element.qname));
                self.namespaces.pop_scope();
                if self.options.report_namespace_prefixes {
                    for prefix in element.declared_prefixes.iter().rev() {
                        self.delegate.end_prefix_mapping(prefix);
                    }
                }
            }
            None => self.delegate.end_element(&element.qname, None, None),
        }
    }

    /// Scan an end tag; the scanner sits after `</`
    fn scan_end_tag(&mut self, start: usize) -> Result<(), SourceError> {
        let name_start = self.scanner.position();
        if self.scanner.read_name().is_none() {
            return Err(self.error(SourceErrorKind::MalformedMarkup("end tag name expected"), name_start));
        }
        let name = self.str_at(name_start, self.scanner.position());

        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            let pos = self.scanner.position();
            return Err(self.error(SourceErrorKind::MalformedMarkup("'>' expected to close end tag"), pos));
        }
        self.scanner.advance(1);

        match self.open.pop() {
            Some(element) if element.qname == name => {
                self.close_element(element);
                Ok(())
            }
            Some(element) => Err(self.error(
                SourceErrorKind::MismatchedTag {
                    expected: element.qname,
                    found: name.to_string(),
                },
                start,
            )),
            None => Err(self.error(SourceErrorKind::UnexpectedEndTag(name.to_string()), start)),
        }
    }

    /// Scan a CDATA section; the scanner sits after `<![CDATA[`
    fn scan_cdata(&mut self, start: usize) -> Result<(), SourceError> {
        if self.open.is_empty() {
            return Err(self.error(SourceErrorKind::TextOutsideRoot, start));
        }
        let content_start = self.scanner.position();
        let end = self
            .scanner
            .find_seq(b"]]>")
            .ok_or_else(|| self.error(SourceErrorKind::Unterminated("CDATA section"), start))?;
        self.scanner.set_position(end + 3);

        let content = normalize_newlines(self.str_at(content_start, end));
        if !content.is_empty() {
            self.delegate.cdata(&content);
        }
        Ok(())
    }

    /// Scan a processing instruction; the scanner sits after `<?`
    fn scan_pi(&mut self, start: usize) -> Result<(), SourceError> {
        let target_start = self.scanner.position();
        let target = match self.scanner.read_name() {
            Some(target) => target,
            None => {
                return Err(self.error(
                    SourceErrorKind::MalformedMarkup("processing instruction target expected"),
                    target_start,
                ))
            }
        };
        if target.eq_ignore_ascii_case(b"xml") && start != 0 {
            return Err(self.error(
                SourceErrorKind::MalformedMarkup("XML declaration allowed only at the start of the document"),
                start,
            ));
        }

        let end = self
            .scanner
            .find_seq(b"?>")
            .ok_or_else(|| self.error(SourceErrorKind::Unterminated("processing instruction"), start))?;
        self.scanner.set_position(end + 2);
        log::trace!("skipping processing instruction at {}", start);
        Ok(())
    }

    /// Scan a DOCTYPE and load its entity declarations; the scanner sits after `<!DOCTYPE`
    fn scan_doctype(&mut self, start: usize) -> Result<(), SourceError> {
        if self.seen_root {
            return Err(self.error(
                SourceErrorKind::MalformedMarkup("DOCTYPE must come before the root element"),
                start,
            ));
        }

        let unterminated = |run: &Self| run.error(SourceErrorKind::Unterminated("DOCTYPE"), start);
        let mut quote: Option<u8> = None;
        loop {
            let b = self.scanner.peek().ok_or_else(|| unterminated(self))?;
            match (quote, b) {
                (Some(q), _) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(b),
                (None, b'>') => {
                    self.scanner.advance(1);
                    return Ok(());
                }
                (None, b'[') => {
                    self.scanner.advance(1);
                    break;
                }
                _ => {}
            }
            self.scanner.advance(1);
        }

        let subset_start = self.scanner.position();
        let subset_end = self.find_subset_end().ok_or_else(|| unterminated(self))?;
        let subset = self.str_at(subset_start, subset_end).as_bytes();
        parse_internal_subset(subset, &mut self.entities)
            .map_err(|msg| self.error(SourceErrorKind::MalformedMarkup(msg), subset_start))?;
        log::trace!("DOCTYPE declares {} general entities", self.entities.len());

        self.scanner.set_position(subset_end + 1);
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            let pos = self.scanner.position();
            return Err(self.error(SourceErrorKind::MalformedMarkup("'>' expected after DOCTYPE internal subset"), pos));
        }
        self.scanner.advance(1);
        Ok(())
    }

    /// Position of the `]` closing the internal subset, skipping literals and comments
    fn find_subset_end(&self) -> Option<usize> {
        let bytes = self.text.as_bytes();
        let mut pos = self.scanner.position();
        while pos < bytes.len() {
            match bytes[pos] {
                b']' => return Some(pos),
                q @ (b'"' | b'\'') => pos += memchr::memchr(q, &bytes[pos + 1..])? + 2,
                b'<' if bytes[pos..].starts_with(b"<!--") => {
                    pos += memchr::memmem::find(&bytes[pos + 4..], b"-->")? + 7;
                }
                _ => pos += 1,
            }
        }
        None
    }

    /// Scan character data up to the next markup, expanding references
    fn scan_text(&mut self) -> Result<(), SourceError> {
        let start = self.scanner.position();
        let end = self.scanner.find_byte(b'<').unwrap_or(self.text.len());
        self.scanner.set_position(end);
        let raw = self.str_at(start, end);

        if self.open.is_empty() {
            if let Some(offset) = raw.bytes().position(|b| !is_whitespace(b)) {
                return Err(self.error(SourceErrorKind::TextOutsideRoot, start + offset));
            }
            return Ok(());
        }

        let mut fragments = Vec::new();
        self.expand(raw, start, false, &mut fragments)?;
        for fragment in fragments.iter().filter(|f| !f.is_empty()) {
            self.delegate.characters(fragment);
        }
        Ok(())
    }

    /// Split `raw` at its references and push each literal run and each
    /// expansion as its own fragment
    fn expand(
        &mut self,
        raw: &str,
        offset: usize,
        in_attribute: bool,
        fragments: &mut Vec<String>,
    ) -> Result<(), SourceError> {
        let mut rest = raw;
        let mut consumed = 0;
        while let Some(amp) = memchr::memchr(b'&', rest.as_bytes()) {
            let literal = &rest[..amp];
            if !literal.is_empty() {
                self.push_fragment(fragments, literal_fragment(literal, in_attribute), offset)?;
            }

            let ref_offset = offset + consumed + amp;
            let (name, len) = split_reference(&rest.as_bytes()[amp..])
                .ok_or_else(|| self.error(SourceErrorKind::MalformedMarkup("malformed entity reference"), ref_offset))?;
            // Reference names are ASCII-delimited slices of a str
            let name = String::from_utf8_lossy(name).into_owned();
            self.expand_reference(&name, ref_offset, in_attribute, fragments)?;

            rest = &rest[amp + len..];
            consumed += amp + len;
        }
        if !rest.is_empty() {
            self.push_fragment(fragments, literal_fragment(rest, in_attribute), offset)?;
        }
        Ok(())
    }

    /// Push an expanded fragment, charging it to the budget when it comes
    /// from a declared entity
    fn push_fragment(&mut self, fragments: &mut Vec<String>, fragment: String, offset: usize) -> Result<(), SourceError> {
        if !self.expanding.is_empty() {
            self.charge_expansion(fragment.len(), offset)?;
        }
        fragments.push(fragment);
        Ok(())
    }

    fn charge_expansion(&mut self, bytes: usize, offset: usize) -> Result<(), SourceError> {
        self.expanded_bytes = self.expanded_bytes.saturating_add(bytes);
        if self.expanded_bytes > self.expansion_budget {
            log::warn!("entity expansion passed {} bytes", self.expansion_budget);
            return Err(self.error(SourceErrorKind::EntityExpansionLimit(self.expansion_budget), offset));
        }
        Ok(())
    }

    fn expand_reference(
        &mut self,
        name: &str,
        offset: usize,
        in_attribute: bool,
        fragments: &mut Vec<String>,
    ) -> Result<(), SourceError> {
        if let Some(body) = name.strip_prefix('#') {
            let c = decode_char_ref(body.as_bytes())
                .ok_or_else(|| self.error(SourceErrorKind::InvalidCharRef(name.to_string()), offset))?;
            return self.push_fragment(fragments, c.to_string(), offset);
        }
        if let Some(text) = predefined_entity(name.as_bytes()) {
            return self.push_fragment(fragments, text.to_string(), offset);
        }

        let decl = self
            .entities
            .get(name)
            .cloned()
            .ok_or_else(|| self.error(SourceErrorKind::UndeclaredEntity(name.to_string()), offset))?;
        if self.expanding.iter().any(|e| e == name) {
            return Err(self.error(SourceErrorKind::RecursiveEntity(name.to_string()), offset));
        }
        self.charge_expansion(REFERENCE_COST, offset)?;

        match decl {
            EntityDecl::Internal(value) => {
                self.expanding.push(name.to_string());
                let result = self.expand(&value, offset, in_attribute, fragments);
                self.expanding.pop();
                result
            }
            EntityDecl::External { .. } if in_attribute => Err(self.error(
                SourceErrorKind::MalformedMarkup("external entity reference in attribute value"),
                offset,
            )),
            EntityDecl::External { system_id, .. } => {
                if !self.options.resolve_external_entities {
                    log::trace!("not resolving external entity '{}'", name);
                    return Ok(());
                }
                let content = self.load_external(name, &system_id, offset)?;
                self.charge_expansion(content.len(), offset)?;
                fragments.push(content);
                Ok(())
            }
            EntityDecl::Unparsed => Err(self.error(
                SourceErrorKind::MalformedMarkup("unparsed entity reference in content"),
                offset,
            )),
        }
    }

    /// Read an external entity's replacement text from the filesystem
    fn load_external(&self, name: &str, system_id: &str, offset: usize) -> Result<String, SourceError> {
        let system_path = Path::new(system_id.strip_prefix("file://").unwrap_or(system_id));
        let path = match &self.base_dir {
            Some(base) if system_path.is_relative() => base.join(system_path),
            _ => system_path.to_path_buf(),
        };
        log::debug!("resolving external entity '{}' from {}", name, path.display());

        let unreadable = |reason: String| {
            self.error(
                SourceErrorKind::ExternalEntityUnreadable {
                    name: name.to_string(),
                    reason,
                },
                offset,
            )
        };
        let bytes = std::fs::read(&path).map_err(|e| unreadable(e.to_string()))?;
        let utf8 = to_utf8(&bytes).map_err(unreadable)?;
        let content = std::str::from_utf8(&utf8).map_err(|e| unreadable(e.to_string()))?;
        Ok(normalize_newlines(strip_text_declaration(content)).into_owned())
    }
}

fn literal_fragment(literal: &str, in_attribute: bool) -> String {
    let literal = normalize_newlines(literal);
    if in_attribute {
        normalize_attribute_whitespace(&literal).into_owned()
    } else {
        literal.into_owned()
    }
}

/// End-of-line handling: `\r\n` and lone `\r` become `\n`
fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Drop a leading `<?xml ...?>` text declaration from an external entity
fn strip_text_declaration(content: &str) -> &str {
    if content.starts_with("<?xml") {
        if let Some(end) = content.find("?>") {
            return &content[end + 2..];
        }
    }
    content
}
