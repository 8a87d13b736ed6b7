//! DOCTYPE internal subset: general entity declarations
//!
//! Only `<!ENTITY>` declarations matter to the event source; element, attribute-list
//! and notation declarations are skipped over without validation.

use super::scanner::{is_name_char, is_name_start_char, is_whitespace};
use std::collections::HashMap;

/// A declared general entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityDecl {
    /// Replacement text, kept unexpanded until the entity is referenced
    Internal(String),
    /// Parsed external entity, resolved through its system identifier
    External {
        system_id: String,
        public_id: Option<String>,
    },
    /// NDATA entity; never legal in content
    Unparsed,
}

/// General entities declared in the internal subset
#[derive(Debug, Default)]
pub struct EntityTable {
    entities: HashMap<String, EntityDecl>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity. The first declaration wins.
    pub fn declare(&mut self, name: String, decl: EntityDecl) {
        self.entities.entry(name).or_insert(decl);
    }

    pub fn get(&self, name: &str) -> Option<&EntityDecl> {
        self.entities.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Parse the internal subset (the text between `[` and `]` of a DOCTYPE)
pub fn parse_internal_subset(subset: &[u8], table: &mut EntityTable) -> Result<(), &'static str> {
    let mut pos = 0;

    while pos < subset.len() {
        let rest = &subset[pos..];
        if is_whitespace(rest[0]) {
            pos += 1;
        } else if rest.starts_with(b"<!--") {
            let end = memchr::memmem::find(&rest[4..], b"-->").ok_or("unterminated comment in DOCTYPE")?;
            pos += 4 + end + 3;
        } else if rest.starts_with(b"<?") {
            let end = memchr::memmem::find(&rest[2..], b"?>").ok_or("unterminated processing instruction in DOCTYPE")?;
            pos += 2 + end + 2;
        } else if rest.starts_with(b"<!ENTITY") {
            pos += 8;
            pos = parse_entity_decl(subset, pos, table)?;
        } else if rest.starts_with(b"<!") {
            pos += skip_declaration(rest).ok_or("unterminated declaration in DOCTYPE")?;
        } else if rest[0] == b'%' {
            // Parameter entity reference; its expansion is not processed
            let semi = memchr::memchr(b';', rest).ok_or("malformed parameter entity reference")?;
            pos += semi + 1;
        } else {
            return Err("unexpected content in DOCTYPE internal subset");
        }
    }

    Ok(())
}

/// Parse the remainder of `<!ENTITY ...>` starting after the keyword, returning
/// the position just past the closing `>`
fn parse_entity_decl(input: &[u8], mut pos: usize, table: &mut EntityTable) -> Result<usize, &'static str> {
    let ws = skip_ws(input, pos);
    if ws == pos {
        return Err("whitespace required after '<!ENTITY'");
    }
    pos = ws;

    let is_parameter = input.get(pos) == Some(&b'%');
    if is_parameter {
        pos = skip_ws(input, pos + 1);
    }

    let (name, after_name) = read_name(input, pos).ok_or("entity name expected")?;
    pos = skip_ws(input, after_name);

    let decl = match input.get(pos) {
        Some(b'"') | Some(b'\'') => {
            let (value, after) = read_literal(input, pos)?;
            pos = after;
            EntityDecl::Internal(value)
        }
        _ if input[pos..].starts_with(b"SYSTEM") => {
            pos = skip_ws(input, pos + 6);
            let (system_id, after) = read_literal(input, pos)?;
            pos = after;
            EntityDecl::External { system_id, public_id: None }
        }
        _ if input[pos..].starts_with(b"PUBLIC") => {
            pos = skip_ws(input, pos + 6);
            let (public_id, after) = read_literal(input, pos)?;
            pos = skip_ws(input, after);
            let (system_id, after) = read_literal(input, pos)?;
            pos = after;
            EntityDecl::External { system_id, public_id: Some(public_id) }
        }
        _ => return Err("entity value or external identifier expected"),
    };

    pos = skip_ws(input, pos);
    let decl = if input[pos..].starts_with(b"NDATA") {
        if !matches!(decl, EntityDecl::External { .. }) {
            return Err("NDATA is only allowed on external entities");
        }
        let (_, after) = read_name(input, skip_ws(input, pos + 5)).ok_or("notation name expected")?;
        pos = skip_ws(input, after);
        EntityDecl::Unparsed
    } else {
        decl
    };

    if input.get(pos) != Some(&b'>') {
        return Err("'>' expected to close entity declaration");
    }

    if !is_parameter {
        table.declare(name, decl);
    }
    Ok(pos + 1)
}

/// Length of a `<!...>` declaration, honoring quoted literals
fn skip_declaration(input: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in input.iter().enumerate().skip(2) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

fn skip_ws(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && is_whitespace(input[pos]) {
        pos += 1;
    }
    pos
}

fn read_name(input: &[u8], pos: usize) -> Option<(String, usize)> {
    if !is_name_start_char(*input.get(pos)?) {
        return None;
    }
    let mut end = pos + 1;
    while end < input.len() && is_name_char(input[end]) {
        end += 1;
    }
    let name = std::str::from_utf8(&input[pos..end]).ok()?;
    Some((name.to_string(), end))
}

fn read_literal(input: &[u8], pos: usize) -> Result<(String, usize), &'static str> {
    let quote = match input.get(pos) {
        Some(&q @ (b'"' | b'\'')) => q,
        _ => return Err("quoted literal expected"),
    };
    let len = memchr::memchr(quote, &input[pos + 1..]).ok_or("unterminated literal")?;
    let value = std::str::from_utf8(&input[pos + 1..pos + 1 + len]).map_err(|_| "literal is not valid UTF-8")?;
    Ok((value.to_string(), pos + 1 + len + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_entity() {
        let mut table = EntityTable::new();
        parse_internal_subset(b"<!ENTITY company \"Acme &amp; Co\">", &mut table).unwrap();
        assert_eq!(table.get("company"), Some(&EntityDecl::Internal("Acme &amp; Co".into())));
    }

    #[test]
    fn test_external_entities() {
        let mut table = EntityTable::new();
        let subset = b"
            <!ENTITY chap SYSTEM 'chapter1.xml'>
            <!ENTITY pub PUBLIC \"-//X//EN\" \"pub.xml\">
            <!ENTITY logo SYSTEM \"logo.gif\" NDATA gif>
        ";
        parse_internal_subset(subset, &mut table).unwrap();
        assert_eq!(
            table.get("chap"),
            Some(&EntityDecl::External { system_id: "chapter1.xml".into(), public_id: None })
        );
        assert!(matches!(table.get("pub"), Some(EntityDecl::External { public_id: Some(_), .. })));
        assert_eq!(table.get("logo"), Some(&EntityDecl::Unparsed));
    }

    #[test]
    fn test_first_declaration_wins() {
        let mut table = EntityTable::new();
        parse_internal_subset(b"<!ENTITY e 'one'><!ENTITY e 'two'>", &mut table).unwrap();
        assert_eq!(table.get("e"), Some(&EntityDecl::Internal("one".into())));
    }

    #[test]
    fn test_skips_other_declarations() {
        let mut table = EntityTable::new();
        let subset = b"<!ELEMENT a (#PCDATA)><!ATTLIST a x CDATA \"a>b\"><!-- <!ENTITY no 'x'> --><!ENTITY % pe 'p'>%pe;<!ENTITY yes 'y'>";
        parse_internal_subset(subset, &mut table).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("yes").is_some());
        assert!(table.get("pe").is_none());
    }

    #[test]
    fn test_malformed_entity() {
        let mut table = EntityTable::new();
        assert!(parse_internal_subset(b"<!ENTITY e 'unterminated>", &mut table).is_err());
        assert!(parse_internal_subset(b"<!ENTITYe 'x'>", &mut table).is_err());
    }
}
