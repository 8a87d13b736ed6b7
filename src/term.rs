//! Elixir Term Conversion Utilities
//!
//! Converts built trees, recorded events and errors to Elixir terms, and
//! decodes the options map passed to the NIFs.

use crate::dom::{NodeId, ParserSettings, XmlDocument};
use crate::error::{Error, SourceError};
use crate::sax::ParseEvent;
use rustler::types::atom::{nil, Atom};
use rustler::{Encoder, Env, NewBinary, NifResult, Term};

// Pre-defined atoms for efficiency - created once at compile time
rustler::atoms! {
    element,
    start_element,
    end_element,
    characters,
    cdata,
    start_prefix_mapping,
    end_prefix_mapping,
    fatal_error,
    parsing_failed,
    source_error,
    process_namespaces,
    report_namespace_prefixes,
    resolve_external_entities,
    trim_whitespace,
}

/// Decode `%{process_namespaces: bool, ...}`; missing keys keep their defaults
pub fn decode_settings(opts: Term) -> NifResult<ParserSettings> {
    if !opts.is_map() {
        return Err(rustler::Error::BadArg);
    }
    let defaults = ParserSettings::default();
    Ok(ParserSettings {
        should_process_namespaces: flag(opts, process_namespaces(), defaults.should_process_namespaces)?,
        should_report_namespace_prefixes: flag(
            opts,
            report_namespace_prefixes(),
            defaults.should_report_namespace_prefixes,
        )?,
        should_resolve_external_entities: flag(
            opts,
            resolve_external_entities(),
            defaults.should_resolve_external_entities,
        )?,
        should_trim_whitespace: flag(opts, trim_whitespace(), defaults.should_trim_whitespace)?,
    })
}

fn flag(opts: Term, key: Atom, default: bool) -> NifResult<bool> {
    match opts.map_get(key) {
        Ok(value) => value.decode(),
        Err(_) => Ok(default),
    }
}

/// Convert a document to its root element term, or nil when it has none
pub fn document_to_term<'a>(env: Env<'a>, doc: &XmlDocument) -> Term<'a> {
    match doc.root() {
        Some(root) => element_to_term(env, doc, root),
        None => nil().encode(env),
    }
}

/// Convert an element to `{:element, name, attrs, value, children}`
pub fn element_to_term<'a>(env: Env<'a>, doc: &XmlDocument, id: NodeId) -> Term<'a> {
    let node = match doc.element(id) {
        Some(node) => node,
        None => return nil().encode(env),
    };

    // Build lists in reverse so prepending keeps document order
    let mut attrs = Term::list_new_empty(env);
    for (name, value) in node.attributes.iter().rev() {
        let tuple = (str_to_binary(env, name), str_to_binary(env, value));
        attrs = attrs.list_prepend(tuple.encode(env));
    }

    let mut children = Term::list_new_empty(env);
    for &child in node.children.iter().rev() {
        children = children.list_prepend(element_to_term(env, doc, child));
    }

    let value = opt_binary(env, node.value.as_deref());
    (element(), str_to_binary(env, &node.name), attrs, value, children).encode(env)
}

/// Convert an error to `:parsing_failed` or `{:source_error, kind, message, line, column}`
pub fn error_to_term<'a>(env: Env<'a>, error: &Error) -> NifResult<Term<'a>> {
    match error {
        Error::ParsingFailed => Ok(parsing_failed().encode(env)),
        Error::Source(err) => source_error_to_term(env, err),
    }
}

fn source_error_to_term<'a>(env: Env<'a>, err: &SourceError) -> NifResult<Term<'a>> {
    let kind = Atom::from_str(env, err.kind.code())?;
    let message = str_to_binary(env, &err.kind.to_string());
    Ok((source_error(), kind, message, err.line, err.column).encode(env))
}

/// Convert recorded events to a list of tagged tuples
pub fn events_to_term<'a>(env: Env<'a>, events: &[ParseEvent]) -> NifResult<Term<'a>> {
    let mut list = Term::list_new_empty(env);
    for event in events.iter().rev() {
        list = list.list_prepend(event_to_term(env, event)?);
    }
    Ok(list)
}

/// Convert a single event to an Elixir term
pub fn event_to_term<'a>(env: Env<'a>, event: &ParseEvent) -> NifResult<Term<'a>> {
    let term = match event {
        ParseEvent::StartElement {
            name,
            namespace_uri,
            qualified_name,
            attributes,
        } => {
            let mut attrs = Term::list_new_empty(env);
            for (k, v) in attributes.iter().rev() {
                let tuple = (str_to_binary(env, k), str_to_binary(env, v));
                attrs = attrs.list_prepend(tuple.encode(env));
            }
            (
                start_element(),
                str_to_binary(env, name),
                opt_binary(env, namespace_uri.as_deref()),
                opt_binary(env, qualified_name.as_deref()),
                attrs,
            )
                .encode(env)
        }
        ParseEvent::EndElement {
            name,
            namespace_uri,
            qualified_name,
        } => (
            end_element(),
            str_to_binary(env, name),
            opt_binary(env, namespace_uri.as_deref()),
            opt_binary(env, qualified_name.as_deref()),
        )
            .encode(env),
        ParseEvent::Characters(text) => (characters(), str_to_binary(env, text)).encode(env),
        ParseEvent::CData(text) => (cdata(), str_to_binary(env, text)).encode(env),
        ParseEvent::StartPrefixMapping { prefix, uri } => {
            (start_prefix_mapping(), str_to_binary(env, prefix), str_to_binary(env, uri)).encode(env)
        }
        ParseEvent::EndPrefixMapping { prefix } => {
            (end_prefix_mapping(), str_to_binary(env, prefix)).encode(env)
        }
        ParseEvent::FatalError(err) => (fatal_error(), source_error_to_term(env, err)?).encode(env),
    };
    Ok(term)
}

/// Convert a string to a binary term (more efficient than .encode())
#[inline]
fn str_to_binary<'a>(env: Env<'a>, s: &str) -> Term<'a> {
    let bytes = s.as_bytes();
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}

#[inline]
fn opt_binary<'a>(env: Env<'a>, s: Option<&str>) -> Term<'a> {
    match s {
        Some(s) => str_to_binary(env, s),
        None => nil().encode(env),
    }
}
