//! RustyTree - XML documents built from parser events
//!
//! A streaming event source tokenizes the input and a tree builder turns its
//! callbacks into an arena of elements:
//!
//! ```text
//! bytes | path | Read ──> EventSource ──> TreeBuilder ──> XmlDocument
//!                              │
//!                              └──────> EventCollector ──> ParseEvent[]
//! ```
//!
//! Entry points:
//! - `parse_bytes`, `parse_path`, `parse_stream` (or the `XmlDocument` constructors)
//! - `collect_events` for the raw callback stream
//! - `parse_batch` for many documents on the rayon pool
//!
//! The same operations are exported to Elixir as NIFs on `RustyTree.Native`.

use rustler::{Binary, Encoder, Env, NifResult, Term};

pub mod batch;
pub mod builder;
pub mod core;
pub mod dom;
pub mod error;
pub mod reader;
pub mod sax;
mod term;

pub use batch::parse_batch;
pub use builder::{parse_bytes, parse_path, parse_stream, TreeBuilder};
pub use crate::core::{Attributes, EventSource, ParserDelegate, SourceOptions, XmlInput};
pub use dom::{DocumentOptions, NodeId, ParserSettings, XmlDocument, XmlElement};
pub use error::{Error, Result, SourceError, SourceErrorKind};
pub use sax::{collect_events, EventCollector, ParseEvent};

use term::{decode_settings, document_to_term, error_to_term, events_to_term};

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Tree Building
// ============================================================================

fn options_from(opts: Term) -> NifResult<DocumentOptions> {
    Ok(DocumentOptions {
        parser_settings: decode_settings(opts)?,
    })
}

/// Wrap a parse result as `{:ok, tree}` or `{:error, reason}`
fn result_to_term<'a>(env: Env<'a>, result: &Result<XmlDocument>) -> NifResult<Term<'a>> {
    match result {
        Ok(doc) => Ok((rustler::types::atom::ok(), document_to_term(env, doc)).encode(env)),
        Err(err) => Ok((rustler::types::atom::error(), error_to_term(env, err)?).encode(env)),
    }
}

/// Parse an XML binary into a tree
#[rustler::nif]
fn parse<'a>(env: Env<'a>, input: Binary<'a>, opts: Term<'a>) -> NifResult<Term<'a>> {
    let options = options_from(opts)?;
    let result = XmlDocument::from_bytes(input.as_slice(), options);
    result_to_term(env, &result)
}

/// Parse an XML file into a tree
#[rustler::nif(schedule = "DirtyIo")]
fn parse_file<'a>(env: Env<'a>, path: String, opts: Term<'a>) -> NifResult<Term<'a>> {
    let options = options_from(opts)?;
    let result = XmlDocument::from_path(&path, options);
    result_to_term(env, &result)
}

// ============================================================================
// Event Stream
// ============================================================================

/// Parse XML and return `{:ok | :error, events}`
#[rustler::nif]
fn parse_events<'a>(env: Env<'a>, input: Binary<'a>, opts: Term<'a>) -> NifResult<Term<'a>> {
    let settings = decode_settings(opts)?;
    let (events, ok) = collect_events(input.as_slice(), &settings);
    let status = if ok {
        rustler::types::atom::ok()
    } else {
        rustler::types::atom::error()
    };
    Ok((status, events_to_term(env, &events)?).encode(env))
}

// ============================================================================
// Batch Parsing
// ============================================================================

/// Parse many binaries in parallel, one result per input in input order
#[rustler::nif(schedule = "DirtyCpu")]
fn parse_many<'a>(env: Env<'a>, inputs: Vec<Binary<'a>>, opts: Term<'a>) -> NifResult<Term<'a>> {
    let settings = decode_settings(opts)?;
    let slices: Vec<&[u8]> = inputs.iter().map(|b| b.as_slice()).collect();
    let results = parse_batch(&slices, &settings);

    let mut list = Term::list_new_empty(env);
    for result in results.iter().rev() {
        list = list.list_prepend(result_to_term(env, result)?);
    }
    Ok(list)
}

// ============================================================================
// NIF Initialization
// ============================================================================

rustler::init!("Elixir.RustyTree.Native");
