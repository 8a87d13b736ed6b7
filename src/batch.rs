//! Parallel batch parsing
//!
//! Uses Rayon to parse many independent documents at once. Each input gets
//! its own document and builder, so parses never share state.

use crate::dom::{DocumentOptions, ParserSettings, XmlDocument};
use crate::error::Result;
use rayon::prelude::*;

/// Parse every input in parallel, keeping input order in the results
pub fn parse_batch(inputs: &[&[u8]], settings: &ParserSettings) -> Vec<Result<XmlDocument>> {
    let options = DocumentOptions {
        parser_settings: *settings,
    };
    log::debug!("parsing batch of {} documents", inputs.len());
    inputs
        .par_iter()
        .map(|input| XmlDocument::from_bytes(input, options))
        .collect()
}
