//! Parser settings carried by a document

use crate::core::SourceOptions;

/// Flags that configure how a document is parsed. Read-only during a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserSettings {
    /// Resolve prefixes, strip them from names and drop `xmlns` attributes
    pub should_process_namespaces: bool,
    /// Deliver prefix mapping events (namespace processing only)
    pub should_report_namespace_prefixes: bool,
    /// Load `SYSTEM` entities from disk instead of skipping their references
    pub should_resolve_external_entities: bool,
    /// Trim surrounding whitespace from element values on close
    pub should_trim_whitespace: bool,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            should_process_namespaces: false,
            should_report_namespace_prefixes: false,
            should_resolve_external_entities: false,
            should_trim_whitespace: true,
        }
    }
}

impl ParserSettings {
    /// The flags passed through to the event source
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            process_namespaces: self.should_process_namespaces,
            report_namespace_prefixes: self.should_report_namespace_prefixes,
            resolve_external_entities: self.should_resolve_external_entities,
        }
    }
}

/// Options owned by an `XmlDocument`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentOptions {
    pub parser_settings: ParserSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ParserSettings::default();
        assert!(!settings.should_process_namespaces);
        assert!(!settings.should_report_namespace_prefixes);
        assert!(!settings.should_resolve_external_entities);
        assert!(settings.should_trim_whitespace);
        assert_eq!(DocumentOptions::default().parser_settings, settings);
    }

    #[test]
    fn test_source_options_skip_trimming() {
        let settings = ParserSettings {
            should_process_namespaces: true,
            should_resolve_external_entities: true,
            ..Default::default()
        };
        assert_eq!(
            settings.source_options(),
            SourceOptions {
                process_namespaces: true,
                report_namespace_prefixes: false,
                resolve_external_entities: true,
            }
        );
    }
}
