//! Event Collector
//!
//! Implements `ParserDelegate` to record every event for batch return to Elixir.

use super::events::ParseEvent;
use crate::core::{Attributes, EventSource, ParserDelegate, XmlInput};
use crate::dom::ParserSettings;
use crate::error::SourceError;

/// Delegate that records the events it receives
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<ParseEvent>,
}

impl EventCollector {
    /// Create a new collector
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(256),
        }
    }

    /// Take the collected events
    pub fn take_events(&mut self) -> Vec<ParseEvent> {
        std::mem::take(&mut self.events)
    }

    /// Get the collected events as a slice
    pub fn events(&self) -> &[ParseEvent] {
        &self.events
    }

    /// Get number of collected events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl ParserDelegate for EventCollector {
    fn start_element(
        &mut self,
        name: &str,
        namespace_uri: Option<&str>,
        qualified_name: Option<&str>,
        attributes: &Attributes,
    ) {
        self.events.push(ParseEvent::StartElement {
            name: name.to_string(),
            namespace_uri: namespace_uri.map(str::to_string),
            qualified_name: qualified_name.map(str::to_string),
            attributes: attributes.clone(),
        });
    }

    fn end_element(&mut self, name: &str, namespace_uri: Option<&str>, qualified_name: Option<&str>) {
        self.events.push(ParseEvent::EndElement {
            name: name.to_string(),
            namespace_uri: namespace_uri.map(str::to_string),
            qualified_name: qualified_name.map(str::to_string),
        });
    }

    fn characters(&mut self, text: &str) {
        self.events.push(ParseEvent::Characters(text.to_string()));
    }

    fn cdata(&mut self, text: &str) {
        self.events.push(ParseEvent::CData(text.to_string()));
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) {
        self.events.push(ParseEvent::StartPrefixMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
    }

    fn end_prefix_mapping(&mut self, prefix: &str) {
        self.events.push(ParseEvent::EndPrefixMapping {
            prefix: prefix.to_string(),
        });
    }

    fn fatal_error(&mut self, error: SourceError) {
        self.events.push(ParseEvent::FatalError(error));
    }
}

/// Parse input and return the recorded events with the source's success flag
pub fn collect_events(input: &[u8], settings: &ParserSettings) -> (Vec<ParseEvent>, bool) {
    let mut collector = EventCollector::new();
    let ok = EventSource::new(XmlInput::Bytes(input), settings.source_options()).parse(&mut collector);
    log::debug!("collected {} events (success: {})", collector.event_count(), ok);
    (collector.take_events(), ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorKind;

    #[test]
    fn test_simple_parse() {
        let (events, ok) = collect_events(b"<root><child/></root>", &ParserSettings::default());
        assert!(ok);
        assert_eq!(events.len(), 4); // start root, start+end child, end root
        assert!(events[0].is_start_element());
        assert!(events[2].is_end_element());
        assert_eq!(events[2].element_name(), Some("child"));
    }

    #[test]
    fn test_fragmented_text() {
        let (events, ok) = collect_events(b"<a>x&lt;y</a>", &ParserSettings::default());
        assert!(ok);
        let texts: Vec<&str> = events.iter().filter_map(ParseEvent::text).collect();
        assert_eq!(texts, vec!["x", "<", "y"]);
    }

    #[test]
    fn test_with_attributes() {
        let (events, _) = collect_events(b"<root id=\"1\" name=\"test\"/>", &ParserSettings::default());
        assert_eq!(events.len(), 2); // start+end (empty element)

        if let ParseEvent::StartElement { attributes, .. } = &events[0] {
            assert_eq!(attributes.len(), 2);
            assert_eq!(attributes.get("name").map(String::as_str), Some("test"));
        } else {
            panic!("Expected StartElement");
        }
    }

    #[test]
    fn test_prefix_mappings() {
        let settings = ParserSettings {
            should_process_namespaces: true,
            should_report_namespace_prefixes: true,
            ..Default::default()
        };
        let (events, ok) = collect_events(b"<x:a xmlns:x=\"urn:x\"/>", &settings);
        assert!(ok);
        assert_eq!(
            events.first(),
            Some(&ParseEvent::StartPrefixMapping {
                prefix: "x".into(),
                uri: "urn:x".into()
            })
        );
        assert_eq!(
            events[1],
            ParseEvent::StartElement {
                name: "a".into(),
                namespace_uri: Some("urn:x".into()),
                qualified_name: Some("x:a".into()),
                attributes: Attributes::new(),
            }
        );
        assert_eq!(events.last(), Some(&ParseEvent::EndPrefixMapping { prefix: "x".into() }));
    }

    #[test]
    fn test_error_is_last_event() {
        let (events, ok) = collect_events(b"<a><b></a>", &ParserSettings::default());
        assert!(!ok);
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[2],
            ParseEvent::FatalError(err) if matches!(err.kind, SourceErrorKind::MismatchedTag { .. })
        ));
    }
}
