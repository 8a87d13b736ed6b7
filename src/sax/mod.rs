//! Event Module
//!
//! Records the raw callback stream instead of building a tree:
//!
//! ```text
//! EventSource ---> EventCollector ---> ParseEvent[]
//!                        |
//!                        v
//!                  Elixir Terms (via NIF)
//! ```
//!
//! Useful for seeing exactly how text is fragmented at references and where
//! namespace prefix mappings fall.

pub mod collector;
pub mod events;

pub use collector::{collect_events, EventCollector};
pub use events::ParseEvent;
