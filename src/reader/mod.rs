//! Byte-stream input for the event source
//!
//! Streams are drained chunk by chunk into one buffer before tokenizing.

pub mod buffered;

pub use buffered::BufferedReader;
