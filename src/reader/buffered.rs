//! Buffered stream reader
//!
//! Reads from any `Read` source through a fixed-size chunk buffer.

use std::io::{ErrorKind, Read};

/// Buffer size for reading chunks
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Chunked reader over a byte stream
pub struct BufferedReader<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    pos: usize,
    end: usize,
    eof: bool,
}

impl<R: Read> BufferedReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        BufferedReader {
            reader,
            buffer: vec![0u8; capacity.max(1)],
            pos: 0,
            end: 0,
            eof: false,
        }
    }

    /// Refill the buffer from the reader. Returns false once the stream is exhausted.
    ///
    /// Interrupted reads are retried; any other I/O error is returned.
    pub fn fill_buffer(&mut self) -> std::io::Result<bool> {
        if self.eof {
            return Ok(false);
        }

        // Compact: move unconsumed data to the start
        if self.pos > 0 {
            self.buffer.copy_within(self.pos..self.end, 0);
            self.end -= self.pos;
            self.pos = 0;
        }

        loop {
            match self.reader.read(&mut self.buffer[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(read) => {
                    self.end += read;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Unconsumed bytes currently held in the buffer
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.pos..self.end]
    }

    /// Consume n bytes from the buffer
    pub fn consume(&mut self, n: usize) {
        self.pos += n.min(self.end - self.pos);
    }

    /// Drain the rest of the stream into one contiguous document buffer
    pub fn drain(mut self) -> std::io::Result<Vec<u8>> {
        let mut document = Vec::new();
        loop {
            let chunk = self.buffered().len();
            document.extend_from_slice(self.buffered());
            self.consume(chunk);
            if !self.fill_buffer()? {
                break;
            }
        }
        log::trace!("drained {} bytes from stream", document.len());
        Ok(document)
    }
}
