//! Inbound frame decoding with bounded reassembly.
//!
//! The socket usually delivers one JSON record per message, but a record can
//! arrive split across messages. Text that does not parse is held and retried
//! together with the next message. The held text is capped; once it grows
//! past the cap the stream is reported corrupted instead of buffering forever.

#[cfg(test)]
#[path = "frame_decoder_test.rs"]
mod frame_decoder_test;

use frames::InboundFrame;
use tracing::{debug, error};

/// Outcome of feeding one raw payload to the decoder.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A complete frame.
    Frame(InboundFrame),
    /// Not parseable yet; `buffered` bytes are held for the next payload.
    Pending { buffered: usize },
    /// The held text passed the cap without becoming parseable.
    Corrupted { buffered: usize },
}

#[derive(Debug)]
pub struct FrameDecoder {
    buffer: String,
    max_buffered_bytes: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self { buffer: String::new(), max_buffered_bytes }
    }

    /// Bytes currently held from unparsed payloads.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, raw: &str) -> Decoded {
        // A payload that parses by itself wins over any stale partial.
        if let Ok(frame) = frames::decode_inbound(raw) {
            if !self.buffer.is_empty() {
                debug!(discarded = self.buffer.len(), "decoder: dropping stale partial frame");
                self.buffer.clear();
            }
            return Decoded::Frame(frame);
        }

        self.buffer.push_str(raw);
        match frames::decode_inbound(&self.buffer) {
            Ok(frame) => {
                debug!(bytes = self.buffer.len(), "decoder: reassembled split frame");
                self.buffer.clear();
                Decoded::Frame(frame)
            }
            Err(e) => {
                let buffered = self.buffer.len();
                if buffered > self.max_buffered_bytes {
                    error!(buffered, limit = self.max_buffered_bytes, error = %e, "decoder: buffer limit exceeded");
                    self.buffer.clear();
                    return Decoded::Corrupted { buffered };
                }
                debug!(buffered, "decoder: holding partial frame");
                Decoded::Pending { buffered }
            }
        }
    }
}
