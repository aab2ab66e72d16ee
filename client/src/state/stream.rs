//! Per-request stream session and completion reconciler.
//!
//! DESIGN
//! ======
//! One `StreamSession` exists per dispatched prompt. It owns the frame
//! decoder, the accumulated answer text, and the latest citation set, and
//! moves through `Created → Streaming → Completed` exactly once. A session
//! is never reused; the next prompt gets a fresh one with a new id.
//!
//! COMPLETION
//! ==========
//! The first terminal condition wins: an `end` or `error` frame, a `text`
//! reply, decoder corruption, or an interruption reported from outside
//! (connection loss, timeout, cancel). That condition yields the single
//! [`StreamCompletion`] for the session. Everything after it, including late
//! `sources` frames, is ignored.

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;

use frames::{InboundFrame, MessageEntry, Source};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::net::frame_decoder::{Decoded, FrameDecoder};

/// Committed text for an error completion with nothing else to show.
pub const DEFAULT_ERROR_TEXT: &str = "An error occurred while generating the response.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    Created,
    Streaming,
    Completed,
}

/// Terminal conditions raised outside the frame stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interruption {
    ConnectionClosed,
    ConnectionError,
    Corrupted,
    TimedOut,
    Cancelled,
}

impl Interruption {
    /// Error message recorded on the completion.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::ConnectionClosed => "connection closed",
            Self::ConnectionError => "connection error",
            Self::Corrupted => "malformed response stream",
            Self::TimedOut => "request timed out",
            Self::Cancelled => "request cancelled",
        }
    }
}

enum Terminal {
    End,
    Error(String),
    Interrupted(Interruption),
}

/// The one completion signal a session emits.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamCompletion {
    pub stream_id: Uuid,
    pub final_text: String,
    pub sources: Vec<Source>,
    pub is_error: bool,
    pub error_message: Option<String>,
}

impl StreamCompletion {
    /// False only for a clean completion with no text and no citations.
    #[must_use]
    pub fn should_commit(&self) -> bool {
        self.is_error || !self.final_text.is_empty() || !self.sources.is_empty()
    }

    /// Text that lands in history. Never empty on an error path.
    #[must_use]
    pub fn committed_text(&self) -> &str {
        if !self.final_text.is_empty() {
            return &self.final_text;
        }
        if self.is_error {
            return self
                .error_message
                .as_deref()
                .filter(|msg| !msg.is_empty())
                .unwrap_or(DEFAULT_ERROR_TEXT);
        }
        ""
    }

    /// The BOT/TEXT entry to commit, or `None` when there is nothing to keep.
    #[must_use]
    pub fn to_entry(&self, include_sources: bool, timestamp: i64) -> Option<MessageEntry> {
        if !self.should_commit() {
            return None;
        }
        let sources = if include_sources { self.sources.clone() } else { Vec::new() };
        Some(MessageEntry::bot_text(self.committed_text(), sources, timestamp))
    }
}

pub struct StreamSession {
    id: Uuid,
    phase: StreamPhase,
    decoder: FrameDecoder,
    text: String,
    sources: Vec<Source>,
    awaiting_first_output: bool,
    started_at_ms: i64,
    interruption: Option<Interruption>,
}

impl StreamSession {
    #[must_use]
    pub fn new(max_buffered_bytes: usize, started_at_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: StreamPhase::Created,
            decoder: FrameDecoder::new(max_buffered_bytes),
            text: String::new(),
            sources: Vec::new(),
            awaiting_first_output: true,
            started_at_ms,
            interruption: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.phase == StreamPhase::Completed
    }

    /// Answer text received so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// True until the first visible output arrives.
    #[must_use]
    pub fn awaiting_first_output(&self) -> bool {
        self.awaiting_first_output
    }

    #[must_use]
    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    /// The outside condition that ended the session, if one did.
    #[must_use]
    pub fn interruption(&self) -> Option<Interruption> {
        self.interruption
    }

    /// Whether the session has been in flight for at least `timeout_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64, timeout_ms: i64) -> bool {
        !self.is_completed() && now_ms.saturating_sub(self.started_at_ms) >= timeout_ms
    }

    /// Feed one raw inbound payload.
    pub fn ingest(&mut self, raw: &str) -> Option<StreamCompletion> {
        if self.is_completed() {
            debug!(stream_id = %self.id, "stream: payload after completion ignored");
            return None;
        }

        match self.decoder.push(raw) {
            Decoded::Frame(frame) => self.apply(frame),
            Decoded::Pending { buffered } => {
                debug!(stream_id = %self.id, buffered, "stream: waiting for rest of frame");
                None
            }
            Decoded::Corrupted { .. } => self.interrupt(Interruption::Corrupted),
        }
    }

    /// Apply one classified frame.
    pub fn apply(&mut self, frame: InboundFrame) -> Option<StreamCompletion> {
        if self.is_completed() {
            debug!(stream_id = %self.id, kind = frame.kind(), "stream: frame after completion ignored");
            return None;
        }

        match frame {
            InboundFrame::Delta { text } => {
                self.append(&text);
                None
            }
            InboundFrame::Sources { sources } => {
                debug!(stream_id = %self.id, count = sources.len(), "stream: sources replaced");
                self.phase = StreamPhase::Streaming;
                self.sources = sources;
                None
            }
            InboundFrame::End => self.complete(Terminal::End),
            InboundFrame::Error { text } => self.complete(Terminal::Error(text)),
            InboundFrame::Text { text } => {
                self.append(&text);
                self.complete(Terminal::End)
            }
            InboundFrame::Unrecognized { kind } => {
                warn!(stream_id = %self.id, kind = %kind, "stream: unrecognized frame dropped");
                None
            }
        }
    }

    /// End the session on a condition raised outside the frame stream.
    pub fn interrupt(&mut self, cause: Interruption) -> Option<StreamCompletion> {
        self.complete(Terminal::Interrupted(cause))
    }

    fn append(&mut self, text: &str) {
        self.phase = StreamPhase::Streaming;
        if text.is_empty() {
            return;
        }
        self.awaiting_first_output = false;
        self.text.push_str(text);
    }

    fn complete(&mut self, terminal: Terminal) -> Option<StreamCompletion> {
        if self.is_completed() {
            return None;
        }
        self.phase = StreamPhase::Completed;

        let (is_error, error_message) = match terminal {
            Terminal::End => (false, None),
            Terminal::Error(text) => (true, Some(text).filter(|t| !t.is_empty())),
            Terminal::Interrupted(cause) => {
                self.interruption = Some(cause);
                (true, Some(cause.reason().to_owned()))
            }
        };

        info!(
            stream_id = %self.id,
            is_error,
            chars = self.text.len(),
            sources = self.sources.len(),
            "stream: completed"
        );

        Some(StreamCompletion {
            stream_id: self.id,
            final_text: std::mem::take(&mut self.text),
            sources: std::mem::take(&mut self.sources),
            is_error,
            error_message,
        })
    }
}
