//! Chat controller: request dispatch and completion commit.
//!
//! ARCHITECTURE
//! ============
//! `ChatController` is a single-threaded reducer. Drivers feed it
//! [`TransportEvent`]s in socket order and forward user calls (`submit`,
//! `submit_feedback`, `cancel`); it owns the transport session, the active
//! stream session, the conversation log, and the processing flag.
//!
//! INVARIANTS
//! ==========
//! - At most one request is in flight; `processing` is true from dispatch
//!   until its completion is committed.
//! - A completion is committed to history before `processing` clears.
//! - Every dispatched request ends in exactly one completion, unless the
//!   caller detaches it explicitly.
//!
//! ABANDONED STREAMS
//! =================
//! Frames carry no request id, so a request that is timed out, cancelled,
//! detached, or corrupted keeps streaming into the socket. Its listener stays
//! attached as a drain that discards frames until the stream's own `end`,
//! `error`, or `text` arrives; `submit` reports `Busy` meanwhile. A drain that
//! outlives the request timeout closes the transport, and the driver
//! reconnects.

#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

use frames::{FeedbackRating, InboundFrame, MessageEntry, Sender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::net::frame_decoder::{Decoded, FrameDecoder};
use crate::net::requests::{feedback_frame, send_message_frame};
use crate::net::transport::{ConnectionState, FrameSink, Routed, TransportError, TransportEvent, TransportSession};
use crate::state::history::HistoryStore;
use crate::state::stream::{Interruption, StreamCompletion, StreamSession};

/// Committed when a prompt is submitted without an open connection.
pub const CONNECTION_ERROR_TEXT: &str = "Connection error. Please refresh.";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("a request is already in flight")]
    Busy,
    #[error("not connected")]
    NotConnected,
    #[error("entry {0} is not a bot answer")]
    NotRateable(usize),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// Listener for an abandoned stream, discarding frames until it ends.
struct Drain {
    stream_id: Uuid,
    decoder: FrameDecoder,
    deadline_ms: Option<i64>,
}

pub struct ChatController<S> {
    config: ClientConfig,
    transport: TransportSession<S>,
    history: HistoryStore,
    active: Option<StreamSession>,
    draining: Option<Drain>,
    processing: bool,
    role: String,
}

impl<S: FrameSink> ChatController<S> {
    #[must_use]
    pub fn new(config: ClientConfig, sink: S) -> Self {
        let role = config.role.clone();
        Self {
            config,
            transport: TransportSession::new(sink),
            history: HistoryStore::new(),
            active: None,
            draining: None,
            processing: false,
            role,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// True while an abandoned stream is still arriving.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.is_some()
    }

    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Id of the in-flight stream session.
    #[must_use]
    pub fn active_stream_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(StreamSession::id)
    }

    /// Partial answer text of the in-flight request.
    #[must_use]
    pub fn active_text(&self) -> Option<&str> {
        self.active.as_ref().map(StreamSession::text)
    }

    /// True while a request is in flight and nothing visible has arrived.
    #[must_use]
    pub fn is_awaiting_first_output(&self) -> bool {
        self.active.as_ref().is_some_and(StreamSession::awaiting_first_output)
    }

    /// Switch the assistant persona used by later prompts.
    pub fn set_role(&mut self, role: impl Into<String>) {
        let role = role.into();
        info!(role = %role, "chat: role selected");
        self.role = role;
    }

    // =========================================================================
    // CONNECTION
    // =========================================================================

    /// Start connecting. Returns the URL the driver should dial, or `None`
    /// when no endpoint is configured (the transport is then `Failed`).
    pub fn connect(&mut self) -> Option<String> {
        let endpoint = self.config.endpoint.clone();
        self.transport.open(endpoint.as_deref())
    }

    /// Reduce one driver event. Returns the completion it produced, if any.
    pub fn handle_event(&mut self, event: TransportEvent, now_ms: i64) -> Option<StreamCompletion> {
        match self.transport.handle(event) {
            Routed::Opened | Routed::Dropped => None,
            Routed::Frame { stream_id, text } => {
                if self.draining.as_ref().is_some_and(|d| d.stream_id == stream_id) {
                    self.drain_frame(&text);
                    return None;
                }
                let (completion, cause) = match self.active.as_mut() {
                    Some(session) if session.id() == stream_id => {
                        let completion = session.ingest(&text)?;
                        (completion, session.interruption())
                    }
                    _ => {
                        debug!(%stream_id, "chat: frame for inactive stream dropped");
                        return None;
                    }
                };
                let completion = self.finish(completion, now_ms);
                if let Some(cause) = cause {
                    self.fence(completion.stream_id, cause, now_ms);
                }
                Some(completion)
            }
            Routed::Ended { stream_id, cause } => {
                if let Some(drain) = self.draining.take() {
                    debug!(stream_id = %drain.stream_id, "chat: drain ended with connection");
                }
                if let Some(listener) = stream_id
                    && self.active_stream_id() != Some(listener)
                {
                    debug!(%listener, "chat: transport ended with stale listener");
                }
                self.interrupt_active(cause, now_ms)
            }
        }
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Send `prompt` as the next user turn.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::EmptyPrompt`] when the prompt is blank; nothing changes.
    /// - [`DispatchError::Busy`] while a request is in flight; nothing changes.
    /// - [`DispatchError::NotConnected`] when the transport is not open; a
    ///   connection-error bot entry is committed.
    /// - [`DispatchError::Transport`] when the send fails; the request is
    ///   completed as a connection error and committed.
    pub fn submit(&mut self, prompt: &str, now_ms: i64) -> Result<Uuid, DispatchError> {
        if prompt.trim().is_empty() {
            warn!("chat: empty prompt rejected");
            return Err(DispatchError::EmptyPrompt);
        }
        if self.processing {
            warn!("chat: prompt rejected; request already in flight");
            return Err(DispatchError::Busy);
        }
        if let Some(drain) = &self.draining {
            warn!(stream_id = %drain.stream_id, "chat: prompt rejected; previous stream still draining");
            return Err(DispatchError::Busy);
        }
        if !self.transport.is_open() {
            error!(state = %self.transport.state(), "chat: prompt rejected; not connected");
            self.history.append(MessageEntry::bot_text(CONNECTION_ERROR_TEXT, Vec::new(), now_ms));
            self.processing = false;
            return Err(DispatchError::NotConnected);
        }

        self.processing = true;
        let context = if self.config.send_history {
            self.history.snapshot(Some(self.config.history_limit)).to_vec()
        } else {
            Vec::new()
        };
        self.history.append(MessageEntry::user_text(prompt, now_ms));

        let session = StreamSession::new(self.config.max_buffered_bytes, now_ms);
        let stream_id = session.id();
        self.transport.attach(stream_id);
        self.active = Some(session);

        info!(%stream_id, role = %self.role, context = context.len(), "chat: prompt dispatched");
        let frame = send_message_frame(prompt, &self.role, context);
        if let Err(e) = self.transport.send_frame(&frame) {
            error!(%stream_id, error = %e, "chat: send failed");
            self.interrupt_active(Interruption::ConnectionError, now_ms);
            return Err(e.into());
        }
        Ok(stream_id)
    }

    /// Rate the bot answer at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotRateable`] when `index` is not a bot
    /// answer, [`DispatchError::NotConnected`] when the transport is not open,
    /// and [`DispatchError::Transport`] when the send fails.
    pub fn submit_feedback(
        &mut self,
        index: usize,
        rating: FeedbackRating,
        reason: Option<&str>,
        now_ms: i64,
    ) -> Result<(), DispatchError> {
        let Some(answer) = self.history.get(index).filter(|e| e.is_text_from(Sender::Bot)) else {
            warn!(index, "chat: feedback target is not a bot answer");
            return Err(DispatchError::NotRateable(index));
        };
        if !self.transport.is_open() {
            error!(state = %self.transport.state(), "chat: feedback rejected; not connected");
            return Err(DispatchError::NotConnected);
        }

        let question = self.history.prior_user_text(index).unwrap_or_default();
        let frame = feedback_frame(rating, &answer.text, question, reason, now_ms);
        self.transport.send_frame(&frame)?;
        info!(index, ?rating, "chat: feedback sent");
        Ok(())
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    /// Complete the in-flight request if it has outlived the configured bound.
    /// A drain past its deadline closes the transport instead.
    pub fn poll_timeout(&mut self, now_ms: i64) -> Option<StreamCompletion> {
        let drain_expired = self
            .draining
            .as_ref()
            .and_then(|d| d.deadline_ms)
            .is_some_and(|deadline| now_ms >= deadline);
        if drain_expired {
            warn!("chat: abandoned stream never ended; closing connection");
            self.draining = None;
            self.transport.close();
        }

        let timeout_ms = self.config.request_timeout_ms()?;
        let expired = self.active.as_ref().is_some_and(|s| s.is_expired(now_ms, timeout_ms));
        if !expired {
            return None;
        }
        warn!(timeout_ms, "chat: request timed out");
        self.interrupt_active(Interruption::TimedOut, now_ms)
    }

    /// Abandon the in-flight request, committing it as cancelled.
    pub fn cancel(&mut self, now_ms: i64) -> Option<StreamCompletion> {
        self.interrupt_active(Interruption::Cancelled, now_ms)
    }

    /// Drop the in-flight request without a completion. Returns whether one
    /// was dropped. Its remaining frames are drained.
    pub fn detach(&mut self, now_ms: i64) -> bool {
        self.transport.detach();
        self.processing = false;
        let Some(session) = self.active.take() else {
            return false;
        };
        info!(stream_id = %session.id(), "chat: stream detached");
        self.begin_drain(session.id(), now_ms);
        true
    }

    /// Close the connection. An in-flight request is committed as
    /// "connection closed".
    pub fn close(&mut self, now_ms: i64) -> Option<StreamCompletion> {
        let completion = self.interrupt_active(Interruption::ConnectionClosed, now_ms);
        self.draining = None;
        self.transport.close();
        completion
    }

    fn interrupt_active(&mut self, cause: Interruption, now_ms: i64) -> Option<StreamCompletion> {
        let completion = self.active.as_mut().and_then(|session| session.interrupt(cause))?;
        let completion = self.finish(completion, now_ms);
        self.fence(completion.stream_id, cause, now_ms);
        Some(completion)
    }

    // The backend is still streaming after these; keep its frames away from
    // the next request.
    fn fence(&mut self, stream_id: Uuid, cause: Interruption, now_ms: i64) {
        if matches!(cause, Interruption::TimedOut | Interruption::Cancelled | Interruption::Corrupted) {
            self.begin_drain(stream_id, now_ms);
        }
    }

    fn begin_drain(&mut self, stream_id: Uuid, now_ms: i64) {
        if !self.transport.is_open() {
            return;
        }
        info!(%stream_id, "chat: draining abandoned stream");
        self.transport.attach(stream_id);
        self.draining = Some(Drain {
            stream_id,
            decoder: FrameDecoder::new(self.config.max_buffered_bytes),
            deadline_ms: self.config.request_timeout_ms().map(|t| now_ms.saturating_add(t)),
        });
    }

    fn drain_frame(&mut self, raw: &str) {
        let Some(drain) = self.draining.as_mut() else {
            return;
        };
        match drain.decoder.push(raw) {
            Decoded::Frame(InboundFrame::End | InboundFrame::Error { .. } | InboundFrame::Text { .. }) => {
                info!(stream_id = %drain.stream_id, "chat: abandoned stream ended");
                self.draining = None;
                self.transport.detach();
            }
            Decoded::Frame(frame) => {
                debug!(stream_id = %drain.stream_id, kind = frame.kind(), "chat: abandoned frame discarded");
            }
            Decoded::Pending { .. } => {}
            Decoded::Corrupted { .. } => {
                error!(stream_id = %drain.stream_id, "chat: abandoned stream corrupted; closing connection");
                self.draining = None;
                self.transport.close();
            }
        }
    }

    fn finish(&mut self, completion: StreamCompletion, now_ms: i64) -> StreamCompletion {
        if self.transport.listener() == Some(completion.stream_id) {
            self.transport.detach();
        }
        self.active = None;

        if let Some(entry) = completion.to_entry(self.config.display_sources, now_ms) {
            self.history.append(entry);
        } else {
            debug!(stream_id = %completion.stream_id, "chat: empty completion not committed");
        }
        self.processing = false;
        completion
    }
}
