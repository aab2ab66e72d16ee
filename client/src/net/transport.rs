//! Transport session for one duplex connection.
//!
//! ARCHITECTURE
//! ============
//! The session never touches a socket. Drivers (browser or native) own the
//! socket, push what they observe in as [`TransportEvent`]s, and drain the
//! outbound side through a [`FrameSink`]. The session answers with a
//! [`Routed`] value telling the controller what the event means.
//!
//! LIFECYCLE
//! =========
//! `Idle → Connecting → Open → {Closed, Failed}`. Only `Open` permits sends.
//! `Closed` and `Failed` are terminal for an instance; reconnecting means a
//! new session. A local [`TransportSession::close`] drops the sink, which ends
//! the driver's writer loop and lets it close the socket.
//!
//! LISTENER
//! ========
//! At most one stream session is attached as the inbound listener. Attaching
//! replaces (and logs) any previous listener, so a frame is never delivered
//! to two accumulators.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use std::fmt;

use frames::OutboundFrame;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::state::stream::Interruption;

/// Observable state of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Terminal states end this connection instance.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a driver observed on the socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket finished its handshake.
    Ready,
    /// One inbound text payload.
    Frame(String),
    /// The socket closed.
    Closed { code: u16, reason: String, clean: bool },
    /// The socket errored or could not be reached.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection is not open (state: {0})")]
    NotOpen(ConnectionState),
    #[error("outbound channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Encode(#[from] frames::CodecError),
}

/// Outbound half of a connection.
pub trait FrameSink {
    /// Hand one serialized frame to the socket writer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ChannelClosed`] when the writer is gone.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

impl FrameSink for futures::channel::mpsc::UnboundedSender<String> {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.unbounded_send(text).map_err(|_| TransportError::ChannelClosed)
    }
}

/// What an inbound event means for the chat state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Routed {
    /// The connection became usable.
    Opened,
    /// A payload for the attached stream listener.
    Frame { stream_id: Uuid, text: String },
    /// The connection ended. `stream_id` is the listener that was attached.
    Ended { stream_id: Option<Uuid>, cause: Interruption },
    /// Nothing to act on.
    Dropped,
}

pub struct TransportSession<S> {
    state: ConnectionState,
    endpoint: Option<String>,
    sink: Option<S>,
    listener: Option<Uuid>,
}

impl<S: FrameSink> TransportSession<S> {
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self { state: ConnectionState::Idle, endpoint: None, sink: Some(sink), listener: None }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    #[must_use]
    pub fn listener(&self) -> Option<Uuid> {
        self.listener
    }

    /// Begin connecting. Returns the URL the driver should dial.
    ///
    /// A missing or blank endpoint moves the session to `Failed` without
    /// returning an error; callers observe it through [`Self::state`].
    pub fn open(&mut self, endpoint: Option<&str>) -> Option<String> {
        if self.state != ConnectionState::Idle {
            warn!(state = %self.state, "transport: open ignored; session already used");
            return None;
        }

        let Some(url) = endpoint.map(str::trim).filter(|url| !url.is_empty()) else {
            error!("transport: no endpoint configured");
            self.state = ConnectionState::Failed;
            return None;
        };

        info!(endpoint = url, "transport: connecting");
        self.endpoint = Some(url.to_owned());
        self.state = ConnectionState::Connecting;
        Some(url.to_owned())
    }

    /// Attach `stream_id` as the only inbound listener.
    pub fn attach(&mut self, stream_id: Uuid) {
        if let Some(previous) = self.listener.replace(stream_id) {
            if previous != stream_id {
                warn!(%previous, %stream_id, "transport: replacing attached listener");
            }
        }
    }

    /// Detach the current listener, if any.
    pub fn detach(&mut self) -> Option<Uuid> {
        self.listener.take()
    }

    /// Send one outbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotOpen`] outside the `Open` state, and
    /// [`TransportError::ChannelClosed`] if the writer is gone, which also
    /// fails the session.
    pub fn send_frame(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        if self.state != ConnectionState::Open {
            return Err(TransportError::NotOpen(self.state));
        }

        let Some(sink) = self.sink.as_mut() else {
            return Err(TransportError::ChannelClosed);
        };
        let text = frames::encode_outbound(frame)?;
        let len = text.len();
        if let Err(e) = sink.send_text(text) {
            error!(error = %e, "transport: send failed");
            self.state = ConnectionState::Failed;
            return Err(e);
        }
        debug!(bytes = len, "transport: frame sent");
        Ok(())
    }

    /// Close locally. Drops the sink and any listener. Returns the listener
    /// that was attached.
    pub fn close(&mut self) -> Option<Uuid> {
        if self.state.is_terminal() {
            return None;
        }
        info!(state = %self.state, "transport: closed locally");
        self.state = ConnectionState::Closed;
        self.sink = None;
        self.listener.take()
    }

    /// Apply one driver event.
    pub fn handle(&mut self, event: TransportEvent) -> Routed {
        if self.state.is_terminal() {
            debug!(state = %self.state, "transport: event after close ignored");
            return Routed::Dropped;
        }

        match event {
            TransportEvent::Ready => {
                if self.state != ConnectionState::Connecting {
                    warn!(state = %self.state, "transport: ready without connect");
                    return Routed::Dropped;
                }
                info!("transport: connected");
                self.state = ConnectionState::Open;
                Routed::Opened
            }
            TransportEvent::Frame(text) => {
                if self.state != ConnectionState::Open {
                    warn!(state = %self.state, "transport: frame before open dropped");
                    return Routed::Dropped;
                }
                let Some(stream_id) = self.listener else {
                    debug!(bytes = text.len(), "transport: no listener attached; frame dropped");
                    return Routed::Dropped;
                };
                Routed::Frame { stream_id, text }
            }
            TransportEvent::Closed { code, reason, clean } => {
                info!(code, reason = %reason, clean, "transport: closed");
                self.state = ConnectionState::Closed;
                Routed::Ended { stream_id: self.listener.take(), cause: Interruption::ConnectionClosed }
            }
            TransportEvent::Failed(reason) => {
                error!(reason = %reason, "transport: failed");
                self.state = ConnectionState::Failed;
                Routed::Ended { stream_id: self.listener.take(), cause: Interruption::ConnectionError }
            }
        }
    }
}
