//! Native WebSocket driver for the chat controller.
//!
//! One `Session` wraps one connection. The controller writes outbound frames
//! into a channel; the session flushes that channel to the socket after each
//! controller call and feeds socket messages back as transport events.
//!
//! Between requests the socket is still read: [`Session::pump_ready`] takes
//! whatever already arrived (a server close, late frames of an abandoned
//! request) and [`Session::settle`] waits out a drain before the next prompt.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::time::Duration;

use client::config::ClientConfig;
use client::net::transport::TransportEvent;
use client::state::chat::ChatController;
use client::state::stream::StreamCompletion;
use client::util::clock::now_ms;
use frames::FeedbackRating;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::CliError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Session {
    chat: ChatController<UnboundedSender<String>>,
    outbound: UnboundedReceiver<String>,
    ws: WsStream,
}

impl Session {
    /// Dial the configured endpoint and mark the transport open.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::MissingEndpoint`] when no endpoint is configured and
    /// [`CliError::WsConnect`] when the handshake fails.
    pub async fn connect(config: ClientConfig) -> Result<Self, CliError> {
        let (tx, outbound) = mpsc::unbounded::<String>();
        let mut chat = ChatController::new(config, tx);
        let url = chat.connect().ok_or(CliError::MissingEndpoint)?;

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|error| CliError::WsConnect(Box::new(error)))?;
        chat.handle_event(TransportEvent::Ready, now_ms());
        info!(url = %url, "session: connected");

        Ok(Self { chat, outbound, ws })
    }

    #[must_use]
    pub fn chat(&self) -> &ChatController<UnboundedSender<String>> {
        &self.chat
    }

    pub fn set_role(&mut self, role: &str) {
        self.chat.set_role(role);
    }

    /// Send `prompt` and drive the socket until its completion.
    ///
    /// `on_text` receives each newly arrived piece of answer text.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Dispatch`] when the controller rejects the prompt.
    /// Backend and transport failures arrive as an error completion instead.
    pub async fn ask(&mut self, prompt: &str, mut on_text: impl FnMut(&str)) -> Result<StreamCompletion, CliError> {
        self.settle().await;
        let submitted = self.chat.submit(prompt, now_ms());
        if let Some(completion) = self.flush_outbound().await {
            emit_remaining(&completion.final_text, 0, &mut on_text);
            return Ok(completion);
        }
        submitted?;

        let mut printed = 0_usize;
        let mut ticker = tokio::time::interval(TIMEOUT_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let completion = tokio::select! {
                message = self.ws.next() => match transport_event(message) {
                    Some(event) => self.chat.handle_event(event, now_ms()),
                    None => None,
                },
                _ = ticker.tick() => self.chat.poll_timeout(now_ms()),
            };

            if let Some(completion) = completion {
                emit_remaining(&completion.final_text, printed, &mut on_text);
                return Ok(completion);
            }
            if let Some(text) = self.chat.active_text() {
                printed = emit_remaining(text, printed, &mut on_text);
            }
            if !self.chat.is_processing() {
                return Err(CliError::WsClosed);
            }
        }
    }

    /// Feed the controller every socket message that is already available,
    /// without waiting.
    pub fn pump_ready(&mut self) {
        while !self.chat.connection_state().is_terminal() {
            let Some(message) = self.ws.next().now_or_never() else {
                return;
            };
            if let Some(event) = transport_event(message) {
                self.chat.handle_event(event, now_ms());
            }
        }
    }

    /// Wait until the frames of an abandoned request have drained, or the
    /// controller gave up on the connection.
    pub async fn settle(&mut self) {
        if !self.chat.is_draining() {
            return;
        }
        debug!("session: draining abandoned stream");
        let mut ticker = tokio::time::interval(TIMEOUT_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.chat.is_draining() && !self.chat.connection_state().is_terminal() {
            tokio::select! {
                message = self.ws.next() => {
                    if let Some(event) = transport_event(message) {
                        self.chat.handle_event(event, now_ms());
                    }
                }
                _ = ticker.tick() => {
                    self.chat.poll_timeout(now_ms());
                }
            }
        }
    }

    /// Rate the most recent answer.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::NothingToRate`] before the first answer, and
    /// [`CliError::Dispatch`] when the controller rejects the feedback.
    pub async fn rate_last(&mut self, rating: FeedbackRating, reason: Option<&str>) -> Result<(), CliError> {
        let index = self.chat.history().last_bot_index().ok_or(CliError::NothingToRate)?;
        self.chat.submit_feedback(index, rating, reason, now_ms())?;
        self.flush_outbound().await;
        Ok(())
    }

    /// Close the socket politely.
    pub async fn close(mut self) {
        if let Err(error) = self.ws.close(None).await {
            debug!(%error, "session: close failed");
        }
    }

    // Write everything the controller queued. A write failure is reported to
    // the controller, which may complete the in-flight request.
    async fn flush_outbound(&mut self) -> Option<StreamCompletion> {
        while let Ok(text) = self.outbound.try_recv() {
            if let Err(error) = self.ws.send(Message::Text(text.into())).await {
                return self.chat.handle_event(TransportEvent::Failed(error.to_string()), now_ms());
            }
        }
        None
    }
}

// Control frames map to `None`; tungstenite answers pings itself.
fn transport_event(message: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>) -> Option<TransportEvent> {
    let event = match message {
        Some(Ok(Message::Text(text))) => TransportEvent::Frame(text.as_str().to_owned()),
        Some(Ok(Message::Binary(bytes))) => TransportEvent::Frame(String::from_utf8_lossy(&bytes).into_owned()),
        Some(Ok(Message::Close(frame))) => match frame {
            Some(frame) => TransportEvent::Closed {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
                clean: true,
            },
            None => TransportEvent::Closed { code: 1005, reason: String::new(), clean: true },
        },
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => return None,
        Some(Err(error)) => TransportEvent::Failed(error.to_string()),
        None => TransportEvent::Closed { code: 1006, reason: String::new(), clean: false },
    };
    Some(event)
}

fn emit_remaining(text: &str, printed: usize, on_text: &mut impl FnMut(&str)) -> usize {
    if let Some(rest) = text.get(printed..)
        && !rest.is_empty()
    {
        on_text(rest);
    }
    text.len().max(printed)
}
