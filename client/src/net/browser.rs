//! Browser WebSocket driver for the chat controller.
//!
//! SYSTEM CONTEXT
//! ==============
//! The page mounts one [`ChatHandle`] per chat view. The handle owns the
//! controller behind `Rc<RefCell<_>>`; the socket task and the timeout
//! ticker run as local tasks on the page's event loop and reach the same
//! controller through a `Weak`. `on_change` runs after every state change so
//! the view can re-read the handle.
//!
//! TEARDOWN
//! ========
//! The controller owns the only sender of the outbound channel. Closing the
//! handle (or dropping every clone of it) drops that sender, the writer loop
//! sees the channel end, and the socket is closed.
//!
//! Reconnection is left to the page: a closed or failed connection stays
//! that way until a new handle is spawned.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use frames::FeedbackRating;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::net::transport::TransportEvent;
use crate::state::chat::{ChatController, DispatchError};
use crate::state::stream::StreamCompletion;
use crate::util::clock::now_ms;

type SharedController = Rc<RefCell<ChatController<UnboundedSender<String>>>>;
type WeakController = Weak<RefCell<ChatController<UnboundedSender<String>>>>;
type ChangeCallback = Rc<dyn Fn(Option<&StreamCompletion>)>;

const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Page-side handle to a running chat client.
#[derive(Clone)]
pub struct ChatHandle {
    controller: SharedController,
    on_change: ChangeCallback,
}

impl ChatHandle {
    /// Read controller state for rendering.
    pub fn with<R>(&self, f: impl FnOnce(&ChatController<UnboundedSender<String>>) -> R) -> R {
        f(&self.controller.borrow())
    }

    /// Submit a prompt at the current time.
    ///
    /// # Errors
    ///
    /// See [`ChatController::submit`].
    pub fn submit(&self, prompt: &str) -> Result<Uuid, DispatchError> {
        let result = self.controller.borrow_mut().submit(prompt, now_ms());
        (self.on_change)(None);
        result
    }

    /// Rate the bot answer at `index`.
    ///
    /// # Errors
    ///
    /// See [`ChatController::submit_feedback`].
    pub fn submit_feedback(
        &self,
        index: usize,
        rating: FeedbackRating,
        reason: Option<&str>,
    ) -> Result<(), DispatchError> {
        self.controller
            .borrow_mut()
            .submit_feedback(index, rating, reason, now_ms())
    }

    pub fn set_role(&self, role: impl Into<String>) {
        self.controller.borrow_mut().set_role(role);
    }

    /// Navigation away from the view: commit the in-flight request as cancelled.
    pub fn cancel(&self) {
        let completion = self.controller.borrow_mut().cancel(now_ms());
        (self.on_change)(completion.as_ref());
    }

    /// Unmount without cancelling: drop the in-flight request silently.
    pub fn detach(&self) {
        self.controller.borrow_mut().detach(now_ms());
        (self.on_change)(None);
    }

    /// Close the connection. An in-flight request is committed as closed.
    pub fn close(&self) {
        let completion = self.controller.borrow_mut().close(now_ms());
        (self.on_change)(completion.as_ref());
    }
}

/// Connect a new chat client and start its socket and timeout tasks.
pub fn spawn_chat_client(config: ClientConfig, on_change: impl Fn(Option<&StreamCompletion>) + 'static) -> ChatHandle {
    let (tx, rx) = mpsc::unbounded::<String>();
    let controller: SharedController = Rc::new(RefCell::new(ChatController::new(config, tx)));
    let on_change: ChangeCallback = Rc::new(on_change);

    let url = controller.borrow_mut().connect();
    match url {
        Some(url) => {
            wasm_bindgen_futures::spawn_local(run_socket(Rc::downgrade(&controller), on_change.clone(), url, rx));
            wasm_bindgen_futures::spawn_local(run_timeout_ticker(Rc::downgrade(&controller), on_change.clone()));
        }
        None => on_change(None),
    }

    ChatHandle { controller, on_change }
}

// Returns false once every handle is gone.
fn dispatch(controller: &WeakController, on_change: &ChangeCallback, event: TransportEvent) -> bool {
    let Some(controller) = controller.upgrade() else {
        return false;
    };
    let completion = controller.borrow_mut().handle_event(event, now_ms());
    on_change(completion.as_ref());
    true
}

async fn run_socket(
    controller: WeakController,
    on_change: ChangeCallback,
    url: String,
    mut rx: UnboundedReceiver<String>,
) {
    use futures::{SinkExt, StreamExt};
    use gloo_net::websocket::futures::WebSocket;
    use gloo_net::websocket::{Message, State, WebSocketError};

    let mut ws = match WebSocket::open(&url) {
        Ok(ws) => ws,
        Err(e) => {
            dispatch(&controller, &on_change, TransportEvent::Failed(e.to_string()));
            return;
        }
    };

    // `open` returns mid-handshake; the sink turns ready once it settles.
    let ready = futures::future::poll_fn(|cx| ws.poll_ready_unpin(cx)).await;
    let event = match ready {
        Ok(()) if matches!(ws.state(), State::Open) => TransportEvent::Ready,
        Ok(()) => TransportEvent::Failed("socket closed during handshake".to_owned()),
        Err(e) => TransportEvent::Failed(e.to_string()),
    };
    let opened = matches!(event, TransportEvent::Ready);
    if !dispatch(&controller, &on_change, event) || !opened {
        return;
    }

    let (mut ws_write, mut ws_read) = ws.split();

    let send_task = async move {
        while let Some(text) = rx.next().await {
            if let Err(e) = ws_write.send(Message::Text(text)).await {
                warn!(error = %e, "browser: ws send failed");
                return;
            }
        }
        debug!("browser: outbound channel ended; closing socket");
        if let Err(e) = ws_write.close().await {
            debug!(error = %e, "browser: ws close failed");
        }
    };

    let recv_task = async {
        while let Some(msg) = ws_read.next().await {
            let event = match msg {
                Ok(Message::Text(text)) => TransportEvent::Frame(text),
                Ok(Message::Bytes(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => TransportEvent::Frame(text),
                    Err(_) => {
                        debug!("browser: non-utf8 binary frame dropped");
                        continue;
                    }
                },
                Err(WebSocketError::ConnectionClose(event)) => {
                    let closed = TransportEvent::Closed { code: event.code, reason: event.reason, clean: event.was_clean };
                    dispatch(&controller, &on_change, closed);
                    return;
                }
                Err(e) => {
                    dispatch(&controller, &on_change, TransportEvent::Failed(e.to_string()));
                    return;
                }
            };
            if !dispatch(&controller, &on_change, event) {
                return;
            }
        }
    };

    futures::future::select(Box::pin(send_task), Box::pin(recv_task)).await;

    // No-op when the close was already reported.
    dispatch(&controller, &on_change, TransportEvent::Failed("socket task ended".to_owned()));
}

async fn run_timeout_ticker(controller: WeakController, on_change: ChangeCallback) {
    loop {
        gloo_timers::future::sleep(TIMEOUT_POLL_INTERVAL).await;
        let Some(controller) = controller.upgrade() else {
            return;
        };
        let (completion, finished) = {
            let mut chat = controller.borrow_mut();
            let completion = chat.poll_timeout(now_ms());
            let finished = chat.connection_state().is_terminal() && !chat.is_processing();
            (completion, finished)
        };
        if completion.is_some() {
            on_change(completion.as_ref());
        }
        if finished {
            return;
        }
    }
}
