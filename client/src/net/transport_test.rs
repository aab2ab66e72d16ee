use super::*;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

fn session() -> (TransportSession<UnboundedSender<String>>, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded::<String>();
    (TransportSession::new(tx), rx)
}

fn open_session() -> (TransportSession<UnboundedSender<String>>, UnboundedReceiver<String>) {
    let (mut transport, rx) = session();
    transport.open(Some("ws://localhost:9000"));
    assert_eq!(transport.handle(TransportEvent::Ready), Routed::Opened);
    (transport, rx)
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(text) = rx.try_recv() {
        out.push(text);
    }
    out
}

fn feedback() -> OutboundFrame {
    OutboundFrame::SubmitFeedback {
        rating: frames::FeedbackRating::ThumbsUp,
        bot_message: "a".to_owned(),
        user_message: "q".to_owned(),
        timestamp: 1,
        reason: String::new(),
    }
}

// =============================================================
// State machine
// =============================================================

#[test]
fn new_session_is_idle() {
    let (transport, _rx) = session();
    assert_eq!(transport.state(), ConnectionState::Idle);
    assert!(!transport.is_open());
    assert!(transport.listener().is_none());
}

#[test]
fn open_moves_to_connecting_and_returns_trimmed_url() {
    let (mut transport, _rx) = session();
    let url = transport.open(Some("  wss://chat.example.test/prod "));
    assert_eq!(url.as_deref(), Some("wss://chat.example.test/prod"));
    assert_eq!(transport.state(), ConnectionState::Connecting);
    assert_eq!(transport.endpoint(), Some("wss://chat.example.test/prod"));
}

#[test]
fn open_without_endpoint_fails_silently() {
    let (mut transport, _rx) = session();
    assert!(transport.open(None).is_none());
    assert_eq!(transport.state(), ConnectionState::Failed);

    let (mut transport, _rx) = session();
    assert!(transport.open(Some("   ")).is_none());
    assert_eq!(transport.state(), ConnectionState::Failed);
}

#[test]
fn open_twice_is_ignored() {
    let (mut transport, _rx) = session();
    transport.open(Some("ws://a"));
    assert!(transport.open(Some("ws://b")).is_none());
    assert_eq!(transport.endpoint(), Some("ws://a"));
}

#[test]
fn ready_without_connect_is_dropped() {
    let (mut transport, _rx) = session();
    assert_eq!(transport.handle(TransportEvent::Ready), Routed::Dropped);
    assert_eq!(transport.state(), ConnectionState::Idle);
}

#[test]
fn closed_is_terminal_and_later_events_are_dropped() {
    let (mut transport, _rx) = open_session();
    let routed = transport.handle(TransportEvent::Closed { code: 1000, reason: String::new(), clean: true });
    assert_eq!(routed, Routed::Ended { stream_id: None, cause: Interruption::ConnectionClosed });
    assert_eq!(transport.state(), ConnectionState::Closed);

    assert_eq!(transport.handle(TransportEvent::Ready), Routed::Dropped);
    assert_eq!(transport.handle(TransportEvent::Failed("late".to_owned())), Routed::Dropped);
    assert_eq!(transport.state(), ConnectionState::Closed);
}

#[test]
fn failure_while_connecting_ends_session() {
    let (mut transport, _rx) = session();
    transport.open(Some("ws://unreachable"));
    let routed = transport.handle(TransportEvent::Failed("refused".to_owned()));
    assert_eq!(routed, Routed::Ended { stream_id: None, cause: Interruption::ConnectionError });
    assert_eq!(transport.state(), ConnectionState::Failed);
}

// =============================================================
// Listener routing
// =============================================================

#[test]
fn frame_without_listener_is_dropped() {
    let (mut transport, _rx) = open_session();
    assert_eq!(transport.handle(TransportEvent::Frame("{}".to_owned())), Routed::Dropped);
}

#[test]
fn frame_routes_to_attached_listener() {
    let (mut transport, _rx) = open_session();
    let id = Uuid::new_v4();
    transport.attach(id);
    assert_eq!(
        transport.handle(TransportEvent::Frame("x".to_owned())),
        Routed::Frame { stream_id: id, text: "x".to_owned() }
    );
}

#[test]
fn attach_replaces_previous_listener() {
    let (mut transport, _rx) = open_session();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    transport.attach(first);
    transport.attach(second);
    assert_eq!(transport.listener(), Some(second));

    let Routed::Frame { stream_id, .. } = transport.handle(TransportEvent::Frame("x".to_owned())) else {
        panic!("expected routed frame");
    };
    assert_eq!(stream_id, second);
}

#[test]
fn detach_clears_listener() {
    let (mut transport, _rx) = open_session();
    let id = Uuid::new_v4();
    transport.attach(id);
    assert_eq!(transport.detach(), Some(id));
    assert!(transport.listener().is_none());
    assert_eq!(transport.detach(), None);
}

#[test]
fn close_reports_and_detaches_listener() {
    let (mut transport, _rx) = open_session();
    let id = Uuid::new_v4();
    transport.attach(id);
    let routed = transport.handle(TransportEvent::Closed { code: 1006, reason: "gone".to_owned(), clean: false });
    assert_eq!(routed, Routed::Ended { stream_id: Some(id), cause: Interruption::ConnectionClosed });
    assert!(transport.listener().is_none());
}

// =============================================================
// Sending
// =============================================================

#[test]
fn send_requires_open_state() {
    let (mut transport, mut rx) = session();
    let err = transport.send_frame(&feedback()).expect_err("idle send should fail");
    assert!(matches!(err, TransportError::NotOpen(ConnectionState::Idle)));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn send_writes_encoded_frame_to_sink() {
    let (mut transport, mut rx) = open_session();
    transport.send_frame(&feedback()).expect("send");
    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("\"action\":\"submitFeedback\""));
}

#[test]
fn send_to_closed_channel_fails_session() {
    let (mut transport, rx) = open_session();
    drop(rx);
    let err = transport.send_frame(&feedback()).expect_err("closed channel");
    assert!(matches!(err, TransportError::ChannelClosed));
    assert_eq!(transport.state(), ConnectionState::Failed);
}

#[test]
fn local_close_drops_sink_and_listener() {
    let (mut transport, mut rx) = open_session();
    let id = Uuid::new_v4();
    transport.attach(id);

    assert_eq!(transport.close(), Some(id));
    assert_eq!(transport.state(), ConnectionState::Closed);
    assert!(transport.listener().is_none());
    assert!(matches!(transport.send_frame(&feedback()), Err(TransportError::NotOpen(ConnectionState::Closed))));

    assert!(rx.try_recv().is_err());
    assert_eq!(transport.close(), None);
}
