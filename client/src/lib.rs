//! # client
//!
//! Streaming chat core for the assistant's browser client.
//!
//! This crate owns everything between the duplex socket and the rendered
//! conversation: the transport session state machine, inbound frame decoding,
//! per-request stream sessions with their completion reconciler, the
//! append-only conversation history, and the request dispatcher that ties
//! them together in [`state::chat::ChatController`].
//!
//! The browser socket driver is gated behind the `hydrate` feature; native
//! drivers (see the `cli` crate) feed the same controller.

pub mod config;
pub mod net;
pub mod state;
pub mod util;
