//! Networking modules for the duplex chat connection.
//!
//! SYSTEM CONTEXT
//! ==============
//! `transport` owns the connection state machine and the single attached
//! stream listener, `frame_decoder` turns raw socket text into classified
//! frames under a bounded reassembly buffer, and `requests` builds outbound
//! frames. `browser` drives a real socket in the browser (`hydrate`).

#[cfg(feature = "hydrate")]
pub mod browser;
pub mod frame_decoder;
pub mod requests;
pub mod transport;
