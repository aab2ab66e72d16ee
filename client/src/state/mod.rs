//! Chat state: stream sessions, the conversation log, and the controller
//! that reduces transport events and user calls over both.

pub mod chat;
pub mod history;
pub mod stream;
