//! Utility helpers shared across client modules.
//!
//! SYSTEM CONTEXT
//! ==============
//! Utility modules isolate browser/environment concerns from the chat state
//! machine so the core stays testable on native targets.

pub mod clock;
