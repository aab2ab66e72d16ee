//! Outbound request builders.

#[cfg(test)]
#[path = "requests_test.rs"]
mod requests_test;

use frames::{FeedbackRating, MessageEntry, OutboundFrame};

/// Build a `sendMessage` request carrying `history` as context.
#[must_use]
pub fn send_message_frame(prompt: &str, role: &str, history: Vec<MessageEntry>) -> OutboundFrame {
    OutboundFrame::SendMessage { prompt: prompt.to_owned(), role: role.to_owned(), history }
}

/// Build a `submitFeedback` request for one bot answer.
#[must_use]
pub fn feedback_frame(
    rating: FeedbackRating,
    bot_message: &str,
    user_message: &str,
    reason: Option<&str>,
    timestamp: i64,
) -> OutboundFrame {
    OutboundFrame::SubmitFeedback {
        rating,
        bot_message: bot_message.to_owned(),
        user_message: user_message.to_owned(),
        timestamp,
        reason: reason.map(str::trim).unwrap_or_default().to_owned(),
    }
}
