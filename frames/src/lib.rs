//! Shared wire model for the assistant's duplex chat connection.
//!
//! This crate owns the JSON records exchanged with the backend and the
//! conversation entry shape that travels back to it as context. Both the
//! `client` core and the `cli` driver depend on it.
//!
//! DESIGN
//! ======
//! Inbound frames are classified by their `type` discriminator. Only JSON that
//! fails to parse is an error here; a record that parses but carries an
//! unknown or ill-shaped kind decodes to [`InboundFrame::Unrecognized`] so the
//! stream can drop it and keep going.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Role sent with a prompt when the user has not picked one.
pub const DEFAULT_ROLE: &str = "researchAssistant";

/// Error returned by the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not syntactically valid JSON (possibly a partial record).
    #[error("failed to parse frame JSON: {0}")]
    Parse(#[source] serde_json::Error),
    /// An outbound record could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

// =============================================================================
// CONVERSATION ENTRIES
// =============================================================================

/// Who authored a conversation entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sender {
    User,
    Bot,
}

/// What a conversation entry carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    Text,
    File,
    Sources,
}

/// Delivery status of a conversation entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Sent,
    Received,
}

/// A citation pointing at supporting material for a bot answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Locator of the cited document.
    pub url: String,
    /// Page within the document, when the knowledge base reports one.
    #[serde(default, deserialize_with = "deserialize_lenient_page", skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    /// Relevance score reported by retrieval.
    #[serde(default, deserialize_with = "deserialize_lenient_score", skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// One committed record in the conversation history.
///
/// Field names follow the backend's history schema (`sentBy`, `type`,
/// `state`, `message`) so entries can be sent back verbatim as context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    #[serde(rename = "sentBy")]
    pub sender: Sender,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(rename = "state")]
    pub status: EntryStatus,
    #[serde(rename = "message", default)]
    pub text: String,
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "fileStatus", default, skip_serializing_if = "Option::is_none")]
    pub file_status: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Milliseconds since the Unix epoch when the entry was created.
    pub timestamp: i64,
}

impl MessageEntry {
    /// A prompt typed by the user.
    #[must_use]
    pub fn user_text(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender: Sender::User,
            kind: EntryKind::Text,
            status: EntryStatus::Sent,
            text: text.into(),
            file_name: None,
            file_status: None,
            sources: Vec::new(),
            timestamp,
        }
    }

    /// A reply shown in the bot's voice, with optional citations.
    #[must_use]
    pub fn bot_text(text: impl Into<String>, sources: Vec<Source>, timestamp: i64) -> Self {
        Self {
            sender: Sender::Bot,
            kind: EntryKind::Text,
            status: EntryStatus::Received,
            text: text.into(),
            file_name: None,
            file_status: None,
            sources,
            timestamp,
        }
    }

    /// Whether this entry is plain text from the given sender.
    #[must_use]
    pub fn is_text_from(&self, sender: Sender) -> bool {
        self.sender == sender && self.kind == EntryKind::Text
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// A classified frame received from the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// Incremental chunk of the streamed answer.
    Delta { text: String },
    /// Citation set for the current turn. Replaces any earlier set.
    Sources { sources: Vec<Source> },
    /// Normal end of the turn.
    End,
    /// Backend-reported failure. `text` may be empty.
    Error { text: String },
    /// Complete non-streamed reply in a single frame.
    Text { text: String },
    /// Valid JSON that is not a frame this client understands.
    Unrecognized { kind: String },
}

impl InboundFrame {
    /// Discriminator label, for logging.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Delta { .. } => "delta",
            Self::Sources { .. } => "sources",
            Self::End => "end",
            Self::Error { .. } => "error",
            Self::Text { .. } => "text",
            Self::Unrecognized { kind } => kind,
        }
    }
}

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct SourcesPayload {
    sources: Vec<Value>,
}

/// Decode one inbound text payload.
///
/// # Errors
///
/// Returns [`CodecError::Parse`] only when `raw` is not valid JSON. Shape
/// problems in otherwise valid JSON decode to [`InboundFrame::Unrecognized`].
pub fn decode_inbound(raw: &str) -> Result<InboundFrame, CodecError> {
    let value = serde_json::from_str::<Value>(raw).map_err(CodecError::Parse)?;
    Ok(classify_value(value))
}

fn classify_value(value: Value) -> InboundFrame {
    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return InboundFrame::Unrecognized { kind: String::new() };
    };

    let classified = match kind.as_str() {
        "delta" => text_of(&value).map(|text| InboundFrame::Delta { text }),
        "text" => text_of(&value).map(|text| InboundFrame::Text { text }),
        "error" => text_of(&value).map(|text| InboundFrame::Error { text }),
        "end" => Some(InboundFrame::End),
        "sources" => serde_json::from_value::<SourcesPayload>(value).ok().map(|payload| {
            // A malformed citation is skipped; the rest of the list still counts.
            let sources = payload
                .sources
                .into_iter()
                .filter_map(|entry| serde_json::from_value::<Source>(entry).ok())
                .collect();
            InboundFrame::Sources { sources }
        }),
        _ => None,
    };

    classified.unwrap_or(InboundFrame::Unrecognized { kind })
}

fn text_of(value: &Value) -> Option<String> {
    serde_json::from_value::<TextPayload>(value.clone())
        .ok()
        .map(|payload| payload.text.unwrap_or_default())
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Thumbs rating attached to feedback on a bot answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    ThumbsUp,
    ThumbsDown,
}

/// A request sent from the client to the backend, routed on `action`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OutboundFrame {
    #[serde(rename_all = "camelCase")]
    SendMessage { prompt: String, role: String, history: Vec<MessageEntry> },
    #[serde(rename_all = "camelCase")]
    SubmitFeedback {
        rating: FeedbackRating,
        bot_message: String,
        user_message: String,
        timestamp: i64,
        reason: String,
    },
}

/// Serialize an outbound frame to its JSON text form.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails, which only happens
/// for non-finite citation scores.
pub fn encode_outbound(frame: &OutboundFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(CodecError::Encode)
}

// Knowledge-base metadata reports pages as integers, floats, or strings.
fn deserialize_lenient_page<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let page = match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => number.as_i64().or_else(|| number.as_f64().and_then(integral_f64)),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral_f64))
        }
        Some(_) => None,
    };
    Ok(page)
}

// Scores arrive as numbers or numeric strings; anything else is no score.
fn deserialize_lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let score = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score.filter(|score| score.is_finite()))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral_f64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
