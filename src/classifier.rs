//! Classification of inbound stream messages.
//!
//! The server interleaves JSON status text with raw JPEG frames on the same
//! channel. Every message maps to exactly one [`InboundMessage`] or a
//! [`ClassifierError`]; nothing here panics on hostile input.

use bytes::Bytes;
use serde_json::Value;

use crate::error::ClassifierError;

/// Media type declared for every binary frame.
pub const FRAME_MEDIA_TYPE: &str = "image/jpeg";

/// Completion text sent by the processing server.
pub const COMPLETION_MESSAGE: &str = "Video processing complete";

/// A message as delivered by the channel, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    Text(String),
    Binary(Bytes),
}

/// One encoded image frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload {
    pub bytes: Bytes,
    pub media_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Processing finished.
    Complete,
    /// Progress percentage, already clamped to 0..=100.
    Progress(u8),
    Frame(FramePayload),
}

/// Classify one raw message.
pub fn classify(raw: RawMessage) -> Result<InboundMessage, ClassifierError> {
    match raw {
        RawMessage::Text(text) => classify_text(&text),
        RawMessage::Binary(bytes) => Ok(InboundMessage::Frame(FramePayload {
            bytes,
            media_type: FRAME_MEDIA_TYPE,
        })),
    }
}

fn classify_text(text: &str) -> Result<InboundMessage, ClassifierError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ClassifierError::MalformedJson(e.to_string()))?;

    let Some(obj) = value.as_object() else {
        return Err(ClassifierError::UnknownStatus(truncate(text)));
    };

    // Completion wins when a message carries both markers.
    let completed = obj
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(|m| m == COMPLETION_MESSAGE)
        || obj
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s == "complete");
    if completed {
        return Ok(InboundMessage::Complete);
    }

    if let Some(progress) = obj.get("progress").and_then(Value::as_f64) {
        return Ok(InboundMessage::Progress(clamp_progress(progress)));
    }

    Err(ClassifierError::UnknownStatus(truncate(text)))
}

/// Clamp a reported progress value into 0..=100.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

fn truncate(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
