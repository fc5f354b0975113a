//! Host-facing turn events.
//!
//! The turn engine translates the agent's `session/update` notifications and
//! the final prompt response into this event model. Events serialize with a
//! snake_case `type` tag so the host can forward them verbatim.

use serde::{Deserialize, Serialize};

/// Stream label attached to assistant text deltas.
pub const OUTPUT_STREAM: &str = "output";

/// One event in a turn's output sequence.
///
/// A turn yields zero or more non-terminal events (`TextDelta`, `ToolCall`,
/// `Status`) in arrival order, followed by exactly one terminal event
/// (`Done` or `Error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Incremental assistant text.
    TextDelta { text: String, stream: String },

    /// The agent started a tool call.
    ToolCall { text: String },

    /// Progress note for a running tool call.
    Status { text: String },

    /// Terminal: the prompt completed.
    #[serde(rename_all = "camelCase")]
    Done { stop_reason: String },

    /// Terminal: the turn failed.
    Error { message: String },
}

impl TurnEvent {
    /// A text delta on the default output stream.
    pub fn text_delta(text: impl Into<String>) -> Self {
        TurnEvent::TextDelta {
            text: text.into(),
            stream: OUTPUT_STREAM.to_string(),
        }
    }

    /// Check whether this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done { .. } | TurnEvent::Error { .. })
    }

    /// Get the text of a `TextDelta` event.
    pub fn text(&self) -> Option<&str> {
        match self {
            TurnEvent::TextDelta { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Get the stop reason of a `Done` event.
    pub fn stop_reason(&self) -> Option<&str> {
        match self {
            TurnEvent::Done { stop_reason } => Some(stop_reason),
            _ => None,
        }
    }
}
