//! `session/update` notification payloads and their mapping to turn events.

use serde::Deserialize;
use serde_json::Value;

use crate::events::{TurnEvent, OUTPUT_STREAM};

/// Params of a `session/update` notification.
#[derive(Debug, Deserialize)]
pub struct SessionNotification {
    /// Session the update belongs to. Informational; routing happens per
    /// child process, so the adapter does not switch on it.
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub update: Option<SessionUpdate>,
}

/// The update envelope, discriminated by its `sessionUpdate` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    AgentMessageChunk {
        #[serde(default)]
        content: Option<ContentChunk>,
    },

    ToolCall {
        #[serde(default)]
        title: Option<String>,
    },

    ToolCallUpdate {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        status: String,
    },

    /// Update kinds this adapter does not surface.
    #[serde(other)]
    Other,
}

/// A single content block inside an agent message chunk.
#[derive(Debug, Deserialize)]
pub struct ContentChunk {
    #[serde(default)]
    pub text: Option<String>,
}

/// Map a `session/update` params object to a host event.
///
/// Returns `None` for update kinds the host has no representation for and
/// for payloads that do not decode; the caller drops those.
pub fn map_notification(params: &Value) -> Option<TurnEvent> {
    let notification: SessionNotification = match serde_json::from_value(params.clone()) {
        Ok(notification) => notification,
        Err(err) => {
            tracing::debug!(%err, "discarding undecodable session/update");
            return None;
        }
    };

    match notification.update? {
        SessionUpdate::AgentMessageChunk { content } => Some(TurnEvent::TextDelta {
            text: content.and_then(|c| c.text).unwrap_or_default(),
            stream: OUTPUT_STREAM.to_string(),
        }),
        SessionUpdate::ToolCall { title } => Some(TurnEvent::ToolCall {
            text: title.unwrap_or_else(|| "tool".to_string()),
        }),
        SessionUpdate::ToolCallUpdate {
            tool_call_id,
            status,
        } => Some(TurnEvent::Status {
            text: format!("tool {tool_call_id}: {status}"),
        }),
        SessionUpdate::Other => None,
    }
}
