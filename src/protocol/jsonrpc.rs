//! JSON-RPC 2.0 framing for the ACP stdio dialect.
//!
//! One JSON object per line in both directions. The adapter allocates
//! numeric request ids; agents may use any id shape for their own requests,
//! which are echoed back verbatim in the decline reply.

use std::time::Duration;

use serde_json::{json, Value};

/// Protocol version field of every envelope.
pub const VERSION: &str = "2.0";

/// JSON-RPC error code for a method the receiving side does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Deadline applied to control-plane requests.
///
/// `session/prompt` is exempt: it is the streaming request and completes
/// only when the agent finishes the turn.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Request and notification method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const SESSION_NEW: &str = "session/new";
    pub const SESSION_PROMPT: &str = "session/prompt";
    pub const SESSION_CANCEL: &str = "session/cancel";
    pub const SESSION_SET_MODE: &str = "session/set_mode";
    pub const SESSION_UPDATE: &str = "session/update";
}

/// Control methods are expected to return quickly and carry
/// [`CONTROL_TIMEOUT`].
pub fn is_control(method: &str) -> bool {
    matches!(
        method,
        methods::INITIALIZE
            | methods::SESSION_NEW
            | methods::SESSION_CANCEL
            | methods::SESSION_SET_MODE
    )
}

/// Build an outbound request envelope.
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Reply sent for agent-initiated requests.
///
/// The adapter implements none of them; answering immediately keeps the
/// agent from stalling on an id that would otherwise never resolve.
pub fn method_not_supported(id: &Value) -> Value {
    json!({
        "jsonrpc": VERSION,
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": "Method not supported by this client",
        },
    })
}

/// One parsed line of agent stdout, classified for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Request originated by the agent; must be declined.
    AgentRequest { id: Value },

    /// Response to one of the adapter's requests. `result` is `Err` when
    /// the envelope carried an `error` member.
    Response {
        id: u64,
        result: std::result::Result<Value, Value>,
    },

    /// A `session/update` notification.
    Update { params: Value },

    /// Anything else: unknown notifications, responses with ids the
    /// adapter never allocated, non-object payloads.
    Ignored,
}

/// Classify a decoded stdout message.
pub fn classify(message: Value) -> InboundMessage {
    let Some(obj) = message.as_object() else {
        return InboundMessage::Ignored;
    };

    let id = obj.get("id").filter(|v| !v.is_null());
    let method = obj.get("method").and_then(Value::as_str);

    match (id, method) {
        // id + method: the agent is asking us something.
        (Some(id), Some(_)) => InboundMessage::AgentRequest { id: id.clone() },

        // id without method: a response. Our ids are always u64.
        (Some(id), None) => {
            let Some(id) = id.as_u64() else {
                return InboundMessage::Ignored;
            };
            if let Some(error) = obj.get("error").filter(|v| !v.is_null()) {
                InboundMessage::Response {
                    id,
                    result: Err(error.clone()),
                }
            } else {
                InboundMessage::Response {
                    id,
                    result: Ok(obj.get("result").cloned().unwrap_or(Value::Null)),
                }
            }
        }

        (None, Some(method)) if method == methods::SESSION_UPDATE => InboundMessage::Update {
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        },

        _ => InboundMessage::Ignored,
    }
}
