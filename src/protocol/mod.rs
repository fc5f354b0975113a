//! Wire-level types for the line-delimited JSON-RPC dialect spoken by
//! ACP agents.
//!
//! - [`jsonrpc`]: envelope framing, id rules, inbound classification, and
//!   the control-method timeout rule.
//! - [`update`]: `session/update` notification payloads and their mapping
//!   to [`TurnEvent`](crate::TurnEvent)s.

pub mod jsonrpc;
pub mod update;
