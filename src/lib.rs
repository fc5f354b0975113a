//! # openclaw-acp
//!
//! Async runtime adapter for driving external agent processes that speak
//! the Agent Client Protocol (ACP): line-delimited JSON-RPC 2.0 over
//! stdin/stdout.
//!
//! The adapter spawns one agent child per logical session, performs the
//! `initialize` / `session/new` handshake, forwards prompts as
//! `session/prompt` requests, demultiplexes responses and `session/update`
//! notifications, and streams a typed event model (text deltas, tool-call
//! notices, completion, error) back to the caller.
//!
//! ## Quick Start
//!
//! ```ignore
//! use futures::StreamExt;
//! use openclaw_acp::{AcpAdapter, AgentConfig, EnsureSessionRequest, TurnEvent, TurnRequest};
//!
//! #[tokio::main]
//! async fn main() -> openclaw_acp::Result<()> {
//!     let adapter = AcpAdapter::new(AgentConfig::default());
//!
//!     let handle = adapter
//!         .ensure_session(EnsureSessionRequest {
//!             session_key: "chat-1".into(),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     let mut events = adapter
//!         .run_turn(TurnRequest {
//!             handle,
//!             text: "What is 2+2?".into(),
//!             mode: None,
//!             request_id: None,
//!             signal: None,
//!         })
//!         .await?;
//!
//!     while let Some(event) = events.next().await {
//!         if let TurnEvent::TextDelta { text, .. } = &event {
//!             print!("{text}");
//!         }
//!     }
//!     adapter.close_all().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Cancellation
//!
//! Turns take an optional `tokio_util::sync::CancellationToken`. Cancelling
//! it fires `session/cancel` at the agent (fire-and-forget) and ends the
//! stream with `Done { stop_reason: "cancelled" }` even if the agent never
//! replies. A token that is already cancelled short-circuits without
//! touching the agent.
//!
//! ## Sessions and invalidation
//!
//! Session keys map 1:1 to child processes. Repeated `ensure_session`
//! calls for the same key reuse the live child; concurrent calls share a
//! single handshake; changing the working directory restarts the agent.
//! Children are terminated with SIGTERM on `close`/`close_all` and reaped
//! by a per-session monitor task.

mod adapter;
mod config;
mod error;
mod events;
mod process;
mod registry;
mod rpc;
mod session;
mod turn;

// Wire-level types, public for hosts that need to inspect payloads.
pub mod protocol;

// ============================================================================
// Core types
// ============================================================================

pub use error::{Error, Result};
pub use adapter::{AcpAdapter, Capabilities, DoctorReport, SessionStatus, BACKEND_UNAVAILABLE};

// ============================================================================
// Configuration
// ============================================================================

pub use config::{AgentConfig, AgentConfigBuilder, DEFAULT_ARGS, DEFAULT_COMMAND};

// ============================================================================
// Sessions and turns
// ============================================================================

pub use events::{TurnEvent, OUTPUT_STREAM};
pub use registry::{EnsureSessionRequest, SessionHandle, BACKEND_ID};
pub use turn::{TurnRequest, TurnStream, STOP_CANCELLED};
