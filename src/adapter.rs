//! High-level adapter surface exposed to the host gateway.
//!
//! [`AcpAdapter`] is the entry point: it holds the resolved config, the
//! session registry, and the health flag maintained by the availability
//! probe.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use openclaw_acp::{AcpAdapter, AgentConfig, EnsureSessionRequest, TurnRequest};
//!
//! let adapter = AcpAdapter::new(AgentConfig::default());
//!
//! let handle = adapter
//!     .ensure_session(EnsureSessionRequest {
//!         session_key: "chat-1".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let mut events = adapter
//!     .run_turn(TurnRequest {
//!         handle,
//!         text: "hello".into(),
//!         mode: None,
//!         request_id: None,
//!         signal: None,
//!     })
//!     .await?;
//!
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::process;
use crate::protocol::jsonrpc::methods;
use crate::registry::{EnsureSessionRequest, SessionHandle, SessionRegistry};
use crate::turn::{TurnRequest, TurnStream};
use crate::{Error, Result};

/// Error code reported when the configured agent binary is unavailable.
pub const BACKEND_UNAVAILABLE: &str = "ACP_BACKEND_UNAVAILABLE";

/// Runtime adapter driving ACP agent processes.
///
/// One adapter serves many logical sessions; each session key maps to at
/// most one live child process. The adapter is `Send + Sync` and can be
/// shared across tasks behind an `Arc`.
pub struct AcpAdapter {
    config: Arc<AgentConfig>,
    registry: SessionRegistry,
    healthy: AtomicBool,
}

impl AcpAdapter {
    /// Create an adapter for the given resolved config.
    pub fn new(config: AgentConfig) -> Self {
        let config = Arc::new(config);
        Self {
            registry: SessionRegistry::new(Arc::clone(&config)),
            config,
            healthy: AtomicBool::new(false),
        }
    }

    /// Get a reference to the adapter's configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Return a handle to the live session for the request's key, spawning
    /// and handshaking a fresh agent when needed.
    ///
    /// Concurrent calls for the same key share a single handshake. If the
    /// requested working directory differs from the live session's, the
    /// old child is terminated and a fresh one is started.
    ///
    /// # Errors
    ///
    /// Propagates spawn and handshake failures. A failed initialization is
    /// never cached; the next call re-attempts from scratch.
    pub async fn ensure_session(&self, request: EnsureSessionRequest) -> Result<SessionHandle> {
        self.registry.ensure(request).await
    }

    /// Run one prompt-to-completion cycle.
    ///
    /// Returns a lazy stream of [`TurnEvent`](crate::TurnEvent)s ending in
    /// exactly one terminal `Done` or `Error`. A pre-cancelled signal
    /// short-circuits to `Done { cancelled }` without touching the agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TurnFailed`] when the handle does not refer to a
    /// live session. This is a precondition failure, not a turn event.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnStream> {
        tracing::debug!(
            session_key = %request.handle.session_key,
            request_id = request.request_id.as_deref().unwrap_or(""),
            mode = ?request.mode,
            "starting turn"
        );

        if request
            .signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Ok(TurnStream::pre_cancelled());
        }

        let session = self
            .registry
            .get(&request.handle.session_key)
            .await
            .ok_or_else(|| Error::TurnFailed {
                message: format!(
                    "no live session for key `{}`",
                    request.handle.session_key
                ),
            })?;

        Ok(TurnStream::start(session, request))
    }

    /// Fire `session/cancel` for a running turn.
    ///
    /// Fire-and-forget: failures are logged, not returned. Unknown
    /// sessions are a no-op.
    pub async fn cancel(&self, handle: &SessionHandle, reason: Option<&str>) {
        let Some(session) = self.registry.get(&handle.session_key).await else {
            return;
        };
        tracing::debug!(
            session_key = %handle.session_key,
            reason = reason.unwrap_or(""),
            "cancelling turn"
        );

        let session_id = session.runtime_session_name().to_string();
        tokio::spawn(async move {
            let params = json!({ "sessionId": session_id });
            if let Err(err) = session.request(methods::SESSION_CANCEL, params).await {
                tracing::warn!(%err, "session/cancel failed");
            }
        });
    }

    /// Terminate the session's child and forget it. Unknown sessions are
    /// a no-op.
    pub async fn close(&self, handle: &SessionHandle, reason: &str) {
        tracing::info!(session_key = %handle.session_key, reason = %reason, "closing agent session");
        self.registry.close(&handle.session_key).await;
    }

    /// Switch the agent's session mode via `session/set_mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TurnFailed`] for an unknown session, or the
    /// transport error when the request fails or times out.
    pub async fn set_mode(&self, handle: &SessionHandle, mode: &str) -> Result<()> {
        let session = self
            .registry
            .get(&handle.session_key)
            .await
            .ok_or_else(|| Error::TurnFailed {
                message: format!(
                    "no live session for key `{}`",
                    handle.session_key
                ),
            })?;

        let params = json!({
            "sessionId": session.runtime_session_name(),
            "modeId": mode,
        });
        session.request(methods::SESSION_SET_MODE, params).await?;
        Ok(())
    }

    /// One-line status summary for a session.
    pub async fn status(&self, handle: &SessionHandle) -> SessionStatus {
        let summary = match self.registry.get(&handle.session_key).await {
            Some(session) => format!("running, sessionId={}", session.runtime_session_name()),
            None => "no process".to_string(),
        };
        SessionStatus { summary }
    }

    /// Control operations this adapter supports.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            controls: vec![methods::SESSION_SET_MODE.to_string()],
        }
    }

    /// Probe the configured command with `--help` and record the result.
    ///
    /// Any spawn error leaves the adapter unhealthy.
    pub async fn probe_availability(&self) {
        let healthy = process::probe_help(&self.config).await;
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Result of the most recent [`probe_availability`](Self::probe_availability).
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Probe the agent binary and report a health verdict.
    pub async fn doctor(&self) -> DoctorReport {
        self.probe_availability().await;
        if self.is_healthy() {
            DoctorReport {
                ok: true,
                code: None,
                message: format!("{} available", self.config.command()),
            }
        } else {
            DoctorReport {
                ok: false,
                code: Some(BACKEND_UNAVAILABLE.to_string()),
                message: format!(
                    "{} is not runnable; install it or adjust the configured command",
                    self.config.command()
                ),
            }
        }
    }

    /// SIGTERM every live agent and clear the registry.
    pub async fn close_all(&self) {
        self.registry.close_all().await;
    }
}

/// Status summary for one session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub summary: String,
}

/// Control operations supported by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub controls: Vec<String>,
}

/// Health verdict from [`AcpAdapter::doctor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}
