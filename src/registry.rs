//! Session registry: keyed cache of live agents with deduplicated
//! initialization and working-directory invalidation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::{Future, FutureExt, Shared};
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::AgentConfig;
use crate::protocol::jsonrpc::methods;
use crate::session::{AgentSession, SessionMap};
use crate::{Error, Result};

/// Backend identifier reported in session handles.
pub const BACKEND_ID: &str = "acp";

/// ACP protocol version spoken by this adapter.
const PROTOCOL_VERSION: &str = "0.1";

/// Client name reported to agents during `initialize`.
const CLIENT_NAME: &str = "openclaw";

/// Opaque host-facing reference to one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Host-chosen key identifying the logical conversation.
    pub session_key: String,
    /// Always [`BACKEND_ID`] for this adapter.
    pub backend_id: String,
    /// Agent-assigned session id, or the session key when the agent
    /// omitted one.
    pub runtime_session_name: String,
    /// Working directory the agent was spawned in.
    pub cwd: PathBuf,
}

/// Input to [`AcpAdapter::ensure_session`](crate::AcpAdapter::ensure_session).
#[derive(Debug, Clone, Default)]
pub struct EnsureSessionRequest {
    pub session_key: String,
    /// Display name of the agent; logging only.
    pub agent: Option<String>,
    /// Requested session mode; logging only. Mode changes go through
    /// `set_mode` once the session exists.
    pub mode: Option<String>,
    /// Overrides the configured working directory for this session.
    pub cwd: Option<PathBuf>,
}

type SharedInit =
    Shared<Pin<Box<dyn Future<Output = std::result::Result<SessionHandle, Arc<Error>>> + Send>>>;

/// Keyed cache of live agent sessions.
pub(crate) struct SessionRegistry {
    config: Arc<AgentConfig>,
    sessions: SessionMap,
    inflight: Arc<Mutex<HashMap<String, SharedInit>>>,
}

impl SessionRegistry {
    pub fn new(config: Arc<AgentConfig>) -> Self {
        Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Look up the live session for a key.
    pub async fn get(&self, session_key: &str) -> Option<Arc<AgentSession>> {
        self.sessions.lock().await.get(session_key).cloned()
    }

    /// Return a handle for `session_key`, spawning and handshaking a fresh
    /// agent when none is live. Concurrent calls for the same key share
    /// one handshake; a changed working directory restarts the agent.
    pub async fn ensure(&self, request: EnsureSessionRequest) -> Result<SessionHandle> {
        let key = request.session_key.clone();
        tracing::debug!(
            session_key = %key,
            agent = request.agent.as_deref().unwrap_or(BACKEND_ID),
            mode = ?request.mode,
            "ensuring agent session"
        );

        // Join an initialization already in flight for this key.
        if let Some(init) = self.inflight.lock().await.get(&key).cloned() {
            return init.await.map_err(Error::Shared);
        }

        let effective_cwd = request
            .cwd
            .clone()
            .unwrap_or_else(|| self.config.cwd().to_path_buf());

        // Reuse the live session unless its cwd no longer matches.
        {
            let mut sessions = self.sessions.lock().await;
            if let Some(existing) = sessions.get(&key) {
                if existing.cwd() == effective_cwd {
                    return Ok(handle_for(existing));
                }
                tracing::info!(session_key = %key, cwd = %effective_cwd.display(),
                    "working directory changed, restarting agent");
                existing.terminate();
                sessions.remove(&key);
            }
        }

        let init = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(&key) {
                existing.clone()
            } else {
                let fut: SharedInit = init_session(
                    Arc::clone(&self.config),
                    Arc::clone(&self.sessions),
                    Arc::clone(&self.inflight),
                    key.clone(),
                    effective_cwd,
                )
                .boxed()
                .shared();
                inflight.insert(key, fut.clone());
                fut
            }
        };
        init.await.map_err(Error::Shared)
    }

    /// Terminate the session for `session_key` and forget it. No-op when
    /// unknown.
    pub async fn close(&self, session_key: &str) {
        if let Some(session) = self.sessions.lock().await.remove(session_key) {
            session.terminate();
        }
    }

    /// SIGTERM every child and empty the map.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().collect()
        };
        for (_, session) in drained {
            session.terminate();
        }
    }
}

/// Spawn, handshake, and register one agent session.
///
/// The in-flight marker for `key` is removed on every exit path so a
/// failed handshake is never cached.
async fn init_session(
    config: Arc<AgentConfig>,
    sessions: SessionMap,
    inflight: Arc<Mutex<HashMap<String, SharedInit>>>,
    key: String,
    cwd: PathBuf,
) -> std::result::Result<SessionHandle, Arc<Error>> {
    let result = handshake(&config, &sessions, &key, cwd).await.map_err(Arc::new);
    inflight.lock().await.remove(&key);
    result
}

async fn handshake(
    config: &AgentConfig,
    sessions: &SessionMap,
    key: &str,
    cwd: PathBuf,
) -> Result<SessionHandle> {
    let session = AgentSession::spawn(config, Arc::clone(sessions), key, cwd.clone())?;

    let steps = async {
        session
            .request(
                methods::INITIALIZE,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {
                        "name": CLIENT_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;

        session
            .request(
                methods::SESSION_NEW,
                json!({
                    "cwd": cwd.display().to_string(),
                    "mcpServers": [],
                }),
            )
            .await
    };

    match steps.await {
        Ok(created) => {
            let session_id = created
                .get("sessionId")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| key.to_string());
            session.record_session_id(session_id);

            sessions
                .lock()
                .await
                .insert(key.to_string(), Arc::clone(&session));
            tracing::info!(
                session_key = %key,
                session_id = %session.runtime_session_name(),
                "agent session ready"
            );
            Ok(handle_for(&session))
        }
        Err(err) => {
            tracing::warn!(session_key = %key, %err, "agent handshake failed");
            session.terminate();
            Err(err)
        }
    }
}

fn handle_for(session: &AgentSession) -> SessionHandle {
    SessionHandle {
        session_key: session.session_key().to_string(),
        backend_id: BACKEND_ID.to_string(),
        runtime_session_name: session.runtime_session_name().to_string(),
        cwd: session.cwd().to_path_buf(),
    }
}
