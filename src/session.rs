//! Per-session aggregate binding a child process to its transport.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::events::TurnEvent;
use crate::process;
use crate::rpc::{self, Transport};
use crate::Result;

/// Shared registry map from session key to live session.
pub(crate) type SessionMap = Arc<tokio::sync::Mutex<HashMap<String, Arc<AgentSession>>>>;

/// One live agent child and its transport state.
///
/// Sessions are created by the registry, shared behind `Arc`, and torn
/// down when the child exits, the host closes them, or a working-directory
/// change invalidates them. The child itself is owned by a monitor task
/// that observes exit and performs the cleanup.
pub(crate) struct AgentSession {
    session_key: String,
    transport: Arc<Transport>,
    /// Assigned once after a successful `session/new`; never reassigned.
    session_id: OnceLock<String>,
    cwd: PathBuf,
    /// Cancelling this asks the monitor task to terminate the child.
    kill: CancellationToken,
    pid: Option<u32>,
}

impl AgentSession {
    /// Spawn the agent child and start its reader, stderr, and monitor
    /// tasks. The session is not yet registered; the caller inserts it
    /// into the map once the handshake succeeds.
    pub fn spawn(
        config: &AgentConfig,
        sessions: SessionMap,
        session_key: &str,
        cwd: PathBuf,
    ) -> Result<Arc<Self>> {
        let spawned = process::spawn_agent(config, &cwd)?;
        let pid = spawned.child.id();

        let transport = Transport::new(session_key.to_string(), spawned.stdin);
        let session = Arc::new(Self {
            session_key: session_key.to_string(),
            transport: Arc::clone(&transport),
            session_id: OnceLock::new(),
            cwd,
            kill: CancellationToken::new(),
            pid,
        });

        tokio::spawn(rpc::run_reader(transport, spawned.stdout));
        process::spawn_stderr_logger(session_key.to_string(), spawned.stderr);
        spawn_monitor(Arc::clone(&session), spawned.child, sessions);

        tracing::info!(session_key = %session_key, pid = ?pid, "agent process spawned");
        Ok(session)
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Record the agent-assigned session id after `session/new`.
    pub fn record_session_id(&self, id: String) {
        let _ = self.session_id.set(id);
    }

    /// Agent-assigned session id, or the session key when the agent
    /// omitted one.
    pub fn runtime_session_name(&self) -> &str {
        self.session_id
            .get()
            .map(String::as_str)
            .unwrap_or(&self.session_key)
    }

    /// Send a control-plane request (30-second deadline).
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.transport.request(method, params).await
    }

    /// Send the untimed streaming request (`session/prompt`).
    pub async fn request_untimed(&self, method: &str, params: Value) -> Result<Value> {
        self.transport.request_untimed(method, params).await
    }

    /// Install the notification sink for the active turn.
    pub fn set_sink(&self, sender: mpsc::UnboundedSender<TurnEvent>) {
        self.transport.set_sink(sender);
    }

    /// Release the notification sink if `sender` still holds it.
    pub fn clear_sink(&self, sender: &mpsc::UnboundedSender<TurnEvent>) {
        self.transport.clear_sink(sender);
    }

    /// Token cancelled when the child's stdout closes or the process exits.
    pub fn exited(&self) -> &CancellationToken {
        self.transport.closed()
    }

    /// Ask the monitor task to SIGTERM the child.
    pub fn terminate(&self) {
        self.kill.cancel();
    }
}

/// Watch for child exit (or a terminate request), then close the transport
/// and drop the registry entry.
fn spawn_monitor(session: Arc<AgentSession>, mut child: Child, sessions: SessionMap) {
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => {
                        tracing::info!(session_key = %session.session_key, %status, "agent process exited");
                    }
                    Err(err) => {
                        tracing::warn!(session_key = %session.session_key, %err, "failed waiting on agent process");
                    }
                }
            }
            _ = session.kill.cancelled() => {
                process::terminate(&mut child).await;
            }
        }

        // Reject outstanding requests, then drop the registry entry unless
        // a replacement session already took the key.
        session.transport.mark_closed();
        let mut map = sessions.lock().await;
        if map
            .get(&session.session_key)
            .is_some_and(|current| Arc::ptr_eq(current, &session))
        {
            map.remove(&session.session_key);
        }
    });
}
