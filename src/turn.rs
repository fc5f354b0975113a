//! Turn engine: one prompt-to-completion cycle as a lazy event stream.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::TurnEvent;
use crate::protocol::jsonrpc::methods;
use crate::registry::SessionHandle;
use crate::session::AgentSession;

/// Stop reason reported for cancelled turns.
pub const STOP_CANCELLED: &str = "cancelled";

/// Stop reason assumed when the agent omits one.
const STOP_END_TURN: &str = "end_turn";

/// Input to [`AcpAdapter::run_turn`](crate::AcpAdapter::run_turn).
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub handle: SessionHandle,
    /// Prompt text forwarded to the agent.
    pub text: String,
    /// Requested mode; recorded in log context only.
    pub mode: Option<String>,
    /// Host correlation id, carried into log records.
    pub request_id: Option<String>,
    /// Abort signal. A signal cancelled before the turn starts
    /// short-circuits to a single `Done { cancelled }`.
    pub signal: Option<CancellationToken>,
}

/// Lazy, finite sequence of [`TurnEvent`]s for one prompt.
///
/// Yields mapped notifications in arrival order followed by exactly one
/// terminal `Done` or `Error`, after which the stream ends. Dropping the
/// stream detaches the session's notification sink and stops the turn's
/// watcher tasks; it does not kill the agent process.
pub struct TurnStream {
    rx: mpsc::UnboundedReceiver<TurnEvent>,
    tx: mpsc::UnboundedSender<TurnEvent>,
    session: Option<Arc<AgentSession>>,
    tasks: Vec<JoinHandle<()>>,
    finished: bool,
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("finished", &self.finished)
            .finish()
    }
}

/// State shared by the turn's completion paths. Whichever of the prompt
/// response, the process-exit hook, or the cancellation hook fires first
/// delivers the terminal event; the rest become no-ops.
struct TurnShared {
    tx: mpsc::UnboundedSender<TurnEvent>,
    done: AtomicBool,
}

impl TurnShared {
    fn finish(&self, event: TurnEvent) {
        if self
            .done
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.tx.send(event);
        }
    }
}

impl TurnStream {
    /// Stream for a signal that was already cancelled when the turn was
    /// requested: a single `Done { cancelled }`, no agent interaction.
    pub(crate) fn pre_cancelled() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TurnEvent::Done {
            stop_reason: STOP_CANCELLED.to_string(),
        });
        Self {
            rx,
            tx,
            session: None,
            tasks: Vec::new(),
            finished: false,
        }
    }

    /// Send `session/prompt` and wire up the turn's event sources.
    pub(crate) fn start(session: Arc<AgentSession>, request: TurnRequest) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(TurnShared {
            tx: tx.clone(),
            done: AtomicBool::new(false),
        });

        // Notifications mapped by the reader flow straight into the buffer.
        session.set_sink(tx.clone());

        let mut tasks = Vec::new();
        let session_id = session.runtime_session_name().to_string();
        let request_id = request.request_id.clone().unwrap_or_default();

        // Prompt request: untimed, resolves when the agent finishes.
        {
            let session = Arc::clone(&session);
            let shared = Arc::clone(&shared);
            let params = json!({
                "sessionId": session_id,
                "prompt": [{ "type": "text", "text": request.text }],
            });
            tasks.push(tokio::spawn(async move {
                match session.request_untimed(methods::SESSION_PROMPT, params).await {
                    Ok(result) => {
                        let stop_reason = result
                            .get("stopReason")
                            .and_then(|v| v.as_str())
                            .unwrap_or(STOP_END_TURN)
                            .to_string();
                        tracing::debug!(request_id = %request_id, stop_reason = %stop_reason, "prompt completed");
                        shared.finish(TurnEvent::Done { stop_reason });
                    }
                    Err(err) => {
                        shared.finish(TurnEvent::Error {
                            message: err.to_string(),
                        });
                    }
                }
            }));
        }

        // Process-exit hook: a child death mid-turn surfaces as an error.
        {
            let exited = session.exited().clone();
            let shared = Arc::clone(&shared);
            tasks.push(tokio::spawn(async move {
                exited.cancelled().await;
                shared.finish(TurnEvent::Error {
                    message: "agent process exited unexpectedly".to_string(),
                });
            }));
        }

        // Cancellation hook: fire session/cancel without blocking the
        // unwind on the round trip, then synthesize the terminal event so
        // the stream ends even if the agent ignores the cancel.
        if let Some(signal) = request.signal {
            let session = Arc::clone(&session);
            let shared = Arc::clone(&shared);
            tasks.push(tokio::spawn(async move {
                signal.cancelled().await;

                let cancel_session = Arc::clone(&session);
                let session_id = cancel_session.runtime_session_name().to_string();
                tokio::spawn(async move {
                    let params = json!({ "sessionId": session_id });
                    if let Err(err) = cancel_session
                        .request(methods::SESSION_CANCEL, params)
                        .await
                    {
                        tracing::warn!(%err, "session/cancel failed");
                    }
                });

                shared.finish(TurnEvent::Done {
                    stop_reason: STOP_CANCELLED.to_string(),
                });
            }));
        }

        Self {
            rx,
            tx,
            session: Some(session),
            tasks,
            finished: false,
        }
    }

    /// Release the notification sink and stop the watcher tasks.
    fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            session.clear_sink(&self.tx);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Stream for TurnStream {
    type Item = TurnEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<TurnEvent>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                    this.detach();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.detach();
    }
}
