//! JSON-RPC transport over an agent's stdio.
//!
//! One [`Transport`] exists per agent child. It owns the stdin writer, the
//! pending-request map, the id counter, and the single-slot notification
//! sink consumed by the turn engine. [`run_reader`] drives the stdout side
//! as a background task and routes each line through
//! [`Transport::dispatch`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;

use crate::events::TurnEvent;
use crate::process;
use crate::protocol::jsonrpc::{self, InboundMessage, CONTROL_TIMEOUT};
use crate::protocol::update;
use crate::{Error, Result};

type Pending = HashMap<u64, oneshot::Sender<Result<Value>>>;

/// Request/response state for one agent child.
pub(crate) struct Transport {
    session_key: String,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
    sink: Mutex<Option<mpsc::UnboundedSender<TurnEvent>>>,
    /// Cancelled once the child's stdout closes or the process exits.
    closed: CancellationToken,
}

impl Transport {
    pub fn new(session_key: String, stdin: ChildStdin) -> Arc<Self> {
        Arc::new(Self {
            session_key,
            stdin: tokio::sync::Mutex::new(stdin),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sink: Mutex::new(None),
            closed: CancellationToken::new(),
        })
    }

    /// Token cancelled when the transport shuts down.
    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Send a control-plane request and await its response, subject to
    /// [`CONTROL_TIMEOUT`]. On expiry the pending entry is removed and the
    /// caller gets a timeout error naming the method.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        debug_assert!(jsonrpc::is_control(method), "{method} is not a control method");

        let (id, rx) = self.send(method, params).await?;
        match tokio::time::timeout(CONTROL_TIMEOUT, rx).await {
            Ok(received) => flatten(received),
            Err(_) => {
                self.take_pending(id);
                Err(Error::Timeout {
                    method: method.to_string(),
                    after: CONTROL_TIMEOUT,
                })
            }
        }
    }

    /// Send a request with no deadline. Used for `session/prompt`, which
    /// completes only when the agent finishes streaming the turn.
    pub async fn request_untimed(&self, method: &str, params: Value) -> Result<Value> {
        let (_id, rx) = self.send(method, params).await?;
        flatten(rx.await)
    }

    async fn send(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            // Registration and the closed check share the lock so a
            // concurrent shutdown either sees this entry or rejects us.
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            if self.closed.is_cancelled() {
                return Err(Error::ProcessExited);
            }
            pending.insert(id, tx);
        }

        let message = jsonrpc::request(id, method, params);
        if let Err(err) = self.write_line(&message).await {
            self.take_pending(id);
            return Err(err);
        }

        tracing::debug!(session_key = %self.session_key, method = %method, id, "request sent");
        Ok((id, rx))
    }

    fn take_pending(&self, id: u64) -> Option<oneshot::Sender<Result<Value>>> {
        self.pending.lock().expect("pending lock poisoned").remove(&id)
    }

    /// Serialize `message` and write it as one framed line to stdin.
    pub async fn write_line(&self, message: &Value) -> Result<()> {
        let mut bytes = serde_json::to_vec(message)?;
        bytes.push(b'\n');

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(&bytes).await.map_err(Error::io)?;
        stdin.flush().await.map_err(Error::io)?;
        Ok(())
    }

    /// Install the notification sink for the active turn, replacing any
    /// previous holder.
    pub fn set_sink(&self, sender: mpsc::UnboundedSender<TurnEvent>) {
        *self.sink.lock().expect("sink lock poisoned") = Some(sender);
    }

    /// Clear the sink, but only if `sender` still owns the slot.
    pub fn clear_sink(&self, sender: &mpsc::UnboundedSender<TurnEvent>) {
        let mut slot = self.sink.lock().expect("sink lock poisoned");
        if slot.as_ref().is_some_and(|current| current.same_channel(sender)) {
            *slot = None;
        }
    }

    /// Route one decoded stdout line.
    async fn dispatch(&self, line: &str) {
        let message: Value = match serde_json::from_str(line.trim()) {
            Ok(value) => value,
            Err(_) => {
                // Agents may print prelude noise before speaking JSON.
                tracing::debug!(session_key = %self.session_key, "skipping non-JSON stdout line");
                return;
            }
        };

        match jsonrpc::classify(message) {
            InboundMessage::AgentRequest { id } => {
                // Decline immediately so the agent does not stall on the id.
                let reply = jsonrpc::method_not_supported(&id);
                if let Err(err) = self.write_line(&reply).await {
                    tracing::warn!(session_key = %self.session_key, %err, "failed to decline agent request");
                }
            }

            InboundMessage::Response { id, result } => {
                let Some(tx) = self.take_pending(id) else {
                    tracing::debug!(session_key = %self.session_key, id, "response for unknown request id");
                    return;
                };
                let outcome = result.map_err(|error| Error::rpc(error.to_string()));
                let _ = tx.send(outcome);
            }

            InboundMessage::Update { params } => {
                if let Some(event) = update::map_notification(&params) {
                    let slot = self.sink.lock().expect("sink lock poisoned");
                    if let Some(sink) = slot.as_ref() {
                        let _ = sink.send(event);
                    }
                }
            }

            InboundMessage::Ignored => {}
        }
    }

    /// Close the transport: reject every pending request and flag the
    /// closed token. Idempotent.
    pub fn mark_closed(&self) {
        self.closed.cancel();

        // Move the map out before completing entries so nothing can
        // observe a half-drained state.
        let drained: Pending =
            std::mem::take(&mut *self.pending.lock().expect("pending lock poisoned"));
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::ProcessExited));
        }
    }
}

fn flatten(
    received: std::result::Result<Result<Value>, oneshot::error::RecvError>,
) -> Result<Value> {
    match received {
        Ok(outcome) => outcome,
        // Sender dropped without completing: the transport was torn down.
        Err(_) => Err(Error::ProcessExited),
    }
}

/// Read loop over the agent's stdout.
///
/// Runs until EOF or an unrecoverable I/O error, then closes the
/// transport. Oversized lines are skipped, not fatal.
pub(crate) async fn run_reader(transport: Arc<Transport>, stdout: ChildStdout) {
    let mut lines = process::stdout_lines(stdout);

    loop {
        match lines.next().await {
            None => {
                tracing::debug!(session_key = %transport.session_key, "agent stdout closed");
                break;
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(session_key = %transport.session_key, "skipping oversized stdout line");
            }
            Some(Err(LinesCodecError::Io(err))) => {
                tracing::warn!(session_key = %transport.session_key, %err, "agent stdout read failed");
                break;
            }
            Some(Ok(line)) => transport.dispatch(&line).await,
        }
    }

    transport.mark_closed();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Transport>();
    }

    #[tokio::test]
    async fn flatten_maps_dropped_sender_to_process_exit() {
        let (tx, rx) = oneshot::channel::<Result<Value>>();
        drop(tx);
        assert!(matches!(flatten(rx.await), Err(Error::ProcessExited)));
    }

    #[tokio::test]
    async fn flatten_passes_through_outcomes() {
        let (tx, rx) = oneshot::channel::<Result<Value>>();
        tx.send(Ok(Value::Bool(true))).unwrap();
        assert_eq!(flatten(rx.await).unwrap(), Value::Bool(true));
    }
}
