//! Helpers for integration tests: scripted ACP agents backed by `sh`.

use std::future::Future;
use std::time::Duration;

use openclaw_acp::{AgentConfig, EnsureSessionRequest, SessionHandle, TurnRequest};

/// Handshake replies for the adapter's `initialize` (id 1) and
/// `session/new` (id 2) requests.
pub const HANDSHAKE: &str = r#"read line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"0.1"}}'
read line
echo '{"jsonrpc":"2.0","id":2,"result":{"sessionId":"mock-session-1"}}'"#;

/// Shell fragment that keeps the agent alive until its stdin closes.
pub const STAY_ALIVE: &str = "cat > /dev/null";

/// Initialize test logging once; set `RUST_LOG` to see adapter output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config that runs `script` through `sh -c` as the agent process.
pub fn scripted_agent(script: &str) -> AgentConfig {
    AgentConfig::builder()
        .command("sh")
        .args(["-c", script])
        .build()
        .expect("scripted agent config is valid")
}

/// Ensure request for `key` with defaults.
pub fn ensure(key: &str) -> EnsureSessionRequest {
    EnsureSessionRequest {
        session_key: key.into(),
        ..Default::default()
    }
}

/// Turn request with no mode, request id, or signal.
pub fn turn(handle: SessionHandle, text: &str) -> TurnRequest {
    TurnRequest {
        handle,
        text: text.into(),
        mode: None,
        request_id: None,
        signal: None,
    }
}

/// Await `fut`, failing the test if it takes longer than ten seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("test timed out")
}
