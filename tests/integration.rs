#![cfg(unix)]
//! Integration tests driving the adapter against scripted `sh` agents.
//!
//! Each scenario spawns a real child process whose replies are scripted
//! line by line, exercising the spawn/handshake/turn pipeline end to end.

mod common;

use std::time::Duration;

use futures::StreamExt;
use openclaw_acp::{AcpAdapter, AgentConfig, SessionHandle, TurnEvent};
use tokio_util::sync::CancellationToken;

/// Handle for a session that was never created.
fn ghost_handle(key: &str) -> SessionHandle {
    SessionHandle {
        session_key: key.into(),
        backend_id: "acp".into(),
        runtime_session_name: key.into(),
        cwd: std::env::current_dir().unwrap(),
    }
}

#[tokio::test]
async fn happy_path_streams_updates_then_completes() {
    common::init_tracing();
    let script = [
        common::HANDSHAKE,
        "read line",
        r#"echo '{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"mock-session-1","update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text","text":"hello"}}}}'"#,
        r#"echo '{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"mock-session-1","update":{"sessionUpdate":"tool_call","title":"Read file"}}}'"#,
        r#"echo '{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"mock-session-1","update":{"sessionUpdate":"tool_call_update","toolCallId":"call-1","status":"completed"}}}'"#,
        r#"echo '{"jsonrpc":"2.0","id":3,"result":{"stopReason":"end_turn"}}'"#,
    ]
    .join("\n");

    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    assert_eq!(handle.backend_id, "acp");
    assert_eq!(handle.runtime_session_name, "mock-session-1");

    let stream = common::within(adapter.run_turn(common::turn(handle, "hi")))
        .await
        .unwrap();
    let events = common::within(stream.collect::<Vec<_>>()).await;

    assert_eq!(events[0], TurnEvent::text_delta("hello"));
    assert!(events.contains(&TurnEvent::ToolCall {
        text: "Read file".into()
    }));
    assert!(events.contains(&TurnEvent::Status {
        text: "tool call-1: completed".into()
    }));
    assert_eq!(events.last().unwrap().stop_reason(), Some("end_turn"));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    adapter.close_all().await;
}

#[tokio::test]
async fn repeated_ensure_reuses_the_live_session() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawns.log");
    let script = format!(
        "echo spawn >> {}\n{}\n{}",
        marker.display(),
        common::HANDSHAKE,
        common::STAY_ALIVE,
    );

    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let first = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();
    let second = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.runtime_session_name, "mock-session-1");

    let spawns = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(spawns.lines().count(), 1, "only one child may be spawned");

    adapter.close_all().await;
}

#[tokio::test]
async fn concurrent_ensure_shares_one_handshake() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawns.log");
    let script = format!(
        "echo spawn >> {}\n{}\n{}",
        marker.display(),
        common::HANDSHAKE,
        common::STAY_ALIVE,
    );

    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let (first, second) = common::within(async {
        tokio::join!(
            adapter.ensure_session(common::ensure("s1")),
            adapter.ensure_session(common::ensure("s1")),
        )
    })
    .await;

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first, second);

    let spawns = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(spawns.lines().count(), 1, "handshake must be shared");

    adapter.close_all().await;
}

#[tokio::test]
async fn cwd_change_restarts_the_agent() {
    common::init_tracing();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let script = format!("{}\n{}", common::HANDSHAKE, common::STAY_ALIVE);
    let adapter = AcpAdapter::new(common::scripted_agent(&script));

    let mut request = common::ensure("s1");
    request.cwd = Some(dir_a.path().to_path_buf());
    let first = common::within(adapter.ensure_session(request)).await.unwrap();
    assert_eq!(first.cwd, dir_a.path());

    let mut request = common::ensure("s1");
    request.cwd = Some(dir_b.path().to_path_buf());
    let second = common::within(adapter.ensure_session(request)).await.unwrap();

    assert_eq!(second.cwd, dir_b.path());
    assert_eq!(second.runtime_session_name, "mock-session-1");

    adapter.close_all().await;
}

#[tokio::test]
async fn failed_initialization_is_never_cached() {
    common::init_tracing();
    let script = [
        "read line",
        r#"echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"bad init"}}'"#,
    ]
    .join("\n");
    let adapter = AcpAdapter::new(common::scripted_agent(&script));

    let first = common::within(adapter.ensure_session(common::ensure("s1"))).await;
    let second = common::within(adapter.ensure_session(common::ensure("s1"))).await;

    assert!(first.unwrap_err().to_string().contains("bad init"));
    assert!(second.unwrap_err().to_string().contains("bad init"));

    let status = adapter.status(&ghost_handle("s1")).await;
    assert_eq!(status.summary, "no process");
}

#[tokio::test]
async fn probe_reports_missing_binary() {
    let config = AgentConfig::builder()
        .command("/no/such/binary")
        .build()
        .unwrap();
    let adapter = AcpAdapter::new(config);

    adapter.probe_availability().await;
    assert!(!adapter.is_healthy());

    let report = adapter.doctor().await;
    assert!(!report.ok);
    assert_eq!(report.code.as_deref(), Some("ACP_BACKEND_UNAVAILABLE"));
}

#[tokio::test]
async fn probe_reports_runnable_binary() {
    let config = AgentConfig::builder().command("true").build().unwrap();
    let adapter = AcpAdapter::new(config);

    let report = adapter.doctor().await;
    assert!(report.ok);
    assert_eq!(report.code, None);
    assert!(adapter.is_healthy());
    assert!(report.message.contains("true available"));
}

#[tokio::test]
async fn cancellation_unwinds_a_hung_agent_turn() {
    common::init_tracing();
    let script = format!("{}\nread line\nsleep 30", common::HANDSHAKE);
    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    let signal = CancellationToken::new();
    let mut request = common::turn(handle, "hang forever");
    request.signal = Some(signal.clone());
    let stream = common::within(adapter.run_turn(request)).await.unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        signal.cancel();
    });

    let events = common::within(stream.collect::<Vec<_>>()).await;
    assert_eq!(
        events,
        vec![TurnEvent::Done {
            stop_reason: "cancelled".into()
        }]
    );

    adapter.close_all().await;
}

#[tokio::test]
async fn pre_aborted_signal_short_circuits() {
    common::init_tracing();
    let script = format!("{}\n{}", common::HANDSHAKE, common::STAY_ALIVE);
    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    let signal = CancellationToken::new();
    signal.cancel();
    let mut request = common::turn(handle, "never sent");
    request.signal = Some(signal);

    let stream = common::within(adapter.run_turn(request)).await.unwrap();
    let events = common::within(stream.collect::<Vec<_>>()).await;
    assert_eq!(
        events,
        vec![TurnEvent::Done {
            stop_reason: "cancelled".into()
        }]
    );

    adapter.close_all().await;
}

#[tokio::test]
async fn agent_exit_mid_prompt_yields_an_error_event() {
    common::init_tracing();
    let script = format!("{}\nread line\nexit 1", common::HANDSHAKE);
    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    let stream = common::within(adapter.run_turn(common::turn(handle, "hi")))
        .await
        .unwrap();
    let events = common::within(stream.collect::<Vec<_>>()).await;

    match events.last().unwrap() {
        TurnEvent::Error { message } => {
            assert!(
                message.starts_with("agent process exited"),
                "unexpected message: {message}"
            );
        }
        other => panic!("expected an error event, got {other:?}"),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn non_json_lines_are_tolerated() {
    common::init_tracing();
    let script = [
        "echo 'starting agent v1.2 ...'",
        "read line",
        "echo 'not json'",
        r#"echo '{"jsonrpc":"2.0","id":1,"result":{}}'"#,
        "read line",
        r#"echo '{"jsonrpc":"2.0","id":2,"result":{"sessionId":"mock-session-1"}}'"#,
        "read line",
        "echo '???'",
        r#"echo '{"jsonrpc":"2.0","id":3,"result":{"stopReason":"end_turn"}}'"#,
    ]
    .join("\n");

    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    let stream = common::within(adapter.run_turn(common::turn(handle, "hi")))
        .await
        .unwrap();
    let events = common::within(stream.collect::<Vec<_>>()).await;

    assert_eq!(
        events.last().unwrap(),
        &TurnEvent::Done {
            stop_reason: "end_turn".into()
        }
    );
}

#[tokio::test]
async fn agent_initiated_requests_are_declined() {
    common::init_tracing();
    let script = [
        common::HANDSHAKE,
        "read line",
        r#"echo '{"jsonrpc":"2.0","id":77,"method":"fs/read_text_file","params":{"path":"/x"}}'"#,
        "read reply",
        r#"case "$reply" in *"-32601"*) echo '{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"mock-session-1","update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text","text":"declined"}}}}' ;; esac"#,
        r#"echo '{"jsonrpc":"2.0","id":3,"result":{"stopReason":"end_turn"}}'"#,
    ]
    .join("\n");

    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    let stream = common::within(adapter.run_turn(common::turn(handle, "hi")))
        .await
        .unwrap();
    let events = common::within(stream.collect::<Vec<_>>()).await;

    // The "declined" delta only arrives if the agent saw our -32601 reply.
    assert!(events.contains(&TurnEvent::text_delta("declined")));
    assert_eq!(events.last().unwrap().stop_reason(), Some("end_turn"));

    adapter.close_all().await;
}

#[tokio::test]
async fn close_all_leaves_no_process() {
    common::init_tracing();
    let script = format!("{}\n{}", common::HANDSHAKE, common::STAY_ALIVE);
    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    let status = adapter.status(&handle).await;
    assert_eq!(status.summary, "running, sessionId=mock-session-1");

    adapter.close_all().await;

    let status = adapter.status(&handle).await;
    assert_eq!(status.summary, "no process");

    let err = adapter
        .run_turn(common::turn(handle, "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("ACP_TURN_FAILED"));
}

#[tokio::test]
async fn set_mode_round_trips() {
    common::init_tracing();
    let script = [
        common::HANDSHAKE,
        "read line",
        r#"echo '{"jsonrpc":"2.0","id":3,"result":{}}'"#,
        common::STAY_ALIVE,
    ]
    .join("\n");

    let adapter = AcpAdapter::new(common::scripted_agent(&script));
    let handle = common::within(adapter.ensure_session(common::ensure("s1")))
        .await
        .unwrap();

    common::within(adapter.set_mode(&handle, "plan"))
        .await
        .unwrap();

    adapter.close_all().await;
}

#[tokio::test]
async fn cancel_and_close_on_unknown_sessions_are_noops() {
    let adapter = AcpAdapter::new(AgentConfig::default());
    let handle = ghost_handle("ghost");

    adapter.cancel(&handle, Some("cleanup")).await;
    adapter.close(&handle, "cleanup").await;

    assert_eq!(adapter.status(&handle).await.summary, "no process");

    let err = adapter.set_mode(&handle, "plan").await.unwrap_err();
    assert_eq!(err.code(), Some("ACP_TURN_FAILED"));
}
