//! Stdio plumbing: stdout line framing and stderr logging.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};

/// Maximum accepted stdout line: 1 MiB.
///
/// Longer lines are rejected by the framer instead of buffering without
/// bound for a single message.
pub(crate) const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited UTF-8 reader over the agent's stdout.
///
/// One complete line is one protocol record; whether it parses as JSON is
/// the dispatcher's concern.
pub(crate) fn stdout_lines(stdout: ChildStdout) -> FramedRead<ChildStdout, LinesCodec> {
    FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_BYTES))
}

/// Spawn a task that mirrors the agent's stderr to the log at warn level.
///
/// Stderr is never interpreted as protocol data.
pub(crate) fn spawn_stderr_logger(session_key: String, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim_end();
            if !line.is_empty() {
                tracing::warn!(session_key = %session_key, line = %line, "agent stderr");
            }
        }
    })
}
