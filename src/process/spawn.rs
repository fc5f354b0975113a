//! Agent process spawning and termination.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::AgentConfig;
use crate::{Error, Result};

/// Grace period between the termination signal and a forced kill.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// A freshly spawned agent child with its three stdio pipes captured.
pub(crate) struct SpawnedAgent {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn the configured agent with pipes on stdin, stdout, and stderr.
///
/// The child inherits the parent environment overlaid with the config's
/// `env` entries and starts in `cwd`. The process is killed automatically
/// if its handle is dropped without an explicit [`terminate`].
pub(crate) fn spawn_agent(config: &AgentConfig, cwd: &Path) -> Result<SpawnedAgent> {
    let mut cmd = command_for(config.command());
    cmd.args(config.args())
        .current_dir(cwd)
        .envs(config.env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| spawn_error(err, config.command()))?;

    let stdin = child.stdin.take().expect("stdin was configured");
    let stdout = child.stdout.take().expect("stdout was configured");
    let stderr = child.stderr.take().expect("stderr was configured");

    Ok(SpawnedAgent {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Run `<command> --help` with stdio discarded, returning whether it
/// exited successfully.
pub(crate) async fn probe_help(config: &AgentConfig) -> bool {
    let mut cmd = command_for(config.command());
    cmd.arg("--help")
        .envs(config.env())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match cmd.status().await {
        Ok(status) => status.success(),
        Err(err) => {
            tracing::debug!(command = config.command(), %err, "availability probe failed to spawn");
            false
        }
    }
}

/// Terminate a child: SIGTERM, a grace period, then a forced kill.
///
/// Reaps the process before returning so no zombie is left behind.
pub(crate) async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a live child owned by this handle.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
        tracing::warn!(pid, "agent ignored SIGTERM, forcing kill");
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn spawn_error(err: std::io::Error, command: &str) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::AgentNotFound {
            searched: command.to_string(),
        }
    } else {
        Error::ProcessSpawn(err)
    }
}

/// Build the base `Command`, routing `.cmd`/`.bat` scripts through the
/// shell interpreter on Windows. Everything else spawns directly.
fn command_for(program: &str) -> Command {
    if cfg!(windows) && needs_shell(program) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(program);
        cmd
    } else {
        Command::new(program)
    }
}

/// Whether a command must be launched via `cmd /C` on Windows.
fn needs_shell(program: &str) -> bool {
    Path::new(program)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("cmd") || ext.eq_ignore_ascii_case("bat"))
}
