//! Child-process plumbing for agent sessions.

mod io;
mod spawn;

pub(crate) use io::{spawn_stderr_logger, stdout_lines};
pub(crate) use spawn::{probe_help, spawn_agent, terminate, SpawnedAgent};
