//! Agent process configuration.
//!
//! An [`AgentConfig`] is the resolved shape the adapter runs with:
//! the agent command, its arguments, the working directory, and extra
//! environment variables overlaid on the inherited environment. Build one
//! with the fluent [`AgentConfig::builder`], or validate host-supplied JSON
//! with [`AgentConfig::from_value`].
//!
//! # Example
//!
//! ```ignore
//! use openclaw_acp::AgentConfig;
//!
//! let config = AgentConfig::builder()
//!     .command("kiro-cli")
//!     .args(["acp"])
//!     .env("NO_COLOR", "1")
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{Error, Result};

/// Agent command used when none is configured.
pub const DEFAULT_COMMAND: &str = "kiro-cli";

/// Agent arguments used when none are configured.
pub const DEFAULT_ARGS: &[&str] = &["acp"];

/// Resolved configuration for spawning agent processes.
///
/// Immutable once built; the adapter clones it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) cwd: PathBuf,
    pub(crate) env: HashMap<String, String>,
}

impl AgentConfig {
    /// Create a builder with the default command and arguments.
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Build a config from host-supplied JSON.
    ///
    /// All fields are optional; missing fields take their defaults. Wrong
    /// types are rejected with a path-qualified issue so the host can point
    /// the operator at the offending config entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the bad path, e.g.
    /// `invalid configuration: args[1]: expected a string`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidConfig("expected an object".into()))?;

        let mut builder = Self::builder();

        if let Some(command) = obj.get("command") {
            let command = command
                .as_str()
                .ok_or_else(|| Error::InvalidConfig("command: expected a string".into()))?;
            builder = builder.command(command);
        }

        if let Some(args) = obj.get("args") {
            let args = args
                .as_array()
                .ok_or_else(|| Error::InvalidConfig("args: expected an array".into()))?;
            let mut resolved = Vec::with_capacity(args.len());
            for (index, arg) in args.iter().enumerate() {
                let arg = arg.as_str().ok_or_else(|| {
                    Error::InvalidConfig(format!("args[{index}]: expected a string"))
                })?;
                resolved.push(arg.to_string());
            }
            builder = builder.args(resolved);
        }

        if let Some(cwd) = obj.get("cwd") {
            let cwd = cwd
                .as_str()
                .ok_or_else(|| Error::InvalidConfig("cwd: expected a string".into()))?;
            builder = builder.cwd(cwd);
        }

        if let Some(env) = obj.get("env") {
            let env = env
                .as_object()
                .ok_or_else(|| Error::InvalidConfig("env: expected an object".into()))?;
            for (key, value) in env {
                let value = value.as_str().ok_or_else(|| {
                    Error::InvalidConfig(format!("env.{key}: expected a string"))
                })?;
                builder = builder.env(key, value);
            }
        }

        builder.build()
    }

    /// The agent command.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments passed to the agent command.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Default working directory for spawned agents.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Environment overlaid on the inherited process environment.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
            cwd: default_cwd(),
            env: HashMap::new(),
        }
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone)]
pub struct AgentConfigBuilder {
    command: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl Default for AgentConfigBuilder {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: HashMap::new(),
        }
    }
}

impl AgentConfigBuilder {
    /// Set the agent command.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Replace the argument list.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the default working directory for spawned agents.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add or override one environment variable for the agent.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add or override several environment variables.
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Build the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the command is empty.
    pub fn build(self) -> Result<AgentConfig> {
        if self.command.is_empty() {
            return Err(Error::InvalidConfig("command: must not be empty".into()));
        }
        Ok(AgentConfig {
            command: self.command,
            args: self.args,
            cwd: self.cwd.unwrap_or_else(default_cwd),
            env: self.env,
        })
    }
}

fn default_cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
