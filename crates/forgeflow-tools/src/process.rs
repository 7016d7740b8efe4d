//! Subprocess invocation contract
//!
//! Every external tool call runs with the host configuration directory as
//! working directory, always captures stderr, and optionally pipes stdout.
//! A nonzero exit raises [`ToolError::CommandFailed`] unless the caller
//! disables the check.

use crate::error::{Result, ToolError};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Result of a tool invocation
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code (-1 if terminated by signal)
    pub code: i32,

    /// Captured stdout (empty unless piped)
    pub stdout: String,

    /// Captured stderr
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Invocation options
#[derive(Debug, Clone)]
pub struct RunOpts {
    /// Raise on nonzero exit
    pub check: bool,

    /// Capture stdout instead of inheriting the caller's
    pub pipe_stdout: bool,

    /// Retry the whole command this many times on nonzero exit
    pub retries: u32,

    /// Extra environment variables
    pub envs: Vec<(String, String)>,
}

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            check: true,
            pipe_stdout: false,
            retries: 0,
            envs: Vec::new(),
        }
    }
}

impl RunOpts {
    pub fn piped() -> Self {
        Self {
            pipe_stdout: true,
            ..Self::default()
        }
    }

    pub fn unchecked_piped() -> Self {
        Self {
            check: false,
            pipe_stdout: true,
            ..Self::default()
        }
    }
}

/// Run a tool in a subprocess
///
/// Empty argument strings are dropped, which lets callers pass optional
/// flags like `-no-color` unconditionally.
pub async fn run(program: &str, args: &[&str], cwd: &Path, opts: &RunOpts) -> Result<ExecOutput> {
    let args: Vec<&str> = args.iter().copied().filter(|arg| !arg.is_empty()).collect();
    let mut attempted = 0;

    loop {
        tracing::debug!("Running: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(&args);
        cmd.current_dir(cwd);
        cmd.stdin(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd.stdout(if opts.pipe_stdout {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        for (key, value) in &opts.envs {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound(program.to_string())
            } else {
                ToolError::Io(error)
            }
        })?;
        let output = child.wait_with_output().await?;

        let result = ExecOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && attempted < opts.retries {
            attempted += 1;
            tracing::debug!(
                "Command failed (exit {}), retry {}/{}",
                result.code,
                attempted,
                opts.retries
            );
            continue;
        }

        if opts.check && !result.success() {
            let message = if !result.stderr.trim().is_empty() {
                result.stderr.trim().to_string()
            } else if !result.stdout.trim().is_empty() {
                result.stdout.trim().to_string()
            } else {
                "See stdout for more information.".to_string()
            };
            return Err(ToolError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                message,
            });
        }

        return Ok(result);
    }
}

/// Return a tool version from `<program> version` output
pub async fn version(program: &str, cwd: &Path) -> Result<String> {
    let output = run(program, &["version"], cwd, &RunOpts::piped()).await?;
    let line = output.stdout.lines().next().unwrap_or_default();
    Ok(line
        .rsplit(' ')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('v')
        .to_string())
}
