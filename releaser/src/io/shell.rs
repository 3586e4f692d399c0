//! Shell invocation seam for `shell` steps.
//!
//! The [`CommandRunner`] trait decouples the shell action from real process
//! spawning. Tests use scripted runners that return canned outputs.

use std::path::PathBuf;
use std::process::Command;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::io::config::ShellConfig;
use crate::io::process::{CommandOutput, run_command};

/// A fully rendered shell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    /// Command line passed to the shell.
    pub command: String,
    /// Working directory, or the current one when `None`.
    pub workdir: Option<PathBuf>,
    /// Variables added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

/// Abstraction over shell execution backends.
pub trait CommandRunner {
    /// Run the command to completion. `Err` means the process could not be launched.
    fn run(&self, request: &ShellRequest) -> Result<CommandOutput>;
}

/// Runner that spawns `<program> <args..> <command>` (e.g. `bash -c`).
#[derive(Debug, Clone)]
pub struct SystemShell {
    program: String,
    args: Vec<String>,
    output_limit_bytes: usize,
}

impl SystemShell {
    pub fn new(shell: &ShellConfig, output_limit_bytes: usize) -> Self {
        Self {
            program: shell.program.clone(),
            args: shell.args.clone(),
            output_limit_bytes,
        }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new(
            &ShellConfig::default(),
            crate::io::config::DEFAULT_OUTPUT_LIMIT_BYTES,
        )
    }
}

impl CommandRunner for SystemShell {
    #[instrument(skip_all, fields(program = %self.program, workdir = ?request.workdir))]
    fn run(&self, request: &ShellRequest) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(&request.command);
        if let Some(workdir) = &request.workdir {
            cmd.current_dir(workdir);
        }
        cmd.envs(request.env.iter().map(|(k, v)| (k, v)));

        debug!(env_count = request.env.len(), "running shell command");
        run_command(cmd, self.output_limit_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str) -> ShellRequest {
        ShellRequest {
            command: command.to_string(),
            workdir: None,
            env: Vec::new(),
        }
    }

    #[test]
    fn runs_through_configured_shell() {
        let output = SystemShell::default().run(&request("echo hi")).expect("run");
        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout_text(), "hi\n");
    }

    #[test]
    fn applies_workdir_and_extends_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut req = request("pwd; echo \"$RELEASER_TEST_VAR\"; test -n \"$PATH\" && echo path");
        req.workdir = Some(temp.path().to_path_buf());
        req.env = vec![("RELEASER_TEST_VAR".to_string(), "value".to_string())];

        let output = SystemShell::default().run(&req).expect("run");
        let stdout = output.stdout_text();
        let lines: Vec<&str> = stdout.lines().collect();
        let expected = temp.path().canonicalize().expect("canonicalize");
        assert_eq!(
            std::path::Path::new(lines[0]).canonicalize().expect("pwd"),
            expected
        );
        assert_eq!(lines[1], "value");
        assert_eq!(lines[2], "path");
    }

    #[test]
    fn missing_workdir_fails_to_launch() {
        let mut req = request("true");
        req.workdir = Some(PathBuf::from("/definitely/not/a/dir"));
        assert!(SystemShell::default().run(&req).is_err());
    }
}
