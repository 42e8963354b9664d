//! Command execution with timeouts.
//!
//! A [`CommandRunner`] turns an [`Invocation`] into captured output or a
//! typed error. [`ProcessRunner`] spawns the tool directly (no shell) from
//! the configured tool directory in its own process group, and kills the
//! whole group when the timeout expires.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::command::Invocation;
use crate::error::{GpfsError, Result};

/// Default tool installation directory.
pub const DEFAULT_TOOL_DIR: &str = "/usr/lpp/mmfs/bin";

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Execution environment for tool invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    pub tool_dir: PathBuf,
    pub timeout: Duration,
    /// Extra environment variables; the parent environment is inherited.
    pub env: BTreeMap<String, String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            tool_dir: PathBuf::from(DEFAULT_TOOL_DIR),
            timeout: DEFAULT_TIMEOUT,
            env: BTreeMap::new(),
        }
    }
}

impl ExecConfig {
    /// Absolute path of `program`; names containing a `/` are used as given.
    pub fn resolve(&self, program: &str) -> PathBuf {
        if program.contains('/') {
            PathBuf::from(program)
        } else {
            self.tool_dir.join(program)
        }
    }
}

/// Output of a successful (exit code 0) invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// Runs invocations against the cluster.
///
/// Implementations must return [`GpfsError::CommandExecution`] for non-zero
/// exits, so callers only ever see successful output in `Ok`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation` to completion or timeout.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// [`CommandRunner`] that spawns local processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    config: ExecConfig,
}

impl ProcessRunner {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }
}

/// Sends SIGKILL to every process in group `pgid`.
fn kill_process_group(pgid: u32) {
    let ret = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group already exited
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill process group");
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    if let Some(pipe) = pipe {
        pipe.read_to_end(buf).await?;
    }
    Ok(())
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let path = self.config.resolve(&invocation.program);
        let rendered = invocation.render();
        let started = Instant::now();

        // own process group, so a timeout reaches the helpers the tool forks
        let mut child = Command::new(&path)
            .args(&invocation.args)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(tool = %path.display(), error = %e, "failed to spawn tool");
                GpfsError::ToolUnavailable {
                    tool: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let finished = tokio::time::timeout(self.config.timeout, async {
            let (status, _, _) = tokio::try_join!(
                child.wait(),
                read_pipe(stdout_pipe.as_mut(), &mut stdout),
                read_pipe(stderr_pipe.as_mut(), &mut stderr),
            )?;
            Ok::<_, std::io::Error>(status)
        })
        .await;

        let status = match finished {
            Ok(result) => result.map_err(|e| GpfsError::ToolUnavailable {
                tool: path.display().to_string(),
                reason: format!("failed to collect output: {}", e),
            })?,
            Err(_) => {
                if let Some(pgid) = child.id() {
                    kill_process_group(pgid);
                }
                if let Err(e) = child.wait().await {
                    tracing::debug!(command = %rendered, error = %e, "failed to reap timed-out command");
                }
                tracing::warn!(
                    command = %rendered,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "command timed out, process group killed"
                );
                return Err(GpfsError::CommandTimeout {
                    command: rendered,
                    timeout: self.config.timeout,
                });
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.success() {
            tracing::warn!(command = %rendered, exit_code, elapsed_ms, "command failed");
            // diagnostics only, never parsed
            let stderr = String::from_utf8_lossy(&stderr);
            let stdout = String::from_utf8_lossy(&stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(GpfsError::CommandExecution {
                command: rendered,
                exit_code,
                stderr: detail.to_string(),
            });
        }

        let stdout = decode(&rendered, "stdout", stdout)?;
        let stderr = decode(&rendered, "stderr", stderr)?;
        tracing::debug!(command = %rendered, elapsed_ms, bytes = stdout.len(), "command completed");
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

fn decode(command: &str, stream: &'static str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        let output = String::from_utf8_lossy(e.as_bytes()).into_owned();
        tracing::error!(command, stream, "command output is not valid UTF-8");
        GpfsError::InvalidOutput {
            command: command.to_string(),
            stream,
            output,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn runner(timeout: Duration) -> ProcessRunner {
        ProcessRunner::new(ExecConfig {
            tool_dir: PathBuf::from("/bin"),
            timeout,
            env: BTreeMap::new(),
        })
    }

    #[test]
    fn test_resolve() {
        let config = ExecConfig::default();
        assert_eq!(
            config.resolve("mmlsfs"),
            PathBuf::from("/usr/lpp/mmfs/bin/mmlsfs")
        );
        assert_eq!(config.resolve("/bin/sh"), PathBuf::from("/bin/sh"));
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let out = runner(Duration::from_secs(10))
            .run(&sh("printf 'a:b\\n'"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "a:b\n");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_expanded() {
        let inv = Invocation::new("echo", vec!["$HOME;ls".to_string()]);
        let out = runner(Duration::from_secs(10)).run(&inv).await.unwrap();
        assert_eq!(out.stdout.trim(), "$HOME;ls");
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let mut env = BTreeMap::new();
        env.insert("GPFSCTL_TEST".to_string(), "x1".to_string());
        let runner = ProcessRunner::new(ExecConfig {
            tool_dir: PathBuf::from("/bin"),
            timeout: Duration::from_secs(10),
            env,
        });
        let out = runner.run(&sh("echo $GPFSCTL_TEST")).await.unwrap();
        assert_eq!(out.stdout.trim(), "x1");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let err = runner(Duration::from_secs(10))
            .run(&sh("echo 'fileset not found' >&2; exit 2"))
            .await
            .unwrap_err();
        match err {
            GpfsError::CommandExecution {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "fileset not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let started = Instant::now();
        let err = runner(Duration::from_millis(200))
            .run(&sh("sleep 10"))
            .await
            .unwrap_err();
        assert!(matches!(err, GpfsError::CommandTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_forked_helpers() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("(sleep 1; touch '{}') & wait", marker.display());
        let err = runner(Duration::from_millis(300))
            .run(&sh(&script))
            .await
            .unwrap_err();
        assert!(matches!(err, GpfsError::CommandTimeout { .. }));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "helper kept running after the timeout");
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_rejected() {
        let err = runner(Duration::from_secs(10))
            .run(&sh("printf 'fs1:pr\\377j:3:Linked\\n'"))
            .await
            .unwrap_err();
        match err {
            GpfsError::InvalidOutput { stream, output, .. } => {
                assert_eq!(stream, "stdout");
                assert!(output.contains("pr\u{FFFD}j"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ProcessRunner::new(ExecConfig {
            tool_dir: dir.path().to_path_buf(),
            ..ExecConfig::default()
        });
        let err = runner
            .run(&Invocation::new("mmlsfs", vec!["all".to_string()]))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
