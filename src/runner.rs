use crate::error::{DroneError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliCommand {
    pub command: String,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CliExitData {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliExitData {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

pub fn create_cli_command<I, S>(command: impl Into<String>, arguments: I) -> CliCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CliCommand {
        command: command.into(),
        arguments: arguments.into_iter().map(Into::into).collect(),
    }
}

pub fn cli_command_to_string(command: &CliCommand) -> String {
    if command.arguments.is_empty() {
        command.command.clone()
    } else {
        format!("{} {}", command.command, command.arguments.join(" "))
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and captures its output.
    async fn execute(&self, command: &CliCommand, cwd: Option<&Path>) -> Result<CliExitData>;

    /// Runs the command attached to the current terminal.
    async fn execute_attached(
        &self,
        command: &CliCommand,
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> Result<ExitStatus>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    fn build(command: &CliCommand, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&command.command);
        cmd.args(&command.arguments);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, command: &CliCommand, cwd: Option<&Path>) -> Result<CliExitData> {
        let line = cli_command_to_string(command);
        tracing::debug!("Executing: {}", line);

        let output = Self::build(command, cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| DroneError::Spawn {
                command: line,
                source,
            })?;

        Ok(CliExitData {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn execute_attached(
        &self,
        command: &CliCommand,
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> Result<ExitStatus> {
        let line = cli_command_to_string(command);
        tracing::debug!("Executing attached: {}", line);

        let mut cmd = Self::build(command, cwd);
        cmd.envs(env);
        let mut child = cmd.spawn().map_err(|source| DroneError::Spawn {
            command: line,
            source,
        })?;
        Ok(child.wait().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_command_to_string() {
        let cmd = create_cli_command("drone", ["exec", ".drone.yml", "--trusted"]);
        assert_eq!(cli_command_to_string(&cmd), "drone exec .drone.yml --trusted");

        let bare = create_cli_command("drone", Vec::<String>::new());
        assert_eq!(cli_command_to_string(&bare), "drone");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_output() {
        let cmd = create_cli_command("sh", ["-c", "echo drone version 1.5.0; echo oops >&2"]);
        let result = ProcessRunner.execute(&cmd, None).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "drone version 1.5.0");
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_attached_passes_environment() {
        let mut env = BTreeMap::new();
        env.insert("PIPELINE_FLAG".to_string(), "on".to_string());
        let cmd = create_cli_command("sh", ["-c", "test \"$PIPELINE_FLAG\" = on"]);
        let status = ProcessRunner.execute_attached(&cmd, None, &env).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cmd = create_cli_command("definitely-not-a-drone-binary", ["--version"]);
        let err = ProcessRunner.execute(&cmd, None).await.unwrap_err();
        assert!(matches!(err, DroneError::Spawn { .. }));
    }
}
