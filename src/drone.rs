//! Workspace level drone operations: locating the pipeline, running it
//! through `drone exec` and keeping the commit hook in line with the
//! settings.

use crate::config::DRONE_CLI_COMMAND;
use crate::error::{DroneError, Result};
use crate::hooks::{init_repository, is_git_repository, render_hook, GitHooks};
use crate::pipeline::{
    default_pipeline, include_args, load_and_get_steps, pipeline_name, select_steps, step_images,
    step_names, PIPELINE_FILE_NAME,
};
use crate::prompt::Confirm;
use crate::runner::{cli_command_to_string, create_cli_command, CliCommand, CommandRunner};
use crate::types::{PlatformInfo, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use walkdir::WalkDir;

const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

/// The shallowest `.drone.yml` below `root`.
pub fn find_pipeline_file(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && SKIPPED_DIRS
                        .iter()
                        .any(|skip| entry.file_name() == std::ffi::OsStr::new(skip)))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == PIPELINE_FILE_NAME)
        .min_by_key(|entry| entry.depth())
        .map(|entry| entry.into_path())
}

/// Writes the starter pipeline into `root`, leaving an existing file alone.
pub fn create_pipeline_file(root: &Path, arch: &str) -> Result<PathBuf> {
    let path = root.join(PIPELINE_FILE_NAME);
    if path.exists() {
        tracing::info!("{} already exists", path.display());
        return Ok(path);
    }
    fs::create_dir_all(root)?;
    fs::write(&path, default_pipeline(arch))?;
    tracing::info!("Created {}", path.display());
    Ok(path)
}

/// Symlinks `binary` as `<dest_dir>/drone`, replacing a previous link.
#[cfg(unix)]
pub fn link_tool(binary: &Path, dest_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let link = dest_dir.join(DRONE_CLI_COMMAND);
    if let Ok(meta) = fs::symlink_metadata(&link) {
        if !meta.file_type().is_symlink() {
            return Err(DroneError::Config(format!(
                "{} exists and is not a symlink",
                link.display()
            )));
        }
        fs::remove_file(&link)?;
    }
    std::os::unix::fs::symlink(binary, &link)?;
    tracing::info!("Linked {} -> {}", link.display(), binary.display());
    Ok(link)
}

#[cfg(not(unix))]
pub fn link_tool(_binary: &Path, _dest_dir: &Path) -> Result<PathBuf> {
    Err(DroneError::Config(
        "Linking the drone cli is only supported on unix".to_string(),
    ))
}

pub struct DroneCli {
    workspace: PathBuf,
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    platform: PlatformInfo,
}

impl DroneCli {
    pub fn new(
        workspace: PathBuf,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        platform: PlatformInfo,
    ) -> Self {
        Self {
            workspace,
            settings,
            runner,
            platform,
        }
    }

    /// The configured drone binary, or plain `drone` from the PATH.
    pub fn drone_command(&self) -> String {
        self.settings
            .tool_location_from_config(&self.platform.os, DRONE_CLI_COMMAND)
            .unwrap_or(DRONE_CLI_COMMAND)
            .to_string()
    }

    pub fn pipeline_file(&self) -> Result<PathBuf> {
        find_pipeline_file(&self.workspace).ok_or_else(|| {
            DroneError::Pipeline(format!(
                "No {} found in {}",
                PIPELINE_FILE_NAME,
                self.workspace.display()
            ))
        })
    }

    fn relative_pipeline_file(&self) -> Result<String> {
        let file = self.pipeline_file()?;
        let relative = file.strip_prefix(&self.workspace).unwrap_or(&file);
        Ok(relative.to_string_lossy().to_string())
    }

    fn pipeline_steps(&self) -> Result<Vec<serde_yaml::Value>> {
        let file = self.pipeline_file()?;
        let text = fs::read_to_string(&file)?;
        if let Some(name) = pipeline_name(&text)? {
            tracing::debug!("Reading steps of pipeline '{}'", name);
        }
        load_and_get_steps(&text)?.ok_or_else(|| {
            DroneError::Pipeline(format!("No steps defined in {}", file.display()))
        })
    }

    pub fn steps(&self) -> Result<Vec<String>> {
        Ok(step_names(&self.pipeline_steps()?))
    }

    pub fn step_images(&self) -> Result<Vec<(String, String)>> {
        Ok(step_images(&self.pipeline_steps()?))
    }

    /// `drone exec <file> [--trusted] [--secret-file <file>] [extra...]`
    pub fn exec_command(&self, extra_args: &[String]) -> Result<CliCommand> {
        let mut args = vec!["exec".to_string(), self.relative_pipeline_file()?];
        if self.settings.run_trusted {
            args.push("--trusted".to_string());
        }
        if let Some(secret_file) = &self.settings.exec_secret_file {
            args.push(format!("--secret-file={}", secret_file));
        }
        args.extend(extra_args.iter().cloned());
        Ok(create_cli_command(self.drone_command(), args))
    }

    pub async fn exec(&self, extra_args: &[String]) -> Result<ExitStatus> {
        let command = self.exec_command(extra_args)?;
        eprintln!("{}", cli_command_to_string(&command));
        self.runner
            .execute_attached(
                &command,
                Some(&self.workspace),
                &self.settings.exec_environment,
            )
            .await
    }

    /// Validates `names` against the pipeline, then runs only those steps.
    pub async fn run_steps(&self, names: &[String]) -> Result<ExitStatus> {
        let available = self.steps()?;
        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| !available.contains(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            tracing::warn!("Unknown steps ignored: {}", unknown.join(", "));
        }

        let selected = select_steps(&available, names);
        if selected.is_empty() {
            return Err(DroneError::Pipeline(format!(
                "None of the requested steps exist. Available steps: {}",
                available.join(", ")
            )));
        }
        self.exec(&include_args(&selected)).await
    }

    /// Output of `drone --version`.
    pub async fn about(&self) -> Result<String> {
        let command = create_cli_command(self.drone_command(), ["--version"]);
        let result = self.runner.execute(&command, None).await?;
        if !result.success() {
            return Err(DroneError::CommandFailed {
                command: cli_command_to_string(&command),
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout.trim().to_string())
    }

    pub fn hooks(&self) -> GitHooks {
        GitHooks::new(&self.workspace)
    }

    pub fn hook_content(&self) -> Result<String> {
        Ok(render_hook(
            &self.drone_command(),
            &self.relative_pipeline_file()?,
            self.settings.run_trusted,
        ))
    }

    /// Installs the commit hook, offering `git init` when the workspace is
    /// not a repository yet. Returns whether the hook was written.
    pub async fn add_hook(&self, prompt: &dyn Confirm) -> Result<bool> {
        if !is_git_repository(&self.workspace) {
            let question = format!(
                "{} is not a git repository. Run git init?",
                self.workspace.display()
            );
            if !prompt.confirm(&question) {
                tracing::warn!("Not a git repository, commit hook not installed");
                return Ok(false);
            }
            init_repository(self.runner.as_ref(), &self.workspace).await?;
        }
        self.hooks().add(&self.hook_content()?)?;
        Ok(true)
    }

    pub fn update_hook(&self) -> Result<bool> {
        let hooks = self.hooks();
        if !hooks.exists() {
            return Ok(false);
        }
        hooks.update(&self.hook_content()?)
    }

    /// Brings the commit hook in line with `run_on_git_commit`.
    pub async fn handle_config_change(&self, prompt: &dyn Confirm) -> Result<()> {
        if self.settings.run_on_git_commit {
            self.add_hook(prompt).await?;
        } else {
            self.hooks().remove()?;
        }
        Ok(())
    }
}
