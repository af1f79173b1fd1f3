//! The git `post-commit` hook that runs the pipeline after every commit.

use crate::error::{DroneError, Result};
use crate::runner::{cli_command_to_string, create_cli_command, CommandRunner};
use std::fs;
use std::path::{Path, PathBuf};

const HOOK_NAME: &str = "post-commit";

pub fn render_hook(drone_command: &str, drone_file: &str, trusted: bool) -> String {
    let trusted = if trusted { " --trusted" } else { "" };
    format!(
        "#!/usr/bin/env bash\nset -e\n\n{} exec{} {}\n",
        drone_command, trusted, drone_file
    )
}

pub fn is_git_repository(root: &Path) -> bool {
    root.join(".git").exists()
}

/// Runs `git init` in `root`.
pub async fn init_repository(runner: &dyn CommandRunner, root: &Path) -> Result<()> {
    let command = create_cli_command("git", ["init"]);
    let result = runner.execute(&command, Some(root)).await?;
    if !result.success() {
        return Err(DroneError::CommandFailed {
            command: cli_command_to_string(&command),
            stderr: result.stderr.trim().to_string(),
        });
    }
    tracing::info!("Initialized git repository in {}", root.display());
    Ok(())
}

#[derive(Debug, Clone)]
pub struct GitHooks {
    repo_root: PathBuf,
}

impl GitHooks {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn hook_path(&self) -> PathBuf {
        self.repo_root.join(".git").join("hooks").join(HOOK_NAME)
    }

    pub fn exists(&self) -> bool {
        self.hook_path().is_file()
    }

    /// Writes the hook, replacing any existing one.
    pub fn add(&self, content: &str) -> Result<PathBuf> {
        let path = self.hook_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms)?;
        }

        tracing::info!("Wrote git hook {}", path.display());
        Ok(path)
    }

    /// Rewrites the hook only when one is already installed.
    pub fn update(&self, content: &str) -> Result<bool> {
        if !self.exists() {
            tracing::debug!("No {} hook to update", HOOK_NAME);
            return Ok(false);
        }
        self.add(content)?;
        Ok(true)
    }

    pub fn remove(&self) -> Result<bool> {
        let path = self.hook_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Removed git hook {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
