use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // A tagged release build reports just the tag
    if let Some(tag) = option_env!("DRONE_PILOT_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("DRONE_PILOT_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("DRONE_PILOT_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "drone-pilot")]
#[command(about = "Install, upgrade and drive the drone cli from a workspace")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Workspace holding the .drone.yml (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install the drone cli, or upgrade an existing one
    Install {
        /// Answer yes to the upgrade prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the drone cli version
    About,

    /// Run the workspace pipeline with `drone exec`
    #[command(
        allow_hyphen_values = true,
        after_help = "Examples:\n  drone-pilot exec\n  drone-pilot exec --branch=main --event=push"
    )]
    Exec {
        /// Extra arguments passed to `drone exec`
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// List the pipeline steps
    Steps {
        /// Show the image of each step
        #[arg(long)]
        images: bool,
    },

    /// Run only the named pipeline steps
    RunSteps {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Create a starter .drone.yml in the workspace
    Init,

    /// Symlink the drone cli into a directory on the PATH
    Link {
        /// Target directory (default: ~/.local/bin)
        dir: Option<PathBuf>,
    },

    /// Search the drone plugin registry by name or tag
    Plugins {
        terms: Vec<String>,
    },

    /// Plugin completions for a pipeline line
    Complete {
        line: String,
    },

    /// Manage the git post-commit hook
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },

    /// Manage drone-pilot's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum HookAction {
    /// Install the hook, replacing an existing one
    Add {
        /// Run `git init` without asking when the workspace is not a repository
        #[arg(short, long)]
        yes: bool,
    },
    /// Rewrite the hook if it is installed
    Update,
    /// Remove the hook
    Remove,
    /// Add or remove the hook according to `run_on_git_commit`
    Sync {
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration setting
    Get {
        /// Key to get (if omitted, shows all settings)
        key: Option<String>,
    },
    /// Set a configuration setting
    Set {
        /// Key and value (e.g., 'check-upgrade=false' or 'check-upgrade false')
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },
    /// Reset a configuration setting to its default
    Unset {
        key: String,
    },
    /// Show full configuration
    Show {
        /// Output format (json, yaml)
        #[arg(long, default_value = "json")]
        format: String,
    },
}
