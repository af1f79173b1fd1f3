mod cache;
mod cli;
mod completion;
mod config;
mod download;
mod drone;
mod error;
mod hooks;
mod install;
mod pipeline;
mod platform;
mod plugins;
mod prompt;
mod release_cache;
mod runner;
mod types;
mod version;

use anyhow::{anyhow, bail, Context, Result};
use cache::SystemClock;
use clap::Parser;
use cli::{Cli, Commands, ConfigAction, HookAction};
use completion::provide_completions;
use config::{
    get_config_file_path, get_install_folder, normalize_key, FileSettingsStore, SettingsStore,
    SETTING_KEYS,
};
use drone::{create_pipeline_file, link_tool, DroneCli};
use install::github::GitHubClient;
use install::{InstallContext, Installer};
use platform::{get_system_info, user_home_dir};
use plugins::PluginRegistry;
use prompt::{AssumeAnswer, Confirm, TerminalPrompt};
use runner::{CommandRunner, ProcessRunner};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use types::DronePlugin;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;

    let workspace = match &cli.workspace {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("Could not determine the current directory")?,
    };
    let mut store = FileSettingsStore::load(get_config_file_path()?)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);

    match cli.command {
        Commands::Version => {
            println!("drone-pilot v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Install { yes } => {
            let location = install_drone(&mut store, runner, yes).await?;
            println!("{}", location.display());
        }

        Commands::About => {
            let drone = drone_cli(&workspace, &store, runner);
            println!("{}", drone.about().await?);
        }

        Commands::Exec { args } => {
            let status = drone_cli(&workspace, &store, runner).exec(&args).await?;
            std::process::exit(status.code().unwrap_or(1));
        }

        Commands::Steps { images } => {
            let drone = drone_cli(&workspace, &store, runner);
            if images {
                for (name, image) in drone.step_images()? {
                    println!("{}\t{}", name, image);
                }
            } else {
                for name in drone.steps()? {
                    println!("{}", name);
                }
            }
        }

        Commands::RunSteps { names } => {
            let status = drone_cli(&workspace, &store, runner)
                .run_steps(&names)
                .await?;
            std::process::exit(status.code().unwrap_or(1));
        }

        Commands::Init => {
            let path = create_pipeline_file(&workspace, &get_system_info().arch)?;
            println!("{}", path.display());
        }

        Commands::Link { dir } => {
            let dest = match dir {
                Some(dir) => dir,
                None => user_home_dir()
                    .ok_or_else(|| anyhow!("Could not determine home directory"))?
                    .join(".local")
                    .join("bin"),
            };
            let binary = install_drone(&mut store, runner, false).await?;
            let link = link_tool(&binary, &dest)?;
            println!("{} -> {}", link.display(), binary.display());
        }

        Commands::Plugins { terms } => {
            let registry = plugin_registry()?;
            let plugins = search_plugins(&registry, &terms, &TerminalPrompt).await?;
            print_plugins(&plugins);
        }

        Commands::Complete { line } => {
            let registry = plugin_registry()?;
            if let Some(items) = provide_completions(&line, &registry).await? {
                for item in items {
                    match item.detail {
                        Some(detail) => println!("{}\t{}", item.label, detail),
                        None => println!("{}", item.label),
                    }
                }
            }
        }

        Commands::Hook { action } => {
            let drone = drone_cli(&workspace, &store, runner);
            match action {
                HookAction::Add { yes } => {
                    if drone.add_hook(prompt_for(yes).as_ref()).await? {
                        println!("{}", drone.hooks().hook_path().display());
                    }
                }
                HookAction::Update => {
                    if !drone.update_hook()? {
                        eprintln!("No post-commit hook installed");
                    }
                }
                HookAction::Remove => {
                    drone.hooks().remove()?;
                }
                HookAction::Sync { yes } => {
                    drone.handle_config_change(prompt_for(yes).as_ref()).await?;
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Get { key } => {
                let settings = store.settings();
                if let Some(key) = key {
                    match settings.get_value(&key) {
                        Some(value) => println!("{}", value),
                        None => {
                            eprintln!("Setting '{}' is not set", key);
                            std::process::exit(1);
                        }
                    }
                } else {
                    println!("--- drone-pilot settings ---");
                    for key in SETTING_KEYS {
                        let value = settings.get_value(key).unwrap_or_default();
                        println!("  {}: {}", key, value);
                    }
                    for (key, value) in &settings.tool_paths {
                        println!("  {}: {}", key, value);
                    }
                }
            }
            ConfigAction::Set { args } => {
                let (key, value) = parse_key_value(&args)?;
                store.update(|settings| settings.set_value(&key, &value))?;
                tracing::info!("Setting '{}' updated to '{}'", key, value);
                sync_hook_after_change(&key, &workspace, &store, runner).await;
            }
            ConfigAction::Unset { key } => {
                store.update(|settings| settings.unset_value(&key))?;
                tracing::info!("Setting '{}' unset", key);
                sync_hook_after_change(&key, &workspace, &store, runner).await;
            }
            ConfigAction::Show { format } => {
                let settings = store.settings();
                match format.as_str() {
                    "json" => println!("{}", serde_json::to_string_pretty(settings)?),
                    "yaml" => print!("{}", serde_yaml::to_string(settings)?),
                    other => bail!("Unsupported format '{}'. Use json or yaml", other),
                }
            }
        },
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

fn prompt_for(yes: bool) -> Arc<dyn Confirm> {
    if yes {
        Arc::new(AssumeAnswer(true))
    } else {
        Arc::new(TerminalPrompt)
    }
}

fn drone_cli(workspace: &Path, store: &FileSettingsStore, runner: Arc<dyn CommandRunner>) -> DroneCli {
    DroneCli::new(
        workspace.to_path_buf(),
        store.settings().clone(),
        runner,
        get_system_info(),
    )
}

async fn install_drone(
    store: &mut FileSettingsStore,
    runner: Arc<dyn CommandRunner>,
    yes: bool,
) -> Result<PathBuf> {
    let context = InstallContext::new(get_install_folder()?);
    let mut installer = Installer::new(context, store, runner, prompt_for(yes));
    if let Ok(api_base) = env::var("DRONE_PILOT_GITHUB_API") {
        installer = installer.with_release_source(
            Box::new(GitHubClient::with_api_base(api_base)),
            Box::new(SystemClock),
        );
    }
    installer
        .install_or_upgrade()
        .await
        .context("Failed to install the drone cli")
}

fn plugin_registry() -> Result<PluginRegistry> {
    let registry = PluginRegistry::new(&get_install_folder()?);
    Ok(match env::var("DRONE_PILOT_PLUGINS_URL") {
        Ok(url) => registry.with_url(url),
        Err(_) => registry,
    })
}

/// Searches the registry, asking whether to retry after each failure.
async fn search_plugins(
    registry: &PluginRegistry,
    terms: &[String],
    prompt: &dyn Confirm,
) -> Result<Vec<DronePlugin>> {
    loop {
        match registry.search(terms).await {
            Ok(plugins) => return Ok(plugins),
            Err(e) => {
                eprintln!("{}", e);
                if !prompt.confirm("Retry?") {
                    return Err(e.into());
                }
            }
        }
    }
}

fn print_plugins(plugins: &[DronePlugin]) {
    if plugins.is_empty() {
        println!("No plugins found.");
        return;
    }
    for plugin in plugins {
        if plugin.image.is_empty() {
            println!("{}", plugin.name);
        } else {
            println!("{} ({})", plugin.name, plugin.image);
        }
        if !plugin.description.is_empty() {
            println!("    {}", plugin.description);
        }
        if !plugin.url.is_empty() {
            println!("    {}", plugin.url);
        }
    }
}

/// Accepts `key=value` or `key value`.
fn parse_key_value(args: &[String]) -> Result<(String, String)> {
    match args {
        [single] => single
            .split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .ok_or_else(|| anyhow!("Invalid format. Use 'key=value' or 'key value'")),
        [key, rest @ ..] => Ok((key.clone(), rest.join(" "))),
        [] => bail!("Missing setting key"),
    }
}

/// Keeps the commit hook consistent with settings it depends on.
async fn sync_hook_after_change(
    key: &str,
    workspace: &Path,
    store: &FileSettingsStore,
    runner: Arc<dyn CommandRunner>,
) {
    let drone = drone_cli(workspace, store, runner);
    let result = match normalize_key(key).as_str() {
        "run_on_git_commit" => drone.handle_config_change(&TerminalPrompt).await,
        "run_trusted" => drone.update_hook().map(|_| ()),
        _ if key.starts_with("drone.cli.path") => drone.update_hook().map(|_| ()),
        _ => Ok(()),
    };
    if let Err(e) = result {
        tracing::warn!("Could not update the git hook: {}", e);
    }
}
