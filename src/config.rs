use crate::error::{DroneError, Result};
use crate::platform::{os_key_string, user_home_dir};
use crate::types::*;
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "drone-pilot";
pub const CONFIG_DIR_NAME: &str = ".drone-pilot";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const TOOLS_DIR_NAME: &str = "tools";
pub const DRONE_CLI_COMMAND: &str = "drone";

pub const SETTING_KEYS: &[&str] = &[
    "check_upgrade",
    "run_trusted",
    "run_on_git_commit",
    "exec_secret_file",
];

pub fn get_user_config_dir() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .ok_or_else(|| DroneError::Config("Could not determine config directory".to_string()))?
        .join(CONFIG_DIR_NAME);
    Ok(path)
}

pub fn get_config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("DRONE_PILOT_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let path = get_user_config_dir()?.join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

/// Folder holding the managed drone binary and the release/plugin caches,
/// `$HOME/.drone-pilot` unless `DRONE_PILOT_HOME` says otherwise.
pub fn get_install_folder() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("DRONE_PILOT_HOME") {
        return Ok(PathBuf::from(path));
    }
    let path = user_home_dir()
        .ok_or_else(|| DroneError::Config("Could not determine home directory".to_string()))?
        .join(CONFIG_DIR_NAME);
    tracing::debug!("Install folder: {}", path.display());
    Ok(path)
}

pub fn get_tool_location(install_folder: &Path) -> PathBuf {
    install_folder.join(TOOLS_DIR_NAME)
}

pub fn tool_path_base_key(tool: &str) -> String {
    format!("{}.cli.path", tool)
}

pub fn tool_path_os_key(os: &str, tool: &str) -> String {
    let base_key = tool_path_base_key(tool);
    match os_key_string(os) {
        Some(os_key) => format!("{}.{}", base_key, os_key),
        None => base_key,
    }
}

impl Settings {
    /// The configured tool path: the OS override first, then the generic key.
    pub fn tool_location_from_config(&self, os: &str, tool: &str) -> Option<&str> {
        self.tool_paths
            .get(&tool_path_os_key(os, tool))
            .or_else(|| self.tool_paths.get(&tool_path_base_key(tool)))
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_key(key).as_str() {
            "check_upgrade" => Some(self.check_upgrade.to_string()),
            "run_trusted" => Some(self.run_trusted.to_string()),
            "run_on_git_commit" => Some(self.run_on_git_commit.to_string()),
            "exec_secret_file" => self.exec_secret_file.clone(),
            _ => self.tool_paths.get(key).cloned(),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_key(key).as_str() {
            "check_upgrade" => self.check_upgrade = parse_bool(key, value)?,
            "run_trusted" => self.run_trusted = parse_bool(key, value)?,
            "run_on_git_commit" => self.run_on_git_commit = parse_bool(key, value)?,
            "exec_secret_file" => self.exec_secret_file = Some(value.to_string()),
            _ if is_tool_path_key(key) => {
                self.tool_paths.insert(key.to_string(), value.to_string());
            }
            _ => return Err(invalid_key(key)),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<()> {
        let defaults = Settings::default();
        match normalize_key(key).as_str() {
            "check_upgrade" => self.check_upgrade = defaults.check_upgrade,
            "run_trusted" => self.run_trusted = defaults.run_trusted,
            "run_on_git_commit" => self.run_on_git_commit = defaults.run_on_git_commit,
            "exec_secret_file" => self.exec_secret_file = None,
            _ if is_tool_path_key(key) => {
                self.tool_paths.remove(key);
            }
            _ => return Err(invalid_key(key)),
        }
        Ok(())
    }
}

fn is_tool_path_key(key: &str) -> bool {
    let base = tool_path_base_key(DRONE_CLI_COMMAND);
    key == base
        || key
            .strip_prefix(&base)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|os| matches!(os, "linux" | "mac" | "windows"))
}

fn invalid_key(key: &str) -> DroneError {
    DroneError::Config(format!(
        "'{}' is not a valid configuration setting. Valid settings: {}, {}[.linux|.mac|.windows]",
        key,
        SETTING_KEYS.join(", "),
        tool_path_base_key(DRONE_CLI_COMMAND)
    ))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DroneError::Config(format!("Invalid value for '{}': {}", key, value))),
    }
}

/// Reads the settings file as written, without environment overrides.
pub fn read_settings_file(config_path: &Path) -> Result<Settings> {
    if !config_path.exists() {
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(config_path)?;
    serde_json::from_str(&content).map_err(|e| {
        DroneError::Config(format!(
            "Could not parse config file {}: {}",
            config_path.display(),
            e
        ))
    })
}

/// Settings forced through the environment for a single run. They are applied
/// on read and never written back to the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvOverrides {
    pub check_upgrade: Option<bool>,
    pub run_trusted: Option<bool>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.to_lowercase() == "true" || value == "1")
        };
        Self {
            check_upgrade: flag("DRONE_PILOT_CHECK_UPGRADE"),
            run_trusted: flag("DRONE_PILOT_RUN_TRUSTED"),
        }
    }

    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(check_upgrade) = self.check_upgrade {
            settings.check_upgrade = check_upgrade;
        }
        if let Some(run_trusted) = self.run_trusted {
            settings.run_trusted = run_trusted;
        }
        settings
    }
}

pub fn save_settings(config_path: &Path, settings: &Settings) -> Result<()> {
    let config_dir = config_path
        .parent()
        .ok_or_else(|| DroneError::Config("Invalid config path".to_string()))?;
    fs::create_dir_all(config_dir)?;

    let content = serde_json::to_string_pretty(settings)?;
    fs::write(config_path, content)?;
    Ok(())
}

pub fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                format!("_{}", c.to_lowercase())
            } else {
                c.to_string()
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Read/write access to the settings the installer depends on.
pub trait SettingsStore {
    fn settings(&self) -> &Settings;

    /// Records the resolved tool location under the generic key and the
    /// override key of `os`.
    fn record_tool_path(&mut self, os: &str, tool: &str, path: &Path) -> Result<()>;
}

/// Settings persisted as JSON at a fixed path. Reads see the environment
/// overrides, writes only ever touch what came from the file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    file: Settings,
    overrides: EnvOverrides,
    effective: Settings,
}

impl FileSettingsStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        Self::with_overrides(path, EnvOverrides::from_env())
    }

    pub fn with_overrides(path: PathBuf, overrides: EnvOverrides) -> Result<Self> {
        let file = read_settings_file(&path)?;
        let effective = overrides.apply(file.clone());
        Ok(Self {
            path,
            file,
            overrides,
            effective,
        })
    }

    /// Applies `change` to the file settings and saves them.
    pub fn update<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let mut file = self.file.clone();
        change(&mut file)?;
        save_settings(&self.path, &file)?;
        self.effective = self.overrides.apply(file.clone());
        self.file = file;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn settings(&self) -> &Settings {
        &self.effective
    }

    fn record_tool_path(&mut self, os: &str, tool: &str, path: &Path) -> Result<()> {
        let value = path.to_string_lossy().to_string();
        self.update(|settings| {
            settings
                .tool_paths
                .insert(tool_path_base_key(tool), value.clone());
            settings.tool_paths.insert(tool_path_os_key(os, tool), value);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("check-upgrade"), "check_upgrade");
        assert_eq!(normalize_key("runTrusted"), "run_trusted");
        assert_eq!(normalize_key("run_on_git_commit"), "run_on_git_commit");
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(settings.tool_paths.is_empty());
        assert!(settings.check_upgrade);
        assert!(!settings.run_trusted);
        assert!(!settings.run_on_git_commit);
    }

    #[test]
    fn test_tool_path_keys() {
        assert_eq!(tool_path_base_key("drone"), "drone.cli.path");
        assert_eq!(tool_path_os_key("linux", "drone"), "drone.cli.path.linux");
        assert_eq!(tool_path_os_key("darwin", "drone"), "drone.cli.path.mac");
        assert_eq!(tool_path_os_key("windows", "drone"), "drone.cli.path.windows");
        assert_eq!(tool_path_os_key("plan9", "drone"), "drone.cli.path");
    }

    #[test]
    fn test_os_override_wins() {
        let mut settings = Settings::default();
        assert_eq!(settings.tool_location_from_config("linux", "drone"), None);

        settings.set_value("drone.cli.path", "/usr/bin/drone").unwrap();
        assert_eq!(
            settings.tool_location_from_config("linux", "drone"),
            Some("/usr/bin/drone")
        );

        settings.set_value("drone.cli.path.linux", "/opt/drone").unwrap();
        assert_eq!(settings.tool_location_from_config("linux", "drone"), Some("/opt/drone"));
        assert_eq!(
            settings.tool_location_from_config("darwin", "drone"),
            Some("/usr/bin/drone")
        );
    }

    #[test]
    fn test_set_and_unset_values() {
        let mut settings = Settings::default();
        settings.set_value("check-upgrade", "false").unwrap();
        settings.set_value("runTrusted", "yes").unwrap();
        assert_eq!(settings.get_value("check_upgrade").as_deref(), Some("false"));
        assert_eq!(settings.get_value("run-trusted").as_deref(), Some("true"));

        settings.unset_value("check_upgrade").unwrap();
        assert!(settings.check_upgrade);

        assert!(settings.set_value("run_trusted", "maybe").is_err());
        assert!(settings.set_value("shim_dir", "/tmp").is_err());
        assert!(settings.set_value("drone.cli.path.beos", "/tmp").is_err());
    }

    #[test]
    fn test_store_records_both_keys() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let mut store = FileSettingsStore::load(config_path.clone()).unwrap();

        store
            .record_tool_path("linux", "drone", Path::new("/home/me/.drone-pilot/tools/drone"))
            .unwrap();

        let reloaded = read_settings_file(&config_path).unwrap();
        assert_eq!(
            reloaded.tool_paths.get("drone.cli.path").map(String::as_str),
            Some("/home/me/.drone-pilot/tools/drone")
        );
        assert_eq!(
            reloaded.tool_paths.get("drone.cli.path.linux").map(String::as_str),
            Some("/home/me/.drone-pilot/tools/drone")
        );
    }

    #[test]
    fn test_env_overrides_are_not_saved() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let overrides = EnvOverrides {
            check_upgrade: Some(false),
            run_trusted: Some(true),
        };
        let mut store = FileSettingsStore::with_overrides(config_path.clone(), overrides).unwrap();
        assert!(!store.settings().check_upgrade);
        assert!(store.settings().run_trusted);

        store
            .record_tool_path("linux", "drone", Path::new("/usr/local/bin/drone"))
            .unwrap();
        assert!(!store.settings().check_upgrade);

        let reloaded = read_settings_file(&config_path).unwrap();
        assert!(reloaded.check_upgrade);
        assert!(!reloaded.run_trusted);
        assert_eq!(
            reloaded.tool_paths.get("drone.cli.path").map(String::as_str),
            Some("/usr/local/bin/drone")
        );

        let store = FileSettingsStore::with_overrides(config_path, EnvOverrides::default()).unwrap();
        assert!(store.settings().check_upgrade);
    }

    #[test]
    fn test_update_keeps_overrides_on_read() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let overrides = EnvOverrides {
            check_upgrade: None,
            run_trusted: Some(false),
        };
        let mut store = FileSettingsStore::with_overrides(config_path.clone(), overrides).unwrap();

        store
            .update(|settings| settings.set_value("run_trusted", "true"))
            .unwrap();

        assert!(!store.settings().run_trusted);
        assert!(read_settings_file(&config_path).unwrap().run_trusted);
        assert!(store.update(|settings| settings.set_value("shim_dir", "/tmp")).is_err());
        assert!(read_settings_file(&config_path).unwrap().run_trusted);
    }
}
