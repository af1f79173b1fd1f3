use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Tool locations keyed by `drone.cli.path` or an OS override such as
    /// `drone.cli.path.linux`.
    #[serde(default)]
    pub tool_paths: BTreeMap<String, String>,
    #[serde(default = "default_check_upgrade")]
    pub check_upgrade: bool,
    #[serde(default)]
    pub run_trusted: bool,
    #[serde(default)]
    pub run_on_git_commit: bool,
    #[serde(default)]
    pub exec_environment: BTreeMap<String, String>,
    #[serde(default)]
    pub exec_secret_file: Option<String>,
}

fn default_check_upgrade() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_paths: BTreeMap::new(),
            check_upgrade: default_check_upgrade(),
            run_trusted: false,
            run_on_git_commit: false,
            exec_environment: BTreeMap::new(),
            exec_secret_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersionInfo {
    pub current_version: String,
    pub available_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
}

/// The plugin registry is loosely typed: an explicit `null` reads as the
/// field's default, the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DronePluginSettings {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub required: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub secret: bool,
    #[serde(rename = "defaultValue")]
    pub default_value: serde_json::Value,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DronePlugin {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub settings: Vec<DronePluginSettings>,
    #[serde(deserialize_with = "null_as_default")]
    pub example: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
