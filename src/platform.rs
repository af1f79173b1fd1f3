use crate::types::PlatformInfo;
use std::path::PathBuf;

/// Operating system and CPU architecture as named in drone release archives
/// (`drone_linux_amd64.tar.gz`, `drone_darwin_arm64.tar.gz`, ...).
pub fn get_system_info() -> PlatformInfo {
    PlatformInfo {
        os: normalize_os(std::env::consts::OS),
        arch: normalize_arch(std::env::consts::ARCH),
    }
}

fn normalize_os(os: &str) -> String {
    match os {
        "macos" => "darwin".to_string(),
        "win32" => "windows".to_string(),
        _ => os.to_string(),
    }
}

fn normalize_arch(arch: &str) -> String {
    match arch {
        "x86_64" | "x64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        _ => arch.to_string(),
    }
}

/// Short OS name used for per-platform configuration overrides.
pub fn os_key_string(os: &str) -> Option<&'static str> {
    match os {
        "win32" | "windows" => Some("windows"),
        "darwin" | "macos" => Some("mac"),
        "linux" => Some("linux"),
        _ => None,
    }
}

pub fn executable_name(tool: &str, os: &str) -> String {
    if os == "windows" {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

pub fn user_home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}
