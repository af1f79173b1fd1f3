use crate::error::{DroneError, Result};
use regex::Regex;
use semver::Version;
use std::sync::OnceLock;

const VERSION_PATTERN: &str = r"^v?([0-9]+\.[0-9]+\.[0-9]+[-\w.]*)$";
const DRONE_VERSION_PATTERN: &str = r"^drone\s+version\s+v?([0-9]+\.[0-9]+\.[0-9]+(?:-[0-9A-Za-z.-]+)?)";

fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern).map_err(|e| DroneError::VersionParse {
        output: e.to_string(),
    })?;
    Ok(cell.get_or_init(|| re))
}

fn version_regex() -> Result<&'static Regex> {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, VERSION_PATTERN)
}

fn drone_version_regex() -> Result<&'static Regex> {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, DRONE_VERSION_PATTERN)
}

/// Strips the leading `v` of a release tag: `v1.5.0` becomes `1.5.0`.
/// Text that does not look like a version is returned unchanged.
pub fn as_version_number(version_text: &str) -> String {
    let re = match version_regex() {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("{}", e);
            return version_text.to_string();
        }
    };
    re.captures(version_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| version_text.to_string())
}

/// The release tag for a version number: `1.5.0` becomes `v1.5.0`.
pub fn as_github_tag(version_text: &str) -> String {
    format!("v{}", version_text)
}

/// A stable tag is `vMAJOR.MINOR.PATCH` (the `v` is optional) with no
/// pre-release or build metadata.
pub fn parse_stable_tag(tag: &str) -> Option<Version> {
    let version = Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()?;
    if version.pre.is_empty() && version.build.is_empty() {
        Some(version)
    } else {
        None
    }
}

/// Keeps the stable tags and orders them newest first.
pub fn sort_stable_releases<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut stable: Vec<(Version, String)> = tags
        .into_iter()
        .map(Into::into)
        .filter_map(|tag| parse_stable_tag(&tag).map(|v| (v, tag)))
        .collect();

    stable.sort_by(|(a, _), (b, _)| b.cmp(a));
    stable.into_iter().map(|(_, tag)| tag).collect()
}

/// Extracts the version from the output of `drone --version`.
pub fn parse_drone_version(output: &str) -> Result<String> {
    let re = drone_version_regex()?;

    let first_line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    re.captures(first_line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DroneError::VersionParse {
            output: output.trim().to_string(),
        })
}

/// True when `current` is strictly older than `available`. Either side may
/// carry a leading `v`.
pub fn is_upgrade_needed(current: &str, available: &str) -> Result<bool> {
    let parse = |text: &str| {
        Version::parse(&as_version_number(text)).map_err(|_| DroneError::VersionParse {
            output: text.to_string(),
        })
    };
    Ok(parse(current)? < parse(available)?)
}
