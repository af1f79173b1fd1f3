//! Installation and upgrade of the managed drone binary
//!
//! Covers:
//! - Locating an existing drone binary (install folder first, then PATH)
//! - Comparing its version with the latest stable release
//! - Downloading and unpacking a release archive
//! - Recording the resolved location in the settings

pub mod github;

use crate::cache::Clock;
use crate::config::{get_tool_location, SettingsStore, DRONE_CLI_COMMAND};
use crate::download::{ArchiveInstaller, HttpArchiveInstaller};
use crate::error::{DroneError, Result};
use crate::platform::{executable_name, get_system_info};
use crate::prompt::Confirm;
use crate::release_cache::VersionCache;
use crate::runner::{cli_command_to_string, create_cli_command, CommandRunner};
use crate::types::{PlatformInfo, ToolVersionInfo};
use crate::version::{as_github_tag, as_version_number, is_upgrade_needed, parse_drone_version};
use github::{build_release_archive_url, ReleaseSource, GITHUB_HOST};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DRONE_CLI_OWNER: &str = "harness";
pub const DRONE_CLI_REPO: &str = "drone-cli";
const RELEASES_CACHE_FILE: &str = "drone-cli-releases.json";
const ARCHIVE_FILE: &str = "drone-cli.tar.gz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallContext {
    pub install_folder: PathBuf,
    pub tool_location: PathBuf,
}

impl InstallContext {
    pub fn new(install_folder: PathBuf) -> Self {
        let tool_location = get_tool_location(&install_folder);
        Self {
            install_folder,
            tool_location,
        }
    }
}

/// One place a drone binary may already live.
#[derive(Debug, Clone)]
pub enum ToolCandidate {
    /// A fixed path, e.g. inside the install folder.
    Path(PathBuf),
    /// The first match on a search path; `None` means the process `PATH`.
    SearchPath(Option<OsString>),
}

impl ToolCandidate {
    fn resolve(&self, binary: &str) -> Option<PathBuf> {
        match self {
            ToolCandidate::Path(path) => path.exists().then(|| path.clone()),
            ToolCandidate::SearchPath(None) => which::which(binary).ok(),
            ToolCandidate::SearchPath(Some(paths)) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(binary, Some(paths), cwd).ok()
            }
        }
    }
}

/// Candidates are tried in order and the first existing path wins.
pub fn probe_tool(candidates: &[ToolCandidate], binary: &str) -> Option<PathBuf> {
    candidates.iter().find_map(|candidate| {
        let found = candidate.resolve(binary);
        tracing::trace!("Probe {:?} -> {:?}", candidate, found);
        found
    })
}

pub struct Installer<'a> {
    context: InstallContext,
    settings: &'a mut dyn SettingsStore,
    runner: Arc<dyn CommandRunner>,
    prompt: Arc<dyn Confirm>,
    versions: VersionCache,
    archives: Box<dyn ArchiveInstaller>,
    platform: PlatformInfo,
    download_host: String,
    search_path: Option<OsString>,
}

impl<'a> Installer<'a> {
    pub fn new(
        context: InstallContext,
        settings: &'a mut dyn SettingsStore,
        runner: Arc<dyn CommandRunner>,
        prompt: Arc<dyn Confirm>,
    ) -> Self {
        Self {
            context,
            settings,
            runner,
            prompt,
            versions: VersionCache::default(),
            archives: Box::new(HttpArchiveInstaller::default()),
            platform: get_system_info(),
            download_host: GITHUB_HOST.to_string(),
            search_path: None,
        }
    }

    pub fn with_release_source(mut self, source: Box<dyn ReleaseSource>, clock: Box<dyn Clock>) -> Self {
        self.versions = VersionCache::new(source, clock);
        self
    }

    #[cfg(test)]
    pub fn with_archive_installer(mut self, archives: Box<dyn ArchiveInstaller>) -> Self {
        self.archives = archives;
        self
    }

    #[cfg(test)]
    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    /// Restricts the PATH lookup to the given search path.
    #[cfg(test)]
    pub fn with_search_path(mut self, search_path: OsString) -> Self {
        self.search_path = Some(search_path);
        self
    }

    /// Path of the managed binary inside the install folder.
    pub fn tool_path(&self) -> PathBuf {
        self.context
            .tool_location
            .join(executable_name(DRONE_CLI_COMMAND, &self.platform.os))
    }

    fn release_cache_file(&self) -> PathBuf {
        self.context.install_folder.join(RELEASES_CACHE_FILE)
    }

    fn candidates(&self) -> Vec<ToolCandidate> {
        vec![
            ToolCandidate::Path(self.tool_path()),
            ToolCandidate::SearchPath(self.search_path.clone()),
        ]
    }

    /// Makes sure a usable drone binary exists, installing or upgrading it as
    /// needed, and records where it lives.
    pub async fn install_or_upgrade(&mut self) -> Result<PathBuf> {
        let binary = executable_name(DRONE_CLI_COMMAND, &self.platform.os);
        let location = match probe_tool(&self.candidates(), &binary) {
            Some(existing) => self.check_existing(existing).await?,
            None => self.install_latest().await?,
        };

        self.settings
            .record_tool_path(&self.platform.os, DRONE_CLI_COMMAND, &location)?;
        tracing::info!("drone cli available at {}", location.display());
        Ok(location)
    }

    async fn check_existing(&self, existing: PathBuf) -> Result<PathBuf> {
        tracing::debug!("Found drone cli at {}", existing.display());

        if !self.settings.settings().check_upgrade {
            tracing::debug!("Upgrade check disabled");
            return Ok(existing);
        }

        let info = self.tool_version_info(&existing).await?;
        if is_upgrade_needed(&info.current_version, &info.available_version)? {
            let question = format!(
                "{} upgrade available to {}, currently on {}. Install?",
                DRONE_CLI_COMMAND, info.available_version, info.current_version
            );
            if self.prompt.confirm(&question) {
                self.install_release(&info.available_version).await?;
            } else {
                tracing::info!("Keeping drone {}", info.current_version);
            }
        } else {
            tracing::info!("drone {} is up to date", info.current_version);
        }

        Ok(existing)
    }

    async fn install_latest(&self) -> Result<PathBuf> {
        tracing::info!("drone cli not found, installing latest stable release");
        let latest = self.stable_drone_version().await?;
        self.install_release(&latest).await?;
        Ok(self.tool_path())
    }

    /// Installs the release for `version`, given as a tag or a bare number.
    async fn install_release(&self, version: &str) -> Result<()> {
        let version = as_version_number(version);
        let url = build_release_archive_url(
            &self.download_host,
            DRONE_CLI_OWNER,
            DRONE_CLI_REPO,
            &as_github_tag(&version),
            DRONE_CLI_COMMAND,
            &self.platform,
        );
        let archive_path = self.context.install_folder.join(ARCHIVE_FILE);
        eprintln!("Installing drone cli {}...", version);

        self.archives
            .download_and_unpack(&url, &archive_path, &self.context.tool_location)
            .await
    }

    pub async fn stable_drone_version(&self) -> Result<String> {
        self.versions
            .latest_release(DRONE_CLI_OWNER, DRONE_CLI_REPO, &self.release_cache_file())
            .await
    }

    /// Runs `<tool> --version` and pairs the result with the latest release.
    pub async fn tool_version_info(&self, tool: &Path) -> Result<ToolVersionInfo> {
        let command = create_cli_command(tool.to_string_lossy(), ["--version"]);
        let result = self.runner.execute(&command, None).await?;
        if !result.success() {
            return Err(DroneError::CommandFailed {
                command: cli_command_to_string(&command),
                stderr: result.stderr.trim().to_string(),
            });
        }

        let current_version = parse_drone_version(&result.stdout)?;
        let available_version = self.stable_drone_version().await?;

        Ok(ToolVersionInfo {
            current_version,
            available_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FixedClock;
    use crate::config::{EnvOverrides, FileSettingsStore};
    use crate::prompt::AssumeAnswer;
    use crate::release_cache::tests::StubReleases;
    use crate::runner::{CliCommand, CliExitData};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::fs;
    use std::process::ExitStatus;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(code as u32)
    }

    /// Answers every command with a fixed stdout.
    struct StubRunner {
        stdout: String,
        commands: Mutex<Vec<CliCommand>>,
    }

    impl StubRunner {
        fn new(stdout: &str) -> Arc<Self> {
            Arc::new(Self {
                stdout: stdout.to_string(),
                commands: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn execute(&self, command: &CliCommand, _cwd: Option<&Path>) -> Result<CliExitData> {
            self.commands.lock().unwrap().push(command.clone());
            Ok(CliExitData {
                status: exit_status(0),
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }

        async fn execute_attached(
            &self,
            _command: &CliCommand,
            _cwd: Option<&Path>,
            _env: &BTreeMap<String, String>,
        ) -> Result<ExitStatus> {
            Ok(exit_status(0))
        }
    }

    /// Records requested URLs and drops a fake binary into the destination.
    #[derive(Clone, Default)]
    struct StubArchives {
        urls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ArchiveInstaller for StubArchives {
        async fn download_and_unpack(&self, url: &str, _archive: &Path, destination: &Path) -> Result<()> {
            self.urls.lock().unwrap().push(url.to_string());
            fs::create_dir_all(destination)?;
            fs::write(destination.join("drone"), "#!/bin/sh\necho drone version 1.5.0\n")?;
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        releases: StubReleases,
        archives: StubArchives,
        store: FileSettingsStore,
    }

    impl Fixture {
        fn new(check_upgrade: bool) -> Self {
            let dir = tempdir().unwrap();
            let mut store =
                FileSettingsStore::with_overrides(dir.path().join("config.json"), EnvOverrides::default())
                    .unwrap();
            store
                .update(|settings| {
                    settings.check_upgrade = check_upgrade;
                    Ok(())
                })
                .unwrap();
            Self {
                dir,
                releases: StubReleases::new(&["v1.4.0", "v1.5.0", "v1.5.1-rc1"]),
                archives: StubArchives::default(),
                store,
            }
        }

        fn install_folder(&self) -> PathBuf {
            self.dir.path().join(".drone-pilot")
        }

        fn installer(&mut self, runner: Arc<dyn CommandRunner>, answer: bool) -> Installer<'_> {
            let context = InstallContext::new(self.install_folder());
            Installer::new(context, &mut self.store, runner, Arc::new(AssumeAnswer(answer)))
                .with_release_source(Box::new(self.releases.clone()), Box::new(FixedClock(Utc::now())))
                .with_archive_installer(Box::new(self.archives.clone()))
                .with_platform(PlatformInfo {
                    os: "linux".to_string(),
                    arch: "amd64".to_string(),
                })
                .with_search_path(OsString::new())
        }

        fn place_existing_binary(&self) -> PathBuf {
            let tools = self.install_folder().join("tools");
            fs::create_dir_all(&tools).unwrap();
            let path = tools.join("drone");
            fs::write(&path, "").unwrap();
            path
        }

        fn downloads(&self) -> Vec<String> {
            self.archives.urls.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_installs_when_absent() {
        for check_upgrade in [true, false] {
            let mut fx = Fixture::new(check_upgrade);
            let expected = fx.install_folder().join("tools").join("drone");

            let location = fx
                .installer(StubRunner::new(""), false)
                .install_or_upgrade()
                .await
                .unwrap();

            assert_eq!(location, expected);
            assert!(expected.exists());
            assert_eq!(
                fx.downloads(),
                vec!["https://github.com/harness/drone-cli/releases/download/v1.5.0/drone_linux_amd64.tar.gz"]
            );
            let saved = fx.store.settings();
            let recorded = expected.to_string_lossy().to_string();
            assert_eq!(saved.tool_paths.get("drone.cli.path"), Some(&recorded));
            assert_eq!(saved.tool_paths.get("drone.cli.path.linux"), Some(&recorded));
        }
    }

    #[tokio::test]
    async fn test_release_accepts_bare_version() {
        let mut fx = Fixture::new(true);

        for version in ["1.5.0", "v1.5.0"] {
            fx.installer(StubRunner::new(""), true)
                .install_release(version)
                .await
                .unwrap();
        }

        let url = "https://github.com/harness/drone-cli/releases/download/v1.5.0/drone_linux_amd64.tar.gz";
        assert_eq!(fx.downloads(), vec![url, url]);
    }

    #[tokio::test]
    async fn test_absent_tool_and_no_release_fails() {
        let mut fx = Fixture::new(true);
        fx.releases = StubReleases::failing();

        let err = fx
            .installer(StubRunner::new(""), true)
            .install_or_upgrade()
            .await
            .unwrap_err();

        assert!(matches!(err, DroneError::Fetch(_)));
        assert!(fx.downloads().is_empty());
        assert!(fx.store.settings().tool_paths.is_empty());
    }

    #[tokio::test]
    async fn test_existing_tool_without_upgrade_check() {
        let mut fx = Fixture::new(false);
        let existing = fx.place_existing_binary();
        let runner = StubRunner::new("drone version 1.0.0");

        let location = fx
            .installer(runner.clone(), true)
            .install_or_upgrade()
            .await
            .unwrap();

        assert_eq!(location, existing);
        assert!(runner.commands.lock().unwrap().is_empty());
        assert_eq!(fx.releases.calls(), 0);
        assert!(fx.downloads().is_empty());
    }

    #[tokio::test]
    async fn test_declined_upgrade_keeps_existing() {
        let mut fx = Fixture::new(true);
        let existing = fx.place_existing_binary();

        let location = fx
            .installer(StubRunner::new("drone version 1.4.0\n"), false)
            .install_or_upgrade()
            .await
            .unwrap();

        assert_eq!(location, existing);
        assert!(fx.downloads().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_upgrade_downloads_latest() {
        let mut fx = Fixture::new(true);
        let existing = fx.place_existing_binary();
        let runner = StubRunner::new("drone version 1.4.0\n");

        let location = fx
            .installer(runner.clone(), true)
            .install_or_upgrade()
            .await
            .unwrap();

        assert_eq!(location, existing);
        assert_eq!(fx.downloads().len(), 1);
        assert!(fx.downloads()[0].contains("/v1.5.0/"));
        let commands = runner.commands.lock().unwrap();
        assert_eq!(commands[0].arguments, vec!["--version"]);
    }

    #[tokio::test]
    async fn test_up_to_date_tool_is_left_alone() {
        let mut fx = Fixture::new(true);
        fx.place_existing_binary();

        fx.installer(StubRunner::new("drone version 1.5.0"), true)
            .install_or_upgrade()
            .await
            .unwrap();

        assert!(fx.downloads().is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_version_fails() {
        let mut fx = Fixture::new(true);
        fx.place_existing_binary();

        let err = fx
            .installer(StubRunner::new("Drone CLI (unknown build)"), true)
            .install_or_upgrade()
            .await
            .unwrap_err();

        assert!(matches!(err, DroneError::VersionParse { .. }));
        assert!(fx.downloads().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_prefers_first_candidate() {
        let dir = tempdir().unwrap();
        let managed = dir.path().join("tools").join("drone");
        let on_path = dir.path().join("bin");
        fs::create_dir_all(managed.parent().unwrap()).unwrap();
        fs::create_dir_all(&on_path).unwrap();
        fs::write(&managed, "").unwrap();
        fs::write(on_path.join("drone"), "").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(on_path.join("drone"), fs::Permissions::from_mode(0o755)).unwrap();
        }

        let search = ToolCandidate::SearchPath(Some(on_path.clone().into_os_string()));
        let both = [ToolCandidate::Path(managed.clone()), search.clone()];
        assert_eq!(probe_tool(&both, "drone"), Some(managed));

        let missing = [ToolCandidate::Path(dir.path().join("nope")), search];
        assert_eq!(probe_tool(&missing, "drone"), Some(on_path.join("drone")));

        let none = [ToolCandidate::SearchPath(Some(OsString::new()))];
        assert_eq!(probe_tool(&none, "drone"), None);
    }
}
