use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

// Shared by the offline suite and the `e2e` suite, so not every helper is
// used in every test binary.
#[allow(dead_code)]
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub config_path: PathBuf,
    pub install_dir: PathBuf,
    pub workspace: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config").join("config.json");
        let install_dir = temp_dir.path().join("install");
        let workspace = temp_dir.path().join("workspace");
        std::fs::create_dir_all(&workspace).expect("Failed to create workspace");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_drone-pilot"));

        Self {
            _temp_dir: temp_dir,
            config_path,
            install_dir,
            workspace,
            bin_path,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.env("DRONE_PILOT_CONFIG", &self.config_path);
        cmd.env("DRONE_PILOT_HOME", &self.install_dir);
        cmd.env("HOME", self._temp_dir.path());
        cmd.env("XDG_CONFIG_HOME", self._temp_dir.path().join("xdg"));
        cmd.env_remove("DRONE_PILOT_CHECK_UPGRADE");
        cmd.env_remove("DRONE_PILOT_RUN_TRUSTED");
        cmd.env_remove("RUST_LOG");
        cmd.arg("--workspace").arg(&self.workspace);
        cmd
    }
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.status.success(),
            "Command unexpectedly succeeded\nstdout: {}",
            self.stdout
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
