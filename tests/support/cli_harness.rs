use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Runs the `orchestrator` binary inside a scratch directory, so neither a
/// stray `.env` nor the default config path leaks in from the checkout.
#[derive(Debug)]
pub struct CliHarness {
    binary_path: PathBuf,
    workdir: TempDir,
}

impl CliHarness {
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from(assert_cmd::cargo::cargo_bin!("orchestrator")),
            workdir: TempDir::new().unwrap(),
        }
    }

    #[must_use]
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Writes `content` to a config file in the scratch directory.
    #[must_use]
    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.workdir.path().join("orchestrator.conf");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[must_use]
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .current_dir(self.workdir.path())
            .env_remove("DATABASE_URL")
            .env("RUST_LOG", "error");
        command
    }
}

impl Default for CliHarness {
    fn default() -> Self {
        Self::new()
    }
}
