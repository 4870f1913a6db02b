//! Common test utilities for scrumline integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.local/share/scrumline/` directory.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with isolated data storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `workspace_dir`: Acts as the workspace root
/// - `data_dir`: Holds scrumline's data (via `SCL_DATA_DIR` env var)
///
/// The `scl()` method returns a `Command` that sets `SCL_DATA_DIR`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub workspace_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            workspace_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and initialize storage.
    pub fn init() -> Self {
        let env = Self::new();
        env.scl().args(["system", "init"]).assert().success();
        env
    }

    /// Get a Command for the scl binary with isolated data directory.
    pub fn scl(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_scl"));
        cmd.current_dir(self.workspace_dir.path());
        cmd.env("SCL_DATA_DIR", self.data_dir.path());
        cmd
    }

    /// Get the path to the workspace directory.
    pub fn workspace_path(&self) -> &std::path::Path {
        self.workspace_dir.path()
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    /// Run a command, asserting success, and parse its stdout as JSON.
    pub fn scl_json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.scl().args(args).assert().success();
        let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
        serde_json::from_str(&stdout).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
