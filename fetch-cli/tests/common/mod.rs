// Each integration test file is compiled as its own binary crate, each
// pulling in its own copy of this module. Helpers used by some test
// binaries but not others trigger false "dead code" warnings in the
// binaries that don't call them.
#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};

/// Result of running the fetch binary.
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunResult {
    fn from_output(output: Output) -> Self {
        RunResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    /// Combined stdout + stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Path to the compiled fetch binary (set by Cargo for [[bin]] targets).
pub fn fetch_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fetch"))
}

/// Run the fetch binary with the given arguments.
pub fn run(args: &[&str]) -> RunResult {
    run_with_env(args, &[])
}

/// Run the fetch binary with extra environment variables.
pub fn run_with_env(args: &[&str], env: &[(&str, &str)]) -> RunResult {
    let mut cmd = Command::new(fetch_bin());
    cmd.args(args);
    // Keep test runs hermetic: no user config, no ambient credentials.
    cmd.env_remove("AWS_ACCESS_KEY_ID");
    cmd.env_remove("AWS_SECRET_ACCESS_KEY");
    cmd.env_remove("NO_COLOR");
    cmd.env("XDG_CONFIG_HOME", "/nonexistent/fetch-test-config");
    for (key, value) in env {
        cmd.env(key, value);
    }
    let output = cmd.output().expect("failed to execute fetch binary");
    RunResult::from_output(output)
}

// -- Assertion helpers --------------------------------------------------------

/// Assert the exit code matches.
pub fn assert_exit_code(result: &RunResult, expected: i32) {
    assert_eq!(
        result.exit_code, expected,
        "Expected exit code {expected}, got {}.\nstdout: {}\nstderr: {}",
        result.exit_code, result.stdout, result.stderr,
    );
}

/// Assert stdout contains a substring.
pub fn assert_stdout_contains(result: &RunResult, needle: &str) {
    assert!(
        result.stdout.contains(needle),
        "Expected stdout to contain {needle:?}.\nstdout: {}\nstderr: {}",
        result.stdout,
        result.stderr,
    );
}

/// Assert stderr contains a substring.
pub fn assert_stderr_contains(result: &RunResult, needle: &str) {
    assert!(
        result.stderr.contains(needle),
        "Expected stderr to contain {needle:?}.\nstdout: {}\nstderr: {}",
        result.stdout,
        result.stderr,
    );
}
