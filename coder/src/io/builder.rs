//! Build adapter: runs the project's build command and classifies the result.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::types::BuildResult;
use crate::io::config::BuildConfig;
use crate::io::process::run_command_with_timeout;

/// Abstraction over the external build toolchain.
///
/// A failing build is `Ok(BuildResult::Failure { .. })`. `Err` is reserved
/// for not being able to run the build at all.
pub trait Builder {
    fn build(&self, workdir: &Path) -> Result<BuildResult>;
}

/// Builder that spawns a fixed argv, e.g. `go build -o bin/`.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBuilder {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("build command must be non-empty"));
        }
        Ok(Self {
            command,
            timeout,
            output_limit_bytes,
        })
    }

    pub fn from_config(cfg: &BuildConfig) -> Result<Self> {
        Self::new(cfg.command.clone(), cfg.timeout(), cfg.output_limit_bytes)
    }

    /// The argv joined for display.
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}

impl Builder for CommandBuilder {
    #[instrument(skip_all, fields(workdir = %workdir.display(), command = %self.display_command()))]
    fn build(&self, workdir: &Path) -> Result<BuildResult> {
        info!("running build");
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).current_dir(workdir);

        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run build `{}`", self.display_command()))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "build timed out");
            let mut diagnostics = output.combined_text();
            if !diagnostics.is_empty() {
                diagnostics.push('\n');
            }
            diagnostics.push_str(&format!(
                "[build timed out after {}s]",
                self.timeout.as_secs()
            ));
            return Ok(BuildResult::failure(diagnostics));
        }

        if output.success() {
            info!("build succeeded");
            return Ok(BuildResult::Success);
        }

        warn!(exit_code = ?output.status.code(), "build failed");
        let mut diagnostics = output.combined_text();
        if diagnostics.is_empty() {
            diagnostics = format!(
                "build `{}` failed with exit code {:?} and no output",
                self.display_command(),
                output.status.code()
            );
        }
        Ok(BuildResult::failure(diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command() {
        let err = CommandBuilder::new(Vec::new(), Duration::from_secs(1), 100).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
        assert!(CommandBuilder::new(vec![" ".to_string()], Duration::from_secs(1), 100).is_err());
    }

    #[test]
    fn from_config_uses_configured_argv() {
        let builder = CommandBuilder::from_config(&BuildConfig::default()).expect("builder");
        assert_eq!(builder.display_command(), "go build -o bin/");
    }

    #[cfg(unix)]
    fn sh_builder(script: &str, timeout: Duration) -> CommandBuilder {
        CommandBuilder::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout,
            10_000,
        )
        .expect("builder")
    }

    #[cfg(unix)]
    #[test]
    fn clean_build_is_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        let builder = sh_builder("echo compiling; exit 0", Duration::from_secs(10));
        let result = builder.build(temp.path()).expect("build");
        assert_eq!(result, BuildResult::Success);
    }

    #[cfg(unix)]
    #[test]
    fn failing_build_returns_diagnostics() {
        let temp = tempfile::tempdir().expect("tempdir");
        let builder = sh_builder(
            "echo '# example'; echo './main.go:3:1: syntax error: unexpected }' >&2; exit 1",
            Duration::from_secs(10),
        );
        let result = builder.build(temp.path()).expect("build");
        let diagnostics = result.diagnostics().expect("failure");
        assert!(diagnostics.contains("# example"));
        assert!(diagnostics.contains("syntax error: unexpected }"));
    }

    #[cfg(unix)]
    #[test]
    fn silent_failure_still_has_diagnostics() {
        let temp = tempfile::tempdir().expect("tempdir");
        let builder = sh_builder("exit 2", Duration::from_secs(10));
        let result = builder.build(temp.path()).expect("build");
        let diagnostics = result.diagnostics().expect("failure");
        assert!(diagnostics.contains("exit code Some(2)"));
    }

    #[cfg(unix)]
    #[test]
    fn build_runs_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "").expect("write marker");
        let builder = sh_builder("test -f marker.txt", Duration::from_secs(10));
        assert!(builder.build(temp.path()).expect("build").is_success());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_a_failure_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let builder = sh_builder("exec sleep 5", Duration::from_millis(200));
        let result = builder.build(temp.path()).expect("build");
        assert!(result.diagnostics().expect("failure").contains("timed out"));
    }

    #[test]
    fn missing_toolchain_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let builder = CommandBuilder::new(
            vec!["no-such-build-tool-xyz".to_string()],
            Duration::from_secs(1),
            100,
        )
        .expect("builder");
        assert!(builder.build(temp.path()).is_err());
    }
}
