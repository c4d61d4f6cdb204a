//! Coder configuration stored in `coder.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "coder.toml";

/// Coder configuration (TOML).
///
/// Every field has a default so a partial file (or no file at all) works.
/// `target_file` has no useful default and must come from the file or the
/// command line before a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoderConfig {
    /// Root of the project being refactored; the build runs here.
    pub project_root: PathBuf,

    /// File to refactor. Relative paths resolve against `project_root`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_file: Option<PathBuf>,

    /// What the refactor should achieve, in plain words.
    pub goal: String,

    /// Fix prompts allowed after a failed build. The last fix is never rebuilt.
    pub max_fix_attempts: u32,

    /// Byte budget for each rendered prompt. Unset means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_budget_bytes: Option<usize>,

    pub build: BuildConfig,

    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Build argv, run with `project_root` as working directory.
    pub command: Vec<String>,

    /// Kill the build after this many seconds.
    pub timeout_secs: u64,

    /// Keep at most this many bytes of each output stream.
    pub output_limit_bytes: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "go".to_string(),
                "build".to_string(),
                "-o".to_string(),
                "bin/".to_string(),
            ],
            timeout_secs: 30 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which completion backend to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible `/chat/completions` over HTTP.
    OpenAi,
    /// A local CLI that reads the prompt on stdin and prints the completion.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,

    /// Model identifier sent with every request.
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Argv for `provider = "command"`.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Truncate command completer output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            command: Vec::new(),
            timeout_secs: 10 * 60,
            temperature: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            target_file: None,
            goal: "improve the error handling".to_string(),
            max_fix_attempts: 1,
            prompt_budget_bytes: None,
            build: BuildConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl CoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.goal.trim().is_empty() {
            return Err(anyhow!("goal must not be empty"));
        }
        if self.prompt_budget_bytes == Some(0) {
            return Err(anyhow!("prompt_budget_bytes must be > 0 when set"));
        }
        if self.build.command.is_empty() || self.build.command[0].trim().is_empty() {
            return Err(anyhow!("build.command must be a non-empty array"));
        }
        if self.build.timeout_secs == 0 {
            return Err(anyhow!("build.timeout_secs must be > 0"));
        }
        if self.build.output_limit_bytes == 0 {
            return Err(anyhow!("build.output_limit_bytes must be > 0"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if let Some(t) = self.llm.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(anyhow!("llm.temperature must be within 0.0..=2.0"));
        }
        match self.llm.provider {
            LlmProvider::OpenAi => {
                if self.llm.model.trim().is_empty() {
                    return Err(anyhow!("llm.model must not be empty"));
                }
                if self.llm.base_url.trim().is_empty() {
                    return Err(anyhow!("llm.base_url must not be empty"));
                }
                if self.llm.api_key_env.trim().is_empty() {
                    return Err(anyhow!("llm.api_key_env must not be empty"));
                }
            }
            LlmProvider::Command => {
                if self.llm.command.is_empty() || self.llm.command[0].trim().is_empty() {
                    return Err(anyhow!(
                        "llm.command must be a non-empty array when provider = \"command\""
                    ));
                }
                if self.llm.output_limit_bytes == 0 {
                    return Err(anyhow!("llm.output_limit_bytes must be > 0"));
                }
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CoderConfig::default()`.
pub fn load_config(path: &Path) -> Result<CoderConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = CoderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CoderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CoderConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::file_store::replace_file(path, &buf)
}
