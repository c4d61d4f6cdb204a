//! Completer abstraction for LLM invocation.
//!
//! The [`Completer`] trait decouples the workflow from the actual model
//! backend. Tests use scripted completers that return predetermined text
//! without touching the network.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::{LlmConfig, LlmProvider};
use crate::io::process::run_command_with_timeout;

/// A text completion endpoint: one prompt in, one completion out.
pub trait Completer {
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<C: Completer + ?Sized> Completer for Box<C> {
    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }
}

/// Build the completer selected by `cfg`.
///
/// `workdir` is the working directory for command completers.
pub fn completer_from_config(cfg: &LlmConfig, workdir: &Path) -> Result<Box<dyn Completer>> {
    match cfg.provider {
        LlmProvider::OpenAi => {
            let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
                anyhow!(
                    "missing API key: set the {} environment variable",
                    cfg.api_key_env
                )
            })?;
            Ok(Box::new(OpenAiCompleter::new(cfg, api_key)?))
        }
        LlmProvider::Command => Ok(Box::new(CommandCompleter::new(
            cfg.command.clone(),
            workdir.to_path_buf(),
            cfg.timeout(),
            cfg.output_limit_bytes,
        )?)),
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Completer for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompleter {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompleter {
    pub fn new(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout())
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        })
    }
}

impl Completer for OpenAiCompleter {
    #[instrument(skip_all, fields(model = %self.model, prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        info!(url = %self.url, "requesting completion");
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("send completion request to {}", self.url))?;

        let status = response.status();
        let body = response.text().context("read completion response")?;
        if !status.is_success() {
            warn!(status = %status, "completion request failed");
            bail!("completion request failed with status {status}: {}", body.trim());
        }

        let completion = parse_chat_response(&body)?;
        debug!(completion_bytes = completion.len(), "completion received");
        Ok(completion)
    }
}

/// Extract `choices[0].message.content` from a chat completion body.
fn parse_chat_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).context("parse completion response json")?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("completion response has no message content"))
}

/// Completer that pipes the prompt into a local CLI and reads stdout.
#[derive(Debug, Clone)]
pub struct CommandCompleter {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandCompleter {
    pub fn new(
        command: Vec<String>,
        workdir: PathBuf,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("completer command must be non-empty");
        }
        Ok(Self {
            command,
            workdir,
            timeout,
            output_limit_bytes,
        })
    }
}

impl Completer for CommandCompleter {
    #[instrument(skip_all, fields(program = %self.command[0], prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        info!(workdir = %self.workdir.display(), "running completer command");
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).current_dir(&self.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run completer command")?;

        if output.timed_out {
            bail!("completer command timed out after {:?}", self.timeout);
        }
        if !output.success() {
            bail!(
                "completer command failed with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if output.stdout_truncated > 0 {
            bail!(
                "completer output exceeded {} bytes ({} truncated)",
                self.output_limit_bytes,
                output.stdout_truncated
            );
        }
        Ok(output.stdout_text())
    }
}
