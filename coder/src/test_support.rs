//! Test-only doubles for the completer and builder, plus a temp project.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::BuildResult;
use crate::io::builder::Builder;
use crate::io::completer::Completer;

/// Completer that replays queued responses and records every prompt.
///
/// Errors once the queue is empty, which doubles as an "unexpected call"
/// check.
pub struct ScriptedCompleter {
    responses: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedCompleter {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Completer for ScriptedCompleter {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted completer exhausted"))
    }
}

/// Builder that replays queued results and counts invocations.
pub struct ScriptedBuilder {
    results: RefCell<VecDeque<BuildResult>>,
    calls: Cell<u32>,
}

impl ScriptedBuilder {
    pub fn new<I>(results: I) -> Self
    where
        I: IntoIterator<Item = BuildResult>,
    {
        Self {
            results: RefCell::new(results.into_iter().collect()),
            calls: Cell::new(0),
        }
    }

    /// Number of times `build` was invoked.
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl Builder for ScriptedBuilder {
    fn build(&self, _workdir: &Path) -> Result<BuildResult> {
        self.calls.set(self.calls.get() + 1);
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted builder exhausted"))
    }
}

/// Temporary project directory holding a `main.go` target file.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub const TARGET: &'static str = "main.go";

    pub fn new(target_contents: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp project")?;
        fs::write(dir.path().join("go.mod"), "module example.com/app\n\ngo 1.22\n")
            .context("write go.mod")?;
        fs::write(dir.path().join(Self::TARGET), target_contents).context("write target")?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> PathBuf {
        self.root().join(Self::TARGET)
    }

    pub fn read_target(&self) -> Result<String> {
        fs::read_to_string(self.target()).context("read target")
    }

    /// Write an extra file relative to the project root.
    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }
}
