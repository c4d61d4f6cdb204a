//! Shared deterministic types for the refactor workflow.
//!
//! These types define stable contracts between the workflow and its
//! collaborators. They carry no I/O and stay the same across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one build invocation.
///
/// A failing build is an expected outcome, not an error: the diagnostics are
/// the input of the next fix prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BuildResult {
    /// Build command exited with status zero.
    Success,
    /// Build command exited non-zero or timed out.
    Failure {
        /// Combined build output, treated as opaque text.
        diagnostics: String,
    },
}

impl BuildResult {
    pub fn failure(diagnostics: impl Into<String>) -> Self {
        Self::Failure {
            diagnostics: diagnostics.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Diagnostic text for a failed build, `None` on success.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { diagnostics } => Some(diagnostics),
        }
    }
}

/// Workflow states, in the order a run moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Refactoring,
    Building,
    Fixing,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Refactoring => "refactoring",
            Self::Building => "building",
            Self::Fixing => "fixing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one completed workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOutcome {
    /// Phase the run ended in.
    pub phase: Phase,
    /// Plan text returned by the model.
    pub plan: String,
    /// Number of fix prompts sent.
    pub fix_attempts: u32,
    /// Number of times the target file was overwritten.
    pub replacements: u32,
    /// Number of builds the workflow ran.
    pub builds: u32,
    /// Last build result observed by the workflow.
    ///
    /// After the final fix this describes the build *before* the fix, since
    /// the fixed file is never rebuilt inside the workflow.
    pub last_build: BuildResult,
}

impl WorkflowOutcome {
    /// Whether the file on disk was verified to build.
    pub fn verified(&self) -> bool {
        self.last_build.is_success()
    }
}
