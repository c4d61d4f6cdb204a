//! Orchestration for one plan → refactor → build → fix run.
//!
//! ```text
//! PLANNING → REFACTORING → BUILDING ─┬─ success ──────────────────────────→ DONE
//!                                    └─ failure → FIXING ─┬─ last attempt ─→ DONE
//!                                                         └─ more allowed ─→ BUILDING
//! ```
//!
//! The fixed file is rebuilt only when another fix attempt is still allowed
//! afterwards, so with the default single attempt the fix is never verified
//! here. Every completer, file, or spawn error aborts the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::types::{Phase, WorkflowOutcome};
use crate::io::builder::Builder;
use crate::io::completer::Completer;
use crate::io::config::CoderConfig;
use crate::io::file_store::replace_file;
use crate::io::prompt::{PromptBuilder, PromptInputs};

/// Everything one workflow run needs to know, resolved from config and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub project_root: PathBuf,
    pub target_file: PathBuf,
    pub goal: String,
    pub max_fix_attempts: u32,
    pub prompt_budget_bytes: Option<usize>,
}

impl WorkflowConfig {
    /// Resolve a run from `cfg`. A relative target resolves against the
    /// project root.
    pub fn from_config(cfg: &CoderConfig) -> Result<Self> {
        let Some(target) = cfg.target_file.as_deref() else {
            bail!("target_file is not set (pass --target or set it in the config)");
        };
        Ok(Self {
            project_root: cfg.project_root.clone(),
            target_file: resolve_target(&cfg.project_root, target),
            goal: cfg.goal.clone(),
            max_fix_attempts: cfg.max_fix_attempts,
            prompt_budget_bytes: cfg.prompt_budget_bytes,
        })
    }
}

fn resolve_target(project_root: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        project_root.join(target)
    }
}

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A phase was entered.
    Phase(Phase),
    /// The model returned its plan.
    Plan(&'a str),
    /// The target file was overwritten with model output.
    Replaced { phase: Phase, bytes: usize },
    /// Build number `build` failed; a fix may follow.
    BuildFailed { build: u32, diagnostics: &'a str },
}

/// Run one workflow against `config.target_file`.
///
/// `on_event` sees each step as it happens; the CLI uses it to print the plan
/// and build diagnostics.
#[instrument(skip_all, fields(target = %config.target_file.display(), max_fix_attempts = config.max_fix_attempts))]
pub fn run_workflow<C, B, F>(
    config: &WorkflowConfig,
    completer: &C,
    builder: &B,
    mut on_event: F,
) -> Result<WorkflowOutcome>
where
    C: Completer + ?Sized,
    B: Builder + ?Sized,
    F: FnMut(Event<'_>),
{
    check_paths(config)?;
    let prompts = PromptBuilder::new(config.prompt_budget_bytes);
    let load = || PromptInputs::load(&config.project_root, &config.target_file, &config.goal);

    on_event(Event::Phase(Phase::Planning));
    let plan = completer
        .complete(&prompts.build_plan(&load()?)?)
        .context("request plan")?;
    info!(plan_bytes = plan.len(), "plan received");
    on_event(Event::Plan(&plan));

    on_event(Event::Phase(Phase::Refactoring));
    let new_code = completer
        .complete(&prompts.build_refactor(&load()?, &plan)?)
        .context("request refactor")?;
    replace_target(config, &new_code)?;
    let mut replacements = 1u32;
    on_event(Event::Replaced {
        phase: Phase::Refactoring,
        bytes: new_code.len(),
    });

    let mut builds = 0u32;
    let mut fix_attempts = 0u32;
    let last_build = loop {
        on_event(Event::Phase(Phase::Building));
        let result = builder
            .build(&config.project_root)
            .context("run build")?;
        builds += 1;

        let Some(diagnostics) = result.diagnostics() else {
            info!(builds, fix_attempts, "build succeeded");
            break result;
        };
        on_event(Event::BuildFailed {
            build: builds,
            diagnostics,
        });
        if fix_attempts >= config.max_fix_attempts {
            warn!(builds, fix_attempts, "build failed and no fix attempts left");
            break result;
        }

        on_event(Event::Phase(Phase::Fixing));
        fix_attempts += 1;
        info!(attempt = fix_attempts, "requesting fix");
        let fixed = completer
            .complete(&prompts.build_fix(&load()?, diagnostics)?)
            .with_context(|| format!("request fix attempt {fix_attempts}"))?;
        replace_target(config, &fixed)?;
        replacements += 1;
        on_event(Event::Replaced {
            phase: Phase::Fixing,
            bytes: fixed.len(),
        });

        if fix_attempts >= config.max_fix_attempts {
            info!(fix_attempts, "fix attempts exhausted, leaving last fix unverified");
            break result;
        }
    };

    on_event(Event::Phase(Phase::Done));
    Ok(WorkflowOutcome {
        phase: Phase::Done,
        plan,
        fix_attempts,
        replacements,
        builds,
        last_build,
    })
}

fn check_paths(config: &WorkflowConfig) -> Result<()> {
    if !config.project_root.is_dir() {
        bail!(
            "project root {} is not a directory",
            config.project_root.display()
        );
    }
    if !config.target_file.is_file() {
        bail!(
            "target file {} is not a regular file",
            config.target_file.display()
        );
    }
    Ok(())
}

fn replace_target(config: &WorkflowConfig, contents: &str) -> Result<()> {
    replace_file(&config.target_file, contents)
        .with_context(|| format!("overwrite target {}", config.target_file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BuildResult;
    use crate::test_support::{ScriptedBuilder, ScriptedCompleter, TestProject};

    fn config(project: &TestProject, max_fix_attempts: u32) -> WorkflowConfig {
        WorkflowConfig {
            project_root: project.root().to_path_buf(),
            target_file: project.target(),
            goal: "improve the error handling".to_string(),
            max_fix_attempts,
            prompt_budget_bytes: None,
        }
    }

    #[test]
    fn from_config_resolves_relative_target() {
        let cfg = CoderConfig {
            project_root: PathBuf::from("/srv/app"),
            target_file: Some(PathBuf::from("cmd/main.go")),
            ..CoderConfig::default()
        };
        let resolved = WorkflowConfig::from_config(&cfg).expect("resolve");
        assert_eq!(resolved.target_file, PathBuf::from("/srv/app/cmd/main.go"));
        assert_eq!(resolved.max_fix_attempts, 1);
    }

    #[test]
    fn from_config_requires_target() {
        let err = WorkflowConfig::from_config(&CoderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("target_file"));
    }

    #[test]
    fn success_on_first_build_sends_no_fix_prompt() {
        let project = TestProject::new("package main").expect("project");
        let completer = ScriptedCompleter::new(["the plan", "package main\nfunc main(){}"]);
        let builder = ScriptedBuilder::new([BuildResult::Success]);

        let outcome =
            run_workflow(&config(&project, 1), &completer, &builder, |_| {}).expect("run");

        assert_eq!(completer.prompts().len(), 2);
        assert!(
            completer
                .prompts()
                .iter()
                .all(|p| !p.contains("Build Output:"))
        );
        assert_eq!(builder.calls(), 1);
        assert_eq!(outcome.replacements, 1);
        assert_eq!(outcome.fix_attempts, 0);
        assert_eq!(outcome.phase, Phase::Done);
        assert!(outcome.verified());
        assert_eq!(
            project.read_target().expect("read"),
            "package main\nfunc main(){}"
        );
    }

    #[test]
    fn failed_build_gets_one_fix_and_no_rebuild() {
        let project = TestProject::new("package main").expect("project");
        let completer = ScriptedCompleter::new(["plan", "broken code", "fixed code"]);
        let builder = ScriptedBuilder::new([BuildResult::failure("main.go:1: syntax error")]);

        let outcome =
            run_workflow(&config(&project, 1), &completer, &builder, |_| {}).expect("run");

        assert_eq!(builder.calls(), 1);
        assert_eq!(outcome.replacements, 2);
        assert_eq!(outcome.fix_attempts, 1);
        assert!(!outcome.verified());
        assert_eq!(project.read_target().expect("read"), "fixed code");

        let prompts = completer.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains("main.go:1: syntax error"));
        assert!(prompts[2].contains("broken code"));
    }

    #[test]
    fn refactor_prompt_sees_plan_and_current_code() {
        let project = TestProject::new("package main // original").expect("project");
        let completer = ScriptedCompleter::new(["step one: wrap errors", "new code"]);
        let builder = ScriptedBuilder::new([BuildResult::Success]);

        run_workflow(&config(&project, 1), &completer, &builder, |_| {}).expect("run");

        let prompts = completer.prompts();
        assert!(prompts[0].contains("package main // original"));
        assert!(prompts[1].contains("step one: wrap errors"));
        assert!(prompts[1].contains("package main // original"));
    }

    #[test]
    fn zero_fix_attempts_stops_after_failed_build() {
        let project = TestProject::new("package main").expect("project");
        let completer = ScriptedCompleter::new(["plan", "broken"]);
        let builder = ScriptedBuilder::new([BuildResult::failure("boom")]);

        let outcome =
            run_workflow(&config(&project, 0), &completer, &builder, |_| {}).expect("run");

        assert_eq!(completer.prompts().len(), 2);
        assert_eq!(outcome.replacements, 1);
        assert_eq!(outcome.last_build, BuildResult::failure("boom"));
    }

    #[test]
    fn events_follow_state_machine() {
        let project = TestProject::new("package main").expect("project");
        let completer = ScriptedCompleter::new(["plan", "broken", "fixed"]);
        let builder = ScriptedBuilder::new([BuildResult::failure("boom")]);
        let mut phases = Vec::new();

        run_workflow(&config(&project, 1), &completer, &builder, |event| {
            if let Event::Phase(phase) = event {
                phases.push(phase);
            }
        })
        .expect("run");

        assert_eq!(
            phases,
            vec![
                Phase::Planning,
                Phase::Refactoring,
                Phase::Building,
                Phase::Fixing,
                Phase::Done
            ]
        );
    }

    #[test]
    fn completer_error_aborts_before_touching_file() {
        let project = TestProject::new("package main").expect("project");
        let completer = ScriptedCompleter::new(["plan"]);
        let builder = ScriptedBuilder::new([]);

        let err = run_workflow(&config(&project, 1), &completer, &builder, |_| {}).unwrap_err();

        assert!(format!("{err:#}").contains("request refactor"));
        assert_eq!(project.read_target().expect("read"), "package main");
        assert_eq!(builder.calls(), 0);
    }

    #[test]
    fn missing_target_is_rejected() {
        let project = TestProject::new("package main").expect("project");
        let mut cfg = config(&project, 1);
        cfg.target_file = project.root().join("absent.go");
        let completer = ScriptedCompleter::new(["plan"]);
        let builder = ScriptedBuilder::new([]);

        let err = run_workflow(&cfg, &completer, &builder, |_| {}).unwrap_err();

        assert!(err.to_string().contains("not a regular file"));
        assert!(completer.prompts().is_empty());
    }
}
