//! Prompt rendering for the plan, refactor and fix model invocations.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};
use tracing::{debug, info};

use crate::core::budget::{
    Section, SectionTemplate, apply_budget, render_sections, split_template,
};
use crate::io::describe::describe_directory;
use crate::io::file_store::read_file;

const PREAMBLE_TEMPLATE: &str = include_str!("prompts/preamble.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const REFACTOR_TEMPLATE: &str = include_str!("prompts/refactor.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");

/// Project state every prompt is built from.
///
/// Load a fresh copy before each prompt: the target file changes between
/// prompts and the tree may change too.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    /// What the refactor should achieve ("improve the error handling").
    pub goal: String,
    /// Rendered project tree.
    pub directory: String,
    /// Target file name as shown to the model.
    pub file_name: String,
    /// Current content of the target file.
    pub code: String,
}

impl PromptInputs {
    /// Describe `project_root` and read `target_file` from disk.
    pub fn load(project_root: &Path, target_file: &Path, goal: &str) -> Result<Self> {
        let directory = describe_directory(project_root).context("describe project")?;
        let code = read_file(target_file)?;
        let file_name = target_file
            .strip_prefix(project_root)
            .unwrap_or(target_file)
            .display()
            .to_string();
        Ok(Self {
            goal: goal.trim().to_string(),
            directory,
            file_name,
            code,
        })
    }
}

/// Renders the three prompt variants, optionally within a byte budget.
///
/// Each template is split into sections up front and every section is
/// rendered on its own, so file content never passes through marker parsing.
pub struct PromptBuilder {
    env: Environment<'static>,
    plan: Vec<SectionTemplate<'static>>,
    refactor: Vec<SectionTemplate<'static>>,
    fix: Vec<SectionTemplate<'static>>,
    budget_bytes: Option<usize>,
}

impl PromptBuilder {
    /// `None` leaves prompts unbounded.
    pub fn new(budget_bytes: Option<usize>) -> Self {
        let mut env = Environment::new();
        env.add_template("preamble", PREAMBLE_TEMPLATE)
            .expect("preamble template should be valid");
        let plan = checked_sections(&env, "plan", PLAN_TEMPLATE);
        let refactor = checked_sections(&env, "refactor", REFACTOR_TEMPLATE);
        let fix = checked_sections(&env, "fix", FIX_TEMPLATE);
        Self {
            env,
            plan,
            refactor,
            fix,
            budget_bytes,
        }
    }

    /// Ask for a refactor plan in prose.
    pub fn build_plan(&self, input: &PromptInputs) -> Result<String> {
        let ctx = context! {
            goal => input.goal,
            directory => non_empty(&input.directory),
            file_name => input.file_name,
            code => input.code.trim_end(),
        };
        self.render("plan", &self.plan, &ctx)
    }

    /// Ask for the complete replacement file implementing `plan`.
    pub fn build_refactor(&self, input: &PromptInputs, plan: &str) -> Result<String> {
        let ctx = context! {
            directory => non_empty(&input.directory),
            file_name => input.file_name,
            code => input.code.trim_end(),
            plan => plan.trim(),
        };
        self.render("refactor", &self.refactor, &ctx)
    }

    /// Ask for a corrected file given the build diagnostics.
    pub fn build_fix(&self, input: &PromptInputs, build_output: &str) -> Result<String> {
        let ctx = context! {
            directory => non_empty(&input.directory),
            file_name => input.file_name,
            code => input.code.trim_end(),
            build_output => build_output.trim(),
        };
        self.render("fix", &self.fix, &ctx)
    }

    fn render(
        &self,
        kind: &str,
        templates: &[SectionTemplate<'_>],
        ctx: &Value,
    ) -> Result<String> {
        let mut sections = Vec::with_capacity(templates.len());
        for template in templates {
            let rendered = self
                .env
                .render_str(template.body, ctx)
                .with_context(|| format!("render {kind} prompt section {}", template.key))?;
            let content = rendered.trim();
            if content.is_empty() && !template.required {
                continue;
            }
            sections.push(Section {
                key: template.key.to_string(),
                required: template.required,
                content: content.to_string(),
            });
        }
        Ok(self.finish(kind, sections))
    }

    fn finish(&self, kind: &str, mut sections: Vec<Section>) -> String {
        if let Some(budget) = self.budget_bytes
            && apply_budget(&mut sections, budget)
        {
            info!(prompt = kind, budget, "prompt shrunk to fit budget");
        }
        let prompt = render_sections(&sections);
        debug!(prompt = kind, bytes = prompt.len(), "prompt rendered");
        prompt
    }
}

/// Split `source` into sections, checking that each one compiles.
fn checked_sections(
    env: &Environment<'static>,
    kind: &str,
    source: &'static str,
) -> Vec<SectionTemplate<'static>> {
    let sections = split_template(source);
    for section in &sections {
        if let Err(err) = env.template_from_str(section.body) {
            panic!("{kind} template section {} should be valid: {err}", section.key);
        }
    }
    sections
}

fn non_empty(text: &str) -> Option<&str> {
    Some(text.trim()).filter(|s| !s.is_empty())
}
