//! LLM-driven single-file refactor.
//!
//! `coder run` asks the model for a plan, applies it to the target file,
//! builds the project and, when the build fails, asks for a fix.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use coder::core::types::BuildResult;
use coder::exit_codes;
use coder::io::builder::{Builder, CommandBuilder};
use coder::io::completer::completer_from_config;
use coder::io::config::{CoderConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use coder::io::describe::describe_directory;
use coder::logging;
use coder::workflow::{Event, WorkflowConfig, run_workflow};

#[derive(Parser)]
#[command(
    name = "coder",
    version,
    about = "Plan, apply and build-check an LLM refactor of one source file"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// More log output on stderr (-v info, -vv debug). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the directory listing the model sees.
    Describe {
        /// Directory to describe (defaults to the configured project root).
        dir: Option<PathBuf>,
    },
    /// Run the configured build once and print the result.
    Build {
        /// Project root override.
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Plan, refactor, build and (if needed) fix the target file.
    Run(RunArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Project root override.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Target file override (relative paths resolve against the project root).
    #[arg(long)]
    target: Option<PathBuf>,

    /// Refactor goal override, e.g. "improve the error handling".
    #[arg(long)]
    goal: Option<String>,

    /// Model identifier override.
    #[arg(long)]
    model: Option<String>,

    /// Fix attempts allowed after a failed build.
    #[arg(long)]
    max_fix_attempts: Option<u32>,

    /// Prompt byte budget (unset means unbounded).
    #[arg(long)]
    prompt_budget: Option<usize>,

    /// Skip the final verification build.
    #[arg(long)]
    no_verify: bool,
}

impl RunArgs {
    fn apply(&self, cfg: &mut CoderConfig) {
        if let Some(project) = &self.project {
            cfg.project_root = project.clone();
        }
        if let Some(target) = &self.target {
            cfg.target_file = Some(target.clone());
        }
        if let Some(goal) = &self.goal {
            cfg.goal = goal.clone();
        }
        if let Some(model) = &self.model {
            cfg.llm.model = model.clone();
        }
        if let Some(attempts) = self.max_fix_attempts {
            cfg.max_fix_attempts = attempts;
        }
        if let Some(budget) = self.prompt_budget {
            cfg.prompt_budget_bytes = Some(budget);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Describe { dir } => cmd_describe(&cli.config, dir),
        Command::Build { project } => cmd_build(&cli.config, project),
        Command::Run(args) => cmd_run(&cli.config, &args),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &CoderConfig::default())?;
    println!("init: wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_describe(config_path: &Path, dir: Option<PathBuf>) -> Result<i32> {
    let dir = match dir {
        Some(dir) => dir,
        None => load_config(config_path)?.project_root,
    };
    print!("{}", describe_directory(&dir)?);
    Ok(exit_codes::OK)
}

fn cmd_build(config_path: &Path, project: Option<PathBuf>) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    if let Some(project) = project {
        cfg.project_root = project;
    }
    let builder = CommandBuilder::from_config(&cfg.build)?;
    let result = builder.build(&cfg.project_root)?;
    Ok(report_build(&result))
}

fn cmd_run(config_path: &Path, args: &RunArgs) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    args.apply(&mut cfg);
    cfg.validate().context("validate config with overrides")?;

    let workflow = WorkflowConfig::from_config(&cfg)?;
    let builder = CommandBuilder::from_config(&cfg.build)?;
    let completer = completer_from_config(&cfg.llm, &workflow.project_root)?;
    info!(
        target = %workflow.target_file.display(),
        model = %cfg.llm.model,
        build = %builder.display_command(),
        "starting run"
    );

    let outcome = run_workflow(&workflow, &completer, &builder, print_event)?;
    println!(
        "run: builds={} fix_attempts={} replacements={}",
        outcome.builds, outcome.fix_attempts, outcome.replacements
    );

    if args.no_verify {
        if !outcome.verified() {
            println!("run: final file was not rebuilt (--no-verify)");
        }
        return Ok(exit_codes::OK);
    }
    let result = builder.build(&workflow.project_root)?;
    Ok(report_build(&result))
}

fn print_event(event: Event<'_>) {
    match event {
        Event::Phase(phase) => info!(%phase, "entering phase"),
        Event::Plan(plan) => println!("plan:\n{}\n", plan.trim_end()),
        Event::Replaced { phase, bytes } => info!(%phase, bytes, "target file replaced"),
        Event::BuildFailed { build, diagnostics } => {
            println!("build {build} failed:\n{}\n", diagnostics.trim_end());
        }
    }
}

/// Print a final build result and map it to an exit code.
fn report_build(result: &BuildResult) -> i32 {
    match result {
        BuildResult::Success => {
            println!("build: success");
            exit_codes::OK
        }
        BuildResult::Failure { diagnostics } => {
            println!("build: failed\n{}", diagnostics.trim_end());
            exit_codes::BUILD_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["coder", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::parse_from([
            "coder",
            "-vv",
            "run",
            "--target",
            "container.go",
            "--max-fix-attempts",
            "3",
            "--model",
            "gpt-4o",
            "--no-verify",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.target, Some(PathBuf::from("container.go")));
        assert_eq!(args.max_fix_attempts, Some(3));
        assert!(args.no_verify);
    }

    #[test]
    fn run_args_override_config() {
        let mut cfg = CoderConfig::default();
        let args = RunArgs {
            project: Some(PathBuf::from("/srv/app")),
            target: Some(PathBuf::from("main.go")),
            goal: Some("simplify the control flow".to_string()),
            model: Some("gpt-4o".to_string()),
            max_fix_attempts: Some(0),
            prompt_budget: Some(50_000),
            no_verify: false,
        };
        args.apply(&mut cfg);
        assert_eq!(cfg.project_root, PathBuf::from("/srv/app"));
        assert_eq!(cfg.target_file, Some(PathBuf::from("main.go")));
        assert_eq!(cfg.goal, "simplify the control flow");
        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.max_fix_attempts, 0);
        assert_eq!(cfg.prompt_budget_bytes, Some(50_000));
    }

    #[test]
    fn empty_run_args_keep_config() {
        let mut cfg = CoderConfig::default();
        RunArgs::default().apply(&mut cfg);
        assert_eq!(cfg, CoderConfig::default());
    }

    #[test]
    fn report_build_maps_exit_codes() {
        assert_eq!(report_build(&BuildResult::Success), exit_codes::OK);
        assert_eq!(
            report_build(&BuildResult::failure("boom")),
            exit_codes::BUILD_FAILED
        );
    }
}
