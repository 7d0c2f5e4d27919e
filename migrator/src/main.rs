//! Migration pipeline CLI.

use std::env;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use migrator::core::types::StepName;
use migrator::exit_codes;
use migrator::io::config::load_config;
use migrator::io::experiment::{Experiment, load_experiment};
use migrator::io::layout::{InitOptions, MigratorPaths, init_migrator};
use migrator::io::llm::{Completion, CompletionRequest, LlmClient, OpenAiClient};
use migrator::io::pytest::PytestRunner;
use migrator::io::report::write_report;
use migrator::io::run_state::load_run_state;
use migrator::run::{assemble_report, run_pipeline};
use migrator::step::{BaselineFailed, run_step};
use migrator::validate::{Validation, validate};

#[derive(Parser)]
#[command(
    name = "migrator",
    version,
    about = "LLM-driven Python library migration pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.migrator/` with an experiment spec and default config.
    Init {
        /// Library to migrate away from.
        #[arg(long)]
        source: String,
        /// Library to migrate to.
        #[arg(long)]
        target: String,
        /// Repository slug (defaults to the current directory name).
        #[arg(long)]
        repo: Option<String>,
        /// Pinned commit; `migrator run` verifies HEAD matches it.
        #[arg(long)]
        commit: Option<String>,
        /// Run the async_transform step after llmmig.
        #[arg(long)]
        async_transform: bool,
        /// Overwrite an existing `.migrator/` directory.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the full pipeline and write `report.yaml`.
    Run,
    /// Run a single pipeline step.
    Step {
        #[arg(value_enum)]
        name: StepArg,
    },
    /// Assemble `report.yaml` from recorded step artifacts and print it.
    Report,
    /// Check `.migrator/` layout, config, and experiment spec.
    Validate,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StepArg {
    Premig,
    Llmmig,
    MergeSkipped,
    AsyncTransform,
}

impl From<StepArg> for StepName {
    fn from(arg: StepArg) -> Self {
        match arg {
            StepArg::Premig => StepName::Premig,
            StepArg::Llmmig => StepName::Llmmig,
            StepArg::MergeSkipped => StepName::MergeSkipped,
            StepArg::AsyncTransform => StepName::AsyncTransform,
        }
    }
}

/// Stand-in for steps that never call the LLM (premig, merge_skipped); lets
/// them run without an API key in the environment.
struct UnusedLlm;

impl LlmClient for UnusedLlm {
    fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        bail!("this step does not use the LLM")
    }
}

fn main() {
    migrator::logging::init();
    let cli = Cli::parse();
    let code = match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<BaselineFailed>().is_some() {
                exit_codes::BASELINE_FAILED
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn execute(cli: Cli) -> Result<i32> {
    let root = env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init {
            source,
            target,
            repo,
            commit,
            async_transform,
            force,
        } => cmd_init(&root, source, target, repo, commit, async_transform, force),
        Command::Run => cmd_run(&root),
        Command::Step { name } => cmd_step(&root, name.into()),
        Command::Report => cmd_report(&root),
        Command::Validate => cmd_validate(&root),
    }
}

fn cmd_init(
    root: &Path,
    source: String,
    target: String,
    repo: Option<String>,
    commit: Option<String>,
    async_transform: bool,
    force: bool,
) -> Result<i32> {
    let repo = match repo {
        Some(repo) => repo,
        None => root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .context("current directory has no name; pass --repo")?,
    };
    let experiment = Experiment {
        repo,
        commit,
        source,
        target,
        async_transform,
    };
    let paths = init_migrator(root, &experiment, &InitOptions { force })?;
    println!("initialized {}", paths.migrator_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path) -> Result<i32> {
    let paths = MigratorPaths::new(root);
    let config = load_config(&paths.config_path)?;
    let llm = OpenAiClient::from_config(&config.llm)?;
    let tests = PytestRunner::new(config.test.command.clone());

    let outcome = run_pipeline(root, &llm, &tests)?;
    println!("report: {}", paths.report_path.display());
    if outcome.regressed {
        return Ok(exit_codes::REGRESSED);
    }
    Ok(exit_codes::OK)
}

fn cmd_step(root: &Path, step: StepName) -> Result<i32> {
    let paths = MigratorPaths::new(root);
    let config = load_config(&paths.config_path)?;
    let tests = PytestRunner::new(config.test.command.clone());

    let meta = match step {
        StepName::Premig | StepName::MergeSkipped => run_step(root, step, &UnusedLlm, &tests)?,
        StepName::Llmmig | StepName::AsyncTransform => {
            let llm = OpenAiClient::from_config(&config.llm)?;
            run_step(root, step, &llm, &tests)?
        }
    };
    println!(
        "{}: {} files, {} test diffs",
        step.as_str(),
        meta.files.len(),
        meta.test_diffs.len()
    );
    if migrator::core::diff::has_regressions(&meta.test_diffs) {
        return Ok(exit_codes::REGRESSED);
    }
    Ok(exit_codes::OK)
}

fn cmd_report(root: &Path) -> Result<i32> {
    let paths = MigratorPaths::new(root);
    let experiment = load_experiment(&paths.experiment_path)?;
    let state = load_run_state(&paths.run_state_path)?;
    let mig = state
        .run_id
        .context("no recorded run id; run the pipeline first")?;
    // The commit short SHA is the last segment of the mig id.
    let commit = mig.rsplit("__").next().unwrap_or("worktree").to_string();

    let report = assemble_report(root, &experiment, &mig, &commit)?;
    write_report(&paths.report_path, &report)?;
    print!("{}", serde_yaml::to_string(&report)?);
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    match validate(root)? {
        Validation::NotInitialized => {
            println!("not initialized (run `migrator init`)");
        }
        Validation::Ok => println!("ok"),
    }
    Ok(exit_codes::OK)
}
