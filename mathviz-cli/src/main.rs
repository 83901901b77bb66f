//! # mathviz CLI
//!
//! Command-line interface for the math animation agent.
//!
//! Usage:
//!   mathviz solve <problem>...
//!   mathviz batch <problems.txt>
//!   mathviz plan <solution.json> --problem <text>
//!   mathviz score <scene.py>
//!
//! Examples:
//!   mathviz solve -g elementary_lower "Tom has 3 apples and buys 5 more. How many now?"
//!   mathviz -v solve --quality medium --review "2 + 3 = ?"
//!   mathviz batch problems.txt --json
//!   mathviz plan solution.json --problem "3 + 5 = ?" > scene.py
//!   mathviz score scene.py

use clap::{Args, Parser, Subcommand};
use mathviz_agent::{
    CancelToken, GradeLevel, ManimExecutor, OpenAiCompatProvider, Orchestrator,
    ProviderLlmService, RenderQuality, Settings, SkillCatalog, Solution, Status, WorkflowResult,
};
use mathviz_error::{Error, Result};
use mathviz_scene::{check_source, CodeQualityAnalyzer, SceneCodeBuilder, ScenePlanner, DEFAULT_FONT};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type Agent = Orchestrator<ProviderLlmService<OpenAiCompatProvider>, ManimExecutor, SkillCatalog>;

#[derive(Parser)]
#[command(name = "mathviz")]
#[command(author, version, about = "mathviz - turn math problems into Manim animations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one problem and render its animation
    Solve {
        /// The problem text
        #[arg(trailing_var_arg = true, required = true)]
        problem: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Solve every problem in a file (one per line) concurrently
    Batch {
        /// File with one problem per line; blank lines and `#` comments are skipped
        file: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Build a scene program from a solution JSON without calling a model
    Plan {
        /// Path to the solution JSON file
        file: PathBuf,

        /// Problem text shown as the scene title
        #[arg(short, long, default_value = "")]
        problem: String,

        /// Name of the generated Scene class
        #[arg(long, default_value = "MathVisualization")]
        class_name: String,

        #[arg(long, default_value = DEFAULT_FONT)]
        font: String,
    },
    /// Score a Manim script with the quality heuristics
    Score {
        /// Path to the Python script
        file: PathBuf,

        #[arg(long, default_value = DEFAULT_FONT)]
        font: String,
    },
}

/// Overrides applied on top of the `MATHVIZ_*` environment
#[derive(Args)]
struct RunArgs {
    /// Audience of the explanation
    #[arg(short, long, default_value = "elementary_upper")]
    grade: GradeLevel,

    /// Render quality: low, medium or high
    #[arg(short, long)]
    quality: Option<RenderQuality>,

    /// Directory that receives rendered media
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Model name passed to the provider
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    api_base: Option<String>,

    /// Renderer wall-clock budget in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Review low-scoring programs before rendering
    #[arg(long)]
    review: bool,

    /// Skip the problem analysis step for non-trivial problems
    #[arg(long)]
    no_understanding: bool,

    /// Directory of skill documents
    #[arg(long)]
    skills: Option<PathBuf>,
}

impl RunArgs {
    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::from_env()?;
        if let Some(quality) = self.quality {
            settings.quality = quality;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(base) = &self.api_base {
            settings.api_base = base.clone();
        }
        if let Some(secs) = self.timeout {
            settings.render_timeout = Duration::from_secs(secs);
        }
        if self.review {
            settings.enable_review = true;
        }
        if let Some(dir) = &self.skills {
            settings.skills_dir = Some(dir.clone());
        }
        Ok(settings)
    }

    fn build_agent(&self) -> Result<Agent> {
        let settings = self.settings()?;
        debug!(?settings, "resolved settings");

        let provider = OpenAiCompatProvider::new(settings.provider_config())?;
        let llm = ProviderLlmService::new(provider);
        let executor = ManimExecutor::new(settings.executor_config());

        let mut config = settings.workflow_config();
        config.enable_understanding = !self.no_understanding;

        let mut agent = Orchestrator::new(Arc::new(llm), Arc::new(executor)).with_config(config);
        if let Some(dir) = &settings.skills_dir {
            let catalog = SkillCatalog::load_dir(dir)?;
            info!(skills = catalog.len(), dir = %dir.display(), "loaded skills");
            agent = agent.with_skills(Arc::new(catalog));
        }
        Ok(agent)
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancels `token` on Ctrl-C
fn cancel_on_interrupt(token: &CancelToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling...");
            token.cancel();
        }
    });
}

fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

fn print_result(result: &WorkflowResult, verbose: bool) {
    println!("Status: {}", result.status);
    println!("Problem: {}", result.problem_text);

    println!("\n=== TRACE ===");
    for entry in &result.trace {
        println!("{}", entry);
    }

    if !result.solution.is_empty() {
        println!("\n=== SOLUTION ===");
        print!("{}", result.solution.render_text());
    }

    match result.status {
        Status::Success => {
            if let Some(path) = &result.video_path {
                println!("\nVideo: {}", path.display());
            }
        }
        Status::Fallback => {
            if let Some(content) = &result.fallback_content {
                println!("\n=== FALLBACK ===\n{}", content);
            }
        }
        Status::Failed | Status::Pending => {}
    }

    if let Some(score) = result.quality_score {
        println!("Quality score: {:.1}", score);
    }
    if let Some(skill) = &result.skill_used {
        println!("Skill: {}", skill);
    }
    if let Some(error) = &result.error {
        let error = if verbose { error.clone() } else { truncate(error, 300) };
        eprintln!("Last error: {}", error);
    }
    if verbose && !result.code.is_empty() {
        println!("\n=== CODE ===\n{}", result.code);
    }
}

async fn solve(problem: &str, run: &RunArgs, json: bool, verbose: bool) -> Result<bool> {
    let agent = run.build_agent()?;
    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel);

    let result = agent.run_with_cancel(problem, run.grade, &cancel).await;
    if json {
        println!("{}", to_json(&result)?);
    } else {
        print_result(&result, verbose);
        let usage = agent.llm().usage();
        println!(
            "\nLLM calls: {}, tokens: {}",
            usage.total_calls,
            usage.total_tokens()
        );
    }
    Ok(result.status != Status::Failed)
}

async fn batch(file: &PathBuf, run: &RunArgs, json: bool) -> Result<bool> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| Error::from(e).with_context("path", file.display().to_string()))?;
    let problems: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    if problems.is_empty() {
        return Err(Error::invalid_argument(format!("no problems in {}", file.display())));
    }

    let agent = run.build_agent()?;
    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel);
    info!(count = problems.len(), "running batch");

    let results = futures_util::future::join_all(
        problems
            .iter()
            .map(|p| agent.run_with_cancel(p, run.grade, &cancel)),
    )
    .await;

    if json {
        println!("{}", to_json(&results)?);
    } else {
        for result in &results {
            let outcome = match (&result.video_path, &result.error) {
                (Some(path), _) => path.display().to_string(),
                (None, Some(error)) => truncate(error, 80),
                (None, None) => String::new(),
            };
            println!(
                "[{:<8}] {} -> {}",
                result.status,
                truncate(&result.problem_text, 40),
                outcome
            );
        }
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        println!("\n{}/{} rendered", succeeded, results.len());
    }
    Ok(results.iter().all(|r| r.status != Status::Failed))
}

fn plan(file: &PathBuf, problem: &str, class_name: &str, font: &str) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| Error::from(e).with_context("path", file.display().to_string()))?;
    let solution: Solution = serde_json::from_str(&content).map_err(|e| {
        Error::parse_failed(format!("invalid solution JSON: {}", e)).set_source(e)
    })?;

    let planner = ScenePlanner::with_builder(SceneCodeBuilder::new().with_font(font));
    let code = planner.plan_solution(&solution.to_outline(problem), class_name)?;
    print!("{}", code);
    Ok(())
}

fn score(file: &PathBuf, font: &str, json: bool) -> Result<()> {
    let code = std::fs::read_to_string(file)
        .map_err(|e| Error::from(e).with_context("path", file.display().to_string()))?;
    let metrics = CodeQualityAnalyzer::new(font).analyze(&code);

    if json {
        let value = serde_json::json!({
            "score": metrics.score(),
            "needs_review": metrics.needs_review(),
            "metrics": metrics,
        });
        println!("{}", to_json(&value)?);
        return Ok(());
    }

    println!("Score: {:.1}", metrics.score());
    println!("  required font:      {}", metrics.has_required_font);
    println!("  scene class:        {}", metrics.has_scene_class);
    println!("  syntax valid:       {}", metrics.syntax_valid);
    println!("  layout issues:      {}", metrics.has_layout_issues);
    println!("  scene transitions:  {}", metrics.scene_transition_count);
    println!("  transforms:         {}", metrics.transform_count);
    println!("  overlap risk:       {:.2}", metrics.overlap_risk);
    if let Err(issue) = check_source(&code) {
        println!("  syntax issue:       {}", issue);
    }
    if metrics.needs_review() {
        println!("Needs review");
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::unexpected(format!("failed to serialize output: {}", e)).set_source(e))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let verbose = cli.verbose > 0;

    let outcome = match &cli.command {
        Commands::Solve { problem, run } => solve(&problem.join(" "), run, cli.json, verbose).await,
        Commands::Batch { file, run } => batch(file, run, cli.json).await,
        Commands::Plan {
            file,
            problem,
            class_name,
            font,
        } => plan(file, problem, class_name, font).map(|()| true),
        Commands::Score { file, font } => score(file, font, cli.json).map(|()| true),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if verbose {
                eprintln!("Error: {:?}", e);
            } else {
                eprintln!("Error: {}", e);
            }
            std::process::exit(1);
        }
    }
}
