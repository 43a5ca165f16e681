use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use taintflow_ai::LlmProviderFactory;
use taintflow_core::{
    PipelineConfig, Weakness, DEFAULT_CONTEXT_LINES, DEFAULT_GAP_LIMIT,
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MAX_RETRIES,
};
use taintflow_pipeline::Orchestrator;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taintflow")]
#[command(about = "LLM-assisted static taint analysis for Python projects", long_about = None)]
#[command(version)]
struct Cli {
    /// Root of the Python source tree under analysis
    #[arg(long)]
    project_root: PathBuf,

    /// Name under which artifacts are laid out below the output root
    #[arg(long)]
    project_name: String,

    /// Pre-built CodeQL database for the project
    #[arg(long)]
    db: PathBuf,

    /// Query pack directory the predicate files are copied into
    #[arg(long)]
    query_pack: PathBuf,

    /// Weakness identifier (cwe78, cwe79, cwe89, cwe94)
    #[arg(long)]
    cwe: String,

    /// Model identifier (deepseek-chat, deepseek-reasoner)
    #[arg(long)]
    model: String,

    /// Root under which projects/<name>/... is materialized
    #[arg(long, default_value = ".")]
    output_root: PathBuf,

    /// Prior run directory whose artifacts are copied in before gating
    #[arg(long)]
    resume_from: Option<PathBuf>,

    /// Maximum line distance between adjacent step locations in one block
    #[arg(long, default_value_t = DEFAULT_GAP_LIMIT)]
    gap_limit: usize,

    /// Context lines read above and below a flow location
    #[arg(long, default_value_t = DEFAULT_CONTEXT_LINES)]
    context_lines: usize,

    /// Retries for LLM transport and parse failures
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// In-flight request cap for specification prompts
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_REQUESTS)]
    max_concurrent_requests: usize,

    /// Rerun the specification stage even when its outputs exist
    #[arg(long)]
    rerun_usage_prompting: bool,

    /// Rerun the triage stage even when its outputs exist
    #[arg(long)]
    rerun_triage_prompting: bool,

    /// Return immediately after the specification stage
    #[arg(long)]
    stop_after_usage_prompting: bool,

    /// Skip all external calls and only report the plan
    #[arg(long)]
    simulate_runs: bool,

    /// Invoke the structural analyzer's DB-create command when the database
    /// is absent
    #[arg(long)]
    create_missing_dbs: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let weakness: Weakness = cli
        .cwe
        .parse()
        .with_context(|| format!("invalid --cwe value '{}'", cli.cwe))?;

    let provider = LlmProviderFactory::create(&cli.model, cli.retries)
        .context("failed to configure the LLM provider")?;

    let config = PipelineConfig {
        project_root: cli.project_root,
        project_name: cli.project_name.clone(),
        db_path: cli.db,
        query_pack_dir: cli.query_pack,
        weakness,
        model: cli.model,
        output_root: cli.output_root,
        resume_from: cli.resume_from,
        gap_limit: cli.gap_limit,
        context_lines: cli.context_lines,
        max_retries: cli.retries,
        max_concurrent_requests: cli.max_concurrent_requests,
        rerun_usage_prompting: cli.rerun_usage_prompting,
        rerun_triage_prompting: cli.rerun_triage_prompting,
        stop_after_usage_prompting: cli.stop_after_usage_prompting,
        simulate_runs: cli.simulate_runs,
        create_missing_dbs: cli.create_missing_dbs,
    };

    let orchestrator = Orchestrator::new(config, provider);
    orchestrator
        .run()
        .await
        .with_context(|| format!("pipeline failed for project {}", cli.project_name))?;

    println!(
        "{} pipeline finished for {}",
        "✓".green(),
        cli.project_name.bold()
    );
    Ok(())
}
