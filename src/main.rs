use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vellum_batch::{BatchInput, BatchRunner, BatchUnit};
use vellum_core::config::AppConfig;
use vellum_core::types::Workflow;
use vellum_core::vars::VariableStore;
use vellum_llm::{GeminiClient, HttpFetcher, DEFAULT_MODELS_URL};
use vellum_workflow::WorkflowExecutor;

#[derive(Parser)]
#[command(
    name = "vellum",
    version,
    about = "Configuration-driven document generation against the Gemini API"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "vellum.toml")]
    config: PathBuf,

    /// Raise log verbosity to debug
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file and print the run report
    Run {
        /// Workflow TOML file
        #[arg(long, value_name = "FILE")]
        workflow: PathBuf,

        /// Seed variable as NAME=VALUE (repeatable), e.g. --var jd_link=https://…
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
    },
    /// Run independent prompts concurrently and print per-unit results
    Batch {
        /// Batch input TOML file ([[units]] with prompt and files)
        #[arg(long, value_name = "FILE", conflicts_with = "prompt")]
        input: Option<PathBuf>,

        /// Single prompt to send (use with --files)
        #[arg(long)]
        prompt: Option<String>,

        /// Paths to attach to the single prompt
        #[arg(long, value_name = "PATH", num_args = 0.., requires = "prompt")]
        files: Vec<PathBuf>,

        /// Maximum concurrent requests (overrides config)
        #[arg(long, value_name = "N")]
        max_workers: Option<usize>,
    },
    /// List available models
    Models,
    /// Show current configuration (API key redacted)
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "vellum=debug,info"
    } else {
        "vellum=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Run { workflow, vars } => run_workflow(&config, &workflow, &vars).await,
        Commands::Batch {
            input,
            prompt,
            files,
            max_workers,
        } => run_batch(&config, input, prompt, files, max_workers).await,
        Commands::Models => list_models(&config).await,
        Commands::Config => show_config(&config),
    }
}

async fn run_workflow(config: &AppConfig, path: &PathBuf, vars: &[String]) -> anyhow::Result<()> {
    let workflow =
        Workflow::load(path).with_context(|| format!("load workflow from {}", path.display()))?;

    let api_key = config.require_api_key()?;
    let client = Arc::new(GeminiClient::new(api_key));
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(config.llm.timeout_secs)));

    let initial = seed_variables(vars)?;
    let executor = WorkflowExecutor::new(client, fetcher, config.clone());
    let report = executor.execute(&workflow, initial).await?;

    print!("{}", report.render());

    if report.succeeded {
        Ok(())
    } else {
        let failed = report
            .failed_step()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        Err(anyhow::anyhow!("workflow halted at step '{failed}'"))
    }
}

async fn run_batch(
    config: &AppConfig,
    input: Option<PathBuf>,
    prompt: Option<String>,
    files: Vec<PathBuf>,
    max_workers: Option<usize>,
) -> anyhow::Result<()> {
    let units = match (input, prompt) {
        (Some(path), _) => {
            BatchInput::load(&path)
                .with_context(|| format!("load batch input from {}", path.display()))?
                .units
        }
        (None, Some(prompt)) => vec![BatchUnit { prompt, files }],
        (None, None) => {
            return Err(anyhow::anyhow!("one of --input or --prompt is required"));
        }
    };

    let api_key = config.require_api_key()?;
    let client = Arc::new(GeminiClient::new(api_key));

    let mut batch_config = config.batch.clone();
    if let Some(max_workers) = max_workers {
        batch_config.max_workers = max_workers;
    }

    let runner = BatchRunner::new(client, config.llm.clone(), batch_config);
    let report = runner.run(units).await;

    print!("{}", report.render());

    if report.succeeded() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("batch completed with failures"))
    }
}

async fn list_models(config: &AppConfig) -> anyhow::Result<()> {
    let api_key = config.require_api_key()?;
    let client = GeminiClient::new(api_key);
    let models = client.list_models(DEFAULT_MODELS_URL).await?;
    for model in models {
        println!("{model}");
    }
    Ok(())
}

fn show_config(config: &AppConfig) -> anyhow::Result<()> {
    let mut redacted = config.clone();
    if redacted.llm.api_key.is_some() {
        redacted.llm.api_key = Some("[redacted]".to_string());
    }
    println!("{}", toml::to_string_pretty(&redacted)?);
    Ok(())
}

/// Parse repeated `--var NAME=VALUE` pairs into an initial store.
fn seed_variables(pairs: &[String]) -> anyhow::Result<VariableStore> {
    let mut store = VariableStore::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("--var expects NAME=VALUE, got '{pair}'"))?;
        store
            .insert(name, serde_json::Value::String(value.to_string()))
            .with_context(|| format!("seed variable '{name}'"))?;
    }
    Ok(store)
}
