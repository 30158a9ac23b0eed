//! Command-line interface for tandem
//!
//! Two commands over the same pipeline: `run` renders the event stream
//! on a terminal as it arrives, `batch` executes without incremental
//! delivery and prints one aggregate JSON record per prompt.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    ChatTurn, Config, EngineError, EventSink, ExitCode, GenerateRequest, Orchestrator,
    ResponseCache, StreamEvent,
};

/// tandem - dual-provider generation pipeline
#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Classify a prompt, generate two drafts in parallel, synthesize one answer")]
#[command(long_about = r#"
tandem routes a prompt through an intent classifier (FACTUAL or CREATIVE),
fans it out to two generative providers in parallel, then synthesizes the
two drafts into a single final answer. When one provider fails, the
surviving draft is refined instead; the request only fails outright when
both providers fail.

EXAMPLES:
  # Stream a response to the terminal
  tandem run "Explain TCP congestion control"

  # Apply a hard constraint and prior conversation context
  tandem run "Continue the story" --constraint "under 200 words" --history chat.json

  # Show the raw event stream as JSON lines
  tandem run "Write a poem about the sea" --events

  # Batch mode: one aggregate JSON record per prompt, repeated calls cached
  tandem batch "Explain TCP" "Explain UDP"

CONFIGURATION:
  Configuration is discovered by searching upward from CWD for .tandem/config.toml
  Use --config to specify an explicit config file path
  API keys are read from environment variables (OPENAI_API_KEY, GEMINI_API_KEY
  by default; override with api_key_env in the [llm.*] sections)
"#)]
#[command(version)]
struct Cli {
    /// Explicit config file path (skips discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one request, streaming output as it is produced
    Run {
        /// The user prompt
        prompt: String,

        /// Hard constraint the final answer must satisfy
        #[arg(long)]
        constraint: Option<String>,

        /// JSON file with prior conversation turns ([{"role","content"}])
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print raw events as JSON lines instead of rendered output
        #[arg(long)]
        events: bool,
    },

    /// Run requests without streaming; print one JSON record per prompt
    Batch {
        /// One or more prompts
        #[arg(required = true)]
        prompts: Vec<String>,

        /// Hard constraint applied to every prompt
        #[arg(long)]
        constraint: Option<String>,

        /// JSON file with prior conversation turns ([{"role","content"}])
        #[arg(long)]
        history: Option<PathBuf>,
    },
}

/// CLI entrypoint. Handles all output including errors.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    // A second subscriber registration (embedding, tests) is harmless
    let _ = tandem_utils::logging::init_tracing(cli.verbose);

    match run_inner(cli) {
        Ok(code) => {
            if code == ExitCode::SUCCESS {
                Ok(())
            } else {
                Err(code)
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            Err(exit_code_for(&err))
        }
    }
}

/// Map an error chain to an exit code; configuration and usage problems
/// are distinguished from internal failures.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(engine_err) = err.downcast_ref::<EngineError>() {
        return engine_err.to_exit_code();
    }
    if err.downcast_ref::<tandem_utils::error::ConfigError>().is_some() {
        return ExitCode::CLI_ARGS;
    }
    ExitCode::INTERNAL
}

fn run_inner(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    };

    let orchestrator = Orchestrator::from_config(&config)
        .context("failed to construct provider backends")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Command::Run {
            prompt,
            constraint,
            history,
            events,
        } => {
            let request = build_request(prompt, constraint, history.as_deref())?;
            runtime.block_on(run_streaming(orchestrator, request, events))
        }
        Command::Batch {
            prompts,
            constraint,
            history,
        } => {
            let history = history
                .as_deref()
                .map(load_history)
                .transpose()?
                .unwrap_or_default();
            runtime.block_on(run_batch(orchestrator, prompts, constraint, history))
        }
    }
}

fn build_request(
    prompt: String,
    constraint: Option<String>,
    history: Option<&std::path::Path>,
) -> Result<GenerateRequest> {
    let mut request = GenerateRequest::new(prompt);
    if let Some(constraint) = constraint {
        request = request.with_constraint(constraint);
    }
    if let Some(path) = history {
        request = request.with_history(load_history(path)?);
    }
    Ok(request)
}

fn load_history(path: &std::path::Path) -> Result<Vec<ChatTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse history file {}", path.display()))
}

async fn run_streaming(
    orchestrator: Orchestrator,
    request: GenerateRequest,
    raw_events: bool,
) -> Result<ExitCode> {
    let (sink, mut events) = EventSink::channel();

    let pipeline = tokio::spawn(async move {
        let result = orchestrator.run_streaming(&request, &sink).await;
        // Sink drops here, closing the event stream
        result
    });

    let mut saw_error = false;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        if raw_events {
            println!("{}", serde_json::to_string(&event)?);
            if matches!(event, StreamEvent::Error { .. }) {
                saw_error = true;
            }
            continue;
        }

        match event {
            StreamEvent::Status { message } => eprintln!("· {message}"),
            StreamEvent::InitialData {
                pipeline_name,
                classifier_reasoning,
            } => {
                eprintln!("· pipeline: {pipeline_name}");
                if !classifier_reasoning.is_empty() {
                    eprintln!("· reasoning: {classifier_reasoning}");
                }
            }
            // Draft chunks stay off the terminal; the synthesis is the answer
            StreamEvent::ProviderAChunk { .. } | StreamEvent::ProviderBChunk { .. } => {}
            StreamEvent::FallbackLog { log } => eprintln!("! {log}"),
            StreamEvent::SynthesisChunk { text } => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            StreamEvent::Done { message } => {
                writeln!(stdout)?;
                eprintln!("· {message}");
            }
            StreamEvent::Error { message } => {
                eprintln!("error: {message}");
                saw_error = true;
            }
        }
    }

    // Surface EmptyPrompt and any join failure
    pipeline
        .await
        .context("pipeline task panicked")??;

    Ok(if saw_error {
        ExitCode::INTERNAL
    } else {
        ExitCode::SUCCESS
    })
}

async fn run_batch(
    orchestrator: Orchestrator,
    prompts: Vec<String>,
    constraint: Option<String>,
    history: Vec<ChatTurn>,
) -> Result<ExitCode> {
    let cache = Arc::new(ResponseCache::new());

    for prompt in prompts {
        let mut request = GenerateRequest::new(prompt).with_history(history.clone());
        if let Some(constraint) = &constraint {
            request = request.with_constraint(constraint.clone());
        }

        let outcome = orchestrator.run_batch(&request, Some(&cache)).await?;
        println!("{}", serde_json::to_string(&outcome)?);
    }

    Ok(ExitCode::SUCCESS)
}
