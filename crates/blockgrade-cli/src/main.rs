//! Blockgrade CLI
//!
//! Authoring surfaces for the grading service: submit a text file or a
//! block program, run code, and browse earlier submissions.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use blockgrade_grading::{
    ChainedTokens, CompiledBlocks, Config, EnvToken, Executor, FileToken, GradingClient,
    PistonExecutor, SourceProvider, SubmissionController, SubmissionOutcome, SubmissionRecord,
    TextSource,
};
use blockgrade_report::{
    format_score, json::JsonGenerator, present, MarkdownRenderer, TextRenderer,
};
use blockgrade_workspace::{
    BlockCompiler, HeadlessContainer, ManagedWorkspace, Size, ToolboxSpec, ViewOptions,
    WorkspaceManager,
};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Identifier of the headless container block programs are loaded into.
const HEADLESS_CONTAINER_ID: &str = "blockgrade-cli";

/// Laid-out size of the headless container.
const HEADLESS_SIZE: Size = Size::new(800, 600);

/// Blockgrade - submit programs for automated grading
///
/// Programs can be plain source files or block programs saved in the
/// visual editor's JSON form.
#[derive(Parser, Debug)]
#[command(name = "blockgrade")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: blockgrade.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the toolbox definition as JSON
    Toolbox,

    /// Compile a block program and print the generated source
    Compile {
        /// Block program in the editor's JSON serialization
        #[arg(value_name = "PROGRAM.json")]
        program: PathBuf,
    },

    /// Submit a program for grading
    #[command(group(ArgGroup::new("source").required(true).args(["file", "blocks"])))]
    Submit {
        /// Assignment to submit against
        #[arg(short, long)]
        assignment: i64,

        /// Source file to submit as text
        #[arg(short, long, value_name = "SRC")]
        file: Option<PathBuf>,

        /// Block program to compile and submit
        #[arg(short, long, value_name = "PROGRAM.json")]
        blocks: Option<PathBuf>,

        /// Language of the source file (default: from config)
        #[arg(short, long, conflicts_with = "blocks")]
        language: Option<String>,

        /// How to print the grading result
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Execute a source file and print its output
    Run {
        /// Source file to run
        #[arg(short, long, value_name = "SRC")]
        file: PathBuf,

        /// Language of the source file (default: from config)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// List earlier submissions for an assignment
    History {
        /// Assignment whose submissions to list
        #[arg(short, long)]
        assignment: i64,
    },

    /// Show one submission
    Show {
        /// Submission id
        submission_id: i64,
    },

    /// Mark a submission as the final one
    MarkFinal {
        /// Submission id
        submission_id: i64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Text,
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries generated code and reports
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Toolbox => {
            println!("{}", serde_json::to_string_pretty(ToolboxSpec::standard())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Compile { program } => {
            let workspace = open_program(&config, &program).await?;
            let code = BlockCompiler::javascript().compile(&workspace)?;
            workspace.dispose();
            print!("{code}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Submit {
            assignment,
            file,
            blocks,
            language,
            format,
        } => {
            let controller = build_controller(&config)?;
            let outcome = match (file, blocks) {
                (Some(file), _) => {
                    let source = TextSource::new(read_source(&file).await?);
                    let language = language.unwrap_or_else(|| config.language.clone());
                    submit(&controller, assignment, &source, &language).await
                }
                (None, Some(program)) => {
                    let workspace = open_program(&config, &program).await?;
                    let source = CompiledBlocks::javascript(&workspace);
                    let language = source.language_tag();
                    let outcome = submit(&controller, assignment, &source, language).await;
                    workspace.dispose();
                    outcome
                }
                (None, None) => anyhow::bail!("either --file or --blocks is required"),
            };
            print_outcome(&outcome, format)
        }
        Command::Run { file, language } => {
            let source = read_source(&file).await?;
            let language = language.unwrap_or_else(|| config.language.clone());
            let executor = PistonExecutor::new(config.executor_url.clone())?;
            let output = executor.execute(&language, &source).await?;
            for line in &output.lines {
                if output.is_error {
                    eprintln!("{line}");
                } else {
                    println!("{line}");
                }
            }
            Ok(if output.is_error {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::History { assignment } => {
            let client = build_client(&config)?;
            let records = client.history(config.enrollment_id, assignment).await?;
            if records.is_empty() {
                println!("No submissions for assignment {assignment}");
            }
            for record in &records {
                println!("{}", history_line(record));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { submission_id } => {
            let client = build_client(&config)?;
            let record = client.detail(submission_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::MarkFinal { submission_id } => {
            let client = build_client(&config)?;
            match client.mark_final(submission_id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("Marked submission {submission_id} as final"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path)?
        }
        None => Config::load()?,
    };
    Ok(config.with_env_overrides()?)
}

fn build_client(config: &Config) -> anyhow::Result<GradingClient> {
    let mut tokens = ChainedTokens::new().with(EnvToken::standard());
    if let Some(path) = &config.token_file {
        tokens = tokens.with(FileToken::new(path.clone()));
    }
    Ok(GradingClient::from_config(config, Arc::new(tokens))?)
}

fn build_controller(config: &Config) -> anyhow::Result<SubmissionController> {
    let client = build_client(config)?;
    Ok(SubmissionController::from_config(Arc::new(client), config))
}

async fn read_source(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read source file: {e}\n\nPath: {}",
            path.display()
        )
    })
}

/// Loads a block program into a fresh headless workspace.
async fn open_program(config: &Config, program: &Path) -> anyhow::Result<ManagedWorkspace> {
    let json = read_source(program).await?;
    let container = Arc::new(HeadlessContainer::new(HEADLESS_CONTAINER_ID, HEADLESS_SIZE));
    let manager = WorkspaceManager::new().with_schedule(config.resync_schedule());
    let workspace = manager.create(container, ToolboxSpec::standard(), ViewOptions::default())?;
    workspace.workspace().load_json(&json)?;
    tracing::debug!(
        blocks = workspace.workspace().block_count(),
        "Block program loaded"
    );
    Ok(workspace)
}

// ============================================================================
// Submission
// ============================================================================

/// Runs one attempt, cancelling it on Ctrl-C.
async fn submit(
    controller: &SubmissionController,
    assignment_id: i64,
    source: &dyn SourceProvider,
    language: &str,
) -> SubmissionOutcome {
    let mut events = controller.subscribe();
    let follower = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(
                sequence = event.sequence,
                assignment = event.assignment_id,
                status = %event.status,
                "Submission status"
            );
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let attempt = controller
        .submit_with_cancel(assignment_id, source, language, &cancel)
        .await;

    interrupt.abort();
    follower.abort();
    attempt.outcome
}

fn print_outcome(outcome: &SubmissionOutcome, format: Format) -> anyhow::Result<ExitCode> {
    match outcome {
        SubmissionOutcome::Succeeded(result) => {
            let model = present(result);
            match format {
                Format::Text => print!("{}", TextRenderer::new(&model).generate()),
                Format::Markdown => print!("{}", MarkdownRenderer::new(&model).generate()),
                Format::Json => JsonGenerator::new(&model).write_to(std::io::stdout(), true)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        SubmissionOutcome::Failed(failure) => {
            if format == Format::Json {
                println!("{}", serde_json::to_string_pretty(failure)?);
            } else {
                eprintln!("{}: {}", failure.title(), failure.message);
            }
            Ok(ExitCode::from(1))
        }
    }
}

fn history_line(record: &SubmissionRecord) -> String {
    let id = record
        .id
        .map_or_else(|| "-".to_string(), |id| format!("#{id}"));
    let score = record.score.map_or_else(|| "-".to_string(), format_score);
    let submitted = record
        .submitted_at()
        .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
    let marker = if record.is_final == Some(true) {
        "  (final)"
    } else {
        ""
    };
    format!("{id:>6}  {score:>6}  {submitted}{marker}")
}
