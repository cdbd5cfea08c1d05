//! Flowline CLI — run the workflow engine and inspect executions.
//!
//! Every command opens the same SQLite execution store and output volume
//! the engine service uses, so executions can be started, inspected and
//! repaired from a shell.

use clap::{Parser, Subcommand};

use flowline_cli::commands::{self, Settings};

/// Flowline CLI — distributed workflow execution engine
#[derive(Parser)]
#[command(name = "flowline", version, about = "Flowline CLI — workflow execution engine")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "FLOWLINE_DB_PATH", default_value = "flowline.db")]
    db: String,

    /// Root of the shared output volume (falls back to NFS_PATH)
    #[arg(long, env = "FLOWLINE_OUTPUT_ROOT")]
    output_root: Option<String>,

    /// Base URL of the task service
    #[arg(long, env = "TASK_SERVICE_URL")]
    task_service_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume NDJSON envelopes ({"topic","key","payload"}) from stdin
    Serve,

    /// Manage workflow executions
    Execution {
        #[command(subcommand)]
        action: ExecutionAction,
    },

    /// Report step results
    Step {
        #[command(subcommand)]
        action: StepAction,
    },
}

#[derive(Subcommand)]
enum ExecutionAction {
    /// Start an execution from a JSON request file
    Start {
        /// Path to the execution request (plan, inputs, optional executionId)
        #[arg(long)]
        file: String,
    },
    /// Show an execution record
    Get {
        /// Execution ID
        id: String,
    },
    /// List execution IDs
    List {
        /// Only executions of this workflow name
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the recorded output of every step
    Answers {
        /// Execution ID
        id: String,
    },
    /// Show one step of an execution's plan
    Step {
        /// Execution ID
        id: String,
        /// Zero-based plan position
        index: usize,
    },
    /// Mark an execution as failed
    Fail {
        /// Execution ID
        id: String,
        /// Error reason to record
        #[arg(long, default_value = "TASK_ERROR")]
        reason: String,
    },
    /// Continue an execution whose dispatch was refused
    Resume {
        /// Execution ID
        id: String,
    },
}

#[derive(Subcommand)]
enum StepAction {
    /// Record a step's answer and advance the execution
    Complete {
        /// Execution ID
        #[arg(long)]
        execution_id: String,
        /// Step name
        #[arg(long)]
        step: String,
        /// Answer text, written to the output volume
        #[arg(long, conflicts_with = "locator")]
        answer: Option<String>,
        /// Locator of an answer already on the output volume
        #[arg(long)]
        locator: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowline_core=info,flowline_cli=info".into()),
        )
        .init();

    let settings = Settings {
        db_path: cli.db,
        output_root: cli.output_root,
        task_service_url: cli.task_service_url,
    };

    let result = match cli.command {
        Commands::Serve => {
            let engine = commands::init_engine(&settings).await;
            commands::serve::run(&engine).await
        }

        Commands::Execution { action } => {
            let engine = commands::init_engine(&settings).await;
            match action {
                ExecutionAction::Start { file } => commands::execution::start(&engine, &file).await,
                ExecutionAction::Get { id } => commands::execution::get(&engine, &id).await,
                ExecutionAction::List { name } => {
                    commands::execution::list(&engine, name.as_deref()).await
                }
                ExecutionAction::Answers { id } => commands::execution::answers(&engine, &id).await,
                ExecutionAction::Step { id, index } => {
                    commands::execution::step(&engine, &id, index).await
                }
                ExecutionAction::Fail { id, reason } => {
                    commands::execution::fail(&engine, &id, &reason).await
                }
                ExecutionAction::Resume { id } => commands::execution::resume(&engine, &id).await,
            }
        }

        Commands::Step { action } => {
            let engine = commands::init_engine(&settings).await;
            match action {
                StepAction::Complete {
                    execution_id,
                    step,
                    answer,
                    locator,
                } => {
                    commands::step::complete(
                        &engine,
                        &execution_id,
                        &step,
                        answer.as_deref(),
                        locator.as_deref(),
                    )
                    .await
                }
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
