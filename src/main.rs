use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conductor::agent::AgentType;
use conductor::config::Config;
use conductor::orchestration::{OrchestrateOptions, Orchestrator, SchedulerEvent};
use conductor::Result;

/// Conductor - routes natural-language commands to specialized agents
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CONDUCTOR_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG              Override the log filter")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.conductor/conductor.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Orchestrate a command and print the result as JSON
    Run {
        /// The command in natural language
        command: String,

        #[arg(long)]
        user_id: Option<String>,

        #[arg(long)]
        project_id: Option<String>,

        /// Maximum tasks in flight per batch (default: unbounded)
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Per-task timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Retries after the first failed attempt
        #[arg(long)]
        max_retries: Option<u32>,

        /// Skip the planner and use the heuristic task graph
        #[arg(long)]
        no_planning: bool,

        /// Restrict selection to these agent types (comma separated)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<AgentType>,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },

    /// List the agent catalog
    Agents,

    /// Write the default config to ~/.conductor/conductor.toml if missing
    Init,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    conductor::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Run {
            command,
            user_id,
            project_id,
            max_concurrency,
            timeout_ms,
            max_retries,
            no_planning,
            agents,
            pretty,
        } => {
            let mut options = OrchestrateOptions {
                user_id,
                project_id,
                max_concurrency,
                timeout: timeout_ms.map(Duration::from_millis),
                max_retries,
                ..Default::default()
            };
            if no_planning {
                options.use_planning = Some(false);
            }
            if !agents.is_empty() {
                options.available_agents = Some(agents);
            }
            run_command(command, options, pretty)
        }
        Command::Agents => run_agents(),
        Command::Init => run_init(),
    }
}

/// Orchestrate one command with Ctrl-C mapped to cancellation.
fn run_command(command: String, mut options: OrchestrateOptions, pretty: bool) -> Result<()> {
    let config = Config::load()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling orchestration");
                trigger.cancel();
            }
        });

        let (event_tx, event_rx) = mpsc::channel(64);
        let progress = tokio::spawn(report_progress(event_rx));

        options.cancellation_token = Some(cancel);
        options.events = Some(event_tx);
        let result = orchestrator.orchestrate(&command, options).await;
        let _ = progress.await;
        result
    });

    info!(success = result.success, summary = %result.summary, "Orchestration finished");
    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Print scheduler progress to stderr; stdout carries only the result.
async fn report_progress(mut events: mpsc::Receiver<SchedulerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::BatchStarted { batch, tasks } => {
                let ids: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
                eprintln!("batch {}: {}", batch, ids.join(", "));
            }
            SchedulerEvent::TaskStarted { task_id, agent_type } => {
                eprintln!("  started   {} ({})", task_id, agent_type);
            }
            SchedulerEvent::TaskRetrying { task_id, retry, error } => {
                eprintln!("  retry {}   {}: {}", retry, task_id, error);
            }
            SchedulerEvent::TaskCompleted { task_id } => {
                eprintln!("  completed {}", task_id);
            }
            SchedulerEvent::TaskFailed { task_id, error } => {
                eprintln!("  failed    {}: {}", task_id, error);
            }
            SchedulerEvent::TaskSkipped { task_id, reason } => {
                eprintln!("  skipped   {}: {}", task_id, reason);
            }
            SchedulerEvent::TaskCancelled { task_id } => {
                eprintln!("  cancelled {}", task_id);
            }
            SchedulerEvent::AllTasksComplete => {}
        }
    }
}

fn run_agents() -> Result<()> {
    for agent_type in AgentType::ALL {
        let info = agent_type.info();
        println!("{:<20} {}", agent_type.as_str(), info.name);
        println!("{:<20} {}", "", info.description);
        println!("{:<20} capabilities: {}", "", info.capabilities.join(", "));
        println!();
    }
    Ok(())
}

fn run_init() -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    Config::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
