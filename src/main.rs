/// flowsync command line
///
/// `serve` (the default) runs the relay server. The other commands are
/// one-shot operations against the remote automation server and the local
/// workflows directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowsync::{
    config::Config,
    remote::{HttpRemoteStore, RemoteStore},
    server::{build_engine, init_tracing, start_server},
    workflow::is_valid_workflow_id,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flowsync", version, about = "Sync automation workflows between the server, local files and live editors")]
struct Cli {
    /// Directory holding workflow_<id>.json snapshots
    #[arg(long, global = true, env = "FLOWSYNC_WORKFLOWS_DIR")]
    workflows_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server (REST, WebSocket, file watcher, poller)
    Serve {
        #[arg(long, env = "FLOWSYNC_PORT")]
        port: Option<u16>,
    },
    /// Download a workflow from the server into its local file
    Sync {
        #[arg(short, long)]
        id: Option<String>,
    },
    /// Upload a local workflow file to the server
    Push {
        #[arg(short, long)]
        id: Option<String>,
        /// File to upload instead of the workflow's snapshot
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// List all workflows on the server
    List,
    Activate {
        #[arg(short, long)]
        id: Option<String>,
    },
    Deactivate {
        #[arg(short, long)]
        id: Option<String>,
    },
    /// Execute a workflow on the server
    Execute {
        #[arg(short, long)]
        id: Option<String>,
        /// Input data as a JSON string
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::default();
    if let Some(dir) = cli.workflows_dir {
        config.sync.workflows_dir = dir;
    }

    let command = match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            return start_server(config).await;
        }
        command => command,
    };

    let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::from_config(&config.remote));
    let engine = build_engine(&config, remote);

    match command {
        // Served above
        Command::Serve { .. } => {}
        Command::Sync { id } => {
            let id = workflow_id(&config, id)?;
            let report = engine.pull(&id).await?;
            println!(
                "Workflow {} synced to: {}",
                report.workflow_id,
                engine.snapshots().path_for(&id).display()
            );
        }
        Command::Push { id, file } => {
            let id = workflow_id(&config, id)?;
            match file {
                Some(path) => {
                    let workflow = engine
                        .snapshots()
                        .read_path(&path)
                        .await
                        .with_context(|| format!("Failed to load {}", path.display()))?;
                    engine.upload(&id, &workflow).await?;
                }
                None => {
                    engine.push(&id).await?;
                }
            }
            println!("Workflow {} pushed to the server", id);
        }
        Command::List => {
            let workflows = engine.list().await?;
            let local = engine.snapshots().list_ids().await?;
            println!("Available workflows:");
            for workflow in workflows {
                let state = if workflow.active { "active" } else { "inactive" };
                let marker = if local.contains(&workflow.id) { " [local]" } else { "" };
                println!("- {}: {} ({}){}", workflow.id, workflow.name, state, marker);
            }
        }
        Command::Activate { id } => {
            let id = workflow_id(&config, id)?;
            engine.activate(&id).await?;
            println!("Workflow {} activated", id);
        }
        Command::Deactivate { id } => {
            let id = workflow_id(&config, id)?;
            engine.deactivate(&id).await?;
            println!("Workflow {} deactivated", id);
        }
        Command::Execute { id, data } => {
            let id = workflow_id(&config, id)?;
            let input = match data {
                Some(raw) => serde_json::from_str(&raw).context("--data must be valid JSON")?,
                None => serde_json::json!({}),
            };
            let result = engine.execute(&id, &input).await?;
            println!("Execution result: {}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

/// `--id`, falling back to N8N_WORKFLOW_ID
fn workflow_id(config: &Config, id: Option<String>) -> Result<String> {
    let id = id
        .or_else(|| config.remote.default_workflow_id.clone())
        .context("no workflow id given; pass --id or set N8N_WORKFLOW_ID")?;
    if !is_valid_workflow_id(&id) {
        anyhow::bail!("invalid workflow id {:?}", id);
    }
    Ok(id)
}
