mod cli;
mod mcp;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use code_tracer::trace::SearchBudget;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries command output and the MCP transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_tracer=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let store = cli::open_store(&cli)?;

    match cli.command {
        Commands::Trace {
            target,
            source,
            path_pattern,
            max_paths,
            max_depth,
            max_nodes,
            max_queries_per_source,
            deadline_secs,
            format,
        } => {
            let budget = SearchBudget {
                max_nodes_explored: max_nodes,
                max_queries_per_source,
            };
            cli::trace_path(
                store,
                target,
                source,
                path_pattern,
                max_paths,
                max_depth,
                budget,
                deadline_secs.map(Duration::from_secs),
                &format,
            )
            .await?;
        }
        Commands::CallGraph { function } => {
            cli::call_graph(store, &function).await?;
        }
        Commands::Find { name, path_pattern } => {
            cli::find_function(store, &name, path_pattern.as_deref()).await?;
        }
        Commands::EntryPoints { path_pattern } => {
            cli::list_entry_points(store, path_pattern.as_deref()).await?;
        }
        Commands::Serve => {
            cli::run_mcp_server(store).await?;
        }
    }

    Ok(())
}
