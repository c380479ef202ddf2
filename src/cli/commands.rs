use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use code_tracer::error::{Result, TracerError};
use code_tracer::graph::GraphStore;
use code_tracer::trace::{
    SearchBudget, TraceRequest, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES_EXPLORED, DEFAULT_MAX_PATHS,
    DEFAULT_MAX_QUERIES_PER_SOURCE,
};
use code_tracer::{HttpGraphStore, HttpStoreConfig, SqliteGraphStore};

#[derive(Parser)]
#[command(name = "code-tracer")]
#[command(about = "Call-path tracing and call-graph inspection over an indexed code graph")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Trace from auto-detected entry points to a function
    code-tracer trace saveToDb

    # Trace from an explicit source, restricted to a directory
    code-tracer trace saveToDb --source main --path-pattern "internal/"

    # Direct callers and callees of a function
    code-tracer call-graph handleRequest

    # Query a remote graph service instead of a local database
    code-tracer --endpoint http://localhost:8080 --project demo trace Run

    # Start MCP server
    code-tracer serve
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the graph database
    #[arg(long, default_value = ".code-graph.db")]
    pub db: PathBuf,

    /// Base URL of a remote graph query service (used instead of --db)
    #[arg(long, requires = "project")]
    pub endpoint: Option<String>,

    /// Project id on the remote graph query service
    #[arg(long)]
    pub project: Option<String>,

    /// HTTP timeout for remote store queries, in seconds
    #[arg(long, default_value = "90")]
    pub timeout_secs: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find shortest call paths to a function
    Trace {
        /// Target function name (`Method` also matches `Type.Method`)
        target: String,

        /// Start function; entry points are auto-detected when omitted
        #[arg(long)]
        source: Option<String>,

        /// Regex over file paths applied to every lookup
        #[arg(long)]
        path_pattern: Option<String>,

        /// Maximum number of paths to report
        #[arg(long, default_value_t = DEFAULT_MAX_PATHS)]
        max_paths: usize,

        /// Maximum number of call hops per path
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Maximum nodes explored across all sources
        #[arg(long, default_value_t = DEFAULT_MAX_NODES_EXPLORED)]
        max_nodes: usize,

        /// Maximum callee queries per source
        #[arg(long, default_value_t = DEFAULT_MAX_QUERIES_PER_SOURCE)]
        max_queries_per_source: usize,

        /// Cancel the search after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show direct callers and callees of a function
    CallGraph {
        /// Function name
        function: String,
    },

    /// Find functions by name
    Find {
        /// Function name (`Method` also matches `Type.Method`)
        name: String,

        /// Regex over file paths
        #[arg(long)]
        path_pattern: Option<String>,
    },

    /// List auto-detected entry points
    EntryPoints {
        /// Regex over file paths
        #[arg(long)]
        path_pattern: Option<String>,
    },

    /// Start MCP server
    Serve,
}

/// Opens the remote store when `--endpoint` is given, the SQLite file otherwise.
pub fn open_store(cli: &Cli) -> Result<Arc<dyn GraphStore>> {
    match (&cli.endpoint, &cli.project) {
        (Some(endpoint), Some(project)) => {
            let config = HttpStoreConfig::new(endpoint.clone(), project.clone())
                .with_timeout(Duration::from_secs(cli.timeout_secs));
            info!(endpoint = %endpoint, project = %project, "using remote graph store");
            Ok(Arc::new(HttpGraphStore::new(config)?))
        }
        (Some(_), None) => Err(TracerError::InvalidRequest(
            "--endpoint requires --project".to_string(),
        )),
        _ => {
            info!(db = %cli.db.display(), "using sqlite graph store");
            Ok(Arc::new(SqliteGraphStore::open(&cli.db)?))
        }
    }
}

/// Cancels `token` once `deadline` has elapsed.
pub fn cancel_after(token: &CancellationToken, deadline: Option<Duration>) {
    if let Some(deadline) = deadline {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            token.cancel();
        });
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn trace_path(
    store: Arc<dyn GraphStore>,
    target: String,
    source: Option<String>,
    path_pattern: Option<String>,
    max_paths: usize,
    max_depth: usize,
    budget: SearchBudget,
    deadline: Option<Duration>,
    format: &str,
) -> Result<()> {
    let mut request = TraceRequest::new(target)
        .with_max_paths(max_paths)
        .with_max_depth(max_depth)
        .with_budget(budget);
    request.source = source;
    request.path_pattern = path_pattern;

    let cancel = CancellationToken::new();
    cancel_after(&cancel, deadline);

    let outcome = code_tracer::trace_path(store.as_ref(), request, &cancel).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).unwrap_or_default()
        );
    } else {
        println!("{}", outcome.render());
    }

    Ok(())
}

pub async fn call_graph(store: Arc<dyn GraphStore>, function: &str) -> Result<()> {
    let outcome = code_tracer::call_graph(store.as_ref(), function).await?;
    println!("{}", outcome.render());
    Ok(())
}

pub async fn find_function(
    store: Arc<dyn GraphStore>,
    name: &str,
    path_pattern: Option<&str>,
) -> Result<()> {
    let functions = code_tracer::resolve_function(store.as_ref(), name, path_pattern).await?;

    if functions.is_empty() {
        println!("Function '{}' not found.", name);
        return Ok(());
    }

    for function in functions {
        println!("{} - {}:{}", function.name, function.file_path, function.line);
    }

    Ok(())
}

pub async fn list_entry_points(
    store: Arc<dyn GraphStore>,
    path_pattern: Option<&str>,
) -> Result<()> {
    let entries = code_tracer::detect_entry_points(store.as_ref(), path_pattern).await;

    if entries.is_empty() {
        println!("No entry points found.");
        return Ok(());
    }

    for entry in entries {
        println!("{} - {}:{}", entry.name, entry.file_path, entry.line);
    }

    Ok(())
}

pub async fn run_mcp_server(store: Arc<dyn GraphStore>) -> Result<()> {
    use crate::mcp::McpServer;
    use rmcp::ServiceExt;

    let server = McpServer::new(store);

    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let running = server
        .serve(transport)
        .await
        .map_err(|e| TracerError::Mcp(e.to_string()))?;
    running
        .waiting()
        .await
        .map_err(|e| TracerError::Mcp(e.to_string()))?;

    Ok(())
}
