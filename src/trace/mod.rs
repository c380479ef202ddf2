pub mod entry_points;
pub mod expander;
pub mod report;
pub mod resolver;
pub mod tracer;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::graph::{FunctionIdentity, GraphStore};

pub use entry_points::{
    default_conventions, detect_entry_points, EntryConvention, EntryPointDetector,
    TEST_FILE_PATTERN,
};
pub use expander::{CalleeExpander, Expansion};
pub use report::{describe_sources, format_paths};
pub use resolver::resolve_function;
pub use tracer::{
    trace, CallPath, PathLimits, SearchBudget, SearchStatus, TraceResult,
    DEFAULT_MAX_NODES_EXPLORED, DEFAULT_MAX_QUERIES_PER_SOURCE,
};

pub const DEFAULT_MAX_PATHS: usize = 3;
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Arguments of one `trace_path` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRequest {
    pub target: String,
    /// Explicit start function; entry points are auto-detected when unset.
    pub source: Option<String>,
    /// Regex over file paths applied to every name lookup.
    pub path_pattern: Option<String>,
    pub max_paths: usize,
    pub max_depth: usize,
    pub budget: SearchBudget,
}

impl TraceRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: None,
            path_pattern: None,
            max_paths: DEFAULT_MAX_PATHS,
            max_depth: DEFAULT_MAX_DEPTH,
            budget: SearchBudget::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.path_pattern = Some(pattern.into());
        self
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Trims names, drops empty optionals and replaces zero knobs with defaults.
    pub fn normalized(mut self) -> Self {
        self.target = self.target.trim().to_string();
        self.source = self
            .source
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.path_pattern = self.path_pattern.filter(|p| !p.is_empty());
        if self.max_paths == 0 {
            self.max_paths = DEFAULT_MAX_PATHS;
        }
        if self.max_depth == 0 {
            self.max_depth = DEFAULT_MAX_DEPTH;
        }
        let defaults = SearchBudget::default();
        if self.budget.max_nodes_explored == 0 {
            self.budget.max_nodes_explored = defaults.max_nodes_explored;
        }
        if self.budget.max_queries_per_source == 0 {
            self.budget.max_queries_per_source = defaults.max_queries_per_source;
        }
        self
    }

    pub fn limits(&self) -> PathLimits {
        PathLimits {
            max_paths: self.max_paths,
            max_depth: self.max_depth,
        }
    }
}

/// How a finished search should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathVerdict {
    Found,
    /// The whole reachable region within depth was searched without a hit.
    Unreachable,
    /// A budget stopped the search before any hit; a path may still exist.
    BudgetExhausted,
    /// Some store lookups failed, so part of the region was never expanded.
    Degraded,
    Cancelled,
}

/// A search that ran: resolved endpoints plus what the tracer found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    pub target: String,
    pub sources: Vec<FunctionIdentity>,
    pub auto_detected: bool,
    pub max_paths: usize,
    pub max_depth: usize,
    pub result: TraceResult,
}

impl TraceReport {
    pub fn paths(&self) -> &[CallPath] {
        &self.result.paths
    }

    pub fn verdict(&self) -> PathVerdict {
        match self.result.status {
            SearchStatus::Cancelled => PathVerdict::Cancelled,
            _ if !self.result.paths.is_empty() => PathVerdict::Found,
            SearchStatus::LimitReached => PathVerdict::BudgetExhausted,
            SearchStatus::Completed if self.result.degraded() => PathVerdict::Degraded,
            SearchStatus::Completed => PathVerdict::Unreachable,
        }
    }
}

/// Outcome of `trace_path`. Only store failures during resolution are `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TraceOutcome {
    Invalid { message: String },
    NoEntryPoints,
    SourceNotFound { name: String },
    TargetNotFound { name: String },
    Traced(TraceReport),
}

impl TraceOutcome {
    /// True for outcomes the caller must fix before retrying.
    pub fn is_error(&self) -> bool {
        matches!(self, TraceOutcome::Invalid { .. })
    }

    pub fn report(&self) -> Option<&TraceReport> {
        match self {
            TraceOutcome::Traced(report) => Some(report),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        report::render_outcome(self)
    }
}

/// Traces call paths from `request.source` (or detected entry points) to
/// `request.target`.
pub async fn trace_path(
    store: &dyn GraphStore,
    request: TraceRequest,
    cancel: &CancellationToken,
) -> Result<TraceOutcome> {
    let request = request.normalized();
    if request.target.is_empty() {
        return Ok(TraceOutcome::Invalid {
            message: "'target' function name is required".to_string(),
        });
    }
    let path_pattern = request.path_pattern.as_deref();

    let (sources, auto_detected) = match request.source.as_deref() {
        None => {
            let entries = detect_entry_points(store, path_pattern).await;
            if entries.is_empty() {
                return Ok(TraceOutcome::NoEntryPoints);
            }
            (entries, true)
        }
        Some(source) => {
            let found = resolve_function(store, source, path_pattern).await?;
            if found.is_empty() {
                return Ok(TraceOutcome::SourceNotFound {
                    name: source.to_string(),
                });
            }
            (found, false)
        }
    };

    let targets = resolve_function(store, &request.target, path_pattern).await?;
    if targets.is_empty() {
        return Ok(TraceOutcome::TargetNotFound {
            name: request.target.clone(),
        });
    }
    let target_names: HashSet<String> = targets.into_iter().map(|t| t.name).collect();

    info!(
        target = %request.target,
        sources = sources.len(),
        auto_detected,
        max_depth = request.max_depth,
        "starting call path trace"
    );

    let result = trace(
        store,
        &sources,
        &target_names,
        request.limits(),
        request.budget,
        cancel,
    )
    .await;

    Ok(TraceOutcome::Traced(TraceReport {
        target: request.target,
        sources,
        auto_detected,
        max_paths: request.max_paths,
        max_depth: request.max_depth,
        result,
    }))
}
