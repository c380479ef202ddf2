//! Bounded multi-source BFS over the caller -> callee relation.
//!
//! The relation is never materialized: every expansion is a store round-trip
//! through [`CalleeExpander`]. Sources are searched one after another; the
//! callee cache and the explored-node counter are shared across them, the
//! visited set and the query counter are per source.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::graph::{FunctionIdentity, GraphStore};
use crate::trace::expander::{CalleeExpander, Expansion};

pub const DEFAULT_MAX_NODES_EXPLORED: usize = 5000;
pub const DEFAULT_MAX_QUERIES_PER_SOURCE: usize = 1000;

/// Cancellation is polled when the explored-node count is a multiple of this.
const CANCEL_CHECK_INTERVAL: usize = 100;

/// Exploration budget for one trace request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBudget {
    /// Nodes popped and explored, summed over all sources.
    pub max_nodes_explored: usize,
    /// Callee queries issued while searching from a single source.
    pub max_queries_per_source: usize,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_nodes_explored: DEFAULT_MAX_NODES_EXPLORED,
            max_queries_per_source: DEFAULT_MAX_QUERIES_PER_SOURCE,
        }
    }
}

/// Path-shape limits for one trace request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLimits {
    pub max_paths: usize,
    pub max_depth: usize,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// Every reachable node within depth was explored, or `max_paths` was reached.
    Completed,
    /// The node or per-source query budget stopped the search.
    LimitReached,
    /// The caller cancelled; results are partial.
    Cancelled,
}

/// A call chain from a source (first) to a target (last).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPath {
    pub hops: Vec<FunctionIdentity>,
}

impl CallPath {
    /// Number of call edges.
    pub fn depth(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }

    pub fn source(&self) -> Option<&FunctionIdentity> {
        self.hops.first()
    }

    pub fn target(&self) -> Option<&FunctionIdentity> {
        self.hops.last()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hops.iter().map(|f| f.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceResult {
    pub paths: Vec<CallPath>,
    pub nodes_explored: usize,
    pub queries_issued: usize,
    /// Expansions whose store query failed and were treated as leaves.
    #[serde(default)]
    pub degraded_expansions: usize,
    pub status: SearchStatus,
}

impl TraceResult {
    pub fn limit_reached(&self) -> bool {
        self.status == SearchStatus::LimitReached
    }

    pub fn cancelled(&self) -> bool {
        self.status == SearchStatus::Cancelled
    }

    /// True when some part of the graph could not be expanded.
    pub fn degraded(&self) -> bool {
        self.degraded_expansions > 0
    }
}

/// Arena slot: the path to a node is rebuilt by walking `parent` links.
struct Visit {
    function: FunctionIdentity,
    parent: Option<usize>,
    depth: usize,
}

fn rebuild_path(arena: &[Visit], mut index: usize) -> CallPath {
    let mut hops = Vec::with_capacity(arena[index].depth + 1);
    loop {
        hops.push(arena[index].function.clone());
        match arena[index].parent {
            Some(parent) => index = parent,
            None => break,
        }
    }
    hops.reverse();
    CallPath { hops }
}

/// Finds shortest call chains from `sources` to any function whose name is in
/// `target_names`.
///
/// Paths come back in source order, then discovery order; per source the
/// first path found is of minimal hop count. A source named like a target
/// never counts as a zero-hop path.
pub async fn trace(
    store: &dyn GraphStore,
    sources: &[FunctionIdentity],
    target_names: &HashSet<String>,
    limits: PathLimits,
    budget: SearchBudget,
    cancel: &CancellationToken,
) -> TraceResult {
    let mut expander = CalleeExpander::new(store);
    let mut paths: Vec<CallPath> = Vec::new();
    let mut nodes_explored = 0usize;
    let mut degraded_expansions = 0usize;
    let mut status = SearchStatus::Completed;

    'sources: for source in sources {
        if paths.len() >= limits.max_paths {
            break;
        }
        if cancel.is_cancelled() {
            status = SearchStatus::Cancelled;
            break;
        }

        debug!(source = %source.name, file = %source.file_path, "tracing from source");

        let mut arena = vec![Visit {
            function: source.clone(),
            parent: None,
            depth: 0,
        }];
        let mut queue: VecDeque<usize> = VecDeque::from([0]);
        let mut visited: HashSet<String> = HashSet::new();
        let queries_before = expander.queries_issued();

        while !queue.is_empty() && paths.len() < limits.max_paths {
            let queries_this_source = expander.queries_issued() - queries_before;
            if nodes_explored >= budget.max_nodes_explored
                || queries_this_source >= budget.max_queries_per_source
            {
                info!(
                    nodes_explored,
                    queries_this_source, "search budget exhausted, stopping trace"
                );
                status = SearchStatus::LimitReached;
                break 'sources;
            }

            if nodes_explored % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                status = SearchStatus::Cancelled;
                break 'sources;
            }

            let Some(index) = queue.pop_front() else {
                break;
            };

            if arena[index].depth > limits.max_depth {
                continue;
            }
            if !visited.insert(arena[index].function.name.clone()) {
                continue;
            }
            nodes_explored += 1;

            if arena[index].depth > 0 && target_names.contains(&arena[index].function.name) {
                let path = rebuild_path(&arena, index);
                debug!(depth = path.depth(), "call path found");
                paths.push(path);
                continue;
            }

            // children would exceed max_depth
            if arena[index].depth >= limits.max_depth {
                continue;
            }

            let name = arena[index].function.name.clone();
            let depth = arena[index].depth;
            let expansion = expander.callees_of(&name).await;
            if expansion == Expansion::Degraded {
                degraded_expansions += 1;
            }

            for callee in expansion.callees() {
                if visited.contains(&callee.name) {
                    continue;
                }
                arena.push(Visit {
                    function: callee.clone(),
                    parent: Some(index),
                    depth: depth + 1,
                });
                queue.push_back(arena.len() - 1);
            }
        }
    }

    if status == SearchStatus::Cancelled {
        info!(found = paths.len(), nodes_explored, "trace cancelled");
    }

    TraceResult {
        paths,
        nodes_explored,
        queries_issued: expander.queries_issued(),
        degraded_expansions,
        status,
    }
}
