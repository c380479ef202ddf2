//! End-to-end trace behavior against an in-memory graph with fixed ordering.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use code_tracer::graph::{name_matches, FunctionIdentity, GraphStore, NameQuery, PatternQuery};
use code_tracer::trace::{trace, PathLimits, PathVerdict, SearchBudget, SearchStatus};
use code_tracer::{trace_path, TraceOutcome, TraceRequest, TracerError};

/// Graph whose callee lookups are counted per name.
struct CountingGraph {
    functions: Vec<FunctionIdentity>,
    edges: Vec<(String, String)>,
    failing: HashSet<String>,
    callee_queries: Mutex<HashMap<String, usize>>,
    /// Cancels the token once this many callee lookups were served.
    cancel_at: Option<(usize, CancellationToken)>,
}

impl CountingGraph {
    fn new() -> Self {
        Self {
            functions: Vec::new(),
            edges: Vec::new(),
            failing: HashSet::new(),
            callee_queries: Mutex::new(HashMap::new()),
            cancel_at: None,
        }
    }

    fn cancel_after_queries(mut self, queries: usize, token: &CancellationToken) -> Self {
        self.cancel_at = Some((queries, token.clone()));
        self
    }

    fn function(mut self, name: &str, file: &str, line: u32) -> Self {
        self.functions.push(FunctionIdentity::new(name, file, line));
        self
    }

    fn call(mut self, caller: &str, callee: &str) -> Self {
        self.edges.push((caller.to_string(), callee.to_string()));
        self
    }

    fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// A Go file per function, lines in declaration order.
    fn chain(names: &[&str]) -> Self {
        let mut graph = Self::new();
        for (i, name) in names.iter().enumerate() {
            graph = graph.function(name, &format!("internal/{}.go", name), i as u32 + 1);
        }
        for pair in names.windows(2) {
            graph = graph.call(pair[0], pair[1]);
        }
        graph
    }

    fn identity(&self, name: &str) -> FunctionIdentity {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .unwrap_or_else(|| FunctionIdentity::new(name, "unknown.go", 0))
    }

    fn queries_for(&self, name: &str) -> usize {
        self.callee_queries
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    fn total_queries(&self) -> usize {
        self.callee_queries.lock().unwrap().values().sum()
    }
}

fn path_allowed(file: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(pattern) => Regex::new(pattern).unwrap().is_match(file),
        None => true,
    }
}

#[async_trait]
impl GraphStore for CountingGraph {
    async fn find_by_name(&self, query: &NameQuery) -> code_tracer::Result<Vec<FunctionIdentity>> {
        Ok(self
            .functions
            .iter()
            .filter(|f| name_matches(&f.name, &query.name))
            .filter(|f| path_allowed(&f.file_path, query.path_filter.as_deref()))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn find_by_name_pattern(
        &self,
        query: &PatternQuery,
    ) -> code_tracer::Result<Vec<FunctionIdentity>> {
        let name_re = Regex::new(&query.name_pattern)?;
        let file_re = Regex::new(&query.file_pattern)?;
        let exclude = match &query.exclude_file_pattern {
            Some(pattern) => Some(Regex::new(pattern)?),
            None => None,
        };
        Ok(self
            .functions
            .iter()
            .filter(|f| name_re.is_match(&f.name) && file_re.is_match(&f.file_path))
            .filter(|f| !exclude.as_ref().is_some_and(|re| re.is_match(&f.file_path)))
            .filter(|f| path_allowed(&f.file_path, query.path_filter.as_deref()))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn callees_of(&self, caller_name: &str) -> code_tracer::Result<Vec<FunctionIdentity>> {
        let served = {
            let mut counts = self.callee_queries.lock().unwrap();
            *counts.entry(caller_name.to_string()).or_insert(0) += 1;
            counts.values().sum::<usize>()
        };
        if let Some((limit, token)) = &self.cancel_at {
            if served >= *limit {
                token.cancel();
            }
        }
        if self.failing.contains(caller_name) {
            return Err(TracerError::Store("connection reset".to_string()));
        }
        Ok(self
            .edges
            .iter()
            .filter(|(caller, _)| name_matches(caller, caller_name))
            .map(|(_, callee)| self.identity(callee))
            .collect())
    }

    async fn callers_of(&self, callee_name: &str) -> code_tracer::Result<Vec<FunctionIdentity>> {
        Ok(self
            .edges
            .iter()
            .filter(|(_, callee)| name_matches(callee, callee_name))
            .map(|(caller, _)| self.identity(caller))
            .collect())
    }
}

async fn run(graph: &CountingGraph, request: TraceRequest) -> TraceOutcome {
    trace_path(graph, request, &CancellationToken::new())
        .await
        .unwrap()
}

fn limits(max_paths: usize, max_depth: usize) -> PathLimits {
    PathLimits {
        max_paths,
        max_depth,
    }
}

#[tokio::test]
async fn test_linear_chain_single_path() {
    let graph = CountingGraph::chain(&["main", "handleRequest", "processData", "saveToDb"]);

    let outcome = run(&graph, TraceRequest::new("saveToDb").with_source("main")).await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.verdict(), PathVerdict::Found);
    assert_eq!(report.paths().len(), 1);
    let path = &report.paths()[0];
    assert_eq!(
        path.names(),
        vec!["main", "handleRequest", "processData", "saveToDb"]
    );
    assert_eq!(path.depth(), 3);

    let text = outcome.render();
    assert!(text.contains("### Path 1 (depth: 3)"));
    assert!(text.contains("      → saveToDb"));
}

#[tokio::test]
async fn test_unknown_target_issues_no_expansion() {
    let graph = CountingGraph::chain(&["main", "handleRequest", "processData", "saveToDb"]);

    let outcome = run(&graph, TraceRequest::new("nonexistent").with_source("main")).await;

    assert!(matches!(outcome, TraceOutcome::TargetNotFound { .. }));
    assert!(outcome.render().contains("not found"));
    assert_eq!(graph.total_queries(), 0);
}

#[tokio::test]
async fn test_unknown_source() {
    let graph = CountingGraph::chain(&["main", "saveToDb"]);

    let outcome = run(&graph, TraceRequest::new("saveToDb").with_source("missing")).await;

    assert!(matches!(outcome, TraceOutcome::SourceNotFound { ref name } if name == "missing"));
    assert_eq!(outcome.render(), "Source function 'missing' not found.");
}

#[tokio::test]
async fn test_empty_target_is_invalid() {
    let graph = CountingGraph::chain(&["main"]);

    let outcome = run(&graph, TraceRequest::new("   ")).await;

    assert!(outcome.is_error());
    assert!(outcome.render().starts_with("Error:"));
}

#[tokio::test]
async fn test_auto_detected_entry_point() {
    let graph = CountingGraph::new()
        .function("main", "cmd/server/main.go", 1)
        .function("main", "cmd/server/main_test.go", 1)
        .function("handleRequest", "internal/handler.go", 10)
        .function("processData", "internal/process.go", 20)
        .call("main", "handleRequest")
        .call("handleRequest", "processData");

    let outcome = run(&graph, TraceRequest::new("processData")).await;

    let report = outcome.report().expect("traced");
    assert!(report.auto_detected);
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].file_path, "cmd/server/main.go");
    assert_eq!(report.verdict(), PathVerdict::Found);
    assert!(outcome
        .render()
        .contains("auto-detected entry point `main`"));
}

#[tokio::test]
async fn test_no_entry_points() {
    let graph = CountingGraph::new().function("helper", "lib/util.go", 3);

    let outcome = run(&graph, TraceRequest::new("helper")).await;

    assert!(matches!(outcome, TraceOutcome::NoEntryPoints));
    assert!(outcome.render().contains("Try specifying a 'source'"));
}

#[tokio::test]
async fn test_cycle_terminates_without_path() {
    let graph = CountingGraph::new()
        .function("a", "x.go", 1)
        .function("b", "x.go", 5)
        .function("c", "y.go", 1)
        .call("a", "b")
        .call("b", "a");

    let outcome = run(&graph, TraceRequest::new("c").with_source("a")).await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.verdict(), PathVerdict::Unreachable);
    assert_eq!(report.result.nodes_explored, 2);
    assert!(outcome.render().contains("No path found from `a` to 'c'"));
}

#[tokio::test]
async fn test_cycle_under_node_budget() {
    let graph = CountingGraph::new()
        .function("a", "x.go", 1)
        .function("b", "x.go", 5)
        .function("c", "y.go", 1)
        .call("a", "b")
        .call("b", "a");
    let budget = SearchBudget {
        max_nodes_explored: 1,
        ..SearchBudget::default()
    };

    let outcome = run(
        &graph,
        TraceRequest::new("c").with_source("a").with_budget(budget),
    )
    .await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.verdict(), PathVerdict::BudgetExhausted);
    assert_eq!(report.result.nodes_explored, 1);
    assert!(outcome.render().contains("Search limit reached"));
}

#[tokio::test]
async fn test_shortest_path_first() {
    let graph = CountingGraph::new()
        .function("main", "main.go", 1)
        .function("x", "x.go", 1)
        .function("y", "y.go", 1)
        .function("z", "z.go", 1)
        .function("target", "t.go", 1)
        .call("main", "x")
        .call("x", "y")
        .call("y", "target")
        .call("main", "z")
        .call("z", "target");

    let outcome = run(&graph, TraceRequest::new("target").with_source("main")).await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.paths()[0].names(), vec!["main", "z", "target"]);
    assert_eq!(report.paths().len(), 1);
}

#[tokio::test]
async fn test_source_named_like_target_is_not_a_hit() {
    let graph = CountingGraph::chain(&["Run", "helper"]);

    let outcome = run(&graph, TraceRequest::new("Run").with_source("Run")).await;

    let report = outcome.report().expect("traced");
    assert!(report.paths().iter().all(|p| p.hops.len() >= 2));
    assert_eq!(report.verdict(), PathVerdict::Unreachable);
}

#[tokio::test]
async fn test_node_budget_respected_on_wide_graph() {
    let mut graph = CountingGraph::new().function("main", "main.go", 1);
    for i in 0..50 {
        let leaf = format!("leaf{}", i);
        graph = graph.function(&leaf, "leaves.go", i + 2).call("main", &leaf);
    }
    graph = graph.function("target", "t.go", 1);
    let budget = SearchBudget {
        max_nodes_explored: 10,
        max_queries_per_source: 1000,
    };

    let outcome = run(
        &graph,
        TraceRequest::new("target").with_source("main").with_budget(budget),
    )
    .await;

    let report = outcome.report().expect("traced");
    assert!(report.result.nodes_explored <= 10);
    assert_eq!(report.result.status, SearchStatus::LimitReached);
}

#[tokio::test]
async fn test_query_budget_respected_per_source() {
    let graph = CountingGraph::chain(&["main", "f1", "f2", "f3", "f4", "f5", "target"]);
    let budget = SearchBudget {
        max_nodes_explored: 5000,
        max_queries_per_source: 3,
    };

    let outcome = run(
        &graph,
        TraceRequest::new("target").with_source("main").with_budget(budget),
    )
    .await;

    let report = outcome.report().expect("traced");
    assert!(report.result.queries_issued <= 3);
    assert_eq!(graph.total_queries(), 3);
    assert_eq!(report.verdict(), PathVerdict::BudgetExhausted);
}

#[tokio::test]
async fn test_depth_limit() {
    let graph = CountingGraph::chain(&["main", "f1", "f2", "f3", "f4", "target"]);

    let shallow = run(
        &graph,
        TraceRequest::new("target").with_source("main").with_max_depth(4),
    )
    .await;
    assert_eq!(
        shallow.report().expect("traced").verdict(),
        PathVerdict::Unreachable
    );

    let exact = run(
        &graph,
        TraceRequest::new("target").with_source("main").with_max_depth(5),
    )
    .await;
    let report = exact.report().expect("traced");
    assert_eq!(report.paths().len(), 1);
    assert!(report.paths().iter().all(|p| p.depth() <= 5));
}

#[tokio::test]
async fn test_node_at_depth_limit_is_not_expanded() {
    let graph = CountingGraph::chain(&["main", "f1", "f2", "f3", "f4", "target"]);

    let outcome = run(
        &graph,
        TraceRequest::new("target").with_source("main").with_max_depth(4),
    )
    .await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.result.nodes_explored, 5);
    assert_eq!(graph.queries_for("f3"), 1);
    assert_eq!(graph.queries_for("f4"), 0);
    assert_eq!(report.result.queries_issued, 4);
}

#[tokio::test]
async fn test_callees_cached_across_sources() {
    let graph = CountingGraph::new()
        .function("a", "a.go", 1)
        .function("b", "b.go", 1)
        .function("c", "c.go", 1)
        .function("d", "d.go", 1)
        .function("target", "t.go", 1)
        .call("a", "c")
        .call("b", "c")
        .call("c", "d");
    let sources = vec![graph.identity("a"), graph.identity("b")];
    let targets: HashSet<String> = ["target".to_string()].into_iter().collect();

    let result = trace(
        &graph,
        &sources,
        &targets,
        limits(3, 10),
        SearchBudget::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(result.paths.is_empty());
    assert_eq!(graph.queries_for("c"), 1);
    assert_eq!(graph.queries_for("d"), 1);
    assert_eq!(result.queries_issued, graph.total_queries());
}

#[tokio::test]
async fn test_repeated_trace_is_deterministic() {
    let graph = CountingGraph::new()
        .function("main", "main.go", 1)
        .function("p", "p.go", 1)
        .function("q", "q.go", 1)
        .function("save", "db.go", 1)
        .call("main", "p")
        .call("main", "q")
        .call("p", "save")
        .call("q", "save");

    let first = run(&graph, TraceRequest::new("save").with_source("main")).await;
    let second = run(&graph, TraceRequest::new("save").with_source("main")).await;

    assert_eq!(
        first.report().expect("traced").paths(),
        second.report().expect("traced").paths()
    );
}

#[tokio::test]
async fn test_max_paths_across_sources() {
    let graph = CountingGraph::new()
        .function("main", "cmd/a/main.go", 1)
        .function("main", "cmd/b/main.go", 1)
        .function("main", "cmd/c/main.go", 1)
        .function("save", "db.go", 1)
        .call("main", "save");

    let outcome = run(
        &graph,
        TraceRequest::new("save").with_source("main").with_max_paths(2),
    )
    .await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.sources.len(), 3);
    assert_eq!(report.paths().len(), 2);
    assert!(outcome.render().contains("Showing first 2 paths"));
}

#[tokio::test]
async fn test_pre_cancelled_request() {
    let graph = CountingGraph::chain(&["main", "handleRequest", "saveToDb"]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = trace_path(
        &graph,
        TraceRequest::new("saveToDb").with_source("main"),
        &cancel,
    )
    .await
    .unwrap();

    let report = outcome.report().expect("traced");
    assert_eq!(report.verdict(), PathVerdict::Cancelled);
    assert_eq!(graph.total_queries(), 0);
    assert!(outcome.render().starts_with("Search cancelled"));
}

#[tokio::test]
async fn test_cancelled_mid_search_stops_at_check_interval() {
    let cancel = CancellationToken::new();
    let mut graph = CountingGraph::new().function("main", "main.go", 1);
    for i in 0..400 {
        let leaf = format!("leaf{}", i);
        graph = graph.function(&leaf, "leaves.go", i + 2).call("main", &leaf);
    }
    let graph = graph
        .function("sink", "sink.go", 1)
        .cancel_after_queries(10, &cancel);

    let outcome = trace_path(
        &graph,
        TraceRequest::new("sink").with_source("main"),
        &cancel,
    )
    .await
    .unwrap();

    let report = outcome.report().expect("traced");
    assert_eq!(report.verdict(), PathVerdict::Cancelled);
    assert_eq!(report.result.nodes_explored, 100);
    assert_eq!(report.result.queries_issued, 100);
    assert_eq!(graph.total_queries(), 100);
    assert!(outcome.render().starts_with("Search cancelled"));
}

#[tokio::test]
async fn test_failed_expansion_is_skipped() {
    let graph = CountingGraph::new()
        .function("main", "main.go", 1)
        .function("handleRequest", "handler.go", 1)
        .function("alt", "alt.go", 1)
        .function("saveToDb", "db.go", 1)
        .call("main", "handleRequest")
        .call("main", "alt")
        .call("handleRequest", "saveToDb")
        .call("alt", "saveToDb")
        .failing("handleRequest");

    let outcome = run(&graph, TraceRequest::new("saveToDb").with_source("main")).await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.paths()[0].names(), vec!["main", "alt", "saveToDb"]);
    assert_eq!(graph.queries_for("handleRequest"), 1);
}

#[tokio::test]
async fn test_failed_expansion_on_only_route() {
    let graph = CountingGraph::chain(&["main", "handleRequest", "saveToDb"]).failing("main");

    let outcome = run(&graph, TraceRequest::new("saveToDb").with_source("main")).await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.verdict(), PathVerdict::Degraded);
    assert_eq!(report.result.queries_issued, 1);
    assert_eq!(report.result.degraded_expansions, 1);
    assert!(outcome.render().contains("1 callee lookup(s) failed"));
}

#[tokio::test]
async fn test_method_suffix_target() {
    let graph = CountingGraph::new()
        .function("main", "main.go", 1)
        .function("Agent.Run", "agent.go", 12)
        .call("main", "Agent.Run");

    let outcome = run(&graph, TraceRequest::new("Run").with_source("main")).await;

    let report = outcome.report().expect("traced");
    assert_eq!(report.paths()[0].names(), vec!["main", "Agent.Run"]);
}
