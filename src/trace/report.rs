//! Markdown rendering of trace outcomes.

use std::fmt::Write;

use crate::graph::FunctionIdentity;
use crate::trace::{CallPath, PathVerdict, TraceOutcome, TraceReport};

const CANCELLED_MESSAGE: &str = "Search cancelled (timeout or cancellation).";
/// Auto-detected entry points named individually in a source description.
const LISTED_SOURCES: usize = 5;

pub fn render_outcome(outcome: &TraceOutcome) -> String {
    match outcome {
        TraceOutcome::Invalid { message } => format!("Error: {}", message),
        TraceOutcome::NoEntryPoints => {
            "No entry points found. Try specifying a 'source' function explicitly.".to_string()
        }
        TraceOutcome::SourceNotFound { name } => format!("Source function '{}' not found.", name),
        TraceOutcome::TargetNotFound { name } => format!("Target function '{}' not found.", name),
        TraceOutcome::Traced(report) => render_report(report),
    }
}

fn render_report(report: &TraceReport) -> String {
    let sources = describe_sources(&report.sources, report.auto_detected);
    match report.verdict() {
        PathVerdict::Found => render_found(report, &sources),
        PathVerdict::Cancelled => render_cancelled(report, &sources),
        PathVerdict::Unreachable | PathVerdict::BudgetExhausted | PathVerdict::Degraded => {
            render_no_path(report, &sources)
        }
    }
}

fn render_found(report: &TraceReport, sources: &str) -> String {
    let paths = report.paths();
    let mut output = format!("## Call Paths to `{}`\n\n", report.target);
    let _ = writeln!(output, "Found {} path(s) from {}", paths.len(), sources);
    let _ = writeln!(output, "_Explored {} nodes._\n", report.result.nodes_explored);
    output.push_str(&format_paths(paths));

    if paths.len() >= report.max_paths {
        let _ = writeln!(
            output,
            "*Showing first {} paths. Use `max_paths` to see more.*",
            report.max_paths
        );
    }
    if report.result.limit_reached() {
        output.push_str("\n**Note:** Search limit reached. There may be additional paths not shown.\n");
    }
    output
}

fn render_cancelled(report: &TraceReport, sources: &str) -> String {
    let mut output = format!("{}\n\n", CANCELLED_MESSAGE);
    let _ = writeln!(
        output,
        "_Explored {} nodes from {} before stopping._\n",
        report.result.nodes_explored, sources
    );
    if !report.paths().is_empty() {
        let _ = writeln!(
            output,
            "Partial results: {} path(s) to `{}` found so far.\n",
            report.paths().len(),
            report.target
        );
        output.push_str(&format_paths(report.paths()));
    }
    output
}

fn render_no_path(report: &TraceReport, sources: &str) -> String {
    let mut output = format!(
        "No path found from {} to '{}' within depth {}.\n\n",
        sources, report.target, report.max_depth
    );
    let _ = writeln!(
        output,
        "_Explored {} nodes before stopping._\n",
        report.result.nodes_explored
    );
    if report.verdict() == PathVerdict::BudgetExhausted {
        let _ = writeln!(
            output,
            "**Note:** Search limit reached (explored {} nodes). The path may exist but wasn't \
             found in the explored portion of the call graph.\n",
            report.result.nodes_explored
        );
    }
    if report.result.degraded() {
        let _ = writeln!(
            output,
            "**Note:** {} callee lookup(s) failed and were skipped. A path may exist through \
             the functions that could not be expanded.\n",
            report.result.degraded_expansions
        );
    }
    output.push_str("**Tips:**\n");
    output.push_str("- Try increasing `max_depth` if the target is deeply nested\n");
    output.push_str(
        "- Use `path_pattern` to narrow the search scope (e.g., `path_pattern=\"apps/core\"`)\n",
    );
    output.push_str("- Check if the target function name is correct with `find_function`\n");
    output.push_str("- Specify a `source` function closer to the target to reduce search space\n");
    output.push_str(
        "- The call might be through an interface or dynamic dispatch (not statically traceable)\n",
    );
    output
}

/// Renders each path as an indented `→` chain with `file:line` under every hop.
pub fn format_paths(paths: &[CallPath]) -> String {
    let mut output = String::new();
    for (i, path) in paths.iter().enumerate() {
        let _ = writeln!(output, "### Path {} (depth: {})\n", i + 1, path.depth());
        output.push_str("```\n");
        for (j, hop) in path.hops.iter().enumerate() {
            let indent = "  ".repeat(j);
            let arrow = if j > 0 { "→ " } else { "" };
            let _ = writeln!(output, "{}{}{}", indent, arrow, hop.name);
            let _ = writeln!(output, "{}   {}", indent, hop.short_location());
        }
        output.push_str("```\n\n");
    }
    output
}

pub fn describe_sources(sources: &[FunctionIdentity], auto_detected: bool) -> String {
    match (sources, auto_detected) {
        ([], _) => "unknown".to_string(),
        ([only], false) => format!("`{}`", only.name),
        ([only], true) => format!("auto-detected entry point `{}`", only.name),
        (many, true) => {
            let mut names: Vec<String> = Vec::new();
            for source in many {
                let quoted = format!("`{}`", source.name);
                if !names.contains(&quoted) {
                    names.push(quoted);
                }
            }
            let listed = names
                .iter()
                .take(LISTED_SOURCES)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            let more = if names.len() > LISTED_SOURCES { ", ..." } else { "" };
            format!("{} auto-detected entry points ({}{})", many.len(), listed, more)
        }
        (many, false) => format!("{} matching functions", many.len()),
    }
}
