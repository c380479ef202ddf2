//! One-hop call graph: direct callers and callees of a function.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{FunctionIdentity, GraphStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraphReport {
    pub function: String,
    pub callers: Vec<FunctionIdentity>,
    pub callees: Vec<FunctionIdentity>,
}

impl CallGraphReport {
    pub fn render(&self) -> String {
        let mut output = format!("# Call Graph for '{}'\n\n", self.function);
        output.push_str("## Callers (functions that call this):\n");
        write_section(&mut output, &self.callers);
        output.push_str("\n## Callees (functions called by this):\n");
        write_section(&mut output, &self.callees);
        output
    }
}

fn write_section(output: &mut String, functions: &[FunctionIdentity]) {
    if functions.is_empty() {
        output.push_str("_none found_\n");
        return;
    }
    for function in functions {
        let _ = writeln!(
            output,
            "- {} ({}:{})",
            function.name, function.file_path, function.line
        );
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallGraphOutcome {
    Invalid { message: String },
    Graph(CallGraphReport),
}

impl CallGraphOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, CallGraphOutcome::Invalid { .. })
    }

    pub fn render(&self) -> String {
        match self {
            CallGraphOutcome::Invalid { message } => format!("Error: {}", message),
            CallGraphOutcome::Graph(report) => report.render(),
        }
    }
}

/// Two store round-trips: callers of `name`, then callees of `name`.
pub async fn call_graph(store: &dyn GraphStore, name: &str) -> Result<CallGraphOutcome> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(CallGraphOutcome::Invalid {
            message: "function_name cannot be empty".to_string(),
        });
    }

    let callers = store.callers_of(name).await?;
    let callees = store.callees_of(name).await?;

    Ok(CallGraphOutcome::Graph(CallGraphReport {
        function: name.to_string(),
        callers,
        callees,
    }))
}
