use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use code_tracer::graph::GraphStore;
use code_tracer::trace::{SearchBudget, TraceRequest};

use crate::cli::cancel_after;

#[derive(Clone)]
pub struct McpServer {
    store: Arc<dyn GraphStore>,
}

impl McpServer {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    async fn find_function_impl(
        &self,
        name: &str,
        path_pattern: Option<&str>,
    ) -> code_tracer::Result<String> {
        let functions =
            code_tracer::resolve_function(self.store.as_ref(), name, path_pattern).await?;
        if functions.is_empty() {
            return Ok(format!("Function '{}' not found.", name));
        }
        Ok(serde_json::to_string_pretty(&functions).unwrap_or_default())
    }

    async fn detect_entry_points_impl(&self, path_pattern: Option<&str>) -> String {
        let entries = code_tracer::detect_entry_points(self.store.as_ref(), path_pattern).await;
        if entries.is_empty() {
            return "No entry points found.".to_string();
        }
        serde_json::to_string_pretty(&entries).unwrap_or_default()
    }
}

fn schema_for<T: JsonSchema>() -> Arc<serde_json::Map<String, serde_json::Value>> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(&schema) {
        Ok(serde_json::Value::Object(map)) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    request: CallToolRequestParams,
) -> Result<T, McpError> {
    serde_json::from_value(serde_json::Value::Object(
        request.arguments.unwrap_or_default(),
    ))
    .map_err(|e| McpError::invalid_params(e.to_string(), None))
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TracePathParams {
    /// Target function name (`Method` also matches `Type.Method`)
    pub target: String,
    /// Start function; entry points are auto-detected when omitted
    #[serde(default)]
    pub source: Option<String>,
    /// Regex over file paths, e.g. "apps/core"
    #[serde(default)]
    pub path_pattern: Option<String>,
    /// Max paths (default: 3)
    #[serde(default)]
    pub max_paths: Option<usize>,
    /// Max call hops per path (default: 10)
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Max nodes explored across all sources (default: 5000)
    #[serde(default)]
    pub max_nodes: Option<usize>,
    /// Max callee queries per source (default: 1000)
    #[serde(default)]
    pub max_queries_per_source: Option<usize>,
    /// Cancel the search after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl TracePathParams {
    fn into_request(self) -> TraceRequest {
        let defaults = SearchBudget::default();
        let mut request = TraceRequest::new(self.target).with_budget(SearchBudget {
            max_nodes_explored: self.max_nodes.unwrap_or(defaults.max_nodes_explored),
            max_queries_per_source: self
                .max_queries_per_source
                .unwrap_or(defaults.max_queries_per_source),
        });
        if let Some(max_paths) = self.max_paths {
            request = request.with_max_paths(max_paths);
        }
        if let Some(max_depth) = self.max_depth {
            request = request.with_max_depth(max_depth);
        }
        request.source = self.source;
        request.path_pattern = self.path_pattern;
        request
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetCallGraphParams {
    /// Function name
    pub function_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindFunctionParams {
    /// Function name (`Method` also matches `Type.Method`)
    pub name: String,
    /// Regex over file paths
    #[serde(default)]
    pub path_pattern: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DetectEntryPointsParams {
    /// Regex over file paths
    #[serde(default)]
    pub path_pattern: Option<String>,
}

fn tool(
    name: &str,
    title: &str,
    description: &str,
    input_schema: Arc<serde_json::Map<String, serde_json::Value>>,
) -> Tool {
    Tool {
        name: name.to_string().into(),
        title: Some(title.to_string()),
        description: Some(description.to_string().into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "code-tracer".to_string(),
                title: Some("Code Tracer".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Call-path tracing over an indexed code graph. \
                 Finds shortest call chains between functions and shows direct callers and callees."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = vec![
            tool(
                "trace_path",
                "Trace Call Path",
                "Find shortest call chains from a source (or auto-detected entry points) to a target function",
                schema_for::<TracePathParams>(),
            ),
            tool(
                "get_call_graph",
                "Get Call Graph",
                "Direct callers and callees of a function",
                schema_for::<GetCallGraphParams>(),
            ),
            tool(
                "find_function",
                "Find Function",
                "Find functions by exact name or method suffix",
                schema_for::<FindFunctionParams>(),
            ),
            tool(
                "detect_entry_points",
                "Detect Entry Points",
                "List entry points found by language naming conventions",
                schema_for::<DetectEntryPointsParams>(),
            ),
        ];

        Ok(ListToolsResult {
            next_cursor: None,
            tools,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let result = match request.name.as_ref() {
            "trace_path" => {
                let params: TracePathParams = parse_params(request)?;
                let deadline = params.timeout_secs.map(Duration::from_secs);
                let cancel = context.ct.child_token();
                cancel_after(&cancel, deadline);

                match code_tracer::trace_path(
                    self.store.as_ref(),
                    params.into_request(),
                    &cancel,
                )
                .await
                {
                    Ok(outcome) if outcome.is_error() => {
                        CallToolResult::error(vec![Content::text(outcome.render())])
                    }
                    Ok(outcome) => CallToolResult::success(vec![Content::text(outcome.render())]),
                    Err(e) => CallToolResult::error(vec![Content::text(e.to_string())]),
                }
            }
            "get_call_graph" => {
                let params: GetCallGraphParams = parse_params(request)?;

                match code_tracer::call_graph(self.store.as_ref(), &params.function_name).await {
                    Ok(outcome) if outcome.is_error() => {
                        CallToolResult::error(vec![Content::text(outcome.render())])
                    }
                    Ok(outcome) => CallToolResult::success(vec![Content::text(outcome.render())]),
                    Err(e) => CallToolResult::error(vec![Content::text(e.to_string())]),
                }
            }
            "find_function" => {
                let params: FindFunctionParams = parse_params(request)?;

                match self
                    .find_function_impl(&params.name, params.path_pattern.as_deref())
                    .await
                {
                    Ok(text) => CallToolResult::success(vec![Content::text(text)]),
                    Err(e) => CallToolResult::error(vec![Content::text(e.to_string())]),
                }
            }
            "detect_entry_points" => {
                let params: DetectEntryPointsParams = parse_params(request)?;
                let text = self
                    .detect_entry_points_impl(params.path_pattern.as_deref())
                    .await;
                CallToolResult::success(vec![Content::text(text)])
            }
            _ => {
                return Err(McpError::invalid_params(
                    format!("Unknown tool: {}", request.name),
                    None,
                ));
            }
        };

        Ok(result)
    }
}
