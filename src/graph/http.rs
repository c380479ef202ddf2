use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TracerError};
use crate::graph::{FunctionIdentity, GraphStore, NameQuery, PatternQuery, EDGE_LOOKUP_LIMIT};

/// Runtime configuration for a remote code-graph query service.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    pub endpoint: String,
    pub project_id: String,
    pub timeout: Duration,
}

impl HttpStoreConfig {
    pub fn new(endpoint: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            timeout: Duration::from_secs(90),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Graph store that ships Datalog scripts to `<endpoint>/v1/query`.
pub struct HttpGraphStore {
    config: HttpStoreConfig,
    http: reqwest::Client,
}

impl HttpGraphStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TracerError::Http(format!("failed to build store http client: {}", e)))?;

        Ok(Self { config, http })
    }

    async fn query(&self, script: String) -> Result<Vec<FunctionIdentity>> {
        let url = self.query_url();
        let payload = QueryRequest {
            project_id: &self.config.project_id,
            script: &script,
        };

        let response = self.http.post(&url).json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                TracerError::Http(format!(
                    "store query timed out after {:?} (project={})",
                    self.config.timeout, self.config.project_id
                ))
            } else {
                TracerError::Http(format!(
                    "store query failed (project={}): {}",
                    self.config.project_id, e
                ))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TracerError::Http(format!("failed to read store response body: {}", e)))?;

        if !status.is_success() {
            return Err(TracerError::Store(format!(
                "query error (status {}): {}",
                status,
                truncate_for_error(&body)
            )));
        }

        let parsed: QueryResponse = serde_json::from_str(&body).map_err(|e| {
            TracerError::Store(format!(
                "invalid JSON from store: {} (body={})",
                e,
                truncate_for_error(&body)
            ))
        })?;

        debug!(rows = parsed.rows.len(), "store query answered");
        Ok(parsed.into_identities())
    }

    fn query_url(&self) -> String {
        let endpoint = self.config.endpoint.trim().trim_end_matches('/');
        if endpoint.ends_with("/v1/query") {
            endpoint.to_string()
        } else {
            format!("{}/v1/query", endpoint)
        }
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    async fn find_by_name(&self, query: &NameQuery) -> Result<Vec<FunctionIdentity>> {
        self.query(name_script(query)).await
    }

    async fn find_by_name_pattern(&self, query: &PatternQuery) -> Result<Vec<FunctionIdentity>> {
        self.query(pattern_script(query)).await
    }

    async fn callees_of(&self, caller_name: &str) -> Result<Vec<FunctionIdentity>> {
        self.query(edge_script(caller_name, true)).await
    }

    async fn callers_of(&self, callee_name: &str) -> Result<Vec<FunctionIdentity>> {
        self.query(edge_script(callee_name, false)).await
    }
}

// === Script builders ===

/// String literal for a script; JSON escaping is accepted by the query language.
fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn name_condition(column: &str, name: &str) -> String {
    format!(
        "({column} = {} or ends_with({column}, {}))",
        quote(name),
        quote(&format!(".{}", name))
    )
}

fn name_script(query: &NameQuery) -> String {
    let mut conditions = vec![name_condition("name", &query.name)];
    if let Some(filter) = &query.path_filter {
        conditions.push(format!("regex_matches(file_path, {})", quote(filter)));
    }
    format!(
        "?[name, file_path, start_line] := *cie_function {{ name, file_path, start_line }}, {} :limit {}",
        conditions.join(", "),
        query.limit
    )
}

fn pattern_script(query: &PatternQuery) -> String {
    let mut conditions = vec![
        format!("regex_matches(name, {})", quote(&query.name_pattern)),
        format!("regex_matches(file_path, {})", quote(&query.file_pattern)),
    ];
    if let Some(filter) = &query.path_filter {
        conditions.push(format!("regex_matches(file_path, {})", quote(filter)));
    }
    if let Some(exclude) = &query.exclude_file_pattern {
        conditions.push(format!("!regex_matches(file_path, {})", quote(exclude)));
    }
    format!(
        "?[name, file_path, start_line] := *cie_function {{ name, file_path, start_line }}, {} :limit {}",
        conditions.join(", "),
        query.limit
    )
}

/// One hop over `cie_calls`. `forward` returns callees of `name`.
fn edge_script(name: &str, forward: bool) -> String {
    let (anchor_id, other_id) = if forward {
        ("caller_id", "callee_id")
    } else {
        ("callee_id", "caller_id")
    };
    format!(
        "?[other_name, other_file, other_line] := \
         *cie_calls {{ caller_id, callee_id }}, \
         *cie_function {{ id: {anchor_id}, name: anchor_name }}, \
         *cie_function {{ id: {other_id}, file_path: other_file, name: other_name, start_line: other_line }}, \
         {} :limit {}",
        name_condition("anchor_name", name),
        EDGE_LOOKUP_LIMIT
    )
}

fn truncate_for_error(value: &str) -> String {
    const LIMIT: usize = 400;
    if value.chars().count() <= LIMIT {
        value.to_string()
    } else {
        format!("{}...", value.chars().take(LIMIT).collect::<String>())
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    project_id: &'a str,
    script: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Headers", default)]
    #[allow(dead_code)]
    headers: Vec<String>,
    #[serde(rename = "Rows", default)]
    rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    /// Rows are `[name, file_path, line]`; short rows are dropped.
    fn into_identities(self) -> Vec<FunctionIdentity> {
        self.rows
            .into_iter()
            .filter(|row| row.len() >= 3)
            .map(|row| FunctionIdentity {
                name: value_to_string(&row[0]),
                file_path: value_to_string(&row[1]),
                line: value_to_line(&row[2]),
            })
            .collect()
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_line(value: &serde_json::Value) -> u32 {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
