pub mod http;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
pub use models::*;

/// Cap for exact-or-suffix name lookups.
pub const NAME_LOOKUP_LIMIT: usize = 50;
/// Cap for a single entry-point pattern lookup.
pub const PATTERN_LOOKUP_LIMIT: usize = 20;
/// Cap for one hop of callers or callees.
pub const EDGE_LOOKUP_LIMIT: usize = 100;

/// Exact-or-receiver-suffix lookup by function name.
#[derive(Debug, Clone, Default)]
pub struct NameQuery {
    pub name: String,
    /// Regex applied to the file path when set.
    pub path_filter: Option<String>,
    pub limit: usize,
}

impl NameQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_filter: None,
            limit: NAME_LOOKUP_LIMIT,
        }
    }

    pub fn with_path_filter(mut self, filter: Option<&str>) -> Self {
        self.path_filter = filter.filter(|f| !f.is_empty()).map(str::to_string);
        self
    }

    /// `"." + name`, the suffix a receiver method name ends with.
    pub fn receiver_suffix(&self) -> String {
        format!(".{}", self.name)
    }
}

/// Regex lookup over function names and file paths.
#[derive(Debug, Clone, Default)]
pub struct PatternQuery {
    pub name_pattern: String,
    pub file_pattern: String,
    pub path_filter: Option<String>,
    /// Files matching this regex are dropped from the result.
    pub exclude_file_pattern: Option<String>,
    pub limit: usize,
}

/// Read-only view of a code graph populated by an external indexer.
///
/// Every method is one round-trip to the backing store. Name arguments of
/// `callees_of` and `callers_of` follow the same exact-or-suffix rule as
/// [`GraphStore::find_by_name`].
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn find_by_name(&self, query: &NameQuery) -> Result<Vec<FunctionIdentity>>;

    async fn find_by_name_pattern(&self, query: &PatternQuery) -> Result<Vec<FunctionIdentity>>;

    /// Direct callees of every function matching `caller_name`.
    async fn callees_of(&self, caller_name: &str) -> Result<Vec<FunctionIdentity>>;

    /// Direct callers of every function matching `callee_name`.
    async fn callers_of(&self, callee_name: &str) -> Result<Vec<FunctionIdentity>>;
}
