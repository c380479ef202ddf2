//! Name -> function resolution.

use tracing::debug;

use crate::error::Result;
use crate::graph::{FunctionIdentity, GraphStore, NameQuery};

/// Resolves `name` to every stored function named `name` or `*.name`,
/// optionally restricted to file paths matching `path_pattern`.
///
/// An empty result is a normal answer; callers report it as "not found".
pub async fn resolve_function(
    store: &dyn GraphStore,
    name: &str,
    path_pattern: Option<&str>,
) -> Result<Vec<FunctionIdentity>> {
    let query = NameQuery::new(name).with_path_filter(path_pattern);
    let found = store.find_by_name(&query).await?;
    debug!(name, matches = found.len(), "resolved function name");
    Ok(found)
}
