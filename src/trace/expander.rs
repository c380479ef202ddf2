//! Per-request memoized callee lookups.

use std::collections::HashMap;

use tracing::warn;

use crate::graph::{FunctionIdentity, GraphStore};

/// Result of expanding one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Served from the per-request cache; no store query issued.
    Cached(Vec<FunctionIdentity>),
    /// Fetched from the store; one query issued.
    Fetched(Vec<FunctionIdentity>),
    /// The store query failed; treated as "no callees". One query issued.
    Degraded,
}

impl Expansion {
    pub fn issued_query(&self) -> bool {
        !matches!(self, Expansion::Cached(_))
    }

    pub fn callees(&self) -> &[FunctionIdentity] {
        match self {
            Expansion::Cached(callees) | Expansion::Fetched(callees) => callees,
            Expansion::Degraded => &[],
        }
    }
}

/// Memoizing callee lookup, scoped to one trace request.
pub struct CalleeExpander<'a> {
    store: &'a dyn GraphStore,
    cache: HashMap<String, Vec<FunctionIdentity>>,
    queries: usize,
}

impl<'a> CalleeExpander<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
            queries: 0,
        }
    }

    /// Direct callees of `name`, queried at most once per request.
    ///
    /// A failed query is cached as empty so a flaky node is not retried
    /// from every path that reaches it.
    pub async fn callees_of(&mut self, name: &str) -> Expansion {
        if let Some(callees) = self.cache.get(name) {
            return Expansion::Cached(callees.clone());
        }

        self.queries += 1;
        match self.store.callees_of(name).await {
            Ok(callees) => {
                self.cache.insert(name.to_string(), callees.clone());
                Expansion::Fetched(callees)
            }
            Err(e) => {
                warn!(function = name, error = %e, "callee expansion degraded");
                self.cache.insert(name.to_string(), Vec::new());
                Expansion::Degraded
            }
        }
    }

    /// Store queries issued so far by this expander.
    pub fn queries_issued(&self) -> usize {
        self.queries
    }
}
