use serde::{Deserialize, Serialize};

/// A function as the graph store reports it.
///
/// `name` may carry a receiver (`Type.Method`). The same name can exist in
/// several files, so `(name, file_path)` is the closest thing to a key the
/// tracer ever sees; store-internal ids never leave the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionIdentity {
    pub name: String,
    pub file_path: String,
    pub line: u32,
}

impl FunctionIdentity {
    pub fn new(name: impl Into<String>, file_path: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            file_path: file_path.into(),
            line,
        }
    }

    /// Last path component of `file_path`.
    pub fn file_name(&self) -> &str {
        extract_file_name(&self.file_path)
    }

    /// `file:line` using only the file name.
    pub fn short_location(&self) -> String {
        format!("{}:{}", self.file_name(), self.line)
    }

    /// Exact match, or `name` is the method part of a `Type.Method` name.
    pub fn matches_name(&self, name: &str) -> bool {
        name_matches(&self.name, name)
    }
}

/// Exact-or-receiver-suffix rule: `Run` matches `Run` and `Agent.Run`.
pub fn name_matches(stored: &str, wanted: &str) -> bool {
    if stored == wanted {
        return true;
    }
    stored.len() > wanted.len()
        && stored.ends_with(wanted)
        && stored.as_bytes()[stored.len() - wanted.len() - 1] == b'.'
}

pub fn extract_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A function row as an external indexer writes it into a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: u32,
}

impl FunctionRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        file_path: impl Into<String>,
        start_line: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file_path: file_path.into(),
            start_line,
        }
    }

    pub fn identity(&self) -> FunctionIdentity {
        FunctionIdentity::new(self.name.clone(), self.file_path.clone(), self.start_line)
    }
}

/// A caller -> callee edge between two function record ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller_id: String,
    pub callee_id: String,
}

impl CallRecord {
    pub fn new(caller_id: impl Into<String>, callee_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            callee_id: callee_id.into(),
        }
    }
}
