//! Entry Point Detector
//!
//! Finds plausible program roots by language naming conventions when a trace
//! is started without an explicit source.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::graph::{FunctionIdentity, GraphStore, PatternQuery, PATTERN_LOOKUP_LIMIT};

/// Test files across the supported languages. Always excluded.
///
/// `[.]` instead of `\.` keeps the pattern portable to the remote query service.
pub const TEST_FILE_PATTERN: &str =
    r"_test[.]go|(^|/)test_[^/]*$|_test[.]py$|[.](test|spec)[.](js|ts|jsx|tsx|mjs|cjs)$|(^|/)tests?/";

/// One language convention: functions whose name matches `name_pattern`
/// defined in files matching `file_pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConvention {
    pub language: String,
    pub name_pattern: String,
    pub file_pattern: String,
}

impl EntryConvention {
    pub fn new(
        language: impl Into<String>,
        name_pattern: impl Into<String>,
        file_pattern: impl Into<String>,
    ) -> Self {
        Self {
            language: language.into(),
            name_pattern: name_pattern.into(),
            file_pattern: file_pattern.into(),
        }
    }
}

/// Built-in conventions, queried in this order.
pub fn default_conventions() -> Vec<EntryConvention> {
    vec![
        EntryConvention::new("go", "^main$", "[.]go$"),
        EntryConvention::new("rust", "^main$", "[.]rs$"),
        EntryConvention::new("javascript", ".*", "(index|app|server|main)[.](js|ts|mjs|cjs)$"),
        EntryConvention::new("python", "^(__main__|main)$", "[.]py$"),
    ]
}

/// Detector for entry points
#[derive(Debug, Clone)]
pub struct EntryPointDetector {
    conventions: Vec<EntryConvention>,
    exclude_file_pattern: String,
}

impl Default for EntryPointDetector {
    fn default() -> Self {
        Self {
            conventions: default_conventions(),
            exclude_file_pattern: TEST_FILE_PATTERN.to_string(),
        }
    }
}

impl EntryPointDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a convention after the built-in ones.
    pub fn with_convention(mut self, convention: EntryConvention) -> Self {
        self.conventions.push(convention);
        self
    }

    pub fn conventions(&self) -> &[EntryConvention] {
        &self.conventions
    }

    /// One store query per convention; results are concatenated in table order.
    ///
    /// A failing convention is skipped. Duplicates are kept, the tracer's
    /// visited set absorbs them.
    pub async fn detect(
        &self,
        store: &dyn GraphStore,
        path_pattern: Option<&str>,
    ) -> Vec<FunctionIdentity> {
        let mut entries = Vec::new();
        let path_filter = path_pattern.filter(|p| !p.is_empty()).map(str::to_string);

        for convention in &self.conventions {
            let query = PatternQuery {
                name_pattern: convention.name_pattern.clone(),
                file_pattern: convention.file_pattern.clone(),
                path_filter: path_filter.clone(),
                exclude_file_pattern: Some(self.exclude_file_pattern.clone()),
                limit: PATTERN_LOOKUP_LIMIT,
            };

            match store.find_by_name_pattern(&query).await {
                Ok(found) => {
                    debug!(
                        language = %convention.language,
                        found = found.len(),
                        "entry point convention queried"
                    );
                    entries.extend(found);
                }
                Err(e) => {
                    warn!(
                        language = %convention.language,
                        error = %e,
                        "entry point query failed, skipping convention"
                    );
                }
            }
        }

        entries
    }
}

/// [`EntryPointDetector::detect`] with the built-in conventions.
pub async fn detect_entry_points(
    store: &dyn GraphStore,
    path_pattern: Option<&str>,
) -> Vec<FunctionIdentity> {
    EntryPointDetector::default().detect(store, path_pattern).await
}
