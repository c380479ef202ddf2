pub mod call_graph;
pub mod error;
pub mod graph;
pub mod trace;

pub use call_graph::{call_graph, CallGraphOutcome, CallGraphReport};
pub use error::{Result, TracerError};
pub use graph::http::{HttpGraphStore, HttpStoreConfig};
pub use graph::sqlite::SqliteGraphStore;
pub use graph::{
    CallRecord, FunctionIdentity, FunctionRecord, GraphStore, NameQuery, PatternQuery,
};
pub use trace::{
    detect_entry_points, resolve_function, trace_path, CallPath, EntryConvention,
    EntryPointDetector, PathVerdict, SearchBudget, SearchStatus, TraceOutcome, TraceReport,
    TraceRequest, TraceResult,
};
