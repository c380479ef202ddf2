use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use regex::Regex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::debug;

use crate::error::{Result, TracerError};
use crate::graph::{
    CallRecord, FunctionIdentity, FunctionRecord, GraphStore, NameQuery, PatternQuery,
    EDGE_LOOKUP_LIMIT,
};

/// Graph store backed by a local SQLite file written by an external indexer.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Opens an existing graph database. Never creates the file.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if !db_path.is_file() {
            return Err(TracerError::InvalidRequest(format!(
                "graph database not found: {}",
                db_path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure_pragmas(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens or creates a database and its schema, for loaders.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::configure_pragmas(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// - WAL mode: the indexer can write while we read
    /// - 64MB cache: edge joins touch the same pages repeatedly during a trace
    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS functions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                start_line INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_functions_name ON functions(name);
            CREATE INDEX IF NOT EXISTS idx_functions_file ON functions(file_path);

            CREATE TABLE IF NOT EXISTS calls (
                caller_id TEXT NOT NULL,
                callee_id TEXT NOT NULL,
                PRIMARY KEY (caller_id, callee_id)
            );

            CREATE INDEX IF NOT EXISTS idx_calls_callee ON calls(callee_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TracerError::Store("sqlite connection lock poisoned".to_string()))
    }

    // === Writer Methods (used by external loaders) ===

    pub fn add_functions(&self, functions: &[FunctionRecord]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for function in functions {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO functions (id, name, file_path, start_line)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    function.id,
                    function.name,
                    function.file_path,
                    function.start_line
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn add_calls(&self, calls: &[CallRecord]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for call in calls {
            tx.execute(
                "INSERT OR IGNORE INTO calls (caller_id, callee_id) VALUES (?1, ?2)",
                params![call.caller_id, call.callee_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn function_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM functions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn identity_from_row(row: &rusqlite::Row) -> rusqlite::Result<FunctionIdentity> {
        Ok(FunctionIdentity {
            name: row.get(0)?,
            file_path: row.get(1)?,
            line: row.get(2)?,
        })
    }

    /// One hop across `calls`. `forward` walks caller -> callee.
    fn edge_lookup(&self, name: &str, forward: bool) -> Result<Vec<FunctionIdentity>> {
        let (matched, returned) = if forward {
            ("caller_id", "callee_id")
        } else {
            ("callee_id", "caller_id")
        };
        let sql = format!(
            r#"
            SELECT DISTINCT other.name, other.file_path, other.start_line
            FROM calls c
            JOIN functions anchor ON anchor.id = c.{matched}
            JOIN functions other ON other.id = c.{returned}
            WHERE anchor.name = ?1
               OR (length(anchor.name) > length(?2) AND substr(anchor.name, -length(?2)) = ?2)
            ORDER BY other.name, other.file_path, other.start_line
            LIMIT ?3
            "#
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let suffix = format!(".{}", name);
        let rows = stmt
            .query_map(
                params![name, suffix, EDGE_LOOKUP_LIMIT as i64],
                Self::identity_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        Some(p) if !p.is_empty() => Ok(Some(Regex::new(p)?)),
        _ => Ok(None),
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn find_by_name(&self, query: &NameQuery) -> Result<Vec<FunctionIdentity>> {
        let path_filter = compile(query.path_filter.as_deref())?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT name, file_path, start_line
            FROM functions
            WHERE name = ?1
               OR (length(name) > length(?2) AND substr(name, -length(?2)) = ?2)
            ORDER BY name, file_path, start_line
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![query.name, query.receiver_suffix()],
                Self::identity_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let found: Vec<_> = rows
            .into_iter()
            .filter(|f| path_filter.as_ref().map_or(true, |re| re.is_match(&f.file_path)))
            .take(query.limit)
            .collect();

        debug!(name = %query.name, found = found.len(), "sqlite name lookup");
        Ok(found)
    }

    async fn find_by_name_pattern(&self, query: &PatternQuery) -> Result<Vec<FunctionIdentity>> {
        let name_re = Regex::new(&query.name_pattern)?;
        let file_re = Regex::new(&query.file_pattern)?;
        let path_filter = compile(query.path_filter.as_deref())?;
        let exclude = compile(query.exclude_file_pattern.as_deref())?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT name, file_path, start_line
            FROM functions
            ORDER BY file_path, start_line, name
            "#,
        )?;

        let mut found = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let function = Self::identity_from_row(row)?;
            let keep = name_re.is_match(&function.name)
                && file_re.is_match(&function.file_path)
                && path_filter
                    .as_ref()
                    .map_or(true, |re| re.is_match(&function.file_path))
                && !exclude
                    .as_ref()
                    .is_some_and(|re| re.is_match(&function.file_path));
            if keep {
                found.push(function);
                if found.len() >= query.limit {
                    break;
                }
            }
        }

        debug!(
            name_pattern = %query.name_pattern,
            file_pattern = %query.file_pattern,
            found = found.len(),
            "sqlite pattern lookup"
        );
        Ok(found)
    }

    async fn callees_of(&self, caller_name: &str) -> Result<Vec<FunctionIdentity>> {
        self.edge_lookup(caller_name, true)
    }

    async fn callers_of(&self, callee_name: &str) -> Result<Vec<FunctionIdentity>> {
        self.edge_lookup(callee_name, false)
    }
}
