use std::time::Instant;

use crate::connstring::{ConnectionInfo, EngineKind};
use crate::engine::{measure_elapsed_ms, DatabaseHandle, Engine};
use crate::error::{DbQueueError, Result};
use crate::types::{IsolationLevel, QueryRequest, QueryResult, Transaction};

/// SQLite engine backed by `rusqlite` (bundled libsqlite3). SQLite needs no
/// network and no server process, so this is the one engine exercised by an
/// integration test against a real driver rather than `MockEngine`.
#[derive(Default)]
pub struct SqliteEngine;

#[cfg(feature = "sqlite")]
impl Engine for SqliteEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn connect(&self, info: &ConnectionInfo) -> Result<DatabaseHandle> {
        let path = info.database.clone().unwrap_or_else(|| ":memory:".into());
        let conn = rusqlite::Connection::open(&path)
            .map_err(|e| DbQueueError::ConnectError(format!("sqlite open {path}: {e}")))?;
        Ok(DatabaseHandle::new(conn))
    }

    fn disconnect(&self, _handle: &DatabaseHandle) {
        // rusqlite::Connection closes on drop; nothing to do explicitly.
    }

    fn health_check(&self, handle: &DatabaseHandle) -> bool {
        handle
            .with_conn::<rusqlite::Connection, bool>(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
            })
            .unwrap_or(false)
    }

    fn execute_query(&self, handle: &DatabaseHandle, req: &QueryRequest) -> QueryResult {
        let start = Instant::now();
        let outcome = handle.with_conn::<rusqlite::Connection, Result<QueryResult>>(|conn| {
            run_sqlite_statement(conn, &req.sql_template)
        });

        match outcome {
            Ok(Ok(mut result)) => {
                result.execution_time_ms = measure_elapsed_ms(start);
                result
            }
            Ok(Err(e)) => QueryResult::failure(e.to_string()),
            Err(e) => QueryResult::failure(e.to_string()),
        }
    }

    fn begin_transaction(
        &self,
        handle: &DatabaseHandle,
        isolation: IsolationLevel,
    ) -> Result<Transaction> {
        handle.with_conn::<rusqlite::Connection, Result<Transaction>>(|conn| {
            conn.execute_batch("BEGIN DEFERRED")
                .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
            Ok(Transaction {
                transaction_id: 1,
                isolation_level: isolation,
                started_at: chrono::Utc::now(),
                active: true,
            })
        })?
    }

    fn commit_transaction(&self, handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        handle
            .with_conn::<rusqlite::Connection, bool>(|conn| conn.execute_batch("COMMIT").is_ok())
            .unwrap_or(false)
    }

    fn rollback_transaction(&self, handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        handle
            .with_conn::<rusqlite::Connection, bool>(|conn| conn.execute_batch("ROLLBACK").is_ok())
            .unwrap_or(false)
    }

    fn prepare(
        &self,
        handle: &DatabaseHandle,
        name: &str,
        sql: &str,
        _param_types: &[String],
    ) -> Result<String> {
        handle.with_conn::<rusqlite::Connection, Result<String>>(|conn| {
            conn.prepare(sql)
                .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
            Ok(name.to_string())
        })?
    }

    fn escape_string(&self, _handle: &DatabaseHandle, input: &str) -> String {
        input.replace('\'', "''")
    }
}

#[cfg(feature = "sqlite")]
fn run_sqlite_statement(conn: &mut rusqlite::Connection, sql: &str) -> Result<QueryResult> {
    let trimmed = sql.trim_start().to_ascii_lowercase();
    if trimmed.starts_with("select") || trimmed.starts_with("pragma") {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
        let column_count = stmt.column_count() as u64;
        let mut rows = stmt
            .query([])
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?
        {
            let mut obj = serde_json::Map::new();
            for idx in 0..column_count as usize {
                let name = row
                    .as_ref()
                    .column_name(idx)
                    .unwrap_or("col")
                    .to_string();
                let value: rusqlite::types::Value = row
                    .get(idx)
                    .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
                obj.insert(name, sqlite_value_to_json(value));
            }
            out.push(serde_json::Value::Object(obj));
        }

        let row_count = out.len() as u64;
        Ok(QueryResult {
            success: true,
            data_json: serde_json::Value::Array(out).to_string(),
            row_count,
            column_count,
            affected_rows: 0,
            error_message: None,
            execution_time_ms: 0,
        })
    } else {
        let affected = conn
            .execute(sql, [])
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
        Ok(QueryResult {
            success: true,
            data_json: "[]".to_string(),
            row_count: 0,
            column_count: 0,
            affected_rows: affected as u64,
            error_message: None,
            execution_time_ms: 0,
        })
    }
}

#[cfg(feature = "sqlite")]
fn sqlite_value_to_json(value: rusqlite::types::Value) -> serde_json::Value {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use rusqlite::types::Value;
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(i),
        Value::Real(f) => serde_json::Value::from(f),
        Value::Text(s) => serde_json::Value::from(s),
        Value::Blob(b) => serde_json::Value::from(BASE64.encode(&b)),
    }
}
