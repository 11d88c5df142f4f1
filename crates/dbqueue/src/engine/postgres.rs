use std::time::Instant;

use crate::connstring::{ConnectionInfo, EngineKind};
use crate::engine::{measure_elapsed_ms, DatabaseHandle, Engine};
use crate::error::{DbQueueError, Result};
use crate::types::{IsolationLevel, QueryRequest, QueryResult, Transaction};

/// PostgreSQL engine backed by the synchronous `postgres` crate. Blocking by
/// design: the core's worker threads are OS threads, not an async runtime.
#[derive(Default)]
pub struct PostgresEngine;

#[cfg(feature = "postgres")]
impl Engine for PostgresEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PostgreSql
    }

    fn connect(&self, info: &ConnectionInfo) -> Result<DatabaseHandle> {
        let mut config = postgres::Config::new();
        if let Some(host) = &info.host {
            config.host(host);
        }
        if let Some(port) = info.port {
            config.port(port);
        }
        if let Some(db) = &info.database {
            config.dbname(db);
        }
        if let Some(user) = &info.user {
            config.user(user);
        }
        if let Some(password) = &info.password {
            config.password(password);
        }

        let client = config
            .connect(postgres::NoTls)
            .map_err(|e| DbQueueError::ConnectError(format!("postgres connect: {e}")))?;
        Ok(DatabaseHandle::new(client))
    }

    fn disconnect(&self, _handle: &DatabaseHandle) {
        // postgres::Client closes its connection on drop.
    }

    fn health_check(&self, handle: &DatabaseHandle) -> bool {
        handle
            .with_conn::<postgres::Client, bool>(|client| client.simple_query("SELECT 1").is_ok())
            .unwrap_or(false)
    }

    fn execute_query(&self, handle: &DatabaseHandle, req: &QueryRequest) -> QueryResult {
        let start = Instant::now();
        let outcome = handle.with_conn::<postgres::Client, Result<QueryResult>>(|client| {
            run_postgres_statement(client, &req.sql_template)
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
        handle.with_conn::<postgres::Client, Result<Transaction>>(|client| {
            let sql = match isolation {
                IsolationLevel::ReadUncommitted => "BEGIN ISOLATION LEVEL READ UNCOMMITTED",
                IsolationLevel::ReadCommitted => "BEGIN ISOLATION LEVEL READ COMMITTED",
                IsolationLevel::RepeatableRead => "BEGIN ISOLATION LEVEL REPEATABLE READ",
                IsolationLevel::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
            };
            client
                .simple_query(sql)
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
            .with_conn::<postgres::Client, bool>(|client| client.simple_query("COMMIT").is_ok())
            .unwrap_or(false)
    }

    fn rollback_transaction(&self, handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        handle
            .with_conn::<postgres::Client, bool>(|client| client.simple_query("ROLLBACK").is_ok())
            .unwrap_or(false)
    }

    fn prepare(
        &self,
        handle: &DatabaseHandle,
        name: &str,
        sql: &str,
        _param_types: &[String],
    ) -> Result<String> {
        handle.with_conn::<postgres::Client, Result<String>>(|client| {
            client
                .prepare(sql)
                .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
            Ok(name.to_string())
        })?
    }

    fn escape_string(&self, _handle: &DatabaseHandle, input: &str) -> String {
        input.replace('\'', "''")
    }
}

#[cfg(feature = "postgres")]
fn run_postgres_statement(client: &mut postgres::Client, sql: &str) -> Result<QueryResult> {
    let trimmed = sql.trim_start().to_ascii_lowercase();
    if trimmed.starts_with("select") {
        let rows = client
            .query(sql, &[])
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
        let column_count = rows.first().map(|r| r.len()).unwrap_or(0) as u64;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut obj = serde_json::Map::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let value: Option<String> = row.try_get::<_, Option<String>>(idx).unwrap_or(None);
                obj.insert(
                    column.name().to_string(),
                    value.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
                );
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
        let affected = client
            .execute(sql, &[])
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
        Ok(QueryResult {
            success: true,
            data_json: "[]".to_string(),
            row_count: 0,
            column_count: 0,
            affected_rows: affected,
            error_message: None,
            execution_time_ms: 0,
        })
    }
}
