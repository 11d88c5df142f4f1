use std::time::Instant;

#[cfg(feature = "mysql")]
use mysql::prelude::Queryable;

use crate::connstring::{ConnectionInfo, EngineKind};
use crate::engine::{measure_elapsed_ms, DatabaseHandle, Engine};
use crate::error::{DbQueueError, Result};
use crate::types::{IsolationLevel, QueryRequest, QueryResult, Transaction};

/// MySQL/MariaDB engine backed by the synchronous `mysql` crate.
#[derive(Default)]
pub struct MySqlEngine;

#[cfg(feature = "mysql")]
impl Engine for MySqlEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::MySql
    }

    fn connect(&self, info: &ConnectionInfo) -> Result<DatabaseHandle> {
        let opts = mysql::OptsBuilder::new()
            .ip_or_hostname(info.host.clone())
            .tcp_port(info.port.unwrap_or(3306))
            .db_name(info.database.clone())
            .user(info.user.clone())
            .pass(info.password.clone());

        let conn = mysql::Conn::new(opts)
            .map_err(|e| DbQueueError::ConnectError(format!("mysql connect: {e}")))?;
        Ok(DatabaseHandle::new(conn))
    }

    fn disconnect(&self, _handle: &DatabaseHandle) {
        // mysql::Conn closes its socket on drop.
    }

    fn health_check(&self, handle: &DatabaseHandle) -> bool {
        handle
            .with_conn::<mysql::Conn, bool>(|conn| conn.ping())
            .unwrap_or(false)
    }

    fn execute_query(&self, handle: &DatabaseHandle, req: &QueryRequest) -> QueryResult {
        let start = Instant::now();
        let outcome = handle.with_conn::<mysql::Conn, Result<QueryResult>>(|conn| {
            run_mysql_statement(conn, &req.sql_template)
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
        handle.with_conn::<mysql::Conn, Result<Transaction>>(|conn| {
            conn.query_drop("START TRANSACTION")
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
            .with_conn::<mysql::Conn, bool>(|conn| conn.query_drop("COMMIT").is_ok())
            .unwrap_or(false)
    }

    fn rollback_transaction(&self, handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        handle
            .with_conn::<mysql::Conn, bool>(|conn| conn.query_drop("ROLLBACK").is_ok())
            .unwrap_or(false)
    }

    fn prepare(
        &self,
        handle: &DatabaseHandle,
        name: &str,
        sql: &str,
        _param_types: &[String],
    ) -> Result<String> {
        handle.with_conn::<mysql::Conn, Result<String>>(|conn| {
            conn.prep(sql)
                .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
            Ok(name.to_string())
        })?
    }

    fn escape_string(&self, _handle: &DatabaseHandle, input: &str) -> String {
        input.replace('\'', "''").replace('\\', "\\\\")
    }
}

#[cfg(feature = "mysql")]
fn run_mysql_statement(conn: &mut mysql::Conn, sql: &str) -> Result<QueryResult> {
    let trimmed = sql.trim_start().to_ascii_lowercase();
    if trimmed.starts_with("select") {
        let rows: Vec<mysql::Row> = conn
            .query(sql)
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
        let column_count = rows.first().map(|r| r.len()).unwrap_or(0) as u64;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut obj = serde_json::Map::new();
            for (idx, column) in row.columns_ref().iter().enumerate() {
                let value: Option<String> = row.get(idx);
                obj.insert(
                    column.name_str().to_string(),
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
        conn.query_drop(sql)
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
        Ok(QueryResult {
            success: true,
            data_json: "[]".to_string(),
            row_count: 0,
            column_count: 0,
            affected_rows: conn.affected_rows(),
            error_message: None,
            execution_time_ms: 0,
        })
    }
}
