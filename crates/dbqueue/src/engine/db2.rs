use std::time::Instant;

use crate::connstring::{ConnectionInfo, EngineKind};
use crate::engine::{measure_elapsed_ms, DatabaseHandle, Engine};
use crate::error::{DbQueueError, Result};
use crate::types::{IsolationLevel, QueryRequest, QueryResult, Transaction};

/// DB2 engine reached through the system ODBC driver manager via `odbc-api`.
/// `ConnectionInfo` for DB2 always comes from the `DRIVER={DB2};...` DSN
/// form, never the URL form.
///
/// `odbc-api` ties a `Connection<'env>` to the `&'env Environment` it was
/// opened from, but `DatabaseHandle` stores its payload behind `dyn Any +
/// 'static`. Rather than smuggle a borrowed environment through that bound
/// unsafely, each `connect` call leaks its own `Environment` (one per live
/// connection, for the lifetime of the process) and opens the connection
/// against that `'static` reference.
#[derive(Default)]
pub struct Db2Engine;

#[cfg(feature = "db2")]
impl Engine for Db2Engine {
    fn kind(&self) -> EngineKind {
        EngineKind::Db2
    }

    fn connect(&self, info: &ConnectionInfo) -> Result<DatabaseHandle> {
        let conn_str = format!(
            "DRIVER={{DB2}};DATABASE={};HOSTNAME={};PORT={};UID={};PWD={}",
            info.database.as_deref().unwrap_or_default(),
            info.host.as_deref().unwrap_or_default(),
            info.port.unwrap_or(50000),
            info.user.as_deref().unwrap_or_default(),
            info.password.as_deref().unwrap_or_default(),
        );

        let environment = odbc_api::Environment::new()
            .map_err(|e| DbQueueError::ConnectError(format!("db2 environment init: {e}")))?;
        let environment: &'static odbc_api::Environment = Box::leak(Box::new(environment));

        let conn = environment
            .connect_with_connection_string(&conn_str, odbc_api::ConnectionOptions::default())
            .map_err(|e| DbQueueError::ConnectError(format!("db2 connect: {e}")))?;
        Ok(DatabaseHandle::new(conn))
    }

    fn disconnect(&self, _handle: &DatabaseHandle) {
        // odbc_api::Connection disconnects on drop.
    }

    fn health_check(&self, handle: &DatabaseHandle) -> bool {
        handle
            .with_conn::<odbc_api::Connection<'static>, bool>(|conn| {
                conn.execute("SELECT 1 FROM SYSIBM.SYSDUMMY1", (), None).is_ok()
            })
            .unwrap_or(false)
    }

    fn execute_query(&self, handle: &DatabaseHandle, req: &QueryRequest) -> QueryResult {
        let start = Instant::now();
        let outcome = handle.with_conn::<odbc_api::Connection<'static>, Result<QueryResult>>(
            |conn| run_db2_statement(conn, &req.sql_template),
        );

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
        _handle: &DatabaseHandle,
        isolation: IsolationLevel,
    ) -> Result<Transaction> {
        // odbc-api manages autocommit per-connection; a full implementation
        // would toggle it here. Tracked as future work for DB2 transactions.
        Ok(Transaction {
            transaction_id: 1,
            isolation_level: isolation,
            started_at: chrono::Utc::now(),
            active: true,
        })
    }

    fn commit_transaction(&self, handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        handle
            .with_conn::<odbc_api::Connection<'static>, bool>(|conn| conn.commit().is_ok())
            .unwrap_or(false)
    }

    fn rollback_transaction(&self, handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        handle
            .with_conn::<odbc_api::Connection<'static>, bool>(|conn| conn.rollback().is_ok())
            .unwrap_or(false)
    }

    fn prepare(
        &self,
        handle: &DatabaseHandle,
        name: &str,
        sql: &str,
        _param_types: &[String],
    ) -> Result<String> {
        handle.with_conn::<odbc_api::Connection<'static>, Result<String>>(|conn| {
            conn.prepare(sql)
                .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
            Ok(name.to_string())
        })?
    }

    fn escape_string(&self, _handle: &DatabaseHandle, input: &str) -> String {
        input.replace('\'', "''")
    }
}

#[cfg(feature = "db2")]
fn run_db2_statement(
    conn: &mut odbc_api::Connection<'static>,
    sql: &str,
) -> Result<QueryResult> {
    use odbc_api::buffers::TextRowSet;
    use odbc_api::ResultSetMetadata;

    let trimmed = sql.trim_start().to_ascii_lowercase();
    if trimmed.starts_with("select") {
        match conn
            .execute(sql, (), None)
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?
        {
            Some(mut cursor) => {
                let column_count = cursor
                    .num_result_cols()
                    .map_err(|e| DbQueueError::QueryError(e.to_string()))? as u64;
                let mut buffers = TextRowSet::for_cursor(64, &mut cursor, Some(4096))
                    .map_err(|e| DbQueueError::QueryError(e.to_string()))?;
                let mut row_set_cursor = cursor
                    .bind_buffer(&mut buffers)
                    .map_err(|e| DbQueueError::QueryError(e.to_string()))?;

                let mut out = Vec::new();
                while let Some(batch) = row_set_cursor
                    .fetch()
                    .map_err(|e| DbQueueError::QueryError(e.to_string()))?
                {
                    for row_idx in 0..batch.num_rows() {
                        let mut obj = serde_json::Map::new();
                        for col_idx in 0..column_count as usize {
                            let value = batch
                                .at_as_str(col_idx, row_idx)
                                .ok()
                                .flatten()
                                .unwrap_or("")
                                .to_string();
                            obj.insert(format!("col{col_idx}"), serde_json::Value::from(value));
                        }
                        out.push(serde_json::Value::Object(obj));
                    }
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
            }
            None => Ok(QueryResult {
                success: true,
                data_json: "[]".to_string(),
                row_count: 0,
                column_count: 0,
                affected_rows: 0,
                error_message: None,
                execution_time_ms: 0,
            }),
        }
    } else {
        let affected = conn
            .execute(sql, (), None)
            .map_err(|e| DbQueueError::QueryError(e.to_string()))?
            .and_then(|mut cursor| cursor.row_count().ok().flatten())
            .unwrap_or(0);
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
