//! In-memory engine used by this crate's own test suite and exported for
//! downstream integration tests, per the "dependency-injected engine trait"
//! test strategy: no native driver library or network socket is ever
//! touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::connstring::{ConnectionInfo, EngineKind};
use crate::engine::{DatabaseHandle, Engine};
use crate::error::{DbQueueError, Result};
use crate::types::{IsolationLevel, QueryRequest, QueryResult, Transaction};

struct MockConnection {
    id: u64,
}

/// Canned responses keyed by exact SQL text, plus controls for simulating a
/// disconnect or a connect failure from test code.
pub struct MockEngine {
    responses: Mutex<HashMap<String, QueryResult>>,
    healthy: AtomicBool,
    fail_connect: AtomicBool,
    next_conn_id: AtomicU64,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            fail_connect: AtomicBool::new(false),
            next_conn_id: AtomicU64::new(1),
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the exact result to return the next time `execute_query` is
    /// called with this SQL text (used to script bootstrap result JSON and
    /// ordinary query responses alike).
    pub fn set_response(&self, sql: impl Into<String>, result: QueryResult) {
        self.responses.lock().unwrap().insert(sql.into(), result);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

impl Engine for MockEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn connect(&self, _info: &ConnectionInfo) -> Result<DatabaseHandle> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(DbQueueError::ConnectError("mock connect failure injected".into()));
        }
        let id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        Ok(DatabaseHandle::new(MockConnection { id }))
    }

    fn disconnect(&self, _handle: &DatabaseHandle) {}

    fn health_check(&self, _handle: &DatabaseHandle) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn execute_query(&self, _handle: &DatabaseHandle, req: &QueryRequest) -> QueryResult {
        let responses = self.responses.lock().unwrap();
        match responses.get(&req.sql_template) {
            Some(result) => result.clone(),
            None if req.sql_template.trim().eq_ignore_ascii_case("select 1") => QueryResult {
                success: true,
                data_json: "[{\"col1\":1}]".to_string(),
                row_count: 1,
                column_count: 1,
                affected_rows: 0,
                error_message: None,
                execution_time_ms: 0,
            },
            None => QueryResult::failure(format!("no mock response registered for: {}", req.sql_template)),
        }
    }

    fn begin_transaction(
        &self,
        _handle: &DatabaseHandle,
        isolation: IsolationLevel,
    ) -> Result<Transaction> {
        Ok(Transaction {
            transaction_id: 1,
            isolation_level: isolation,
            started_at: chrono::Utc::now(),
            active: true,
        })
    }

    fn commit_transaction(&self, _handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        true
    }

    fn rollback_transaction(&self, _handle: &DatabaseHandle, _tx: &Transaction) -> bool {
        true
    }

    fn prepare(
        &self,
        _handle: &DatabaseHandle,
        name: &str,
        _sql: &str,
        _param_types: &[String],
    ) -> Result<String> {
        Ok(name.to_string())
    }

    fn escape_string(&self, _handle: &DatabaseHandle, input: &str) -> String {
        input.replace('\'', "''")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connstring::parse;

    #[test]
    fn mock_connect_can_be_forced_to_fail() {
        let engine = MockEngine::new();
        let info = parse("sqlite://:memory:").unwrap();
        assert!(engine.connect(&info).is_ok());

        engine.set_fail_connect(true);
        assert!(engine.connect(&info).is_err());
    }

    #[test]
    fn unregistered_sql_yields_failed_result() {
        let engine = MockEngine::new();
        let info = parse("sqlite://:memory:").unwrap();
        let handle = engine.connect(&info).unwrap();
        let result = engine.execute_query(&handle, &QueryRequest::new("q1", "SELECT * FROM x"));
        assert!(!result.success);
    }
}
