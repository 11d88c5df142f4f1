mod db2;
mod mysql;
mod postgres;
mod sqlite;

pub use db2::Db2Engine;
pub use mysql::MySqlEngine;
pub use postgres::PostgresEngine;
pub use sqlite::SqliteEngine;

use std::any::Any;
use std::sync::Mutex;

use crate::connstring::{ConnectionInfo, EngineKind};
use crate::error::{DbQueueError, Result};
use crate::types::{IsolationLevel, QueryRequest, QueryResult, Transaction};

/// Opaque per-engine connection object. Owned exclusively by one queue at a
/// time (the Lead for bootstrap/heartbeat, a worker while it holds
/// `connection_lock`). The inner mutex exists because native driver client
/// objects (`postgres::Client`, `mysql::Conn`, ...) are not re-entrant; engine
/// implementations downcast the boxed value to their own connection type.
pub struct DatabaseHandle {
    inner: Mutex<Box<dyn Any + Send>>,
}

impl DatabaseHandle {
    pub fn new<T: Any + Send>(conn: T) -> Self {
        Self {
            inner: Mutex::new(Box::new(conn)),
        }
    }

    /// Run `f` with exclusive, type-checked access to the underlying native
    /// connection object. Returns `EngineUnavailable` if the handle was built
    /// by a different engine than the one calling in (a programming error in
    /// this crate, never a user-facing state).
    fn with_conn<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.inner.lock().unwrap();
        let conn = guard
            .downcast_mut::<T>()
            .ok_or_else(|| DbQueueError::EngineUnavailable("handle/engine type mismatch".into()))?;
        Ok(f(conn))
    }
}

/// Uniform, synchronous contract every engine implements. Dispatched through
/// `Arc<dyn Engine>`, injected at manager-construction time rather than
/// resolved by a global registry — this is what lets the crate's own tests
/// run against `MockEngine` without linking any native client library.
pub trait Engine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn connect(&self, info: &ConnectionInfo) -> Result<DatabaseHandle>;

    /// Idempotent, best-effort; errors are swallowed by design (disconnect is
    /// not on any caller's error path).
    fn disconnect(&self, handle: &DatabaseHandle);

    /// A cheap ping. Returns `false` instead of erroring so the heartbeat
    /// loop can treat any failure uniformly as "disconnected".
    fn health_check(&self, handle: &DatabaseHandle) -> bool;

    /// Never fails with `Err` for SQL-level problems — those come back as
    /// `QueryResult { success: false, .. }`. Fails only when the handle
    /// itself is unusable.
    fn execute_query(&self, handle: &DatabaseHandle, req: &QueryRequest) -> QueryResult;

    fn begin_transaction(
        &self,
        handle: &DatabaseHandle,
        isolation: IsolationLevel,
    ) -> Result<Transaction>;

    fn commit_transaction(&self, handle: &DatabaseHandle, tx: &Transaction) -> bool;

    fn rollback_transaction(&self, handle: &DatabaseHandle, tx: &Transaction) -> bool;

    fn prepare(
        &self,
        handle: &DatabaseHandle,
        name: &str,
        sql: &str,
        param_types: &[String],
    ) -> Result<String>;

    fn escape_string(&self, handle: &DatabaseHandle, input: &str) -> String;
}

/// Build the set of statically linked engines for the features enabled on
/// this build. Engine libraries may be absent (feature disabled); in that
/// case the corresponding slot in `EngineTable::resolve` yields
/// `EngineUnavailable` rather than a missing `Arc`.
pub(crate) fn measure_elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
