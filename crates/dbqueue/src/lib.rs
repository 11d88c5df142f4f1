//! Multi-tenant database queue subsystem: one Lead queue per registered
//! database, spawning class-specialized child queues on demand, all driven
//! by blocking worker threads over a synchronous `Engine` trait object.
//!
//! The external surface is [`DatabaseQueueManager`]: register a database with
//! [`DatabaseQueueManager::add_database`], start its worker with
//! [`DatabaseQueueManager::start_database`], submit work with
//! [`DatabaseQueueManager::submit`], and collect the result with
//! [`DatabaseQueueManager::result_channel_take`].

mod cache;
mod connstring;
mod database_queue;
mod engine;
mod error;
mod lead;
mod logsink;
mod manager;
mod queue;
mod semaphore;
mod stats;
pub mod testing;
mod types;

pub use connstring::{
    parse as parse_connection_string, redact as redact_connection_string, ConnectionInfo,
    EngineKind, ParseError as ConnectionStringError,
};
pub use database_queue::DatabaseQueue;
pub use engine::{DatabaseHandle, Engine};
pub use error::{DbQueueError, Result};
pub use logsink::{default_log_sink, LogLevel, LogSink, SharedLogSink, TracingLogSink};
pub use manager::{system_destroy, system_init, DatabaseQueueManager, EngineTable, ManagerConfig};
pub use types::{
    queue_class_tag_to_string, IsolationLevel, QueryCacheEntry, QueryRequest, QueryResult,
    QueueClass, Transaction,
};

#[cfg(feature = "postgres")]
pub use engine::PostgresEngine;
#[cfg(feature = "mysql")]
pub use engine::MySqlEngine;
#[cfg(feature = "sqlite")]
pub use engine::SqliteEngine;
#[cfg(feature = "db2")]
pub use engine::Db2Engine;
