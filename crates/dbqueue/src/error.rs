use thiserror::Error;

/// The error taxonomy the core ever returns synchronously. `QueryError` never
/// surfaces as an `Err` out of `execute_query` — it is carried inside a
/// `QueryResult` instead (see [`crate::types::QueryResult`]).
#[derive(Debug, Error)]
pub enum DbQueueError {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("connect error: {0}")]
    ConnectError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("capacity error: {0}")]
    CapacityError(String),

    #[error("shutdown in progress")]
    ShutdownInProgress,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("connection string parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, DbQueueError>;
