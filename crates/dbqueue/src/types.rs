use chrono::{DateTime, Utc};

/// Routing hint attached to a submission; also the unit a worker queue is
/// specialized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueClass {
    Slow,
    Medium,
    Fast,
    Cache,
}

impl QueueClass {
    /// Exact literal strings mandated by the boundary-behavior tests: valid
    /// inputs map to `"slow"`/`"medium"`/`"fast"`/`"cache"`; this function
    /// itself cannot represent an invalid value (that's `queue_class_to_string`
    /// below, which accepts the raw tag).
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Slow => "slow",
            QueueClass::Medium => "medium",
            QueueClass::Fast => "fast",
            QueueClass::Cache => "cache",
        }
    }

    /// `select_type(None)` and `select_type("")` return MEDIUM. Matching is
    /// case-sensitive: `"SLOW"` does not match `Slow`.
    pub fn select_type(raw: Option<&str>) -> QueueClass {
        match raw {
            None => QueueClass::Medium,
            Some("") => QueueClass::Medium,
            Some("slow") => QueueClass::Slow,
            Some("medium") => QueueClass::Medium,
            Some("fast") => QueueClass::Fast,
            Some("cache") => QueueClass::Cache,
            Some(_) => QueueClass::Medium,
        }
    }
}

/// `database_queue_type_to_string` equivalent: accepts a raw, possibly
/// out-of-range tag (e.g., parsed from a wire format) and returns `"unknown"`
/// for anything that isn't one of the four valid tags.
pub fn queue_class_tag_to_string(tag: i32) -> &'static str {
    match tag {
        0 => "slow",
        1 => "medium",
        2 => "fast",
        3 => "cache",
        _ => "unknown",
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query_id: String,
    pub sql_template: String,
    pub parameter_json: String,
    pub queue_class_hint: QueueClass,
    pub submitted_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl QueryRequest {
    pub fn new(query_id: impl Into<String>, sql_template: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            sql_template: sql_template.into(),
            parameter_json: "{}".to_string(),
            queue_class_hint: QueueClass::Medium,
            submitted_at: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn with_queue_class(mut self, class: QueueClass) -> Self {
        self.queue_class_hint = class;
        self
    }

    pub fn with_parameters(mut self, parameter_json: impl Into<String>) -> Self {
        self.parameter_json = parameter_json.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub success: bool,
    pub data_json: String,
    pub row_count: u64,
    pub column_count: u64,
    pub affected_rows: u64,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data_json: "[]".to_string(),
            row_count: 0,
            column_count: 0,
            affected_rows: 0,
            error_message: Some(message.into()),
            execution_time_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Engine-private transaction handle. Nested transactions are not supported:
/// a handle may have at most one active `Transaction` at a time.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_id: u64,
    pub isolation_level: IsolationLevel,
    pub started_at: DateTime<Utc>,
    pub active: bool,
}

/// A single entry in the query-template cache. Immutable once inserted.
#[derive(Debug, Clone)]
pub struct QueryCacheEntry {
    pub query_ref: i64,
    pub query_type: i64,
    pub sql_template: String,
    pub description: String,
    pub queue_class: QueueClass,
    pub timeout_seconds: u64,
}
