//! Bootstrap and heartbeat state machines, plus child-queue lifecycle
//! management. These are free functions rather than `DatabaseQueue` methods
//! because they only ever run from inside the Lead's own worker thread (or,
//! for child-queue management, from a caller holding an `Arc` to the Lead) —
//! keeping them out of the inherent impl makes that call boundary explicit.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;

use crate::connstring;
use crate::database_queue::DatabaseQueue;
use crate::logsink::LogLevel;
use crate::types::{QueryCacheEntry, QueueClass, QueryRequest};

/// Used when `add_database` was not given an explicit bootstrap query.
pub const DEFAULT_BOOTSTRAP_QUERY: &str = "SELECT * FROM __dbqueue_bootstrap";

/// Runs once when the Lead's worker thread starts: parse → connect →
/// bootstrap-query → populate QTC/migration state → signal
/// `bootstrap_completed`. Always leaves `bootstrap_completed == true` once a
/// connection attempt has *completed* (succeeded, or failed after
/// connecting); only a failure before the connection is established leaves
/// it false forever.
pub(crate) fn run_bootstrap(lead: &Arc<DatabaseQueue>) {
    let now = Utc::now();
    *lead.last_heartbeat.lock().unwrap() = now;
    *lead.last_connection_attempt.lock().unwrap() = now;

    let info = match connstring::parse(lead.connection_string()) {
        Ok(info) => info,
        Err(e) => {
            lead.log(
                format!("bootstrap: failed to parse connection string: {e}"),
                LogLevel::Error,
            );
            return; // bootstrap_completed stays false forever
        }
    };

    let handle = match lead.engine.connect(&info) {
        Ok(handle) => handle,
        Err(e) => {
            lead.log(format!("bootstrap: connect failed: {e}"), LogLevel::Error);
            return; // before-connection failure: bootstrap_completed stays false
        }
    };

    *lead.connection_lock.lock().unwrap() = Some(handle);
    lead.is_connected.store(true, Ordering::SeqCst);
    lead.log(
        format!("connected to {}", lead.redacted_connection_string()),
        LogLevel::Info,
    );

    let bootstrap_sql = lead
        .bootstrap_query
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BOOTSTRAP_QUERY.to_string());

    let result = {
        let conn_guard = lead.connection_lock.lock().unwrap();
        let handle = conn_guard.as_ref().expect("just stored above");
        lead.engine
            .execute_query(handle, &QueryRequest::new("__bootstrap__", bootstrap_sql))
    };

    if result.success {
        apply_bootstrap_result(lead, &result.data_json);
    } else {
        lead.log(
            format!(
                "bootstrap query failed: {}",
                result.error_message.as_deref().unwrap_or("unknown error")
            ),
            LogLevel::Warn,
        );
        lead.empty_database.store(true, Ordering::SeqCst);
    }

    let mut completed = lead.bootstrap_lock.lock().unwrap();
    *completed = true;
    lead.bootstrap_cond.notify_all();
}

fn apply_bootstrap_result(lead: &Arc<DatabaseQueue>, data_json: &str) {
    let rows: Vec<serde_json::Value> = match serde_json::from_str(data_json) {
        Ok(serde_json::Value::Array(rows)) => rows,
        _ => Vec::new(),
    };

    if rows.is_empty() {
        lead.empty_database.store(true, Ordering::SeqCst);
        lead.latest_loaded_migration.store(0, Ordering::SeqCst);
        lead.latest_applied_migration.store(0, Ordering::SeqCst);
        return;
    }

    for row in &rows {
        let Some(obj) = row.as_object() else { continue };
        let row_type = obj.get("type").and_then(|v| v.as_i64());
        let row_ref = obj.get("ref").and_then(|v| v.as_i64()).unwrap_or(0);

        match row_type {
            Some(1000) => {
                bump_max(&lead.latest_loaded_migration, row_ref);
            }
            Some(1003) => {
                bump_max(&lead.latest_applied_migration, row_ref);
            }
            _ => {}
        }

        if let Some(query) = obj.get("query").and_then(|v| v.as_str()) {
            let queue_class = match obj.get("queue") {
                Some(serde_json::Value::Number(n)) => match n.as_i64() {
                    Some(0) => QueueClass::Slow,
                    Some(1) => QueueClass::Medium,
                    Some(2) => QueueClass::Fast,
                    Some(3) => QueueClass::Cache,
                    _ => QueueClass::Medium,
                },
                Some(serde_json::Value::String(s)) => QueueClass::select_type(Some(s)),
                _ => QueueClass::Medium,
            };

            let entry = QueryCacheEntry {
                query_ref: row_ref,
                query_type: row_type.unwrap_or(0),
                sql_template: query.to_string(),
                description: obj
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                queue_class,
                timeout_seconds: obj.get("timeout").and_then(|v| v.as_u64()).unwrap_or(30),
            };

            if !lead.query_cache.add_entry(entry) {
                lead.log(
                    format!("duplicate query_ref {row_ref} in bootstrap result, ignored"),
                    LogLevel::Warn,
                );
            }
        }
    }
}

fn bump_max(counter: &std::sync::atomic::AtomicI64, candidate: i64) {
    let mut current = counter.load(Ordering::SeqCst);
    while candidate > current {
        match counter.compare_exchange_weak(
            current,
            candidate,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

/// Runs on every semaphore timeout in the Lead's worker loop: reconnect if
/// disconnected, otherwise a cheap health check. Connection status
/// transitions are always logged with the connection string masked.
pub(crate) fn run_heartbeat_tick(lead: &Arc<DatabaseQueue>) {
    *lead.last_connection_attempt.lock().unwrap() = Utc::now();

    if !lead.is_connected.load(Ordering::SeqCst) {
        lead.log("heartbeat: attempting reconnect", LogLevel::Info);
        reconnect(lead);
        return;
    }

    let healthy = {
        let conn_guard = lead.connection_lock.lock().unwrap();
        match conn_guard.as_ref() {
            Some(handle) => lead.engine.health_check(handle),
            None => false,
        }
    };

    if healthy {
        *lead.last_heartbeat.lock().unwrap() = Utc::now();
    } else {
        lead.is_connected.store(false, Ordering::SeqCst);
        lead.log(
            format!(
                "heartbeat: health check failed for {}, marking disconnected",
                lead.redacted_connection_string()
            ),
            LogLevel::Warn,
        );
    }
}

fn reconnect(lead: &Arc<DatabaseQueue>) {
    let info = match connstring::parse(lead.connection_string()) {
        Ok(info) => info,
        Err(e) => {
            lead.log(format!("reconnect: parse failed: {e}"), LogLevel::Error);
            return;
        }
    };

    match lead.engine.connect(&info) {
        Ok(handle) => {
            *lead.connection_lock.lock().unwrap() = Some(handle);
            lead.is_connected.store(true, Ordering::SeqCst);
            lead.log(
                format!("reconnected to {}", lead.redacted_connection_string()),
                LogLevel::Info,
            );
        }
        Err(e) => {
            lead.log(format!("reconnect: connect failed: {e}"), LogLevel::Warn);
        }
    }
}

/// Create a non-Lead queue sharing `lead`'s connection, register it under
/// `children_lock`, and start its worker. Returns `None` (decrementing the
/// reservation it took) if `class` is already at `max_child_queues`.
pub fn spawn_child_queue(lead: &Arc<DatabaseQueue>, class: QueueClass) -> Option<Arc<DatabaseQueue>> {
    lead.child_queue_count.fetch_add(1, Ordering::SeqCst);

    let mut children = lead.children_lock.lock().unwrap();
    let count_in_class = children.iter().filter(|c| c.queue_class == class).count();
    if count_in_class >= lead.max_child_queues {
        lead.child_queue_count.fetch_sub(1, Ordering::SeqCst);
        return None;
    }

    let queue_number = lead.next_queue_number();
    let child = DatabaseQueue::new_child(lead, class, queue_number);
    DatabaseQueue::start_worker(&child);
    children.push(child.clone());
    Some(child)
}

/// Mark and join the first child of `class`; returns `false` without side
/// effects if none exists (already-terminated children are simply absent).
pub fn shutdown_child_queue(lead: &Arc<DatabaseQueue>, class: QueueClass) -> bool {
    let child = {
        let mut children = lead.children_lock.lock().unwrap();
        let pos = children.iter().position(|c| c.queue_class == class);
        match pos {
            Some(idx) => Some(children.remove(idx)),
            None => None,
        }
    };

    match child {
        Some(child) => {
            DatabaseQueue::shutdown(&child);
            lead.child_queue_count.fetch_sub(1, Ordering::SeqCst);
            true
        }
        None => false,
    }
}

/// No-op on a non-Lead queue or a Lead with zero children; otherwise checks
/// that the per-class cap is respected (a violation here would indicate a
/// bug in `spawn_child_queue`, since that's the only place counts change).
pub fn manage_child_queues(lead: &Arc<DatabaseQueue>) {
    if !lead.is_lead {
        return;
    }
    let children = lead.children_lock.lock().unwrap();
    if children.is_empty() {
        return;
    }

    for class in [QueueClass::Slow, QueueClass::Medium, QueueClass::Fast, QueueClass::Cache] {
        let count = children.iter().filter(|c| c.queue_class == class).count();
        if count > lead.max_child_queues {
            lead.log(
                format!(
                    "class {:?} has {count} children, exceeding max_child_queues {}",
                    class, lead.max_child_queues
                ),
                LogLevel::Warn,
            );
        }
    }
}
