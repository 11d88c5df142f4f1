use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::QueryTemplateCache;
use crate::connstring;
use crate::engine::{DatabaseHandle, Engine};
use crate::lead;
use crate::logsink::{LogLevel, SharedLogSink};
use crate::manager::ResultRegistry;
use crate::queue::UnderlyingQueue;
use crate::types::{QueryCacheEntry, QueueClass};

/// Composite record for one queue — Lead or child. Every mutable field
/// lives behind the lock that protects it, named after the lock-order table
/// (`registry_lock > children_lock > bootstrap_lock > connection_lock >
/// queue_access_lock`).
pub struct DatabaseQueue {
    pub name: String,
    connection_string: String,
    pub is_lead: bool,
    pub queue_class: QueueClass,
    pub queue_number: u32,
    pub tags: Vec<String>,

    pub(crate) max_child_queues: usize,
    pub(crate) heartbeat_interval: Duration,

    pub(crate) last_heartbeat: Mutex<DateTime<Utc>>,
    pub(crate) last_connection_attempt: Mutex<DateTime<Utc>>,

    /// `connection_lock` — guards `persistent_connection` and `is_connected`.
    pub(crate) connection_lock: Mutex<Option<DatabaseHandle>>,
    pub(crate) is_connected: AtomicBool,

    /// `bootstrap_lock` + `bootstrap_cond` — guard `bootstrap_completed`.
    pub(crate) bootstrap_lock: Mutex<bool>,
    pub(crate) bootstrap_cond: Condvar,
    pub(crate) bootstrap_query: Option<String>,

    pub(crate) latest_loaded_migration: AtomicI64,
    pub(crate) latest_applied_migration: AtomicI64,
    pub(crate) empty_database: AtomicBool,

    pub(crate) query_cache: QueryTemplateCache,

    pub(crate) underlying: UnderlyingQueue,
    pub(crate) shutdown_requested: AtomicBool,
    worker_thread: Mutex<Option<JoinHandle<()>>>,
    worker_thread_started: AtomicBool,

    /// `children_lock` — Lead only; empty Vec on a child.
    pub(crate) children_lock: Mutex<Vec<Arc<DatabaseQueue>>>,
    pub(crate) child_queue_count: AtomicU32,
    next_queue_number: AtomicU32,

    /// Non-owning reference back to the Lead. `None` on the Lead itself.
    pub(crate) lead: Option<Weak<DatabaseQueue>>,

    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) log_sink: SharedLogSink,
    pub(crate) results: Arc<ResultRegistry>,
    pub(crate) max_prepare_params: usize,
}

impl DatabaseQueue {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_lead(
        name: String,
        connection_string: String,
        bootstrap_query: Option<String>,
        heartbeat_interval: Duration,
        max_child_queues: usize,
        max_prepare_params: usize,
        engine: Arc<dyn Engine>,
        log_sink: SharedLogSink,
        results: Arc<ResultRegistry>,
    ) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            name,
            connection_string,
            is_lead: true,
            queue_class: QueueClass::Medium,
            queue_number: 0,
            tags: Vec::new(),
            max_child_queues,
            heartbeat_interval,
            last_heartbeat: Mutex::new(now),
            last_connection_attempt: Mutex::new(now),
            connection_lock: Mutex::new(None),
            is_connected: AtomicBool::new(false),
            bootstrap_lock: Mutex::new(false),
            bootstrap_cond: Condvar::new(),
            bootstrap_query,
            latest_loaded_migration: AtomicI64::new(0),
            latest_applied_migration: AtomicI64::new(0),
            empty_database: AtomicBool::new(false),
            query_cache: QueryTemplateCache::new(),
            underlying: UnderlyingQueue::new(),
            shutdown_requested: AtomicBool::new(false),
            worker_thread: Mutex::new(None),
            worker_thread_started: AtomicBool::new(false),
            children_lock: Mutex::new(Vec::new()),
            child_queue_count: AtomicU32::new(0),
            next_queue_number: AtomicU32::new(1),
            lead: None,
            engine,
            log_sink,
            results,
            max_prepare_params,
        })
    }

    pub(crate) fn new_child(lead: &Arc<DatabaseQueue>, class: QueueClass, queue_number: u32) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            name: lead.name.clone(),
            connection_string: lead.connection_string.clone(),
            is_lead: false,
            queue_class: class,
            queue_number,
            tags: Vec::new(),
            max_child_queues: 0,
            heartbeat_interval: lead.heartbeat_interval,
            last_heartbeat: Mutex::new(now),
            last_connection_attempt: Mutex::new(now),
            connection_lock: Mutex::new(None),
            is_connected: AtomicBool::new(false),
            bootstrap_lock: Mutex::new(false),
            bootstrap_cond: Condvar::new(),
            bootstrap_query: None,
            latest_loaded_migration: AtomicI64::new(0),
            latest_applied_migration: AtomicI64::new(0),
            empty_database: AtomicBool::new(false),
            query_cache: QueryTemplateCache::new(),
            underlying: UnderlyingQueue::new(),
            shutdown_requested: AtomicBool::new(false),
            worker_thread: Mutex::new(None),
            worker_thread_started: AtomicBool::new(false),
            children_lock: Mutex::new(Vec::new()),
            child_queue_count: AtomicU32::new(0),
            next_queue_number: AtomicU32::new(0),
            lead: Some(Arc::downgrade(lead)),
            engine: lead.engine.clone(),
            log_sink: lead.log_sink.clone(),
            results: lead.results.clone(),
            max_prepare_params: lead.max_prepare_params,
        })
    }

    pub fn redacted_connection_string(&self) -> String {
        connstring::redact(&self.connection_string)
    }

    pub(crate) fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn depth(&self) -> usize {
        self.underlying.depth()
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    pub fn bootstrap_completed(&self) -> bool {
        *self.bootstrap_lock.lock().unwrap()
    }

    pub fn empty_database(&self) -> bool {
        self.empty_database.load(Ordering::SeqCst)
    }

    pub fn latest_loaded_migration(&self) -> i64 {
        self.latest_loaded_migration.load(Ordering::SeqCst)
    }

    pub fn latest_applied_migration(&self) -> i64 {
        self.latest_applied_migration.load(Ordering::SeqCst)
    }

    /// Number of query templates the bootstrap query has loaded into this
    /// queue's cache.
    pub fn query_cache_entry_count(&self) -> usize {
        self.query_cache.entry_count()
    }

    /// Look up a cached query template by its `query_ref`, the same lookup
    /// `submit` performs when a request's SQL is a bare integer.
    pub fn query_cache_lookup(&self, query_ref: i64) -> Option<QueryCacheEntry> {
        self.query_cache.lookup(query_ref)
    }

    pub(crate) fn log(&self, message: impl AsRef<str>, priority: LogLevel) {
        self.log_sink.log(&self.name, message.as_ref(), priority);
    }

    /// Resolve the Lead for this queue: itself if it is one, otherwise the
    /// upgraded back-reference. Panics only if the Lead has already been
    /// dropped while a child is still alive, which the manager's shutdown
    /// ordering (children destroyed before the Lead's connection) prevents.
    pub(crate) fn lead_of(self_arc: &Arc<DatabaseQueue>) -> Arc<DatabaseQueue> {
        if self_arc.is_lead {
            self_arc.clone()
        } else {
            self_arc
                .lead
                .as_ref()
                .expect("child queue without a lead reference")
                .upgrade()
                .expect("lead dropped before child")
        }
    }

    pub fn enqueue(self_arc: &Arc<DatabaseQueue>, req: crate::types::QueryRequest) -> bool {
        if self_arc.shutdown_requested.load(Ordering::SeqCst) {
            return false;
        }
        self_arc.underlying.enqueue(req)
    }

    /// `wait_for_initial_connection`: non-Lead queues return true
    /// immediately; a Lead waits on `bootstrap_cond` up to `timeout`.
    pub fn wait_ready(self_arc: &Arc<DatabaseQueue>, timeout: Duration) -> bool {
        if !self_arc.is_lead {
            return true;
        }
        let guard = self_arc.bootstrap_lock.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = self_arc
            .bootstrap_cond
            .wait_timeout(guard, timeout)
            .unwrap();
        *guard
    }

    /// Spawn the worker thread and transition out of the `created` state.
    /// Idempotent: a second call is a no-op.
    pub fn start_worker(self_arc: &Arc<DatabaseQueue>) {
        if self_arc
            .worker_thread_started
            .swap(true, Ordering::SeqCst)
        {
            return;
        }
        let queue = self_arc.clone();
        let handle = std::thread::spawn(move || run_worker_loop(queue));
        *self_arc.worker_thread.lock().unwrap() = Some(handle);
    }

    /// Set `shutdown_requested`, wake the worker, and join it. Idempotent.
    pub fn shutdown(self_arc: &Arc<DatabaseQueue>) {
        if self_arc.shutdown_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        self_arc.underlying.request_shutdown(1);

        // Children are shut down before this queue releases its own engine
        // handle, so a child never outlives its Lead's connection.
        let children: Vec<Arc<DatabaseQueue>> = {
            let mut guard = self_arc.children_lock.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        for child in &children {
            DatabaseQueue::shutdown(child);
        }

        if let Some(handle) = self_arc.worker_thread.lock().unwrap().take() {
            let _ = handle.join();
        }

        let mut conn = self_arc.connection_lock.lock().unwrap();
        if let Some(handle) = conn.take() {
            self_arc.engine.disconnect(&handle);
        }
        self_arc.is_connected.store(false, Ordering::SeqCst);
    }

    pub(crate) fn next_queue_number(&self) -> u32 {
        self.next_queue_number.fetch_add(1, Ordering::SeqCst)
    }
}

/// Shared worker loop body. Lead queues additionally run bootstrap once on
/// entry and a heartbeat tick on every semaphore timeout; child queues simply
/// drain requests once the Lead's bootstrap has completed.
fn run_worker_loop(queue: Arc<DatabaseQueue>) {
    if queue.is_lead {
        lead::run_bootstrap(&queue);
    }

    loop {
        if queue.shutdown_requested.load(Ordering::SeqCst) {
            return;
        }

        match queue.underlying.dequeue(queue.heartbeat_interval) {
            None => {
                if queue.shutdown_requested.load(Ordering::SeqCst) {
                    return;
                }
                if queue.is_lead {
                    lead::run_heartbeat_tick(&queue);
                }
            }
            Some(req) => {
                let lead = DatabaseQueue::lead_of(&queue);
                if !lead.bootstrap_completed() {
                    // Dependent children may not execute until the Lead's
                    // bootstrap has landed; requeue and back off briefly
                    // rather than busy-spin.
                    queue.underlying.requeue_front_wait(req);
                    std::thread::sleep(Duration::from_millis(50));
                    continue;
                }
                process_request(&queue, &lead, req);
            }
        }
    }
}

fn process_request(
    queue: &Arc<DatabaseQueue>,
    lead: &Arc<DatabaseQueue>,
    req: crate::types::QueryRequest,
) {
    let sql = resolve_template(lead, &req.sql_template);
    let resolved = crate::types::QueryRequest {
        sql_template: sql,
        ..req.clone()
    };

    let result = {
        let conn_guard = lead.connection_lock.lock().unwrap();
        match conn_guard.as_ref() {
            Some(handle) => queue.engine.execute_query(handle, &resolved),
            None => crate::types::QueryResult::failure("no active connection"),
        }
    };

    queue.results.publish(&req.query_id, result);
}

/// If `sql_template` is a bare integer matching a QTC `query_ref`, substitute
/// the cached template; otherwise treat it as literal SQL.
fn resolve_template(lead: &Arc<DatabaseQueue>, sql_template: &str) -> String {
    if let Ok(query_ref) = sql_template.trim().parse::<i64>() {
        if let Some(entry) = lead.query_cache.lookup(query_ref) {
            return entry.sql_template;
        }
    }
    sql_template.to_string()
}
