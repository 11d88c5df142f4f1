use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::connstring::EngineKind;
use crate::database_queue::DatabaseQueue;
use crate::engine::Engine;
use crate::error::{DbQueueError, Result};
use crate::lead;
use crate::logsink::{default_log_sink, SharedLogSink};
use crate::types::{QueryRequest, QueryResult, QueueClass};

/// Tunables for a manager instance, constructed in code. This crate never
/// parses a YAML/env source into one of these — that stays with the
/// surrounding application's own configuration loader.
#[derive(Clone)]
pub struct ManagerConfig {
    pub max_databases: usize,
    pub default_heartbeat_interval: Duration,
    pub default_max_child_queues: usize,
    pub max_prepare_params: usize,
    pub result_channel_capacity: usize,
    pub log_sink: SharedLogSink,
}

impl ManagerConfig {
    pub fn new(max_databases: usize) -> Self {
        Self {
            max_databases,
            default_heartbeat_interval: Duration::from_secs(30),
            default_max_child_queues: 20,
            max_prepare_params: 100,
            result_channel_capacity: 256,
            log_sink: default_log_sink(),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.default_heartbeat_interval = interval;
        self
    }

    pub fn with_max_child_queues(mut self, n: usize) -> Self {
        self.default_max_child_queues = n;
        self
    }

    pub fn with_max_prepare_params(mut self, n: usize) -> Self {
        self.max_prepare_params = n;
        self
    }

    pub fn with_log_sink(mut self, sink: SharedLogSink) -> Self {
        self.log_sink = sink;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Dependency-injected engine set, resolved by `EngineKind` at connect time.
/// An engine absent from the table (feature disabled, or simply not
/// registered by the caller) makes `connect` fail with `EngineUnavailable`
/// rather than linking a driver the caller never asked for.
#[derive(Default, Clone)]
pub struct EngineTable {
    engines: HashMap<EngineKind, Arc<dyn Engine>>,
}

impl EngineTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, kind: EngineKind, engine: Arc<dyn Engine>) -> Self {
        self.engines.insert(kind, engine);
        self
    }

    pub fn resolve(&self, kind: EngineKind) -> Result<Arc<dyn Engine>> {
        self.engines
            .get(&kind)
            .cloned()
            .ok_or_else(|| DbQueueError::EngineUnavailable(format!("{} driver not registered", kind.as_str())))
    }
}

/// A single-slot correlation point for one `query_id`: the worker that
/// finishes the request publishes into it, `result_channel_take` waits on it.
struct ResultSlot {
    value: Mutex<Option<QueryResult>>,
    cond: Condvar,
}

impl ResultSlot {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            cond: Condvar::new(),
        }
    }
}

/// Shared by every queue (Lead and children) of a manager so that any
/// worker thread can publish a result regardless of which queue executed it.
#[derive(Default)]
pub struct ResultRegistry {
    slots: Mutex<HashMap<String, Arc<ResultSlot>>>,
}

impl ResultRegistry {
    fn new() -> Self {
        Self::default()
    }

    fn reserve(&self, query_id: &str) {
        self.slots
            .lock()
            .unwrap()
            .insert(query_id.to_string(), Arc::new(ResultSlot::new()));
    }

    pub(crate) fn publish(&self, query_id: &str, result: QueryResult) {
        let slot = self.slots.lock().unwrap().get(query_id).cloned();
        if let Some(slot) = slot {
            *slot.value.lock().unwrap() = Some(result);
            slot.cond.notify_all();
        }
    }

    fn take(&self, query_id: &str, timeout: Duration) -> Option<QueryResult> {
        let slot = self.slots.lock().unwrap().get(query_id).cloned()?;
        let mut value = slot.value.lock().unwrap();
        let deadline = Instant::now() + timeout;
        while value.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = slot.cond.wait_timeout(value, deadline - now).unwrap();
            value = guard;
            if result.timed_out() && value.is_none() {
                return None;
            }
        }
        let result = value.take();
        self.slots.lock().unwrap().remove(query_id);
        result
    }
}

/// Top-level registry of databases. Creates/destroys Lead queues and routes
/// submissions by database name. `databases` is a `Vec`, matching the
/// source's "linear scan under `registry_lock`" selection rule rather than
/// a hash map.
pub struct DatabaseQueueManager {
    config: ManagerConfig,
    engines: EngineTable,
    registry_lock: Mutex<Vec<Arc<DatabaseQueue>>>,
    initialized: AtomicBool,
    results: Arc<ResultRegistry>,
}

impl DatabaseQueueManager {
    /// `manager_create(max_databases)`, generalized to accept a full
    /// `ManagerConfig` plus the engine set to dispatch through.
    pub fn create(config: ManagerConfig, engines: EngineTable) -> Arc<Self> {
        Arc::new(Self {
            config,
            engines,
            registry_lock: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(true),
            results: Arc::new(ResultRegistry::new()),
        })
    }

    /// Convenience constructor matching the bare `manager_create(max_databases)`
    /// signature, for callers that don't need to tune anything else.
    pub fn create_with_max_databases(max_databases: usize, engines: EngineTable) -> Arc<Self> {
        Self::create(ManagerConfig::new(max_databases), engines)
    }

    pub fn max_databases(&self) -> usize {
        self.config.max_databases
    }

    /// Registers a new Lead queue; does not start its worker thread (call
    /// [`DatabaseQueueManager::start_database`] to do that). Fails if
    /// capacity would be exceeded or the name is already registered.
    pub fn add_database(
        &self,
        database_name: &str,
        connection_string: &str,
        bootstrap_query: Option<String>,
    ) -> bool {
        let mut registry = self.registry_lock.lock().unwrap();
        if registry.len() >= self.config.max_databases {
            self.config.log_sink.log(
                "manager",
                &format!("add_database({database_name}) rejected: manager at capacity"),
                crate::logsink::LogLevel::Warn,
            );
            return false;
        }
        if registry.iter().any(|q| q.name == database_name) {
            self.config.log_sink.log(
                "manager",
                &format!("add_database({database_name}) rejected: duplicate name"),
                crate::logsink::LogLevel::Warn,
            );
            return false;
        }

        let engine_kind = crate::connstring::parse(connection_string)
            .map(|info| info.engine)
            .unwrap_or(EngineKind::Sqlite);
        let engine = match self.engines.resolve(engine_kind) {
            Ok(engine) => engine,
            Err(e) => {
                self.config.log_sink.log(
                    "manager",
                    &format!("add_database({database_name}): {e}"),
                    crate::logsink::LogLevel::Error,
                );
                return false;
            }
        };

        let lead = DatabaseQueue::new_lead(
            database_name.to_string(),
            connection_string.to_string(),
            bootstrap_query,
            self.config.default_heartbeat_interval,
            self.config.default_max_child_queues,
            self.config.max_prepare_params,
            engine,
            self.config.log_sink.clone(),
            self.results.clone(),
        );

        registry.push(lead);
        true
    }

    /// Transition a registered Lead out of the `created` state by starting
    /// its worker thread (bootstrap runs immediately on that thread).
    pub fn start_database(&self, database_name: &str) -> bool {
        match self.get_database(database_name) {
            Some(lead) => {
                DatabaseQueue::start_worker(&lead);
                true
            }
            None => false,
        }
    }

    /// Linear scan under `registry_lock`.
    pub fn get_database(&self, database_name: &str) -> Option<Arc<DatabaseQueue>> {
        self.registry_lock
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.name == database_name)
            .cloned()
    }

    pub fn wait_ready(&self, database_name: &str, timeout: Duration) -> bool {
        match self.get_database(database_name) {
            Some(lead) => DatabaseQueue::wait_ready(&lead, timeout),
            None => false,
        }
    }

    pub fn spawn_child_queue(&self, database_name: &str, class: QueueClass) -> bool {
        match self.get_database(database_name) {
            Some(lead) => lead::spawn_child_queue(&lead, class).is_some(),
            None => false,
        }
    }

    pub fn shutdown_child_queue(&self, database_name: &str, class: QueueClass) -> bool {
        match self.get_database(database_name) {
            Some(lead) => lead::shutdown_child_queue(&lead, class),
            None => false,
        }
    }

    /// Resolves the Lead, selects a child queue per the routing algorithm,
    /// reserves a result slot, and enqueues. Non-strict by default: a
    /// submission ahead of bootstrap completion is still accepted, it simply
    /// waits in the child's queue (see the worker loop's requeue behavior).
    pub fn submit(&self, database_name: &str, request: QueryRequest) -> bool {
        self.submit_inner(database_name, request, false)
    }

    /// Strict-mode submit: fails outright if the Lead hasn't completed
    /// bootstrap yet, instead of accepting and waiting.
    pub fn submit_strict(&self, database_name: &str, request: QueryRequest) -> bool {
        self.submit_inner(database_name, request, true)
    }

    fn submit_inner(&self, database_name: &str, request: QueryRequest, strict: bool) -> bool {
        let Some(lead) = self.get_database(database_name) else {
            return false;
        };

        if strict && !lead.bootstrap_completed() {
            return false;
        }

        let target = select_child(&lead, request.queue_class_hint).unwrap_or_else(|| lead.clone());

        self.results.reserve(&request.query_id);
        DatabaseQueue::enqueue(&target, request)
    }

    pub fn result_channel_take(&self, query_id: &str, timeout: Duration) -> Option<QueryResult> {
        self.results.take(query_id, timeout)
    }

    pub fn get_stats(&self) -> String {
        let registry = self.registry_lock.lock().unwrap();
        crate::stats::render(&registry)
    }

    /// Joins every Lead's worker (which itself joins its children first).
    /// Idempotent: a second call is a no-op because each queue's own
    /// `shutdown` is idempotent.
    pub fn destroy(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        let databases: Vec<Arc<DatabaseQueue>> = {
            let mut registry = self.registry_lock.lock().unwrap();
            std::mem::take(&mut *registry)
        };
        for db in &databases {
            DatabaseQueue::shutdown(db);
        }
    }
}

/// Selection algorithm: among children matching the hint, the
/// shallowest queue wins ties broken by `queue_number`; failing that, any
/// MEDIUM child; failing that, `None` (caller routes to the Lead itself).
fn select_child(lead: &Arc<DatabaseQueue>, hint: QueueClass) -> Option<Arc<DatabaseQueue>> {
    let children = lead.children_lock.lock().unwrap();
    if children.is_empty() {
        return None;
    }

    let mut best: Option<&Arc<DatabaseQueue>> = None;
    for child in children.iter().filter(|c| c.queue_class == hint) {
        best = match best {
            None => Some(child),
            Some(current) => {
                if child.depth() < current.depth()
                    || (child.depth() == current.depth() && child.queue_number < current.queue_number)
                {
                    Some(child)
                } else {
                    Some(current)
                }
            }
        };
    }
    if let Some(best) = best {
        return Some(best.clone());
    }

    children
        .iter()
        .find(|c| c.queue_class == QueueClass::Medium)
        .cloned()
}

/// Process-wide singleton support, gated behind explicit init/destroy:
/// re-init without an intervening destroy is refused.
static SYSTEM_MANAGER: Mutex<Option<Arc<DatabaseQueueManager>>> = Mutex::new(None);

pub fn system_init(config: ManagerConfig, engines: EngineTable) -> Result<Arc<DatabaseQueueManager>> {
    let mut slot = SYSTEM_MANAGER.lock().unwrap();
    if slot.is_some() {
        return Err(DbQueueError::ConfigError(
            "system manager already initialized; call system_destroy first".into(),
        ));
    }
    let manager = DatabaseQueueManager::create(config, engines);
    *slot = Some(manager.clone());
    Ok(manager)
}

pub fn system_destroy() {
    let manager = SYSTEM_MANAGER.lock().unwrap().take();
    if let Some(manager) = manager {
        manager.destroy();
    }
}
