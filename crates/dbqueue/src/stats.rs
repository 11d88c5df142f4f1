//! Human-readable rendering for `DatabaseQueueManager::get_stats`. Kept as a
//! plain string rather than a structured type because nothing downstream
//! parses it back — it's meant for an operator's terminal or a log line.

use std::sync::Arc;

use crate::database_queue::DatabaseQueue;

pub fn render(databases: &[Arc<DatabaseQueue>]) -> String {
    let mut out = String::new();
    for db in databases {
        render_one(&mut out, db, 0);
        for child in db.children_lock.lock().unwrap().iter() {
            render_one(&mut out, child, 1);
        }
    }
    out
}

fn render_one(out: &mut String, db: &Arc<DatabaseQueue>, indent: usize) {
    let pad = "  ".repeat(indent);
    out.push_str(&format!(
        "{pad}{name} [{class}#{num}] depth={depth} connected={conn} bootstrapped={boot} migration(loaded={loaded},applied={applied})\n",
        pad = pad,
        name = db.name,
        class = db.queue_class.as_str(),
        num = db.queue_number,
        depth = db.depth(),
        conn = db.is_connected(),
        boot = db.bootstrap_completed(),
        loaded = db.latest_loaded_migration(),
        applied = db.latest_applied_migration(),
    ));
}
