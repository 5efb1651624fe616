//! Durable task queue
//!
//! Queue operations over the `queue` table: enqueue, peek-next, and
//! completion/failure reporting. There is no in-progress state and no
//! lease; a task stays eligible until it is either marked done or has
//! failed `RETRY_LIMIT` times, so a crash between `next_task` and
//! `mark_handled` simply redelivers it (at-least-once).
//!
//! Dispatch order is strict priority-class first (high before normal),
//! then creation order within a class. The two classes are queried
//! independently on purpose: with exactly two fixed tiers the policy
//! stays explicit and cheap to reason about.

use rusqlite::{params, OptionalExtension};

use crate::models::{PendingTask, TaskPriority};
use crate::storage::error::{StoreError, StoreResult};
use crate::store::Store;

/// Failures after which a task is permanently skipped by dispatch.
///
/// Exhaustion is derived from the fail counter; no separate status is
/// stored, and the row is retained for audit.
pub const RETRY_LIMIT: i64 = 3;

impl Store {
    /// Add a task to the queue.
    ///
    /// The new row starts out not-done with zero failures and gets a
    /// fresh id and an insert-time timestamp. `action` identifies what
    /// the task does and `options` carries its arguments; both are
    /// opaque to the queue. An empty `action` is rejected.
    pub fn enqueue(
        &self,
        action: &str,
        priority: TaskPriority,
        options: &str,
    ) -> StoreResult<()> {
        if action.trim().is_empty() {
            return Err(StoreError::invalid("task action must not be empty"));
        }

        self.connection().execute(
            "INSERT INTO queue(priority, action, options) VALUES (?1, ?2, ?3)",
            params![priority.as_i64(), action, options],
        )?;
        Ok(())
    }

    /// Fetch the next eligible task, if any.
    ///
    /// High-priority tasks are tried first; if none are eligible and
    /// `only_high_priority` is false, the normal tier is tried. Within a
    /// tier the oldest task (smallest id) wins. Read-only: the returned
    /// snapshot does not mark the task as taken.
    pub fn next_task(&self, only_high_priority: bool) -> StoreResult<Option<PendingTask>> {
        if let Some(task) = self.next_in_class(TaskPriority::High)? {
            return Ok(Some(task));
        }

        if only_high_priority {
            return Ok(None);
        }

        self.next_in_class(TaskPriority::Normal)
    }

    fn next_in_class(&self, priority: TaskPriority) -> StoreResult<Option<PendingTask>> {
        let task = self
            .connection()
            .query_row(
                "SELECT id, action, options, fails FROM queue
                 WHERE done = 0 AND fails < ?1 AND priority = ?2
                 ORDER BY id LIMIT 1",
                params![RETRY_LIMIT, priority.as_i64()],
                |row| {
                    Ok(PendingTask {
                        id: row.get(0)?,
                        priority,
                        action: row.get(1)?,
                        options: row.get(2)?,
                        fails: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(task)
    }

    /// Number of eligible tasks, optionally restricted to high priority.
    ///
    /// Same eligibility predicate as `next_task`; meant for backpressure
    /// and observability on the caller's side.
    pub fn pending_count(&self, only_high_priority: bool) -> StoreResult<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM queue WHERE done = 0 AND fails < ?1");
        if only_high_priority {
            sql.push_str(" AND priority = 1");
        }

        let count: i64 = self
            .connection()
            .query_row(&sql, params![RETRY_LIMIT], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Report the outcome of a task.
    ///
    /// On success, sets `done`; calling it again on an already-done task
    /// is a no-op, not an error. On failure, bumps the fail counter as a
    /// single atomic update. After `RETRY_LIMIT` recorded failures the
    /// task is permanently skipped by dispatch, but further failure
    /// reports still count.
    ///
    /// A negative or unknown `id` fails with `InvalidArgument` without
    /// mutating any row.
    pub fn mark_handled(&self, id: i64, failed: bool) -> StoreResult<()> {
        if id < 0 {
            return Err(StoreError::invalid(format!(
                "task id must be non-negative, got {}",
                id
            )));
        }

        let changed = if failed {
            self.connection().execute(
                "UPDATE queue SET fails = fails + 1 WHERE id = ?1",
                params![id],
            )?
        } else {
            self.connection()
                .execute("UPDATE queue SET done = 1 WHERE id = ?1", params![id])?
        };

        if changed == 0 {
            return Err(StoreError::invalid(format!("no task with id {}", id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails_of(store: &Store, id: i64) -> i64 {
        store
            .connection()
            .query_row("SELECT fails FROM queue WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn test_priority_then_fifo_order() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("a", TaskPriority::Normal, "").unwrap();
        store.enqueue("b", TaskPriority::High, "").unwrap();
        store.enqueue("c", TaskPriority::High, "").unwrap();

        let b = store.next_task(false).unwrap().unwrap();
        assert_eq!(b.action, "b");
        assert_eq!(b.priority, TaskPriority::High);
        store.mark_handled(b.id, false).unwrap();

        let c = store.next_task(false).unwrap().unwrap();
        assert_eq!(c.action, "c");
        store.mark_handled(c.id, false).unwrap();

        let a = store.next_task(false).unwrap().unwrap();
        assert_eq!(a.action, "a");
        assert_eq!(a.priority, TaskPriority::Normal);
        store.mark_handled(a.id, false).unwrap();

        assert!(store.next_task(false).unwrap().is_none());
    }

    #[test]
    fn test_next_task_is_read_only() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("measure", TaskPriority::Normal, "").unwrap();

        // peeking twice returns the same task: nothing marks it taken
        let first = store.next_task(false).unwrap().unwrap();
        let second = store.next_task(false).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_only_high_priority() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("normal", TaskPriority::Normal, "").unwrap();

        assert!(store.next_task(true).unwrap().is_none());
        assert_eq!(store.pending_count(true).unwrap(), 0);

        store.enqueue("urgent", TaskPriority::High, "").unwrap();
        assert_eq!(store.next_task(true).unwrap().unwrap().action, "urgent");
        assert_eq!(store.pending_count(true).unwrap(), 1);
    }

    #[test]
    fn test_retry_exhaustion() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("flaky", TaskPriority::Normal, "").unwrap();
        let id = store.next_task(false).unwrap().unwrap().id;

        for expected in 1..=RETRY_LIMIT {
            store.mark_handled(id, true).unwrap();
            assert_eq!(fails_of(&store, id), expected);
        }

        // exhausted: never dispatched again, but the row is retained
        assert!(store.next_task(false).unwrap().is_none());
        assert_eq!(store.pending_count(false).unwrap(), 0);

        // a fourth failure report still succeeds without resurrecting it
        store.mark_handled(id, true).unwrap();
        assert_eq!(fails_of(&store, id), RETRY_LIMIT + 1);
        assert!(store.next_task(false).unwrap().is_none());
    }

    #[test]
    fn test_failed_task_redelivered_until_exhausted() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("flaky", TaskPriority::Normal, "").unwrap();

        let id = store.next_task(false).unwrap().unwrap().id;
        store.mark_handled(id, true).unwrap();

        let again = store.next_task(false).unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.fails, 1);
    }

    #[test]
    fn test_mark_done_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("once", TaskPriority::Normal, "").unwrap();
        let id = store.next_task(false).unwrap().unwrap().id;

        store.mark_handled(id, false).unwrap();
        store.mark_handled(id, false).unwrap();

        let done: i64 = store
            .connection()
            .query_row("SELECT done FROM queue WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(done, 1);
    }

    #[test]
    fn test_mark_handled_invalid_id() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue("task", TaskPriority::Normal, "").unwrap();

        let err = store.mark_handled(-1, false).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));

        let err = store.mark_handled(9999, true).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));

        // no row was mutated
        assert_eq!(store.pending_count(false).unwrap(), 1);
        let task = store.next_task(false).unwrap().unwrap();
        assert_eq!(task.fails, 0);
    }

    #[test]
    fn test_enqueue_rejects_empty_action() {
        let store = Store::open_in_memory().unwrap();
        let err = store.enqueue("  ", TaskPriority::Normal, "").unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));
        assert_eq!(store.pending_count(false).unwrap(), 0);
    }

    #[test]
    fn test_empty_queue_returns_no_task() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.next_task(false).unwrap().is_none());
        assert!(store.next_task(true).unwrap().is_none());
    }

    #[test]
    fn test_pending_count_matches_reference_model() {
        let store = Store::open_in_memory().unwrap();

        // reference model: (id, done, fails)
        let mut model: Vec<(i64, bool, i64)> = Vec::new();
        for i in 0..6 {
            let priority = if i % 2 == 0 {
                TaskPriority::High
            } else {
                TaskPriority::Normal
            };
            store.enqueue(&format!("task-{}", i), priority, "").unwrap();
            model.push((i + 1, false, 0));
        }

        // mix of outcomes: done, one failure, exhausted
        store.mark_handled(1, false).unwrap();
        model[0].1 = true;
        store.mark_handled(2, true).unwrap();
        model[1].2 += 1;
        for _ in 0..3 {
            store.mark_handled(3, true).unwrap();
            model[2].2 += 1;
        }

        let expected = model
            .iter()
            .filter(|(_, done, fails)| !done && *fails < RETRY_LIMIT)
            .count() as u64;
        assert_eq!(store.pending_count(false).unwrap(), expected);
    }

    #[test]
    fn test_queue_survives_reopen() {
        use crate::storage::schema::{create_store, Table};
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("station.db");
        create_store(&path, &Table::ALL, true, None).unwrap();

        {
            let store = Store::open(&path).unwrap();
            store.enqueue("persisted", TaskPriority::High, "arg=1").unwrap();
        }

        // crash between next_task and mark_handled: task is redelivered
        let store = Store::open(&path).unwrap();
        let task = store.next_task(false).unwrap().unwrap();
        assert_eq!(task.action, "persisted");
        assert_eq!(task.options.as_deref(), Some("arg=1"));
    }
}
