//! Export to a fresh database
//!
//! Copies selected tables (optionally restricted to an id range) into a
//! newly bootstrapped target file, for offloading measurement and log
//! history from the station. The target is created with only the
//! requested tables and without default settings, then filled over an
//! `ATTACH DATABASE` so rows never pass through the process.

use std::path::Path;

use rusqlite::params;
use tracing::warn;

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema::{create_store, Table};
use crate::store::Store;

/// One table selection for an export, with an optional id range.
///
/// Both bounds present selects ids in `start..=stop` (inclusive); `start`
/// alone selects everything after `start - 1`; `stop` alone selects
/// everything up to and including `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRange {
    /// Table to copy.
    pub table: Table,
    /// Lowest id to copy (inclusive).
    pub start: Option<i64>,
    /// Highest id to copy (inclusive).
    pub stop: Option<i64>,
}

impl ExportRange {
    /// Select a whole table.
    pub fn all(table: Table) -> Self {
        Self {
            table,
            start: None,
            stop: None,
        }
    }

    /// Select an id range of a table.
    pub fn between(table: Table, start: Option<i64>, stop: Option<i64>) -> Self {
        Self { table, start, stop }
    }
}

impl Store {
    /// Export the selected tables and ranges into a new database at
    /// `target`.
    ///
    /// The target must not exist yet; it is bootstrapped with exactly the
    /// selected tables. A selection whose bounds are out of order
    /// (`start >= stop`) is skipped with a warning rather than failing
    /// the export. An empty selection list is a no-op with a warning.
    pub fn export(&self, target: &Path, selections: &[ExportRange]) -> StoreResult<()> {
        if selections.is_empty() {
            warn!("export requested with no tables selected");
            return Ok(());
        }

        // validate every range before creating anything
        for selection in selections {
            validate_range(selection)?;
        }

        let tables: Vec<Table> = selections.iter().map(|s| s.table).collect();
        create_store(target, &tables, false, None)?;

        let target_str = target.to_str().ok_or_else(|| {
            StoreError::invalid(format!(
                "target path '{}' is not valid UTF-8",
                target.display()
            ))
        })?;

        self.connection().execute(
            "ATTACH DATABASE ?1 AS export_target",
            params![target_str],
        )?;

        let copied = self.copy_selections(selections);
        let detached = self
            .connection()
            .execute_batch("DETACH DATABASE export_target");

        copied?;
        detached?;
        Ok(())
    }

    fn copy_selections(&self, selections: &[ExportRange]) -> StoreResult<()> {
        for selection in selections {
            let table = selection.table.name();
            let mut sql = format!(
                "INSERT INTO export_target.{table} SELECT * FROM {table}",
                table = table
            );

            match (selection.start, selection.stop) {
                (Some(start), Some(stop)) => {
                    if start >= stop {
                        warn!(
                            table,
                            start,
                            stop,
                            "stop id is not higher than start id, skipping table"
                        );
                        continue;
                    }
                    sql.push_str(" WHERE id >= ?1 AND id <= ?2");
                    self.connection().execute(&sql, params![start, stop])?;
                }
                (Some(start), None) => {
                    sql.push_str(" WHERE id > ?1");
                    self.connection().execute(&sql, params![start - 1])?;
                }
                (None, Some(stop)) => {
                    sql.push_str(" WHERE id <= ?1");
                    self.connection().execute(&sql, params![stop])?;
                }
                (None, None) => {
                    self.connection().execute(&sql, [])?;
                }
            }
        }

        Ok(())
    }
}

fn validate_range(selection: &ExportRange) -> StoreResult<()> {
    if !selection.table.has_row_ids() && (selection.start.is_some() || selection.stop.is_some()) {
        return Err(StoreError::invalid(format!(
            "table '{}' has no id column, a range cannot be applied",
            selection.table
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogLevel, TaskPriority};
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn store_with_logs(n: usize) -> Store {
        let store = Store::open_in_memory().unwrap();
        for i in 1..=n {
            store
                .add_log(&format!("entry {}", i), "test", LogLevel::Info)
                .unwrap();
        }
        store
    }

    fn log_ids(path: &std::path::Path) -> Vec<i64> {
        let conn = Connection::open(path).unwrap();
        let ids = conn
            .prepare("SELECT id FROM logs ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        ids
    }

    #[test]
    fn test_export_full_table() {
        let store = store_with_logs(4);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        store
            .export(&target, &[ExportRange::all(Table::Logs)])
            .unwrap();

        assert_eq!(log_ids(&target), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_export_range_is_inclusive() {
        let store = store_with_logs(12);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        store
            .export(
                &target,
                &[ExportRange::between(Table::Logs, Some(5), Some(10))],
            )
            .unwrap();

        assert_eq!(log_ids(&target), vec![5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_export_start_only() {
        let store = store_with_logs(8);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        store
            .export(
                &target,
                &[ExportRange::between(Table::Logs, Some(5), None)],
            )
            .unwrap();

        assert_eq!(log_ids(&target), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_export_stop_only() {
        let store = store_with_logs(8);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        store
            .export(
                &target,
                &[ExportRange::between(Table::Logs, None, Some(3))],
            )
            .unwrap();

        assert_eq!(log_ids(&target), vec![1, 2, 3]);
    }

    #[test]
    fn test_export_invalid_order_skips_table() {
        let store = store_with_logs(8);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        // not fatal: the table is created but stays empty
        store
            .export(
                &target,
                &[ExportRange::between(Table::Logs, Some(10), Some(5))],
            )
            .unwrap();

        assert!(log_ids(&target).is_empty());
    }

    #[test]
    fn test_export_only_requested_tables() {
        let store = store_with_logs(2);
        store.enqueue("task", TaskPriority::Normal, "").unwrap();
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        store
            .export(&target, &[ExportRange::all(Table::Logs)])
            .unwrap();

        let conn = Connection::open(&target).unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(tables.contains(&"logs".to_string()));
        assert!(!tables.contains(&"queue".to_string()));
    }

    #[test]
    fn test_export_multiple_tables() {
        let store = store_with_logs(3);
        store.enqueue("one", TaskPriority::Normal, "").unwrap();
        store.enqueue("two", TaskPriority::High, "").unwrap();
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        store
            .export(
                &target,
                &[
                    ExportRange::between(Table::Logs, Some(2), None),
                    ExportRange::all(Table::Queue),
                ],
            )
            .unwrap();

        assert_eq!(log_ids(&target), vec![2, 3]);
        let conn = Connection::open(&target).unwrap();
        let queued: i64 = conn
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))
            .unwrap();
        assert_eq!(queued, 2);
    }

    #[test]
    fn test_export_empty_selection_is_noop() {
        let store = store_with_logs(1);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        store.export(&target, &[]).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn test_export_refuses_existing_target() {
        let store = store_with_logs(1);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");
        std::fs::write(&target, b"occupied").unwrap();

        let err = store
            .export(&target, &[ExportRange::all(Table::Logs)])
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn test_export_range_on_settings_is_invalid() {
        let store = store_with_logs(1);
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("export.db");

        let err = store
            .export(
                &target,
                &[ExportRange::between(Table::Settings, Some(1), Some(2))],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));

        // rejected before anything was created
        assert!(!target.exists());
    }
}
