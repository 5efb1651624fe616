//! Store handle over the station database
//!
//! The `Store` owns the SQLite connection for the lifetime of the handle;
//! dropping it releases the file on every exit path. Opening requires a
//! bootstrapped store (see `storage::create_store`) — the handle never
//! creates tables on its own.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open(&config.db_path())?;
//!
//! store.set_setting("manual", "0")?;
//! let hour = store.get_setting("measurements_start_hour")?;
//!
//! for step in store.protocol()? {
//!     // drive the instrument
//! }
//! ```

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, ToSql};
use tracing::debug;

use crate::config::Config;
use crate::models::{LogLevel, Measurement, ProtocolStep, SettingValue};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema::{self, Table, SAMPLE_COUNT};

/// Handle to an open station store.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open an existing store.
    ///
    /// The file must have been created by the schema bootstrap; opening a
    /// path with no store behind it is an error rather than an implicit
    /// (and table-less) creation.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.is_file() {
            return Err(StoreError::invalid(format!(
                "no store at '{}'; bootstrap one with create_store first",
                path.display()
            )));
        }

        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened station store");

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open the store named by the configuration.
    pub fn open_with_config(config: &Config) -> StoreResult<Self> {
        Self::open(&config.db_path())
    }

    /// Open an in-memory store with all tables and default settings
    /// (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::init_tables(&mut conn, &Table::ALL, true)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ==================== Settings ====================

    /// Return the value of a setting, coerced int → float → text.
    ///
    /// An unknown key is not an error: it returns `None`.
    pub fn get_setting(&self, setting: &str) -> StoreResult<Option<SettingValue>> {
        let value: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE setting = ?1",
                params![setting],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value.flatten().map(|raw| SettingValue::parse(&raw)))
    }

    /// Add or change a setting (upsert: insert the key if absent, then
    /// update its value).
    pub fn set_setting(&self, setting: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO settings(setting) VALUES (?1)",
            params![setting],
        )?;
        self.conn.execute(
            "UPDATE settings SET value = ?1 WHERE setting = ?2",
            params![value, setting],
        )?;
        Ok(())
    }

    // ==================== Protocol ====================

    /// The observation protocol, ordered by its `number` column.
    ///
    /// Steps get 1-based ids by read order and instrument names are
    /// lowercased.
    pub fn protocol(&self) -> StoreResult<Vec<ProtocolStep>> {
        let mut stmt = self.conn.prepare(
            "SELECT instrument, zenith, azimuth, repeat, wait FROM protocol ORDER BY number",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut steps = Vec::new();
        for (i, row) in rows.enumerate() {
            let (instrument, zenith, azimuth, repeat, wait) = row?;
            steps.push(ProtocolStep {
                id: i + 1,
                instrument: instrument.to_lowercase(),
                zenith,
                azimuth,
                repeat,
                wait,
            });
        }

        Ok(steps)
    }

    // ==================== Logs ====================

    /// Append a line to the operational log.
    pub fn add_log(&self, text: &str, source: &str, level: LogLevel) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO logs(level, source, log) VALUES (?1, ?2, ?3)",
            params![level.as_str(), source, text],
        )?;
        Ok(())
    }

    // ==================== Measurements ====================

    /// Append a measurement record.
    ///
    /// Only the fields present on the record are written; omitted columns
    /// fall back to their declared defaults (insert-time timestamp,
    /// `valid = 'n'`) or NULL. Samples beyond the sensor width are
    /// ignored.
    pub fn add_measurement(&self, measurement: &Measurement) -> StoreResult<()> {
        let (columns, values) = measurement_columns(measurement);

        if columns.is_empty() {
            self.conn.execute("INSERT INTO measurements DEFAULT VALUES", [])?;
            return Ok(());
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO measurements({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        self.conn.execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref() as &dyn ToSql)),
        )?;
        Ok(())
    }

    // ==================== Maintenance ====================

    /// The highest id in `table`, or `None` when the table is empty.
    ///
    /// Used by backup bookkeeping (`id_last_backup_meas` and friends).
    pub fn last_id(&self, table: Table) -> StoreResult<Option<i64>> {
        if !table.has_row_ids() {
            return Err(StoreError::invalid(format!(
                "table '{}' has no id column",
                table
            )));
        }

        let sql = format!("SELECT MAX(id) FROM {}", table.name());
        let max: Option<i64> = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(max)
    }

    /// Compact the store file.
    pub fn vacuum(&self) -> StoreResult<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

/// Collect the column names and bound values present on a measurement.
fn measurement_columns(m: &Measurement) -> (Vec<String>, Vec<Box<dyn ToSql>>) {
    let mut columns: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    let mut push = |name: &str, value: Box<dyn ToSql>| {
        columns.push(name.to_string());
        values.push(value);
    };

    if let Some(ts) = m.timestamp {
        push("timestamp", Box::new(format_utc(ts)));
    }
    if let Some(valid) = m.valid {
        push("valid", Box::new(if valid { "y" } else { "n" }));
    }
    if !m.setup_errors.is_empty() {
        push("setup_error", Box::new(m.setup_errors.join(" | ")));
    }
    if let Some(ref v) = m.cycle_id {
        push("cycle_id", Box::new(v.clone()));
    }
    if let Some(ts) = m.gnss_acquired {
        push("gnss_acquired", Box::new(format_utc(ts)));
    }
    if let Some(v) = m.gnss_qual {
        push("gnss_qual", Box::new(v));
    }
    if let Some(v) = m.gnss_lat {
        push("gnss_lat", Box::new(v));
    }
    if let Some(v) = m.gnss_lon {
        push("gnss_lon", Box::new(v));
    }
    if let Some(v) = m.batt_voltage {
        push("batt_voltage", Box::new(v));
    }
    if let Some(v) = m.head_voltage {
        push("head_voltage", Box::new(v));
    }
    if let Some(ref v) = m.head_temp_hpt {
        push("head_temp_hpt", Box::new(v.clone()));
    }
    if let Some(v) = m.cycle_scan {
        push("cycle_scan", Box::new(v));
    }
    if let Some(ref v) = m.prot_sensor {
        push("prot_sensor", Box::new(v.clone()));
    }
    if let Some(v) = m.prot_zenith {
        push("prot_zenith", Box::new(v));
    }
    if let Some(v) = m.prot_azimuth {
        push("prot_azimuth", Box::new(v));
    }
    if let Some(v) = m.sun_heading {
        push("sun_heading", Box::new(v));
    }
    if let Some(v) = m.sun_elevation {
        push("sun_elevation", Box::new(v));
    }
    if let Some(v) = m.scan_heading {
        push("scan_heading", Box::new(v));
    }
    if !m.scan_errors.is_empty() {
        push("scan_error", Box::new(m.scan_errors.join(" | ")));
    }
    if let Some(v) = m.scan_rep {
        push("scan_rep", Box::new(v));
    }
    if let Some(ref v) = m.rep_error {
        push("rep_error", Box::new(v.clone()));
    }
    if let Some(v) = m.rep_unix {
        push("rep_unix", Box::new(v));
    }
    if let Some(ref v) = m.rep_serial {
        push("rep_serial", Box::new(v.clone()));
    }

    for (i, sample) in m.samples.iter().take(SAMPLE_COUNT).enumerate() {
        push(&format!("val_{:03}", i + 1), Box::new(*sample));
    }

    (columns, values)
}

/// Format a timestamp the way the SQLite-side defaults do.
fn format_utc(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
