//! SQLite schema for the station store
//!
//! Fixed column definitions for the five tables and the one-time
//! bootstrap that creates a fresh store. Bootstrap refuses to touch an
//! existing file: the store holds an instrument's historical data and
//! must never be silently truncated.

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::config::Ownership;
use crate::storage::error::{StoreError, StoreResult};

/// Width of one spectral measurement array. Hard constant of the sensor
/// output, not configurable.
pub const SAMPLE_COUNT: usize = 256;

/// The tables held by a station store.
///
/// Closed enum: unknown table names cannot reach the bootstrapper.
/// `Table::from_name` is the validating entry point for callers holding
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Ordered measurement instructions.
    Protocol,
    /// Append-only operational log.
    Logs,
    /// Durable work queue.
    Queue,
    /// Measurement records with the spectral sample columns.
    Measurements,
    /// Key/value configuration settings.
    Settings,
}

impl Table {
    /// All five tables, in creation order.
    pub const ALL: [Table; 5] = [
        Table::Protocol,
        Table::Logs,
        Table::Queue,
        Table::Measurements,
        Table::Settings,
    ];

    /// The table name as it appears in the store.
    pub fn name(self) -> &'static str {
        match self {
            Table::Protocol => "protocol",
            Table::Logs => "logs",
            Table::Queue => "queue",
            Table::Measurements => "measurements",
            Table::Settings => "settings",
        }
    }

    /// Resolve a table name, rejecting anything unknown.
    pub fn from_name(name: &str) -> StoreResult<Table> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| {
                StoreError::invalid(format!(
                    "'{}' is not a valid table name (expected one of: protocol, logs, queue, measurements, settings)",
                    name
                ))
            })
    }

    /// Whether rows in this table carry an `id` column usable for ranges.
    pub fn has_row_ids(self) -> bool {
        !matches!(self, Table::Settings)
    }

    fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Protocol => PROTOCOL_COLUMNS,
            Table::Logs => LOGS_COLUMNS,
            Table::Queue => QUEUE_COLUMNS,
            Table::Measurements => MEASUREMENTS_COLUMNS,
            Table::Settings => SETTINGS_COLUMNS,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

const QUEUE_COLUMNS: &[&str] = &[
    "id INTEGER PRIMARY KEY AUTOINCREMENT",
    "done INTEGER NOT NULL DEFAULT 0",
    "priority INTEGER NOT NULL DEFAULT 2",
    "fails INTEGER NOT NULL DEFAULT 0",
    "timestamp DATE DEFAULT (datetime('now', 'utc'))",
    "action TEXT NOT NULL COLLATE NOCASE",
    "options TEXT DEFAULT NULL COLLATE NOCASE",
];

const PROTOCOL_COLUMNS: &[&str] = &[
    "id INTEGER PRIMARY KEY AUTOINCREMENT",
    "number INTEGER NOT NULL UNIQUE",
    "instrument TEXT NOT NULL COLLATE NOCASE",
    "zenith INTEGER NOT NULL",
    "azimuth INTEGER NOT NULL",
    "repeat INTEGER NOT NULL DEFAULT 1",
    "wait INTEGER NOT NULL DEFAULT 0",
];

const LOGS_COLUMNS: &[&str] = &[
    "id INTEGER PRIMARY KEY AUTOINCREMENT",
    // sub-second precision, unlike the other timestamp defaults
    "timestamp DATE DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW'))",
    "level TEXT COLLATE NOCASE",
    "source TEXT NOT NULL COLLATE NOCASE",
    "log TEXT DEFAULT NULL COLLATE NOCASE",
];

const SETTINGS_COLUMNS: &[&str] = &[
    "setting TEXT PRIMARY KEY NOT NULL COLLATE NOCASE",
    "value TEXT COLLATE NOCASE",
];

/// Base columns of the measurements table. The `val_001..val_256` sample
/// columns are appended at creation time.
const MEASUREMENTS_COLUMNS: &[&str] = &[
    "id INTEGER PRIMARY KEY AUTOINCREMENT",
    "timestamp DATE DEFAULT (datetime('now', 'utc'))",
    "valid TEXT DEFAULT 'n' COLLATE NOCASE",
    "setup_error TEXT COLLATE NOCASE",
    "cycle_id TEXT",
    "gnss_acquired DATE",
    "gnss_qual INTEGER",
    "gnss_lat REAL",
    "gnss_lon REAL",
    "batt_voltage REAL",
    "head_voltage REAL",
    "head_temp_hpt TEXT",
    "cycle_scan INTEGER",
    "prot_sensor TEXT",
    "prot_zenith INTEGER",
    "prot_azimuth INTEGER",
    "sun_heading REAL",
    "sun_elevation REAL",
    "scan_heading REAL",
    "scan_error TEXT",
    "scan_rep INTEGER",
    "rep_error TEXT",
    "rep_unix REAL",
    "rep_serial TEXT",
];

/// Settings inserted at bootstrap when requested. Placeholders for
/// connectivity credentials stay empty until deployment fills them in.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("station_id", "MSO"),
    ("manual", "1"),
    ("measurements_start_hour", "6"),
    ("measurements_stop_hour", "19"),
    ("max_sun_zenith", "90"),
    ("email_enabled", "1"),
    ("email_recipient", ""),
    ("email_server_port", ""),
    ("email_user", ""),
    ("email_password", ""),
    ("email_min_level", "warning"),
    ("ftp_server", ""),
    ("ftp_user", ""),
    ("ftp_password", ""),
    ("ftp_working_dir", "fieldstation"),
    ("head_true_north_offset", "180"),
    ("radiance_angle_offset", "20"),
    ("irradiance_angle_offset", "60"),
    ("keepout_heading_low", "0"),
    ("keepout_heading_high", "0"),
    ("gnss_acquired", "none"),
    ("gnss_lat", "51.2"),
    ("gnss_lon", "2.9"),
    ("gnss_qual", "0"),
    ("gnss_mag_var", "0"),
    ("id_last_backup_meas", "0"),
    ("id_last_backup_log", "0"),
    ("system_set_up", "0"),
    ("tty_irradiance", "/dev/ttyO1"),
    ("tty_radiance", "/dev/ttyO2"),
    ("tty_multiplexer", "/dev/ttyO4"),
    ("tty_gnss", "/dev/ttyO5"),
];

/// Create a fresh store at `path` with the requested tables.
///
/// Refuses with `AlreadyExists` if anything is present at `path`. Parent
/// directories are created as needed. When `settings` is among the
/// requested tables and `populate_defaults` is set, the default setting
/// list is inserted in a single transaction.
///
/// `owner` optionally names a user/group to hand the created file to.
/// Resolution or chown failure surfaces as `Ownership` after the tables
/// are already in place; the store is usable, only its ownership is
/// stale.
///
/// Table creation is not rolled back on a late storage failure; a
/// partially bootstrapped file only occurs on catastrophic I/O errors.
pub fn create_store(
    path: &Path,
    tables: &[Table],
    populate_defaults: bool,
    owner: Option<&Ownership>,
) -> StoreResult<()> {
    if path.exists() {
        return Err(StoreError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let mut conn = Connection::open(path)?;
    init_tables(&mut conn, tables, populate_defaults)?;
    drop(conn);

    debug!(path = %path.display(), "created station store");

    if let Some(owner) = owner {
        apply_ownership(path, owner)?;
    }

    Ok(())
}

/// Create the requested tables on an open connection.
///
/// Shared between `create_store` and in-memory stores used in tests.
/// Iterates `Table::ALL` so creation order is stable and duplicate
/// requests collapse.
pub(crate) fn init_tables(
    conn: &mut Connection,
    tables: &[Table],
    populate_defaults: bool,
) -> StoreResult<()> {
    for table in Table::ALL {
        if tables.contains(&table) {
            conn.execute(&create_table_sql(table), [])?;
        }
    }

    if populate_defaults && tables.contains(&Table::Settings) {
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO settings(setting, value) VALUES (?1, ?2)")?;
            for (setting, value) in DEFAULT_SETTINGS {
                stmt.execute(rusqlite::params![setting, value])?;
            }
        }
        tx.commit()?;
    }

    Ok(())
}

fn create_table_sql(table: Table) -> String {
    let mut columns: Vec<String> = table.columns().iter().map(|c| (*c).to_string()).collect();

    if table == Table::Measurements {
        columns.extend((1..=SAMPLE_COUNT).map(|i| format!("val_{:03} INTEGER", i)));
    }

    format!("CREATE TABLE {} ({})", table.name(), columns.join(", "))
}

#[cfg(unix)]
fn apply_ownership(path: &Path, owner: &Ownership) -> StoreResult<()> {
    use nix::unistd::{chown, Group, User};

    let ownership_err = |reason: String| StoreError::Ownership {
        path: path.to_path_buf(),
        reason,
    };

    let user = User::from_name(&owner.user)
        .map_err(|e| ownership_err(format!("looking up user '{}': {}", owner.user, e)))?
        .ok_or_else(|| ownership_err(format!("unknown user '{}'", owner.user)))?;
    let group = Group::from_name(&owner.group)
        .map_err(|e| ownership_err(format!("looking up group '{}': {}", owner.group, e)))?
        .ok_or_else(|| ownership_err(format!("unknown group '{}'", owner.group)))?;

    chown(path, Some(user.uid), Some(group.gid))
        .map_err(|e| ownership_err(format!("chown to {}:{} failed: {}", owner.user, owner.group, e)))
}

#[cfg(not(unix))]
fn apply_ownership(path: &Path, _owner: &Ownership) -> StoreResult<()> {
    Err(StoreError::Ownership {
        path: path.to_path_buf(),
        reason: "file ownership is not supported on this platform".to_string(),
    })
}
