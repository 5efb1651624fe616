//! Data models for the Fieldstation store
//!
//! Defines the shapes that cross the store boundary: queued tasks,
//! setting values, protocol steps, measurement records, and log levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task priority class.
///
/// Exactly two tiers exist; the persisted format encodes them as the
/// integers 1 and 2 and the closed enum keeps other values out of the
/// queue entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    /// High priority (manually queued / urgent). Stored as 1.
    High,
    /// Normal priority. Stored as 2.
    Normal,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

impl TaskPriority {
    /// The integer encoding used in the `queue.priority` column.
    pub fn as_i64(self) -> i64 {
        match self {
            TaskPriority::High => 1,
            TaskPriority::Normal => 2,
        }
    }
}

/// Immutable snapshot of the next eligible task.
///
/// Returned by `Store::next_task`. Fetching a snapshot does not mark the
/// task as taken; the caller reports the outcome via `Store::mark_handled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    /// Row id, unique for the lifetime of the store.
    pub id: i64,
    /// Priority class the task was queued with.
    pub priority: TaskPriority,
    /// Action identifier, opaque to the queue.
    pub action: String,
    /// Free-form arguments for the action.
    pub options: Option<String>,
    /// Failures recorded so far.
    pub fails: i64,
}

/// A setting value, lazily coerced from its stored text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    /// Value parses as an integer.
    Int(i64),
    /// Value parses as a float (but not an integer).
    Float(f64),
    /// Anything else.
    Text(String),
}

impl SettingValue {
    /// Coerce a raw stored value: integer first, then float, then text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return SettingValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return SettingValue::Float(f);
        }
        SettingValue::Text(raw.to_string())
    }

    /// Get the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a float (integers widen).
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SettingValue::Int(i) => Some(*i as f64),
            SettingValue::Float(f) => Some(*f),
            SettingValue::Text(_) => None,
        }
    }

    /// Get the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One step of the observation protocol.
///
/// Steps are read in `number` order and assigned 1-based ids by read
/// position. The protocol table is read-only from this crate's view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStep {
    /// 1-based position in the protocol.
    pub id: usize,
    /// Instrument identifier, lowercased on read.
    pub instrument: String,
    /// Zenith angle in degrees.
    pub zenith: i64,
    /// Azimuth angle in degrees.
    pub azimuth: i64,
    /// Number of repetitions.
    pub repeat: i64,
    /// Wait time between repetitions, in seconds.
    pub wait: i64,
}

/// Severity for operational log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// The text stored in the `logs.level` column.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A measurement record.
///
/// All named fields are optional; fields left as `None` are stored empty
/// (column defaults apply where declared). The spectral samples ride in
/// `samples`, one fixed-width array per row; values past the sensor width
/// of 256 are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Acquisition time; when absent the store records the insert time.
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the measurement is considered valid.
    pub valid: Option<bool>,
    /// Errors raised while setting up the measurement.
    pub setup_errors: Vec<String>,
    /// Identifier of the measurement cycle this row belongs to.
    pub cycle_id: Option<String>,
    /// When the GNSS fix was acquired.
    pub gnss_acquired: Option<DateTime<Utc>>,
    /// GNSS fix quality indicator.
    pub gnss_qual: Option<i64>,
    /// Latitude in decimal degrees.
    pub gnss_lat: Option<f64>,
    /// Longitude in decimal degrees.
    pub gnss_lon: Option<f64>,
    /// Battery voltage.
    pub batt_voltage: Option<f64>,
    /// Instrument head supply voltage.
    pub head_voltage: Option<f64>,
    /// Instrument head temperature readout.
    pub head_temp_hpt: Option<String>,
    /// Scan index within the cycle.
    pub cycle_scan: Option<i64>,
    /// Sensor named by the protocol step.
    pub prot_sensor: Option<String>,
    /// Zenith angle requested by the protocol step.
    pub prot_zenith: Option<i64>,
    /// Azimuth angle requested by the protocol step.
    pub prot_azimuth: Option<i64>,
    /// Sun heading at measurement time.
    pub sun_heading: Option<f64>,
    /// Sun elevation at measurement time.
    pub sun_elevation: Option<f64>,
    /// Actual pointing heading of the scan.
    pub scan_heading: Option<f64>,
    /// Errors raised during the scan.
    pub scan_errors: Vec<String>,
    /// Repetition index of the scan.
    pub scan_rep: Option<i64>,
    /// Error reported for this repetition.
    pub rep_error: Option<String>,
    /// Unix timestamp reported by the sensor for this repetition.
    pub rep_unix: Option<f64>,
    /// Serial payload reported by the sensor.
    pub rep_serial: Option<String>,
    /// Spectral samples, stored into `val_001..val_256`.
    pub samples: Vec<i64>,
}
