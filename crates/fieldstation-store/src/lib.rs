//! Fieldstation Store Library
//!
//! This crate provides the persistence and task-dispatch layer for an
//! unattended field instrument station. A single SQLite file holds
//! configuration settings, the observation protocol, measurement records,
//! operational logs, and a durable priority-ordered work queue that
//! survives process restarts.
//!
//! # Architecture
//!
//! - **SQLite**: the single embedded store; every operation commits
//!   immediately, so a crash between fetching and completing a task simply
//!   redelivers it (at-least-once)
//! - **Single writer**: one controller process owns the store at a time
//!
//! # Quick Start
//!
//! ```text
//! create_store(&path, &Table::ALL, true, None)?;
//! let store = Store::open(&path)?;
//!
//! // Queue a task and dispatch it
//! store.enqueue("measure", TaskPriority::Normal, "")?;
//! if let Some(task) = store.next_task(false)? {
//!     // ... execute ...
//!     store.mark_handled(task.id, false)?;
//! }
//! ```
//!
//! # Modules
//!
//! - `store`: store handle over the SQLite file (main entry point)
//! - `queue`: task queue operations (enqueue, dispatch, retry accounting)
//! - `models`: data structures for tasks, settings, protocol, measurements
//! - `storage`: schema bootstrap and error types
//! - `export`: copying id ranges into a fresh export database
//! - `config`: station configuration

pub mod config;
pub mod export;
pub mod models;
pub mod queue;
pub mod storage;
pub mod store;

pub use config::{Config, Ownership};
pub use export::ExportRange;
pub use models::{
    LogLevel, Measurement, PendingTask, ProtocolStep, SettingValue, TaskPriority,
};
pub use queue::RETRY_LIMIT;
pub use storage::{create_store, StoreError, StoreResult, Table, SAMPLE_COUNT};
pub use store::Store;
