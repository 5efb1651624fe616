//! Storage layer
//!
//! Schema bootstrap for the SQLite store and the typed error surface
//! shared by every store operation.

pub mod error;
pub mod schema;

pub use error::{StoreError, StoreResult};
pub use schema::{create_store, Table, DEFAULT_SETTINGS, SAMPLE_COUNT};
