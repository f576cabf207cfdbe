//! Row sink for the analytical table.
//!
//! Inserts are append-only. A request the store accepted but where some rows
//! were refused is reported through [`InsertReport`], not as an error; the
//! caller decides whether to resend the batch.

pub mod table;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SinkError;
use crate::process::ExtractedRow;

pub use table::TableSink;

/// A single row the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// Position of the row in the submitted batch
    pub index: usize,
    pub reason: String,
    pub message: String,
}

/// Outcome of an insert the store answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    pub failed: Vec<RowError>,
}

impl InsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Append-only destination for extracted rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Insert `rows`. An empty slice succeeds without any I/O.
    async fn insert(&self, rows: &[ExtractedRow]) -> Result<InsertReport, SinkError>;
}
