//! Streaming-insert HTTP client for the analytical table.
//!
//! Speaks the `tabledata.insertAll` protocol: rows go out as
//! `{"rows":[{"json":{..}}]}` and refused rows come back in `insertErrors`
//! keyed by their index in the request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{InsertReport, RowError, RowSink};
use crate::config::{Config, TableRef};
use crate::error::SinkError;
use crate::process::ExtractedRow;

/// Longest error body kept in a [`SinkError::Status`].
const MAX_ERROR_BODY: usize = 500;

#[derive(Serialize)]
struct InsertAllRequest<'a> {
    rows: Vec<InsertAllRow<'a>>,
}

#[derive(Serialize)]
struct InsertAllRow<'a> {
    json: &'a ExtractedRow,
}

#[derive(Debug, Default, Deserialize)]
struct InsertAllResponse {
    #[serde(default, rename = "insertErrors")]
    insert_errors: Vec<InsertErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct InsertErrorEntry {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// HTTP row sink for one table.
#[derive(Clone)]
pub struct TableSink {
    client: Client,
    endpoint: String,
    table: TableRef,
    access_token: Option<String>,
    timeout: Duration,
}

impl TableSink {
    pub fn new(
        client: Client,
        api_base: &str,
        table: TableRef,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        let endpoint = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            api_base.trim_end_matches('/'),
            table.project,
            table.dataset,
            table.table
        );

        Self {
            client,
            endpoint,
            table,
            access_token,
            timeout,
        }
    }

    /// Build a sink from the `BQ_*` settings, failing on the first missing
    /// table coordinate.
    pub fn from_config(client: Client, config: &Config) -> Result<Self, SinkError> {
        let table = config.require_table()?;
        Ok(Self::new(
            client,
            &config.table_api_base,
            table,
            config.table_access_token.clone(),
            config.insert_timeout(),
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RowSink for TableSink {
    async fn insert(&self, rows: &[ExtractedRow]) -> Result<InsertReport, SinkError> {
        if rows.is_empty() {
            debug!(table = %self.table, "table_insert_empty_skipped");
            return Ok(InsertReport::default());
        }

        let body = InsertAllRequest {
            rows: rows.iter().map(|row| InsertAllRow { json: row }).collect(),
        };

        let mut request = self.client.post(&self.endpoint).timeout(self.timeout).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                error!(table = %self.table, timeout_seconds = self.timeout.as_secs_f64(), "table_insert_timeout");
                SinkError::Timeout(self.timeout)
            } else {
                error!(table = %self.table, error = %e, "table_insert_request_error");
                SinkError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(MAX_ERROR_BODY).collect();
            error!(table = %self.table, status_code = status.as_u16(), body = %body, "table_insert_rejected");
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: InsertAllResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Transport(format!("unreadable insert response: {e}")))?;

        let report = build_report(rows.len(), parsed);

        if report.is_complete() {
            info!(table = %self.table, rows = report.inserted, "table_rows_inserted");
        } else {
            warn!(
                table = %self.table,
                inserted = report.inserted,
                failed = report.failed.len(),
                "table_rows_partially_rejected"
            );
        }

        Ok(report)
    }
}

/// Fold the per-row errors into a report. Indexes outside the batch are
/// dropped.
fn build_report(total: usize, response: InsertAllResponse) -> InsertReport {
    let mut failed: Vec<RowError> = response
        .insert_errors
        .into_iter()
        .filter(|entry| entry.index < total)
        .map(|entry| {
            let first = entry.errors.into_iter().next().unwrap_or_default();
            RowError {
                index: entry.index,
                reason: first.reason,
                message: first.message,
            }
        })
        .collect();

    failed.sort_by_key(|e| e.index);
    failed.dedup_by_key(|e| e.index);

    InsertReport {
        inserted: total - failed.len(),
        failed,
    }
}
