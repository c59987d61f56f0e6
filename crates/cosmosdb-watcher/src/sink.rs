// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProviderError, WatcherError};
use crate::records::{StreamKind, UploadRecord};

/// Rows for a single stream, already serialized to JSON objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch {
    stream: StreamKind,
    rows: Vec<String>,
}

impl UploadBatch {
    pub fn new(stream: StreamKind, rows: Vec<String>) -> Self {
        Self { stream, rows }
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The request body: a JSON array of the rows.
    pub fn to_json_array(&self) -> String {
        format!("[{}]", self.rows.join(","))
    }
}

/// Write-only telemetry backend.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn upload(&self, batch: &UploadBatch) -> Result<(), ProviderError>;
}

/// Serialized size of `rows` as a JSON array.
fn array_size(rows_bytes: usize, rows: usize) -> usize {
    2 + rows_bytes + rows.saturating_sub(1)
}

/// Groups records by destination stream and splits each group into size-bounded batches.
pub struct UploadBatcher {
    sink: Arc<dyn TelemetrySink>,
    max_bytes: usize,
}

impl UploadBatcher {
    pub fn new(sink: Arc<dyn TelemetrySink>, max_bytes: usize) -> Self {
        Self { sink, max_bytes }
    }

    /// Splits records into batches: streams in order of first appearance, records in order.
    pub fn batch(&self, records: &[UploadRecord]) -> Result<Vec<UploadBatch>, serde_json::Error> {
        let mut groups: Vec<(StreamKind, Vec<String>)> = Vec::new();
        for record in records {
            let row = serde_json::to_string(record)?;
            let stream = record.stream();
            match groups.iter_mut().find(|(kind, _)| *kind == stream) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((stream, vec![row])),
            }
        }

        let mut batches = Vec::new();
        for (stream, rows) in groups {
            let mut current: Vec<String> = Vec::new();
            let mut current_bytes = 0;
            for row in rows {
                let projected = array_size(current_bytes + row.len(), current.len() + 1);
                if !current.is_empty() && projected > self.max_bytes {
                    batches.push(UploadBatch::new(stream, std::mem::take(&mut current)));
                    current_bytes = 0;
                }
                current_bytes += row.len();
                current.push(row);
            }
            if !current.is_empty() {
                batches.push(UploadBatch::new(stream, current));
            }
        }
        Ok(batches)
    }

    /// Uploads every record. An empty slice never reaches the sink.
    pub async fn upload(&self, records: &[UploadRecord]) -> Result<usize, WatcherError> {
        if records.is_empty() {
            return Ok(0);
        }
        let batches = self.batch(records).map_err(|err| WatcherError::Upload {
            stream: records
                .first()
                .map(|r| r.stream().to_string())
                .unwrap_or_default(),
            source: ProviderError::transport(format!("failed to serialize records: {err}")),
        })?;
        for batch in &batches {
            debug!(stream = %batch.stream(), records = batch.len(), "Uploading batch");
            self.sink
                .upload(batch)
                .await
                .map_err(|source| WatcherError::Upload {
                    stream: batch.stream().to_string(),
                    source,
                })?;
        }
        Ok(records.len())
    }
}
