// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`TelemetrySink`] over the Logs Ingestion API of data collection rules.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::auth::{TokenCredential, MONITOR_INGESTION_SCOPE};
use super::check_status;
use crate::config::Destinations;
use crate::error::ProviderError;
use crate::sink::{TelemetrySink, UploadBatch};

const INGESTION_API_VERSION: &str = "2023-01-01";
const UPLOAD_RETRY_COUNT: u32 = 3;

fn gzip(body: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::default());
    encoder
        .write_all(body)
        .and_then(|()| encoder.finish())
        .map_err(|e| ProviderError::transport(format!("failed to compress upload: {e}")))
}

pub struct IngestionClient {
    client: reqwest::Client,
    endpoint: String,
    credential: Arc<dyn TokenCredential>,
    destinations: Destinations,
    compress: bool,
    retry_backoff: Duration,
}

impl IngestionClient {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        destinations: Destinations,
        compress: bool,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credential,
            destinations,
            compress,
            retry_backoff: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    async fn send_once(&self, url: &str, body: &[u8]) -> Result<(), ProviderError> {
        let token = self.credential.token(MONITOR_INGESTION_SCOPE).await?;
        let mut request = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("Content-Type", "application/json");
        if self.compress {
            request = request.header("Content-Encoding", "gzip");
        }
        let response = request.body(body.to_vec()).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for IngestionClient {
    async fn upload(&self, batch: &UploadBatch) -> Result<(), ProviderError> {
        let Some(destination) = self.destinations.for_stream(batch.stream()) else {
            return Err(ProviderError::transport(format!(
                "no destination configured for stream {}",
                batch.stream()
            )));
        };
        let url = format!(
            "{}/dataCollectionRules/{}/streams/{}?api-version={}",
            self.endpoint, destination.rule_id, destination.stream_name, INGESTION_API_VERSION
        );
        let raw = batch.to_json_array().into_bytes();
        let body = if self.compress { gzip(&raw)? } else { raw };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let started = Instant::now();
            match self.send_once(&url, &body).await {
                Ok(()) => {
                    debug!(
                        stream = %batch.stream(),
                        rows = batch.len(),
                        bytes = body.len(),
                        "Uploaded batch"
                    );
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempts < UPLOAD_RETRY_COUNT => {
                    warn!(
                        stream = %batch.stream(),
                        attempts,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Upload failed, retrying: {err}"
                    );
                    tokio::time::sleep(self.retry_backoff * attempts).await;
                }
                Err(err) => {
                    error!(
                        stream = %batch.stream(),
                        attempts,
                        "Upload failed: {err}"
                    );
                    return Err(err);
                }
            }
        }
    }
}
