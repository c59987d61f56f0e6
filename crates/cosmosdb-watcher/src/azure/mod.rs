// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! REST implementations of the provider, metrics and sink traits.

pub mod arm;
pub mod auth;
pub mod ingestion;
pub mod monitor;

use reqwest::Response;
use std::time::Duration;

use crate::error::{ProviderError, WatcherError};

/// Builds a reqwest client with optional proxy configuration and timeout.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, WatcherError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        let proxy = reqwest::Proxy::https(proxy)
            .map_err(|e| WatcherError::InvalidConfig(format!("invalid HTTPS proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| WatcherError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

/// Turns a non-success response into a [`ProviderError`] carrying status and body.
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_response(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        &body,
    ))
}
