// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// A failed call against the resource provider, the metrics API or the ingestion endpoint.
///
/// The rendered text mirrors what the provider SDK reported (`Status: 404 (Not Found)` embedded
/// in the message), because the throughput classifier matches on that text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    status: Option<u16>,
    message: String,
}

impl ProviderError {
    /// A fault that came back as an HTTP response.
    pub fn from_response(status: u16, reason: &str, body: &str) -> Self {
        let message = format!(
            "Service request failed.\nStatus: {status} ({reason})\n\nContent:\n{body}"
        );
        Self {
            status: Some(status),
            message,
        }
    }

    /// A fault that never produced a response (DNS, TLS, timeout, undecodable body).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a caller that owns its own retry loop should try again.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(429) => true,
            Some(code) => code >= 500,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProviderError::from_response(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                &err.to_string(),
            ),
            None => ProviderError::transport(err.to_string()),
        }
    }
}

/// Errors surfaced while processing a work item.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to decode {step} payload: {source}")]
    Decode {
        step: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Provider call failed during {context}: {source}")]
    Provider {
        context: String,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to upload records to stream {stream}: {source}")]
    Upload {
        stream: String,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to enqueue follow-on work: {0}")]
    Enqueue(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to acquire credentials: {0}")]
    Credential(String),
}

impl WatcherError {
    pub fn provider(context: impl Into<String>, source: ProviderError) -> Self {
        WatcherError::Provider {
            context: context.into(),
            source,
        }
    }

    /// Decode defects and configuration mistakes never heal on redelivery; everything else is
    /// left to the queue's redelivery policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WatcherError::Decode { .. } | WatcherError::InvalidConfig(_)
        )
    }
}
