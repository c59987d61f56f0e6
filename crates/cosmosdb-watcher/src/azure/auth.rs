// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bearer tokens for Resource Manager, Monitor and Logs Ingestion.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::sync::Mutex;
use tracing::debug;

use super::check_status;
use crate::config::CredentialSource;
use crate::error::{ProviderError, WatcherError};

pub const RESOURCE_MANAGER_SCOPE: &str = "https://management.azure.com/.default";
pub const MONITOR_INGESTION_SCOPE: &str = "https://monitor.azure.com/.default";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const MANAGED_IDENTITY_API_VERSION: &str = "2019-08-01";
/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn token(&self, scope: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::minutes(EXPIRY_MARGIN_MINUTES) < self.expires_at
    }
}

fn epoch_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Managed identity endpoints report `expires_on` as epoch seconds, often as a string.
#[derive(Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    #[serde(deserialize_with = "epoch_seconds")]
    expires_on: i64,
}

#[derive(Deserialize)]
struct ClientCredentialsToken {
    access_token: String,
    expires_in: i64,
}

/// A token source picked from the environment, with a per-scope cache.
pub struct AzureCredential {
    source: CredentialSource,
    client: reqwest::Client,
    authority_host: String,
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl Debug for AzureCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.source {
            CredentialSource::StaticToken(_) => "static",
            CredentialSource::ManagedIdentity { .. } => "managed-identity",
            CredentialSource::ClientSecret { .. } => "client-secret",
        };
        write!(f, "AzureCredential({kind})")
    }
}

impl AzureCredential {
    pub fn new(source: CredentialSource, client: reqwest::Client) -> Self {
        Self {
            source,
            client,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fails when no credential source was configured.
    pub fn from_config(
        source: Option<CredentialSource>,
        client: reqwest::Client,
    ) -> Result<Self, WatcherError> {
        source.map(|source| Self::new(source, client)).ok_or_else(|| {
            WatcherError::Credential(
                "no credential configured: set AZURE_ACCESS_TOKEN, IDENTITY_ENDPOINT and IDENTITY_HEADER, or AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET".to_string(),
            )
        })
    }

    #[must_use]
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(&self, scope: &str) -> Result<CachedToken, ProviderError> {
        match &self.source {
            CredentialSource::StaticToken(token) => Ok(CachedToken {
                secret: token.clone(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            }),
            CredentialSource::ManagedIdentity { endpoint, header } => {
                let resource = scope.trim_end_matches("/.default");
                let response = self
                    .client
                    .get(endpoint)
                    .query(&[
                        ("resource", resource),
                        ("api-version", MANAGED_IDENTITY_API_VERSION),
                    ])
                    .header("X-IDENTITY-HEADER", header)
                    .send()
                    .await?;
                let token: ManagedIdentityToken = check_status(response).await?.json().await?;
                Ok(CachedToken {
                    secret: token.access_token,
                    expires_at: DateTime::from_timestamp(token.expires_on, 0)
                        .unwrap_or_else(Utc::now),
                })
            }
            CredentialSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let url = format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id);
                let response = self
                    .client
                    .post(url)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("scope", scope),
                    ])
                    .send()
                    .await?;
                let token: ClientCredentialsToken = check_status(response).await?.json().await?;
                let expires_at = ChronoDuration::try_seconds(token.expires_in)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        ProviderError::transport(format!(
                            "token lifetime out of range: {}s",
                            token.expires_in
                        ))
                    })?;
                Ok(CachedToken {
                    secret: token.access_token,
                    expires_at,
                })
            }
        }
    }
}

#[async_trait]
impl TokenCredential for AzureCredential {
    async fn token(&self, scope: &str) -> Result<String, ProviderError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(scope) {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.secret.clone());
            }
        }
        debug!(scope, "Requesting access token");
        let fresh = self.fetch(scope).await?;
        let secret = fresh.secret.clone();
        cache.insert(scope.to_string(), fresh);
        Ok(secret)
    }
}
