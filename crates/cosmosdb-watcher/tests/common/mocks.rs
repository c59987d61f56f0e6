// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-ins for the resource provider, metrics API, ingestion sink and queue

use cosmosdb_watcher::{
    error::ProviderError,
    metrics::{MetricResult, MetricSeries, MetricsQuery, MetricsSource},
    provider::{
        AccountResource, ContainerResource, DatabaseResource, ResourceProvider,
        SubscriptionResource, ThroughputSettings,
    },
    queue::WorkQueue,
    scope::{AccountScope, ContainerScope, DatabaseScope, SubscriptionScope},
    sink::{TelemetrySink, UploadBatch},
    QueueMessage, WatcherError,
};
use serde_json::Map;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SERVERLESS_FAULT: &str = "{\"code\":\"BadRequest\",\"message\":\"Reading or replacing offers is not supported for serverless accounts.\"}";

pub fn not_found() -> ProviderError {
    ProviderError::from_response(404, "Not Found", "{\"code\":\"NotFound\"}")
}

pub fn serverless_unsupported() -> ProviderError {
    ProviderError::from_response(400, "Bad Request", SERVERLESS_FAULT)
}

pub fn unavailable() -> ProviderError {
    ProviderError::from_response(503, "Service Unavailable", "")
}

/// A resource hierarchy keyed by names, with every call recorded.
#[derive(Default)]
pub struct MockProvider {
    pub subscriptions: Vec<SubscriptionResource>,
    /// Keyed by subscription id
    pub accounts: HashMap<String, Vec<AccountResource>>,
    /// Keyed by account name
    pub databases: HashMap<String, Vec<DatabaseResource>>,
    /// Keyed by `account/database`; databases without an entry have no throughput resource
    pub database_throughput: HashMap<String, Result<ThroughputSettings, ProviderError>>,
    /// Keyed by `account/database`
    pub containers: HashMap<String, Vec<ContainerResource>>,
    /// Keyed by `account/database/container`; containers without an entry have none
    pub container_throughput: HashMap<String, Result<ThroughputSettings, ProviderError>>,
    /// Number of leading `list_subscriptions` calls that fail with a 503
    pub failing_subscription_lists: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl MockProvider {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn database_key(database: &DatabaseScope) -> String {
        format!(
            "{}/{}",
            database.account().account_name(),
            database.database_name()
        )
    }

    fn container_key(container: &ContainerScope) -> String {
        format!(
            "{}/{}",
            Self::database_key(container.database()),
            container.container_name()
        )
    }

    fn find_container(&self, container: &ContainerScope) -> Option<ContainerResource> {
        self.containers
            .get(&Self::database_key(container.database()))?
            .iter()
            .find(|c| c.name == container.container_name())
            .cloned()
    }
}

#[async_trait::async_trait]
impl ResourceProvider for MockProvider {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionResource>, ProviderError> {
        self.record("list_subscriptions".to_string());
        let remaining = self.failing_subscription_lists.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_subscription_lists
                .store(remaining - 1, Ordering::SeqCst);
            return Err(unavailable());
        }
        Ok(self.subscriptions.clone())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionResource, ProviderError> {
        self.record(format!("get_subscription {subscription_id}"));
        self.subscriptions
            .iter()
            .find(|s| s.subscription_id == subscription_id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn list_accounts(
        &self,
        subscription: &SubscriptionScope,
    ) -> Result<Vec<AccountResource>, ProviderError> {
        self.record(format!("list_accounts {}", subscription.subscription_id()));
        Ok(self
            .accounts
            .get(subscription.subscription_id())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_account(&self, account: &AccountScope) -> Result<AccountResource, ProviderError> {
        self.record(format!("get_account {}", account.account_name()));
        self.accounts
            .values()
            .flatten()
            .find(|a| a.name == account.account_name())
            .cloned()
            .ok_or_else(not_found)
    }

    async fn list_databases(
        &self,
        account: &AccountScope,
    ) -> Result<Vec<DatabaseResource>, ProviderError> {
        self.record(format!("list_databases {}", account.account_name()));
        Ok(self
            .databases
            .get(account.account_name())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_database(
        &self,
        database: &DatabaseScope,
    ) -> Result<DatabaseResource, ProviderError> {
        let key = Self::database_key(database);
        self.record(format!("get_database {key}"));
        Ok(self
            .databases
            .get(database.account().account_name())
            .and_then(|dbs| dbs.iter().find(|d| d.name == database.database_name()))
            .cloned()
            .unwrap_or_else(|| DatabaseResource {
                name: database.database_name().to_string(),
                additional_data: Map::new(),
            }))
    }

    async fn get_database_throughput(
        &self,
        database: &DatabaseScope,
    ) -> Result<ThroughputSettings, ProviderError> {
        let key = Self::database_key(database);
        self.record(format!("get_database_throughput {key}"));
        self.database_throughput
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(not_found()))
    }

    async fn list_containers(
        &self,
        database: &DatabaseScope,
    ) -> Result<Vec<ContainerResource>, ProviderError> {
        let key = Self::database_key(database);
        self.record(format!("list_containers {key}"));
        Ok(self.containers.get(&key).cloned().unwrap_or_default())
    }

    async fn get_container(
        &self,
        container: &ContainerScope,
    ) -> Result<ContainerResource, ProviderError> {
        self.record(format!("get_container {}", Self::container_key(container)));
        Ok(self
            .find_container(container)
            .unwrap_or_else(|| ContainerResource {
                id: container.resource_id(),
                name: container.container_name().to_string(),
                indexing_policy: None,
                default_ttl: None,
                additional_data: Map::new(),
            }))
    }

    async fn get_container_throughput(
        &self,
        container: &ContainerScope,
    ) -> Result<ThroughputSettings, ProviderError> {
        let key = Self::container_key(container);
        self.record(format!("get_container_throughput {key}"));
        self.container_throughput
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(not_found()))
    }
}

/// Serves canned series by metric name and keeps every query it was asked.
#[derive(Default)]
pub struct MockMetrics {
    pub series: HashMap<String, Vec<MetricSeries>>,
    pub failure: Option<ProviderError>,
    pub queries: Mutex<Vec<MetricsQuery>>,
}

impl MockMetrics {
    pub fn queries(&self) -> Vec<MetricsQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MetricsSource for MockMetrics {
    async fn query(&self, query: &MetricsQuery) -> Result<Vec<MetricResult>, ProviderError> {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(query
            .metric_names
            .iter()
            .filter_map(|name| {
                self.series.get(name).map(|series| MetricResult {
                    name: name.clone(),
                    series: series.clone(),
                })
            })
            .collect())
    }
}

/// Keeps every uploaded batch.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<UploadBatch>>,
}

impl RecordingSink {
    pub fn batches(&self) -> Vec<UploadBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// Parsed rows uploaded to `stream`, in upload order.
    pub fn rows(&self, stream: cosmosdb_watcher::records::StreamKind) -> Vec<serde_json::Value> {
        self.batches()
            .iter()
            .filter(|b| b.stream() == stream)
            .flat_map(|b| b.rows().to_vec())
            .map(|row| serde_json::from_str(&row).unwrap())
            .collect()
    }
}

#[async_trait::async_trait]
impl TelemetrySink for RecordingSink {
    async fn upload(&self, batch: &UploadBatch) -> Result<(), ProviderError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

/// Keeps every enqueued message.
#[derive(Default)]
pub struct RecordingQueue {
    pub messages: Mutex<Vec<QueueMessage>>,
}

impl RecordingQueue {
    pub fn messages(&self) -> Vec<QueueMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WorkQueue for RecordingQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), WatcherError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}
