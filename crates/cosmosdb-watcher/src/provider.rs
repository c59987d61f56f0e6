// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only view of the resource provider.
//!
//! Handlers only see this trait; the REST implementation lives in [`crate::azure::arm`] and the
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::indexing::IndexingPolicy;
use crate::scope::{AccountScope, ContainerScope, DatabaseScope, SubscriptionScope};

/// Provider-specific properties passed through verbatim on upload records.
pub type AdditionalData = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionResource {
    pub subscription_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountResource {
    pub name: String,
    pub resource_group: String,
    pub capabilities: Vec<String>,
    pub additional_data: AdditionalData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseResource {
    pub name: String,
    pub additional_data: AdditionalData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerResource {
    pub id: String,
    pub name: String,
    pub indexing_policy: Option<IndexingPolicy>,
    pub default_ttl: Option<i64>,
    pub additional_data: AdditionalData,
}

/// A successfully read throughput resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThroughputSettings {
    pub throughput: Option<i64>,
    /// Present only when the resource runs in autoscale mode.
    pub autoscale_max_throughput: Option<i64>,
}

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionResource>, ProviderError>;

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionResource, ProviderError>;

    async fn list_accounts(
        &self,
        subscription: &SubscriptionScope,
    ) -> Result<Vec<AccountResource>, ProviderError>;

    async fn get_account(&self, account: &AccountScope) -> Result<AccountResource, ProviderError>;

    async fn list_databases(
        &self,
        account: &AccountScope,
    ) -> Result<Vec<DatabaseResource>, ProviderError>;

    async fn get_database(
        &self,
        database: &DatabaseScope,
    ) -> Result<DatabaseResource, ProviderError>;

    async fn get_database_throughput(
        &self,
        database: &DatabaseScope,
    ) -> Result<ThroughputSettings, ProviderError>;

    async fn list_containers(
        &self,
        database: &DatabaseScope,
    ) -> Result<Vec<ContainerResource>, ProviderError>;

    async fn get_container(
        &self,
        container: &ContainerScope,
    ) -> Result<ContainerResource, ProviderError>;

    async fn get_container_throughput(
        &self,
        container: &ContainerScope,
    ) -> Result<ThroughputSettings, ProviderError>;
}
