// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`ResourceProvider`] over the Resource Manager REST API.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::auth::{TokenCredential, RESOURCE_MANAGER_SCOPE};
use super::check_status;
use crate::error::ProviderError;
use crate::indexing::IndexingPolicy;
use crate::provider::{
    AccountResource, ContainerResource, DatabaseResource, ResourceProvider,
    SubscriptionResource, ThroughputSettings,
};
use crate::scope::{AccountScope, ContainerScope, DatabaseScope, SubscriptionScope};

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const COSMOSDB_API_VERSION: &str = "2024-11-15";

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

fn value_at<'a>(object: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(object.get(*first)?, |value, key| value.get(*key))
}

fn str_at(object: &Map<String, Value>, path: &[&str]) -> String {
    value_at(object, path)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Resource group segment of an ARM id, matched case-insensitively.
fn resource_group_of(id: &str) -> String {
    let segments: Vec<&str> = id.split('/').collect();
    segments
        .windows(2)
        .find(|pair| pair[0].eq_ignore_ascii_case("resourceGroups"))
        .map(|pair| pair[1].to_string())
        .unwrap_or_default()
}

fn subscription_from(object: Map<String, Value>) -> SubscriptionResource {
    SubscriptionResource {
        subscription_id: str_at(&object, &["subscriptionId"]),
        display_name: str_at(&object, &["displayName"]),
    }
}

fn account_from(object: Map<String, Value>) -> AccountResource {
    let capabilities = value_at(&object, &["properties", "capabilities"])
        .and_then(Value::as_array)
        .map(|caps| {
            caps.iter()
                .filter_map(|cap| cap.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    AccountResource {
        name: str_at(&object, &["name"]),
        resource_group: resource_group_of(&str_at(&object, &["id"])),
        capabilities,
        additional_data: object,
    }
}

fn database_from(object: Map<String, Value>) -> DatabaseResource {
    DatabaseResource {
        name: str_at(&object, &["name"]),
        additional_data: object,
    }
}

fn container_from(object: Map<String, Value>) -> ContainerResource {
    let indexing_policy = value_at(&object, &["properties", "resource", "indexingPolicy"])
        .and_then(|raw| serde_json::from_value::<IndexingPolicy>(raw.clone()).ok());
    let default_ttl =
        value_at(&object, &["properties", "resource", "defaultTtl"]).and_then(Value::as_i64);
    ContainerResource {
        id: str_at(&object, &["id"]),
        name: str_at(&object, &["name"]),
        indexing_policy,
        default_ttl,
        additional_data: object,
    }
}

fn throughput_from(object: &Map<String, Value>) -> ThroughputSettings {
    ThroughputSettings {
        throughput: value_at(object, &["properties", "resource", "throughput"])
            .and_then(Value::as_i64),
        autoscale_max_throughput: value_at(
            object,
            &["properties", "resource", "autoscaleSettings", "maxThroughput"],
        )
        .and_then(Value::as_i64),
    }
}

pub struct ArmClient {
    client: reqwest::Client,
    endpoint: String,
    credential: Arc<dyn TokenCredential>,
}

impl ArmClient {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credential,
        }
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, api_version)
    }

    async fn get_url<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let token = self.credential.token(RESOURCE_MANAGER_SCOPE).await?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn get(&self, path: &str, api_version: &str) -> Result<Map<String, Value>, ProviderError> {
        self.get_url(&self.url(path, api_version)).await
    }

    /// Follows `nextLink` until the listing is exhausted.
    async fn list(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<Vec<Map<String, Value>>, ProviderError> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path, api_version));
        while let Some(url) = next {
            let page: Page = self.get_url(&url).await?;
            debug!(path, count = page.value.len(), "Fetched resource page");
            items.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }
        Ok(items)
    }
}

#[async_trait]
impl ResourceProvider for ArmClient {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionResource>, ProviderError> {
        let items = self.list("/subscriptions", SUBSCRIPTIONS_API_VERSION).await?;
        Ok(items.into_iter().map(subscription_from).collect())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionResource, ProviderError> {
        let path = format!("/subscriptions/{subscription_id}");
        Ok(subscription_from(
            self.get(&path, SUBSCRIPTIONS_API_VERSION).await?,
        ))
    }

    async fn list_accounts(
        &self,
        subscription: &SubscriptionScope,
    ) -> Result<Vec<AccountResource>, ProviderError> {
        let path = format!(
            "{}/providers/Microsoft.DocumentDB/databaseAccounts",
            subscription.resource_id()
        );
        let items = self.list(&path, COSMOSDB_API_VERSION).await?;
        Ok(items.into_iter().map(account_from).collect())
    }

    async fn get_account(&self, account: &AccountScope) -> Result<AccountResource, ProviderError> {
        Ok(account_from(
            self.get(&account.resource_id(), COSMOSDB_API_VERSION).await?,
        ))
    }

    async fn list_databases(
        &self,
        account: &AccountScope,
    ) -> Result<Vec<DatabaseResource>, ProviderError> {
        let path = format!("{}/sqlDatabases", account.resource_id());
        let items = self.list(&path, COSMOSDB_API_VERSION).await?;
        Ok(items.into_iter().map(database_from).collect())
    }

    async fn get_database(
        &self,
        database: &DatabaseScope,
    ) -> Result<DatabaseResource, ProviderError> {
        Ok(database_from(
            self.get(&database.resource_id(), COSMOSDB_API_VERSION).await?,
        ))
    }

    async fn get_database_throughput(
        &self,
        database: &DatabaseScope,
    ) -> Result<ThroughputSettings, ProviderError> {
        let path = format!("{}/throughputSettings/default", database.resource_id());
        Ok(throughput_from(&self.get(&path, COSMOSDB_API_VERSION).await?))
    }

    async fn list_containers(
        &self,
        database: &DatabaseScope,
    ) -> Result<Vec<ContainerResource>, ProviderError> {
        let path = format!("{}/containers", database.resource_id());
        let items = self.list(&path, COSMOSDB_API_VERSION).await?;
        Ok(items.into_iter().map(container_from).collect())
    }

    async fn get_container(
        &self,
        container: &ContainerScope,
    ) -> Result<ContainerResource, ProviderError> {
        Ok(container_from(
            self.get(&container.resource_id(), COSMOSDB_API_VERSION).await?,
        ))
    }

    async fn get_container_throughput(
        &self,
        container: &ContainerScope,
    ) -> Result<ThroughputSettings, ProviderError> {
        let path = format!("{}/throughputSettings/default", container.resource_id());
        Ok(throughput_from(&self.get(&path, COSMOSDB_API_VERSION).await?))
    }
}
