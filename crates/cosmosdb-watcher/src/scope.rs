// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Self-contained identities for every level of the crawl.
//!
//! A child scope embeds its parent by value, so a single decoded payload is enough to address the
//! resource it names without any lookup. Field names on the wire match the queue payloads the
//! watcher has always produced.

use serde::{Deserialize, Serialize};
use std::fmt;

const DOCUMENTDB_PROVIDER: &str = "Microsoft.DocumentDB/databaseAccounts";

const CAPABILITY_SERVERLESS: &str = "EnableServerless";

/// Capability flags that select an account's API, highest precedence first.
const API_KIND_CAPABILITIES: [(&str, ApiKind); 4] = [
    ("EnableMongo", ApiKind::Mongo),
    ("EnableCassandra", ApiKind::Cassandra),
    ("EnableTable", ApiKind::Table),
    ("EnableGremlin", ApiKind::Gremlin),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiKind {
    #[serde(rename = "NoSQL")]
    NoSql,
    Mongo,
    Cassandra,
    Table,
    Gremlin,
}

impl ApiKind {
    pub fn from_capabilities<S: AsRef<str>>(capabilities: &[S]) -> Self {
        API_KIND_CAPABILITIES
            .iter()
            .find(|(flag, _)| capabilities.iter().any(|c| c.as_ref() == *flag))
            .map(|(_, kind)| *kind)
            .unwrap_or(ApiKind::NoSql)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKind::NoSql => "NoSQL",
            ApiKind::Mongo => "Mongo",
            ApiKind::Cassandra => "Cassandra",
            ApiKind::Table => "Table",
            ApiKind::Gremlin => "Gremlin",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapacityMode {
    Serverless,
    #[serde(rename = "Provisioned throughput")]
    ProvisionedThroughput,
}

impl CapacityMode {
    pub fn from_capabilities<S: AsRef<str>>(capabilities: &[S]) -> Self {
        if capabilities
            .iter()
            .any(|c| c.as_ref() == CAPABILITY_SERVERLESS)
        {
            CapacityMode::Serverless
        } else {
            CapacityMode::ProvisionedThroughput
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityMode::Serverless => "Serverless",
            CapacityMode::ProvisionedThroughput => "Provisioned throughput",
        }
    }
}

impl fmt::Display for CapacityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionScope {
    #[serde(rename = "SubscriptionId")]
    subscription_id: String,
    #[serde(rename = "Name", default)]
    display_name: String,
}

impl SubscriptionScope {
    pub fn new(subscription_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn resource_id(&self) -> String {
        format!("/subscriptions/{}", self.subscription_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountScope {
    #[serde(rename = "Subscription")]
    subscription: SubscriptionScope,
    #[serde(rename = "ResourceGroupName")]
    resource_group: String,
    #[serde(rename = "Name")]
    account_name: String,
    #[serde(rename = "APIKind")]
    api_kind: ApiKind,
    #[serde(rename = "CapacityMode")]
    capacity_mode: CapacityMode,
}

impl AccountScope {
    pub fn new(
        subscription: SubscriptionScope,
        resource_group: impl Into<String>,
        account_name: impl Into<String>,
        api_kind: ApiKind,
        capacity_mode: CapacityMode,
    ) -> Self {
        Self {
            subscription,
            resource_group: resource_group.into(),
            account_name: account_name.into(),
            api_kind,
            capacity_mode,
        }
    }

    /// Derives API kind and capacity mode from the account's capability flags.
    pub fn from_capabilities<S: AsRef<str>>(
        subscription: SubscriptionScope,
        resource_group: impl Into<String>,
        account_name: impl Into<String>,
        capabilities: &[S],
    ) -> Self {
        Self::new(
            subscription,
            resource_group,
            account_name,
            ApiKind::from_capabilities(capabilities),
            CapacityMode::from_capabilities(capabilities),
        )
    }

    pub fn subscription(&self) -> &SubscriptionScope {
        &self.subscription
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn api_kind(&self) -> ApiKind {
        self.api_kind
    }

    pub fn capacity_mode(&self) -> CapacityMode {
        self.capacity_mode
    }

    pub fn resource_id(&self) -> String {
        format!(
            "{}/resourceGroups/{}/providers/{}/{}",
            self.subscription.resource_id(),
            self.resource_group,
            DOCUMENTDB_PROVIDER,
            self.account_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseScope {
    #[serde(rename = "DatabaseAccount")]
    account: AccountScope,
    #[serde(rename = "Name")]
    database_name: String,
}

impl DatabaseScope {
    pub fn new(account: AccountScope, database_name: impl Into<String>) -> Self {
        Self {
            account,
            database_name: database_name.into(),
        }
    }

    pub fn account(&self) -> &AccountScope {
        &self.account
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn resource_id(&self) -> String {
        format!(
            "{}/sqlDatabases/{}",
            self.account.resource_id(),
            self.database_name
        )
    }
}

/// A container plus everything above it.
///
/// `is_shared` stays `false` until the container-throughput step resolves it; resolution yields a
/// new scope through [`ContainerScope::with_shared`] rather than mutating the decoded one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerScope {
    #[serde(rename = "Database")]
    database: DatabaseScope,
    #[serde(rename = "Identifier", default)]
    container_id: String,
    #[serde(rename = "Name")]
    container_name: String,
    #[serde(rename = "IsShared", default)]
    is_shared: bool,
}

impl ContainerScope {
    pub fn new(
        database: DatabaseScope,
        container_id: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            database,
            container_id: container_id.into(),
            container_name: container_name.into(),
            is_shared: false,
        }
    }

    #[must_use]
    pub fn with_shared(&self, is_shared: bool) -> Self {
        Self {
            is_shared,
            ..self.clone()
        }
    }

    pub fn database(&self) -> &DatabaseScope {
        &self.database
    }

    pub fn account(&self) -> &AccountScope {
        self.database.account()
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    /// The provider-assigned id when known, otherwise the id derived from the hierarchy.
    pub fn resource_id(&self) -> String {
        if self.container_id.is_empty() {
            format!(
                "{}/containers/{}",
                self.database.resource_id(),
                self.container_name
            )
        } else {
            self.container_id.clone()
        }
    }
}
