// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixture builders and an output that keeps emit order

use chrono::{DateTime, TimeZone, Utc};
use cosmosdb_watcher::{
    indexing::IndexingPolicy,
    metrics::{MetricSample, MetricSeries, MetricsSource},
    provider::{
        AccountResource, ContainerResource, DatabaseResource, ResourceProvider,
        SubscriptionResource,
    },
    records::{StreamKind, UploadRecord},
    scope::{
        AccountScope, ApiKind, CapacityMode, ContainerScope, DatabaseScope, SubscriptionScope,
    },
    steps::{StepEnv, StepOutput},
    StepKind, WatcherError, WorkItem,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000001";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn env(provider: Arc<dyn ResourceProvider>, metrics: Arc<dyn MetricsSource>) -> StepEnv {
    StepEnv {
        provider,
        metrics,
        now: now(),
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn subscription() -> SubscriptionResource {
    SubscriptionResource {
        subscription_id: SUBSCRIPTION_ID.to_string(),
        display_name: "Production".to_string(),
    }
}

pub fn subscription_scope() -> SubscriptionScope {
    SubscriptionScope::new(SUBSCRIPTION_ID, "Production")
}

pub fn account(name: &str, capabilities: &[&str]) -> AccountResource {
    let id = format!(
        "/subscriptions/{SUBSCRIPTION_ID}/resourceGroups/rg-data/providers/Microsoft.DocumentDB/databaseAccounts/{name}"
    );
    AccountResource {
        name: name.to_string(),
        resource_group: "rg-data".to_string(),
        capabilities: capabilities.iter().map(|c| (*c).to_string()).collect(),
        additional_data: object(json!({"id": id, "location": "West US"})),
    }
}

pub fn account_scope(name: &str) -> AccountScope {
    AccountScope::new(
        subscription_scope(),
        "rg-data",
        name,
        ApiKind::NoSql,
        CapacityMode::ProvisionedThroughput,
    )
}

pub fn database(name: &str) -> DatabaseResource {
    DatabaseResource {
        name: name.to_string(),
        additional_data: object(json!({"name": name, "properties": {"resource": {"id": name}}})),
    }
}

pub fn database_scope(account: &str, name: &str) -> DatabaseScope {
    DatabaseScope::new(account_scope(account), name)
}

pub fn container(
    name: &str,
    indexing_policy: Option<IndexingPolicy>,
    ttl: Option<i64>,
) -> ContainerResource {
    ContainerResource {
        id: format!("/dbs/db/colls/{name}"),
        name: name.to_string(),
        indexing_policy,
        default_ttl: ttl,
        additional_data: object(json!({"name": name})),
    }
}

pub fn container_scope(account: &str, database: &str, name: &str) -> ContainerScope {
    ContainerScope::new(database_scope(account, database), "", name)
}

pub fn sample(minute: u32, value: f64) -> MetricSample {
    MetricSample {
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 11, minute, 0).unwrap(),
        count: Some(value),
        maximum: Some(value),
        total: Some(value),
        ..MetricSample::default()
    }
}

pub fn series(metadata: &[(&str, &str)], samples: Vec<MetricSample>) -> MetricSeries {
    MetricSeries {
        metadata: metadata
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        samples,
    }
}

/// What a handler emitted, in emit order.
#[derive(Debug, Clone, PartialEq)]
pub enum Emitted {
    Upload(Vec<StreamKind>),
    Enqueue(StepKind),
}

#[derive(Debug, Default)]
pub struct OrderedOutput {
    pub events: Vec<Emitted>,
    pub records: Vec<UploadRecord>,
    pub items: Vec<WorkItem>,
}

#[async_trait::async_trait]
impl StepOutput for OrderedOutput {
    async fn upload(&mut self, records: Vec<UploadRecord>) -> Result<(), WatcherError> {
        self.events
            .push(Emitted::Upload(records.iter().map(UploadRecord::stream).collect()));
        self.records.extend(records);
        Ok(())
    }

    async fn enqueue(&mut self, item: WorkItem) -> Result<(), WatcherError> {
        self.events.push(Emitted::Enqueue(item.kind()));
        self.items.push(item);
        Ok(())
    }
}
