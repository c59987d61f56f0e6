// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rows uploaded to the telemetry backend.
//!
//! Column names are the ones the ingestion streams were provisioned with; every row carries its
//! natural key (account/database/container names, plus timestamp and dimensions for metrics) so
//! redelivered steps can be deduplicated downstream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::provider::AdditionalData;
use crate::scope::{AccountScope, ApiKind, CapacityMode, ContainerScope, DatabaseScope};
use crate::throughput::{ThroughputMode, ThroughputVerdict};

/// Logical destination stream. Each maps to one configured rule/stream pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    DatabaseAccounts,
    Databases,
    Containers,
    ContainerMetrics,
    CostData,
}

impl StreamKind {
    pub const ALL: [StreamKind; 5] = [
        StreamKind::DatabaseAccounts,
        StreamKind::Databases,
        StreamKind::Containers,
        StreamKind::ContainerMetrics,
        StreamKind::CostData,
    ];

    /// Suffix used by the configuration variables for this stream.
    pub fn env_suffix(&self) -> &'static str {
        match self {
            StreamKind::DatabaseAccounts => "DATABASE_ACCOUNTS",
            StreamKind::Databases => "DATABASES",
            StreamKind::Containers => "CONTAINERS",
            StreamKind::ContainerMetrics => "CONTAINER_METRICS",
            StreamKind::CostData => "COST_DATA",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamKind::DatabaseAccounts => "database-accounts",
            StreamKind::Databases => "databases",
            StreamKind::Containers => "containers",
            StreamKind::ContainerMetrics => "container-metrics",
            StreamKind::CostData => "cost-data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountRecord {
    pub time_generated: DateTime<Utc>,
    pub subscription_id: String,
    pub subscription_name: String,
    pub resource_group: String,
    pub database_account_name: String,
    #[serde(rename = "APIKind")]
    pub api_kind: ApiKind,
    pub capacity_mode: CapacityMode,
    pub additional_data: AdditionalData,
}

impl AccountRecord {
    pub fn new(
        time_generated: DateTime<Utc>,
        account: &AccountScope,
        additional_data: AdditionalData,
    ) -> Self {
        Self {
            time_generated,
            subscription_id: account.subscription().subscription_id().to_string(),
            subscription_name: account.subscription().display_name().to_string(),
            resource_group: account.resource_group().to_string(),
            database_account_name: account.account_name().to_string(),
            api_kind: account.api_kind(),
            capacity_mode: account.capacity_mode(),
            additional_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseThroughputRecord {
    pub time_generated: DateTime<Utc>,
    pub database_account_name: String,
    pub database_name: String,
    pub database_throughput_mode: ThroughputMode,
    pub database_throughput_type: Option<&'static str>,
    pub database_throughput: Option<i64>,
    pub additional_data: AdditionalData,
}

impl DatabaseThroughputRecord {
    pub fn new(
        time_generated: DateTime<Utc>,
        database: &DatabaseScope,
        verdict: ThroughputVerdict,
        additional_data: AdditionalData,
    ) -> Self {
        Self {
            time_generated,
            database_account_name: database.account().account_name().to_string(),
            database_name: database.database_name().to_string(),
            database_throughput_mode: verdict.mode,
            database_throughput_type: verdict.type_column(),
            database_throughput: verdict.value,
            additional_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerThroughputRecord {
    pub time_generated: DateTime<Utc>,
    pub database_account_name: String,
    pub database_name: String,
    pub container_name: String,
    pub container_throughput_mode: ThroughputMode,
    pub container_throughput_type: Option<&'static str>,
    pub container_throughput: Option<i64>,
    pub container_indexing_is_default: bool,
    #[serde(rename = "ContainerTTL")]
    pub container_ttl: Option<i64>,
    pub additional_data: AdditionalData,
}

/// Container facts read alongside the throughput setting.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSettings {
    pub indexing_is_default: bool,
    pub ttl: Option<i64>,
    pub additional_data: AdditionalData,
}

impl ContainerThroughputRecord {
    pub fn new(
        time_generated: DateTime<Utc>,
        container: &ContainerScope,
        verdict: ThroughputVerdict,
        settings: ContainerSettings,
    ) -> Self {
        Self {
            time_generated,
            database_account_name: container.account().account_name().to_string(),
            database_name: container.database().database_name().to_string(),
            container_name: container.container_name().to_string(),
            container_throughput_mode: verdict.mode,
            container_throughput_type: verdict.type_column(),
            container_throughput: verdict.value,
            container_indexing_is_default: settings.indexing_is_default,
            container_ttl: settings.ttl,
            additional_data: settings.additional_data,
        }
    }
}

/// Per-metric dimensions attached to a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricDimensions {
    #[serde(rename_all = "PascalCase")]
    Request {
        operation_type: Option<String>,
        region: Option<String>,
        status_code: Option<i32>,
    },
    #[serde(rename_all = "PascalCase")]
    PartitionKeyUsage {
        region: Option<String>,
        partition_key_range_id: Option<String>,
        physical_partition_id: Option<String>,
    },
    #[serde(rename_all = "PascalCase")]
    PartitionSize {
        region: Option<String>,
        physical_partition_id: Option<String>,
        partition_size: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricRecord {
    pub time_generated: DateTime<Utc>,
    pub database_account_name: String,
    pub database_name: String,
    pub container_name: String,
    pub metric_timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub metric_value: f64,
    pub metric_metadata: Option<MetricDimensions>,
}

/// One cost-export row for a Cosmos DB meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CostRecord {
    pub time_generated: DateTime<Utc>,
    pub database_account_name: String,
    pub database_name: Option<String>,
    pub container_name: Option<String>,
    pub container_rid: Option<String>,
    pub usage_timestamp: String,
    pub meter_category: String,
    pub meter_subcategory: String,
    pub meter_id: String,
    pub meter_name: String,
    pub usage_type: Option<String>,
    pub meter_region: Option<String>,
    pub usage_quantity: f64,
    pub resource_rate: f64,
    pub pre_tax_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UploadRecord {
    Account(AccountRecord),
    DatabaseThroughput(DatabaseThroughputRecord),
    ContainerThroughput(ContainerThroughputRecord),
    Metric(MetricRecord),
    Cost(CostRecord),
}

impl UploadRecord {
    pub fn stream(&self) -> StreamKind {
        match self {
            UploadRecord::Account(_) => StreamKind::DatabaseAccounts,
            UploadRecord::DatabaseThroughput(_) => StreamKind::Databases,
            UploadRecord::ContainerThroughput(_) => StreamKind::Containers,
            UploadRecord::Metric(_) => StreamKind::ContainerMetrics,
            UploadRecord::Cost(_) => StreamKind::CostData,
        }
    }
}

impl From<AccountRecord> for UploadRecord {
    fn from(record: AccountRecord) -> Self {
        UploadRecord::Account(record)
    }
}

impl From<DatabaseThroughputRecord> for UploadRecord {
    fn from(record: DatabaseThroughputRecord) -> Self {
        UploadRecord::DatabaseThroughput(record)
    }
}

impl From<ContainerThroughputRecord> for UploadRecord {
    fn from(record: ContainerThroughputRecord) -> Self {
        UploadRecord::ContainerThroughput(record)
    }
}

impl From<MetricRecord> for UploadRecord {
    fn from(record: MetricRecord) -> Self {
        UploadRecord::Metric(record)
    }
}

impl From<CostRecord> for UploadRecord {
    fn from(record: CostRecord) -> Self {
        UploadRecord::Cost(record)
    }
}
