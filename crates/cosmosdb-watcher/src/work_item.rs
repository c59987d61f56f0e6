// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue messages and the typed work items they carry.
//!
//! On the wire a message is `{"ExecutionFunction": "<step>", "Payload": "<json>"}` where the
//! payload is itself a JSON document encoded as a string. Only the step name decides how the
//! payload is read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WatcherError;
use crate::metrics::MetricStep;
use crate::scope::{AccountScope, ContainerScope, DatabaseScope, SubscriptionScope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "ExecutionFunction")]
    pub execution_function: String,
    #[serde(rename = "Payload", default)]
    pub payload: Option<String>,
}

impl QueueMessage {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    GetSubscriptions,
    GetDatabaseAccounts,
    GetDatabases,
    GetDatabaseThroughput,
    GetCollections,
    GetCollectionThroughput,
    GetCollectionRequestMetrics,
    GetCollectionPKUsageMetrics,
    GetCollectionPartitionSizeMetrics,
    GetCollectionStorageMetrics,
}

impl StepKind {
    pub const ALL: [StepKind; 10] = [
        StepKind::GetSubscriptions,
        StepKind::GetDatabaseAccounts,
        StepKind::GetDatabases,
        StepKind::GetDatabaseThroughput,
        StepKind::GetCollections,
        StepKind::GetCollectionThroughput,
        StepKind::GetCollectionRequestMetrics,
        StepKind::GetCollectionPKUsageMetrics,
        StepKind::GetCollectionPartitionSizeMetrics,
        StepKind::GetCollectionStorageMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::GetSubscriptions => "GetSubscriptions",
            StepKind::GetDatabaseAccounts => "GetDatabaseAccounts",
            StepKind::GetDatabases => "GetDatabases",
            StepKind::GetDatabaseThroughput => "GetDatabaseThroughput",
            StepKind::GetCollections => "GetCollections",
            StepKind::GetCollectionThroughput => "GetCollectionThroughput",
            StepKind::GetCollectionRequestMetrics => "GetCollectionRequestMetrics",
            StepKind::GetCollectionPKUsageMetrics => "GetCollectionPKUsageMetrics",
            StepKind::GetCollectionPartitionSizeMetrics => "GetCollectionPartitionSizeMetrics",
            StepKind::GetCollectionStorageMetrics => "GetCollectionStorageMetrics",
        }
    }

    /// `None` for step names this build does not know.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    fn metric_step(&self) -> Option<MetricStep> {
        match self {
            StepKind::GetCollectionRequestMetrics => Some(MetricStep::Requests),
            StepKind::GetCollectionPKUsageMetrics => Some(MetricStep::PartitionKeyUsage),
            StepKind::GetCollectionPartitionSizeMetrics => Some(MetricStep::PartitionSize),
            StepKind::GetCollectionStorageMetrics => Some(MetricStep::Storage),
            _ => None,
        }
    }
}

impl From<MetricStep> for StepKind {
    fn from(step: MetricStep) -> Self {
        match step {
            MetricStep::Requests => StepKind::GetCollectionRequestMetrics,
            MetricStep::PartitionKeyUsage => StepKind::GetCollectionPKUsageMetrics,
            MetricStep::PartitionSize => StepKind::GetCollectionPartitionSizeMetrics,
            MetricStep::Storage => StepKind::GetCollectionStorageMetrics,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded unit of crawl work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// The seed: enumerate every visible subscription.
    Subscriptions,
    DatabaseAccounts(SubscriptionScope),
    Databases(AccountScope),
    DatabaseThroughput(DatabaseScope),
    Containers(DatabaseScope),
    ContainerThroughput(ContainerScope),
    ContainerMetrics(MetricStep, ContainerScope),
}

/// Metric steps fanned out for every container, in enqueue order.
pub const CONTAINER_METRIC_STEPS: [MetricStep; 4] = [
    MetricStep::Requests,
    MetricStep::PartitionKeyUsage,
    MetricStep::PartitionSize,
    MetricStep::Storage,
];

fn decode_payload<T: DeserializeOwned>(
    kind: StepKind,
    payload: Option<&str>,
) -> Result<T, WatcherError> {
    // A missing payload decodes as `null`, which no scope accepts.
    serde_json::from_str(payload.unwrap_or("null")).map_err(|source| WatcherError::Decode {
        step: kind.to_string(),
        source,
    })
}

fn encode_payload<T: Serialize>(kind: StepKind, scope: &T) -> Result<String, WatcherError> {
    serde_json::to_string(scope)
        .map_err(|err| WatcherError::Enqueue(format!("failed to encode {kind} payload: {err}")))
}

impl WorkItem {
    pub fn kind(&self) -> StepKind {
        match self {
            WorkItem::Subscriptions => StepKind::GetSubscriptions,
            WorkItem::DatabaseAccounts(_) => StepKind::GetDatabaseAccounts,
            WorkItem::Databases(_) => StepKind::GetDatabases,
            WorkItem::DatabaseThroughput(_) => StepKind::GetDatabaseThroughput,
            WorkItem::Containers(_) => StepKind::GetCollections,
            WorkItem::ContainerThroughput(_) => StepKind::GetCollectionThroughput,
            WorkItem::ContainerMetrics(step, _) => StepKind::from(*step),
        }
    }

    /// Decodes a message. Returns `Ok(None)` when the step name is unknown.
    pub fn decode(message: &QueueMessage) -> Result<Option<Self>, WatcherError> {
        let Some(kind) = StepKind::from_name(&message.execution_function) else {
            return Ok(None);
        };
        let payload = message.payload.as_deref();
        let item = match kind {
            StepKind::GetSubscriptions => WorkItem::Subscriptions,
            StepKind::GetDatabaseAccounts => {
                WorkItem::DatabaseAccounts(decode_payload(kind, payload)?)
            }
            StepKind::GetDatabases => WorkItem::Databases(decode_payload(kind, payload)?),
            StepKind::GetDatabaseThroughput => {
                WorkItem::DatabaseThroughput(decode_payload(kind, payload)?)
            }
            StepKind::GetCollections => WorkItem::Containers(decode_payload(kind, payload)?),
            StepKind::GetCollectionThroughput => {
                WorkItem::ContainerThroughput(decode_payload(kind, payload)?)
            }
            StepKind::GetCollectionRequestMetrics
            | StepKind::GetCollectionPKUsageMetrics
            | StepKind::GetCollectionPartitionSizeMetrics
            | StepKind::GetCollectionStorageMetrics => match kind.metric_step() {
                Some(step) => WorkItem::ContainerMetrics(step, decode_payload(kind, payload)?),
                None => return Ok(None),
            },
        };
        Ok(Some(item))
    }

    pub fn encode(&self) -> Result<QueueMessage, WatcherError> {
        let kind = self.kind();
        let payload = match self {
            WorkItem::Subscriptions => None,
            WorkItem::DatabaseAccounts(scope) => Some(encode_payload(kind, scope)?),
            WorkItem::Databases(scope) => Some(encode_payload(kind, scope)?),
            WorkItem::DatabaseThroughput(scope) | WorkItem::Containers(scope) => {
                Some(encode_payload(kind, scope)?)
            }
            WorkItem::ContainerThroughput(scope) | WorkItem::ContainerMetrics(_, scope) => {
                Some(encode_payload(kind, scope)?)
            }
        };
        Ok(QueueMessage {
            execution_function: kind.to_string(),
            payload,
        })
    }
}
