// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One handler per level of the crawl.
//!
//! A handler reads exactly the scope named in its work item, hands finished records and
//! follow-on items to a [`StepOutput`] as soon as it has them, and returns. When a handler fails
//! nothing after the failure point is emitted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::WatcherError;
use crate::metrics::MetricsSource;
use crate::provider::ResourceProvider;
use crate::records::UploadRecord;
use crate::work_item::WorkItem;

mod accounts;
mod containers;
mod databases;
mod metrics;
mod subscriptions;

/// Read-only collaborators shared by every handler.
#[derive(Clone)]
pub struct StepEnv {
    pub provider: Arc<dyn ResourceProvider>,
    pub metrics: Arc<dyn MetricsSource>,
    /// Stamped on every record produced by this step.
    pub now: DateTime<Utc>,
}

/// Where a handler's results go, in the order they are produced.
#[async_trait]
pub trait StepOutput: Send {
    /// Called only with a non-empty set of records.
    async fn upload(&mut self, records: Vec<UploadRecord>) -> Result<(), WatcherError>;

    async fn enqueue(&mut self, item: WorkItem) -> Result<(), WatcherError>;
}

/// Keeps everything a step emits in memory.
#[derive(Debug, Default)]
pub struct CollectingOutput {
    pub records: Vec<UploadRecord>,
    pub items: Vec<WorkItem>,
    /// Number of upload calls made, regardless of size.
    pub uploads: usize,
}

#[async_trait]
impl StepOutput for CollectingOutput {
    async fn upload(&mut self, records: Vec<UploadRecord>) -> Result<(), WatcherError> {
        self.uploads += 1;
        self.records.extend(records);
        Ok(())
    }

    async fn enqueue(&mut self, item: WorkItem) -> Result<(), WatcherError> {
        self.items.push(item);
        Ok(())
    }
}

/// Runs the handler for `item`.
pub async fn execute(
    item: &WorkItem,
    env: &StepEnv,
    out: &mut dyn StepOutput,
) -> Result<(), WatcherError> {
    match item {
        WorkItem::Subscriptions => subscriptions::run(env, out).await,
        WorkItem::DatabaseAccounts(subscription) => accounts::run(subscription, env, out).await,
        WorkItem::Databases(account) => databases::list(account, env, out).await,
        WorkItem::DatabaseThroughput(database) => {
            databases::throughput(database, env, out).await
        }
        WorkItem::Containers(database) => containers::list(database, env, out).await,
        WorkItem::ContainerThroughput(container) => {
            containers::throughput(container, env, out).await
        }
        WorkItem::ContainerMetrics(step, container) => {
            metrics::run(*step, container, env, out).await
        }
    }
}

/// Runs the handler for `item` and returns what it produced.
pub async fn collect(item: &WorkItem, env: &StepEnv) -> Result<CollectingOutput, WatcherError> {
    let mut out = CollectingOutput::default();
    execute(item, env, &mut out).await?;
    Ok(out)
}
