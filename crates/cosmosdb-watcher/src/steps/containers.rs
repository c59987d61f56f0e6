// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info, warn};

use super::{StepEnv, StepOutput};
use crate::error::WatcherError;
use crate::indexing::is_default_indexing;
use crate::records::{ContainerSettings, ContainerThroughputRecord};
use crate::scope::{ContainerScope, DatabaseScope};
use crate::throughput::{self, ThroughputLevel, ThroughputMode};
use crate::work_item::{WorkItem, CONTAINER_METRIC_STEPS};

pub(super) async fn list(
    database: &DatabaseScope,
    env: &StepEnv,
    out: &mut dyn StepOutput,
) -> Result<(), WatcherError> {
    let containers = env.provider.list_containers(database).await.map_err(|e| {
        WatcherError::provider(
            format!(
                "listing containers of {}/{}",
                database.account().account_name(),
                database.database_name()
            ),
            e,
        )
    })?;
    info!(
        account = %database.account().account_name(),
        database = %database.database_name(),
        count = containers.len(),
        "Listed containers"
    );

    for container in containers {
        // Sharing is unknown until the throughput step reads it.
        let scope = ContainerScope::new(database.clone(), container.id, container.name);
        out.enqueue(WorkItem::ContainerThroughput(scope)).await?;
    }
    Ok(())
}

/// Records the container's throughput mode and settings, then fans out its metric steps.
pub(super) async fn throughput(
    container: &ContainerScope,
    env: &StepEnv,
    out: &mut dyn StepOutput,
) -> Result<(), WatcherError> {
    let context = format!(
        "{}/{}/{}",
        container.account().account_name(),
        container.database().database_name(),
        container.container_name()
    );
    let resource = env
        .provider
        .get_container(container)
        .await
        .map_err(|e| WatcherError::provider(format!("reading container {context}"), e))?;
    let settings = ContainerSettings {
        indexing_is_default: is_default_indexing(resource.indexing_policy.as_ref()),
        ttl: resource.default_ttl,
        additional_data: resource.additional_data,
    };

    let read = env.provider.get_container_throughput(container).await;
    let verdict = throughput::resolve(read, ThroughputLevel::Container).map_err(|e| {
        WatcherError::provider(format!("reading throughput of container {context}"), e)
    })?;
    debug!(container = %context, mode = %verdict.mode, "Resolved container throughput");

    let record = ContainerThroughputRecord::new(env.now, container, verdict, settings);
    if record.database_account_name.trim().is_empty() {
        warn!(container = %context, "Container scope has no account name, not recording it");
        return Ok(());
    }
    out.upload(vec![record.into()]).await?;

    let resolved = container.with_shared(verdict.mode == ThroughputMode::Shared);
    for step in CONTAINER_METRIC_STEPS {
        out.enqueue(WorkItem::ContainerMetrics(step, resolved.clone()))
            .await?;
    }
    Ok(())
}
