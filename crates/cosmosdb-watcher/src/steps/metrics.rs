// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info};

use super::{StepEnv, StepOutput};
use crate::error::WatcherError;
use crate::metrics::{self, MetricStep};
use crate::records::UploadRecord;
use crate::scope::ContainerScope;

pub(super) async fn run(
    step: MetricStep,
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
    let records = metrics::collect(env.metrics.as_ref(), step, container, env.now)
        .await
        .map_err(|e| WatcherError::provider(format!("querying {step:?} metrics of {context}"), e))?;

    if records.is_empty() {
        debug!(container = %context, ?step, "No metric samples, skipping upload");
        return Ok(());
    }
    info!(container = %context, ?step, records = records.len(), "Collected container metrics");
    out.upload(records.into_iter().map(UploadRecord::from).collect())
        .await
}
