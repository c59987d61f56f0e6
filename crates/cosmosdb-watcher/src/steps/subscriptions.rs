// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info};

use super::{StepEnv, StepOutput};
use crate::error::WatcherError;
use crate::scope::SubscriptionScope;
use crate::work_item::WorkItem;

/// Seed step: one account enumeration per visible subscription.
pub(super) async fn run(env: &StepEnv, out: &mut dyn StepOutput) -> Result<(), WatcherError> {
    let subscriptions = env
        .provider
        .list_subscriptions()
        .await
        .map_err(|e| WatcherError::provider("listing subscriptions", e))?;
    info!(count = subscriptions.len(), "Listed subscriptions");

    for subscription in subscriptions {
        debug!(subscription = %subscription.subscription_id, "Queueing account enumeration");
        let scope = SubscriptionScope::new(subscription.subscription_id, subscription.display_name);
        out.enqueue(WorkItem::DatabaseAccounts(scope)).await?;
    }
    Ok(())
}
