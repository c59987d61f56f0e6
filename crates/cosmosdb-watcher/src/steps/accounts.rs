// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info};

use super::{StepEnv, StepOutput};
use crate::error::WatcherError;
use crate::records::AccountRecord;
use crate::scope::{AccountScope, SubscriptionScope};
use crate::work_item::WorkItem;

/// Uploads one record per account and queues its database enumeration.
///
/// Each account is finished (record uploaded, follow-on queued) before the next one starts, so a
/// failure part way through only loses the accounts not yet reached.
pub(super) async fn run(
    subscription: &SubscriptionScope,
    env: &StepEnv,
    out: &mut dyn StepOutput,
) -> Result<(), WatcherError> {
    let subscription_id = subscription.subscription_id();
    env.provider
        .get_subscription(subscription_id)
        .await
        .map_err(|e| WatcherError::provider(format!("reading subscription {subscription_id}"), e))?;

    let accounts = env
        .provider
        .list_accounts(subscription)
        .await
        .map_err(|e| {
            WatcherError::provider(format!("listing accounts of subscription {subscription_id}"), e)
        })?;
    info!(subscription = %subscription_id, count = accounts.len(), "Listed database accounts");

    for account in accounts {
        let scope = AccountScope::from_capabilities(
            subscription.clone(),
            account.resource_group,
            account.name,
            &account.capabilities,
        );
        debug!(
            account = %scope.account_name(),
            api_kind = %scope.api_kind(),
            capacity_mode = %scope.capacity_mode(),
            "Recording database account"
        );
        let record = AccountRecord::new(env.now, &scope, account.additional_data);
        out.upload(vec![record.into()]).await?;
        out.enqueue(WorkItem::Databases(scope)).await?;
    }
    Ok(())
}

