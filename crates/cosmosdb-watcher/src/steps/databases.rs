// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info, warn};

use super::{StepEnv, StepOutput};
use crate::error::WatcherError;
use crate::records::DatabaseThroughputRecord;
use crate::scope::{AccountScope, DatabaseScope};
use crate::throughput::{self, ThroughputLevel};
use crate::work_item::WorkItem;

pub(super) async fn list(
    account: &AccountScope,
    env: &StepEnv,
    out: &mut dyn StepOutput,
) -> Result<(), WatcherError> {
    let account_name = account.account_name();
    env.provider
        .get_account(account)
        .await
        .map_err(|e| WatcherError::provider(format!("reading account {account_name}"), e))?;
    let databases = env
        .provider
        .list_databases(account)
        .await
        .map_err(|e| WatcherError::provider(format!("listing databases of {account_name}"), e))?;
    info!(account = %account_name, count = databases.len(), "Listed databases");

    for database in databases {
        let scope = DatabaseScope::new(account.clone(), database.name);
        out.enqueue(WorkItem::DatabaseThroughput(scope)).await?;
    }
    Ok(())
}

/// Records the database's throughput mode, then queues its container enumeration.
pub(super) async fn throughput(
    database: &DatabaseScope,
    env: &StepEnv,
    out: &mut dyn StepOutput,
) -> Result<(), WatcherError> {
    let context = format!(
        "{}/{}",
        database.account().account_name(),
        database.database_name()
    );
    let resource = env
        .provider
        .get_database(database)
        .await
        .map_err(|e| WatcherError::provider(format!("reading database {context}"), e))?;

    let read = env.provider.get_database_throughput(database).await;
    let verdict = throughput::resolve(read, ThroughputLevel::Database).map_err(|e| {
        WatcherError::provider(format!("reading throughput of database {context}"), e)
    })?;
    debug!(database = %context, mode = %verdict.mode, "Resolved database throughput");

    let record = DatabaseThroughputRecord::new(env.now, database, verdict, resource.additional_data);
    if record.database_account_name.trim().is_empty() {
        warn!(database = %context, "Database scope has no account name, not recording it");
        return Ok(());
    }
    out.upload(vec![record.into()]).await?;
    out.enqueue(WorkItem::Containers(database.clone())).await?;
    Ok(())
}
