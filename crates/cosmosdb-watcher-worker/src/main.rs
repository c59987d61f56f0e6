// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cosmosdb_watcher::{
    azure::{
        arm::ArmClient, auth::AzureCredential, build_client, ingestion::IngestionClient,
        monitor::MonitorClient,
    },
    queue::{LocalQueue, WorkQueue},
    sink::UploadBatcher,
    worker::{SeedTimer, Worker, WorkerOptions},
    Dispatcher, WatcherConfig,
};

/// Silences the HTTP stack and applies the configured level everywhere else.
fn env_filter(log_level: &str) -> String {
    format!("h2=off,hyper=off,rustls=off,reqwest=off,{log_level}")
}

#[tokio::main]
pub async fn main() {
    let config = WatcherConfig::from_env();
    let log_level = config
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| WatcherConfig::default().log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter(&log_level))
                .expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}. Shutting down watcher.");
            return;
        }
    };

    let client = match build_client(config.https_proxy.as_deref(), config.request_timeout) {
        Ok(client) => client,
        Err(e) => {
            error!("{e}. Shutting down watcher.");
            return;
        }
    };

    let credential = match AzureCredential::from_config(config.credential.clone(), client.clone())
    {
        Ok(credential) => Arc::new(credential),
        Err(e) => {
            error!("{e}. Shutting down watcher.");
            return;
        }
    };

    // Validation guarantees the ingestion endpoint is present.
    let ingestion_endpoint = config.ingestion_endpoint.clone().unwrap_or_default();

    let provider = Arc::new(ArmClient::new(
        client.clone(),
        &config.resource_manager_endpoint,
        credential.clone(),
    ));
    let metrics = Arc::new(MonitorClient::new(
        client.clone(),
        &config.resource_manager_endpoint,
        credential.clone(),
    ));
    let sink = Arc::new(IngestionClient::new(
        client,
        ingestion_endpoint,
        credential,
        config.destinations.clone(),
        config.compress_uploads,
    ));

    let (queue, receiver) = LocalQueue::new();
    let shared_queue: Arc<dyn WorkQueue> = Arc::new(queue.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        provider,
        metrics,
        UploadBatcher::new(sink, config.upload_max_bytes),
        Arc::clone(&shared_queue),
    ));
    let worker = Worker::new(
        dispatcher,
        queue.clone(),
        receiver,
        WorkerOptions {
            concurrency: config.concurrency,
            max_deliveries: config.max_deliveries,
            ..WorkerOptions::default()
        },
    );

    let cancel = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(cancel.clone()));
    let seed_timer = SeedTimer::new(shared_queue, config.seed_interval);

    if config.run_once {
        if let Err(e) = seed_timer.seed().await {
            error!("{e}. Shutting down watcher.");
            cancel.cancel();
        } else {
            tokio::select! {
                () = queue.wait_drained() => info!("Crawl finished"),
                _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
            }
            cancel.cancel();
        }
    } else {
        let seed_handle = tokio::spawn(seed_timer.run(cancel.clone()));
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
        }
        info!("Shutting down watcher");
        cancel.cancel();
        if let Err(e) = seed_handle.await {
            error!("Seed timer task failed: {e}");
        }
    }

    if let Err(e) = worker_handle.await {
        error!("Worker task failed: {e}");
    }
}
