// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host-side plumbing: a worker pool draining a [`LocalQueue`] and the timer that seeds it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::WatcherError;
use crate::queue::{Delivery, LocalQueue, LocalReceiver, WorkQueue};
use crate::work_item::WorkItem;

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub concurrency: usize,
    /// A delivery failing on this attempt is dropped instead of redelivered.
    pub max_deliveries: u32,
    /// Wait before a failed delivery is handed out again, multiplied by its attempt number.
    pub redelivery_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_deliveries: 5,
            redelivery_backoff: Duration::from_secs(1),
        }
    }
}

pub struct Worker {
    dispatcher: Arc<Dispatcher>,
    queue: LocalQueue,
    receiver: LocalReceiver,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        queue: LocalQueue,
        receiver: LocalReceiver,
        options: WorkerOptions,
    ) -> Self {
        Self {
            dispatcher,
            queue,
            receiver,
            options,
        }
    }

    /// Pulls deliveries until cancelled, then waits for in-flight items to finish.
    pub async fn run(mut self, cancel: CancellationToken) {
        let concurrency = u32::try_from(self.options.concurrency)
            .unwrap_or(u32::MAX)
            .max(1);
        let permits = Arc::new(Semaphore::new(concurrency as usize));
        info!(concurrency, "Worker started");

        loop {
            let permit = tokio::select! {
                () = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let delivery = tokio::select! {
                () = cancel.cancelled() => break,
                delivery = self.receiver.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let queue = self.queue.clone();
            let options = self.options;
            tokio::spawn(async move {
                let _permit = permit;
                process(&dispatcher, &queue, options, delivery).await;
            });
        }

        if permits.acquire_many(concurrency).await.is_err() {
            error!("Worker semaphore closed while waiting for in-flight items");
        }
        info!("Worker stopped");
    }
}

async fn process(
    dispatcher: &Dispatcher,
    queue: &LocalQueue,
    options: WorkerOptions,
    delivery: Delivery,
) {
    let step = delivery.message.execution_function.clone();
    let attempt = delivery.attempt;
    match dispatcher.dispatch(&delivery.message).await {
        Ok(outcome) => {
            debug!(%step, attempt, ?outcome, "Delivery acknowledged");
            queue.settle();
        }
        Err(err) if err.is_retryable() && attempt < options.max_deliveries => {
            warn!(%step, attempt, "Work item failed, scheduling redelivery: {err}");
            let backoff = options.redelivery_backoff * attempt;
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                if let Err(err) = queue.redeliver(delivery) {
                    error!(%step, "Failed to redeliver work item: {err}");
                }
            });
        }
        Err(err) => {
            error!(
                %step,
                attempt,
                payload = delivery.message.payload.as_deref().unwrap_or_default(),
                "Dropping work item: {err}"
            );
            queue.settle();
        }
    }
}

/// Enqueues one crawl seed per period, starting immediately.
pub struct SeedTimer {
    queue: Arc<dyn WorkQueue>,
    period: Duration,
}

impl SeedTimer {
    pub fn new(queue: Arc<dyn WorkQueue>, period: Duration) -> Self {
        Self { queue, period }
    }

    pub async fn seed(&self) -> Result<(), WatcherError> {
        self.queue.enqueue(WorkItem::Subscriptions.encode()?).await?;
        info!("Queued crawl seed");
        Ok(())
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.seed().await {
                        error!("Failed to queue crawl seed: {err}");
                    }
                }
            }
        }
        debug!("Seed timer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_timer_seeds_immediately_and_stops_on_cancel() {
        let (queue, mut receiver) = LocalQueue::new();
        let timer = SeedTimer::new(Arc::new(queue.clone()), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(timer.run(cancel.clone()));

        let delivery = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message.execution_function, "GetSubscriptions");
        assert_eq!(delivery.message.payload, None);
        assert_eq!(delivery.attempt, 1);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(queue.outstanding(), 1);
    }

    #[test]
    fn test_default_options() {
        let options = WorkerOptions::default();
        assert_eq!(options.concurrency, 8);
        assert_eq!(options.max_deliveries, 5);
    }
}
