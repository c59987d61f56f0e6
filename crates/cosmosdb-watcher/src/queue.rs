// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::error::WatcherError;
use crate::work_item::QueueMessage;

/// Producer side of the work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), WatcherError>;
}

/// A message handed to a consumer, with the number of times it has been handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: QueueMessage,
    pub attempt: u32,
}

#[derive(Default)]
struct Outstanding {
    count: AtomicUsize,
    drained: Notify,
}

/// In-process FIFO standing in for a durable queue.
///
/// Every enqueued message stays outstanding until the consumer settles it, so callers can wait
/// for a crawl to run dry.
#[derive(Clone)]
pub struct LocalQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    outstanding: Arc<Outstanding>,
}

pub struct LocalReceiver {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl LocalReceiver {
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

impl LocalQueue {
    pub fn new() -> (Self, LocalReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            outstanding: Arc::new(Outstanding::default()),
        };
        (queue, LocalReceiver { rx })
    }

    fn send(&self, delivery: Delivery) -> Result<(), WatcherError> {
        self.tx
            .send(delivery)
            .map_err(|e| WatcherError::Enqueue(format!("local queue closed: {e}")))
    }

    /// Hands a failed delivery out again. It stays outstanding.
    pub fn redeliver(&self, delivery: Delivery) -> Result<(), WatcherError> {
        let redelivery = Delivery {
            message: delivery.message,
            attempt: delivery.attempt + 1,
        };
        if let Err(err) = self.send(redelivery) {
            self.settle();
            return Err(err);
        }
        Ok(())
    }

    /// Marks one delivery as finished, whether it succeeded or was dropped.
    pub fn settle(&self) {
        let previous = self
            .outstanding
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            debug!("Local queue drained");
            self.outstanding.drained.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.count.load(Ordering::Acquire)
    }

    /// Resolves once no message is queued or in flight.
    pub async fn wait_drained(&self) {
        loop {
            let drained = self.outstanding.drained.notified();
            if self.outstanding() == 0 {
                return;
            }
            drained.await;
        }
    }
}

#[async_trait]
impl WorkQueue for LocalQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), WatcherError> {
        self.outstanding.count.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.send(Delivery {
            message,
            attempt: 1,
        }) {
            self.settle();
            return Err(err);
        }
        Ok(())
    }
}
