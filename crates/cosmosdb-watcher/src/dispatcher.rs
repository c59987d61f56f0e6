// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::WatcherError;
use crate::metrics::MetricsSource;
use crate::provider::ResourceProvider;
use crate::queue::WorkQueue;
use crate::records::UploadRecord;
use crate::sink::UploadBatcher;
use crate::steps::{self, StepEnv, StepOutput};
use crate::work_item::{QueueMessage, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed { records: usize, follow_ons: usize },
    /// The step name is unknown to this build; the message was dropped.
    Skipped,
}

/// Uploads and enqueues as soon as the handler emits.
struct ForwardingOutput<'a> {
    uploads: &'a UploadBatcher,
    queue: &'a dyn WorkQueue,
    records: usize,
    follow_ons: usize,
}

#[async_trait]
impl StepOutput for ForwardingOutput<'_> {
    async fn upload(&mut self, records: Vec<UploadRecord>) -> Result<(), WatcherError> {
        self.records += self.uploads.upload(&records).await?;
        Ok(())
    }

    async fn enqueue(&mut self, item: WorkItem) -> Result<(), WatcherError> {
        let message = item.encode()?;
        self.queue.enqueue(message).await?;
        self.follow_ons += 1;
        Ok(())
    }
}

/// Routes each delivered message to its step handler.
pub struct Dispatcher {
    provider: Arc<dyn ResourceProvider>,
    metrics: Arc<dyn MetricsSource>,
    uploads: UploadBatcher,
    queue: Arc<dyn WorkQueue>,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn ResourceProvider>,
        metrics: Arc<dyn MetricsSource>,
        uploads: UploadBatcher,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            provider,
            metrics,
            uploads,
            queue,
        }
    }

    fn env(&self) -> StepEnv {
        StepEnv {
            provider: Arc::clone(&self.provider),
            metrics: Arc::clone(&self.metrics),
            now: Utc::now(),
        }
    }

    /// Processes one message to completion.
    ///
    /// Unknown step names are dropped with a warning. Handler errors are returned without any
    /// retry; redelivery belongs to the queue.
    pub async fn dispatch(&self, message: &QueueMessage) -> Result<DispatchOutcome, WatcherError> {
        let Some(item) = WorkItem::decode(message)? else {
            warn!(
                step = %message.execution_function,
                "Unknown step kind, dropping message"
            );
            return Ok(DispatchOutcome::Skipped);
        };
        let step = item.kind();
        info!(%step, "Processing work item");

        let mut out = ForwardingOutput {
            uploads: &self.uploads,
            queue: self.queue.as_ref(),
            records: 0,
            follow_ons: 0,
        };
        steps::execute(&item, &self.env(), &mut out).await?;

        debug!(
            %step,
            records = out.records,
            follow_ons = out.follow_ons,
            "Work item completed"
        );
        Ok(DispatchOutcome::Completed {
            records: out.records,
            follow_ons: out.follow_ons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::arm::ArmClient;
    use crate::azure::auth::AzureCredential;
    use crate::azure::monitor::MonitorClient;
    use crate::config::CredentialSource;
    use crate::error::ProviderError;
    use crate::queue::LocalQueue;
    use crate::sink::{TelemetrySink, UploadBatch};
    use std::time::Duration;
    use tracing_test::traced_test;

    struct NoSink;

    #[async_trait]
    impl TelemetrySink for NoSink {
        async fn upload(&self, _batch: &UploadBatch) -> Result<(), ProviderError> {
            Err(ProviderError::transport("not expected"))
        }
    }

    /// A dispatcher whose collaborators point at an unreachable endpoint.
    fn dispatcher() -> (Dispatcher, LocalQueue) {
        let client = crate::azure::build_client(None, Duration::from_millis(50)).unwrap();
        let credential = Arc::new(AzureCredential::new(
            CredentialSource::StaticToken("unused".to_string()),
            client.clone(),
        ));
        let endpoint = "http://127.0.0.1:9";
        let (queue, _receiver) = LocalQueue::new();
        let dispatcher = Dispatcher::new(
            Arc::new(ArmClient::new(client.clone(), endpoint, credential.clone())),
            Arc::new(MonitorClient::new(client, endpoint, credential)),
            UploadBatcher::new(Arc::new(NoSink), 1_000_000),
            Arc::new(queue.clone()),
        );
        (dispatcher, queue)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_step_is_dropped_with_warning() {
        let (dispatcher, queue) = dispatcher();
        let message = QueueMessage {
            execution_function: "GetCollectionCostData".to_string(),
            payload: Some("{}".to_string()),
        };

        let outcome = dispatcher.dispatch(&message).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert!(logs_contain("Unknown step kind"));
        assert!(logs_contain("GetCollectionCostData"));
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_payload_is_rejected_before_any_call() {
        let (dispatcher, queue) = dispatcher();
        let message = QueueMessage {
            execution_function: "GetCollections".to_string(),
            payload: None,
        };

        let err = dispatcher.dispatch(&message).await.unwrap_err();
        assert!(matches!(err, WatcherError::Decode { .. }));
        assert!(!logs_contain("Processing work item"));
        assert_eq!(queue.outstanding(), 0);
    }
}
