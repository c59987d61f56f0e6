// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Cosmos DB watcher
//!
//! A queue-driven crawler that walks every Cosmos DB account visible to its credentials and
//! uploads configuration and utilization rows to Azure Monitor.
//!
//! Each queue message names one step of the crawl and carries the scope it applies to:
//!
//! subscriptions, accounts, databases, database throughput, containers, container
//! throughput, then four metric steps per container.
//!
//! A step reads its own scope from the resource provider, uploads what it found and enqueues the
//! steps below it. The crate is split along those seams:
//!
//! - [`work_item`]: the queue message envelope and the typed work items inside it
//! - [`steps`]: one handler per step, written against the traits below
//! - [`dispatcher`]: routes a message to its handler and forwards the results
//! - [`provider`], [`metrics`], [`sink`], [`queue`]: the external collaborators as traits
//! - [`azure`]: REST implementations of those traits
//! - [`worker`]: an in-process queue, worker pool and seed timer

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod azure;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod indexing;
pub mod metrics;
pub mod provider;
pub mod queue;
pub mod records;
pub mod scope;
pub mod sink;
pub mod steps;
pub mod throughput;
pub mod work_item;
pub mod worker;

pub use config::WatcherConfig;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ProviderError, WatcherError};
pub use work_item::{QueueMessage, StepKind, WorkItem};
