// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Container metric collection.
//!
//! Each of the four metric steps is described by one or more query plans. A plan fixes the
//! metric names, the aggregate read for each of them, the filter expression and the dimensions
//! attached to the resulting rows. Every sample of every series becomes one [`MetricRecord`].

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::records::{MetricDimensions, MetricRecord};
use crate::scope::ContainerScope;

pub const METRIC_NAMESPACE: &str = "Microsoft.DocumentDB/DatabaseAccounts";
/// Container name the provider reports pooled-throughput partitions under.
pub const SHARED_CONTAINER_SENTINEL: &str = "<empty>";
/// Container name the provider reports database-level throughput metrics under.
pub const SHARED_THROUGHPUT_SENTINEL: &str = "__Empty";

const LOOKBACK_HOURS: i64 = 24;
const FINE_GRANULARITY: Duration = Duration::from_secs(60);
const STORAGE_GRANULARITY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Average,
    Count,
    Maximum,
    Minimum,
    Total,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Count => "Count",
            Aggregation::Maximum => "Maximum",
            Aggregation::Minimum => "Minimum",
            Aggregation::Total => "Total",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric range query against a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsQuery {
    pub resource_id: String,
    pub metric_names: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Duration,
    pub namespace: String,
    pub filter: String,
    pub aggregations: Vec<Aggregation>,
}

/// One point of a series. Aggregates the provider did not return are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub average: Option<f64>,
    pub count: Option<f64>,
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub total: Option<f64>,
}

impl MetricSample {
    pub fn aggregate(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Average => self.average,
            Aggregation::Count => self.count,
            Aggregation::Maximum => self.maximum,
            Aggregation::Minimum => self.minimum,
            Aggregation::Total => self.total,
        }
    }
}

/// A series of samples sharing one dimension tuple. Metadata keys are lower-case.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricSeries {
    pub metadata: BTreeMap<String, String>,
    pub samples: Vec<MetricSample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub name: String,
    pub series: Vec<MetricSeries>,
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn query(&self, query: &MetricsQuery) -> Result<Vec<MetricResult>, ProviderError>;
}

/// The four container metric steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStep {
    Requests,
    PartitionKeyUsage,
    PartitionSize,
    Storage,
}

/// Which dimension bag a plan attaches to its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionShape {
    None,
    Request,
    PartitionKeyUsage,
    PartitionSize,
}

/// A single query plus how to read its result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub query: MetricsQuery,
    reads: &'static [(&'static str, Aggregation)],
    pub shape: DimensionShape,
}

impl QueryPlan {
    fn new(
        container: &ContainerScope,
        now: DateTime<Utc>,
        reads: &'static [(&'static str, Aggregation)],
        granularity: Duration,
        filter: String,
        shape: DimensionShape,
    ) -> Self {
        let mut aggregations: Vec<Aggregation> = Vec::new();
        for (_, aggregation) in reads {
            if !aggregations.contains(aggregation) {
                aggregations.push(*aggregation);
            }
        }
        Self {
            query: MetricsQuery {
                resource_id: container.account().resource_id(),
                metric_names: reads.iter().map(|(name, _)| (*name).to_string()).collect(),
                start: now - ChronoDuration::hours(LOOKBACK_HOURS),
                end: now,
                granularity,
                namespace: METRIC_NAMESPACE.to_string(),
                filter,
                aggregations,
            },
            reads,
            shape,
        }
    }

    /// The aggregate read for a returned metric, if it was requested by this plan.
    pub fn aggregation_for(&self, metric_name: &str) -> Option<Aggregation> {
        self.reads
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(metric_name))
            .map(|(_, aggregation)| *aggregation)
    }
}

const REQUEST_READS: &[(&str, Aggregation)] = &[
    ("TotalRequests", Aggregation::Count),
    ("TotalRequestUnits", Aggregation::Count),
];
const PARTITION_KEY_USAGE_READS: &[(&str, Aggregation)] =
    &[("NormalizedRUConsumption", Aggregation::Maximum)];
const PARTITION_SIZE_READS: &[(&str, Aggregation)] =
    &[("PhysicalPartitionSizeInfo", Aggregation::Maximum)];
const STORAGE_READS: &[(&str, Aggregation)] = &[
    ("ProvisionedThroughput", Aggregation::Maximum),
    ("AutoscaleMaxThroughput", Aggregation::Maximum),
    ("DataUsage", Aggregation::Total),
    ("IndexUsage", Aggregation::Total),
    ("DocumentCount", Aggregation::Total),
];
const SHARED_THROUGHPUT_READS: &[(&str, Aggregation)] = &[
    ("ProvisionedThroughput", Aggregation::Maximum),
    ("AutoscaleMaxThroughput", Aggregation::Maximum),
];
const SHARED_USAGE_READS: &[(&str, Aggregation)] = &[
    ("DataUsage", Aggregation::Total),
    ("DocumentCount", Aggregation::Total),
];
const SHARED_INDEX_READS: &[(&str, Aggregation)] = &[("IndexUsage", Aggregation::Total)];

/// Builds `DatabaseName eq '<db>' [and CollectionName eq '<name>'] [and <dim> eq '*' ...]`.
pub fn filter_expression(database: &str, container: Option<&str>, wildcards: &[&str]) -> String {
    let mut filter = format!("DatabaseName eq '{database}'");
    if let Some(container) = container {
        filter.push_str(&format!(" and CollectionName eq '{container}'"));
    }
    for dimension in wildcards {
        filter.push_str(&format!(" and {dimension} eq '*'"));
    }
    filter
}

/// Name partition metrics are filed under: the sentinel for pooled containers, else its own.
fn partition_container_name(container: &ContainerScope) -> &str {
    if container.is_shared() {
        SHARED_CONTAINER_SENTINEL
    } else {
        container.container_name()
    }
}

/// The queries one metric step issues for a container, in issue order.
pub fn plan(step: MetricStep, container: &ContainerScope, now: DateTime<Utc>) -> Vec<QueryPlan> {
    let database = container.database().database_name();
    let own_name = container.container_name();
    match step {
        MetricStep::Requests => vec![QueryPlan::new(
            container,
            now,
            REQUEST_READS,
            FINE_GRANULARITY,
            filter_expression(
                database,
                Some(own_name),
                &["OperationType", "Region", "StatusCode"],
            ),
            DimensionShape::Request,
        )],
        MetricStep::PartitionKeyUsage => vec![QueryPlan::new(
            container,
            now,
            PARTITION_KEY_USAGE_READS,
            FINE_GRANULARITY,
            filter_expression(
                database,
                Some(partition_container_name(container)),
                &["Region", "PartitionKeyRangeId", "PhysicalPartitionId"],
            ),
            DimensionShape::PartitionKeyUsage,
        )],
        MetricStep::PartitionSize => vec![QueryPlan::new(
            container,
            now,
            PARTITION_SIZE_READS,
            FINE_GRANULARITY,
            filter_expression(
                database,
                Some(partition_container_name(container)),
                &["Region", "PhysicalPartitionId"],
            ),
            DimensionShape::PartitionSize,
        )],
        MetricStep::Storage if container.is_shared() => vec![
            QueryPlan::new(
                container,
                now,
                SHARED_THROUGHPUT_READS,
                STORAGE_GRANULARITY,
                filter_expression(database, Some(SHARED_THROUGHPUT_SENTINEL), &[]),
                DimensionShape::None,
            ),
            QueryPlan::new(
                container,
                now,
                SHARED_USAGE_READS,
                STORAGE_GRANULARITY,
                filter_expression(database, Some(own_name), &[]),
                DimensionShape::None,
            ),
            QueryPlan::new(
                container,
                now,
                SHARED_INDEX_READS,
                STORAGE_GRANULARITY,
                filter_expression(database, None, &[]),
                DimensionShape::None,
            ),
        ],
        MetricStep::Storage => vec![QueryPlan::new(
            container,
            now,
            STORAGE_READS,
            STORAGE_GRANULARITY,
            filter_expression(database, Some(own_name), &[]),
            DimensionShape::None,
        )],
    }
}

fn dimension(series: &MetricSeries, key: &str) -> Option<String> {
    series.metadata.get(key).cloned()
}

fn dimensions(
    shape: DimensionShape,
    series: &MetricSeries,
    sample: &MetricSample,
) -> Option<MetricDimensions> {
    match shape {
        DimensionShape::None => None,
        DimensionShape::Request => {
            let status_code = series.metadata.get("statuscode").and_then(|raw| {
                let parsed = raw.trim().parse::<i32>().ok();
                if parsed.is_none() {
                    warn!(status_code = %raw, "Unparseable status code dimension");
                }
                parsed
            });
            Some(MetricDimensions::Request {
                operation_type: dimension(series, "operationtype"),
                region: dimension(series, "region"),
                status_code,
            })
        }
        DimensionShape::PartitionKeyUsage => Some(MetricDimensions::PartitionKeyUsage {
            region: dimension(series, "region"),
            partition_key_range_id: dimension(series, "partitionkeyrangeid"),
            physical_partition_id: dimension(series, "physicalpartitionid"),
        }),
        DimensionShape::PartitionSize => Some(MetricDimensions::PartitionSize {
            region: dimension(series, "region"),
            physical_partition_id: dimension(series, "physicalpartitionid"),
            partition_size: sample.maximum,
        }),
    }
}

/// One record per `(metric, series, sample)`. A missing aggregate reads as 0.
pub fn flatten(
    plan: &QueryPlan,
    results: &[MetricResult],
    container: &ContainerScope,
    time_generated: DateTime<Utc>,
) -> Vec<MetricRecord> {
    let mut records = Vec::new();
    for result in results {
        let Some(aggregation) = plan.aggregation_for(&result.name) else {
            debug!(metric = %result.name, "Skipping metric not requested by this query");
            continue;
        };
        for series in &result.series {
            for sample in &series.samples {
                records.push(MetricRecord {
                    time_generated,
                    database_account_name: container.account().account_name().to_string(),
                    database_name: container.database().database_name().to_string(),
                    container_name: container.container_name().to_string(),
                    metric_timestamp: sample.timestamp,
                    metric_name: result.name.clone(),
                    metric_value: sample.aggregate(aggregation).unwrap_or(0.0),
                    metric_metadata: dimensions(plan.shape, series, sample),
                });
            }
        }
    }
    records
}

/// Runs every query of a metric step and returns the flattened rows of all of them.
///
/// Any failed query fails the whole step so no partial set of rows is uploaded.
pub async fn collect(
    source: &dyn MetricsSource,
    step: MetricStep,
    container: &ContainerScope,
    now: DateTime<Utc>,
) -> Result<Vec<MetricRecord>, ProviderError> {
    let mut records = Vec::new();
    for plan in plan(step, container, now) {
        debug!(?step, filter = %plan.query.filter, "Querying container metrics");
        let results = source.query(&plan.query).await?;
        records.extend(flatten(&plan, &results, container, now));
    }
    Ok(records)
}
