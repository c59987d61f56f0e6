// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`MetricsSource`] over the Azure Monitor metrics REST API.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::auth::{TokenCredential, RESOURCE_MANAGER_SCOPE};
use super::check_status;
use crate::error::ProviderError;
use crate::metrics::{MetricResult, MetricSample, MetricSeries, MetricsQuery, MetricsSource};

const METRICS_API_VERSION: &str = "2023-10-01";

#[derive(Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<RawMetric>,
}

#[derive(Deserialize)]
struct LocalizableName {
    value: String,
}

#[derive(Deserialize)]
struct RawMetric {
    name: LocalizableName,
    #[serde(default)]
    timeseries: Vec<RawSeries>,
}

#[derive(Deserialize)]
struct RawMetadataValue {
    name: LocalizableName,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct RawSeries {
    #[serde(default)]
    metadatavalues: Vec<RawMetadataValue>,
    #[serde(default)]
    data: Vec<RawSample>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSample {
    time_stamp: DateTime<Utc>,
    average: Option<f64>,
    count: Option<f64>,
    maximum: Option<f64>,
    minimum: Option<f64>,
    total: Option<f64>,
}

impl From<RawMetric> for MetricResult {
    fn from(raw: RawMetric) -> Self {
        MetricResult {
            name: raw.name.value,
            series: raw
                .timeseries
                .into_iter()
                .map(|series| MetricSeries {
                    metadata: series
                        .metadatavalues
                        .into_iter()
                        .map(|m| (m.name.value.to_lowercase(), m.value))
                        .collect(),
                    samples: series
                        .data
                        .into_iter()
                        .map(|s| MetricSample {
                            timestamp: s.time_stamp,
                            average: s.average,
                            count: s.count,
                            maximum: s.maximum,
                            minimum: s.minimum,
                            total: s.total,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// ISO-8601 duration for the `interval` parameter.
fn interval(granularity: Duration) -> String {
    let seconds = granularity.as_secs();
    if seconds % 3600 == 0 {
        format!("PT{}H", seconds / 3600)
    } else if seconds % 60 == 0 {
        format!("PT{}M", seconds / 60)
    } else {
        format!("PT{seconds}S")
    }
}

fn timespan(query: &MetricsQuery) -> String {
    format!(
        "{}/{}",
        query.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        query.end.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub struct MonitorClient {
    client: reqwest::Client,
    endpoint: String,
    credential: Arc<dyn TokenCredential>,
}

impl MonitorClient {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credential,
        }
    }
}

#[async_trait]
impl MetricsSource for MonitorClient {
    async fn query(&self, query: &MetricsQuery) -> Result<Vec<MetricResult>, ProviderError> {
        let url = format!(
            "{}{}/providers/Microsoft.Insights/metrics",
            self.endpoint, query.resource_id
        );
        let aggregations = query
            .aggregations
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut params = vec![
            ("api-version", METRICS_API_VERSION.to_string()),
            ("metricnames", query.metric_names.join(",")),
            ("timespan", timespan(query)),
            ("interval", interval(query.granularity)),
            ("metricnamespace", query.namespace.clone()),
        ];
        if !aggregations.is_empty() {
            params.push(("aggregation", aggregations));
        }
        if !query.filter.is_empty() {
            params.push(("$filter", query.filter.clone()));
        }

        let token = self.credential.token(RESOURCE_MANAGER_SCOPE).await?;
        let response = self
            .client
            .get(url)
            .query(&params)
            .bearer_auth(token)
            .send()
            .await?;
        let body: MetricsResponse = check_status(response).await?.json().await?;
        debug!(
            resource = %query.resource_id,
            metrics = body.value.len(),
            "Fetched metric series"
        );
        Ok(body.value.into_iter().map(MetricResult::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::AzureCredential;
    use crate::config::CredentialSource;
    use crate::metrics::{Aggregation, METRIC_NAMESPACE};
    use chrono::TimeZone;
    use mockito::{Matcher, Server};

    const RESOURCE: &str =
        "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/acct";

    fn monitor(server: &Server) -> MonitorClient {
        let client = crate::azure::build_client(None, Duration::from_secs(5)).unwrap();
        let credential = AzureCredential::new(
            CredentialSource::StaticToken("monitor-token".to_string()),
            client.clone(),
        );
        MonitorClient::new(client, server.url(), Arc::new(credential))
    }

    fn query() -> MetricsQuery {
        MetricsQuery {
            resource_id: RESOURCE.to_string(),
            metric_names: vec!["TotalRequests".to_string(), "TotalRequestUnits".to_string()],
            start: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
            granularity: Duration::from_secs(60),
            namespace: METRIC_NAMESPACE.to_string(),
            filter: "DatabaseName eq 'db' and CollectionName eq 'orders'".to_string(),
            aggregations: vec![Aggregation::Total],
        }
    }

    #[test]
    fn test_interval_format() {
        assert_eq!(interval(Duration::from_secs(60)), "PT1M");
        assert_eq!(interval(Duration::from_secs(300)), "PT5M");
        assert_eq!(interval(Duration::from_secs(3600)), "PT1H");
        assert_eq!(interval(Duration::from_secs(45)), "PT45S");
    }

    #[tokio::test]
    async fn test_query_parses_series() {
        let mut server = Server::new_async().await;
        let path = format!("{RESOURCE}/providers/Microsoft.Insights/metrics");
        let mock = server
            .mock("GET", path.as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api-version".into(), METRICS_API_VERSION.into()),
                Matcher::UrlEncoded(
                    "metricnames".into(),
                    "TotalRequests,TotalRequestUnits".into(),
                ),
                Matcher::UrlEncoded(
                    "timespan".into(),
                    "2024-05-01T00:00:00Z/2024-05-02T00:00:00Z".into(),
                ),
                Matcher::UrlEncoded("interval".into(), "PT1M".into()),
                Matcher::UrlEncoded("aggregation".into(), "Total".into()),
                Matcher::UrlEncoded(
                    "$filter".into(),
                    "DatabaseName eq 'db' and CollectionName eq 'orders'".into(),
                ),
            ]))
            .match_header("authorization", "Bearer monitor-token")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "value": [{
                        "name": {"value": "TotalRequests", "localizedValue": "Total Requests"},
                        "timeseries": [{
                            "metadatavalues": [
                                {"name": {"value": "StatusCode"}, "value": "200"},
                                {"name": {"value": "Region"}, "value": "West US"}
                            ],
                            "data": [
                                {"timeStamp": "2024-05-01T00:00:00Z", "total": 12.0},
                                {"timeStamp": "2024-05-01T00:01:00Z"}
                            ]
                        }]
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let results = monitor(&server).query(&query()).await.unwrap();
        mock.assert_async().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "TotalRequests");
        let series = &results[0].series[0];
        assert_eq!(series.metadata["statuscode"], "200");
        assert_eq!(series.metadata["region"], "West US");
        assert_eq!(series.samples.len(), 2);
        assert_eq!(series.samples[0].total, Some(12.0));
        assert_eq!(series.samples[1].total, None);
    }

    #[tokio::test]
    async fn test_query_failure_keeps_status() {
        let mut server = Server::new_async().await;
        let path = format!("{RESOURCE}/providers/Microsoft.Insights/metrics");
        let _mock = server
            .mock("GET", path.as_str())
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"code":"TooManyRequests"}"#)
            .create_async()
            .await;

        let err = monitor(&server).query(&query()).await.unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert!(err.is_transient());
    }
}
