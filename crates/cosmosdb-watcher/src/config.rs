// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::WatcherError;
use crate::records::StreamKind;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
/// Streams the crawl writes to. Cost rows are routable but never produced here.
const REQUIRED_STREAMS: [StreamKind; 4] = [
    StreamKind::DatabaseAccounts,
    StreamKind::Databases,
    StreamKind::Containers,
    StreamKind::ContainerMetrics,
];

/// Where rows for one logical stream are ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Immutable id of the data collection rule
    pub rule_id: String,
    /// Stream declared by the rule, e.g. `Custom-CosmosDatabaseAccounts`
    pub stream_name: String,
}

/// Stream routing table. Streams without an entry are not uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations {
    routes: BTreeMap<StreamKind, Destination>,
}

impl Destinations {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, stream: StreamKind, destination: Destination) -> Self {
        self.routes.insert(stream, destination);
        self
    }

    pub fn for_stream(&self, stream: StreamKind) -> Option<&Destination> {
        self.routes.get(&stream)
    }

    fn from_env() -> Self {
        let mut destinations = Self::new();
        for stream in StreamKind::ALL {
            let rule_id = env::var(format!("AZURE_MONITOR_DCR_ID_{}", stream.env_suffix())).ok();
            let stream_name =
                env::var(format!("AZURE_MONITOR_STREAM_NAME_{}", stream.env_suffix())).ok();
            if let (Some(rule_id), Some(stream_name)) = (rule_id, stream_name) {
                destinations = destinations.with(
                    stream,
                    Destination {
                        rule_id,
                        stream_name,
                    },
                );
            }
        }
        destinations
    }
}

/// Where the crawler gets its Azure access tokens from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A pre-issued bearer token, mostly for local runs
    StaticToken(String),
    /// App Service / Functions managed identity endpoint
    ManagedIdentity { endpoint: String, header: String },
    /// Entra ID application with a client secret
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl CredentialSource {
    fn from_env() -> Option<Self> {
        if let Ok(token) = env::var("AZURE_ACCESS_TOKEN") {
            return Some(CredentialSource::StaticToken(token));
        }
        if let (Ok(endpoint), Ok(header)) = (env::var("IDENTITY_ENDPOINT"), env::var("IDENTITY_HEADER")) {
            return Some(CredentialSource::ManagedIdentity { endpoint, header });
        }
        match (
            env::var("AZURE_TENANT_ID"),
            env::var("AZURE_CLIENT_ID"),
            env::var("AZURE_CLIENT_SECRET"),
        ) {
            (Ok(tenant_id), Ok(client_id), Ok(client_secret)) => {
                Some(CredentialSource::ClientSecret {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            _ => None,
        }
    }
}

/// Configuration for the crawler and its worker pool
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// Resource Manager base URL, also used for metric queries
    pub resource_manager_endpoint: String,
    /// Logs ingestion endpoint
    pub ingestion_endpoint: Option<String>,
    pub destinations: Destinations,
    pub credential: Option<CredentialSource>,
    /// Work items processed in parallel
    pub concurrency: usize,
    /// Deliveries of one item before it is dropped
    pub max_deliveries: u32,
    pub seed_interval: Duration,
    /// Seed once and exit when the queue drains
    pub run_once: bool,
    /// Upper bound on one ingestion request body, before compression
    pub upload_max_bytes: usize,
    pub compress_uploads: bool,
    pub request_timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            resource_manager_endpoint: DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_string(),
            ingestion_endpoint: None,
            destinations: Destinations::default(),
            credential: None,
            concurrency: 8,
            max_deliveries: 5,
            seed_interval: Duration::from_secs(86_400),
            run_once: false,
            upload_max_bytes: 1_000_000,
            compress_uploads: true,
            request_timeout: Duration::from_secs(30),
            https_proxy: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|val| match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        })
        .unwrap_or(default)
}

impl WatcherConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, WatcherError> {
        let defaults = Self::default();
        let log_level = env::var("COSMOSDB_WATCHER_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);
        let resource_manager_endpoint = env::var("AZURE_RESOURCE_MANAGER_ENDPOINT")
            .map(|val| val.trim_end_matches('/').to_string())
            .unwrap_or(defaults.resource_manager_endpoint);
        let ingestion_endpoint = env::var("AZURE_MONITOR_DATA_COLLECTION_ENDPOINT")
            .ok()
            .map(|val| val.trim_end_matches('/').to_string());

        let config = Self {
            log_level,
            resource_manager_endpoint,
            ingestion_endpoint,
            destinations: Destinations::from_env(),
            credential: CredentialSource::from_env(),
            concurrency: parse_var("COSMOSDB_WATCHER_CONCURRENCY", defaults.concurrency),
            max_deliveries: parse_var("COSMOSDB_WATCHER_MAX_DELIVERIES", defaults.max_deliveries),
            seed_interval: Duration::from_secs(parse_var(
                "COSMOSDB_WATCHER_SEED_INTERVAL_SECS",
                defaults.seed_interval.as_secs(),
            )),
            run_once: parse_flag("COSMOSDB_WATCHER_RUN_ONCE", defaults.run_once),
            upload_max_bytes: parse_var(
                "COSMOSDB_WATCHER_UPLOAD_MAX_BYTES",
                defaults.upload_max_bytes,
            ),
            compress_uploads: parse_flag(
                "COSMOSDB_WATCHER_COMPRESS_UPLOADS",
                defaults.compress_uploads,
            ),
            request_timeout: Duration::from_secs(parse_var(
                "COSMOSDB_WATCHER_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            https_proxy: env::var("HTTPS_PROXY").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), WatcherError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(WatcherError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.resource_manager_endpoint.trim().is_empty() {
            return Err(WatcherError::InvalidConfig(
                "AZURE_RESOURCE_MANAGER_ENDPOINT cannot be empty".to_string(),
            ));
        }

        match &self.ingestion_endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => {}
            _ => {
                return Err(WatcherError::InvalidConfig(
                    "AZURE_MONITOR_DATA_COLLECTION_ENDPOINT must be set".to_string(),
                ))
            }
        }

        for stream in REQUIRED_STREAMS {
            if self.destinations.for_stream(stream).is_none() {
                return Err(WatcherError::InvalidConfig(format!(
                    "AZURE_MONITOR_DCR_ID_{suffix} and AZURE_MONITOR_STREAM_NAME_{suffix} must be set",
                    suffix = stream.env_suffix()
                )));
            }
        }

        if self.concurrency == 0 {
            return Err(WatcherError::InvalidConfig(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.max_deliveries == 0 {
            return Err(WatcherError::InvalidConfig(
                "Max deliveries must be greater than 0".to_string(),
            ));
        }

        if self.seed_interval.is_zero() {
            return Err(WatcherError::InvalidConfig(
                "Seed interval must be greater than 0".to_string(),
            ));
        }

        if self.upload_max_bytes == 0 {
            return Err(WatcherError::InvalidConfig(
                "Upload size limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn destination(name: &str) -> Destination {
        Destination {
            rule_id: format!("dcr-{name}"),
            stream_name: format!("Custom-{name}"),
        }
    }

    fn valid() -> WatcherConfig {
        let destinations = REQUIRED_STREAMS
            .into_iter()
            .fold(Destinations::new(), |d, stream| {
                d.with(stream, destination(stream.env_suffix()))
            });
        WatcherConfig {
            ingestion_endpoint: Some("https://dce.ingest.monitor.azure.com".to_string()),
            destinations,
            ..Default::default()
        }
    }

    fn set_required_streams() {
        for stream in REQUIRED_STREAMS {
            let suffix = stream.env_suffix();
            env::set_var(format!("AZURE_MONITOR_DCR_ID_{suffix}"), format!("dcr-{suffix}"));
            env::set_var(
                format!("AZURE_MONITOR_STREAM_NAME_{suffix}"),
                format!("Custom-{suffix}"),
            );
        }
    }

    fn clear_env() {
        for stream in StreamKind::ALL {
            let suffix = stream.env_suffix();
            env::remove_var(format!("AZURE_MONITOR_DCR_ID_{suffix}"));
            env::remove_var(format!("AZURE_MONITOR_STREAM_NAME_{suffix}"));
        }
        for var in [
            "AZURE_MONITOR_DATA_COLLECTION_ENDPOINT",
            "COSMOSDB_WATCHER_CONCURRENCY",
            "COSMOSDB_WATCHER_RUN_ONCE",
            "COSMOSDB_WATCHER_LOG_LEVEL",
            "AZURE_ACCESS_TOKEN",
            "IDENTITY_ENDPOINT",
            "IDENTITY_HEADER",
            "AZURE_TENANT_ID",
            "AZURE_CLIENT_ID",
            "AZURE_CLIENT_SECRET",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_requires_ingestion_endpoint() {
        assert!(WatcherConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_produced_streams() {
        let mut config = valid();
        config.destinations = Destinations::new()
            .with(StreamKind::DatabaseAccounts, destination("accounts"))
            .with(StreamKind::Databases, destination("databases"))
            .with(StreamKind::Containers, destination("containers"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CONTAINER_METRICS"));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = WatcherConfig {
            concurrency: 0,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = WatcherConfig {
            max_deliveries: 0,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = WatcherConfig {
            upload_max_bytes: 0,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let config = WatcherConfig {
                log_level: level.to_string(),
                ..valid()
            };
            assert!(
                config.validate().is_ok(),
                "Log level '{}' should be valid",
                level
            );
        }
        let config = WatcherConfig {
            log_level: "verbose".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_destinations_and_overrides() {
        clear_env();
        env::set_var(
            "AZURE_MONITOR_DATA_COLLECTION_ENDPOINT",
            "https://dce.ingest.monitor.azure.com/",
        );
        set_required_streams();
        env::set_var("AZURE_MONITOR_DCR_ID_DATABASE_ACCOUNTS", "dcr-accounts");
        env::set_var(
            "AZURE_MONITOR_STREAM_NAME_DATABASE_ACCOUNTS",
            "Custom-CosmosDatabaseAccounts",
        );
        // Rule without a stream name is ignored.
        env::set_var("AZURE_MONITOR_DCR_ID_COST_DATA", "dcr-cost");
        env::set_var("COSMOSDB_WATCHER_CONCURRENCY", "3");
        env::set_var("COSMOSDB_WATCHER_RUN_ONCE", "TRUE");
        env::set_var("AZURE_ACCESS_TOKEN", "token");

        let config = WatcherConfig::from_env().unwrap();
        assert_eq!(
            config.ingestion_endpoint.as_deref(),
            Some("https://dce.ingest.monitor.azure.com")
        );
        assert_eq!(config.concurrency, 3);
        assert!(config.run_once);
        assert_eq!(
            config.destinations.for_stream(StreamKind::DatabaseAccounts),
            Some(&Destination {
                rule_id: "dcr-accounts".to_string(),
                stream_name: "Custom-CosmosDatabaseAccounts".to_string(),
            })
        );
        assert_eq!(config.destinations.for_stream(StreamKind::CostData), None);
        assert_eq!(
            config.credential,
            Some(CredentialSource::StaticToken("token".to_string()))
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_on_unparseable_values() {
        clear_env();
        env::set_var(
            "AZURE_MONITOR_DATA_COLLECTION_ENDPOINT",
            "https://dce.ingest.monitor.azure.com",
        );
        set_required_streams();
        env::set_var("COSMOSDB_WATCHER_CONCURRENCY", "lots");
        env::set_var("IDENTITY_ENDPOINT", "http://localhost:8081/msi/token");
        env::set_var("IDENTITY_HEADER", "secret");

        let config = WatcherConfig::from_env().unwrap();
        assert_eq!(config.concurrency, 8);
        assert!(matches!(
            config.credential,
            Some(CredentialSource::ManagedIdentity { .. })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_log_level() {
        clear_env();
        env::set_var(
            "AZURE_MONITOR_DATA_COLLECTION_ENDPOINT",
            "https://dce.ingest.monitor.azure.com",
        );
        set_required_streams();
        env::set_var("COSMOSDB_WATCHER_LOG_LEVEL", "LOUD");
        assert!(matches!(
            WatcherConfig::from_env(),
            Err(WatcherError::InvalidConfig(_))
        ));
        clear_env();
    }
}
