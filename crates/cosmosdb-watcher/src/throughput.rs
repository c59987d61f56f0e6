// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::classifier;
use crate::error::ProviderError;
use crate::provider::ThroughputSettings;

/// Which level of the hierarchy a throughput read was made at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThroughputLevel {
    Database,
    Container,
}

impl ThroughputLevel {
    /// The mode implied by a successful read at this level.
    fn provisioned_mode(&self) -> ThroughputMode {
        match self {
            // A database-level offer only matters when its containers share it.
            ThroughputLevel::Database => ThroughputMode::Shared,
            ThroughputLevel::Container => ThroughputMode::Dedicated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThroughputMode {
    Serverless,
    Dedicated,
    Shared,
}

impl fmt::Display for ThroughputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThroughputMode::Serverless => "Serverless",
            ThroughputMode::Dedicated => "Dedicated",
            ThroughputMode::Shared => "Shared",
        };
        f.write_str(s)
    }
}

/// How provisioned throughput is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThroughputType {
    Manual,
    Autoscale,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputVerdict {
    pub mode: ThroughputMode,
    pub throughput_type: ThroughputType,
    pub value: Option<i64>,
}

impl ThroughputVerdict {
    /// Value of the throughput type column. Serverless resources report `"Serverless"`; other
    /// verdicts without a type report `null`.
    pub fn type_column(&self) -> Option<&'static str> {
        match (self.throughput_type, self.mode) {
            (ThroughputType::Manual, _) => Some("Manual"),
            (ThroughputType::Autoscale, _) => Some("Autoscale"),
            (ThroughputType::None, ThroughputMode::Serverless) => Some("Serverless"),
            (ThroughputType::None, _) => None,
        }
    }

    fn from_settings(mode: ThroughputMode, settings: &ThroughputSettings) -> Self {
        match settings.autoscale_max_throughput {
            Some(max) => Self {
                mode,
                throughput_type: ThroughputType::Autoscale,
                value: Some(max),
            },
            None => Self {
                mode,
                throughput_type: ThroughputType::Manual,
                value: settings.throughput,
            },
        }
    }

    fn from_fault(mode: ThroughputMode) -> Self {
        Self {
            mode,
            throughput_type: ThroughputType::None,
            value: None,
        }
    }
}

/// Turns the outcome of a throughput read into a verdict.
///
/// Returns the original fault when the classifier does not recognize it; the caller must then
/// abandon the step without emitting anything.
pub fn resolve(
    read: Result<ThroughputSettings, ProviderError>,
    level: ThroughputLevel,
) -> Result<ThroughputVerdict, ProviderError> {
    match read {
        Ok(settings) => Ok(ThroughputVerdict::from_settings(
            level.provisioned_mode(),
            &settings,
        )),
        Err(fault) => match classifier::classify(&fault, level).mode() {
            Some(mode) => {
                debug!(?level, %mode, "Throughput read fault classified");
                Ok(ThroughputVerdict::from_fault(mode))
            }
            None => Err(fault),
        },
    }
}
