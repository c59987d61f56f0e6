// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Maps opaque throughput-read failures onto throughput modes.
//!
//! The provider reports "this account is serverless" and "this resource has no throughput of its
//! own" as transport faults, with the HTTP status embedded in the message text. The rules below
//! match that text exactly as the provider words it. Changing a rule changes which faults are
//! recovered and which are retried; check any edit against real provider responses.

use crate::error::ProviderError;
use crate::throughput::{ThroughputLevel, ThroughputMode};

/// What a failed throughput read turned out to mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    Serverless,
    Dedicated,
    Shared,
    /// Not a recognized signature; the step must abort and wait for redelivery.
    Fatal,
}

impl FaultClass {
    pub fn mode(&self) -> Option<ThroughputMode> {
        match self {
            FaultClass::Serverless => Some(ThroughputMode::Serverless),
            FaultClass::Dedicated => Some(ThroughputMode::Dedicated),
            FaultClass::Shared => Some(ThroughputMode::Shared),
            FaultClass::Fatal => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meaning {
    ServerlessAccount,
    NoThroughputResource,
}

struct FaultSignature {
    status_marker: &'static str,
    message_fragment: Option<&'static str>,
    meaning: Meaning,
}

/// Checked in order; the first signature whose every fragment appears in the fault text wins.
const FAULT_SIGNATURES: &[FaultSignature] = &[
    FaultSignature {
        status_marker: "Status: 400",
        message_fragment: Some(
            "Reading or replacing offers is not supported for serverless accounts",
        ),
        meaning: Meaning::ServerlessAccount,
    },
    FaultSignature {
        status_marker: "Status: 404",
        message_fragment: None,
        meaning: Meaning::NoThroughputResource,
    },
];

impl FaultSignature {
    fn matches(&self, text: &str) -> bool {
        text.contains(self.status_marker)
            && self
                .message_fragment
                .map_or(true, |fragment| text.contains(fragment))
    }
}

/// Classifies a failed throughput read at the given level of the hierarchy.
///
/// A missing throughput resource means the opposite thing at each level: a database without one
/// leaves its containers dedicated, a container without one draws from its database's pool.
pub fn classify(fault: &ProviderError, level: ThroughputLevel) -> FaultClass {
    let text = fault.message();
    let Some(signature) = FAULT_SIGNATURES.iter().find(|s| s.matches(text)) else {
        return FaultClass::Fatal;
    };
    match (signature.meaning, level) {
        (Meaning::ServerlessAccount, _) => FaultClass::Serverless,
        (Meaning::NoThroughputResource, ThroughputLevel::Database) => FaultClass::Dedicated,
        (Meaning::NoThroughputResource, ThroughputLevel::Container) => FaultClass::Shared,
    }
}
