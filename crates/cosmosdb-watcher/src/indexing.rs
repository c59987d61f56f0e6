// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

const DEFAULT_INCLUDED_PATH: &str = "/*";
const DEFAULT_EXCLUDED_PATH: &str = "/\"_etag\"/?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingMode {
    #[serde(alias = "Consistent")]
    Consistent,
    #[serde(alias = "Lazy")]
    Lazy,
    #[serde(alias = "None")]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPath {
    pub path: String,
}

impl IndexPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// A container's indexing policy as reported by the resource provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingPolicy {
    #[serde(default)]
    pub automatic: Option<bool>,
    #[serde(default)]
    pub indexing_mode: Option<IndexingMode>,
    #[serde(default)]
    pub included_paths: Vec<IndexPath>,
    #[serde(default)]
    pub excluded_paths: Vec<IndexPath>,
    #[serde(default)]
    pub composite_indexes: Vec<serde_json::Value>,
    #[serde(default)]
    pub spatial_indexes: Vec<serde_json::Value>,
}

impl IndexingPolicy {
    /// The policy a container gets when created without one: automatic, consistent, everything
    /// included except the change-tracking `_etag` field.
    pub fn canonical_default() -> Self {
        Self {
            automatic: Some(true),
            indexing_mode: Some(IndexingMode::Consistent),
            included_paths: vec![IndexPath::new(DEFAULT_INCLUDED_PATH)],
            excluded_paths: vec![IndexPath::new(DEFAULT_EXCLUDED_PATH)],
            composite_indexes: Vec::new(),
            spatial_indexes: Vec::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self == &Self::canonical_default()
    }
}

/// A container that reports no policy at all is not treated as default.
pub fn is_default_indexing(policy: Option<&IndexingPolicy>) -> bool {
    policy.is_some_and(IndexingPolicy::is_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_policy_is_default() {
        assert!(IndexingPolicy::canonical_default().is_default());
        assert!(is_default_indexing(Some(&IndexingPolicy::canonical_default())));
        assert!(!is_default_indexing(None));
    }

    #[test]
    fn test_deviations_are_not_default() {
        let mut policy = IndexingPolicy::canonical_default();
        policy.excluded_paths = vec![IndexPath::new("/payload/*")];
        assert!(!policy.is_default());

        let mut policy = IndexingPolicy::canonical_default();
        policy.automatic = Some(false);
        assert!(!policy.is_default());

        let mut policy = IndexingPolicy::canonical_default();
        policy.indexing_mode = Some(IndexingMode::Lazy);
        assert!(!policy.is_default());

        let mut policy = IndexingPolicy::canonical_default();
        policy
            .composite_indexes
            .push(serde_json::json!([{"path": "/a"}, {"path": "/b"}]));
        assert!(!policy.is_default());
    }

    #[test]
    fn test_parses_provider_representation() {
        let raw = r#"{
            "indexingMode": "consistent",
            "automatic": true,
            "includedPaths": [{"path": "/*"}],
            "excludedPaths": [{"path": "/\"_etag\"/?"}]
        }"#;
        let policy: IndexingPolicy = serde_json::from_str(raw).unwrap();
        assert!(policy.is_default());

        let raw = r#"{"indexingMode": "Consistent", "automatic": true,
            "includedPaths": [{"path": "/*"}], "excludedPaths": []}"#;
        let policy: IndexingPolicy = serde_json::from_str(raw).unwrap();
        assert!(!policy.is_default());
    }
}
