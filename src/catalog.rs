//! The canonical model catalog.
//!
//! Every provider response, whatever its shape, is normalized into a
//! [`ModelRecord`] before it enters the catalog. The record carries the
//! provider-qualified identifier, the inferred capability tags, the
//! free-tier verdict, and the two timestamps that drive staleness policy:
//! `discovered_at` (set once, when the model is first seen) and
//! `last_verified` (refreshed on every successful re-parse).
//!
//! The catalog itself is a plain in-memory map behind the [`CatalogStore`]
//! trait. All mutation flows through the reconciler; nothing else writes
//! the map. A JSON snapshot can be written and reloaded so the catalog
//! survives process restarts without a durable log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("model \"{0}\" is not in the catalog")]
    ModelNotFound(String),

    #[error("failed to read snapshot: {0}")]
    SnapshotRead(#[source] std::io::Error),

    #[error("failed to write snapshot: {0}")]
    SnapshotWrite(#[source] std::io::Error),

    #[error("snapshot is malformed: {0}")]
    SnapshotMalformed(#[from] serde_json::Error),
}

/// Capability tags inferred from model names, tags, and pipeline hints.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Capability {
    TextGeneration,
    ImageGeneration,
    Embeddings,
    Audio,
    Other,
}

/// Coarse cost classification for a model.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum CostLevel {
    Free,
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

/// The canonical unit of catalog state.
///
/// `(id, provider)` is unique; `id` is always provider-qualified
/// (`"provider/raw-id"`) so records from different providers never collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelRecord {
    pub id: String,
    pub provider: String,
    pub capabilities: BTreeSet<Capability>,
    pub is_free: bool,
    pub cost_level: CostLevel,
    pub discovered_at: DateTime<Utc>,
    pub last_verified: DateTime<Utc>,
    /// Name of the strategy (or "fallback") that produced this record.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
}

impl ModelRecord {
    /// A record is stale when it has not been verified within `threshold`.
    /// `discovered_at` acts as the floor so a freshly added record is never
    /// immediately stale.
    pub(crate) fn is_stale(&self, threshold: chrono::Duration, now: DateTime<Utc>) -> bool {
        let reference = self.last_verified.max(self.discovered_at);

        now - reference > threshold
    }
}

/// Interface consumed by the reconciler and the reporting surfaces.
pub(crate) trait CatalogStore: Send + Sync {
    fn all_models(&self) -> Vec<&ModelRecord>;

    fn model(&self, id: &str) -> Option<&ModelRecord>;

    fn add_model(&mut self, record: ModelRecord);

    /// Replaces the record stored under `id`. `last_verified` is kept
    /// monotonically non-decreasing: a replacement carrying an older
    /// timestamp keeps the stored one.
    fn update_model(&mut self, id: &str, record: ModelRecord) -> Result<(), CatalogError>;

    fn remove_model(&mut self, id: &str) -> Option<ModelRecord>;

    fn models_by_provider(&self, provider: &str) -> Vec<&ModelRecord>;

    fn len(&self) -> usize;
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct MemoryCatalog {
    models: BTreeMap<String, ModelRecord>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    models: Vec<ModelRecord>,
}

impl MemoryCatalog {
    pub(crate) fn new() -> MemoryCatalog {
        MemoryCatalog {
            models: BTreeMap::new(),
        }
    }

    pub(crate) fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<(), CatalogError> {
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            models: self.models.values().cloned().collect(),
        };

        let serialized = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(CatalogError::SnapshotWrite)?;
        }

        std::fs::write(path, serialized).map_err(CatalogError::SnapshotWrite)
    }

    pub(crate) fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<MemoryCatalog, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(CatalogError::SnapshotRead)?;

        let snapshot: Snapshot = serde_json::from_str(&raw)?;

        let mut catalog = MemoryCatalog::new();

        for record in snapshot.models {
            catalog.models.insert(record.id.clone(), record);
        }

        Ok(catalog)
    }
}

impl CatalogStore for MemoryCatalog {
    fn all_models(&self) -> Vec<&ModelRecord> {
        self.models.values().collect()
    }

    fn model(&self, id: &str) -> Option<&ModelRecord> {
        self.models.get(id)
    }

    fn add_model(&mut self, record: ModelRecord) {
        self.models.insert(record.id.clone(), record);
    }

    fn update_model(&mut self, id: &str, mut record: ModelRecord) -> Result<(), CatalogError> {
        let existing = self
            .models
            .get_mut(id)
            .ok_or_else(|| CatalogError::ModelNotFound(id.to_string()))?;

        record.last_verified = record.last_verified.max(existing.last_verified);
        record.discovered_at = existing.discovered_at;

        *existing = record;

        Ok(())
    }

    fn remove_model(&mut self, id: &str) -> Option<ModelRecord> {
        self.models.remove(id)
    }

    fn models_by_provider(&self, provider: &str) -> Vec<&ModelRecord> {
        self.models
            .values()
            .filter(|m| m.provider == provider)
            .collect()
    }

    fn len(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn record(id: &str, provider: &str) -> ModelRecord {
        ModelRecord {
            id: id.to_string(),
            provider: provider.to_string(),
            capabilities: BTreeSet::from([Capability::TextGeneration]),
            is_free: false,
            cost_level: CostLevel::Unknown,
            discovered_at: Utc::now(),
            last_verified: Utc::now(),
            source: "openai_list".to_string(),
            downloads: None,
            likes: None,
        }
    }

    #[test]
    fn update_keeps_last_verified_monotonic() {
        let mut catalog = MemoryCatalog::new();

        let mut fresh = record("acme/m1", "acme");
        fresh.last_verified = Utc::now();
        catalog.add_model(fresh.clone());

        let mut rewound = fresh.clone();
        rewound.last_verified = fresh.last_verified - chrono::Duration::days(2);
        catalog.update_model("acme/m1", rewound).unwrap();

        assert_eq!(
            catalog.model("acme/m1").unwrap().last_verified,
            fresh.last_verified
        );
    }

    #[test]
    fn update_unknown_model_fails() {
        let mut catalog = MemoryCatalog::new();

        let result = catalog.update_model("acme/missing", record("acme/missing", "acme"));

        assert_matches!(result, Err(CatalogError::ModelNotFound(_)));
    }

    #[test]
    fn staleness_uses_newest_timestamp() {
        let now = Utc::now();
        let mut rec = record("acme/m1", "acme");

        rec.discovered_at = now - chrono::Duration::days(30);
        rec.last_verified = now - chrono::Duration::days(1);
        assert!(!rec.is_stale(chrono::Duration::days(7), now));

        rec.last_verified = now - chrono::Duration::days(8);
        assert!(rec.is_stale(chrono::Duration::days(7), now));

        // a record discovered yesterday but never re-verified is not stale
        rec.discovered_at = now - chrono::Duration::days(1);
        rec.last_verified = now - chrono::Duration::days(30);
        assert!(!rec.is_stale(chrono::Duration::days(7), now));
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = MemoryCatalog::new();
        catalog.add_model(record("acme/m1", "acme"));
        catalog.add_model(record("beta/m2", "beta"));

        catalog.save_snapshot(&path).unwrap();
        let restored = MemoryCatalog::load_snapshot(&path).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.models_by_provider("acme").len(), 1);
        assert!(restored.model("beta/m2").is_some());
    }
}
