//! Storage abstraction for Contract Store.
//!
//! The [`Store`] trait defines the persistence operations a
//! [`VectorStore`](crate::vector_store::VectorStore) needs, enabling
//! pluggable backends (SQLite in the app crate, [`memory::InMemoryStore`]
//! here).
//!
//! Backends hold any number of named collections. Each collection has a
//! fixed [`CollectionSpec`]: the distance metric, the embedding model, and
//! its dimensionality. Implementations must be `Send + Sync`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::models::{ListedContract, Neighbor, StoredContract};

/// Distance metric of a collection. Only cosine is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(format!("unsupported distance metric: '{}'", other)),
        }
    }
}

/// Identity of a collection, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub metric: DistanceMetric,
    pub model: String,
    pub dims: usize,
}

impl CollectionSpec {
    /// Reject vectors that do not match the collection's dimensionality.
    pub fn check_dims(&self, actual: usize) -> Result<()> {
        if actual != self.dims {
            return Err(StoreError::DimensionMismatch {
                expected: self.dims,
                actual,
            });
        }
        Ok(())
    }

    /// Reject vectors of the wrong length or with non-finite components.
    pub fn check_vector(&self, vector: &[f32]) -> Result<()> {
        self.check_dims(vector.len())?;
        match vector.iter().position(|x| !x.is_finite()) {
            Some(index) => Err(StoreError::NonFiniteEmbedding { index }),
            None => Ok(()),
        }
    }
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_collection`](Store::ensure_collection) | Create a collection or return the existing spec |
/// | [`insert`](Store::insert) | Append a contract; duplicate ids are rejected |
/// | [`get`](Store::get) | Exact lookup by id |
/// | [`list`](Store::list) | All contracts with bounded text previews |
/// | [`delete`](Store::delete) | Remove by id, reporting whether it existed |
/// | [`count`](Store::count) | Number of contracts |
/// | [`nearest`](Store::nearest) | Cosine nearest neighbors |
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the collection if it does not exist.
    ///
    /// Returns the spec actually stored, which differs from `spec` when the
    /// collection already existed with another model or dimensionality.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<CollectionSpec>;

    /// Append a contract. Fails with [`StoreError::DuplicateId`] when the id
    /// is taken and [`StoreError::DimensionMismatch`] on a wrong-sized
    /// embedding; nothing is written in either case.
    async fn insert(&self, collection: &str, contract: &StoredContract) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredContract>>;

    /// All contracts in insertion order, texts cut to `preview_chars`.
    async fn list(&self, collection: &str, preview_chars: usize) -> Result<Vec<ListedContract>>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Up to `k` contracts by ascending cosine distance to `query_vec`,
    /// ties in insertion order.
    async fn nearest(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>>;
}

/// Order candidates by ascending distance and keep the first `k`.
///
/// The sort is stable, so candidates supplied in insertion order keep that
/// order among equal distances.
pub fn rank_neighbors(mut candidates: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    candidates.truncate(k);
    candidates
}
