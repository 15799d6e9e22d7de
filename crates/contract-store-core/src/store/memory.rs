//! In-memory [`Store`] implementation for tests and embedding in other
//! processes.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`; each keeps
//! its contracts in a `Vec` in insertion order. Vector search is
//! brute-force cosine distance over every stored vector.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{Result, StoreError};
use crate::models::{char_prefix, ListedContract, Neighbor, StoredContract};

use super::{rank_neighbors, CollectionSpec, Store};

const BACKEND: &str = "memory";

struct Collection {
    spec: CollectionSpec,
    rows: Vec<StoredContract>,
}

/// In-memory store. Contents are lost when it is dropped.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| StoreError::unavailable(BACKEND, "lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| StoreError::unavailable(BACKEND, "lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_collection(name: &str) -> StoreError {
    StoreError::unavailable(BACKEND, format!("collection '{}' does not exist", name))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<CollectionSpec> {
        let mut collections = self.write()?;
        let entry = collections
            .entry(spec.name.clone())
            .or_insert_with(|| Collection {
                spec: spec.clone(),
                rows: Vec::new(),
            });
        Ok(entry.spec.clone())
    }

    async fn insert(&self, collection: &str, contract: &StoredContract) -> Result<()> {
        let mut collections = self.write()?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| unknown_collection(collection))?;
        coll.spec.check_vector(&contract.embedding)?;
        if coll.rows.iter().any(|r| r.id == contract.id) {
            return Err(StoreError::DuplicateId(contract.id.clone()));
        }
        coll.rows.push(contract.clone());
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredContract>> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.rows.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn list(&self, collection: &str, preview_chars: usize) -> Result<Vec<ListedContract>> {
        let collections = self.read()?;
        let rows = match collections.get(collection) {
            Some(c) => &c.rows,
            None => return Ok(Vec::new()),
        };
        Ok(rows
            .iter()
            .map(|r| {
                let (preview, truncated) = char_prefix(&r.text, preview_chars);
                ListedContract {
                    id: r.id.clone(),
                    preview: preview.to_string(),
                    truncated,
                    metadata: r.metadata.clone(),
                    ingested_at: r.ingested_at,
                    confidence: r.confidence,
                }
            })
            .collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self.write()?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = coll.rows.len();
        coll.rows.retain(|r| r.id != id);
        Ok(coll.rows.len() != before)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.read()?;
        Ok(collections.get(collection).map_or(0, |c| c.rows.len()))
    }

    async fn nearest(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>> {
        let collections = self.read()?;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        coll.spec.check_dims(query_vec.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let candidates = coll
            .rows
            .iter()
            .map(|r| Neighbor {
                distance: cosine_distance(query_vec, &r.embedding),
                contract: r.clone(),
            })
            .collect();
        Ok(rank_neighbors(candidates, k))
    }
}
