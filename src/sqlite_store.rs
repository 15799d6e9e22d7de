//! SQLite-backed [`Store`] implementation.
//!
//! Contracts live in one `contracts` table keyed by `(collection, id)`,
//! with the embedding as a little-endian f32 BLOB and the tagged metadata
//! as JSON. Nearest-neighbor search is a brute-force cosine scan in
//! insertion (`seq`) order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use contract_store_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use contract_store_core::error::{Result, StoreError};
use contract_store_core::metadata::SanitizedMetadata;
use contract_store_core::models::{ListedContract, Neighbor, StoredContract};
use contract_store_core::store::{rank_neighbors, CollectionSpec, DistanceMetric, Store};

use crate::config::Config;
use crate::{db, migrate};

const BACKEND: &str = "sqlite";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn collection_spec(&self, name: &str) -> Result<Option<CollectionSpec>> {
        let row = sqlx::query("SELECT name, metric, model, dims FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| {
            let metric: String = r.get("metric");
            let dims: i64 = r.get("dims");
            Ok(CollectionSpec {
                name: r.get("name"),
                metric: metric
                    .parse::<DistanceMetric>()
                    .map_err(|e| StoreError::unavailable(BACKEND, e))?,
                model: r.get("model"),
                dims: dims as usize,
            })
        })
        .transpose()
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::unavailable(BACKEND, e)
}

fn from_micros(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts).unwrap_or_default()
}

fn parse_metadata(raw: &str) -> Result<SanitizedMetadata> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::unavailable(BACKEND, format!("corrupt metadata_json: {}", e)))
}

fn row_to_contract(row: &SqliteRow) -> Result<StoredContract> {
    let blob: Vec<u8> = row.get("embedding");
    let metadata_json: String = row.get("metadata_json");
    let confidence: Option<f64> = row.get("confidence");
    Ok(StoredContract {
        id: row.get("id"),
        text: row.get("document"),
        embedding: blob_to_vec(&blob),
        metadata: parse_metadata(&metadata_json)?,
        ingested_at: from_micros(row.get("ingested_at")),
        confidence: confidence.map(|c| c as f32),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<CollectionSpec> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, metric, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&spec.name)
        .bind(spec.metric.as_str())
        .bind(&spec.model)
        .bind(spec.dims as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.collection_spec(&spec.name)
            .await?
            .ok_or_else(|| StoreError::unavailable(BACKEND, "collection row missing after insert"))
    }

    async fn insert(&self, collection: &str, contract: &StoredContract) -> Result<()> {
        let spec = self.collection_spec(collection).await?.ok_or_else(|| {
            StoreError::unavailable(BACKEND, format!("collection '{}' does not exist", collection))
        })?;
        spec.check_vector(&contract.embedding)?;

        let metadata_json = serde_json::to_string(&contract.metadata)
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        let result = sqlx::query(
            r#"
            INSERT INTO contracts (collection, id, document, embedding, metadata_json,
                                   ingested_at, confidence)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(&contract.id)
        .bind(&contract.text)
        .bind(vec_to_blob(&contract.embedding))
        .bind(&metadata_json)
        .bind(contract.ingested_at.timestamp_micros())
        .bind(contract.confidence.map(f64::from))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateId(contract.id.clone()))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredContract>> {
        let row = sqlx::query(
            r#"
            SELECT id, document, embedding, metadata_json, ingested_at, confidence
            FROM contracts
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_contract).transpose()
    }

    async fn list(&self, collection: &str, preview_chars: usize) -> Result<Vec<ListedContract>> {
        let limit = preview_chars as i64;
        let rows = sqlx::query(
            r#"
            SELECT id, substr(document, 1, ?) AS preview, length(document) > ? AS truncated,
                   metadata_json, ingested_at, confidence
            FROM contracts
            WHERE collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(limit)
        .bind(limit)
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let metadata_json: String = row.get("metadata_json");
                let confidence: Option<f64> = row.get("confidence");
                let truncated: i64 = row.get("truncated");
                Ok(ListedContract {
                    id: row.get("id"),
                    preview: row.get("preview"),
                    truncated: truncated != 0,
                    metadata: parse_metadata(&metadata_json)?,
                    ingested_at: from_micros(row.get("ingested_at")),
                    confidence: confidence.map(|c| c as f32),
                })
            })
            .collect()
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contracts WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contracts WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as usize)
    }

    async fn nearest(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>> {
        let Some(spec) = self.collection_spec(collection).await? else {
            return Ok(Vec::new());
        };
        spec.check_dims(query_vec.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, document, embedding, metadata_json, ingested_at, confidence
            FROM contracts
            WHERE collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let candidates = rows
            .iter()
            .map(|row| {
                let contract = row_to_contract(row)?;
                Ok(Neighbor {
                    distance: cosine_distance(query_vec, &contract.embedding),
                    contract,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_neighbors(candidates, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextConfig, DbConfig, EmbeddingConfig, RetrievalConfig, StoreConfig};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config {
            db: DbConfig {
                path: dir.path().join("data").join("contracts.sqlite"),
            },
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }

    fn spec(dims: usize) -> CollectionSpec {
        CollectionSpec {
            name: "contracts".to_string(),
            metric: DistanceMetric::Cosine,
            model: "hash-2".to_string(),
            dims,
        }
    }

    fn contract(id: &str, text: &str, embedding: Vec<f32>) -> StoredContract {
        let mut metadata = SanitizedMetadata::new();
        metadata.insert(
            "parties".to_string(),
            contract_store_core::metadata::StoredValue::EncodedSequence(
                r#"["Acme","Beta"]"#.to_string(),
            ),
        );
        StoredContract {
            id: id.to_string(),
            text: text.to_string(),
            embedding,
            metadata,
            ingested_at: Utc::now(),
            confidence: Some(0.5),
        }
    }

    #[tokio::test]
    async fn test_roundtrip_and_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let original = contract("a", "Lease between Acme and Beta", vec![1.0, 0.0]);

        {
            let store = SqliteStore::open(&cfg).await.unwrap();
            store.ensure_collection(&spec(2)).await.unwrap();
            store.insert("contracts", &original).await.unwrap();
            store.pool().close().await;
        }

        let store = SqliteStore::open(&cfg).await.unwrap();
        let existing = store.ensure_collection(&spec(3)).await.unwrap();
        assert_eq!(existing.dims, 2);

        let back = store.get("contracts", "a").await.unwrap().unwrap();
        assert_eq!(back.text, original.text);
        assert_eq!(back.embedding, original.embedding);
        assert_eq!(back.metadata, original.metadata);
        assert_eq!(back.confidence, Some(0.5));
        assert_eq!(
            back.ingested_at.timestamp_micros(),
            original.ingested_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&config(&dir)).await.unwrap();
        store.ensure_collection(&spec(2)).await.unwrap();
        store
            .insert("contracts", &contract("a", "first", vec![1.0, 0.0]))
            .await
            .unwrap();
        let err = store
            .insert("contracts", &contract("a", "second", vec![0.0, 1.0]))
            .await;
        assert!(matches!(err, Err(StoreError::DuplicateId(id)) if id == "a"));
        assert_eq!(store.count("contracts").await.unwrap(), 1);
        assert_eq!(
            store.get("contracts", "a").await.unwrap().unwrap().text,
            "first"
        );
    }

    #[tokio::test]
    async fn test_nearest_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&config(&dir)).await.unwrap();
        store.ensure_collection(&spec(2)).await.unwrap();
        store
            .insert("contracts", &contract("tie1", "ñandú contract", vec![0.0, 1.0]))
            .await
            .unwrap();
        store
            .insert("contracts", &contract("best", "b", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert("contracts", &contract("tie2", "c", vec![0.0, 2.0]))
            .await
            .unwrap();

        let hits = store.nearest("contracts", &[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.contract.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "tie1", "tie2"]);

        assert!(matches!(
            store.nearest("contracts", &[1.0, 0.0, 0.0], 3).await,
            Err(StoreError::DimensionMismatch { .. })
        ));

        let listed = store.list("contracts", 3).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].preview, "ñan");
        assert!(listed[0].truncated);
        assert!(!listed[1].truncated);

        assert!(store.delete("contracts", "best").await.unwrap());
        assert!(!store.delete("contracts", "best").await.unwrap());
        assert_eq!(store.count("contracts").await.unwrap(), 2);
    }
}
