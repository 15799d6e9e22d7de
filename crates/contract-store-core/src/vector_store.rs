//! The contract collection facade.
//!
//! A [`VectorStore`] pairs one [`Store`] backend collection with one
//! [`EmbeddingProvider`]. It owns embedding generation, metadata
//! sanitization and the store-controlled fields (`ingested_at`,
//! `text_length`), so callers only ever hand it raw text and raw extracted
//! fields.
//!
//! # Query path
//!
//! ```text
//! query text ──► embed ──► Store::nearest(k) ──► decode metadata ──► Vec<QueryHit>
//! ```
//!
//! An empty collection or `k == 0` short-circuits before the embedder is
//! called.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::display_value;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, StoreError};
use crate::metadata::{decode_metadata, sanitize};
use crate::models::{
    char_prefix, ContractRecord, ContractSummary, NewContract, QueryHit, StoredContract,
};
use crate::store::{CollectionSpec, DistanceMetric, Store};

/// Characters of contract text included in a summary embedding input.
pub const SUMMARY_CONTENT_CHARS: usize = 1000;

/// What text is embedded for a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedInput {
    /// The full contract text.
    #[default]
    Text,
    /// Type, parties and subject followed by the start of the text.
    Summary,
}

/// Collection-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub collection: String,
    pub preview_chars: usize,
    pub embed_input: EmbedInput,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            collection: "contracts".to_string(),
            preview_chars: 200,
            embed_input: EmbedInput::Text,
        }
    }
}

/// A persistent, cosine-indexed contract collection.
#[derive(Clone)]
pub struct VectorStore {
    backend: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    spec: CollectionSpec,
    options: StoreOptions,
}

impl VectorStore {
    /// Register the collection, or validate it against the embedder when
    /// it already exists.
    pub async fn open(
        backend: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: StoreOptions,
    ) -> Result<Self> {
        let wanted = CollectionSpec {
            name: options.collection.clone(),
            metric: DistanceMetric::Cosine,
            model: embedder.model_name().to_string(),
            dims: embedder.dims(),
        };
        let stored = backend.ensure_collection(&wanted).await?;
        if stored != wanted {
            return Err(StoreError::CollectionMismatch {
                collection: wanted.name,
                message: format!(
                    "created with {} ({} dims, {}), configured {} ({} dims)",
                    stored.model,
                    stored.dims,
                    stored.metric.as_str(),
                    wanted.model,
                    wanted.dims
                ),
            });
        }
        tracing::debug!(
            collection = %stored.name,
            model = %stored.model,
            dims = stored.dims,
            "opened collection"
        );
        Ok(Self {
            backend,
            embedder,
            spec: stored,
            options,
        })
    }

    pub fn collection(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Add a contract without a confidence score.
    pub async fn add(&self, id: &str, text: &str, fields: &Map<String, Value>) -> Result<()> {
        self.insert(NewContract {
            id,
            text,
            fields,
            confidence: None,
        })
        .await
    }

    /// Sanitize, embed and persist one contract.
    ///
    /// Fails with [`StoreError::DuplicateId`] when the id is taken; the
    /// existing record is left untouched.
    pub async fn insert(&self, new: NewContract<'_>) -> Result<()> {
        let ingested_at = Utc::now();
        let metadata = sanitize(new.fields, new.text, ingested_at);

        let input = match self.options.embed_input {
            EmbedInput::Text => new.text.to_string(),
            EmbedInput::Summary => summary_text(new.text, &decode_metadata(&metadata)),
        };
        let embedding = self.embed_one(input).await?;

        let contract = StoredContract {
            id: new.id.to_string(),
            text: new.text.to_string(),
            embedding,
            metadata,
            ingested_at,
            confidence: new.confidence.and_then(|c| clamp_confidence(new.id, c)),
        };
        self.backend.insert(&self.spec.name, &contract).await?;

        tracing::info!(
            contract.id = %new.id,
            collection = %self.spec.name,
            fields = contract.metadata.len(),
            "stored contract"
        );
        Ok(())
    }

    /// Persist a previously exported contract as-is, embedding included.
    pub async fn restore(&self, contract: &StoredContract) -> Result<()> {
        self.spec.check_vector(&contract.embedding)?;
        self.backend.insert(&self.spec.name, contract).await
    }

    /// Up to `k` contracts nearest to `text`, closest first.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 || self.count().await? == 0 {
            tracing::debug!(collection = %self.spec.name, k, "query short-circuited");
            return Ok(Vec::new());
        }

        let query_vec = self.embed_one(text.to_string()).await?;
        let neighbors = self
            .backend
            .nearest(&self.spec.name, &query_vec, k)
            .await?;

        tracing::debug!(collection = %self.spec.name, k, hits = neighbors.len(), "query");

        Ok(neighbors
            .into_iter()
            .map(|n| QueryHit {
                metadata: decode_metadata(&n.contract.metadata),
                id: n.contract.id,
                text: n.contract.text,
                distance: n.distance,
                ingested_at: n.contract.ingested_at,
                confidence: n.contract.confidence,
            })
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ContractRecord>> {
        let found = self.backend.get(&self.spec.name, id).await?;
        Ok(found.map(|c| ContractRecord {
            metadata: decode_metadata(&c.metadata),
            id: c.id,
            text: c.text,
            embedding: c.embedding,
            ingested_at: c.ingested_at,
            confidence: c.confidence,
        }))
    }

    /// Raw persisted form, for export.
    pub async fn get_stored(&self, id: &str) -> Result<Option<StoredContract>> {
        self.backend.get(&self.spec.name, id).await
    }

    /// Every contract in insertion order, with a text preview.
    pub async fn list(&self) -> Result<Vec<ContractSummary>> {
        let listed = self
            .backend
            .list(&self.spec.name, self.options.preview_chars)
            .await?;
        Ok(listed
            .into_iter()
            .map(|l| ContractSummary {
                text_preview: if l.truncated {
                    format!("{}...", l.preview)
                } else {
                    l.preview
                },
                metadata: decode_metadata(&l.metadata),
                id: l.id,
                ingested_at: l.ingested_at,
                confidence: l.confidence,
            })
            .collect())
    }

    /// Remove a contract. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.backend.delete(&self.spec.name, id).await?;
        if existed {
            tracing::info!(contract.id = %id, collection = %self.spec.name, "deleted contract");
        }
        Ok(existed)
    }

    pub async fn count(&self) -> Result<usize> {
        self.backend.count(&self.spec.name).await
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>> {
        let backend = format!("embedding:{}", self.embedder.model_name());
        let mut vectors = self
            .embedder
            .embed(&[text])
            .await
            .map_err(|e| StoreError::unavailable(backend.as_str(), format!("{:#}", e)))?;
        let vector = vectors
            .pop()
            .ok_or_else(|| StoreError::unavailable(backend, "provider returned no vector"))?;
        self.spec.check_vector(&vector)?;
        Ok(vector)
    }
}

/// Build the summary embedding input from decoded metadata.
pub fn summary_text(text: &str, metadata: &Map<String, Value>) -> String {
    let field = |key: &str| {
        metadata
            .get(key)
            .map(display_value)
            .unwrap_or_else(|| "N/A".to_string())
    };
    let (content, _) = char_prefix(text, SUMMARY_CONTENT_CHARS);
    format!(
        "Type: {}\nParties: {}\nSubject: {}\nContent: {}",
        field("contract_type"),
        field("parties"),
        field("subject_matter"),
        content
    )
}

fn clamp_confidence(id: &str, confidence: f32) -> Option<f32> {
    if !confidence.is_finite() {
        tracing::warn!(contract.id = %id, "dropping non-finite confidence");
        return None;
    }
    let clamped = confidence.clamp(0.0, 1.0);
    if clamped != confidence {
        tracing::warn!(contract.id = %id, confidence, "confidence clamped to [0, 1]");
    }
    Some(clamped)
}
