//! Contract ingestion and question answering orchestration.
//!
//! The [`ContractPipeline`] composes a [`VectorStore`], a
//! [`ContextAssembler`], and two optional external collaborators:
//!
//! ```text
//! ingest:  SourceDocument ──► Extractor ──► VectorStore::insert (sanitize + embed + store)
//! ask:     question ──► VectorStore::query(top_k) ──► ContextAssembler ──► Answerer
//! ```
//!
//! The pipeline never calls a language model itself: field extraction
//! and answering are [`Extractor`] and [`Answerer`] implementations
//! supplied by the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use contract_store_core::models::{NewContract, QueryHit};
use contract_store_core::{AssembledContext, ContextAssembler, StoreError, VectorStore};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

/// Field under which the source file name is recorded.
pub const SOURCE_FILE: &str = "source_file";

/// Derives structured fields from contract text.
///
/// Output is untrusted and sanitized before storage; an empty map is a
/// valid result.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, text: &str) -> anyhow::Result<Map<String, Value>>;
}

/// Produces a free-text answer from a question and an assembled context.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str, context: &str) -> anyhow::Result<String>;
}

/// Errors that can occur in pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The extractor failed; nothing was stored.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Answering failed: {0}")]
    Answer(String),

    /// An operation needs a collaborator the pipeline was built without.
    #[error("Pipeline has no {0} configured")]
    MissingCollaborator(&'static str),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A document to ingest.
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub text: String,
    /// Original file name, recorded as `source_file` when known.
    pub source_file: Option<String>,
    /// Extraction/OCR confidence in `[0, 1]`.
    pub confidence: Option<f32>,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Outcome of [`ContractPipeline::ask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Retrieval found nothing; the answerer was not consulted.
    NoRelevantContracts,
    Answered {
        text: String,
        contract_ids: Vec<String>,
    },
}

/// Generate a fresh contract id: `contract_<UTC YYYYMMDD_HHMMSS>_<uuid>`.
pub fn new_contract_id() -> String {
    format!(
        "contract_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        Uuid::new_v4().simple()
    )
}

/// Open the configured SQLite collection with the configured embedder.
pub async fn open_store(config: &Config) -> anyhow::Result<VectorStore> {
    let backend = SqliteStore::open(config).await?;
    let embedder = create_provider(&config.embedding)?;
    Ok(VectorStore::open(Arc::new(backend), embedder, config.store_options()).await?)
}

pub struct ContractPipeline {
    store: VectorStore,
    assembler: ContextAssembler,
    top_k: usize,
    extractor: Option<Arc<dyn Extractor>>,
    answerer: Option<Arc<dyn Answerer>>,
}

impl ContractPipeline {
    pub fn builder() -> ContractPipelineBuilder {
        ContractPipelineBuilder::default()
    }

    /// A pipeline over the configured store, without extractor or
    /// answerer.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::builder()
            .store(open_store(config).await?)
            .assembler(ContextAssembler::new(config.context_options()))
            .top_k(config.retrieval.top_k)
            .build()?)
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Extract fields with the configured [`Extractor`] and store the
    /// document. Returns the new contract id.
    pub async fn ingest(&self, document: SourceDocument) -> Result<String> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or(PipelineError::MissingCollaborator("extractor"))?;

        let fields = extractor.extract(&document.text).await.map_err(|e| {
            error!(source_file = ?document.source_file, error = %e, "extraction failed");
            PipelineError::Extraction(format!("{:#}", e))
        })?;

        self.ingest_extracted(document, fields).await
    }

    /// Store a document with already-extracted fields. Returns the new
    /// contract id.
    pub async fn ingest_extracted(
        &self,
        document: SourceDocument,
        mut fields: Map<String, Value>,
    ) -> Result<String> {
        if let Some(name) = &document.source_file {
            fields.insert(SOURCE_FILE.to_string(), Value::String(name.clone()));
        }

        let id = new_contract_id();
        self.store
            .insert(NewContract {
                id: &id,
                text: &document.text,
                fields: &fields,
                confidence: document.confidence,
            })
            .await
            .map_err(|e| {
                error!(contract.id = %id, error = %e, "failed to store contract");
                e
            })?;

        info!(contract.id = %id, source_file = ?document.source_file, "ingested contract");
        Ok(id)
    }

    /// The `top_k` contracts nearest to `question`.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<QueryHit>> {
        Ok(self.store.query(question, self.top_k).await?)
    }

    /// Retrieve and assemble the answering context for `question`.
    pub async fn context(&self, question: &str) -> Result<AssembledContext> {
        let hits = self.retrieve(question).await?;
        Ok(self.assembler.assemble(&hits))
    }

    /// Answer `question` from the stored contracts.
    ///
    /// Short-circuits with [`Answer::NoRelevantContracts`] when retrieval
    /// is empty, without consulting the answerer.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let (text, contract_ids) = match self.context(question).await? {
            AssembledContext::NoRelevantContracts => {
                info!(hits = 0, "no relevant contracts");
                return Ok(Answer::NoRelevantContracts);
            }
            AssembledContext::Blocks { text, contract_ids } => (text, contract_ids),
        };

        let answerer = self
            .answerer
            .as_ref()
            .ok_or(PipelineError::MissingCollaborator("answerer"))?;

        let answer = answerer.answer(question, &text).await.map_err(|e| {
            error!(error = %e, "answering failed");
            PipelineError::Answer(format!("{:#}", e))
        })?;

        info!(hits = contract_ids.len(), "answered question");
        Ok(Answer::Answered {
            text: answer,
            contract_ids,
        })
    }
}

/// Builder for [`ContractPipeline`].
///
/// The vector store is required; the assembler defaults to
/// [`ContextAssembler::default`] and `top_k` to 3.
#[derive(Default)]
pub struct ContractPipelineBuilder {
    store: Option<VectorStore>,
    assembler: Option<ContextAssembler>,
    top_k: Option<usize>,
    extractor: Option<Arc<dyn Extractor>>,
    answerer: Option<Arc<dyn Answerer>>,
}

impl ContractPipelineBuilder {
    pub fn store(mut self, store: VectorStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn answerer(mut self, answerer: Arc<dyn Answerer>) -> Self {
        self.answerer = Some(answerer);
        self
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::MissingCollaborator`] without a store.
    pub fn build(self) -> Result<ContractPipeline> {
        let store = self
            .store
            .ok_or(PipelineError::MissingCollaborator("vector store"))?;
        Ok(ContractPipeline {
            store,
            assembler: self.assembler.unwrap_or_default(),
            top_k: self.top_k.unwrap_or(3),
            extractor: self.extractor,
            answerer: self.answerer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_id_format() {
        let id = new_contract_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "contract");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 32);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_contract_id(), id);
    }

    #[test]
    fn test_build_requires_store() {
        let err = ContractPipeline::builder().top_k(2).build();
        assert!(matches!(
            err,
            Err(PipelineError::MissingCollaborator("vector store"))
        ));
    }
}
