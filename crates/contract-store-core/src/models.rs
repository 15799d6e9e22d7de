//! Core data models used throughout Contract Store.
//!
//! [`StoredContract`] is what a [`Store`](crate::store::Store) backend
//! persists. The read-side types ([`ContractRecord`], [`QueryHit`],
//! [`ContractSummary`]) carry metadata already decoded back into JSON values.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::metadata::SanitizedMetadata;

/// Input for [`VectorStore::insert`](crate::vector_store::VectorStore::insert).
#[derive(Debug, Clone, Copy)]
pub struct NewContract<'a> {
    pub id: &'a str,
    pub text: &'a str,
    /// Raw extracted fields; sanitized by the store.
    pub fields: &'a Map<String, Value>,
    /// Extraction confidence, expected in `[0, 1]`.
    pub confidence: Option<f32>,
}

/// A contract as persisted by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredContract {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: SanitizedMetadata,
    pub ingested_at: DateTime<Utc>,
    pub confidence: Option<f32>,
}

/// A backend nearest-neighbor candidate.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub contract: StoredContract,
    /// Cosine distance in `[0, 2]`.
    pub distance: f32,
}

/// A listing row from a backend: metadata plus a bounded text preview.
#[derive(Debug, Clone)]
pub struct ListedContract {
    pub id: String,
    pub preview: String,
    /// Whether the full text is longer than `preview`.
    pub truncated: bool,
    pub metadata: SanitizedMetadata,
    pub ingested_at: DateTime<Utc>,
    pub confidence: Option<f32>,
}

/// A full contract record returned by `get`.
#[derive(Debug, Clone, Serialize)]
pub struct ContractRecord {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
    pub ingested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// One ranked result of a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Cosine distance in `[0, 2]`; smaller is closer.
    pub distance: f32,
    pub ingested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl QueryHit {
    /// `1 - distance`, in `[-1, 1]`.
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// A listing entry: everything but the full text.
#[derive(Debug, Clone, Serialize)]
pub struct ContractSummary {
    pub id: String,
    /// First characters of the text, with `...` appended when cut.
    pub text_preview: String,
    pub metadata: Map<String, Value>,
    pub ingested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// The first `max_chars` characters of `text`, and whether anything was cut.
///
/// Counts Unicode scalar values, so the cut never splits a character.
pub fn char_prefix(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}
