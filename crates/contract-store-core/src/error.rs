//! Error types for the contract store.

use thiserror::Error;

/// Errors raised by [`Store`](crate::store::Store) backends and the
/// [`VectorStore`](crate::vector_store::VectorStore) facade.
///
/// Lookups of unknown ids are not errors: `get` returns `None` and
/// `delete` returns `false`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this id already exists in the collection.
    #[error("contract id already exists: {0}")]
    DuplicateId(String),

    /// An embedding does not match the collection's dimensionality.
    #[error("embedding has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An embedding has a NaN or infinite component.
    #[error("embedding component {index} is not finite")]
    NonFiniteEmbedding { index: usize },

    /// The configured embedding model or dims disagree with what the
    /// collection was created with.
    #[error("collection '{collection}' mismatch: {message}")]
    CollectionMismatch { collection: String, message: String },

    /// The persistence or embedding backend failed or is unreachable.
    /// Never retried by the store.
    #[error("backend unavailable ({backend}): {message}")]
    Unavailable { backend: String, message: String },
}

impl StoreError {
    pub fn unavailable(backend: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StoreError::Unavailable {
            backend: backend.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
