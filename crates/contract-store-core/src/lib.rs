//! # Contract Store Core
//!
//! Backend-independent logic for Contract Store: the metadata model and
//! sanitizer, the embedding trait, the [`Store`](store::Store) backend
//! abstraction with an in-memory implementation, the
//! [`VectorStore`](vector_store::VectorStore) facade, and the retrieval
//! [`ContextAssembler`](context::ContextAssembler).
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! Those live in the `contract-store` app crate.

pub mod context;
pub mod embedding;
pub mod error;
pub mod metadata;
pub mod models;
pub mod store;
pub mod vector_store;

pub use context::{AssembledContext, ContextAssembler, ContextOptions, NO_RELEVANT_CONTRACTS};
pub use error::StoreError;
pub use vector_store::{EmbedInput, StoreOptions, VectorStore};
