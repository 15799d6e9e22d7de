//! # Contract Store
//!
//! A local contract knowledge store: plain-text contracts with structured
//! fields, embedded into a persistent vector collection and retrieved as
//! the context a question-answering model needs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Pipeline   │──▶│   VectorStore    │──▶│ SqliteStore  │
//! │ ingest/ask  │   │ sanitize + embed │   │  contracts   │
//! └──────┬──────┘   └──────────────────┘   └──────────────┘
//!        │
//!        ▼
//! ┌─────────────────┐
//! │ContextAssembler │──▶ answering context
//! └─────────────────┘
//! ```
//!
//! The storage-agnostic pieces (sanitizer, vector store facade, context
//! assembler) live in `contract-store-core`. This crate adds the SQLite
//! backend, the embedding providers, configuration, and the `ctr` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! ctr init
//! ctr ingest lease.txt --fields '{"parties": ["Acme", "Beta"]}'
//! ctr search "termination notice"
//! ctr context "When does the Acme lease end?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite collection backend |
//! | [`embedding`] | Embedding providers |
//! | [`pipeline`] | Ingestion and question answering |
//! | [`ingest`], [`get`], [`search`], [`stats`], [`export`] | CLI commands |

pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod pipeline;
pub mod search;
pub mod sqlite_store;
pub mod stats;
