//! Export and import of a collection as JSON Lines.
//!
//! One contract per line in the flat interchange layout: metadata values
//! are primitives, with structured values JSON-encoded as strings, and
//! `metadata_kinds` records each field's stored type. Import restores the
//! types from `metadata_kinds`, falling back to the leading-bracket guess
//! for lines without it, and keeps the exported embedding, so no
//! re-embedding happens.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use contract_store_core::metadata::{flat_kinds, from_flat, to_flat, FlatKinds};
use contract_store_core::models::StoredContract;
use contract_store_core::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::pipeline::open_store;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ExportRecord {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_kinds: Option<FlatKinds>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl From<&StoredContract> for ExportRecord {
    fn from(c: &StoredContract) -> Self {
        Self {
            id: c.id.clone(),
            document: c.text.clone(),
            embedding: c.embedding.clone(),
            metadata: to_flat(&c.metadata),
            metadata_kinds: Some(flat_kinds(&c.metadata)),
            ingested_at: c.ingested_at,
            confidence: c.confidence,
        }
    }
}

impl From<ExportRecord> for StoredContract {
    fn from(r: ExportRecord) -> Self {
        Self {
            metadata: from_flat(&r.metadata, r.metadata_kinds.as_ref()),
            id: r.id,
            text: r.document,
            embedding: r.embedding,
            ingested_at: r.ingested_at,
            confidence: r.confidence,
        }
    }
}

/// Export every contract as JSON Lines.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = open_store(config).await?;

    let mut lines = String::new();
    let mut count = 0usize;
    for summary in store.list().await? {
        // Deleted between list and get: skip.
        let Some(contract) = store.get_stored(&summary.id).await? else {
            continue;
        };
        lines.push_str(&serde_json::to_string(&ExportRecord::from(&contract))?);
        lines.push('\n');
        count += 1;
    }

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &lines)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            eprintln!("Exported {} contracts to {}", count, path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(lines.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Import a JSON Lines export. Ids that already exist are skipped.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let store = open_store(config).await?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ExportRecord = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), line_no + 1))?;
        let contract = StoredContract::from(record);

        match store.restore(&contract).await {
            Ok(()) => imported += 1,
            Err(StoreError::DuplicateId(id)) => {
                tracing::warn!(contract.id = %id, "skipping existing contract");
                skipped += 1;
            }
            Err(e @ StoreError::DimensionMismatch { .. }) => {
                bail!(
                    "{}:{}: {} (was the export made with another embedding model?)",
                    path.display(),
                    line_no + 1,
                    e
                );
            }
            Err(e @ StoreError::NonFiniteEmbedding { .. }) => {
                bail!("{}:{}: {}", path.display(), line_no + 1, e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("Imported {} contracts ({} skipped)", imported, skipped);
    Ok(())
}
