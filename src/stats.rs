//! Collection statistics.
//!
//! Provides a quick summary of what's stored: contract count, the
//! collection's embedding model, and extraction coverage. Used by
//! `ctr stats`.

use anyhow::Result;
use contract_store_core::metadata::RESERVED_KEYS;
use contract_store_core::models::ContractSummary;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::pipeline::{open_store, SOURCE_FILE};

/// Aggregates over the listed contracts.
#[derive(Debug, Default, PartialEq)]
struct Coverage {
    total: usize,
    without_fields: usize,
    with_confidence: usize,
    mean_confidence: Option<f32>,
}

/// Whether anything beyond the injected diagnostics and the file name
/// was stored.
fn has_extracted_fields(metadata: &Map<String, Value>) -> bool {
    metadata
        .keys()
        .any(|k| k != SOURCE_FILE && !RESERVED_KEYS.contains(&k.as_str()))
}

fn coverage(contracts: &[ContractSummary]) -> Coverage {
    let without_fields = contracts
        .iter()
        .filter(|c| !has_extracted_fields(&c.metadata))
        .count();
    let confidences: Vec<f32> = contracts.iter().filter_map(|c| c.confidence).collect();
    let mean_confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
    };
    Coverage {
        total: contracts.len(),
        without_fields,
        with_confidence: confidences.len(),
        mean_confidence,
    }
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let contracts = store.list().await?;
    let cov = coverage(&contracts);
    let spec = store.collection();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Contract Store: Collection Stats");
    println!("================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Collection:  {}", spec.name);
    println!("  Distance:    {}", spec.metric.as_str());
    println!("  Model:       {} ({} dims)", spec.model, spec.dims);
    println!();
    println!("  Contracts:   {}", cov.total);
    println!(
        "  No fields:   {} / {} ({}%)",
        cov.without_fields,
        cov.total,
        if cov.total > 0 {
            (cov.without_fields * 100) / cov.total
        } else {
            0
        }
    );
    match cov.mean_confidence {
        Some(mean) => println!(
            "  Confidence:  mean {:.2} over {} contract(s)",
            mean, cov.with_confidence
        ),
        None => println!("  Confidence:  n/a"),
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
