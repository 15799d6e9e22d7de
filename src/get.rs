//! Contract retrieval by ID, listing, and removal.
//!
//! Backs the `ctr get`, `ctr list`, and `ctr delete` commands.

use anyhow::{bail, Result};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::pipeline::open_store;

fn format_metadata(metadata: &Map<String, Value>) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

/// CLI entry point: print one contract in full.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let Some(contract) = store.get(id).await? else {
        bail!("contract not found: {}", id);
    };

    println!("--- Contract ---");
    println!("id:           {}", contract.id);
    println!(
        "ingested_at:  {}",
        contract.ingested_at.format("%Y-%m-%dT%H:%M:%SZ")
    );
    if let Some(confidence) = contract.confidence {
        println!("confidence:   {:.2}", confidence);
    }
    println!("metadata:     {}", format_metadata(&contract.metadata));
    println!();

    println!("--- Text ---");
    println!("{}", contract.text);

    Ok(())
}

/// CLI entry point: one entry per contract, in insertion order.
pub async fn run_list(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let contracts = store.list().await?;

    if contracts.is_empty() {
        println!("No contracts stored.");
        return Ok(());
    }

    let field = |metadata: &Map<String, Value>, key: &str| {
        metadata
            .get(key)
            .map(contract_store_core::context::display_value)
            .unwrap_or_else(|| "N/A".to_string())
    };

    for (i, c) in contracts.iter().enumerate() {
        println!("{}. {}", i + 1, c.id);
        println!("   File:    {}", field(&c.metadata, "source_file"));
        println!("   Type:    {}", field(&c.metadata, "contract_type"));
        println!("   Parties: {}", field(&c.metadata, "parties"));
        println!("   Ends:    {}", field(&c.metadata, "end_date"));
        println!("   Preview: {}", c.text_preview.replace('\n', " "));
        println!();
    }
    println!("{} contract(s)", contracts.len());

    Ok(())
}

/// CLI entry point: remove a contract. Unknown ids are an error.
pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    if !store.delete(id).await? {
        bail!("contract not found: {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}
