//! Similarity search and answering-context output.
//!
//! Backs `ctr search` (ranked hits with snippets) and `ctr context` (the
//! assembled context an answering model would receive).

use anyhow::Result;
use contract_store_core::models::{char_prefix, QueryHit};
use contract_store_core::ContextAssembler;

use crate::config::Config;
use crate::pipeline::{open_store, ContractPipeline};

const SNIPPET_CHARS: usize = 240;

fn snippet(hit: &QueryHit) -> String {
    let (prefix, truncated) = char_prefix(&hit.text, SNIPPET_CHARS);
    let flat = prefix.replace(['\n', '\r'], " ");
    if truncated {
        format!("{}...", flat.trim_end())
    } else {
        flat
    }
}

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = open_store(config).await?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let hits = store.query(query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let file = hit
            .metadata
            .get("source_file")
            .and_then(|v| v.as_str())
            .unwrap_or("(unknown file)");
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            hit.similarity(),
            hit.id,
            file
        );
        println!("   distance: {:.4}", hit.distance);
        println!("   > {}", snippet(hit));
        println!();
    }

    Ok(())
}

pub async fn run_context(config: &Config, question: &str, k: Option<usize>) -> Result<()> {
    let pipeline = ContractPipeline::builder()
        .store(open_store(config).await?)
        .assembler(ContextAssembler::new(config.context_options()))
        .top_k(k.unwrap_or(config.retrieval.top_k))
        .build()?;

    let context = pipeline.context(question).await?;
    print!("{}", context);
    if context.is_empty() {
        println!();
    }
    Ok(())
}
