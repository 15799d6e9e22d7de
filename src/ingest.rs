//! `ctr ingest`: store one plain-text contract.
//!
//! The CLI has no extraction model; structured fields come from the
//! `--fields` JSON object, already extracted by whatever tool the caller
//! uses. They are sanitized like any extractor output.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

use crate::config::Config;
use crate::pipeline::{ContractPipeline, SourceDocument};

/// Parse the `--fields` argument into a JSON object.
pub fn parse_fields(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("--fields is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--fields must be a JSON object, got: {}", other),
    }
}

pub async fn run_ingest(
    config: &Config,
    file: &Path,
    fields: Option<&str>,
    confidence: Option<f32>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read contract text: {}", file.display()))?;
    if text.trim().is_empty() {
        bail!("{} contains no text", file.display());
    }
    let fields = parse_fields(fields)?;

    let pipeline = ContractPipeline::from_config(config).await?;
    let document = SourceDocument {
        text,
        source_file: file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        confidence,
    };
    let id = pipeline.ingest_extracted(document, fields).await?;

    println!("{}", id);
    Ok(())
}
