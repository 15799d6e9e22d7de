//! Retrieval context assembly.
//!
//! Turns ranked [`QueryHit`]s into the text block handed to an answering
//! model. Each hit becomes one fixed-shape block: a header with the id and
//! relevance, a whitelist of structured fields, and the start of the
//! contract text. Blocks keep rank order.
//!
//! Every variable part is capped, so the output length is bounded by
//! `hits × ContextAssembler::max_block_chars(id_len)`.

use std::fmt::Write as _;

use serde_json::Value;

use crate::models::{char_prefix, QueryHit};

/// Returned instead of a context when retrieval found nothing.
pub const NO_RELEVANT_CONTRACTS: &str = "No relevant contracts were found for this question.";

const RULE_WIDTH: usize = 60;
const MISSING: &str = "N/A";
const ELLIPSIS: &str = "...";

/// Labels and keys of the structured-data section, in output order.
/// `Amount` is rendered from `total_amount` and `currency` together.
const FIELDS: [(&str, &str); 10] = [
    ("File", "source_file"),
    ("Type", "contract_type"),
    ("Parties", "parties"),
    ("Signature", "signature_date"),
    ("Start", "start_date"),
    ("End", "end_date"),
    ("Amount", "total_amount"),
    ("Subject", "subject_matter"),
    ("Clauses", "key_clauses"),
    ("Penalties", "penalties"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    /// Characters of contract text per block.
    pub text_chars: usize,
    /// Characters per structured field value.
    pub field_chars: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            text_chars: 2000,
            field_chars: 200,
        }
    }
}

/// Result of [`ContextAssembler::assemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembledContext {
    NoRelevantContracts,
    Blocks { text: String, contract_ids: Vec<String> },
}

impl AssembledContext {
    /// The context text, or [`NO_RELEVANT_CONTRACTS`].
    pub fn as_str(&self) -> &str {
        match self {
            AssembledContext::NoRelevantContracts => NO_RELEVANT_CONTRACTS,
            AssembledContext::Blocks { text, .. } => text,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AssembledContext::NoRelevantContracts)
    }
}

impl std::fmt::Display for AssembledContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler {
    options: ContextOptions,
}

impl ContextAssembler {
    pub fn new(options: ContextOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn assemble(&self, hits: &[QueryHit]) -> AssembledContext {
        if hits.is_empty() {
            return AssembledContext::NoRelevantContracts;
        }

        let mut text = String::new();
        for hit in hits {
            self.write_block(&mut text, hit);
        }
        AssembledContext::Blocks {
            text,
            contract_ids: hits.iter().map(|h| h.id.clone()).collect(),
        }
    }

    /// Upper bound, in characters, of one block for an id of `id_len`
    /// characters.
    pub fn max_block_chars(&self, id_len: usize) -> usize {
        let rule = RULE_WIDTH + 1;
        // "-100.00" is the widest relevance a clamped distance can produce.
        let header = rule
            + "CONTRACT ID: ".len()
            + id_len
            + 1
            + "RELEVANCE: -100.00%\n".len()
            + rule;
        let field_value = self.options.field_chars + ELLIPSIS.len();
        let fields: usize = FIELDS
            .iter()
            .map(|(label, _)| {
                let value = if *label == "Amount" {
                    2 * field_value + 1
                } else {
                    field_value
                };
                "- ".len() + label.len() + ": ".len() + value + 1
            })
            .sum();
        let text_header = format!("FULL TEXT (first {} chars):\n", self.options.text_chars);
        1 + header
            + 1
            + "STRUCTURED DATA:\n".len()
            + fields
            + 1
            + text_header.len()
            + self.options.text_chars
            + ELLIPSIS.len()
            + 2
    }

    fn write_block(&self, out: &mut String, hit: &QueryHit) {
        let rule = "=".repeat(RULE_WIDTH);
        let relevance = hit.similarity() * 100.0;

        out.push('\n');
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "CONTRACT ID: {}", hit.id);
        let _ = writeln!(out, "RELEVANCE: {:.2}%", relevance);
        let _ = writeln!(out, "{}", rule);
        out.push('\n');
        out.push_str("STRUCTURED DATA:\n");
        for (label, key) in FIELDS {
            let value = if label == "Amount" {
                self.amount(hit)
            } else {
                self.field(hit, key)
            };
            let _ = writeln!(out, "- {}: {}", label, value);
        }
        out.push('\n');

        let (text, truncated) = char_prefix(&hit.text, self.options.text_chars);
        let _ = writeln!(out, "FULL TEXT (first {} chars):", self.options.text_chars);
        out.push_str(text);
        if truncated {
            out.push_str(ELLIPSIS);
        }
        out.push_str("\n\n");
    }

    fn field(&self, hit: &QueryHit, key: &str) -> String {
        match hit.metadata.get(key) {
            Some(value) => self.cap(&display_value(value)),
            None => MISSING.to_string(),
        }
    }

    fn amount(&self, hit: &QueryHit) -> String {
        let amount = self.field(hit, "total_amount");
        match hit.metadata.get("currency") {
            Some(currency) => format!("{} {}", amount, self.cap(&display_value(currency))),
            None => amount,
        }
    }

    fn cap(&self, value: &str) -> String {
        let flat: String = value
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        match char_prefix(&flat, self.options.field_chars) {
            (prefix, true) => format!("{}{}", prefix, ELLIPSIS),
            (_, false) => flat,
        }
    }
}

/// Human-readable rendering of a decoded metadata value.
///
/// Strings render bare; arrays join their items with `", "`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => MISSING.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.is_empty() => MISSING.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
