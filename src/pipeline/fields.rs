//! Field detection: does OCR output plausibly contain an invoice?
//!
//! This is a cheap gate, not validation. A single alias match is enough to
//! accept a recognition pass; deciding what the fields actually say is the
//! language model's job.

use serde::{Deserialize, Serialize};

/// Ordered list of keyword aliases. Empty aliases are dropped on construction
/// so they can never match every text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    aliases: Vec<String>,
}

impl FieldSet {
    pub fn new<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            aliases: aliases
                .into_iter()
                .map(Into::into)
                .filter(|a: &String| !a.trim().is_empty())
                .collect(),
        }
    }

    /// Canonical headings of Spanish-language invoices.
    pub fn invoice() -> Self {
        Self::new(["Factura", "Fecha", "Total", "Cliente", "Proveedor"])
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::invoice()
    }
}

/// True when any alias occurs in `text`, ignoring case. Aliases are checked in
/// order and the first hit wins.
pub fn contains_key_field(text: &str, fields: &FieldSet) -> bool {
    if text.is_empty() {
        return false;
    }
    let haystack = text.to_lowercase();
    fields
        .aliases
        .iter()
        .any(|alias| haystack.contains(&alias.to_lowercase()))
}
