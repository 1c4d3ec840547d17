//! Canonical observation strings
//!
//! Equal scenes must produce equal strings, otherwise the debouncer would
//! treat label order or OCR whitespace noise as a change.

use std::collections::BTreeSet;

/// Sorted, de-duplicated labels joined with `", "`
pub fn canonical_labels<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(|label| label.as_ref().trim())
        .filter(|label| !label.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Trimmed text with every whitespace run collapsed to one space
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
