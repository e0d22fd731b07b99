// SPDX-License-Identifier: MIT OR Apache-2.0
//! Catalog ranking for builder suggestions.

use vespid_core::{CatalogItem, component_catalog};

/// Default number of suggestions.
pub const DEFAULT_LIMIT: usize = 20;

/// Token cap per query.
const MAX_TOKENS: usize = 20;
/// Minimum token length.
const MIN_TOKEN_LEN: usize = 2;

/// Tokenize a query: lowercase, split on non-alphanumerics, drop tokens
/// shorter than two characters, cap at twenty tokens.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .take(MAX_TOKENS)
        .map(str::to_owned)
        .collect()
}

/// Rank catalog items against a query.
///
/// Score is the count of query tokens substring-found in `name +
/// description`; ties break by key ascending. An empty token set returns
/// the catalog head in insertion order.
pub fn rank_components(query: &str, limit: usize) -> Vec<&'static CatalogItem> {
    let catalog = component_catalog();
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return catalog.iter().take(limit).collect();
    }
    let mut scored: Vec<(usize, &CatalogItem)> = catalog
        .iter()
        .map(|item| {
            let haystack = format!("{} {}", item.name, item.description).to_lowercase();
            let score = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
            (score, item)
        })
        .collect();
    scored.sort_by(|(score_a, a), (score_b, b)| score_b.cmp(score_a).then(a.key.cmp(b.key)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, item)| item)
        .collect()
}

/// Like [`rank_components`], but keeps only items that matched at least one
/// token. This is the variant whose keys are merged into a session's
/// selection; zero-score filler must not end up selected.
pub fn suggest_components(query: &str, limit: usize) -> Vec<&'static CatalogItem> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }
    rank_components(query, limit)
        .into_iter()
        .filter(|item| {
            let haystack = format!("{} {}", item.name, item.description).to_lowercase();
            tokens.iter().any(|t| haystack.contains(t.as_str()))
        })
        .collect()
}
