//! Keyword-overlap ranking used when no embedding model is available

use std::collections::HashSet;

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Rank `documents` by the number of distinct lowercase words shared with
/// `query`. Zero-overlap documents are dropped; ties keep document order.
/// Returns `(document index, overlap)`.
pub fn rank<'a, I>(query: &str, documents: I, top_k: usize) -> Vec<(usize, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let query_words = tokens(query);
    if query_words.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize)> = documents
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| {
            let overlap = tokens(text).intersection(&query_words).count();
            (overlap > 0).then_some((i, overlap))
        })
        .collect();

    // stable: equal scores stay in ingestion order
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(top_k);
    scored
}
