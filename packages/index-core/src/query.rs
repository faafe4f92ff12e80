//! Parses a raw search string into up to 4 distinct normalized terms and
//! delegates the ranked lookup to an [`IndexStore`].

use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{IndexStore, SearchHit};
use crate::text::normalize;

const MAX_TERMS: usize = 4;
const MIN_WORD_LEN: usize = 3;
const MAX_WORD_LEN: usize = 32;
const RESULT_LIMIT: i64 = 10;

pub struct QueryEngine {
    store: Arc<dyn IndexStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    /// Normalizes `raw`, keeps the first up to 4 distinct terms passing the
    /// length filter, and returns up to 10 ranked `(url, score)` hits. An
    /// empty term set (e.g. an all-punctuation query) returns an empty
    /// result without touching the store.
    pub async fn query(&self, raw: &str) -> Result<Vec<SearchHit>, StoreError> {
        let terms = terms_from_raw(raw);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search(&terms, RESULT_LIMIT).await
    }
}

fn terms_from_raw(raw: &str) -> Vec<String> {
    let normalized = normalize(raw);
    let mut terms = Vec::new();
    for token in normalized.split_whitespace() {
        if token.len() < MIN_WORD_LEN || token.len() > MAX_WORD_LEN {
            continue;
        }
        if terms.contains(&token.to_string()) {
            continue;
        }
        terms.push(token.to_string());
        if terms.len() == MAX_TERMS {
            break;
        }
    }
    terms
}
