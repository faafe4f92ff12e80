//! The persistent inverted index: documents, words, and per-(word, doc)
//! frequencies. `IndexStore` is a trait so crawler/query-engine unit tests
//! can substitute an in-memory fake instead of a live Postgres instance.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::future::Future;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordId(pub i32);

/// One ranked result row: a document URL and its summed term frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub score: i64,
}

#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Idempotently creates the three relations.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Returns the existing id for `url` or inserts and returns a new one.
    async fn upsert_document(&self, url: &str) -> Result<DocumentId, StoreError>;

    /// Returns the existing id for `word` or inserts and returns a new one.
    async fn upsert_word(&self, word: &str) -> Result<WordId, StoreError>;

    /// Writes `(word_id, doc_id, frequency)`. Idempotent on the
    /// `(word_id, doc_id)` key: a repeat call overwrites the stored
    /// frequency with the newer value.
    async fn put_posting(
        &self,
        word_id: WordId,
        doc_id: DocumentId,
        frequency: u32,
    ) -> Result<(), StoreError>;

    /// Returns documents containing every one of `terms`, scored by the
    /// sum of their frequencies, ordered by descending score then
    /// ascending url, capped at `limit`.
    async fn search(&self, terms: &[String], limit: i64) -> Result<Vec<SearchHit>, StoreError>;
}

/// Postgres-backed `IndexStore`. A single transient `StoreError::
/// Unavailable` is retried once with a short fixed backoff before being
/// surfaced to the caller.
pub struct PostgresIndexStore {
    pool: PgPool,
}

impl PostgresIndexStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(StoreError::Unavailable(first_err)) => {
            tracing::warn!(error = %first_err, "store call failed, retrying once");
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            op().await
        }
        Err(other) => Err(other),
    }
}

#[async_trait]
impl IndexStore for PostgresIndexStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id SERIAL PRIMARY KEY,
                url TEXT UNIQUE NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS words (
                id SERIAL PRIMARY KEY,
                word TEXT UNIQUE NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS word_doc (
                word_id INTEGER NOT NULL REFERENCES words(id),
                doc_id INTEGER NOT NULL REFERENCES documents(id),
                frequency INTEGER NOT NULL CHECK (frequency >= 1),
                PRIMARY KEY (word_id, doc_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_document(&self, url: &str) -> Result<DocumentId, StoreError> {
        with_retry(|| async {
            let row = sqlx::query(
                "INSERT INTO documents (url) VALUES ($1)
                 ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url
                 RETURNING id",
            )
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
            Ok(DocumentId(row.try_get("id")?))
        })
        .await
    }

    async fn upsert_word(&self, word: &str) -> Result<WordId, StoreError> {
        with_retry(|| async {
            let row = sqlx::query(
                "INSERT INTO words (word) VALUES ($1)
                 ON CONFLICT (word) DO UPDATE SET word = EXCLUDED.word
                 RETURNING id",
            )
            .bind(word)
            .fetch_one(&self.pool)
            .await?;
            Ok(WordId(row.try_get("id")?))
        })
        .await
    }

    async fn put_posting(
        &self,
        word_id: WordId,
        doc_id: DocumentId,
        frequency: u32,
    ) -> Result<(), StoreError> {
        with_retry(|| async {
            sqlx::query(
                "INSERT INTO word_doc (word_id, doc_id, frequency) VALUES ($1, $2, $3)
                 ON CONFLICT (word_id, doc_id) DO UPDATE SET frequency = EXCLUDED.frequency",
            )
            .bind(word_id.0)
            .bind(doc_id.0)
            .bind(frequency as i32)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn search(&self, terms: &[String], limit: i64) -> Result<Vec<SearchHit>, StoreError> {
        if terms.is_empty() || terms.len() > 4 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT d.url AS url, SUM(wd.frequency)::BIGINT AS score
             FROM documents d
             JOIN word_doc wd ON wd.doc_id = d.id
             JOIN words w ON w.id = wd.word_id
             WHERE w.word = ANY($1)
             GROUP BY d.id, d.url
             HAVING COUNT(DISTINCT w.word) = $2
             ORDER BY score DESC, d.url ASC
             LIMIT $3",
        )
        .bind(terms)
        .bind(terms.len() as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SearchHit {
                    url: row.try_get("url")?,
                    score: row.try_get("score")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory `IndexStore` fake for fast unit tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    pub struct FakeIndexStore {
        inner: Mutex<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        documents: HashMap<String, DocumentId>,
        words: HashMap<String, WordId>,
        postings: HashMap<(WordId, DocumentId), u32>,
        next_doc_id: i32,
        next_word_id: i32,
    }

    impl FakeIndexStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn document_count(&self) -> usize {
            self.inner.lock().unwrap().documents.len()
        }

        pub fn word_count(&self) -> usize {
            self.inner.lock().unwrap().words.len()
        }

        pub fn frequency_of(&self, word: &str, url: &str) -> Option<u32> {
            let inner = self.inner.lock().unwrap();
            let word_id = *inner.words.get(word)?;
            let doc_id = *inner.documents.get(url)?;
            inner.postings.get(&(word_id, doc_id)).copied()
        }
    }

    #[async_trait]
    impl IndexStore for FakeIndexStore {
        async fn ensure_schema(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn upsert_document(&self, url: &str) -> Result<DocumentId, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(id) = inner.documents.get(url) {
                return Ok(*id);
            }
            let id = DocumentId(inner.next_doc_id);
            inner.next_doc_id += 1;
            inner.documents.insert(url.to_string(), id);
            Ok(id)
        }

        async fn upsert_word(&self, word: &str) -> Result<WordId, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(id) = inner.words.get(word) {
                return Ok(*id);
            }
            let id = WordId(inner.next_word_id);
            inner.next_word_id += 1;
            inner.words.insert(word.to_string(), id);
            Ok(id)
        }

        async fn put_posting(
            &self,
            word_id: WordId,
            doc_id: DocumentId,
            frequency: u32,
        ) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            inner.postings.insert((word_id, doc_id), frequency);
            Ok(())
        }

        async fn search(&self, terms: &[String], limit: i64) -> Result<Vec<SearchHit>, StoreError> {
            if terms.is_empty() || terms.len() > 4 {
                return Ok(Vec::new());
            }
            let inner = self.inner.lock().unwrap();

            let term_ids: Vec<WordId> = match terms.iter().map(|t| inner.words.get(t).copied()).collect::<Option<Vec<_>>>() {
                Some(ids) => ids,
                None => return Ok(Vec::new()),
            };

            let mut scores: HashMap<DocumentId, i64> = HashMap::new();
            let mut matched: HashMap<DocumentId, usize> = HashMap::new();
            for word_id in &term_ids {
                for ((w, doc_id), freq) in inner.postings.iter() {
                    if w == word_id {
                        *scores.entry(*doc_id).or_insert(0) += *freq as i64;
                        *matched.entry(*doc_id).or_insert(0) += 1;
                    }
                }
            }

            let url_of: HashMap<DocumentId, &String> =
                inner.documents.iter().map(|(url, id)| (*id, url)).collect();

            let mut hits: Vec<SearchHit> = matched
                .into_iter()
                .filter(|(_, count)| *count == term_ids.len())
                .filter_map(|(doc_id, _)| {
                    url_of.get(&doc_id).map(|url| SearchHit {
                        url: (*url).clone(),
                        score: scores[&doc_id],
                    })
                })
                .collect();

            hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));
            hits.truncate(limit as usize);
            Ok(hits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeIndexStore;
    use super::*;

    #[tokio::test]
    async fn upsert_document_is_idempotent() {
        let store = FakeIndexStore::new();
        let a = store.upsert_document("http://example.test/").await.unwrap();
        let b = store.upsert_document("http://example.test/").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.document_count(), 1);
    }

    #[tokio::test]
    async fn put_posting_overwrites_with_newer_frequency() {
        let store = FakeIndexStore::new();
        let doc = store.upsert_document("http://example.test/").await.unwrap();
        let word = store.upsert_word("hello").await.unwrap();
        store.put_posting(word, doc, 3).await.unwrap();
        store.put_posting(word, doc, 7).await.unwrap();
        assert_eq!(store.frequency_of("hello", "http://example.test/"), Some(7));
    }

    #[tokio::test]
    async fn search_ranks_by_summed_frequency_with_url_tiebreak() {
        let store = FakeIndexStore::new();
        let d1 = store.upsert_document("http://d1.test/").await.unwrap();
        let d2 = store.upsert_document("http://d2.test/").await.unwrap();
        let d3 = store.upsert_document("http://d3.test/").await.unwrap();
        let cat = store.upsert_word("cat").await.unwrap();
        let dog = store.upsert_word("dog").await.unwrap();

        store.put_posting(cat, d1, 3).await.unwrap();
        store.put_posting(dog, d1, 2).await.unwrap();
        store.put_posting(cat, d2, 1).await.unwrap();
        store.put_posting(dog, d2, 5).await.unwrap();
        store.put_posting(cat, d3, 4).await.unwrap();

        let both = store
            .search(&["cat".to_string(), "dog".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(
            both,
            vec![
                SearchHit { url: "http://d2.test/".into(), score: 6 },
                SearchHit { url: "http://d1.test/".into(), score: 5 },
            ]
        );

        let cat_only = store.search(&["cat".to_string()], 10).await.unwrap();
        assert_eq!(
            cat_only,
            vec![
                SearchHit { url: "http://d3.test/".into(), score: 4 },
                SearchHit { url: "http://d1.test/".into(), score: 3 },
                SearchHit { url: "http://d2.test/".into(), score: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn search_caps_at_limit() {
        let store = FakeIndexStore::new();
        let word = store.upsert_word("widget").await.unwrap();
        for i in 0..15 {
            let doc = store
                .upsert_document(&format!("http://example.test/{i}"))
                .await
                .unwrap();
            store.put_posting(word, doc, 1).await.unwrap();
        }
        let hits = store.search(&["widget".to_string()], 10).await.unwrap();
        assert_eq!(hits.len(), 10);
    }
}
