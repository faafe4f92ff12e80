//! Bounded-concurrency frontier: expands a seed URL under a depth budget,
//! visiting each URL at most once, staying within the seed's origin, and
//! terminating when no task remains in flight.
//!
//! Concurrency model: rather than a literal `Vec<Thread>` pulling from a
//! `Mutex`-guarded `VecDeque`, each task is a spawned Tokio task and the
//! bounded worker count is enforced with a `Semaphore` held for the
//! task's full fetch-parse-persist duration. The pool handle captured by
//! every spawned task is an `Arc<Frontier>`, avoiding a self-referential
//! recursive closure.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use index_core::error::{FetchError, StoreError};
use index_core::store::IndexStore;
use index_core::text::{count_terms, extract_links, normalize, strip_tags};
use index_core::HttpFetcher;
use tokio::sync::{Notify, Semaphore};

/// Bodies shorter than this are treated as a fetch error.
const MIN_BODY_LEN: usize = 100;
/// At most this many accepted (same-origin) links are enqueued per page.
const LINK_CAP: usize = 5;

/// Abstraction over [`HttpFetcher`] so the frontier can be unit tested
/// against a fake without real network I/O.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        HttpFetcher::fetch(self, url).await
    }
}

/// Counters surfaced once the crawl reaches quiescence.
#[derive(Debug, Default)]
pub struct CrawlSummary {
    pub pages_indexed: i64,
    pub errors: i64,
    pub urls_visited: usize,
}

pub struct Frontier {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn IndexStore>,
    visited: Mutex<HashSet<String>>,
    allowed_domains: HashSet<String>,
    max_depth: u32,
    worker_semaphore: Semaphore,
    in_flight: AtomicI64,
    done: Notify,
    pages_indexed: AtomicI64,
    errors: AtomicI64,
    shutting_down: AtomicBool,
}

impl Frontier {
    /// Builds a frontier whose only allowed origin is the authority of
    /// `start_page`. The allow-list is seeded once at startup and never
    /// grows.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn IndexStore>,
        start_page: &str,
        max_depth: u32,
        worker_count: usize,
    ) -> Self {
        let mut allowed_domains = HashSet::new();
        if let Some(authority) = authority_of(start_page) {
            allowed_domains.insert(authority);
        }

        Self {
            fetcher,
            store,
            visited: Mutex::new(HashSet::new()),
            allowed_domains,
            max_depth,
            worker_semaphore: Semaphore::new(worker_count.max(1)),
            in_flight: AtomicI64::new(0),
            done: Notify::new(),
            pages_indexed: AtomicI64::new(0),
            errors: AtomicI64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Seeds the frontier with `start_page` at depth 1 and waits for
    /// quiescence: the queue empty and no task in flight. The seed is
    /// always spawned, bypassing `shutdown`, since a crawl that hasn't
    /// started yet has nothing to drain.
    pub async fn run(self: &Arc<Self>, start_page: String) -> CrawlSummary {
        self.spawn_seed(start_page);
        self.done.notified().await;

        CrawlSummary {
            pages_indexed: self.pages_indexed.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            urls_visited: self.visited.lock().unwrap().len(),
        }
    }

    /// Stops new tasks from being spawned. Tasks already in flight are
    /// unaffected and still decrement `in_flight`/notify `done` normally
    /// on completion, so a caller that keeps awaiting `run`'s future after
    /// calling this still observes a correct quiescence signal once the
    /// in-flight work drains.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Spawns the seed task regardless of `shutting_down`.
    fn spawn_seed(self: &Arc<Self>, url: String) {
        self.spawn_task(url, 1);
    }

    /// Enqueues a child task, unless a shutdown has been requested.
    fn spawn(self: &Arc<Self>, url: String, depth: u32) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        self.spawn_task(url, depth);
    }

    /// Increments `in_flight` at *submission* time, before the task is
    /// spawned — not at task start. Moving this into the spawned body
    /// would let `in_flight` observe zero while a submitted-but-not-yet-
    /// scheduled task is still pending, causing spurious early completion.
    fn spawn_task(self: &Arc<Self>, url: String, depth: u32) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.process(url, depth).await;
            if this.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                this.done.notify_one();
            }
        });
    }

    async fn process(self: &Arc<Self>, url: String, depth: u32) {
        if depth > self.max_depth {
            return;
        }

        {
            let mut visited = self.visited.lock().unwrap();
            if visited.contains(&url) {
                return;
            }
            visited.insert(url.clone());
        }

        let Some(authority) = authority_of(&url) else {
            return;
        };
        if !self.allowed_domains.contains(&authority) {
            tracing::debug!(url = %url, "skipping url outside allowed origin");
            return;
        }

        // Held for the rest of this task's work, bounding how many tasks
        // are concurrently fetching/parsing/persisting to `worker_count`.
        let _permit = self
            .worker_semaphore
            .acquire()
            .await
            .expect("worker semaphore is never closed");

        let html = match self.fetcher.fetch(&url).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "fetch failed, skipping");
                self.errors.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        if html.len() < MIN_BODY_LEN {
            tracing::warn!(url = %url, len = html.len(), "body too short, treating as error");
            self.errors.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let text = normalize(&strip_tags(&html));
        let freq = count_terms(&text);

        if freq.is_empty() {
            tracing::debug!(url = %url, "no indexable terms found");
        } else if let Err(err) = self.index_page(&url, &freq).await {
            tracing::error!(url = %url, error = %err, "failed to persist page");
            self.errors.fetch_add(1, Ordering::SeqCst);
        } else {
            self.pages_indexed.fetch_add(1, Ordering::SeqCst);
        }

        if depth < self.max_depth {
            self.enqueue_children(&html, &url, depth);
        }
    }

    /// A child's existence in the frontier implies its parent is durable:
    /// this is only reached after `index_page` above has already awaited.
    fn enqueue_children(self: &Arc<Self>, html: &str, url: &str, depth: u32) {
        let links = extract_links(html, url);
        let mut accepted = 0usize;
        for link in links {
            if accepted >= LINK_CAP {
                break;
            }
            let Some(link_authority) = authority_of(&link) else {
                continue;
            };
            if !self.allowed_domains.contains(&link_authority) {
                continue;
            }
            accepted += 1;
            self.spawn(link, depth + 1);
        }
    }

    async fn index_page(
        &self,
        url: &str,
        freq: &HashMap<String, u32>,
    ) -> Result<(), StoreError> {
        let doc_id = self.store.upsert_document(url).await?;
        for (word, count) in freq {
            let word_id = self.store.upsert_word(word).await?;
            self.store.put_posting(word_id, doc_id, *count).await?;
        }
        Ok(())
    }
}

/// Extracts the `host[:port]` authority from an absolute `http(s)` URL.
fn authority_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        None
    } else {
        Some(authority.to_string())
    }
}
