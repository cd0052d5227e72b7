//! Crawl engine - frontier management and the per-page state machine
//!
//! One engine run crawls a single site breadth-first from a persisted seed
//! page. The frontier (FIFO queue of `(url, depth)`) and the visited set
//! live on the run's own stack and are never shared or persisted; the page
//! store is the only durable state. Failures are isolated per page and per
//! link - only an unexpected error escaping the loop aborts the run, and
//! that marks the seed Failed.

use crate::crawler::extractor::extract_page;
use crate::crawler::fetcher::fetch_page;
use crate::crawler::observer::{CrawlEvent, CrawlObserver};
use crate::state::PageStatus;
use crate::storage::{PageRecord, PageStore};
use crate::url::filter_links;
use crate::CrawlError;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Limits and scope parameters for one crawl run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Stop the run once this many pages have been successfully processed
    pub max_pages: Option<u32>,

    /// Do not follow links beyond this depth from the seed
    pub max_depth: Option<u32>,

    /// When true, only follow links under `base_path`
    pub restrict_to_path: bool,

    /// Path prefix for `restrict_to_path` (verbatim prefix match)
    pub base_path: Option<String>,

    /// Pause between consecutive fetches within the run
    pub politeness_delay: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_depth: None,
            restrict_to_path: false,
            base_path: None,
            politeness_delay: Duration::from_millis(500),
        }
    }
}

/// Handle to a spawned crawl run
///
/// The submission path drops this handle (fire-and-forget) and observes
/// progress through the page store; embedders that want more control can
/// await the task or cancel it.
pub struct CrawlHandle {
    pub run_id: i64,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Crawl engine for a single site crawl
pub struct CrawlEngine<S: PageStore> {
    store: Arc<Mutex<S>>,
    client: Client,
    options: CrawlOptions,
    observer: Arc<dyn CrawlObserver>,
    cancel: CancellationToken,
}

impl<S: PageStore> CrawlEngine<S> {
    pub fn new(
        store: Arc<Mutex<S>>,
        client: Client,
        options: CrawlOptions,
        observer: Arc<dyn CrawlObserver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            client,
            options,
            observer,
            cancel,
        }
    }

    /// Runs the crawl to completion, limit exhaustion, or cancellation
    ///
    /// All outcomes are communicated through the page store; this method
    /// never returns an error to the caller.
    pub async fn run(&self, seed_page_id: i64, run_id: i64) {
        // A missing seed aborts with no page-store side effects; only the
        // run row is closed out
        let seed = {
            let store = self.store.lock().unwrap();
            store.get_page(seed_page_id)
        };
        let seed = match seed {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(
                    "Cannot start crawl run {}: seed page {} not loadable: {}",
                    run_id,
                    seed_page_id,
                    e
                );
                let mut store = self.store.lock().unwrap();
                if let Err(db_err) = store.fail_run(run_id) {
                    tracing::error!("Additionally failed to close run {}: {}", run_id, db_err);
                }
                return;
            }
        };

        // A domain is mandatory to scope link filtering
        if seed.domain.is_empty() {
            let reason = "Missing domain information";
            let mut store = self.store.lock().unwrap();
            if let Err(db_err) = store.mark_failed(seed.id, reason) {
                tracing::error!("Failed to mark seed {} as failed: {}", seed.url, db_err);
            }
            if let Err(db_err) = store.fail_run(run_id) {
                tracing::error!("Additionally failed to close run {}: {}", run_id, db_err);
            }
            drop(store);
            self.observer.on_event(CrawlEvent::RunAborted {
                run_id,
                error: reason.to_string(),
            });
            return;
        }

        self.observer.on_event(CrawlEvent::RunStarted {
            run_id,
            seed_url: seed.url.clone(),
        });

        match self.run_loop(&seed, run_id).await {
            Ok(pages_crawled) => {
                {
                    let mut store = self.store.lock().unwrap();
                    // If limits ended the run while the seed was still
                    // mid-flight, close it out as Completed
                    if let Err(e) = store.complete_if_processing(seed.id) {
                        tracing::error!("Failed to finalize seed {}: {}", seed.url, e);
                    }
                    if let Err(e) = store.complete_run(run_id) {
                        tracing::error!("Failed to close run {}: {}", run_id, e);
                    }
                }
                self.observer.on_event(CrawlEvent::RunFinished {
                    run_id,
                    pages_crawled,
                });
            }
            Err(e) => {
                // The only fatal-abort path: an unexpected error escaped
                // the loop. Mark the seed Failed and end the run.
                let description = format!("Runtime error: {}", e);
                {
                    let mut store = self.store.lock().unwrap();
                    if let Err(db_err) = store.mark_failed(seed.id, &description) {
                        tracing::error!(
                            "Additionally failed to mark seed {} as failed: {}",
                            seed.url,
                            db_err
                        );
                    }
                    if let Err(db_err) = store.fail_run(run_id) {
                        tracing::error!("Additionally failed to close run {}: {}", run_id, db_err);
                    }
                }
                self.observer.on_event(CrawlEvent::RunAborted {
                    run_id,
                    error: description,
                });
            }
        }
    }

    /// The main crawl loop
    ///
    /// Per-page and per-link problems are handled inline and never abort
    /// the loop; anything propagated out of here is treated as run-fatal
    /// by `run`.
    async fn run_loop(&self, seed: &PageRecord, run_id: i64) -> Result<u32, CrawlError> {
        {
            let mut store = self.store.lock().unwrap();
            store.mark_processing(seed.id)?;
        }

        let base_domain = seed.domain.clone();
        let path_prefix = if self.options.restrict_to_path {
            self.options.base_path.clone()
        } else {
            None
        };

        // The frontier and visited set live here and nowhere else; a crash
        // loses only in-flight run state, never the page store
        let mut state = RunState::new(&seed.url);

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Crawl run {} cancelled", run_id);
                break;
            }

            let (url, depth) = match state.frontier.pop_front() {
                Some(item) => item,
                None => break,
            };

            // Once the page budget is exhausted, stop the run entirely
            if let Some(max_pages) = self.options.max_pages {
                if state.pages_crawled >= max_pages {
                    tracing::info!("Reached max_pages limit: {}", max_pages);
                    break;
                }
            }

            // Too-deep items are skipped, not run-ending: shallower items
            // may still be queued behind them
            if let Some(max_depth) = self.options.max_depth {
                if depth > max_depth {
                    tracing::debug!("Skipping {}: exceeds max_depth {}", url, max_depth);
                    continue;
                }
            }

            // Load the page record; queue/store inconsistency skips the
            // item rather than crashing the run
            let page = {
                let mut store = self.store.lock().unwrap();
                match store.get_page_by_url(&url) {
                    Ok(Some(page)) => {
                        if let Err(e) = store.mark_processing(page.id) {
                            tracing::error!("Storage error updating {}: {}", url, e);
                            continue;
                        }
                        page
                    }
                    Ok(None) => {
                        tracing::error!(
                            "Store inconsistency: {} not found during processing, skipping",
                            url
                        );
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Storage error loading {}: {}", url, e);
                        continue;
                    }
                }
            };

            self.observer.on_event(CrawlEvent::PageStarted {
                url: url.clone(),
                depth,
            });

            // Fetch; any failure (including non-HTML) fails the page and
            // moves on without counting it against the page budget
            let fetched = match fetch_page(&self.client, &url).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    let reason = e.to_string();
                    {
                        let mut store = self.store.lock().unwrap();
                        store.mark_failed(page.id, &reason)?;
                    }
                    self.observer.on_event(CrawlEvent::PageFailed {
                        url: url.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let extracted = extract_page(&fetched.body);

            {
                let mut store = self.store.lock().unwrap();
                store.mark_completed(page.id, &extracted.title, &extracted.summary, &fetched.body)?;
            }
            self.observer
                .on_event(CrawlEvent::PageCompleted { url: url.clone() });
            state.pages_crawled += 1;

            // Expand links from the completed page
            match Url::parse(&url) {
                Ok(current_url) => {
                    let links = filter_links(
                        extracted.hrefs.iter(),
                        &base_domain,
                        &current_url,
                        path_prefix.as_deref(),
                    );
                    self.enqueue_links(links, depth, run_id, &base_domain, &mut state);
                }
                Err(e) => {
                    tracing::warn!("Could not re-parse {} for link resolution: {}", url, e);
                }
            }

            // Politeness pause, cut short if the run is cancelled
            tokio::select! {
                _ = tokio::time::sleep(self.options.politeness_delay) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        Ok(state.pages_crawled)
    }

    /// Applies the per-link checks and queues the survivors
    ///
    /// A storage error for one candidate drops that candidate only.
    fn enqueue_links(
        &self,
        links: Vec<String>,
        depth: u32,
        run_id: i64,
        base_domain: &str,
        state: &mut RunState,
    ) {
        for link in links {
            if state.visited.contains(&link) {
                continue;
            }

            let next_depth = depth + 1;
            if let Some(max_depth) = self.options.max_depth {
                if next_depth > max_depth {
                    tracing::debug!("Not queueing {}: exceeds max_depth {}", link, max_depth);
                    continue;
                }
            }

            // Reserve-before-commit: queued-but-unprocessed items count
            // against the page budget so the run never overbooks it
            if let Some(max_pages) = self.options.max_pages {
                if state.pages_crawled + state.frontier.len() as u32 + 1 > max_pages {
                    tracing::debug!("Not queueing {}: max_pages budget reserved", link);
                    continue;
                }
            }

            let queued = {
                let mut store = self.store.lock().unwrap();
                match store.get_or_create_page(&link, base_domain, run_id) {
                    Ok((page, created)) => {
                        // A page left terminal by an earlier run re-enters
                        // this run's frontier from a clean slate
                        if !created && page.status != PageStatus::Pending {
                            match store.reset_to_pending(page.id, run_id) {
                                Ok(()) => true,
                                Err(e) => {
                                    tracing::error!("Storage error resetting {}: {}", link, e);
                                    false
                                }
                            }
                        } else {
                            true
                        }
                    }
                    Err(e) => {
                        tracing::error!("Storage error recording link {}: {}", link, e);
                        false
                    }
                }
            };
            if !queued {
                continue;
            }

            state.visited.insert(link.clone());
            self.observer.on_event(CrawlEvent::LinkQueued {
                url: link.clone(),
                depth: next_depth,
            });
            state.frontier.push_back((link, next_depth));
        }
    }
}

/// In-memory state owned by a single crawl run
///
/// Created when the run starts and discarded when it returns; nothing in
/// here is persisted or shared between runs.
struct RunState {
    frontier: VecDeque<(String, u32)>,
    visited: HashSet<String>,
    pages_crawled: u32,
}

impl RunState {
    fn new(seed_url: &str) -> Self {
        let mut frontier = VecDeque::new();
        frontier.push_back((seed_url.to_string(), 0));
        let mut visited = HashSet::new();
        visited.insert(seed_url.to_string());
        Self {
            frontier,
            visited,
            pages_crawled: 0,
        }
    }
}

/// Spawns a crawl run on the tokio runtime
///
/// Returns immediately; the run proceeds in the background and its outcome
/// is observable through the page store, the observer, or the handle.
pub fn start_crawl<S>(
    store: Arc<Mutex<S>>,
    client: Client,
    options: CrawlOptions,
    observer: Arc<dyn CrawlObserver>,
    seed_page_id: i64,
    run_id: i64,
) -> CrawlHandle
where
    S: PageStore + Send + 'static,
{
    let cancel = CancellationToken::new();
    let engine = CrawlEngine::new(store, client, options, observer, cancel.clone());

    let task = tokio::spawn(async move {
        engine.run(seed_page_id, run_id).await;
    });

    CrawlHandle {
        run_id,
        cancel,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, UserAgentConfig};
    use crate::crawler::fetcher::build_http_client;
    use crate::crawler::observer::CollectingObserver;
    use crate::storage::SqliteStorage;

    fn test_client() -> Client {
        let user_agent = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        let crawler = CrawlerConfig {
            request_timeout_secs: 5,
            politeness_delay_ms: 5,
        };
        build_http_client(&user_agent, &crawler).unwrap()
    }

    fn fast_options() -> CrawlOptions {
        CrawlOptions {
            politeness_delay: Duration::from_millis(5),
            ..CrawlOptions::default()
        }
    }

    fn engine_fixture(
        options: CrawlOptions,
    ) -> (
        Arc<Mutex<SqliteStorage>>,
        Arc<CollectingObserver>,
        CrawlEngine<SqliteStorage>,
        CancellationToken,
    ) {
        let store = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let observer = Arc::new(CollectingObserver::new());
        let cancel = CancellationToken::new();
        let engine = CrawlEngine::new(
            Arc::clone(&store),
            test_client(),
            options,
            observer.clone() as Arc<dyn CrawlObserver>,
            cancel.clone(),
        );
        (store, observer, engine, cancel)
    }

    #[test]
    fn test_default_options() {
        let options = CrawlOptions::default();
        assert_eq!(options.max_pages, None);
        assert_eq!(options.max_depth, None);
        assert!(!options.restrict_to_path);
        assert_eq!(options.politeness_delay, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_missing_seed_aborts_without_page_side_effects() {
        let (store, observer, engine, _cancel) = engine_fixture(fast_options());
        let run_id = {
            let mut store = store.lock().unwrap();
            store.create_run("https://x.test/", "hash").unwrap()
        };

        engine.run(999, run_id).await;

        {
            let store = store.lock().unwrap();
            assert_eq!(store.count_total_pages().unwrap(), 0);
            assert_eq!(
                store.get_run(run_id).unwrap().status,
                crate::storage::RunStatus::Failed
            );
        }
        // No run events: the engine never got past initialization
        assert!(observer.events().is_empty());
    }

    #[tokio::test]
    async fn test_seed_without_domain_fails() {
        let (store, observer, engine, _cancel) = engine_fixture(fast_options());
        let (run_id, seed_id) = {
            let mut store = store.lock().unwrap();
            let run_id = store.create_run("https://x.test/", "hash").unwrap();
            let (seed, _) = store
                .get_or_create_page("https://x.test/", "", run_id)
                .unwrap();
            (run_id, seed.id)
        };

        engine.run(seed_id, run_id).await;

        {
            let store = store.lock().unwrap();
            let seed = store.get_page(seed_id).unwrap();
            assert_eq!(seed.status, PageStatus::Failed);
            assert_eq!(seed.error_message.as_deref(), Some("Missing domain information"));
        }
        assert!(matches!(
            observer.events().as_slice(),
            [CrawlEvent::RunAborted { .. }]
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_completes_seed_without_fetching() {
        let (store, observer, engine, cancel) = engine_fixture(fast_options());
        let (run_id, seed_id) = {
            let mut store = store.lock().unwrap();
            let run_id = store.create_run("https://x.test/", "hash").unwrap();
            let (seed, _) = store
                .get_or_create_page("https://x.test/", "x.test", run_id)
                .unwrap();
            (run_id, seed.id)
        };

        cancel.cancel();
        engine.run(seed_id, run_id).await;

        {
            let store = store.lock().unwrap();
            // The loop never ran: the seed went Processing and was closed
            // out by the forced-completion fallback
            let seed = store.get_page(seed_id).unwrap();
            assert_eq!(seed.status, PageStatus::Completed);
            assert!(seed.html_content.is_none());
        }

        let events = observer.events();
        assert!(matches!(
            events.last(),
            Some(CrawlEvent::RunFinished {
                pages_crawled: 0,
                ..
            })
        ));
    }
}
