//! In-memory post list with load state and "load more" paging.
//!
//! All list state lives in one `watch` channel. Every transition goes through
//! it, so subscribers observe updates in the order they were made and two
//! callers can never both move the list into `Loading`.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::constants::LOAD_MORE_THRESHOLD;
use crate::feed::{LoadError, PostPager};
use crate::model::PostRecord;

/// Where the list is in its load cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Loaded,
    Failed(LoadError),
}

/// Point-in-time view of the list.
#[derive(Debug, Clone)]
pub struct ListSnapshot {
    pub phase: LoadPhase,
    pub posts: Arc<Vec<PostRecord>>,
    /// Last page successfully loaded; 0 before the first load.
    pub page: u32,
    /// Declared size of the whole feed as of the last successful load.
    pub total: u64,
    /// Set when a load-more page added nothing, so the declared total
    /// overstates what the source holds. Cleared by a fresh fetch.
    pub exhausted: bool,
}

impl ListSnapshot {
    fn empty() -> Self {
        Self {
            phase: LoadPhase::Idle,
            posts: Arc::new(Vec::new()),
            page: 0,
            total: 0,
            exhausted: false,
        }
    }

    /// Whether the source declares more posts than are loaded and has not
    /// yet come back empty.
    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.exhausted && (self.posts.len() as u64) < self.total
    }

    /// Whether `post_id` is close enough to the end of the list to load more.
    #[must_use]
    pub fn is_near_end(&self, post_id: &str) -> bool {
        self.posts
            .iter()
            .position(|p| p.id() == post_id)
            .is_some_and(|index| index + LOAD_MORE_THRESHOLD >= self.posts.len())
    }
}

/// Result of asking the controller to load.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum FetchOutcome {
    /// A page arrived; `received` records were in it.
    Loaded { received: usize },
    /// The load failed; previously loaded posts are kept.
    Failed(LoadError),
    /// Another load was already in flight, so no request was made.
    Coalesced,
}

/// Owns the list of posts shown to the presentation layer.
pub struct PostListController {
    pager: Arc<dyn PostPager>,
    state: watch::Sender<ListSnapshot>,
}

impl std::fmt::Debug for PostListController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostListController")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl PostListController {
    #[must_use]
    pub fn new(pager: Arc<dyn PostPager>) -> Self {
        let (state, _) = watch::channel(ListSnapshot::empty());
        Self { pager, state }
    }

    /// Receive every state change in order.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ListSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ListSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        self.state.borrow().phase.clone()
    }

    #[must_use]
    pub fn posts(&self) -> Arc<Vec<PostRecord>> {
        Arc::clone(&self.state.borrow().posts)
    }

    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.state.borrow().page
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.state.borrow().has_more()
    }

    /// Find a loaded post by id.
    #[must_use]
    pub fn post(&self, id: &str) -> Option<PostRecord> {
        self.state.borrow().posts.iter().find(|p| p.id() == id).cloned()
    }

    /// Load the first page, replacing the list on success.
    ///
    /// On failure the list moves to `Failed` and keeps whatever was loaded
    /// before. Returns [`FetchOutcome::Coalesced`] without loading if another
    /// load is in flight.
    pub async fn fetch_posts(&self) -> FetchOutcome {
        let guard = match self.begin_loading(|_| Some(1)) {
            Begin::Started(guard, _) => guard,
            Begin::Busy | Begin::Skipped => {
                debug!("Load already in flight, coalescing fetch");
                return FetchOutcome::Coalesced;
            }
        };

        match self.pager.fetch_page(1).await {
            Ok(page) => {
                let received = page.records.len();
                let total = page.total;
                guard.finish(|s| {
                    s.posts = Arc::new(page.records);
                    s.page = 1;
                    s.total = total;
                    s.exhausted = false;
                    s.phase = LoadPhase::Loaded;
                });
                info!(posts = received, total, "Posts loaded");
                FetchOutcome::Loaded { received }
            }
            Err(e) => {
                warn!("Failed to load posts: {e}");
                guard.finish(|s| s.phase = LoadPhase::Failed(e.clone()));
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Load the next page if `after_post_id` is among the last
    /// [`LOAD_MORE_THRESHOLD`] loaded posts and the source has more.
    ///
    /// This is stricter than triggering on any of the last two items: a list
    /// that already holds the declared total never requests another page.
    ///
    /// Returns `None` when no load was triggered. New posts are appended;
    /// ids already in the list are skipped. The page counter only advances
    /// on success. A page that adds no new posts ends paging until the next
    /// [`fetch_posts`](Self::fetch_posts).
    pub async fn load_more_posts_if_needed(&self, after_post_id: &str) -> Option<FetchOutcome> {
        let gate = |s: &ListSnapshot| {
            (s.is_near_end(after_post_id) && s.has_more()).then(|| s.page.saturating_add(1))
        };
        let (guard, next_page) = match self.begin_loading(gate) {
            Begin::Started(guard, next_page) => (guard, next_page),
            Begin::Busy => {
                debug!("Load already in flight, coalescing load more");
                return Some(FetchOutcome::Coalesced);
            }
            Begin::Skipped => return None,
        };

        debug!(page = next_page, after = %after_post_id, "Loading more posts");
        match self.pager.fetch_page(next_page).await {
            Ok(page) => {
                let received = page.records.len();
                let total = page.total;
                let mut exhausted = false;
                guard.finish(|s| {
                    let known: HashSet<&str> = s.posts.iter().map(PostRecord::id).collect();
                    let fresh: Vec<PostRecord> = page
                        .records
                        .into_iter()
                        .filter(|p| !known.contains(p.id()))
                        .collect();
                    exhausted = fresh.is_empty();
                    let mut posts = Vec::with_capacity(s.posts.len() + fresh.len());
                    posts.extend(s.posts.iter().cloned());
                    posts.extend(fresh);

                    s.posts = Arc::new(posts);
                    s.page = next_page;
                    s.total = total;
                    s.exhausted = exhausted;
                    s.phase = LoadPhase::Loaded;
                });
                if exhausted {
                    debug!(page = next_page, total, "Page added no posts, paging stopped");
                }
                info!(page = next_page, received, total, "More posts loaded");
                Some(FetchOutcome::Loaded { received })
            }
            Err(e) => {
                warn!(page = next_page, "Failed to load more posts: {e}");
                guard.finish(|s| s.phase = LoadPhase::Failed(e.clone()));
                Some(FetchOutcome::Failed(e))
            }
        }
    }

    /// Move to `Loading` if `next_page` picks a page and no load is running.
    ///
    /// The check and the transition happen under the channel's lock.
    fn begin_loading(
        &self,
        next_page: impl FnOnce(&ListSnapshot) -> Option<u32>,
    ) -> Begin<'_> {
        let mut started = None;
        let mut busy = false;
        self.state.send_if_modified(|s| {
            let Some(page) = next_page(s) else {
                return false;
            };
            if s.phase == LoadPhase::Loading {
                busy = true;
                return false;
            }
            started = Some((std::mem::replace(&mut s.phase, LoadPhase::Loading), page));
            true
        });

        match started {
            Some((previous, page)) => Begin::Started(
                LoadingGuard {
                    state: &self.state,
                    previous,
                    armed: true,
                },
                page,
            ),
            None if busy => Begin::Busy,
            None => Begin::Skipped,
        }
    }
}

enum Begin<'a> {
    Started(LoadingGuard<'a>, u32),
    Busy,
    Skipped,
}

/// Restores the previous phase if a load is dropped before it finishes.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<ListSnapshot>,
    previous: LoadPhase,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn finish(mut self, apply: impl FnOnce(&mut ListSnapshot)) {
        self.armed = false;
        self.state.send_modify(apply);
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let previous = std::mem::replace(&mut self.previous, LoadPhase::Idle);
            self.state.send_modify(|s| s.phase = previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeedPage, NewPostRecord};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn post(id: usize) -> PostRecord {
        PostRecord::new(NewPostRecord {
            id: id.to_string(),
            title: format!("Post {id}"),
            author: None,
            excerpt: "E".to_string(),
            publish_time: Utc::now(),
            labels: vec![],
            comment_count: 0,
            cover: None,
            html_content: None,
        })
    }

    /// Serves ids 1..=total in pages of `page_size`, declaring `declared`.
    struct MockPager {
        total: usize,
        declared: u64,
        page_size: usize,
        fail: AtomicBool,
        calls: AtomicUsize,
        requested: Mutex<Vec<u32>>,
    }

    impl MockPager {
        fn new(total: usize, page_size: usize) -> Arc<Self> {
            Self::with_declared(total, total as u64, page_size)
        }

        fn with_declared(total: usize, declared: u64, page_size: usize) -> Arc<Self> {
            Arc::new(Self {
                total,
                declared,
                page_size,
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostPager for MockPager {
        async fn fetch_page(&self, page: u32) -> Result<FeedPage, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(page);
            if self.fail.load(Ordering::SeqCst) {
                return Err(LoadError::SourceNotFound {
                    location: "mock".to_string(),
                });
            }
            let start = crate::feed::page_offset(page, self.page_size) + 1;
            let end = (start + self.page_size - 1).min(self.total);
            let records = (start..=end).map(post).collect();
            Ok(FeedPage::new(records, self.declared))
        }
    }

    /// Blocks every fetch until released. Page N holds ids 2N-1 and 2N.
    struct GatedPager {
        release: Notify,
        calls: AtomicUsize,
        total: u64,
    }

    fn gated(total: u64) -> Arc<GatedPager> {
        Arc::new(GatedPager {
            release: Notify::new(),
            calls: AtomicUsize::new(0),
            total,
        })
    }

    #[async_trait]
    impl PostPager for GatedPager {
        async fn fetch_page(&self, page: u32) -> Result<FeedPage, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            let first = page.max(1) as usize * 2 - 1;
            Ok(FeedPage::new(vec![post(first), post(first + 1)], self.total))
        }
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let controller = PostListController::new(MockPager::new(5, 5));
        assert_eq!(controller.phase(), LoadPhase::Idle);
        assert!(controller.posts().is_empty());
        assert_eq!(controller.current_page(), 0);
    }

    #[tokio::test]
    async fn test_fetch_posts_loads_first_page() {
        let pager = MockPager::new(25, 10);
        let controller = PostListController::new(pager.clone());

        let outcome = controller.fetch_posts().await;
        assert_eq!(outcome, FetchOutcome::Loaded { received: 10 });
        assert_eq!(controller.phase(), LoadPhase::Loaded);
        assert_eq!(controller.posts().len(), 10);
        assert_eq!(controller.current_page(), 1);
        assert!(controller.has_more());
        assert_eq!(*pager.requested.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_posts() {
        let pager = MockPager::new(10, 10);
        let controller = PostListController::new(pager.clone());
        let _ = controller.fetch_posts().await;
        let before = controller.posts();

        pager.fail.store(true, Ordering::SeqCst);
        let outcome = controller.fetch_posts().await;

        let expected = LoadError::SourceNotFound {
            location: "mock".to_string(),
        };
        assert_eq!(outcome, FetchOutcome::Failed(expected.clone()));
        assert_eq!(controller.phase(), LoadPhase::Failed(expected));
        assert_eq!(*controller.posts(), *before);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_is_failed_and_empty() {
        let pager = MockPager::new(10, 10);
        pager.fail.store(true, Ordering::SeqCst);
        let controller = PostListController::new(pager);

        let _ = controller.fetch_posts().await;
        assert!(matches!(controller.phase(), LoadPhase::Failed(_)));
        assert!(controller.posts().is_empty());
    }

    #[tokio::test]
    async fn test_load_more_near_end_triggers_one_fetch() {
        let pager = MockPager::new(20, 10);
        let controller = PostListController::new(pager.clone());
        let _ = controller.fetch_posts().await;
        assert_eq!(pager.calls(), 1);

        let second_to_last = controller.posts()[8].id().to_string();
        let outcome = controller.load_more_posts_if_needed(&second_to_last).await;

        assert_eq!(outcome, Some(FetchOutcome::Loaded { received: 10 }));
        assert_eq!(pager.calls(), 2);
        assert_eq!(*pager.requested.lock().unwrap(), vec![1, 2]);
        assert_eq!(controller.posts().len(), 20);
        assert_eq!(controller.posts()[10].id(), "11");
        assert_eq!(controller.current_page(), 2);
    }

    #[tokio::test]
    async fn test_load_more_from_first_post_does_nothing() {
        let pager = MockPager::new(20, 10);
        let controller = PostListController::new(pager.clone());
        let _ = controller.fetch_posts().await;

        let first = controller.posts()[0].id().to_string();
        assert_eq!(controller.load_more_posts_if_needed(&first).await, None);
        assert_eq!(controller.load_more_posts_if_needed("unknown").await, None);
        assert_eq!(pager.calls(), 1);
        assert_eq!(controller.current_page(), 1);
    }

    #[tokio::test]
    async fn test_load_more_threshold_is_last_two() {
        let controller = PostListController::new(MockPager::new(20, 10));
        let _ = controller.fetch_posts().await;
        let snapshot = controller.snapshot();

        assert!(!snapshot.is_near_end("8"));
        assert!(snapshot.is_near_end("9"));
        assert!(snapshot.is_near_end("10"));
    }

    #[tokio::test]
    async fn test_load_more_stops_when_everything_loaded() {
        let pager = MockPager::new(10, 10);
        let controller = PostListController::new(pager.clone());
        let _ = controller.fetch_posts().await;

        assert_eq!(controller.load_more_posts_if_needed("10").await, None);
        assert_eq!(pager.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_more_keeps_page_and_posts() {
        let pager = MockPager::new(20, 10);
        let controller = PostListController::new(pager.clone());
        let _ = controller.fetch_posts().await;

        pager.fail.store(true, Ordering::SeqCst);
        let outcome = controller.load_more_posts_if_needed("10").await;

        assert!(matches!(outcome, Some(FetchOutcome::Failed(_))));
        assert_eq!(controller.current_page(), 1);
        assert_eq!(controller.posts().len(), 10);

        pager.fail.store(false, Ordering::SeqCst);
        let retry = controller.load_more_posts_if_needed("10").await;
        assert_eq!(retry, Some(FetchOutcome::Loaded { received: 10 }));
        assert_eq!(*pager.requested.lock().unwrap(), vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_coalesced() {
        let pager = gated(2);
        let controller = Arc::new(PostListController::new(pager.clone()));
        let mut updates = controller.subscribe();

        let background = Arc::clone(&controller);
        let first = tokio::spawn(async move { background.fetch_posts().await });

        updates
            .wait_for(|s| s.phase == LoadPhase::Loading)
            .await
            .unwrap();
        assert_eq!(controller.fetch_posts().await, FetchOutcome::Coalesced);

        pager.release.notify_one();
        assert_eq!(first.await.unwrap(), FetchOutcome::Loaded { received: 2 });
        assert_eq!(pager.calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.phase(), LoadPhase::Loaded);
    }

    #[tokio::test]
    async fn test_dropped_load_restores_previous_phase() {
        let controller = Arc::new(PostListController::new(gated(2)));
        let mut updates = controller.subscribe();

        let background = Arc::clone(&controller);
        let task = tokio::spawn(async move { background.fetch_posts().await });
        updates
            .wait_for(|s| s.phase == LoadPhase::Loading)
            .await
            .unwrap();

        task.abort();
        updates
            .wait_for(|s| s.phase == LoadPhase::Idle)
            .await
            .unwrap();
        assert!(controller.posts().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_load_more_is_coalesced() {
        let pager = gated(6);
        let controller = Arc::new(PostListController::new(pager.clone()));
        let mut updates = controller.subscribe();

        pager.release.notify_one();
        assert_eq!(
            controller.fetch_posts().await,
            FetchOutcome::Loaded { received: 2 }
        );

        let background = Arc::clone(&controller);
        let first = tokio::spawn(async move { background.load_more_posts_if_needed("2").await });
        updates
            .wait_for(|s| s.phase == LoadPhase::Loading)
            .await
            .unwrap();

        assert_eq!(
            controller.load_more_posts_if_needed("2").await,
            Some(FetchOutcome::Coalesced)
        );

        pager.release.notify_one();
        assert_eq!(
            first.await.unwrap(),
            Some(FetchOutcome::Loaded { received: 2 })
        );
        assert_eq!(pager.calls.load(Ordering::SeqCst), 2);
        assert_eq!(controller.posts().len(), 4);
        assert_eq!(controller.current_page(), 2);
    }

    #[tokio::test]
    async fn test_overstated_total_stops_after_empty_page() {
        let pager = MockPager::with_declared(3, 50, 2);
        let controller = PostListController::new(pager.clone());
        let _ = controller.fetch_posts().await;

        assert_eq!(
            controller.load_more_posts_if_needed("2").await,
            Some(FetchOutcome::Loaded { received: 1 })
        );
        assert_eq!(controller.posts().len(), 3);
        assert!(controller.has_more());

        assert_eq!(
            controller.load_more_posts_if_needed("3").await,
            Some(FetchOutcome::Loaded { received: 0 })
        );
        assert!(!controller.has_more());
        assert_eq!(controller.current_page(), 3);

        for _ in 0..3 {
            assert_eq!(controller.load_more_posts_if_needed("3").await, None);
        }
        assert_eq!(*pager.requested.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(controller.current_page(), 3);

        // A fresh fetch starts paging again.
        let _ = controller.fetch_posts().await;
        assert!(controller.has_more());
        assert_eq!(controller.current_page(), 1);
    }
}
