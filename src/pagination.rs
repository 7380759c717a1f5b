use std::collections::HashSet;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::tmdb::{MediaGateway, MediaItem, MediaType, PageRequest, ResultPage};

// --- Accumulator ---

/// Running, order-preserving merge of result pages.
///
/// Identifiers are deduplicated per media type; the first-seen copy wins.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
  items: Vec<MediaItem>,
  seen: HashSet<(MediaType, u64)>,
  page: u32,
  has_more: bool,
  total_results: u64,
}

impl ResultAccumulator {
  pub fn items(&self) -> &[MediaItem] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn has_more(&self) -> bool {
    self.has_more
  }

  pub fn total_results(&self) -> u64 {
    self.total_results
  }

  pub fn clear(&mut self) {
    *self = Self::default();
  }

  /// Replace everything with a first page.
  pub fn replace(&mut self, page: ResultPage) -> usize {
    self.clear();
    self.merge(page)
  }

  /// Append a subsequent page, skipping identifiers already present.
  /// Returns how many new items were added.
  pub fn merge(&mut self, page: ResultPage) -> usize {
    let before = self.items.len();
    for item in page.items {
      if self.seen.insert(item.key()) {
        self.items.push(item);
      }
    }
    self.page += 1;
    self.has_more = self.page < page.total_pages;
    self.total_results = page.total_results;
    self.items.len() - before
  }
}

// --- Controller ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
  Idle,
  Loading,
  Loaded,
  Error(String),
}

/// Result of applying a completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
  FirstPage { added: usize },
  NextPage { page: u32, added: usize },
  Failed { first_page: bool, error: FetchError },
}

struct FetchOutcome {
  generation: u64,
  first_page: bool,
  result: Result<ResultPage, FetchError>,
}

/// Owns one accumulator and guarantees at most one page fetch in flight for it.
pub struct PaginationController<G> {
  gateway: G,
  criteria: Option<PageRequest>,
  accumulator: ResultAccumulator,
  state: LoadState,
  featured: Option<MediaItem>,
  /// Bumped whenever the criteria change; outcomes from older generations are dropped.
  generation: u64,
  pending: Option<oneshot::Receiver<FetchOutcome>>,
  last_failed_first: bool,
}

impl<G: MediaGateway> PaginationController<G> {
  pub fn new(gateway: G) -> Self {
    Self {
      gateway,
      criteria: None,
      accumulator: ResultAccumulator::default(),
      state: LoadState::Idle,
      featured: None,
      generation: 0,
      pending: None,
      last_failed_first: false,
    }
  }

  pub fn state(&self) -> &LoadState {
    &self.state
  }

  pub fn items(&self) -> &[MediaItem] {
    self.accumulator.items()
  }

  pub fn accumulator(&self) -> &ResultAccumulator {
    &self.accumulator
  }

  pub fn criteria(&self) -> Option<&PageRequest> {
    self.criteria.as_ref()
  }

  /// Hero banner candidate picked from the first page.
  pub fn featured(&self) -> Option<&MediaItem> {
    self.featured.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.state == LoadState::Loading
  }

  pub fn can_load_more(&self) -> bool {
    !self.is_loading() && self.criteria.is_some() && self.accumulator.has_more()
  }

  /// Drop all results and forget the criteria. Any in-flight fetch becomes stale.
  pub fn reset(&mut self) {
    self.generation += 1;
    self.pending = None;
    self.criteria = None;
    self.accumulator.clear();
    self.state = LoadState::Idle;
    self.last_failed_first = false;
  }

  /// Start over with new criteria and request page 1.
  pub fn load_first_page(&mut self, criteria: PageRequest) {
    self.reset();
    info!(media = criteria.media_type.path(), listing = ?criteria.listing, "pagination: loading first page");
    let request = criteria.with_page(1);
    self.criteria = Some(criteria);
    self.spawn_fetch(request, true);
  }

  /// Request the page after the last merged one.
  ///
  /// Returns `false` without doing anything if a fetch is already in flight
  /// or there is nothing more to load.
  pub fn load_next_page(&mut self) -> bool {
    if !self.can_load_more() {
      return false;
    }
    let Some(criteria) = self.criteria.as_ref() else { return false };
    let request = criteria.with_page(self.accumulator.page() + 1);
    debug!(page = request.page, "pagination: loading next page");
    self.spawn_fetch(request, false);
    true
  }

  /// Re-issue whichever load failed last.
  pub fn retry(&mut self) -> bool {
    if !matches!(self.state, LoadState::Error(_)) {
      return false;
    }
    let Some(criteria) = self.criteria.clone() else { return false };
    if self.last_failed_first || self.accumulator.is_empty() {
      self.load_first_page(criteria);
      true
    } else {
      self.state = LoadState::Loaded;
      self.load_next_page()
    }
  }

  /// Show a locally held list (no network, nothing more to load).
  pub fn load_local(&mut self, items: Vec<MediaItem>) {
    self.reset();
    let total = items.len() as u64;
    self.accumulator.replace(ResultPage { items, page: 1, total_pages: 1, total_results: total });
    self.featured = self.accumulator.items().first().cloned();
    self.state = LoadState::Loaded;
  }

  fn spawn_fetch(&mut self, request: PageRequest, first_page: bool) {
    self.state = LoadState::Loading;
    let generation = self.generation;
    let gateway = self.gateway.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = gateway.fetch(request).await;
      let _ = tx.send(FetchOutcome { generation, first_page, result });
    });
    self.pending = Some(rx);
  }

  /// Check for a completed fetch and merge it. Call once per UI tick.
  pub fn poll(&mut self) -> Option<PageEvent> {
    let mut rx = self.pending.take()?;
    match rx.try_recv() {
      Ok(outcome) => self.apply(outcome),
      Err(oneshot::error::TryRecvError::Empty) => {
        self.pending = Some(rx);
        None
      }
      Err(oneshot::error::TryRecvError::Closed) => {
        let first_page = self.accumulator.is_empty();
        let error = FetchError::Network("fetch task ended unexpectedly".to_string());
        Some(self.fail(first_page, error))
      }
    }
  }

  fn apply(&mut self, outcome: FetchOutcome) -> Option<PageEvent> {
    if outcome.generation != self.generation {
      debug!(stale = outcome.generation, current = self.generation, "pagination: dropping stale response");
      return None;
    }
    match outcome.result {
      Ok(page) if outcome.first_page => {
        let added = self.accumulator.replace(page);
        self.featured = self
          .accumulator
          .items()
          .iter()
          .find(|i| i.backdrop_path.is_some())
          .or(self.accumulator.items().first())
          .cloned();
        self.state = LoadState::Loaded;
        info!(added, has_more = self.accumulator.has_more(), "pagination: first page loaded");
        Some(PageEvent::FirstPage { added })
      }
      Ok(page) => {
        let added = self.accumulator.merge(page);
        self.state = LoadState::Loaded;
        let page = self.accumulator.page();
        info!(page, added, total = self.accumulator.len(), "pagination: merged page");
        Some(PageEvent::NextPage { page, added })
      }
      Err(error) => Some(self.fail(outcome.first_page, error)),
    }
  }

  fn fail(&mut self, first_page: bool, error: FetchError) -> PageEvent {
    warn!(first_page, err = %error, "pagination: fetch failed");
    if first_page {
      self.featured = None;
    }
    self.last_failed_first = first_page;
    self.state = LoadState::Error(error.user_message());
    PageEvent::Failed { first_page, error }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FakeGateway, item, next_page_event, page};

  fn trending() -> PageRequest {
    PageRequest::category(MediaType::Movie, "trending", "en-US")
  }

  fn titles<G: MediaGateway>(ctl: &PaginationController<G>) -> Vec<String> {
    ctl.items().iter().map(|i| i.title.clone()).collect()
  }

  // --- ResultAccumulator ---

  #[test]
  fn merge_dedupes_keeping_first_copy() {
    let mut acc = ResultAccumulator::default();
    acc.replace(page(&[(1, "A"), (2, "B")], 1, 5));
    let mut dup = item(2, "B (updated)");
    dup.overview = Some("changed".to_string());
    let added = acc.merge(ResultPage { items: vec![dup, item(3, "C")], page: 2, total_pages: 5, total_results: 100 });
    assert_eq!(added, 1);
    let titles: Vec<&str> = acc.items().iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "B", "C"]);
    assert_eq!(acc.items()[1].overview, None);
    assert_eq!(acc.page(), 2);
  }

  #[test]
  fn same_id_in_other_media_type_is_kept() {
    let mut acc = ResultAccumulator::default();
    acc.replace(page(&[(1, "Movie")], 1, 2));
    let mut show = item(1, "Show");
    show.media_type = MediaType::Tv;
    acc.merge(ResultPage { items: vec![show], page: 2, total_pages: 2, total_results: 2 });
    assert_eq!(acc.len(), 2);
    assert!(!acc.has_more());
  }

  #[test]
  fn has_more_tracks_total_pages() {
    let mut acc = ResultAccumulator::default();
    acc.replace(page(&[(1, "A")], 1, 1));
    assert!(!acc.has_more());
    acc.replace(page(&[(1, "A")], 1, 2));
    assert!(acc.has_more());
  }

  // --- PaginationController ---

  #[tokio::test]
  async fn first_page_populates_accumulator() {
    let gateway = FakeGateway::default();
    gateway.push(Ok(ResultPage { total_results: 100, ..page(&[(1, "A"), (2, "B")], 1, 5) }));
    let mut ctl = PaginationController::new(gateway.clone());

    ctl.load_first_page(trending());
    assert!(ctl.is_loading());
    assert_eq!(next_page_event(&mut ctl).await, PageEvent::FirstPage { added: 2 });

    assert_eq!(titles(&ctl), vec!["A", "B"]);
    assert!(ctl.accumulator().has_more());
    assert_eq!(ctl.accumulator().page(), 1);
    assert_eq!(ctl.accumulator().total_results(), 100);
    assert_eq!(ctl.state(), &LoadState::Loaded);
    assert_eq!(gateway.requests()[0].page, 1);
  }

  #[tokio::test]
  async fn next_page_merges_and_dedupes() {
    let gateway = FakeGateway::default();
    gateway.push(Ok(page(&[(1, "A"), (2, "B")], 1, 5)));
    gateway.push(Ok(page(&[(2, "B"), (3, "C")], 2, 5)));
    let mut ctl = PaginationController::new(gateway.clone());

    ctl.load_first_page(trending());
    next_page_event(&mut ctl).await;
    assert!(ctl.load_next_page());
    assert_eq!(next_page_event(&mut ctl).await, PageEvent::NextPage { page: 2, added: 1 });

    assert_eq!(titles(&ctl), vec!["A", "B", "C"]);
    assert_eq!(ctl.accumulator().page(), 2);
    assert_eq!(gateway.requests()[1].page, 2);
  }

  #[tokio::test]
  async fn rate_limit_preserves_loaded_items() {
    let gateway = FakeGateway::default();
    gateway.push(Ok(page(&[(1, "A"), (2, "B")], 1, 5)));
    gateway.push(Ok(page(&[(2, "B"), (3, "C")], 2, 5)));
    gateway.push(Err(FetchError::RateLimited));
    let mut ctl = PaginationController::new(gateway.clone());

    ctl.load_first_page(trending());
    next_page_event(&mut ctl).await;
    ctl.load_next_page();
    next_page_event(&mut ctl).await;
    ctl.load_next_page();
    let event = next_page_event(&mut ctl).await;

    assert_eq!(event, PageEvent::Failed { first_page: false, error: FetchError::RateLimited });
    assert_eq!(titles(&ctl), vec!["A", "B", "C"]);
    assert_eq!(ctl.accumulator().page(), 2);
    match ctl.state() {
      LoadState::Error(msg) => assert!(msg.contains("Try again later")),
      other => panic!("expected error state, got {:?}", other),
    }
    assert!(ctl.featured().is_some());
  }

  #[tokio::test]
  async fn only_one_fetch_in_flight() {
    let gateway = FakeGateway::gated();
    gateway.push(Ok(page(&[(1, "A")], 1, 10)));
    gateway.push(Ok(page(&[(2, "B")], 2, 10)));
    let mut ctl = PaginationController::new(gateway.clone());

    ctl.load_first_page(trending());
    assert!(!ctl.load_next_page());
    gateway.release(1);
    next_page_event(&mut ctl).await;

    assert!(ctl.load_next_page());
    for _ in 0..5 {
      assert!(!ctl.load_next_page());
      tokio::task::yield_now().await;
    }
    assert_eq!(gateway.requests().len(), 2);
    gateway.release(1);
    next_page_event(&mut ctl).await;

    assert_eq!(gateway.max_in_flight(), 1);
    assert_eq!(titles(&ctl), vec!["A", "B"]);
  }

  #[tokio::test]
  async fn no_next_page_when_exhausted() {
    let gateway = FakeGateway::default();
    gateway.push(Ok(page(&[(1, "A")], 1, 1)));
    let mut ctl = PaginationController::new(gateway.clone());
    ctl.load_first_page(trending());
    next_page_event(&mut ctl).await;
    assert!(!ctl.load_next_page());
    assert_eq!(gateway.requests().len(), 1);
  }

  #[tokio::test]
  async fn stale_first_page_is_discarded() {
    let gateway = FakeGateway::gated();
    gateway.push(Ok(page(&[(1, "Old")], 1, 1)));
    gateway.push(Ok(page(&[(2, "New")], 1, 1)));
    let mut ctl = PaginationController::new(gateway.clone());

    ctl.load_first_page(trending());
    tokio::task::yield_now().await;
    ctl.load_first_page(PageRequest::category(MediaType::Movie, "comedy", "en-US"));
    gateway.release(2);

    assert_eq!(next_page_event(&mut ctl).await, PageEvent::FirstPage { added: 1 });
    for _ in 0..10 {
      tokio::task::yield_now().await;
      assert!(ctl.poll().is_none());
    }
    assert_eq!(ctl.items().len(), 1);
    assert_eq!(ctl.criteria().map(|c| c.listing.clone()), Some(crate::tmdb::Listing::Category("comedy".into())));
  }

  #[test]
  fn outcome_from_old_generation_is_ignored() {
    let mut ctl = PaginationController::new(FakeGateway::default());
    ctl.reset();
    let outcome = FetchOutcome { generation: 0, first_page: true, result: Ok(page(&[(1, "A")], 1, 1)) };
    assert!(ctl.apply(outcome).is_none());
    assert!(ctl.items().is_empty());
  }

  #[tokio::test]
  async fn first_page_failure_clears_featured() {
    let gateway = FakeGateway::default();
    let mut first = page(&[(1, "A")], 1, 1);
    first.items[0].backdrop_path = Some("/a.jpg".to_string());
    gateway.push(Ok(first));
    gateway.push(Err(FetchError::Network("offline".to_string())));
    let mut ctl = PaginationController::new(gateway.clone());

    ctl.load_first_page(trending());
    next_page_event(&mut ctl).await;
    assert_eq!(ctl.featured().map(|i| i.id), Some(1));

    ctl.load_first_page(PageRequest::category(MediaType::Tv, "popular", "en-US"));
    let event = next_page_event(&mut ctl).await;
    assert!(matches!(event, PageEvent::Failed { first_page: true, .. }));
    assert!(ctl.featured().is_none());
  }

  #[tokio::test]
  async fn retry_reissues_failed_next_page() {
    let gateway = FakeGateway::default();
    gateway.push(Ok(page(&[(1, "A")], 1, 3)));
    gateway.push(Err(FetchError::RateLimited));
    gateway.push(Ok(page(&[(2, "B")], 2, 3)));
    let mut ctl = PaginationController::new(gateway.clone());

    ctl.load_first_page(trending());
    next_page_event(&mut ctl).await;
    ctl.load_next_page();
    next_page_event(&mut ctl).await;
    assert!(ctl.retry());
    next_page_event(&mut ctl).await;

    assert_eq!(titles(&ctl), vec!["A", "B"]);
    let pages: Vec<u32> = gateway.requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2, 2]);
  }

  #[test]
  fn local_lists_never_load_more() {
    let mut ctl = PaginationController::new(FakeGateway::default());
    ctl.load_local(vec![item(1, "A"), item(1, "A"), item(2, "B")]);
    assert_eq!(ctl.items().len(), 2);
    assert!(!ctl.can_load_more());
    assert_eq!(ctl.state(), &LoadState::Loaded);
  }
}
