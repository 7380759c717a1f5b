use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::error::FetchError;
use crate::pagination::{PageEvent, PaginationController};
use crate::tmdb::{MediaGateway, MediaItem, MediaType, PageRequest, ResultPage};

// --- Debouncer ---

/// Holds the latest value until no new value has arrived for `delay`.
///
/// Re-arming replaces both the value and the deadline.
#[derive(Debug)]
pub struct Debouncer<T> {
  delay: Duration,
  pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
  pub fn new(delay: Duration) -> Self {
    Self { delay, pending: None }
  }

  pub fn arm(&mut self, value: T, now: Instant) {
    self.pending = Some((value, now + self.delay));
  }

  pub fn cancel(&mut self) {
    self.pending = None;
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Take the value if its deadline has passed.
  pub fn take_ready(&mut self, now: Instant) -> Option<T> {
    let (_, deadline) = self.pending.as_ref()?;
    if now >= *deadline { self.pending.take().map(|(value, _)| value) } else { None }
  }
}

// --- Search Controller ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
  /// Query is empty; the caller should restore the browse view.
  Cleared,
  /// Too short to search; suggestions and results were cleared.
  TooShort,
  /// Both debounce timers were (re)armed.
  Armed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
  Suggestions(usize),
  Results(PageEvent),
  Failed(FetchError),
}

struct SuggestionOutcome {
  generation: u64,
  result: Result<ResultPage, FetchError>,
}

/// Debounced search-as-you-type.
///
/// A short timer drives the suggestion dropdown, a longer one the full result
/// list. Both share the current query and are re-armed on every keystroke.
pub struct SearchController<G> {
  gateway: G,
  media_type: MediaType,
  language: String,
  query: String,
  suggest_timer: Debouncer<String>,
  search_timer: Debouncer<String>,
  suggestions: Vec<MediaItem>,
  suggest_generation: u64,
  suggest_rx: Option<oneshot::Receiver<SuggestionOutcome>>,
  suggest_task: Option<JoinHandle<()>>,
  results: PaginationController<G>,
  error: Option<String>,
}

impl<G: MediaGateway> SearchController<G> {
  pub fn new(gateway: G, media_type: MediaType, language: &str) -> Self {
    let c = constants();
    Self {
      results: PaginationController::new(gateway.clone()),
      gateway,
      media_type,
      language: language.to_string(),
      query: String::new(),
      suggest_timer: Debouncer::new(c.suggestion_debounce()),
      search_timer: Debouncer::new(c.search_debounce()),
      suggestions: Vec::new(),
      suggest_generation: 0,
      suggest_rx: None,
      suggest_task: None,
      error: None,
    }
  }

  pub fn query(&self) -> &str {
    &self.query
  }

  /// A non-empty query supersedes the browse list.
  pub fn is_active(&self) -> bool {
    !self.query.trim().is_empty()
  }

  pub fn is_searching(&self) -> bool {
    self.suggest_rx.is_some() || self.results.is_loading()
  }

  pub fn has_pending_timers(&self) -> bool {
    self.suggest_timer.is_pending() || self.search_timer.is_pending()
  }

  pub fn suggestions(&self) -> &[MediaItem] {
    &self.suggestions
  }

  pub fn results(&self) -> &PaginationController<G> {
    &self.results
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn dismiss_suggestions(&mut self) {
    self.suggestions.clear();
  }

  /// Handle a keystroke in the search box.
  pub fn on_query_change(&mut self, value: &str, now: Instant) -> QueryOutcome {
    self.query = value.to_string();
    self.cancel_pending();
    let trimmed = value.trim();

    if trimmed.is_empty() {
      info!("search: cleared");
      self.clear_results();
      return QueryOutcome::Cleared;
    }
    if trimmed.chars().count() < constants().min_query_chars {
      self.clear_results();
      return QueryOutcome::TooShort;
    }

    self.suggest_timer.arm(trimmed.to_string(), now);
    self.search_timer.arm(trimmed.to_string(), now);
    QueryOutcome::Armed
  }

  /// Run the full search right away (Enter or a picked suggestion).
  pub fn on_submit(&mut self, query: &str) -> QueryOutcome {
    self.query = query.to_string();
    self.cancel_pending();
    let trimmed = query.trim();
    if trimmed.is_empty() {
      self.clear_results();
      return QueryOutcome::Cleared;
    }
    info!(query = %trimmed, "search: submitted");
    self.suggestions.clear();
    self.error = None;
    self.results.load_first_page(PageRequest::search(self.media_type, trimmed, &self.language));
    QueryOutcome::Armed
  }

  /// Tear the session down: timers cancelled, results gone.
  pub fn clear(&mut self) {
    self.query.clear();
    self.cancel_pending();
    self.clear_results();
  }

  /// Media type or language changed; re-run an active search under the new scope.
  pub fn set_scope(&mut self, media_type: MediaType, language: &str) {
    if self.media_type == media_type && self.language == language {
      return;
    }
    self.media_type = media_type;
    self.language = language.to_string();
    if self.is_active() {
      let query = self.query.clone();
      self.on_submit(&query);
    }
  }

  pub fn load_more(&mut self) -> bool {
    self.results.load_next_page()
  }

  pub fn retry(&mut self) -> bool {
    if self.error.is_none() || !self.is_active() {
      return false;
    }
    let query = self.query.clone();
    self.on_submit(&query);
    true
  }

  /// Fire any timer whose deadline has passed.
  pub fn tick(&mut self, now: Instant) {
    if let Some(query) = self.suggest_timer.take_ready(now) {
      self.spawn_suggestions(query);
    }
    if let Some(query) = self.search_timer.take_ready(now) {
      debug!(query = %query, "search: full search timer fired");
      self.error = None;
      self.results.load_first_page(PageRequest::search(self.media_type, &query, &self.language));
    }
  }

  /// Apply one completed request, if any. Call until it returns `None`.
  pub fn poll(&mut self) -> Option<SearchEvent> {
    if let Some(mut rx) = self.suggest_rx.take() {
      match rx.try_recv() {
        Ok(outcome) => {
          self.suggest_task = None;
          if let Some(event) = self.apply_suggestions(outcome) {
            return Some(event);
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.suggest_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.suggest_task = None;
        }
      }
    }

    match self.results.poll()? {
      PageEvent::Failed { error, .. } => Some(self.fail(&error)),
      event => Some(SearchEvent::Results(event)),
    }
  }

  fn spawn_suggestions(&mut self, query: String) {
    debug!(query = %query, "search: fetching suggestions");
    let generation = self.suggest_generation;
    let request = PageRequest::search(self.media_type, &query, &self.language);
    let gateway = self.gateway.clone();
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
      let result = gateway.fetch(request).await;
      let _ = tx.send(SuggestionOutcome { generation, result });
    });
    self.suggest_rx = Some(rx);
    self.suggest_task = Some(handle);
  }

  fn apply_suggestions(&mut self, outcome: SuggestionOutcome) -> Option<SearchEvent> {
    if outcome.generation != self.suggest_generation {
      debug!("search: dropping stale suggestions");
      return None;
    }
    match outcome.result {
      Ok(page) => {
        self.suggestions = page.items.into_iter().take(constants().max_suggestions).collect();
        Some(SearchEvent::Suggestions(self.suggestions.len()))
      }
      Err(e) => Some(self.fail(&e)),
    }
  }

  fn fail(&mut self, error: &FetchError) -> SearchEvent {
    warn!(query = %self.query.trim(), err = %error, "search: request failed");
    // A still-armed full search would hit the failing upstream again and wipe the error.
    self.suggest_timer.cancel();
    self.search_timer.cancel();
    self.suggestions.clear();
    self.results.reset();
    self.error = Some(error.user_message());
    SearchEvent::Failed(error.clone())
  }

  /// Drop timers and every request issued for the previous query.
  fn cancel_pending(&mut self) {
    self.suggest_timer.cancel();
    self.search_timer.cancel();
    self.results.reset();
    self.suggest_generation += 1;
    self.suggest_rx = None;
    if let Some(handle) = self.suggest_task.take() {
      handle.abort();
    }
  }

  fn clear_results(&mut self) {
    self.suggestions.clear();
    self.results.reset();
    self.error = None;
  }
}
