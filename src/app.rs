use ratatui::widgets::ListState;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::display::DisplayMode;
use crate::pagination::{LoadState, PageEvent, PaginationController};
use crate::player::{self, Episode};
use crate::poster::{PosterCache, PosterKey};
use crate::search::{QueryOutcome, SearchController, SearchEvent};
use crate::theme::{THEMES, Theme, theme_index};
use crate::tmdb::{MediaGateway, MediaItem, MediaType, PageRequest, TmdbClient};
use crate::visibility::{Extent, ObserveOptions, Viewport, VisibilityObserver, WatchHandle};

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  /// Navigating the result list.
  Browse,
  /// Typing in the search box.
  Search,
  /// Detail pane for the selected title.
  Detail,
}

/// Sent by visibility watch callbacks, drained on the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum VisibilitySignal {
  /// End-of-list sentinel for the list of the given epoch.
  LoadMore(u64),
  Poster(PosterKey, String),
}

/// Startup selections resolved from CLI flags and saved preferences.
pub struct Startup {
  pub media_type: MediaType,
  pub category: String,
  pub language: String,
  pub player_host: String,
  pub display_mode: DisplayMode,
}

pub const FAVORITES: &str = "favorites";

pub struct App<G: MediaGateway = TmdbClient> {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub media_type: MediaType,
  pub category: String,
  pub language: String,
  pub player_host: String,
  pub display_mode: DisplayMode,
  pub client: G,
  pub browse: PaginationController<G>,
  pub search: SearchController<G>,
  pub list_state: ListState,
  /// Highlighted suggestion while typing.
  pub suggestion_index: Option<usize>,
  pub episode: Episode,
  pub theme_index: usize,
  pub posters: PosterCache,
  pub config: Config,
  /// Row window of the result list as last drawn.
  pub results_viewport: Option<Viewport>,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Shown below status and errors in priority.
  pub info_message: Option<String>,
  pub should_quit: bool,
  observer: VisibilityObserver,
  sentinel: Option<WatchHandle>,
  watched_rows: usize,
  /// Bumped whenever the displayed list is replaced.
  list_epoch: u64,
  showing_search: bool,
  vis_tx: mpsc::UnboundedSender<VisibilitySignal>,
  vis_rx: mpsc::UnboundedReceiver<VisibilitySignal>,
  /// When the last error was set. `None` keeps it until the next action.
  error_time: Option<Instant>,
}

impl<G: MediaGateway> App<G> {
  pub fn new(client: G, config: Config, startup: Startup) -> Self {
    let (vis_tx, vis_rx) = mpsc::unbounded_channel();
    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      mode: AppMode::Browse,
      media_type: startup.media_type,
      category: startup.category,
      language: startup.language.clone(),
      player_host: startup.player_host,
      display_mode: startup.display_mode,
      browse: PaginationController::new(client.clone()),
      search: SearchController::new(client.clone(), startup.media_type, &startup.language),
      client,
      list_state: ListState::default(),
      suggestion_index: None,
      episode: Episode::default(),
      theme_index: theme_index(config.theme.as_deref()),
      posters: PosterCache::default(),
      config,
      results_viewport: None,
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      observer: VisibilityObserver::default(),
      sentinel: None,
      watched_rows: 0,
      list_epoch: 0,
      showing_search: false,
      vis_tx,
      vis_rx,
      error_time: None,
    }
  }

  /// Kick off the initial browse load and restore the last search, if any.
  pub fn start(&mut self) {
    self.reload_browse();
    if let Some(query) = self.config.last_search_query.clone().filter(|q| !q.trim().is_empty()) {
      self.cursor_position = query.chars().count();
      self.input = query;
      self.search.on_submit(&self.input);
    }
  }

  pub fn theme(&self) -> &'static Theme {
    &THEMES[self.theme_index % THEMES.len()]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme = Some(self.theme().name.to_string());
    self.config.save();
  }

  // --- Errors ---

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  /// Error that stays until the user acts.
  pub fn set_persistent_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = None;
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(constants().error_dismiss_secs)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  fn surface_error(&mut self, error: &crate::error::FetchError) {
    use crate::error::FetchError;
    match error {
      FetchError::RateLimited | FetchError::Configuration(_) => {
        self.set_persistent_error(error.user_message())
      }
      _ => self.set_error(error.user_message()),
    }
  }

  // --- Displayed list ---

  pub fn search_active(&self) -> bool {
    self.search.is_active()
  }

  /// The list currently on screen: search results while a query is active, else the browse list.
  pub fn items(&self) -> &[MediaItem] {
    if self.search_active() { self.search.results().items() } else { self.browse.items() }
  }

  pub fn load_state(&self) -> &LoadState {
    if self.search_active() { self.search.results().state() } else { self.browse.state() }
  }

  pub fn selected_item(&self) -> Option<&MediaItem> {
    self.list_state.selected().and_then(|i| self.items().get(i))
  }

  pub fn is_favorite(&self, item: &MediaItem) -> bool {
    self.config.is_favorite(item.media_type, item.id)
  }

  fn can_load_more(&self) -> bool {
    if self.search_active() { self.search.results().can_load_more() } else { self.browse.can_load_more() }
  }

  // --- Browse selectors ---

  pub fn reload_browse(&mut self) {
    info!(media = self.media_type.path(), category = %self.category, language = %self.language, "browse: reload");
    if self.category == FAVORITES {
      let favorites = self.config.favorite_items(self.media_type);
      self.browse.load_local(favorites);
    } else {
      self.browse.load_first_page(PageRequest::category(self.media_type, &self.category, &self.language));
    }
    if !self.search_active() {
      self.on_list_replaced();
    }
  }

  pub fn next_category(&mut self, forward: bool) {
    let categories = &constants().categories;
    let idx = categories.iter().position(|c| *c == self.category).unwrap_or(0);
    let next = if forward { (idx + 1) % categories.len() } else { (idx + categories.len() - 1) % categories.len() };
    self.category = categories[next].clone();
    self.reload_browse();
    self.save_config();
  }

  pub fn toggle_media_type(&mut self) {
    self.media_type = self.media_type.toggle();
    self.episode = Episode::default();
    self.search.set_scope(self.media_type, &self.language);
    self.reload_browse();
    self.save_config();
  }

  pub fn next_language(&mut self) {
    let languages = &constants().languages;
    let idx = languages.iter().position(|l| *l == self.language).unwrap_or(0);
    self.language = languages[(idx + 1) % languages.len()].clone();
    self.info_message = Some(format!("Language: {}", self.language));
    self.search.set_scope(self.media_type, &self.language);
    self.reload_browse();
    self.save_config();
  }

  pub fn toggle_favorite(&mut self) {
    let Some(item) = self.selected_item().cloned() else { return };
    let now_favorite = self.config.toggle_favorite(&item);
    self.info_message = Some(if now_favorite {
      format!("Added '{}' to favorites", item.title)
    } else {
      format!("Removed '{}'", item.title)
    });
    self.save_config();
    if self.category == FAVORITES && !self.search_active() {
      let selected = self.list_state.selected();
      self.reload_browse();
      let len = self.items().len();
      self.list_state.select(selected.filter(|_| len > 0).map(|i| i.min(len - 1)));
    }
  }

  fn save_config(&mut self) {
    self.config.media_type = self.media_type;
    self.config.category = Some(self.category.clone());
    self.config.language = Some(self.language.clone());
    self.config.player_host = Some(self.player_host.clone());
    let query = self.search.query().trim();
    self.config.last_search_query = if query.is_empty() { None } else { Some(query.to_string()) };
    self.config.save();
  }

  // --- Search ---

  pub fn on_input_changed(&mut self) {
    self.suggestion_index = None;
    if self.search.on_query_change(&self.input, Instant::now()) == QueryOutcome::Cleared {
      self.save_config();
    }
  }

  pub fn submit_search(&mut self) {
    let query = match self.suggestion_index.and_then(|i| self.search.suggestions().get(i)) {
      Some(item) => item.title.clone(),
      None => self.input.clone(),
    };
    self.cursor_position = query.chars().count();
    self.input = query;
    self.suggestion_index = None;
    if self.search.on_submit(&self.input) == QueryOutcome::Armed {
      self.mode = AppMode::Browse;
    }
    self.save_config();
  }

  pub fn clear_search(&mut self) {
    self.input.clear();
    self.cursor_position = 0;
    self.input_scroll = 0;
    self.suggestion_index = None;
    self.search.clear();
    self.clear_error();
    self.save_config();
  }

  // --- Loading ---

  /// Manual recovery after a failed load.
  pub fn retry(&mut self) {
    self.clear_error();
    let retried = if self.search_active() { self.search.retry() } else { self.browse.retry() };
    if !retried && self.items().is_empty() && !self.search_active() {
      self.reload_browse();
    }
  }

  fn load_more(&mut self) {
    // The sentinel may fire while a fetch is in flight; the controller guard is re-checked here.
    if !self.can_load_more() {
      return;
    }
    let started = if self.search_active() { self.search.load_more() } else { self.browse.load_next_page() };
    if started {
      debug!(rows = self.items().len(), "app: loading next page");
    }
  }

  // --- Visibility ---

  /// The displayed list was replaced: drop every watch and arm fresh ones.
  fn on_list_replaced(&mut self) {
    self.list_epoch += 1;
    self.observer.clear();
    self.sentinel = None;
    self.watched_rows = 0;
    self.list_state.select(if self.items().is_empty() { None } else { Some(0) });
    *self.list_state.offset_mut() = 0;
    self.arm_watches();
  }

  /// Arm poster watches for rows not yet watched and move the end-of-list sentinel.
  fn arm_watches(&mut self) {
    let options = ObserveOptions::default();
    let len = self.items().len();

    if self.display_mode.shows_posters() {
      let pending: Vec<(usize, PosterKey, String)> = self
        .items()
        .iter()
        .enumerate()
        .skip(self.watched_rows)
        .filter_map(|(i, item)| item.poster_url().map(|url| (i, item.key(), url)))
        .collect();
      for (row, key, url) in pending {
        let tx = self.vis_tx.clone();
        self.observer.observe(Extent::row(row), options, move || {
          let _ = tx.send(VisibilitySignal::Poster(key, url));
        });
      }
    }
    self.watched_rows = len;

    if let Some(old) = self.sentinel.take() {
      self.observer.cancel(old);
    }
    if len > 0 && self.can_load_more() {
      let tx = self.vis_tx.clone();
      let epoch = self.list_epoch;
      self.sentinel = Some(self.observer.observe(Extent::row(len - 1), options, move || {
        let _ = tx.send(VisibilitySignal::LoadMore(epoch));
      }));
    }
  }

  /// Evaluate watches against the viewport recorded by the last draw.
  pub fn update_visibility(&mut self) {
    if let Some(viewport) = self.results_viewport {
      self.observer.update(viewport);
    }
  }

  fn request_priority_posters(&mut self) {
    if !self.display_mode.shows_posters() {
      return;
    }
    let wanted: Vec<(PosterKey, String)> = [self.selected_item(), self.browse.featured()]
      .into_iter()
      .flatten()
      .filter_map(|item| item.poster_url().map(|url| (item.key(), url)))
      .collect();
    for (key, url) in wanted {
      self.posters.request(&self.client, key, url);
    }
  }

  // --- Player ---

  pub fn play_selected(&mut self) {
    let Some(item) = self.selected_item() else { return };
    let url = player::item_url(&self.player_host, item, self.episode);
    let title = item.title.clone();
    match player::open_in_browser(&url) {
      Ok(()) => self.info_message = Some(format!("Opened '{}' in browser", title)),
      Err(e) => {
        warn!(err = %e, "player: failed to open");
        self.set_error(format!("{:#}", e));
      }
    }
  }

  // --- Tick ---

  /// Fire due timers and apply everything that completed since the last tick.
  pub fn check_pending(&mut self) {
    self.search.tick(Instant::now());

    let search_active = self.search_active();
    if search_active != self.showing_search {
      self.showing_search = search_active;
      self.on_list_replaced();
    }

    while let Some(event) = self.search.poll() {
      match event {
        SearchEvent::Suggestions(count) => {
          debug!(count, "app: suggestions updated");
          if self.suggestion_index.is_some_and(|i| i >= count) {
            self.suggestion_index = None;
          }
        }
        SearchEvent::Results(PageEvent::FirstPage { .. }) => {
          if self.search_active() {
            self.on_list_replaced();
          }
        }
        SearchEvent::Results(_) => {
          if self.search_active() {
            self.arm_watches();
          }
        }
        SearchEvent::Failed(error) => self.surface_error(&error),
      }
    }

    while let Some(event) = self.browse.poll() {
      match event {
        PageEvent::FirstPage { .. } if !self.search_active() => self.on_list_replaced(),
        PageEvent::NextPage { .. } if !self.search_active() => self.arm_watches(),
        PageEvent::Failed { error, .. } => self.surface_error(&error),
        _ => {}
      }
    }

    while let Ok(signal) = self.vis_rx.try_recv() {
      match signal {
        VisibilitySignal::LoadMore(epoch) if epoch == self.list_epoch => self.load_more(),
        VisibilitySignal::LoadMore(epoch) => {
          debug!(epoch, current = self.list_epoch, "app: dropping stale sentinel");
        }
        VisibilitySignal::Poster(key, url) => {
          self.posters.request(&self.client, key, url);
        }
      }
    }

    self.request_priority_posters();
    self.posters.drain();

    self.status_message = if *self.load_state() == LoadState::Loading {
      Some(if self.items().is_empty() { "Loading…".to_string() } else { "Loading more…".to_string() })
    } else if self.search.has_pending_timers() || self.search.is_searching() {
      Some(format!("Searching '{}'…", self.search.query().trim()))
    } else {
      None
    };

    self.expire_error();
  }

  // --- Navigation ---

  pub fn select_next(&mut self) {
    let count = self.items().len();
    if count > 0 {
      let i = self.list_state.selected().map_or(0, |i| (i + 1).min(count - 1));
      self.list_state.select(Some(i));
      self.episode = Episode::default();
    }
  }

  pub fn select_prev(&mut self) {
    if !self.items().is_empty() {
      let i = self.list_state.selected().map_or(0, |i| i.saturating_sub(1));
      self.list_state.select(Some(i));
      self.episode = Episode::default();
    }
  }

  pub fn select_suggestion(&mut self, forward: bool) {
    let count = self.search.suggestions().len();
    if count == 0 {
      self.suggestion_index = None;
      return;
    }
    self.suggestion_index = match (self.suggestion_index, forward) {
      (None, true) => Some(0),
      (None, false) => Some(count - 1),
      (Some(i), true) if i + 1 < count => Some(i + 1),
      (Some(_), true) => None,
      (Some(0), false) => None,
      (Some(i), false) => Some(i - 1),
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FetchError;
  use crate::testing::{FakeGateway, page};
  use crate::tmdb::ResultPage;

  fn startup(display_mode: DisplayMode) -> Startup {
    Startup {
      media_type: MediaType::Movie,
      category: "trending".to_string(),
      language: "en-US".to_string(),
      player_host: "https://player.test".to_string(),
      display_mode,
    }
  }

  fn app() -> App {
    App::new(TmdbClient::new(None).unwrap(), Config::default(), startup(DisplayMode::Off))
  }

  fn app_with(gateway: &FakeGateway, display_mode: DisplayMode) -> App<FakeGateway> {
    let mut app = App::new(gateway.clone(), Config::default(), startup(display_mode));
    app.results_viewport = Some(Viewport { offset: 0, height: 10 });
    app
  }

  async fn settle<G: MediaGateway>(app: &mut App<G>) {
    for _ in 0..50 {
      tokio::task::yield_now().await;
      app.check_pending();
    }
  }

  #[tokio::test]
  async fn missing_api_key_surfaces_error_without_crashing() {
    let mut app = app();
    app.start();
    settle(&mut app).await;
    assert!(app.last_error.as_deref().is_some_and(|e| e.contains("API key")));
    assert!(matches!(app.browse.state(), LoadState::Error(_)));
    assert!(app.items().is_empty());
  }

  #[tokio::test]
  async fn favorites_category_lists_locally() {
    let mut app = app();
    let mut fav = crate::testing::item(11, "Kept");
    fav.media_type = MediaType::Movie;
    app.config.toggle_favorite(&fav);
    app.category = FAVORITES.to_string();
    app.reload_browse();
    settle(&mut app).await;
    assert_eq!(app.items().len(), 1);
    assert_eq!(app.selected_item().map(|i| i.id), Some(11));
    assert_eq!(app.browse.state(), &LoadState::Loaded);
  }

  #[test]
  fn suggestion_cursor_wraps_through_none() {
    let mut app = app();
    app.select_suggestion(true);
    assert_eq!(app.suggestion_index, None);
  }

  #[test]
  fn persistent_errors_do_not_expire() {
    let mut app = app();
    app.set_persistent_error("stuck".to_string());
    app.expire_error();
    assert_eq!(app.last_error.as_deref(), Some("stuck"));
    app.clear_error();
    assert!(app.last_error.is_none());
  }

  // --- Sentinel wiring ---

  /// Page 1 of 3 shown, sentinel armed on its last row.
  async fn first_page_loaded(gateway: &FakeGateway) -> App<FakeGateway> {
    gateway.push(Ok(page(&[(1, "A"), (2, "B")], 1, 3)));
    let mut app = app_with(gateway, DisplayMode::Off);
    app.reload_browse();
    gateway.release(1);
    settle(&mut app).await;
    assert_eq!(app.items().len(), 2);
    assert!(app.sentinel.is_some_and(|h| app.observer.is_pending(h)));
    app
  }

  /// Let spawned fetches reach the gateway without applying anything.
  async fn spin() {
    for _ in 0..10 {
      tokio::task::yield_now().await;
    }
  }

  fn pages_requested(gateway: &FakeGateway) -> Vec<u32> {
    gateway.requests().iter().map(|r| r.page).collect()
  }

  #[tokio::test]
  async fn sentinel_during_loading_sends_nothing() {
    let gateway = FakeGateway::gated();
    let mut app = first_page_loaded(&gateway).await;

    app.update_visibility();
    app.check_pending();
    spin().await;
    assert_eq!(pages_requested(&gateway), vec![1, 2]);
    assert_eq!(*app.load_state(), LoadState::Loading);

    // A second signal while page 2 is still in flight.
    app.vis_tx.send(VisibilitySignal::LoadMore(app.list_epoch)).unwrap();
    app.update_visibility();
    settle(&mut app).await;
    assert_eq!(pages_requested(&gateway), vec![1, 2]);
    assert_eq!(gateway.max_in_flight(), 1);
  }

  #[tokio::test]
  async fn sentinel_rearms_after_merge_and_fetches_page_three() {
    let gateway = FakeGateway::gated();
    let mut app = first_page_loaded(&gateway).await;
    gateway.push(Ok(page(&[(3, "C"), (4, "D")], 2, 3)));
    gateway.push(Ok(page(&[(5, "E")], 3, 3)));

    app.update_visibility();
    app.check_pending();
    assert!(app.sentinel.is_none_or(|h| !app.observer.is_pending(h)));
    gateway.release(1);
    settle(&mut app).await;
    assert_eq!(app.items().len(), 4);
    assert_eq!(app.observer.pending(), 1);
    assert!(app.sentinel.is_some_and(|h| app.observer.is_pending(h)));

    app.update_visibility();
    app.check_pending();
    spin().await;
    assert_eq!(pages_requested(&gateway), vec![1, 2, 3]);

    gateway.release(1);
    settle(&mut app).await;
    assert_eq!(app.items().len(), 5);
    assert!(!app.can_load_more());
    assert_eq!(app.observer.pending(), 0);
  }

  #[tokio::test]
  async fn stale_load_more_after_list_replacement_is_ignored() {
    let gateway = FakeGateway::gated();
    let mut app = first_page_loaded(&gateway).await;
    gateway.push(Ok(page(&[(7, "G"), (8, "H")], 1, 3)));

    // The sentinel fires, but its signal is not drained before the category changes.
    app.update_visibility();
    app.category = "popular".to_string();
    app.reload_browse();
    gateway.release(1);
    spin().await;
    app.check_pending();
    spin().await;

    assert_eq!(app.items().len(), 2);
    assert_eq!(app.items()[0].id, 7);
    assert_eq!(pages_requested(&gateway), vec![1, 1]);
    assert_eq!(*app.load_state(), LoadState::Loaded);
  }

  #[tokio::test]
  async fn poster_watches_cover_only_new_rows() {
    let gateway = FakeGateway::gated();
    let with_posters = |mut p: ResultPage| {
      for item in &mut p.items {
        item.poster_path = Some(format!("/{}.jpg", item.id));
      }
      p
    };
    gateway.push(Ok(with_posters(page(&[(1, "A"), (2, "B")], 1, 2))));
    gateway.push(Ok(with_posters(page(&[(3, "C"), (4, "D")], 2, 2))));
    let mut app = app_with(&gateway, DisplayMode::Ascii);
    app.results_viewport = None;
    app.reload_browse();
    gateway.release(1);
    settle(&mut app).await;
    // Two poster watches and the sentinel.
    assert_eq!(app.observer.pending(), 3);

    app.load_more();
    gateway.release(1);
    settle(&mut app).await;
    assert_eq!(app.items().len(), 4);
    assert_eq!(app.observer.pending(), 4);
  }

  #[tokio::test]
  async fn search_rate_limit_stays_on_screen() {
    let gateway = FakeGateway::default();
    gateway.push(Err(FetchError::RateLimited));
    let mut app = app_with(&gateway, DisplayMode::Off);
    app.input = "batman".to_string();
    app.search.on_submit(&app.input);
    settle(&mut app).await;

    assert!(app.last_error.as_deref().is_some_and(|e| e.contains("Try again later")));
    assert!(app.error_time.is_none());
  }
}
