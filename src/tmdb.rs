use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use image::DynamicImage;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

use crate::constants::constants;
use crate::error::FetchError;

// --- Types ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
  #[default]
  Movie,
  Tv,
}

impl MediaType {
  /// Path segment used by both the metadata API and the embed player.
  pub fn path(self) -> &'static str {
    match self {
      MediaType::Movie => "movie",
      MediaType::Tv => "tv",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      MediaType::Movie => "Movies",
      MediaType::Tv => "TV Shows",
    }
  }

  pub fn toggle(self) -> Self {
    match self {
      MediaType::Movie => MediaType::Tv,
      MediaType::Tv => MediaType::Movie,
    }
  }
}

/// A single title as returned by the metadata service.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
  pub id: u64,
  pub title: String,
  pub overview: Option<String>,
  pub poster_path: Option<String>,
  pub backdrop_path: Option<String>,
  pub vote_average: f64,
  pub release_date: Option<String>,
  pub media_type: MediaType,
}

impl MediaItem {
  /// Identity used for deduplication. Ids are only unique per media type.
  pub fn key(&self) -> (MediaType, u64) {
    (self.media_type, self.id)
  }

  pub fn year(&self) -> Option<i32> {
    let date = self.release_date.as_deref()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok().map(|d| d.year())
  }

  pub fn poster_url(&self) -> Option<String> {
    self.poster_path.as_ref().map(|p| format!("{}{}", constants().image_base_url, p))
  }
}

/// One page of results, exactly as delivered for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
  pub items: Vec<MediaItem>,
  pub page: u32,
  pub total_pages: u32,
  pub total_results: u64,
}

/// What a paginated request lists: a browse category or a search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
  Category(String),
  Search(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  pub media_type: MediaType,
  pub listing: Listing,
  pub language: String,
  pub page: u32,
}

impl PageRequest {
  pub fn category(media_type: MediaType, category: &str, language: &str) -> Self {
    Self { media_type, listing: Listing::Category(category.to_string()), language: language.to_string(), page: 1 }
  }

  pub fn search(media_type: MediaType, query: &str, language: &str) -> Self {
    Self { media_type, listing: Listing::Search(query.to_string()), language: language.to_string(), page: 1 }
  }

  pub fn with_page(&self, page: u32) -> Self {
    Self { page, ..self.clone() }
  }
}

/// Upstream endpoint shape a category resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
  Trending,
  DiscoverGenre(u32),
  DiscoverLanguage(String),
  List(String),
  Search(String),
}

impl Endpoint {
  pub fn resolve(media_type: MediaType, listing: &Listing) -> Self {
    let category = match listing {
      Listing::Search(query) => return Endpoint::Search(query.clone()),
      Listing::Category(c) => c.trim().to_lowercase(),
    };

    if category == "trending" {
      return Endpoint::Trending;
    }
    if let Ok(id) = category.parse::<u32>() {
      return Endpoint::DiscoverGenre(id);
    }
    if let Some(lang) = category.strip_prefix("lang:")
      && !lang.is_empty()
    {
      return Endpoint::DiscoverLanguage(lang.to_string());
    }
    if let Some(lang) = regional_language(&category) {
      return Endpoint::DiscoverLanguage(lang.to_string());
    }
    if let Some(id) = genre_id(media_type, &category) {
      return Endpoint::DiscoverGenre(id);
    }
    Endpoint::List(category)
  }
}

fn regional_language(category: &str) -> Option<&'static str> {
  match category {
    "anime" => Some("ja"),
    "korean" | "kdrama" => Some("ko"),
    "bollywood" => Some("hi"),
    _ => None,
  }
}

/// Map a genre name to its id. Movie and TV genres use different id sets.
pub fn genre_id(media_type: MediaType, name: &str) -> Option<u32> {
  let shared = match name {
    "animation" => Some(16),
    "comedy" => Some(35),
    "crime" => Some(80),
    "documentary" => Some(99),
    "drama" => Some(18),
    "family" => Some(10751),
    "mystery" => Some(9648),
    _ => None,
  };
  if shared.is_some() {
    return shared;
  }
  match (media_type, name) {
    (MediaType::Movie, "action") => Some(28),
    (MediaType::Movie, "adventure") => Some(12),
    (MediaType::Movie, "fantasy") => Some(14),
    (MediaType::Movie, "horror") => Some(27),
    (MediaType::Movie, "romance") => Some(10749),
    (MediaType::Movie, "scifi" | "science_fiction") => Some(878),
    (MediaType::Movie, "thriller") => Some(53),
    (MediaType::Tv, "action" | "adventure") => Some(10759),
    (MediaType::Tv, "scifi" | "fantasy" | "science_fiction") => Some(10765),
    _ => None,
  }
}

/// Build the full request URL. The API key travels as a query parameter.
pub fn request_url(base_url: &str, api_key: &str, req: &PageRequest) -> Result<Url, FetchError> {
  if req.page == 0 {
    return Err(FetchError::InvalidRequest("page numbers start at 1".to_string()));
  }
  let kind = req.media_type.path();
  let page = req.page.to_string();
  let mut params: Vec<(&str, String)> =
    vec![("api_key", api_key.to_string()), ("language", req.language.clone()), ("page", page)];

  let path = match Endpoint::resolve(req.media_type, &req.listing) {
    Endpoint::Trending => format!("/trending/{}/week", kind),
    Endpoint::DiscoverGenre(id) => {
      params.push(("with_genres", id.to_string()));
      params.push(("sort_by", "popularity.desc".to_string()));
      format!("/discover/{}", kind)
    }
    Endpoint::DiscoverLanguage(lang) => {
      params.push(("with_original_language", lang));
      params.push(("sort_by", "popularity.desc".to_string()));
      format!("/discover/{}", kind)
    }
    Endpoint::List(name) => format!("/{}/{}", kind, name),
    Endpoint::Search(query) => {
      params.push(("query", query));
      params.push(("include_adult", "false".to_string()));
      format!("/search/{}", kind)
    }
  };

  Url::parse_with_params(&format!("{}{}", base_url.trim_end_matches('/'), path), &params)
    .map_err(|e| FetchError::InvalidRequest(e.to_string()))
}

/// Map an HTTP status to the gateway error taxonomy.
pub fn check_status(status: StatusCode) -> Result<(), FetchError> {
  if status == StatusCode::TOO_MANY_REQUESTS {
    Err(FetchError::RateLimited)
  } else if !status.is_success() {
    Err(FetchError::InvalidResponse(format!("HTTP {}", status.as_u16())))
  } else {
    Ok(())
  }
}

#[derive(Deserialize)]
struct RawItem {
  id: u64,
  title: Option<String>,
  name: Option<String>,
  overview: Option<String>,
  poster_path: Option<String>,
  backdrop_path: Option<String>,
  #[serde(default)]
  vote_average: f64,
  release_date: Option<String>,
  first_air_date: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl RawItem {
  fn into_item(self, media_type: MediaType) -> MediaItem {
    let title = non_empty(self.title).or(non_empty(self.name)).unwrap_or_else(|| format!("#{}", self.id));
    MediaItem {
      id: self.id,
      title,
      overview: non_empty(self.overview),
      poster_path: non_empty(self.poster_path),
      backdrop_path: non_empty(self.backdrop_path),
      vote_average: self.vote_average,
      release_date: non_empty(self.release_date).or(non_empty(self.first_air_date)),
      media_type,
    }
  }
}

/// Validate and convert a raw response body into a typed page.
///
/// A missing or non-array `results` field rejects the whole page. Individual
/// entries without a numeric `id` are dropped.
pub fn parse_page(body: &[u8], media_type: MediaType) -> Result<ResultPage, FetchError> {
  let value: Value = serde_json::from_slice(body).map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
  let results = value
    .get("results")
    .and_then(Value::as_array)
    .ok_or_else(|| FetchError::InvalidResponse("missing results array".to_string()))?;

  let items = results
    .iter()
    .filter_map(|raw| match RawItem::deserialize(raw) {
      Ok(item) => Some(item.into_item(media_type)),
      Err(e) => {
        debug!(err = %e, "tmdb: skipping malformed result entry");
        None
      }
    })
    .collect();

  let number = |key: &str| value.get(key).and_then(Value::as_u64);
  let page = number("page").unwrap_or(1).max(1) as u32;
  let total_pages = number("total_pages").unwrap_or(page as u64) as u32;
  let total_results = number("total_results").unwrap_or(0);

  Ok(ResultPage { items, page, total_pages, total_results })
}

// --- Gateway ---

/// Source of result pages and poster images. Implemented by [`TmdbClient`] and by test doubles.
pub trait MediaGateway: Clone + Send + Sync + 'static {
  fn fetch(&self, req: PageRequest) -> impl Future<Output = Result<ResultPage, FetchError>> + Send;

  fn poster(&self, url: String) -> impl Future<Output = Result<DynamicImage>> + Send;
}

#[derive(Clone)]
pub struct TmdbClient {
  http: Client,
  /// `None` when no key was configured; every fetch then fails with a configuration error.
  api_key: Option<String>,
  base_url: String,
}

impl TmdbClient {
  pub fn new(api_key: Option<&str>) -> Result<Self, FetchError> {
    let api_key = api_key.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string);
    if api_key.is_none() {
      warn!("tmdb: no API key configured");
    }
    let http = Client::builder()
      .timeout(constants().request_timeout())
      .user_agent(concat!("moviehouse/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| FetchError::Configuration(e.to_string()))?;
    Ok(Self { http, api_key, base_url: constants().api_base_url.clone() })
  }

  pub fn has_api_key(&self) -> bool {
    self.api_key.is_some()
  }

  pub async fn fetch_page(&self, req: PageRequest) -> Result<ResultPage, FetchError> {
    let api_key = self.api_key.as_deref().ok_or_else(|| {
      FetchError::Configuration("no API key set. Pass --api-key or export TMDB_API_KEY.".to_string())
    })?;
    let url = request_url(&self.base_url, api_key, &req)?;
    debug!(media = req.media_type.path(), listing = ?req.listing, page = req.page, "tmdb: fetching page");

    let response = self.http.get(url).send().await?;
    if let Err(e) = check_status(response.status()) {
      warn!(status = %response.status(), page = req.page, "tmdb: request rejected");
      return Err(e);
    }
    let body = response.bytes().await?;
    parse_page(&body, req.media_type)
  }

  /// Download and decode a poster image.
  pub async fn fetch_poster(&self, url: &str) -> Result<DynamicImage> {
    let response = self.http.get(url).send().await.with_context(|| format!("Failed to request poster {}", url))?;
    if !response.status().is_success() {
      return Err(anyhow!("Poster request failed with HTTP {}", response.status()));
    }
    let bytes = response.bytes().await.with_context(|| format!("Failed to read image bytes from {}", url))?;
    image::load_from_memory(&bytes).with_context(|| format!("Failed to decode image from memory (URL: {})", url))
  }
}

impl MediaGateway for TmdbClient {
  fn fetch(&self, req: PageRequest) -> impl Future<Output = Result<ResultPage, FetchError>> + Send {
    self.fetch_page(req)
  }

  fn poster(&self, url: String) -> impl Future<Output = Result<DynamicImage>> + Send {
    let client = self.clone();
    async move { client.fetch_poster(&url).await }
  }
}
