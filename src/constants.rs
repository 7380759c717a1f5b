//! Application constants loaded from `constants.ron` at compile time.
//!
//! Endpoints, timing knobs and the category/language menus. The file is
//! embedded with `include_str!` and parsed once on first access.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Upstream metadata API
  pub api_base_url: String,
  pub image_base_url: String,
  pub default_player_host: String,
  pub request_timeout_secs: u64,

  // Search debounce
  pub suggestion_debounce_ms: u64,
  pub search_debounce_ms: u64,
  pub min_query_chars: usize,
  pub max_suggestions: usize,

  // Visibility watches
  pub prefetch_margin_rows: usize,
  pub visibility_threshold: f32,

  /// Decoded posters kept before the least recently used is dropped.
  pub poster_cache_capacity: usize,

  pub error_dismiss_secs: u64,

  // Browse selectors
  pub categories: Vec<String>,
  pub languages: Vec<String>,
}

impl Constants {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn suggestion_debounce(&self) -> Duration {
    Duration::from_millis(self.suggestion_debounce_ms)
  }

  pub fn search_debounce(&self) -> Duration {
    Duration::from_millis(self.search_debounce_ms)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert!(c.search_debounce() > c.suggestion_debounce());
    assert_eq!(c.max_suggestions, 5);
    assert!(c.categories.iter().any(|c| c == "trending"));
    assert!(!c.languages.is_empty());
    assert!(c.poster_cache_capacity > 0);
  }
}
