use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::tmdb::{MediaItem, MediaType};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Favorite {
  pub id: u64,
  pub media_type: MediaType,
  pub title: String,
  pub poster_path: Option<String>,
  pub release_date: Option<String>,
}

impl Favorite {
  fn from_item(item: &MediaItem) -> Self {
    Self {
      id: item.id,
      media_type: item.media_type,
      title: item.title.clone(),
      poster_path: item.poster_path.clone(),
      release_date: item.release_date.clone(),
    }
  }

  fn to_item(&self) -> MediaItem {
    MediaItem {
      id: self.id,
      title: self.title.clone(),
      overview: None,
      poster_path: self.poster_path.clone(),
      backdrop_path: None,
      vote_average: 0.0,
      release_date: self.release_date.clone(),
      media_type: self.media_type,
    }
  }
}

/// User preferences persisted between runs.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
  pub media_type: MediaType,
  pub category: Option<String>,
  pub language: Option<String>,
  pub last_search_query: Option<String>,
  pub player_host: Option<String>,
  pub theme: Option<String>,
  pub favorites: Vec<Favorite>,
}

impl Config {
  pub fn path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "moviehouse").map(|dirs| dirs.config_dir().join("prefs.toml"))
  }

  /// Read the preference file. Missing or unreadable files yield defaults.
  pub fn load() -> Self {
    Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
  }

  pub fn load_from(path: &Path) -> Self {
    let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
    match toml::from_str(&content) {
      Ok(config) => config,
      Err(e) => {
        warn!(path = %path.display(), err = %e, "prefs: ignoring corrupt preference file");
        Self::default()
      }
    }
  }

  pub fn save(&self) {
    let Some(path) = Self::path() else { return };
    if let Err(e) = self.save_to(&path) {
      warn!(err = %e, "prefs: failed to save");
    }
  }

  pub fn save_to(&self, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let content = toml::to_string(self).context("Failed to serialize preferences")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "prefs: saved");
    Ok(())
  }

  pub fn is_favorite(&self, media_type: MediaType, id: u64) -> bool {
    self.favorites.iter().any(|f| f.media_type == media_type && f.id == id)
  }

  /// Add or remove `item`. Returns whether it is a favorite afterwards.
  pub fn toggle_favorite(&mut self, item: &MediaItem) -> bool {
    if self.is_favorite(item.media_type, item.id) {
      self.favorites.retain(|f| !(f.media_type == item.media_type && f.id == item.id));
      false
    } else {
      self.favorites.push(Favorite::from_item(item));
      true
    }
  }

  pub fn favorite_items(&self, media_type: MediaType) -> Vec<MediaItem> {
    self.favorites.iter().filter(|f| f.media_type == media_type).map(Favorite::to_item).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::item;

  #[test]
  fn round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("prefs.toml");
    let mut config = Config {
      media_type: MediaType::Tv,
      category: Some("top_rated".to_string()),
      language: Some("fr-FR".to_string()),
      last_search_query: Some("office".to_string()),
      ..Config::default()
    };
    config.toggle_favorite(&item(42, "Answer"));
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path), config);
  }

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(Config::load_from(&dir.path().join("absent.toml")), Config::default());
  }

  #[test]
  fn corrupt_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(&path, "media_type = [not toml").unwrap();
    assert_eq!(Config::load_from(&path), Config::default());
  }

  #[test]
  fn partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(&path, "media_type = \"tv\"\n").unwrap();
    let config = Config::load_from(&path);
    assert_eq!(config.media_type, MediaType::Tv);
    assert!(config.favorites.is_empty());
  }

  #[test]
  fn toggle_favorite_adds_then_removes() {
    let mut config = Config::default();
    let movie = item(7, "Seven");
    assert!(config.toggle_favorite(&movie));
    assert!(config.is_favorite(MediaType::Movie, 7));
    assert!(!config.is_favorite(MediaType::Tv, 7));
    assert_eq!(config.favorite_items(MediaType::Movie).len(), 1);
    assert!(!config.toggle_favorite(&movie));
    assert!(config.favorites.is_empty());
  }
}
