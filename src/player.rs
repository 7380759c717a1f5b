use anyhow::{Context, Result, anyhow};
use std::process::{Command, Stdio};
use tracing::info;

use crate::tmdb::{MediaItem, MediaType};

/// Season/episode pick for TV playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Episode {
  pub season: u32,
  pub episode: u32,
}

impl Default for Episode {
  fn default() -> Self {
    Self { season: 1, episode: 1 }
  }
}

impl Episode {
  pub fn next_episode(&mut self) {
    self.episode += 1;
  }

  pub fn prev_episode(&mut self) {
    self.episode = self.episode.saturating_sub(1).max(1);
  }

  pub fn next_season(&mut self) {
    self.season += 1;
    self.episode = 1;
  }

  pub fn prev_season(&mut self) {
    self.season = self.season.saturating_sub(1).max(1);
    self.episode = 1;
  }
}

/// `<host>/embed/{movie|tv}/{id}[/{season}/{episode}]`
pub fn embed_url(host: &str, media_type: MediaType, id: u64, episode: Option<Episode>) -> String {
  let base = format!("{}/embed/{}/{}", host.trim_end_matches('/'), media_type.path(), id);
  match (media_type, episode) {
    (MediaType::Tv, Some(ep)) => format!("{}/{}/{}", base, ep.season, ep.episode),
    _ => base,
  }
}

pub fn item_url(host: &str, item: &MediaItem, episode: Episode) -> String {
  embed_url(host, item.media_type, item.id, Some(episode))
}

/// Hand the URL to the platform's default browser.
pub fn open_in_browser(url: &str) -> Result<()> {
  #[cfg(target_os = "macos")]
  let cmd = "open";
  #[cfg(not(target_os = "macos"))]
  let cmd = "xdg-open";

  let mut child = Command::new(cmd)
    .arg(url)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()
    .map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("{} not found; open {} manually", cmd, url)
      } else {
        anyhow!(e).context("Failed to launch browser")
      }
    })
    .context("Failed to open player")?;
  info!(url = %url, "player: opened in browser");

  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}
