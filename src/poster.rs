use anyhow::Result;
use image::{DynamicImage, imageops::FilterType};
use lru::LruCache;
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Style},
  widgets::Widget,
};
use std::num::NonZeroUsize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::constants::constants;
use crate::display::DisplayMode;
use crate::tmdb::{MediaGateway, MediaType};

pub type PosterKey = (MediaType, u64);

pub enum PosterState {
  Loading,
  Ready(DynamicImage),
  Failed,
}

/// Lazily fetched, decoded posters keyed by media identity.
///
/// Holds at most `capacity` entries; the least recently used is dropped first.
pub struct PosterCache {
  states: LruCache<PosterKey, PosterState>,
  tx: mpsc::UnboundedSender<(PosterKey, Result<DynamicImage>)>,
  rx: mpsc::UnboundedReceiver<(PosterKey, Result<DynamicImage>)>,
  resized: Option<(PosterKey, u16, u16, DynamicImage)>,
}

impl Default for PosterCache {
  fn default() -> Self {
    Self::with_capacity(constants().poster_cache_capacity)
  }
}

impl PosterCache {
  pub fn with_capacity(capacity: usize) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Self { states: LruCache::new(capacity), tx, rx, resized: None }
  }

  pub fn len(&self) -> usize {
    self.states.len()
  }

  pub fn state(&self, key: PosterKey) -> Option<&PosterState> {
    self.states.peek(&key)
  }

  /// Start downloading a poster unless it is already known. Returns whether a fetch was spawned.
  pub fn request<G: MediaGateway>(&mut self, gateway: &G, key: PosterKey, url: String) -> bool {
    if self.states.get(&key).is_some() {
      return false;
    }
    debug!(id = key.1, url = %url, "poster: fetching");
    self.insert(key, PosterState::Loading);
    let gateway = gateway.clone();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let _ = tx.send((key, gateway.poster(url).await));
    });
    true
  }

  /// Store finished downloads. Returns how many arrived.
  pub fn drain(&mut self) -> usize {
    let mut count = 0;
    while let Ok((key, result)) = self.rx.try_recv() {
      self.complete(key, result);
      count += 1;
    }
    count
  }

  fn complete(&mut self, key: PosterKey, result: Result<DynamicImage>) {
    let state = match result {
      Ok(image) => PosterState::Ready(image),
      Err(e) => {
        debug!(id = key.1, err = %e, "poster: fetch failed");
        PosterState::Failed
      }
    };
    self.insert(key, state);
  }

  fn insert(&mut self, key: PosterKey, state: PosterState) {
    if let Some((evicted, _)) = self.states.push(key, state)
      && evicted != key
    {
      debug!(id = evicted.1, "poster: evicted");
      if self.resized.as_ref().is_some_and(|(k, ..)| *k == evicted) {
        self.resized = None;
      }
    }
  }

  /// The poster scaled to fill `area`, cached for the last key and size.
  pub fn resized(&mut self, key: PosterKey, area: Rect, mode: DisplayMode) -> Option<&DynamicImage> {
    let Some(PosterState::Ready(image)) = self.states.get(&key) else { return None };
    let stale = match &self.resized {
      Some((k, w, h, _)) => *k != key || *w != area.width || *h != area.height,
      None => true,
    };
    if stale {
      let target_w = area.width as u32;
      // Half-blocks pack two pixel rows into one cell.
      let target_h = match mode {
        DisplayMode::Direct => area.height as u32 * 2,
        _ => area.height as u32,
      };
      let resized = image.resize_to_fill(target_w.max(1), target_h.max(1), FilterType::Triangle);
      self.resized = Some((key, area.width, area.height, resized));
    }
    self.resized.as_ref().map(|(_, _, _, image)| image)
  }
}

// --- Poster Widget ---

pub struct PosterWidget<'a> {
  pub image: &'a DynamicImage,
  pub display_mode: DisplayMode,
}

const ASCII_CHARS: [&str; 10] = [" ", ".", ":", "-", "=", "+", "*", "#", "%", "@"];

impl Widget for PosterWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::Direct => render_direct(self.image, area, buf),
      DisplayMode::Ascii => render_ascii(self.image, area, buf),
      DisplayMode::Off => {}
    }
  }
}

fn clamp_u16(v: u32) -> u16 {
  v.min(u16::MAX as u32) as u16
}

fn render_direct(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let rgb = image.to_rgb8();
  let img_w = rgb.width().min(area.width as u32);
  let img_h = rgb.height();
  let cell_h = img_h.div_ceil(2).min(area.height as u32);

  for y in 0..cell_h {
    for x in 0..img_w {
      let upper = rgb.get_pixel(x, y * 2);
      let lower_y = y * 2 + 1;
      let fg = Color::Rgb(upper[0], upper[1], upper[2]);
      let bg = if lower_y < img_h {
        let lower = rgb.get_pixel(x, lower_y);
        Color::Rgb(lower[0], lower[1], lower[2])
      } else {
        Color::Reset
      };
      buf.set_string(
        area.x.saturating_add(clamp_u16(x)),
        area.y.saturating_add(clamp_u16(y)),
        "▀",
        Style::default().fg(fg).bg(bg),
      );
    }
  }
}

fn render_ascii(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let luma = image.to_luma8();
  let img_w = luma.width().min(area.width as u32);
  let img_h = luma.height().min(area.height as u32);

  for y in 0..img_h {
    for x in 0..img_w {
      let pixel = luma.get_pixel(x, y)[0];
      let idx = ((pixel as f32 / 255.0) * (ASCII_CHARS.len() - 1) as f32).round() as usize;
      buf.set_string(
        area.x.saturating_add(clamp_u16(x)),
        area.y.saturating_add(clamp_u16(y)),
        ASCII_CHARS[idx.min(ASCII_CHARS.len() - 1)],
        Style::default(),
      );
    }
  }
}
