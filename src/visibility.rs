//! Single-shot "notify once visible" watches over a scrolling list.
//!
//! Positions are measured in rows of the scroll container. A watch fires its
//! callback the first time its target overlaps the viewport (grown by the
//! watch's margin on both sides) by at least `threshold` of the target's
//! height, and is removed in the same step. Nothing here knows how rows are
//! drawn.

use tracing::trace;

use crate::constants::constants;

/// Rows `[start, start + len)` a target occupies inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
  pub start: usize,
  pub len: usize,
}

impl Extent {
  pub fn row(index: usize) -> Self {
    Self { start: index, len: 1 }
  }
}

/// The window of rows currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
  pub offset: usize,
  pub height: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserveOptions {
  /// Rows of pre-fetch distance added above and below the viewport.
  pub margin: usize,
  /// Fraction of the target (0.0..=1.0) that must be inside; 0.0 means any overlap.
  pub threshold: f32,
}

impl Default for ObserveOptions {
  fn default() -> Self {
    Self { margin: constants().prefetch_margin_rows, threshold: constants().visibility_threshold }
  }
}

/// Fraction of `extent` inside `viewport` once the viewport is grown by `margin`.
pub fn visible_fraction(extent: Extent, viewport: Viewport, margin: usize) -> f32 {
  let top = viewport.offset.saturating_sub(margin);
  let bottom = viewport.offset + viewport.height + margin;
  if extent.len == 0 {
    return if (top..bottom).contains(&extent.start) { 1.0 } else { 0.0 };
  }
  let end = extent.start + extent.len;
  let overlap = end.min(bottom).saturating_sub(extent.start.max(top));
  overlap as f32 / extent.len as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

struct Watch {
  id: u64,
  extent: Extent,
  options: ObserveOptions,
  on_visible: Box<dyn FnOnce() + Send>,
}

impl Watch {
  fn is_visible(&self, viewport: Viewport) -> bool {
    let fraction = visible_fraction(self.extent, viewport, self.options.margin);
    fraction > 0.0 && fraction >= self.options.threshold
  }
}

/// Registry of pending watches for one scroll container.
#[derive(Default)]
pub struct VisibilityObserver {
  next_id: u64,
  watches: Vec<Watch>,
}

impl VisibilityObserver {
  /// Arm a watch. The callback runs at most once, on the first
  /// [`update`](Self::update) that finds the target visible.
  pub fn observe<F>(&mut self, extent: Extent, options: ObserveOptions, on_visible: F) -> WatchHandle
  where
    F: FnOnce() + Send + 'static,
  {
    self.next_id += 1;
    let id = self.next_id;
    self.watches.push(Watch { id, extent, options, on_visible: Box::new(on_visible) });
    WatchHandle(id)
  }

  /// Disarm a pending watch. Returns `false` if it already fired or was cancelled.
  pub fn cancel(&mut self, handle: WatchHandle) -> bool {
    let before = self.watches.len();
    self.watches.retain(|w| w.id != handle.0);
    self.watches.len() != before
  }

  pub fn is_pending(&self, handle: WatchHandle) -> bool {
    self.watches.iter().any(|w| w.id == handle.0)
  }

  pub fn pending(&self) -> usize {
    self.watches.len()
  }

  /// Disarm everything, e.g. when the list is replaced.
  pub fn clear(&mut self) {
    self.watches.clear();
  }

  /// Evaluate all pending watches against `viewport`, firing and removing the
  /// visible ones. Returns how many fired.
  pub fn update(&mut self, viewport: Viewport) -> usize {
    let (fired, pending): (Vec<Watch>, Vec<Watch>) =
      std::mem::take(&mut self.watches).into_iter().partition(|w| w.is_visible(viewport));
    self.watches = pending;
    let count = fired.len();
    for watch in fired {
      trace!(id = watch.id, start = watch.extent.start, "visibility: watch fired");
      (watch.on_visible)();
    }
    count
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move || {
      c.fetch_add(1, Ordering::SeqCst);
    })
  }

  fn exact() -> ObserveOptions {
    ObserveOptions { margin: 0, threshold: 0.0 }
  }

  // --- visible_fraction ---

  #[test]
  fn fraction_inside_and_outside() {
    let vp = Viewport { offset: 10, height: 5 };
    assert_eq!(visible_fraction(Extent::row(12), vp, 0), 1.0);
    assert_eq!(visible_fraction(Extent::row(15), vp, 0), 0.0);
    assert_eq!(visible_fraction(Extent::row(9), vp, 0), 0.0);
  }

  #[test]
  fn margin_extends_viewport_both_ways() {
    let vp = Viewport { offset: 10, height: 5 };
    assert_eq!(visible_fraction(Extent::row(17), vp, 3), 1.0);
    assert_eq!(visible_fraction(Extent::row(7), vp, 3), 1.0);
    assert_eq!(visible_fraction(Extent::row(18), vp, 3), 0.0);
  }

  #[test]
  fn partial_overlap_fraction() {
    let vp = Viewport { offset: 0, height: 4 };
    assert_eq!(visible_fraction(Extent { start: 2, len: 4 }, vp, 0), 0.5);
  }

  // --- VisibilityObserver ---

  #[test]
  fn fires_exactly_once_while_visible() {
    let mut observer = VisibilityObserver::default();
    let (count, cb) = counter();
    let handle = observer.observe(Extent::row(3), exact(), cb);
    let vp = Viewport { offset: 0, height: 10 };

    assert_eq!(observer.update(vp), 1);
    assert_eq!(observer.update(vp), 0);
    assert_eq!(observer.update(vp), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!observer.is_pending(handle));
  }

  #[test]
  fn waits_until_scrolled_into_view() {
    let mut observer = VisibilityObserver::default();
    let (count, cb) = counter();
    observer.observe(Extent::row(40), exact(), cb);

    observer.update(Viewport { offset: 0, height: 20 });
    assert_eq!(count.load(Ordering::SeqCst), 0);
    observer.update(Viewport { offset: 25, height: 20 });
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn cancelled_watch_never_fires() {
    let mut observer = VisibilityObserver::default();
    let (count, cb) = counter();
    let handle = observer.observe(Extent::row(0), exact(), cb);
    assert!(observer.cancel(handle));
    assert!(!observer.cancel(handle));
    observer.update(Viewport { offset: 0, height: 10 });
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn replacing_a_sentinel_fires_only_the_new_one() {
    let mut observer = VisibilityObserver::default();
    let (old_count, old_cb) = counter();
    let (new_count, new_cb) = counter();
    let old = observer.observe(Extent::row(19), exact(), old_cb);
    observer.cancel(old);
    observer.observe(Extent::row(39), exact(), new_cb);

    observer.update(Viewport { offset: 0, height: 40 });
    assert_eq!(old_count.load(Ordering::SeqCst), 0);
    assert_eq!(new_count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn threshold_requires_enough_of_the_target() {
    let mut observer = VisibilityObserver::default();
    let (count, cb) = counter();
    observer.observe(Extent { start: 8, len: 4 }, ObserveOptions { margin: 0, threshold: 0.75 }, cb);

    observer.update(Viewport { offset: 0, height: 10 });
    assert_eq!(count.load(Ordering::SeqCst), 0);
    observer.update(Viewport { offset: 0, height: 11 });
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn clear_disarms_everything() {
    let mut observer = VisibilityObserver::default();
    let (count, cb) = counter();
    observer.observe(Extent::row(0), exact(), cb);
    observer.clear();
    assert_eq!(observer.pending(), 0);
    observer.update(Viewport { offset: 0, height: 5 });
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }
}
