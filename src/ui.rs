use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, AppMode};
use crate::constants::constants;
use crate::pagination::LoadState;
use crate::poster::{PosterState, PosterWidget};
use crate::theme::Theme;
use crate::tmdb::{MediaItem, MediaType};
use crate::visibility::Viewport;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// `top_rated` -> `Top Rated`
pub fn category_label(category: &str) -> String {
  category
    .split(['_', ' '])
    .filter(|w| !w.is_empty())
    .map(|w| {
      let mut chars = w.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

fn rounded_block<'a>(theme: &Theme, title: impl Into<Line<'a>>) -> Block<'a> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
}

fn meta_line(item: &MediaItem) -> String {
  let year = item.year().map(|y| y.to_string()).unwrap_or_else(|| "----".to_string());
  if item.vote_average > 0.0 { format!("{}  ★ {:.1}", year, item.vote_average) } else { year }
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  app.results_viewport = None;

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(2),
    Constraint::Min(5),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  match app.mode {
    AppMode::Detail => render_detail(frame, app, main_area),
    _ => render_browse(frame, app, main_area),
  }
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);

  if app.mode == AppMode::Search && !app.search.suggestions().is_empty() {
    render_suggestions(frame, app, main_area);
  }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let [top, chips] = Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(area);

  let brand = Style::default().fg(theme.accent).add_modifier(Modifier::BOLD);
  let mut spans = vec![Span::styled(" ▶ moviehouse ", brand)];
  for media in [MediaType::Movie, MediaType::Tv] {
    let style = if media == app.media_type {
      Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD)
    } else {
      Style::default().fg(theme.muted)
    };
    spans.push(Span::styled(format!(" {} ", media.label()), style));
    spans.push(Span::raw(" "));
  }
  frame.render_widget(Line::from(spans), top);

  let right = format!("{}  v{} ", app.language, env!("CARGO_PKG_VERSION"));
  let right_area = Rect { x: top.x + top.width.saturating_sub(right.len() as u16), width: right.len() as u16, ..top };
  frame.render_widget(Line::from(Span::styled(right, Style::default().fg(theme.muted))), right_area);

  let chip_spans: Vec<Span> = constants()
    .categories
    .iter()
    .flat_map(|c| {
      let style = if *c == app.category && !app.search_active() {
        Style::default().fg(theme.accent).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
      } else {
        Style::default().fg(theme.muted)
      };
      [Span::styled(category_label(c), style), Span::raw("  ")]
    })
    .collect();
  let chips_line = Line::from([vec![Span::raw(" ")], chip_spans].concat());
  frame.render_widget(chips_line, chips);
}

fn render_browse(frame: &mut Frame, app: &mut App, area: Rect) {
  let show_hero = !app.search_active() && app.browse.featured().is_some() && area.height >= 14;
  let (hero_area, list_area) = if show_hero {
    let [hero, rest] = Layout::vertical([Constraint::Length(5), Constraint::Min(3)]).areas(area);
    (Some(hero), rest)
  } else {
    (None, area)
  };

  if let Some(hero) = hero_area {
    render_hero(frame, app, hero);
  }

  if app.display_mode.shows_posters() && list_area.width >= 60 {
    let [results, preview] =
      Layout::horizontal([Constraint::Percentage(68), Constraint::Percentage(32)]).areas(list_area);
    render_results(frame, app, results);
    if let Some(item) = app.selected_item().cloned() {
      let block = rounded_block(app.theme(), " Poster ");
      let inner = block.inner(preview);
      frame.render_widget(block, preview);
      render_poster(frame, app, &item, inner);
    }
  } else {
    render_results(frame, app, list_area);
  }
}

fn render_hero(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let Some(item) = app.browse.featured() else { return };
  let inner_w = area.width.saturating_sub(4) as usize;
  let overview = item.overview.as_deref().unwrap_or("");
  let lines = vec![
    Line::from(vec![
      Span::styled(truncate_str(&item.title, inner_w.saturating_sub(20)), Style::default().fg(theme.fg).bold()),
      Span::raw("  "),
      Span::styled(meta_line(item), Style::default().fg(theme.rating)),
    ]),
    Line::from(Span::styled(truncate_str(overview, inner_w * 2), Style::default().fg(theme.muted))),
  ];
  let title = format!(" Featured · {} ", category_label(&app.category));
  let paragraph = Paragraph::new(lines)
    .wrap(Wrap { trim: true })
    .block(rounded_block(theme, title).padding(Padding::horizontal(1)));
  frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let title = if app.search_active() {
    let total = app.search.results().accumulator().total_results();
    format!(" Results for '{}' · {} found ", app.search.query().trim(), total)
  } else {
    format!(" {} · {} ", app.media_type.label(), category_label(&app.category))
  };
  let block = rounded_block(theme, title);

  if app.items().is_empty() {
    let search_error = if app.search_active() { app.search.error() } else { None };
    let load_error = match app.load_state() {
      LoadState::Error(e) => Some(e.as_str()),
      _ => None,
    };
    let (msg, style) = match (search_error.or(load_error), app.load_state()) {
      (Some(e), _) => (format!("{}\n\nPress r to retry.", e), Style::default().fg(theme.error)),
      (None, LoadState::Loading) => ("Loading…".to_string(), Style::default().fg(theme.status)),
      _ if app.search.has_pending_timers() => ("Searching…".to_string(), Style::default().fg(theme.status)),
      _ if app.search_active() => ("No results found.".to_string(), Style::default().fg(theme.muted)),
      _ if app.category == crate::app::FAVORITES => {
        ("No favorites yet. Press f on any title to add it.".to_string(), Style::default().fg(theme.muted))
      }
      _ => ("Nothing to show.".to_string(), Style::default().fg(theme.muted)),
    };
    let paragraph =
      Paragraph::new(msg).style(style).alignment(Alignment::Center).wrap(Wrap { trim: true }).block(block);
    frame.render_widget(paragraph, area);
    return;
  }

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;
  let selected = app.list_state.selected();

  let mut items: Vec<ListItem> = app
    .items()
    .iter()
    .enumerate()
    .map(|(i, item)| {
      let is_selected = Some(i) == selected;
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let marker = if app.is_favorite(item) { "♥ " } else { "  " };
      let right = meta_line(item);
      let right_w = right.chars().count();
      let title_max = inner_w.saturating_sub(right_w + 4);
      let title = truncate_str(&item.title, title_max);
      let gap = inner_w.saturating_sub(title.chars().count() + right_w + 2);

      let line = Line::from(vec![
        Span::styled(marker, Style::default().fg(theme.accent)),
        Span::styled(title, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(right, Style::default().fg(theme.muted)),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  match app.load_state() {
    LoadState::Loading => {
      items.push(ListItem::new(Span::styled("  Loading more…", Style::default().fg(theme.status))));
    }
    LoadState::Error(_) => {
      let hint = "  Couldn't load more. Press r to retry.";
      items.push(ListItem::new(Span::styled(hint, Style::default().fg(theme.error))));
    }
    _ => {}
  }

  let list = List::new(items)
    .block(block)
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
  app.results_viewport =
    Some(Viewport { offset: app.list_state.offset(), height: area.height.saturating_sub(2) as usize });
}

fn render_poster(frame: &mut Frame, app: &mut App, item: &MediaItem, area: Rect) {
  let theme = app.theme();
  let display_mode = app.display_mode;
  let key = item.key();
  if let Some(image) = app.posters.resized(key, area, display_mode) {
    frame.render_widget(PosterWidget { image, display_mode }, area);
    return;
  }
  let msg = match app.posters.state(key) {
    Some(PosterState::Loading) => "loading poster…",
    _ if item.poster_path.is_none() => "no poster",
    Some(PosterState::Failed) => "poster unavailable",
    _ => "",
  };
  let paragraph = Paragraph::new(msg).style(Style::default().fg(theme.muted)).alignment(Alignment::Center);
  frame.render_widget(paragraph, Rect { y: area.y + area.height / 2, height: 1.min(area.height), ..area });
}

fn render_detail(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let Some(item) = app.selected_item().cloned() else {
    app.mode = AppMode::Browse;
    return render_browse(frame, app, area);
  };

  let (poster_area, info_area) = if app.display_mode.shows_posters() && area.width >= 50 {
    let [poster, info] = Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)]).areas(area);
    (Some(poster), info)
  } else {
    (None, area)
  };

  if let Some(poster) = poster_area {
    let block = rounded_block(theme, " Poster ");
    let inner = block.inner(poster);
    frame.render_widget(block, poster);
    render_poster(frame, app, &item, inner);
  }

  let inner_w = info_area.width.saturating_sub(4) as usize;
  let favorite = if app.is_favorite(&item) { "♥ favorite" } else { "" };
  let mut lines = vec![
    Line::from(""),
    Line::from(Span::styled(truncate_str(&item.title, inner_w), Style::default().fg(theme.fg).bold())),
    Line::from(vec![
      Span::styled(format!("{}  ", item.media_type.label()), Style::default().fg(theme.muted)),
      Span::styled(meta_line(&item), Style::default().fg(theme.rating)),
      Span::raw("  "),
      Span::styled(favorite, Style::default().fg(theme.accent)),
    ]),
    Line::from(""),
  ];
  if let Some(date) = &item.release_date {
    lines.push(Line::from(vec![
      Span::styled("Released  ", Style::default().fg(theme.muted)),
      Span::styled(date.as_str(), Style::default().fg(theme.fg)),
    ]));
  }
  if item.media_type == MediaType::Tv {
    lines.push(Line::from(vec![
      Span::styled("Episode   ", Style::default().fg(theme.muted)),
      Span::styled(
        format!("S{:02}E{:02}", app.episode.season, app.episode.episode),
        Style::default().fg(theme.accent).bold(),
      ),
    ]));
  }
  lines.push(Line::from(""));
  lines.push(Line::from(Span::styled(
    item.overview.clone().filter(|o| !o.is_empty()).unwrap_or_else(|| "No overview available.".to_string()),
    Style::default().fg(theme.fg),
  )));
  lines.push(Line::from(""));
  lines.push(Line::from(Span::styled(
    truncate_str(&crate::player::item_url(&app.player_host, &item, app.episode), inner_w),
    Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
  )));

  let paragraph = Paragraph::new(lines)
    .wrap(Wrap { trim: false })
    .block(rounded_block(theme, " Details ").padding(Padding::horizontal(1)));
  frame.render_widget(paragraph, info_area);
}

fn render_suggestions(frame: &mut Frame, app: &App, main_area: Rect) {
  let theme = app.theme();
  let suggestions = app.search.suggestions();
  let height = (suggestions.len() as u16 + 2).min(main_area.height);
  let width = main_area.width.min(60);
  let area = Rect { x: main_area.x, y: main_area.y + main_area.height - height, width, height };
  let inner_w = width.saturating_sub(4) as usize;

  let items: Vec<ListItem> = suggestions
    .iter()
    .enumerate()
    .map(|(i, item)| {
      let style = if Some(i) == app.suggestion_index {
        Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD)
      } else {
        Style::default().fg(theme.fg)
      };
      let year = item.year().map(|y| format!(" ({})", y)).unwrap_or_default();
      let title = truncate_str(&item.title, inner_w.saturating_sub(year.len()));
      ListItem::new(Line::from(vec![Span::styled(title, style), Span::styled(year, Style::default().fg(theme.muted))]))
    })
    .collect();

  frame.render_widget(Clear, area);
  let list = List::new(items).block(rounded_block(theme, " Suggestions ")).style(Style::default().bg(theme.bg));
  frame.render_widget(list, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else if let Some(msg) = &app.info_message {
    (format!(" ℹ  {}", msg), Style::default().fg(theme.info))
  } else {
    let count = app.items().len();
    (format!(" {} titles · posters: {}", count, app.display_mode.label()), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Search { theme.accent } else { theme.border };
  let title = format!(" Search {} ", app.media_type.label());
  let input_block = Block::bordered()
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = if visible.is_empty() && app.mode != AppMode::Search {
    Paragraph::new("press / to search").style(Style::default().fg(theme.muted))
  } else {
    Paragraph::new(visible).style(Style::default().fg(theme.fg))
  };
  frame.render_widget(paragraph.block(input_block), area);

  if app.mode == AppMode::Search {
    let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let is_tv = app.selected_item().is_some_and(|i| i.media_type == MediaType::Tv);
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Search => vec![("Enter", "Search"), ("↑/↓", "Suggestions"), ("Tab", "Results"), ("Esc", "Clear")],
    AppMode::Browse => {
      let mut k = vec![("/", "Search"), ("Tab", "Category"), ("m", "Movies/TV"), ("l", "Lang"), ("f", "Fav")];
      k.push(("Enter", "Details"));
      if matches!(app.load_state(), LoadState::Error(_)) || app.last_error.is_some() {
        k.push(("r", "Retry"));
      }
      k.push(if app.search_active() { ("Esc", "Clear") } else { ("q", "Quit") });
      k
    }
    AppMode::Detail => {
      let mut k = vec![("Enter", "Play"), ("f", "Fav")];
      if is_tv {
        k.push(("n/N", "Episode"));
        k.push(("s/S", "Season"));
      }
      k.push(("Esc", "Back"));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw(" "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
