use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, AppMode};
use crate::tmdb::MediaType;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Apply a line-editing key to `input`. Returns `true` when the text changed.
pub fn edit_line(input: &mut String, cursor: &mut usize, code: KeyCode) -> bool {
  match code {
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(input, *cursor);
      input.insert(byte_idx, c);
      *cursor += 1;
      true
    }
    KeyCode::Backspace if *cursor > 0 => {
      *cursor -= 1;
      let byte_idx = char_to_byte_index(input, *cursor);
      input.remove(byte_idx);
      true
    }
    KeyCode::Delete if *cursor < input.chars().count() => {
      let byte_idx = char_to_byte_index(input, *cursor);
      input.remove(byte_idx);
      true
    }
    KeyCode::Left => {
      *cursor = cursor.saturating_sub(1);
      false
    }
    KeyCode::Right => {
      if *cursor < input.chars().count() {
        *cursor += 1;
      }
      false
    }
    KeyCode::Home => {
      *cursor = 0;
      false
    }
    KeyCode::End => {
      *cursor = input.chars().count();
      false
    }
    _ => false,
  }
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t') {
    app.next_theme();
    return;
  }

  app.info_message = None;
  match app.mode {
    AppMode::Search => handle_search_key(app, key),
    AppMode::Browse => handle_browse_key(app, key),
    AppMode::Detail => handle_detail_key(app, key),
  }
}

fn handle_search_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      app.clear_error();
      app.submit_search();
    }
    KeyCode::Esc => {
      if app.suggestion_index.is_some() || !app.search.suggestions().is_empty() {
        app.suggestion_index = None;
        app.search.dismiss_suggestions();
      } else if !app.input.is_empty() {
        app.clear_search();
      } else {
        app.mode = AppMode::Browse;
      }
    }
    KeyCode::Down => app.select_suggestion(true),
    KeyCode::Up => app.select_suggestion(false),
    KeyCode::Tab => {
      app.search.dismiss_suggestions();
      app.suggestion_index = None;
      app.mode = AppMode::Browse;
    }
    code => {
      if edit_line(&mut app.input, &mut app.cursor_position, code) {
        app.clear_error();
        app.on_input_changed();
      }
    }
  }
}

fn handle_browse_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char('q') => app.should_quit = true,
    KeyCode::Esc => {
      if app.search_active() {
        app.clear_search();
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Char('/') | KeyCode::Char('s') => {
      app.cursor_position = app.input.chars().count();
      app.mode = AppMode::Search;
    }
    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
    KeyCode::Tab => {
      app.clear_error();
      app.next_category(true);
    }
    KeyCode::BackTab => {
      app.clear_error();
      app.next_category(false);
    }
    KeyCode::Char('m') => {
      app.clear_error();
      app.toggle_media_type();
    }
    KeyCode::Char('l') => {
      app.clear_error();
      app.next_language();
    }
    KeyCode::Char('f') => app.toggle_favorite(),
    KeyCode::Char('r') => app.retry(),
    KeyCode::Enter => {
      if app.selected_item().is_some() {
        app.mode = AppMode::Detail;
      }
    }
    _ => {}
  }
}

fn handle_detail_key(app: &mut App, key: event::KeyEvent) {
  let is_tv = app.selected_item().is_some_and(|item| item.media_type == MediaType::Tv);
  match key.code {
    KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => app.mode = AppMode::Browse,
    KeyCode::Enter | KeyCode::Char('p') => app.play_selected(),
    KeyCode::Char('f') => app.toggle_favorite(),
    KeyCode::Char('n') if is_tv => app.episode.next_episode(),
    KeyCode::Char('N') if is_tv => app.episode.prev_episode(),
    KeyCode::Char('s') if is_tv => app.episode.next_season(),
    KeyCode::Char('S') if is_tv => app.episode.prev_season(),
    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
    _ => {}
  }
}
