use ratatui::style::Color;

/// Colors used across the UI.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub info: Color,
  pub rating: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "marquee",
    bg: Color::Rgb(16, 16, 22),
    fg: Color::Rgb(228, 228, 235),
    accent: Color::Rgb(229, 9, 20),
    muted: Color::Rgb(128, 128, 140),
    border: Color::Rgb(60, 60, 72),
    highlight_fg: Color::Rgb(255, 255, 255),
    highlight_bg: Color::Rgb(70, 20, 26),
    stripe_bg: Color::Rgb(22, 22, 30),
    status: Color::Rgb(240, 190, 80),
    error: Color::Rgb(255, 95, 95),
    info: Color::Rgb(120, 200, 160),
    rating: Color::Rgb(245, 197, 24),
    key_fg: Color::Rgb(16, 16, 22),
    key_bg: Color::Rgb(160, 160, 172),
  },
  Theme {
    name: "matinee",
    bg: Color::Rgb(250, 247, 240),
    fg: Color::Rgb(40, 36, 32),
    accent: Color::Rgb(180, 60, 30),
    muted: Color::Rgb(130, 120, 110),
    border: Color::Rgb(200, 190, 175),
    highlight_fg: Color::Rgb(20, 18, 16),
    highlight_bg: Color::Rgb(238, 214, 190),
    stripe_bg: Color::Rgb(243, 239, 230),
    status: Color::Rgb(160, 110, 20),
    error: Color::Rgb(190, 30, 30),
    info: Color::Rgb(40, 130, 90),
    rating: Color::Rgb(190, 140, 0),
    key_fg: Color::Rgb(250, 247, 240),
    key_bg: Color::Rgb(110, 100, 92),
  },
  Theme {
    name: "terminal",
    bg: Color::Reset,
    fg: Color::Reset,
    accent: Color::Cyan,
    muted: Color::DarkGray,
    border: Color::DarkGray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Cyan,
    stripe_bg: Color::Reset,
    status: Color::Yellow,
    error: Color::Red,
    info: Color::Green,
    rating: Color::Yellow,
    key_fg: Color::Black,
    key_bg: Color::Gray,
  },
];

/// Index of the theme called `name`, falling back to the first.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(n))).unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_is_case_insensitive() {
    assert_eq!(theme_index(Some("Matinee")), 1);
  }

  #[test]
  fn unknown_names_fall_back() {
    assert_eq!(theme_index(Some("neon")), 0);
    assert_eq!(theme_index(None), 0);
  }
}
