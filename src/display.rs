use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliDisplayMode {
  Auto,
  Direct,
  Ascii,
  Off,
}

/// How posters are drawn into terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  /// Posters disabled; no image requests are made.
  Off,
  Ascii,
  /// True-color half-block cells.
  Direct,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Off => "off",
      DisplayMode::Ascii => "ascii",
      DisplayMode::Direct => "half-block",
    }
  }

  pub fn shows_posters(self) -> bool {
    self != DisplayMode::Off
  }
}

/// Pick half-block rendering when the terminal advertises 24-bit color.
pub fn detect_display_mode(colorterm: Option<&str>) -> DisplayMode {
  let colorterm = colorterm.unwrap_or_default().to_lowercase();
  if colorterm == "truecolor" || colorterm == "24bit" { DisplayMode::Direct } else { DisplayMode::Ascii }
}

pub fn resolve_display_mode(cli: CliDisplayMode) -> DisplayMode {
  match cli {
    CliDisplayMode::Auto => detect_display_mode(std::env::var("COLORTERM").ok().as_deref()),
    CliDisplayMode::Direct => DisplayMode::Direct,
    CliDisplayMode::Ascii => DisplayMode::Ascii,
    CliDisplayMode::Off => DisplayMode::Off,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truecolor_terminals_get_half_blocks() {
    assert_eq!(detect_display_mode(Some("truecolor")), DisplayMode::Direct);
    assert_eq!(detect_display_mode(Some("24BIT")), DisplayMode::Direct);
  }

  #[test]
  fn everything_else_falls_back_to_ascii() {
    assert_eq!(detect_display_mode(None), DisplayMode::Ascii);
    assert_eq!(detect_display_mode(Some("xterm")), DisplayMode::Ascii);
  }
}
