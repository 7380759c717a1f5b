mod app;
mod config;
mod constants;
mod display;
mod error;
mod input;
mod pagination;
mod player;
mod poster;
mod search;
#[cfg(test)]
mod testing;
mod theme;
mod tmdb;
mod ui;
mod visibility;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use directories::ProjectDirs;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::{App, Startup};
use config::Config;
use constants::constants;
use display::CliDisplayMode;
use tmdb::{MediaType, TmdbClient};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(
  author,
  version = env!("CARGO_PKG_VERSION"),
  about = "Browse and search movies and TV shows from the terminal",
  long_about = None
)]
struct Args {
  /// TMDB API key (v3)
  #[arg(long, env = "TMDB_API_KEY", hide_env_values = true)]
  api_key: Option<String>,

  /// Start with movies or TV shows (default: last used)
  #[arg(short, long)]
  media_type: Option<MediaType>,

  /// Category to open: trending, popular, top_rated, a genre name or id, lang:<code>, favorites
  #[arg(short, long)]
  category: Option<String>,

  /// Content language, e.g. en-US
  #[arg(short, long)]
  language: Option<String>,

  /// Embed player host used for playback links
  #[arg(long, env = "MOVIEHOUSE_PLAYER_HOST")]
  player_host: Option<String>,

  /// Poster display mode: 'auto', 'direct', 'ascii', or 'off' (default: auto-detect)
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Print shell completions and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<Shell>,
}

impl Args {
  /// Flags win over saved preferences, which win over built-in defaults.
  fn startup(&self, config: &Config) -> Startup {
    let c = constants();
    Startup {
      media_type: self.media_type.unwrap_or(config.media_type),
      category: self
        .category
        .clone()
        .or_else(|| config.category.clone())
        .or_else(|| c.categories.first().cloned())
        .unwrap_or_else(|| "trending".to_string()),
      language: self
        .language
        .clone()
        .or_else(|| config.language.clone())
        .or_else(|| c.languages.first().cloned())
        .unwrap_or_else(|| "en-US".to_string()),
      player_host: self
        .player_host
        .clone()
        .or_else(|| config.player_host.clone())
        .unwrap_or_else(|| c.default_player_host.clone()),
      display_mode: display::resolve_display_mode(self.display_mode),
    }
  }
}

// --- Logging ---

/// Log to a daily file under the data dir; the terminal belongs to the UI.
fn init_logging() -> Option<WorkerGuard> {
  let dirs = ProjectDirs::from("", "", "moviehouse")?;
  let log_dir = dirs.data_dir().join("logs");
  std::fs::create_dir_all(&log_dir).ok()?;

  let appender = tracing_appender::rolling::daily(&log_dir, "moviehouse.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("MOVIEHOUSE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).try_init().ok()?;
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    clap_complete::generate(shell, &mut Args::command(), "moviehouse", &mut std::io::stdout());
    return Ok(());
  }

  let _guard = init_logging();
  info!(version = env!("CARGO_PKG_VERSION"), "moviehouse starting");

  let config = Config::load();
  let startup = args.startup(&config);
  let client = TmdbClient::new(args.api_key.as_deref()).context("Failed to build HTTP client")?;
  let mut app = App::new(client, config, startup);

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, &mut app).await;
  ratatui::restore();
  info!("moviehouse exiting");
  result
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  app.start();

  loop {
    app.check_pending();

    terminal.draw(|frame| ui::ui(frame, app)).context("Failed to draw frame")?;
    app.update_visibility();

    // Yield so spawned fetches make progress between frames.
    tokio::task::yield_now().await;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  Ok(())
}
