//! askmynotes - study from your own notes
//!
//! Terminal UI for managing subjects, uploading notes, asking grounded
//! questions and generating study material.

mod app;
mod ui;

use std::io;
use std::sync::Arc;

use askmynotes_core::backend::BackendClient;
use askmynotes_core::{Config, Database, SubjectStore};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::app::App;

fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, not stdout since we have a TUI)
    let _log_guard =
        askmynotes_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("askmynotes TUI starting up");

    // Backend requests run here; the UI loop stays on the main thread
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    // Open database
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let backend = BackendClient::new(&config.backend).context("invalid backend configuration")?;
    tracing::info!(base_url = backend.base_url(), "Using notes backend");

    let store = SubjectStore::open(db, Arc::new(backend), runtime.handle().clone());
    let mut app = App::new(store);

    // Setup terminal
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
        .context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    // Run the main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )
    .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    let pending = app.store.pending_requests();
    if pending > 0 {
        tracing::info!(pending, "Abandoning in-flight backend requests");
    }
    tracing::info!("askmynotes TUI shutting down");

    result
}

/// Run the main application loop.
fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        // Apply settled backend requests
        app.tick();

        // Render
        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events
        if event::poll(std::time::Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                // Dropping files onto the terminal pastes their paths
                Event::Paste(text) => app.handle_paste(&text),
                _ => {}
            }
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    Ok(())
}
