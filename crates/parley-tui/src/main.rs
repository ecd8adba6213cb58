//! parley-tui — Terminal chat with typed replies, spoken output and voice input.
//! Uses Ratatui + Crossterm for rendering.

mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{error, info};

use parley_core::config::Config;
use parley_core::controller::Controller;
use parley_core::render::EventRenderer;

use app::{key_action, App, KeyAction};

#[tokio::main]
async fn main() -> io::Result<()> {
    // Initialize tracing to a file (not stdout, since we own the terminal)
    let _guard = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(|| -> Box<dyn io::Write> {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open("parley-tui.log")
            {
                Ok(file) => Box::new(file),
                Err(_) => Box::new(io::sink()),
            }
        })
        .try_init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = match Config::load_from_dir(&project_root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            return Ok(());
        }
    };

    let renderer = Arc::new(EventRenderer::new());
    let mut events = renderer.subscribe();

    let controller = match Controller::from_config(&config, renderer.clone()) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Failed to start: {:#}", e);
            return Ok(());
        }
    };
    let handle = controller.handle();
    let controller_task = tokio::spawn(controller.run());

    info!(
        "Starting TUI: provider={} model={}",
        config.provider, config.model
    );

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();

    // Main event loop
    loop {
        // Draw
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Handle controller events (non-blocking)
        loop {
            match events.try_recv() {
                Ok(event) => app.handle_event(event),
                Err(TryRecvError::Lagged(n)) => error!("UI lagged {} events", n),
                Err(_) => break,
            }
        }

        // Handle terminal events
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(key) = event::read()? {
                match key_action(key) {
                    Some(KeyAction::Quit) => app.should_quit = true,
                    Some(KeyAction::Dictate) => handle.dictate().await,
                    Some(KeyAction::Stop) => handle.stop().await,
                    Some(KeyAction::Submit) => {
                        if let Some(text) = app.take_submission() {
                            handle.submit(text).await;
                        }
                    }
                    Some(KeyAction::Insert(c)) => app.input.push(c),
                    Some(KeyAction::Backspace) => {
                        app.input.pop();
                    }
                    Some(KeyAction::ScrollUp) => app.scroll_up(),
                    Some(KeyAction::ScrollDown) => app.scroll_down(),
                    None => {}
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    handle.shutdown().await;
    let _ = controller_task.await;

    Ok(())
}
