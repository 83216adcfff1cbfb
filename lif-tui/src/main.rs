//! TUI entrypoint: renders a 2D spike raster (time on X, neurons on Y) for a
//! LIF/ALIF layer driven by constant per-neuron currents.
//! Controls: [s] Step, [r] Run/Pause, [z] Zero state, [x] Random state, [q] Quit
//!
//! Environment:
//! - `LIF_TUI_CONFIG`: JSON file with demo parameters (see `DemoConfig`)
//! - `LIF_TUI_LOG`: file to write `tracing` output to (filter via `RUST_LOG`)

mod backend;
mod app;
mod ui;

use anyhow::{Context, Result};
use backend::{CoreBackend, DemoConfig};
use app::App;
use ui::draw;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute, terminal,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn restore_terminal() -> Result<()> {
    terminal::disable_raw_mode()?;
    // Leave alternate screen and show cursor
    execute!(io::stdout(), terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// The terminal belongs to the raster, so logs only go to a file when asked.
fn init_logging() -> Result<()> {
    let Some(path) = std::env::var_os("LIF_TUI_LOG") else {
        return Ok(());
    };
    let file = File::create(&path).with_context(|| format!("creating log file {:?}", path))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config() -> Result<DemoConfig> {
    match std::env::var_os("LIF_TUI_CONFIG") {
        Some(path) => DemoConfig::load(&PathBuf::from(path)),
        None => Ok(DemoConfig::default()),
    }
}

fn main() -> Result<()> {
    init_logging()?;
    let config = load_config()?;
    let backend = CoreBackend::new(&config)?;
    info!(kind = ?config.kind, neurons = config.neurons, "starting raster");

    // Setup terminal
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen)?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;
    terminal.clear()?;

    // Ensure terminal is restored on panic
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        default_hook(panic_info);
    }));

    let mut app = App::new(backend, 80); // raster width (columns)
    let result = run(&mut terminal, &mut app);

    // Cleanup
    restore_terminal()?;
    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<CoreBackend>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        draw(terminal, app)?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_millis(0));

        if event::poll(timeout)? {
            if let CEvent::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char('s') => app.step()?,
                    KeyCode::Char('r') => app.toggle_running(),
                    KeyCode::Char('z') => app.reset(false)?,
                    KeyCode::Char('x') => app.reset(true)?,
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            if app.running {
                app.step()?;
            }
            last_tick = Instant::now();
        }
    }
}
