// TUI rendering: 2D spike raster (time on X, neurons on Y) + status panel.

use std::io::Stdout;

use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::Text,
    widgets::{Block, Borders, Paragraph},
    Terminal,
};

use crate::app::App;
use crate::backend::SnnBackend;

/// Draws the UI each frame:
/// - Top: Spike raster grid as rows (neurons) x columns (time, circular).
/// - Bottom: Status including tick, model, spike counts, mean potential, controls.
pub fn draw<B: SnnBackend>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &App<B>,
) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([Constraint::Percentage(80), Constraint::Percentage(20)].as_ref())
            .split(f.size());

        // Each row: "nXX |....."
        let lines: Vec<String> = app
            .raster
            .iter()
            .enumerate()
            .map(|(row_idx, row)| format!("n{:02} |{}", row_idx, row.iter().collect::<String>()))
            .collect();

        let raster_text = Text::from(lines.join("\n"));
        let raster_widget = Paragraph::new(raster_text)
            .block(
                Block::default()
                    .title(format!("{} Spike Raster  (time →)", app.backend.kind()))
                    .borders(Borders::ALL),
            )
            .style(Style::default().fg(Color::White));
        f.render_widget(raster_widget, chunks[0]);

        // Status and controls
        let status = format!(
            "Tick: {} | {} x{} | Spikes: {} (total {}) | Mean V: {:.3} | Running: {}\n\
             Controls: [s] Step  [r] Run/Pause  [z] Zero state  [x] Random state  [q] Quit",
            app.tick,
            app.backend.kind(),
            app.backend.neurons(),
            app.last_spikes,
            app.total_spikes,
            app.mean_membrane(),
            if app.running { "yes" } else { "no" }
        );
        let status_widget = Paragraph::new(status)
            .style(Style::default().fg(Color::Cyan))
            .block(Block::default().title("Status").borders(Borders::ALL));
        f.render_widget(status_widget, chunks[1]);
    })?;
    Ok(())
}