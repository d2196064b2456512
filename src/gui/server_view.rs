//! Status screen for the acquisition server.

use crate::pipeline::PipelineOutput;

use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

/// Everything the server status screen shows for one frame.
pub struct ServerView<'a> {
    /// Name of the signal source.
    pub source: &'a str,
    /// The latest pipeline tick.
    pub output: PipelineOutput,
    /// Raw beta-power threshold the scorer uses.
    pub threshold: f64,
    /// Where scores are being sent, as `role -> address`.
    pub destinations: &'a [String],
    /// Datagrams sent.
    pub sent: u64,
    /// Datagrams that failed to send.
    pub failed: u64,
}

/// Draws the server status into `frame`.
pub fn draw_server(frame: &mut Frame, view: &ServerView) {
    let instructions = Title::from(Line::from(vec![
        " Reset scores ".into(),
        "<R>".magenta().bold(),
        " Threshold ".into(),
        "<+>/<->".magenta().bold(),
        " Quit ".into(),
        "<Q> ".magenta().bold(),
    ]));
    let outer = Block::default()
        .title(Title::from(" Focus Server ".magenta().bold()).alignment(Alignment::Center))
        .title(
            instructions
                .alignment(Alignment::Center)
                .position(Position::Bottom),
        )
        .borders(Borders::ALL);
    let area = outer.inner(frame.size());
    frame.render_widget(outer, frame.size());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(4)])
        .split(area);

    let out = view.output;
    let gauge = Gauge::default()
        .block(Block::default().title(" Focus score ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(if out.ready { Color::Green } else { Color::Cyan }))
        .ratio(out.score.clamp(0.0, 1.0))
        .label(format!("{:.3}{}", out.score, if out.ready { "  READY" } else { "" }));
    frame.render_widget(gauge, rows[0]);

    let mut lines = vec![
        Line::from(format!("Source: {}", view.source)),
        Line::from(format!(
            "Beta power: {:.2}  |  threshold {:.1}",
            out.beta_power, view.threshold
        )),
        Line::from(format!("Sent {}  |  failed {}", view.sent, view.failed)),
    ];
    lines.extend(view.destinations.iter().map(|d| Line::from(format!("  -> {}", d))));
    frame.render_widget(Paragraph::new(lines), rows[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    #[test]
    fn shows_score_and_destinations() {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        let destinations = vec!["game 127.0.0.1:5005".to_owned()];
        terminal
            .draw(|f| {
                draw_server(
                    f,
                    &ServerView {
                        source: "Synthetic",
                        output: PipelineOutput {
                            beta_power: 81.5,
                            score: 0.75,
                            ready: true,
                        },
                        threshold: 70.0,
                        destinations: &destinations,
                        sent: 12,
                        failed: 0,
                    },
                )
            })
            .unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("0.750  READY"));
        assert!(text.contains("81.50"));
        assert!(text.contains("game 127.0.0.1:5005"));
    }
}
