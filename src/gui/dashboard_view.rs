//! Terminal rendering of the observer dashboard.

use crate::clock::Seconds;
use crate::readiness::{ReadyLogEntry, ReadyStatus};

use chrono::{DateTime, Local};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

/// Everything the dashboard screen shows for one frame.
pub struct DashboardView<'a> {
    /// Smoothed attention, 0 to 100.
    pub attention: f64,
    /// Attention that counts as focused, 0 to 100.
    pub focus_threshold: f64,
    /// Whether scores are currently arriving.
    pub live: bool,
    /// The producer's ready flag, if it sends one.
    pub ready_flag: Option<bool>,
    /// Progress of the ready window.
    pub status: ReadyStatus,
    /// `(seconds since start, attention)`, oldest first.
    pub trace: &'a [(f64, f64)],
    /// Completed ready windows, oldest first.
    pub log: &'a [ReadyLogEntry],
}

fn clock_time(secs: Seconds) -> String {
    DateTime::from_timestamp(secs as i64, 0)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{:.0}s", secs))
}

fn ready_widget(status: ReadyStatus) -> Gauge<'static> {
    let block = Block::default().title(" Readiness ").borders(Borders::ALL);
    match status {
        ReadyStatus::Ready => Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
            .ratio(1.0)
            .label("READY"),
        ReadyStatus::Charging {
            progress,
            seconds_left,
        } => Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(progress.clamp(0.0, 1.0))
            .label(format!(
                "Charging {:.0}% ({:.1}s left)",
                progress * 100.0,
                seconds_left
            )),
    }
}

fn trace_chart<'a>(trace: &'a [(f64, f64)], threshold_line: &'a [(f64, f64)]) -> Chart<'a> {
    let (start, end) = match (trace.first(), trace.last()) {
        (Some(first), Some(last)) if last.0 > first.0 => (first.0, last.0),
        (Some(first), _) => (first.0, first.0 + 1.0),
        _ => (0.0, 1.0),
    };
    Chart::new(vec![
        Dataset::default()
            .name("Attention")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(trace),
        Dataset::default()
            .name("Threshold")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(threshold_line),
    ])
    .block(Block::default().title(" Attention ").borders(Borders::ALL))
    .x_axis(
        Axis::default()
            .style(Style::default().fg(Color::White))
            .bounds([start, end]),
    )
    .y_axis(
        Axis::default()
            .style(Style::default().fg(Color::White))
            .bounds([0.0, 100.0])
            .labels(["0", "50", "100"].iter().cloned().map(Span::from).collect()),
    )
}

/// Draws the dashboard into `frame`.
pub fn draw_dashboard(frame: &mut Frame, view: &DashboardView) {
    let instructions = Title::from(Line::from(vec![
        " Restart race ".into(),
        "<R>".magenta().bold(),
        " Calibrate ".into(),
        "<C>".magenta().bold(),
        " Quit race ".into(),
        "<X>".magenta().bold(),
        " Exit ".into(),
        "<Q> ".magenta().bold(),
    ]));
    let outer = Block::default()
        .title(Title::from(" Focus Dashboard ".magenta().bold()).alignment(Alignment::Center))
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
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
        ])
        .split(area);

    let link = if view.live {
        "receiving".green()
    } else {
        "no signal".red()
    };
    let flag = match view.ready_flag {
        Some(true) => "producer says ready",
        Some(false) => "producer says not ready",
        None => "no ready flag",
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            " Link: ".into(),
            link,
            format!("  |  {}", flag).into(),
        ])),
        rows[0],
    );

    let focused = view.attention >= view.focus_threshold;
    let attention = Gauge::default()
        .block(Block::default().title(" Focus ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(if focused { Color::Green } else { Color::Yellow }))
        .ratio((view.attention / 100.0).clamp(0.0, 1.0))
        .label(format!(
            "{:.0} / 100 (focused at {:.0})",
            view.attention, view.focus_threshold
        ));
    frame.render_widget(attention, rows[1]);
    frame.render_widget(ready_widget(view.status), rows[2]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(rows[3]);

    let threshold_line: Vec<(f64, f64)> = match (view.trace.first(), view.trace.last()) {
        (Some(first), Some(last)) => vec![
            (first.0, view.focus_threshold),
            (last.0, view.focus_threshold),
        ],
        _ => Vec::new(),
    };
    frame.render_widget(trace_chart(view.trace, &threshold_line), columns[0]);

    let log: Vec<ListItem> = view
        .log
        .iter()
        .rev()
        .map(|entry| {
            ListItem::new(format!(
                "{}  held {:.1}s",
                clock_time(entry.started_at),
                entry.held
            ))
        })
        .collect();
    frame.render_widget(
        List::new(log).block(Block::default().title(" Ready log ").borders(Borders::ALL)),
        columns[1],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn screen(view: &DashboardView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| draw_dashboard(f, view)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn charging_without_signal() {
        let text = screen(&DashboardView {
            attention: 50.0,
            focus_threshold: 70.0,
            live: false,
            ready_flag: None,
            status: ReadyStatus::Charging {
                progress: 0.25,
                seconds_left: 6.0,
            },
            trace: &[],
            log: &[],
        });
        assert!(text.contains("no signal"));
        assert!(text.contains("Charging 25%"));
        assert!(text.contains("50 / 100"));
    }

    #[test]
    fn ready_with_log() {
        let trace = [(0.0, 60.0), (1.0, 80.0), (2.0, 90.0)];
        let log = [ReadyLogEntry {
            started_at: 1_700_000_000.0,
            held: 4.0,
        }];
        let text = screen(&DashboardView {
            attention: 90.0,
            focus_threshold: 70.0,
            live: true,
            ready_flag: Some(true),
            status: ReadyStatus::Ready,
            trace: &trace,
            log: &log,
        });
        assert!(text.contains("READY"));
        assert!(text.contains("receiving"));
        assert!(text.contains("held 4.0s"));
    }
}
