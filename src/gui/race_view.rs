//! Terminal rendering of the race. Drawing only reads a [`GameData`]
//! snapshot; nothing here changes game state.

use crate::leaderboard::RaceRecord;
use crate::race::{GameData, GameState};

use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
};

/// Everything the race screen shows for one frame.
pub struct RaceView<'a> {
    /// Snapshot of the race state machine.
    pub data: &'a GameData,
    /// Name shown in the header and saved on finish.
    pub player: &'a str,
    /// Fraction of the calibration window elapsed.
    pub calibration_progress: f64,
    /// Raw beta-power threshold from the last calibration run.
    pub recommended_threshold: Option<f64>,
    /// Whether focus scores are currently arriving.
    pub live: bool,
    /// Whether calibration can run in this process.
    pub can_calibrate: bool,
    /// Best records, fastest first.
    pub top: &'a [RaceRecord],
}

/// The road from start to finish with the car placed by `progress`
/// (percent).
pub fn track_line(progress: f64, width: usize) -> String {
    if width < 3 {
        return ">".repeat(width.min(1));
    }
    let road = width - 2;
    let at = ((progress.clamp(0.0, 100.0) / 100.0) * (road - 1) as f64).round() as usize;
    let mut line = String::with_capacity(width);
    line.push('|');
    for i in 0..road {
        line.push(if i == at { '>' } else if i < at { '=' } else { '-' });
    }
    line.push('|');
    line
}

fn help(view: &RaceView) -> Line<'static> {
    let key = |k: &'static str| k.magenta().bold();
    match view.data.state {
        GameState::Menu => {
            let mut spans = vec![" Race ".into(), key("<Space>")];
            if view.can_calibrate {
                spans.extend([" Calibrate ".into(), key("<C>")]);
            }
            spans.extend([" Quit ".into(), key("<Q> ")]);
            Line::from(spans)
        }
        GameState::Calibrating => Line::from(vec![
            " Relax and focus on the road ".into(),
            " Cancel ".into(),
            key("<R> "),
        ]),
        GameState::Racing => Line::from(vec![
            " Focus to drive ".into(),
            " Restart ".into(),
            key("<R>"),
            " Quit ".into(),
            key("<Q> "),
        ]),
        GameState::Finished => Line::from(vec![
            " Race again ".into(),
            key("<Space>"),
            " Menu ".into(),
            key("<R>"),
            " Quit ".into(),
            key("<Q> "),
        ]),
    }
}

fn status(view: &RaceView) -> Paragraph<'static> {
    let data = view.data;
    let mut lines = vec![Line::from(format!(
        "{}  |  {}  |  time {:.2}s  |  streak {} (best {})",
        view.player, data.state, data.race_time, data.focus_streak, data.max_focus_streak
    ))];
    match data.state {
        GameState::Finished => lines.push(Line::from(Span::styled(
            format!("Finished in {:.2}s!", data.race_time),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ))),
        _ if !view.live => lines.push(Line::from("Waiting for focus scores...".yellow())),
        _ => {}
    }
    if let Some(threshold) = view.recommended_threshold {
        lines.push(Line::from(format!(
            "Calibration suggests a raw threshold of {:.1}",
            threshold
        )));
    }
    Paragraph::new(lines)
}

fn focus_gauge(data: &GameData) -> Gauge<'static> {
    let focused = data.current_focus >= data.focus_threshold;
    Gauge::default()
        .block(Block::default().title(" Focus ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(if focused { Color::Green } else { Color::Yellow }))
        .ratio(data.current_focus.clamp(0.0, 1.0))
        .label(format!(
            "{:.0}% (drive at {:.0}%)",
            data.current_focus * 100.0,
            data.focus_threshold * 100.0
        ))
}

fn leaderboard(top: &[RaceRecord]) -> List<'static> {
    let items: Vec<ListItem> = top
        .iter()
        .enumerate()
        .map(|(i, r)| {
            ListItem::new(format!(
                "{:>2}. {:<12} {:>7.2}s  streak {}",
                i + 1,
                r.player_name,
                r.race_time,
                r.max_focus_streak
            ))
        })
        .collect();
    List::new(items).block(Block::default().title(" Leaderboard ").borders(Borders::ALL))
}

/// Draws the race into `frame`.
pub fn draw_race(frame: &mut Frame, view: &RaceView) {
    let outer = Block::default()
        .title(Title::from(" Focus Race ".magenta().bold()).alignment(Alignment::Center))
        .title(
            Title::from(help(view))
                .alignment(Alignment::Center)
                .position(block::Position::Bottom),
        )
        .borders(Borders::ALL);
    let area = outer.inner(frame.size());
    frame.render_widget(outer, frame.size());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(area);

    frame.render_widget(status(view), rows[0]);

    let track_block = Block::default().title(" Track ").borders(Borders::ALL);
    let width = track_block.inner(rows[1]).width as usize;
    frame.render_widget(
        Paragraph::new(track_line(view.data.progress, width)).block(track_block),
        rows[1],
    );

    if view.data.state == GameState::Calibrating {
        let gauge = Gauge::default()
            .block(Block::default().title(" Calibrating ").borders(Borders::ALL))
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(view.calibration_progress.clamp(0.0, 1.0));
        frame.render_widget(gauge, rows[2]);
    } else {
        frame.render_widget(focus_gauge(view.data), rows[2]);
    }

    frame.render_widget(leaderboard(view.top), rows[3]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::{RaceConfig, RaceStateMachine};
    use ratatui::backend::TestBackend;

    fn screen(view: &RaceView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(70, 20)).unwrap();
        terminal.draw(|f| draw_race(f, view)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn track_places_car() {
        assert_eq!(track_line(0.0, 7), "|>----|");
        assert_eq!(track_line(100.0, 7), "|====>|");
        assert_eq!(track_line(250.0, 7), "|====>|");
        assert_eq!(track_line(50.0, 2), ">");
    }

    #[test]
    fn menu_screen() {
        let data = RaceStateMachine::new(RaceConfig::default()).get_game_data();
        let top = vec![RaceRecord {
            player_name: "Ada".to_owned(),
            race_time: 12.5,
            max_focus_streak: 40,
            timestamp: String::new(),
        }];
        let text = screen(&RaceView {
            data: &data,
            player: "Bob",
            calibration_progress: 0.0,
            recommended_threshold: Some(42.0),
            live: false,
            can_calibrate: true,
            top: &top,
        });
        assert!(text.contains("Focus Race"));
        assert!(text.contains("Waiting for focus scores"));
        assert!(text.contains("Ada"));
        assert!(text.contains("42.0"));
        assert!(text.contains("Calibrate"));
    }
}
