use std::path::PathBuf;

use crate::gui::{
    error::GuiError,
    fold_until_stop::{enter_terminal, leave_terminal},
};

use crossterm::event::{self, KeyCode, KeyEventKind};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

/// What one key press does to the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Moved(usize),
    Chosen(usize),
    Cancelled,
    Ignored,
}

fn on_key(cursor: usize, n_ports: usize, code: KeyCode) -> Selection {
    match code {
        KeyCode::Down => Selection::Moved((cursor + 1) % n_ports),
        KeyCode::Up => Selection::Moved((cursor + n_ports - 1) % n_ports),
        KeyCode::Enter => Selection::Chosen(cursor),
        KeyCode::Char('q') | KeyCode::Esc => Selection::Cancelled,
        _ => Selection::Ignored,
    }
}

/// Lets the user pick the serial port the board's dongle is on. `None` when
/// there are no ports or the user quits.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    if available_ports.is_empty() {
        return Ok(None);
    }

    let mut terminal = enter_terminal()?;
    let res = select(&mut terminal, &available_ports);
    leave_terminal(&mut terminal)?;

    Ok(res?.map(|i| available_ports.swap_remove(i)))
}

fn select<B: Backend>(
    terminal: &mut Terminal<B>,
    available_ports: &[PathBuf],
) -> Result<Option<usize>, GuiError> {
    let n_ports = available_ports.len();
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    loop {
        let title = Title::from(" Select the EEG board's serial port ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if event::poll(std::time::Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match on_key(cursor, n_ports, key.code) {
                    Selection::Moved(next) => cursor = next,
                    Selection::Chosen(i) => return Ok(Some(i)),
                    Selection::Cancelled => return Ok(None),
                    Selection::Ignored => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps() {
        assert_eq!(on_key(0, 3, KeyCode::Up), Selection::Moved(2));
        assert_eq!(on_key(2, 3, KeyCode::Down), Selection::Moved(0));
        assert_eq!(on_key(1, 3, KeyCode::Enter), Selection::Chosen(1));
        assert_eq!(on_key(1, 3, KeyCode::Char('q')), Selection::Cancelled);
        assert_eq!(on_key(1, 3, KeyCode::Char('x')), Selection::Ignored);
    }

    #[test]
    fn no_ports_no_prompt() {
        assert!(device_selector(Vec::new()).unwrap().is_none());
    }
}
