use std::{
    io::{self, stdout, Stdout},
    ops::ControlFlow,
    time::{Duration, Instant},
};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{prelude::*, Terminal};

pub(crate) type Tui = Terminal<CrosstermBackend<Stdout>>;

pub(crate) fn enter_terminal() -> Result<Tui, GuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;
    Ok(terminal)
}

pub(crate) fn leave_terminal(terminal: &mut Tui) -> Result<(), GuiError> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Ctrl-C arrives as a key in raw mode; it always ends the loop.
fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// The next pressed key, without waiting.
fn next_key() -> io::Result<Option<KeyEvent>> {
    if event::poll(Duration::ZERO)? {
        if let event::Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(Some(key));
            }
        }
    }
    Ok(None)
}

/// Runs a state machine in the terminal until it asks to stop.
///
/// The loop is a fold: `init` is the starting state, and once per
/// `tick_rate` `step` gets the state along with the key pressed since the
/// last tick, if any, then `draw` renders it. Everything runs on the calling
/// thread, so the state does not need to be `Send`. The loop ends when
/// `step` breaks or on Ctrl-C, and the final state is handed back with the
/// terminal restored.
pub fn fold_until_stop<T, F, D>(
    init: T,
    tick_rate: Duration,
    step: F,
    draw: D,
) -> Result<T, GuiError>
where
    F: FnMut(&mut T, Option<KeyCode>) -> ControlFlow<()>,
    D: FnMut(&mut Frame, &T),
{
    let mut terminal = enter_terminal()?;
    let mut state = init;
    let res = fold_with(&mut terminal, next_key, &mut state, tick_rate, step, draw);
    leave_terminal(&mut terminal)?;
    res.map(|_| state)
}

fn fold_with<B, K, T, F, D>(
    terminal: &mut Terminal<B>,
    mut keys: K,
    state: &mut T,
    tick_rate: Duration,
    mut step: F,
    mut draw: D,
) -> Result<(), GuiError>
where
    B: Backend,
    K: FnMut() -> io::Result<Option<KeyEvent>>,
    F: FnMut(&mut T, Option<KeyCode>) -> ControlFlow<()>,
    D: FnMut(&mut Frame, &T),
{
    loop {
        let started = Instant::now();

        let key = keys()?;
        if key.as_ref().is_some_and(is_interrupt) {
            return Ok(());
        }
        if step(state, key.map(|k| k.code)).is_break() {
            return Ok(());
        }
        terminal.draw(|frame| draw(frame, state))?;

        let spent = started.elapsed();
        if spent < tick_rate {
            spin_sleep::sleep(tick_rate - spent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, widgets::Paragraph};
    use std::collections::VecDeque;

    fn scripted(keys: Vec<KeyEvent>) -> impl FnMut() -> io::Result<Option<KeyEvent>> {
        let mut keys: VecDeque<_> = keys.into();
        move || Ok(keys.pop_front())
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn folds_until_step_breaks() {
        let mut terminal = Terminal::new(TestBackend::new(20, 3)).unwrap();
        let mut count = 0u32;
        fold_with(
            &mut terminal,
            scripted(vec![]),
            &mut count,
            Duration::ZERO,
            |n, _| {
                *n += 1;
                if *n == 4 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
            |frame, n| frame.render_widget(Paragraph::new(format!("tick {}", n)), frame.size()),
        )
        .unwrap();
        assert_eq!(count, 4);
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("tick 3"));
    }

    #[test]
    fn keys_reach_the_step() {
        let mut terminal = Terminal::new(TestBackend::new(10, 1)).unwrap();
        let mut seen = Vec::new();
        fold_with(
            &mut terminal,
            scripted(vec![press(KeyCode::Char('r')), press(KeyCode::Char('q'))]),
            &mut seen,
            Duration::ZERO,
            |seen, key| {
                seen.push(key);
                if key == Some(KeyCode::Char('q')) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
            |_, _| {},
        )
        .unwrap();
        assert_eq!(seen, vec![Some(KeyCode::Char('r')), Some(KeyCode::Char('q'))]);
    }

    #[test]
    fn ctrl_c_stops_without_stepping() {
        let mut terminal = Terminal::new(TestBackend::new(10, 1)).unwrap();
        let mut steps = 0;
        fold_with(
            &mut terminal,
            scripted(vec![KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)]),
            &mut steps,
            Duration::ZERO,
            |n, _| {
                *n += 1;
                ControlFlow::Continue(())
            },
            |_, _| {},
        )
        .unwrap();
        assert_eq!(steps, 0);
    }
}
