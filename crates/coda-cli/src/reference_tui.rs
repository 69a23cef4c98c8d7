use std::io;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::reference_state::ReferenceState;
use crate::{map_tui_io, CliError};

struct TuiTerminal {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TuiTerminal {
    fn new() -> Result<Self, CliError> {
        enable_raw_mode().map_err(map_tui_io)?;
        io::stdout()
            .execute(EnterAlternateScreen)
            .map_err(map_tui_io)?;
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend).map_err(map_tui_io)?;
        Ok(Self { terminal })
    }
}

impl Drop for TuiTerminal {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
    }
}

pub(crate) fn run_reference_browser(state: &mut ReferenceState) -> Result<i32, CliError> {
    let mut terminal = TuiTerminal::new()?;
    loop {
        terminal
            .terminal
            .draw(|frame| render_reference(frame, state))
            .map_err(map_tui_io)?;

        if let Event::Key(key) = event::read().map_err(map_tui_io)? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if handle_key(key, state) {
                break;
            }
        }
    }
    Ok(0)
}

/// Applies one key press; true means quit.
pub(crate) fn handle_key(key: KeyEvent, state: &mut ReferenceState) -> bool {
    match key.code {
        KeyCode::Esc => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Up => state.move_up(),
        KeyCode::Down => state.move_down(),
        KeyCode::Backspace => state.pop_filter(),
        KeyCode::Char(ch) => state.push_filter(ch),
        _ => {}
    }
    false
}

pub(crate) fn render_reference(frame: &mut Frame<'_>, state: &ReferenceState) {
    let [body, footer] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)]).areas(body);

    let items = state
        .visible()
        .into_iter()
        .map(|doc| {
            let mut spans = vec![Span::raw(doc.name.clone())];
            if let Some(alias) = &doc.alias {
                spans.push(Span::styled(
                    format!(" ({})", alias),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect::<Vec<_>>();
    let list = List::new(items)
        .block(Block::bordered().title("Commands"))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    let mut list_state = ListState::default().with_selected(Some(state.selected));
    frame.render_stateful_widget(list, list_area, &mut list_state);

    let detail = Paragraph::new(
        state
            .detail_lines()
            .into_iter()
            .map(Line::from)
            .collect::<Vec<_>>(),
    )
    .block(Block::bordered().title("Reference"))
    .wrap(Wrap { trim: false });
    frame.render_widget(detail, detail_area);

    let footer_text = format!(
        "filter: {}  |  up/down select  backspace erase  esc quit",
        state.filter
    );
    frame.render_widget(
        Paragraph::new(footer_text).style(Style::default().fg(Color::Cyan)),
        footer,
    );
}

#[cfg(test)]
mod reference_tui_tests {
    use coda_runtime::CommandTable;
    use ratatui::backend::TestBackend;

    use super::*;

    fn state() -> ReferenceState {
        let table = CommandTable::with_general_commands().expect("general commands");
        ReferenceState::new(table.documentation())
    }

    fn screen(state: &ReferenceState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).expect("terminal");
        terminal
            .draw(|frame| render_reference(frame, state))
            .expect("draw");
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn renders_command_list_and_selected_details() {
        let state = state();
        let text = screen(&state);
        assert!(text.contains("Commands"));
        assert!(text.contains("FormatNumber (FmtNum)"));
        assert!(text.contains("filter:"));
        assert!(text.contains("Stops the execution"));
    }

    #[test]
    fn keys_edit_filter_and_quit() {
        let mut state = state();
        assert!(!handle_key(KeyEvent::from(KeyCode::Char('b')), &mut state));
        assert_eq!(state.filter, "b");
        assert!(!handle_key(KeyEvent::from(KeyCode::Backspace), &mut state));
        assert!(state.filter.is_empty());
        assert!(!handle_key(KeyEvent::from(KeyCode::Down), &mut state));
        assert_eq!(state.selected, 1);
        assert!(handle_key(
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
            &mut state
        ));
        assert!(handle_key(KeyEvent::from(KeyCode::Esc), &mut state));
    }
}
